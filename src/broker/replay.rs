//! # broker::replay
//!
//! Replays a recorded pricing stream: one v20 JSON message per line, exactly
//! as the live stream delivers them.  Lines are consumed lazily, in order.

use std::path::Path;

use futures_util::{stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::info;

use crate::broker::{decode_line, TickStream};
use crate::error::BotError;

pub struct ReplayFeed;

impl ReplayFeed {
    pub async fn open(path: impl AsRef<Path>) -> Result<TickStream, BotError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| BotError::Feed(format!("cannot open replay file {}: {e}", path.display())))?;

        info!(path = %path.display(), "📼 Replaying ticks from file");
        Ok(Self::from_lines(BufReader::new(file).lines()))
    }

    fn from_lines(lines: Lines<BufReader<File>>) -> TickStream {
        // `None` once the file is exhausted or unreadable.
        stream::unfold(Some(lines), |state| async move {
            let mut lines = state?;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(tick) = decode_line(&line) {
                            return Some((Ok(tick), Some(lines)));
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        return Some((Err(BotError::Feed(format!("replay read failed: {e}"))), None));
                    }
                }
            }
        })
        .boxed()
    }
}
