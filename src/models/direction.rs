//! # models::direction
//!
//! Three-valued breakout state shared by the indicator and the orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Initial state; price has not left the opening range yet.
    #[default]
    Neutral,
    Long,
    Short,
}

impl Direction {
    /// `+1` for Long, `-1` for Short, `0` for Neutral.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
            Direction::Neutral => 0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Neutral => "NEUTRAL",
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        };
        f.write_str(name)
    }
}
