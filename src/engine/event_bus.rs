//! # engine::event_bus
//!
//! Synchronous named-channel publish/subscribe registry.
//!
//! * Handlers of a channel run in registration order on the publisher's thread.
//! * Registration is idempotent by handler identity (`Arc` pointer).
//! * A handler that returns `Err` or panics is isolated: the remaining handlers
//!   still run and the failure is reported back to the publisher.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::BotError;

/// A subscribed callback.  Clone the `Arc` to keep a handle for `unsubscribe`.
pub type Handler<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<E, F>(f: F) -> Handler<E>
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_handler<E>(a: &Handler<E>, b: &Handler<E>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// ─── Publish Report ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    /// Position of the handler in the channel's registration order.
    pub position: usize,
    pub error:    String,
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReport {
    pub channel:   String,
    /// Handlers that completed successfully.
    pub delivered: usize,
    pub failures:  Vec<HandlerFailure>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ─── Event Bus ────────────────────────────────────────────────────────────────

pub struct EventBus<E> {
    channels: HashMap<String, Vec<Handler<E>>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self { channels: HashMap::new() }
    }

    /// Register `handler` on `channel`.  Returns `false` if it was already there.
    pub fn subscribe(&mut self, channel: &str, handler: Handler<E>) -> bool {
        let handlers = self.channels.entry(channel.to_string()).or_default();
        if handlers.iter().any(|h| same_handler(h, &handler)) {
            debug!(channel, "Handler already subscribed, ignored");
            return false;
        }
        handlers.push(handler);
        debug!(channel, handlers = handlers.len(), "Handler subscribed");
        true
    }

    pub fn unsubscribe(&mut self, channel: &str, handler: &Handler<E>) -> Result<(), BotError> {
        let not_found = || BotError::HandlerNotFound { channel: channel.to_string() };

        let handlers = self.channels.get_mut(channel).ok_or_else(not_found)?;
        let position = handlers
            .iter()
            .position(|h| same_handler(h, handler))
            .ok_or_else(not_found)?;
        handlers.remove(position);
        Ok(())
    }

    pub fn handler_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    /// Invoke every handler of `channel` with `payload`.
    pub fn publish(&self, channel: &str, payload: &E) -> PublishReport {
        let mut report = PublishReport {
            channel:   channel.to_string(),
            delivered: 0,
            failures:  Vec::new(),
        };

        let Some(handlers) = self.channels.get(channel) else {
            return report;
        };

        for (position, handler) in handlers.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| (**handler)(payload)));
            let error = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => panic_message(panic.as_ref()),
            };

            error!(channel, position, error = %error, "Event handler failed");
            report.failures.push(HandlerFailure { position, error });
        }

        report
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
