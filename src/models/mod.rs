//! Domain models shared across the whole bot.

pub mod bar;
pub mod direction;
pub mod order;
pub mod tick;

pub use bar::{Bar, OpeningRange, ReferenceBar};
pub use direction::Direction;
pub use order::{OrderDecision, OrderReceipt, OrderRecord, OrderStatus};
pub use tick::{Tick, TickKind};
