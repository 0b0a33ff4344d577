//! Core pipeline: ticks → bars → indicator → single order.

pub mod aggregator;
pub mod event_bus;
pub mod executor;
pub mod granularity;
pub mod indicator;
pub mod orchestrator;
pub mod store;
