//! Tiered polling scheduler.

mod service;

pub use service::{TickReport, TieredScheduler};
