//! Stream monitor: applies poll outcomes to per-binding state.
//!
//! - Debounced session state machine
//! - Atomic commit of state, sessions and outbox events
//! - Outbox publisher fanning events out to in-process consumers
//! - "Could not verify" status view

pub mod events;
mod service;
mod state_machine;

pub use events::{MonitorEvent, MonitorEventBroadcaster, SessionCloseEvent, SessionOpenEvent};
pub use service::StreamMonitor;
pub use state_machine::{Step, StreamStateMachine, Transition};
