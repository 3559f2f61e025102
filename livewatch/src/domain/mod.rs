//! Core domain types: bindings, sessions, per-binding status and poll outcomes.

pub mod binding;
pub mod live_status;
pub mod poll;
pub mod session;

pub use binding::{Binding, BindingKey, Tier};
pub use live_status::{BindingState, BindingStatus, LiveStatusRecord};
pub use poll::{PollOutcome, UnknownReason};
pub use session::{StreamSession, derive_session_id};
