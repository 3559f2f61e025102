//! Row models for the monitor tables.

mod binding;
mod live_status;
mod session;

pub use binding::CreatorBindingDbModel;
pub use live_status::LiveStatusDbModel;
pub use session::StreamSessionDbModel;
