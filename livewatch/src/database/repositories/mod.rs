//! Repository layer for database access.

pub mod bindings;
pub mod live_status;
pub mod monitor_outbox;
pub mod streaks;

pub use bindings::{BindingSource, SqlxBindingSource, StaticBindingSource};
pub use live_status::{LiveStatusStore, MemoryLiveStatusStore, SqlxLiveStatusStore};
pub use monitor_outbox::{MonitorOutboxOps, MonitorOutboxTxOps, OutboxEntry};
pub use streaks::{MemoryStreakRepository, SqlxStreakRepository, StreakRecord, StreakRepository};
