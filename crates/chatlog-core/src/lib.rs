//! Foundational low-level utilities shared across chatlog crates.
//!
//! Provides the clock abstraction used by expiry and partitioning logic, unix
//! time helpers, and the durable line-append primitive behind the log store.

pub mod durable_append;
pub mod time_utils;

pub use durable_append::{append_line_durable, create_dir_all_durable, sync_parent_dir};
pub use time_utils::{
    current_unix_timestamp, current_unix_timestamp_ms, Clock, ManualClock, SharedClock,
    SystemClock,
};
