//! Message handling runtime for chatlog.
//!
//! Wires the dedup cache, noise filter, log store, and downstream sink into a
//! single per-message pipeline.

pub mod message_pipeline;
pub mod message_policy;
pub mod message_sink;

pub use message_pipeline::*;
pub use message_policy::*;
pub use message_sink::*;
