//! Inbound chat message contract for chatlog.
//!
//! Defines the tagged message model shared by the dedup cache, the log store,
//! and the runtime pipeline, plus the best-effort normalization that turns raw
//! client payloads into that model.
//!
//! ```rust
//! use chatlog_contract::{normalize_raw_message, MessageKind};
//!
//! let raw = r#"{"type":"Message#Text","talker":"Contact<Ada>@Room<Ops>","content":"hi"}"#;
//! let message = normalize_raw_message(raw);
//! assert_eq!(message.kind(), MessageKind::Text);
//! assert_eq!(message.sender.name, "Ada");
//! assert_eq!(message.conversation_name(), "Ops");
//! ```

pub mod message_contract;
pub mod message_normalize;

pub use message_contract::*;
pub use message_normalize::*;
