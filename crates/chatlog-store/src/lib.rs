//! Append-only, lock-guarded chat log store.
//!
//! Every accepted message becomes one JSON line in
//! `<root>/<group|private>/<safe_name>/<YYYYMM>.log`. Appends to the same file
//! serialize on a kernel advisory lock keyed by that file's path; appends to
//! different files never contend. Referenced media is copied into a sibling
//! `media/` tree before the log line is written.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chatlog_contract::InboundMessage;
use chatlog_core::{append_line_durable, create_dir_all_durable, SharedClock, SystemClock};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod store_history;
mod store_layout;
mod store_locking;
mod store_media;

pub use store_history::HistoryIter;
pub use store_layout::{safe_name, Period};
pub use store_locking::{acquire_path_lock, lock_path_for, PathLockGuard};
pub use store_media::{guess_mime_type, select_media_sources};

pub const DEFAULT_STORE_ROOT: &str = "chat_logs";
pub const DEFAULT_LOCK_WAIT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ConversationKind` values.
pub enum ConversationKind {
    Group,
    Private,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "group" | "groups" => Ok(Self::Group),
            "private" => Ok(Self::Private),
            other => Err(format!(
                "unsupported conversation kind '{other}' (expected group|private)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `LogStoreConfig` used across chatlog components.
pub struct LogStoreConfig {
    pub root: PathBuf,
    pub lock_wait_ms: u64,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORE_ROOT),
            lock_wait_ms: DEFAULT_LOCK_WAIT_MS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
/// Enumerates supported `StoreError` values.
pub enum StoreError {
    #[error("timed out after {waited_ms}ms acquiring lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },
    #[error("failed to acquire lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write log line {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to encode log entry: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable machine-readable code for summaries and telemetry.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::LockTimeout { .. } => "store_lock_timeout",
            Self::Lock { .. } => "store_lock_failed",
            Self::Io { .. } => "store_io_failed",
            Self::Write { .. } => "store_write_failed",
            Self::Encode(_) => "store_encode_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Media file captured into the store alongside a log entry.
pub struct MediaRecord {
    #[serde(rename = "type")]
    pub media_type: String,
    /// Path relative to the store root, `/`-separated.
    pub stored_path: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One line of a period log file.
pub struct LogEntry {
    pub timestamp: String,
    pub conversation_id: String,
    pub conversation_name: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRecord>,
    #[serde(default)]
    pub raw_message: Value,
}

#[derive(Debug, Clone)]
/// Result of a successful append.
pub struct AppendReceipt {
    pub log_path: PathBuf,
    pub entry: LogEntry,
    /// Media references that were selected but could not be copied.
    pub media_failures: usize,
}

/// Public struct `LogStore` used across chatlog components.
pub struct LogStore {
    config: LogStoreConfig,
    clock: SharedClock,
}

impl fmt::Debug for LogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStore")
            .field("config", &self.config)
            .finish()
    }
}

impl LogStore {
    pub fn open(config: LogStoreConfig) -> Result<Self, StoreError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LogStoreConfig, clock: SharedClock) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.root)
            .map_err(|error| StoreError::io("create store root", &config.root, error))?;
        tracing::debug!(root = %config.root.display(), "log store opened");
        Ok(Self { config, clock })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &LogStoreConfig {
        &self.config
    }

    /// Directory holding every period file of one conversation.
    pub fn conversation_dir(&self, kind: ConversationKind, conversation_name: &str) -> PathBuf {
        self.config
            .root
            .join(kind.as_str())
            .join(safe_name(conversation_name))
    }

    /// Persists `message` as the last line of the current period file.
    ///
    /// On `Ok` the line has been flushed and synced. Media copy failures are
    /// logged and counted but never fail the append. When the line cannot be
    /// written, the media copied for it is removed again.
    pub fn append(
        &self,
        message: &InboundMessage,
        kind: ConversationKind,
        conversation_id: &str,
        conversation_name: &str,
    ) -> Result<AppendReceipt, StoreError> {
        let started = local_datetime_from_unix_ms(self.clock.now_unix_ms());
        let conversation_dir = self.conversation_dir(kind, conversation_name);
        create_dir_all_durable(&conversation_dir)
            .map_err(|error| StoreError::io("create conversation dir", &conversation_dir, error))?;

        let capture =
            store_media::capture_media(&self.config.root, &conversation_dir, message, &started);
        if capture.failures > 0 {
            tracing::warn!(
                failures = capture.failures,
                captured = capture.records.len(),
                conversation = conversation_name,
                "some media references could not be captured"
            );
        }

        let log_path = conversation_dir.join(Period::from_datetime(&started).file_name());
        let mut entry = LogEntry {
            timestamp: String::new(),
            conversation_id: conversation_id.to_string(),
            conversation_name: conversation_name.to_string(),
            message_id: message.message_id.clone(),
            message_type: message.kind().as_str().to_string(),
            sender_id: message.sender.id.clone(),
            sender_name: message.sender.name.clone(),
            content: message.content().to_string(),
            media: capture.records,
            raw_message: Value::Null,
        };
        if let Err(error) = self.write_entry(message, &log_path, &mut entry) {
            self.discard_media(&entry.media);
            return Err(error);
        }

        tracing::info!(
            path = %log_path.display(),
            message_id = %entry.message_id,
            kind = kind.as_str(),
            "saved message"
        );
        Ok(AppendReceipt {
            log_path,
            entry,
            media_failures: capture.failures,
        })
    }

    /// Stamps and writes `entry` while holding the lock of `log_path`, so
    /// timestamps follow the order of lines in the file.
    fn write_entry(
        &self,
        message: &InboundMessage,
        log_path: &Path,
        entry: &mut LogEntry,
    ) -> Result<(), StoreError> {
        entry.raw_message = raw_message_value(message)?;
        let lock = acquire_path_lock(log_path, Duration::from_millis(self.config.lock_wait_ms))?;
        entry.timestamp = local_datetime_from_unix_ms(self.clock.now_unix_ms())
            .to_rfc3339_opts(SecondsFormat::Millis, false);
        let line = serde_json::to_string(&*entry)?;
        append_line_durable(log_path, &line).map_err(|source| StoreError::Write {
            path: log_path.to_path_buf(),
            source,
        })?;
        drop(lock);
        Ok(())
    }

    fn discard_media(&self, records: &[MediaRecord]) {
        for record in records {
            let target = self.config.root.join(&record.stored_path);
            match fs::remove_file(&target) {
                Ok(()) => {
                    tracing::debug!(target = %target.display(), "removed media of failed append");
                }
                Err(error) => {
                    tracing::warn!(
                        target = %target.display(),
                        %error,
                        "could not remove media of failed append"
                    );
                }
            }
        }
    }

    /// Lazily reads the entries of one conversation, oldest period first.
    ///
    /// `start` and `end` bound the period range inclusively. Takes no lock:
    /// lines that fail to parse, including a trailing line that a concurrent
    /// writer has not finished, are skipped.
    pub fn get_history(
        &self,
        kind: ConversationKind,
        conversation_name: &str,
        start: Option<Period>,
        end: Option<Period>,
    ) -> Result<HistoryIter, StoreError> {
        let conversation_dir = self.conversation_dir(kind, conversation_name);
        store_history::open_history(&conversation_dir, start, end)
    }
}

fn raw_message_value(message: &InboundMessage) -> Result<Value, StoreError> {
    if message.raw.is_null() {
        return Ok(serde_json::to_value(message)?);
    }
    Ok(message.raw.clone())
}

/// Converts a Unix millisecond timestamp into local wall-clock time.
pub fn local_datetime_from_unix_ms(unix_ms: u64) -> DateTime<Local> {
    i64::try_from(unix_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|utc| utc.with_timezone(&Local))
        .unwrap_or_else(Local::now)
}
