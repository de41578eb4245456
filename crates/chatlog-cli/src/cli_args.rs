use std::path::PathBuf;

use chatlog_dedup::{DedupConfig, DEFAULT_DEDUP_MAX_SIZE, DEFAULT_DEDUP_TTL_SECONDS};
use chatlog_runtime::PipelinePolicy;
use chatlog_store::{ConversationKind, LogStoreConfig, Period, DEFAULT_LOCK_WAIT_MS};
use clap::{Parser, Subcommand};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_period(value: &str) -> Result<Period, String> {
    value.parse::<Period>()
}

fn parse_conversation_kind(value: &str) -> Result<ConversationKind, String> {
    value.parse::<ConversationKind>()
}

#[derive(Debug, Parser)]
#[command(
    name = "chatlog",
    about = "Deduplicating, append-only chat message logger",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "store-root",
        env = "CHATLOG_STORE_ROOT",
        default_value = chatlog_store::DEFAULT_STORE_ROOT,
        global = true,
        help = "Root directory of the conversation log tree"
    )]
    pub(crate) store_root: PathBuf,

    #[arg(
        long = "lock-wait-ms",
        env = "CHATLOG_LOCK_WAIT_MS",
        default_value_t = DEFAULT_LOCK_WAIT_MS,
        value_parser = parse_positive_u64,
        global = true,
        help = "Maximum time to wait for a log file lock before the append fails"
    )]
    pub(crate) lock_wait_ms: u64,

    #[arg(
        long = "dedup-max-size",
        env = "CHATLOG_DEDUP_MAX_SIZE",
        default_value_t = DEFAULT_DEDUP_MAX_SIZE,
        value_parser = parse_positive_usize,
        global = true,
        help = "Maximum number of message fingerprints remembered for duplicate detection"
    )]
    pub(crate) dedup_max_size: usize,

    #[arg(
        long = "dedup-ttl-seconds",
        env = "CHATLOG_DEDUP_TTL_SECONDS",
        default_value_t = DEFAULT_DEDUP_TTL_SECONDS,
        value_parser = parse_positive_u64,
        global = true,
        help = "Seconds a message fingerprint is remembered after it was first accepted"
    )]
    pub(crate) dedup_ttl_seconds: u64,

    #[arg(
        long = "bot-name",
        env = "CHATLOG_BOT_NAME",
        global = true,
        help = "Name the bot is @-mentioned by in group chats"
    )]
    pub(crate) bot_name: Option<String>,

    #[arg(
        long = "trigger-keyword",
        env = "CHATLOG_TRIGGER_KEYWORD",
        global = true,
        help = "Group messages containing this keyword are forwarded to the model"
    )]
    pub(crate) trigger_keyword: Option<String>,

    #[arg(
        long = "blocked-sender",
        env = "CHATLOG_BLOCKED_SENDERS",
        value_delimiter = ',',
        default_value = "微信团队",
        global = true,
        help = "Senders whose messages are ignored (comma-separated, substring match)"
    )]
    pub(crate) blocked_senders: Vec<String>,

    #[arg(
        long = "welcome-room",
        env = "CHATLOG_WELCOME_ROOMS",
        value_delimiter = ',',
        global = true,
        help = "Rooms (id or name) that receive welcome messages; empty means all rooms"
    )]
    pub(crate) welcome_rooms: Vec<String>,

    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// Read raw client messages (one per line) and log them.
    Ingest {
        #[arg(
            long,
            default_value = "-",
            help = "Input file with one raw message per line; '-' reads stdin"
        )]
        input: String,
    },
    /// Print the logged entries of one conversation as NDJSON.
    History {
        #[arg(long, value_parser = parse_conversation_kind, help = "group or private")]
        kind: ConversationKind,
        #[arg(long, help = "Conversation name as it appears in the log tree")]
        name: String,
        #[arg(long, value_parser = parse_period, help = "First period to include (YYYYMM)")]
        from: Option<Period>,
        #[arg(long, value_parser = parse_period, help = "Last period to include (YYYYMM)")]
        to: Option<Period>,
    },
}

impl Cli {
    pub(crate) fn store_config(&self) -> LogStoreConfig {
        LogStoreConfig {
            root: self.store_root.clone(),
            lock_wait_ms: self.lock_wait_ms,
        }
    }

    pub(crate) fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            max_size: self.dedup_max_size,
            ttl_seconds: self.dedup_ttl_seconds,
        }
    }

    pub(crate) fn pipeline_policy(&self) -> PipelinePolicy {
        PipelinePolicy {
            bot_name: non_empty(self.bot_name.as_deref()),
            trigger_keyword: non_empty(self.trigger_keyword.as_deref()),
            blocked_senders: trimmed_list(&self.blocked_senders),
            welcome_rooms: trimmed_list(&self.welcome_rooms),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn trimmed_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
