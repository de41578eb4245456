//! Noise filtering and forward/welcome decisions for accepted messages.
use chatlog_contract::{InboundMessage, MessageBody, MessageKind};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BLOCKED_SENDERS: &[&str] = &["微信团队"];

/// Content fragments emitted by the client for system events.
pub const SYSTEM_CONTENT_KEYWORDS: &[&str] = &[
    "收到红包",
    "发起了红包",
    "修改群名为",
    "群公告",
    "拍了拍",
    "撤回了一条消息",
    "开启了朋友验证",
    "加入了群聊",
    "邀请",
    "发起了群聊",
    "群成员",
];

const SYSTEM_TYPE_MARKERS: &[&str] = &["sysmsg", "system"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `PipelinePolicy` used across chatlog components.
pub struct PipelinePolicy {
    /// Display name the bot is mentioned by in group chats.
    #[serde(default)]
    pub bot_name: Option<String>,
    #[serde(default)]
    pub trigger_keyword: Option<String>,
    #[serde(default)]
    pub blocked_senders: Vec<String>,
    /// Rooms (id or name) that get welcome messages; empty means all rooms.
    #[serde(default)]
    pub welcome_rooms: Vec<String>,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            bot_name: None,
            trigger_keyword: None,
            blocked_senders: DEFAULT_BLOCKED_SENDERS
                .iter()
                .map(|sender| sender.to_string())
                .collect(),
            welcome_rooms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Enumerates supported `NoiseDecision` values.
pub enum NoiseDecision {
    Keep,
    Ignore { reason_code: String },
}

impl NoiseDecision {
    fn ignore(reason_code: &str) -> Self {
        Self::Ignore {
            reason_code: reason_code.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Enumerates supported `ForwardDecision` values.
pub enum ForwardDecision {
    Forward { prompt: String, reason_code: String },
    Skip { reason_code: String },
}

impl ForwardDecision {
    pub fn reason_code(&self) -> &str {
        match self {
            Self::Forward { reason_code, .. } | Self::Skip { reason_code } => reason_code,
        }
    }

    fn forward(prompt: impl Into<String>, reason_code: &str) -> Self {
        Self::Forward {
            prompt: prompt.into(),
            reason_code: reason_code.to_string(),
        }
    }

    fn skip(reason_code: &str) -> Self {
        Self::Skip {
            reason_code: reason_code.to_string(),
        }
    }
}

/// Decides whether an accepted message is noise that should not be logged.
///
/// Group notices only pass the sender check here; they are logged so the
/// welcome policy can see them.
pub fn evaluate_noise_filter(policy: &PipelinePolicy, message: &InboundMessage) -> NoiseDecision {
    if is_blocked_sender(policy, message) {
        return NoiseDecision::ignore("ignore_blocked_sender");
    }
    if message.kind() == MessageKind::GroupNotice {
        return NoiseDecision::Keep;
    }
    let raw_type = message.raw_type.to_ascii_lowercase();
    if SYSTEM_TYPE_MARKERS
        .iter()
        .any(|marker| raw_type.contains(marker))
    {
        return NoiseDecision::ignore("ignore_system_message_type");
    }
    let content = message.content();
    if SYSTEM_CONTENT_KEYWORDS
        .iter()
        .any(|keyword| content.contains(keyword))
    {
        return NoiseDecision::ignore("ignore_system_content_keyword");
    }
    NoiseDecision::Keep
}

fn is_blocked_sender(policy: &PipelinePolicy, message: &InboundMessage) -> bool {
    let sender_id = message.sender.id.to_lowercase();
    let sender_name = message.sender.name.to_lowercase();
    policy
        .blocked_senders
        .iter()
        .map(|blocked| blocked.trim().to_lowercase())
        .filter(|blocked| !blocked.is_empty())
        .any(|blocked| sender_id.contains(&blocked) || sender_name.contains(&blocked))
}

/// Decides whether a logged message goes to the model and with what prompt.
pub fn evaluate_forward_policy(policy: &PipelinePolicy, message: &InboundMessage) -> ForwardDecision {
    if message.kind() != MessageKind::Text {
        return ForwardDecision::skip("skip_forward_non_text");
    }
    let content = message.content();
    if !message.is_group() {
        return ForwardDecision::forward(content, "forward_private_chat");
    }

    if let Some(prompt) = policy
        .bot_name
        .as_deref()
        .and_then(|bot_name| strip_bot_mention(content, bot_name))
    {
        return ForwardDecision::forward(prompt, "forward_group_mention");
    }
    if let Some(keyword) = non_empty(policy.trigger_keyword.as_deref()) {
        if content.contains(keyword) {
            return ForwardDecision::forward(content, "forward_group_trigger_keyword");
        }
    }
    ForwardDecision::skip("skip_forward_group_not_addressed")
}

/// Returns the text around a leading or trailing `@bot_name`, if any is left.
pub fn strip_bot_mention(content: &str, bot_name: &str) -> Option<String> {
    let bot_name = non_empty(Some(bot_name))?;
    let mention = format!("@{bot_name}");
    let trimmed = content.trim();
    let remainder = trimmed
        .strip_prefix(mention.as_str())
        .or_else(|| trimmed.strip_suffix(mention.as_str()))?
        .trim_matches(|ch: char| ch.is_whitespace() || ch == '\u{2005}');
    if remainder.is_empty() {
        None
    } else {
        Some(remainder.to_string())
    }
}

/// Returns true for join notices in a room the welcome list allows.
pub fn should_send_welcome(policy: &PipelinePolicy, message: &InboundMessage) -> bool {
    let MessageBody::GroupNotice { notice, .. } = &message.body else {
        return false;
    };
    if !notice.is_join() {
        return false;
    }
    let rooms = policy
        .welcome_rooms
        .iter()
        .map(|room| room.trim())
        .filter(|room| !room.is_empty())
        .collect::<Vec<_>>();
    rooms.is_empty()
        || rooms
            .iter()
            .any(|room| *room == message.conversation_id() || *room == message.conversation_name())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
