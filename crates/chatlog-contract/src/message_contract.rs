//! Message model consumed by the dedup cache, log store, and runtime.
//!
//! A message is built once by normalization and then shared as an immutable
//! value. The body is a tagged variant so each kind only carries the fields
//! relevant to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageKind` values.
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
    Audio,
    Link,
    GroupNotice,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::File => "file",
            Self::Audio => "audio",
            Self::Link => "link",
            Self::GroupNotice => "group_notice",
        }
    }

    pub fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::File | Self::Audio)
    }

    /// Parses a client type token such as `Message#Image[3]` or `voice`.
    pub fn from_type_token(raw: &str) -> Option<Self> {
        let token = raw.rsplit_once('#').map(|(_, kind)| kind).unwrap_or(raw);
        let token = token
            .split('[')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match token.as_str() {
            "text" => Some(Self::Text),
            "image" | "picture" | "pic" => Some(Self::Image),
            "video" => Some(Self::Video),
            "file" | "attachment" => Some(Self::File),
            "audio" | "voice" => Some(Self::Audio),
            "link" | "url" => Some(Self::Link),
            "groupnote" | "group_note" | "groupnotice" | "group_notice" => Some(Self::GroupNotice),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `GroupNoticeKind` values.
pub enum GroupNoticeKind {
    Pat,
    Invite,
    Scan,
    Other,
}

impl GroupNoticeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pat => "pat",
            Self::Invite => "invite",
            Self::Scan => "scan",
            Self::Other => "other",
        }
    }

    /// Classifies a group notice by its system text.
    pub fn classify(content: &str) -> Self {
        if content.contains("拍了拍") {
            return Self::Pat;
        }
        if (content.contains("通过扫描") || content.contains("通过扫码"))
            && content.contains("加入群聊")
        {
            return Self::Scan;
        }
        if content.contains("邀请") && content.contains("加入") && content.contains("群聊") {
            return Self::Invite;
        }
        Self::Other
    }

    /// Returns true for notices announcing a new member.
    pub fn is_join(self) -> bool {
        matches!(self, Self::Invite | Self::Scan)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
/// Caption and ordered source references of a media message.
pub struct MediaPayload {
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Kind-specific payload of an inbound message.
pub enum MessageBody {
    Text { content: String },
    Image(MediaPayload),
    Video(MediaPayload),
    File(MediaPayload),
    Audio(MediaPayload),
    Link { content: String },
    GroupNotice {
        content: String,
        notice: GroupNoticeKind,
    },
}

impl MessageBody {
    pub fn media(kind: MessageKind, caption: String, references: Vec<String>) -> Self {
        let payload = MediaPayload {
            caption,
            references,
        };
        match kind {
            MessageKind::Image => Self::Image(payload),
            MessageKind::Video => Self::Video(payload),
            MessageKind::File => Self::File(payload),
            MessageKind::Audio => Self::Audio(payload),
            MessageKind::Link => Self::Link {
                content: payload.caption,
            },
            MessageKind::GroupNotice => Self::GroupNotice {
                notice: GroupNoticeKind::classify(&payload.caption),
                content: payload.caption,
            },
            MessageKind::Text => Self::Text {
                content: payload.caption,
            },
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Image(_) => MessageKind::Image,
            Self::Video(_) => MessageKind::Video,
            Self::File(_) => MessageKind::File,
            Self::Audio(_) => MessageKind::Audio,
            Self::Link { .. } => MessageKind::Link,
            Self::GroupNotice { .. } => MessageKind::GroupNotice,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Text { content } | Self::Link { content } | Self::GroupNotice { content, .. } => {
                content
            }
            Self::Image(payload)
            | Self::Video(payload)
            | Self::File(payload)
            | Self::Audio(payload) => &payload.caption,
        }
    }

    pub fn media_references(&self) -> &[String] {
        match self {
            Self::Image(payload)
            | Self::Video(payload)
            | Self::File(payload)
            | Self::Audio(payload) => &payload.references,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
/// Identifier and display name of a sender or conversation.
pub struct Participant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl Participant {
    pub fn is_empty(&self) -> bool {
        self.id.trim().is_empty() && self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `InboundMessage` used across chatlog components.
pub struct InboundMessage {
    #[serde(default)]
    pub message_id: String,
    /// Type string exactly as the client sent it.
    #[serde(default)]
    pub raw_type: String,
    #[serde(default)]
    pub sender: Participant,
    #[serde(default)]
    pub conversation: Option<Participant>,
    pub body: MessageBody,
    #[serde(default)]
    pub raw: Value,
}

impl InboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message_id: String::new(),
            raw_type: String::new(),
            sender: Participant::default(),
            conversation: None,
            body: MessageBody::Text {
                content: content.into(),
            },
            raw: Value::Null,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn content(&self) -> &str {
        self.body.content()
    }

    pub fn media_references(&self) -> &[String] {
        self.body.media_references()
    }

    pub fn conversation_id(&self) -> &str {
        self.conversation
            .as_ref()
            .map(|conversation| conversation.id.as_str())
            .unwrap_or_default()
    }

    pub fn conversation_name(&self) -> &str {
        self.conversation
            .as_ref()
            .map(|conversation| conversation.name.as_str())
            .unwrap_or_default()
    }

    /// Returns true when the message was posted into a group conversation.
    pub fn is_group(&self) -> bool {
        self.conversation
            .as_ref()
            .is_some_and(|conversation| !conversation.is_empty())
    }

    pub fn with_sender(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.sender = Participant {
            id: id.into(),
            name: name.into(),
        };
        self
    }

    pub fn with_conversation(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.conversation = Some(Participant {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }
}
