//! Best-effort normalization of raw client payloads into [`InboundMessage`].
//!
//! Normalization never fails: missing fields become empty strings, unknown
//! type tokens become text, and non-JSON input becomes a text message carrying
//! the raw line as content.

use serde_json::{json, Map, Value};

use crate::message_contract::{InboundMessage, MessageBody, MessageKind, Participant};

pub const PIC_MSG_PREFIX: &str = "pic msg";

const TYPE_KEYS: &[&str] = &["type"];
const TALKER_KEYS: &[&str] = &["talker", "sender"];
const SENDER_ID_KEYS: &[&str] = &["talker_id", "sender_id"];
const SENDER_NAME_KEYS: &[&str] = &["sender_name"];
const ROOM_KEYS: &[&str] = &["room"];
const ROOM_ID_KEYS: &[&str] = &["room_id"];
const ROOM_NAME_KEYS: &[&str] = &["room_name"];
const CONTENT_KEYS: &[&str] = &["content", "text"];
const MESSAGE_ID_KEYS: &[&str] = &["message_id", "msg_id", "id"];
const MEDIA_KEYS: &[&str] = &["pic_msg", "file_path"];

/// Normalizes one raw line received from the chat client.
pub fn normalize_raw_message(raw: &str) -> InboundMessage {
    let line = raw.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.strip_prefix(PIC_MSG_PREFIX) {
        let references = decode_media_references(&Value::String(rest.trim().to_string()));
        let raw_value = json!({ "type": "Message#Image", "pic_msg": references });
        return normalize_message_value(raw_value);
    }

    match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => normalize_message_value(value),
        _ => {
            tracing::debug!("raw message is not a JSON object; treating it as text");
            let mut message = InboundMessage::text(line);
            message.raw_type = "Message#Text".to_string();
            message.raw = Value::String(line.to_string());
            message
        }
    }
}

/// Normalizes an already-decoded client payload.
pub fn normalize_message_value(value: Value) -> InboundMessage {
    let Value::Object(map) = &value else {
        let content = value_as_text(&value);
        let mut message = InboundMessage::text(content);
        message.raw = value;
        return message;
    };

    let raw_type = first_text(map, TYPE_KEYS);
    let talker = first_text(map, TALKER_KEYS);
    let (talker_sender_name, talker_room) = split_talker_header(&talker);

    let room = first_text(map, ROOM_KEYS);
    let room_name = non_empty(first_text(map, ROOM_NAME_KEYS))
        .or_else(|| non_empty(extract_marked_name(&room).unwrap_or(room.trim()).to_string()))
        .or_else(|| talker_room.as_deref().and_then(extract_marked_name).map(str::to_string))
        .unwrap_or_default();
    let room_id = non_empty(first_text(map, ROOM_ID_KEYS))
        .or_else(|| non_empty(room.trim().to_string()))
        .or_else(|| talker_room.clone())
        .unwrap_or_default();

    let sender_id = non_empty(first_text(map, SENDER_ID_KEYS))
        .or_else(|| non_empty(talker.trim().to_string()))
        .unwrap_or_default();
    let sender_name = non_empty(first_text(map, SENDER_NAME_KEYS))
        .unwrap_or(talker_sender_name);

    let content = first_text(map, CONTENT_KEYS);
    let references = MEDIA_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .map(decode_media_references)
        .find(|references| !references.is_empty())
        .unwrap_or_default();

    let mut kind = MessageKind::from_type_token(&raw_type).unwrap_or(MessageKind::Text);
    if map.get("pic_msg").is_some_and(|value| !value.is_null()) {
        kind = MessageKind::Image;
    }

    let conversation = Participant {
        id: room_id,
        name: room_name,
    };

    InboundMessage {
        message_id: first_text(map, MESSAGE_ID_KEYS),
        raw_type,
        sender: Participant {
            id: sender_id,
            name: sender_name,
        },
        conversation: (!conversation.is_empty()).then_some(conversation),
        body: MessageBody::media(kind, content, references),
        raw: value,
    }
}

/// Decodes a media reference field that may be a list, a single path, or a
/// JSON-encoded list.
pub fn decode_media_references(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_as_text)
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            if trimmed.starts_with('[') {
                if let Ok(decoded @ Value::Array(_)) = serde_json::from_str::<Value>(trimmed) {
                    return decode_media_references(&decoded);
                }
            }
            vec![trimmed.to_string()]
        }
        _ => Vec::new(),
    }
}

/// Extracts `A` from headers shaped like `Contact<A>`.
pub fn extract_marked_name(raw: &str) -> Option<&str> {
    let start = raw.find('<')?;
    let rest = &raw[start + 1..];
    let end = rest.find('>')?;
    Some(rest[..end].trim())
}

fn split_talker_header(talker: &str) -> (String, Option<String>) {
    let (contact, room) = match talker.split_once('@') {
        Some((contact, room)) if extract_marked_name(room).is_some() => {
            (contact, Some(room.trim().to_string()))
        }
        _ => (talker, None),
    };
    let sender_name = extract_marked_name(contact)
        .unwrap_or(contact.trim())
        .to_string();
    (sender_name, room)
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .map(value_as_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}
