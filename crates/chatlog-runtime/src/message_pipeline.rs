use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chatlog_contract::{normalize_raw_message, InboundMessage, MessageKind};
use chatlog_dedup::DedupCache;
use chatlog_store::{ConversationKind, LogStore, StoreError};
use serde::Serialize;

use crate::message_policy::{
    evaluate_forward_policy, evaluate_noise_filter, should_send_welcome, ForwardDecision,
    NoiseDecision, PipelinePolicy,
};
use crate::message_sink::MessageSink;

const UNKNOWN_ROOM: &str = "unknown_room";
const UNKNOWN_SENDER: &str = "unknown_sender";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
/// Enumerates supported `PipelineOutcome` values.
pub enum PipelineOutcome {
    Duplicate,
    Ignored {
        reason_code: String,
    },
    Logged {
        log_path: PathBuf,
        forwarded: bool,
        welcomed: bool,
        media_failures: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Log partition an accepted message is written to.
pub struct Partition {
    pub kind: ConversationKind,
    pub conversation_id: String,
    pub conversation_name: String,
}

/// Group messages go to their room, everything else to the sender's
/// private conversation.
pub fn partition_for(message: &InboundMessage) -> Partition {
    if message.is_group() {
        let conversation_id = message.conversation_id().trim();
        let conversation_name = first_non_empty(&[message.conversation_name(), conversation_id])
            .unwrap_or(UNKNOWN_ROOM);
        return Partition {
            kind: ConversationKind::Group,
            conversation_id: conversation_id.to_string(),
            conversation_name: conversation_name.to_string(),
        };
    }
    let sender_id = message.sender.id.trim();
    let sender_name =
        first_non_empty(&[message.sender.name.as_str(), sender_id]).unwrap_or(UNKNOWN_SENDER);
    Partition {
        kind: ConversationKind::Private,
        conversation_id: sender_id.to_string(),
        conversation_name: sender_name.to_string(),
    }
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|candidate| candidate.trim())
        .find(|candidate| !candidate.is_empty())
}

/// Dedup, filter, persist, then hand the message to the sink.
pub struct MessagePipeline {
    dedup: Arc<DedupCache>,
    store: Arc<LogStore>,
    policy: PipelinePolicy,
    sink: Arc<dyn MessageSink>,
}

impl fmt::Debug for MessagePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePipeline")
            .field("dedup", &self.dedup)
            .field("store", &self.store)
            .field("policy", &self.policy)
            .finish()
    }
}

impl MessagePipeline {
    pub fn new(
        dedup: Arc<DedupCache>,
        store: Arc<LogStore>,
        policy: PipelinePolicy,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            dedup,
            store,
            policy,
            sink,
        }
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    /// Normalizes one raw client line and handles it.
    pub fn handle_raw(&self, raw: &str) -> Result<PipelineOutcome, StoreError> {
        self.handle(normalize_raw_message(raw))
    }

    /// Runs one message through the pipeline.
    ///
    /// A store failure is returned as-is; the message stays in the dedup
    /// cache, so a resend within the TTL is reported as a duplicate.
    pub fn handle(&self, message: InboundMessage) -> Result<PipelineOutcome, StoreError> {
        if self.dedup.is_duplicate(&message) {
            return Ok(PipelineOutcome::Duplicate);
        }
        if let NoiseDecision::Ignore { reason_code } = evaluate_noise_filter(&self.policy, &message)
        {
            tracing::debug!(
                message_id = %message.message_id,
                reason_code = %reason_code,
                "ignoring message"
            );
            return Ok(PipelineOutcome::Ignored { reason_code });
        }

        let partition = partition_for(&message);
        let receipt = self.store.append(
            &message,
            partition.kind,
            &partition.conversation_id,
            &partition.conversation_name,
        )?;

        let mut forwarded = false;
        let mut welcomed = false;
        if message.kind() == MessageKind::GroupNotice {
            if should_send_welcome(&self.policy, &message) {
                welcomed = self.deliver("send_welcome", || self.sink.send_welcome(&message));
            }
        } else {
            match evaluate_forward_policy(&self.policy, &message) {
                ForwardDecision::Forward {
                    prompt,
                    reason_code,
                } => {
                    tracing::debug!(reason_code = %reason_code, "forwarding message");
                    forwarded = self.deliver("forward_to_model", || {
                        self.sink.forward_to_model(&message, &prompt)
                    });
                }
                ForwardDecision::Skip { reason_code } => {
                    tracing::debug!(reason_code = %reason_code, "not forwarding message");
                }
            }
        }

        Ok(PipelineOutcome::Logged {
            log_path: receipt.log_path,
            forwarded,
            welcomed,
            media_failures: receipt.media_failures,
        })
    }

    fn deliver(&self, action: &str, send: impl FnOnce() -> anyhow::Result<()>) -> bool {
        match send() {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(action, error = %format!("{error:#}"), "sink delivery failed");
                false
            }
        }
    }
}
