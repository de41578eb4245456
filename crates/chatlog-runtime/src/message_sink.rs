use anyhow::Result;
use chatlog_contract::InboundMessage;

/// Downstream consumer of forward and welcome decisions.
pub trait MessageSink: Send + Sync {
    fn forward_to_model(&self, message: &InboundMessage, prompt: &str) -> Result<()>;
    fn send_welcome(&self, message: &InboundMessage) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Sink that only records decisions through `tracing`.
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn forward_to_model(&self, message: &InboundMessage, prompt: &str) -> Result<()> {
        tracing::info!(
            message_id = %message.message_id,
            sender = %message.sender.name,
            conversation = %message.conversation_name(),
            prompt,
            "forwarding message to model"
        );
        Ok(())
    }

    fn send_welcome(&self, message: &InboundMessage) -> Result<()> {
        tracing::info!(
            conversation = %message.conversation_name(),
            notice = %message.content(),
            "sending welcome message"
        );
        Ok(())
    }
}
