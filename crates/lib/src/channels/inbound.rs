//! Inbound message from a provider webhook, handed to the pipeline.

/// One inbound SMS/WhatsApp message: originating channel, sender, text.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    pub from: String,
    pub body: String,
}
