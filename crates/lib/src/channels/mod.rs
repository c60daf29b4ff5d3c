//! Channel adapters: inbound webhook messages and outbound delivery via Twilio.

pub mod inbound;
pub mod registry;
pub mod twilio;

pub use inbound::InboundMessage;
pub use registry::{ChannelHandle, ChannelRegistry};
pub use twilio::{SmsChannel, TwilioClient, WhatsAppChannel};
