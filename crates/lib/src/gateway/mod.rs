//! Webhook HTTP server and the per-message pipeline.

mod server;

pub use server::{run_gateway, ACK_BODY};
