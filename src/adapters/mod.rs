//! Outbound integrations

mod webhook;

pub use webhook::WebhookSink;
