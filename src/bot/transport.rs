//! Outbound side of the chat transport.

use crate::bot::Menu;
use crate::error::AppError;
use crate::services::portal::FileBlob;
use async_trait::async_trait;

/// Something the bot sends to a chat.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Document(FileBlob),
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text(text.into())
    }
}

/// Chat delivery. `Ok` means the chat service accepted the message.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, chat_id: i64, message: OutboundMessage, menu: Menu) -> Result<(), AppError>;

    /// Delete a message from the chat (e.g. one that contained a password).
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), AppError>;

    /// Stop the loading indicator on an inline button.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), AppError>;
}
