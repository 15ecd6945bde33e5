use async_trait::async_trait;

use crate::error::TransportError;
use crate::models::{InboxMessage, SentMessage};

/// The two messaging primitives the correlator needs.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(
        &self,
        chat_id: i64,
        thread_id: Option<i32>,
        text: &str,
    ) -> Result<SentMessage, TransportError>;

    /// Most recent messages of a chat/thread, newest first.
    async fn recent_messages(
        &self,
        chat_id: i64,
        thread_id: Option<i32>,
        limit: usize,
    ) -> Result<Vec<InboxMessage>, TransportError>;
}
