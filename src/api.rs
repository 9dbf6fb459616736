//! Council backend transport
//!
//! The only I/O boundary of the client: conversation CRUD and the streamed
//! send. Everything above this trait is testable with a scripted mock.

mod error;
mod http;
mod types;

pub use error::{status_error, ApiError, Operation};
pub use http::HttpTransport;
pub use types::*;

use crate::conversation::AssistantMessage;
use crate::directory::ConversationSummary;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;

/// Raw response body of a streamed send
pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

/// Requests the client makes against the council backend
#[async_trait]
pub trait CouncilApi: Send + Sync {
    /// `GET /api/conversations`
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError>;

    /// `POST /api/conversations`
    async fn create_conversation(&self) -> Result<CreatedConversation, ApiError>;

    /// `GET /api/conversations/{id}`
    async fn get_conversation(&self, id: &str) -> Result<ConversationRecord, ApiError>;

    /// `DELETE /api/conversations/{id}`
    async fn delete_conversation(&self, id: &str) -> Result<Value, ApiError>;

    /// `POST /api/conversations/{id}/message`
    ///
    /// Waits for all three stages and returns the finished answer.
    async fn send_message(
        &self,
        id: &str,
        request: &SendMessageRequest,
    ) -> Result<AssistantMessage, ApiError>;

    /// `POST /api/conversations/{id}/message/stream`
    ///
    /// Resolves once response headers arrive; the body is returned unread.
    async fn send_message_stream(
        &self,
        id: &str,
        request: &SendMessageRequest,
    ) -> Result<ByteStream, ApiError>;
}

// ============================================================================
// Arc implementation for shared clients
// ============================================================================

#[async_trait]
impl<T: CouncilApi + ?Sized> CouncilApi for Arc<T> {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        (**self).list_conversations().await
    }

    async fn create_conversation(&self) -> Result<CreatedConversation, ApiError> {
        (**self).create_conversation().await
    }

    async fn get_conversation(&self, id: &str) -> Result<ConversationRecord, ApiError> {
        (**self).get_conversation(id).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<Value, ApiError> {
        (**self).delete_conversation(id).await
    }

    async fn send_message(
        &self,
        id: &str,
        request: &SendMessageRequest,
    ) -> Result<AssistantMessage, ApiError> {
        (**self).send_message(id, request).await
    }

    async fn send_message_stream(
        &self,
        id: &str,
        request: &SendMessageRequest,
    ) -> Result<ByteStream, ApiError> {
        (**self).send_message_stream(id, request).await
    }
}
