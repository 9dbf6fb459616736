//! API request and response types

use crate::conversation::Message;
use serde::{Deserialize, Serialize};

/// Body of the streaming send request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Response to creating a conversation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedConversation {
    pub id: String,
    pub created_at: String,
}

/// Full conversation with its messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub created_at: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}
