//! Conversation state machine
//!
//! Owns the ordered message list of one conversation, the optimistic
//! user/assistant exchange of an in-flight send, and the guard that allows
//! at most one active stream per conversation.

use crate::api::ConversationRecord;
use crate::state_machine::{transition, Effect, Event, LoadingFlags, Stage, StageState, TransitionError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Messages
// ============================================================================

/// A message sent by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: String,
    /// Encoded image blobs, typically data URLs
    #[serde(default)]
    pub images: Vec<String>,
}

/// The council's answer, filled in stage by stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub stage1: Option<Value>,
    #[serde(default)]
    pub stage2: Option<Value>,
    #[serde(default)]
    pub stage3: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(skip, default = "StageState::settled")]
    pub state: StageState,
}

impl AssistantMessage {
    /// Empty message waiting on stage 1
    pub fn placeholder() -> Self {
        Self {
            stage1: None,
            stage2: None,
            stage3: None,
            metadata: None,
            state: StageState::pending(Stage::Stage1),
        }
    }

    pub fn loading(&self) -> LoadingFlags {
        self.state.loading()
    }

    pub fn stage(&self, stage: Stage) -> Option<&Value> {
        match stage {
            Stage::Stage1 => self.stage1.as_ref(),
            Stage::Stage2 => self.stage2.as_ref(),
            Stage::Stage3 => self.stage3.as_ref(),
        }
    }

    /// Whole-field replacement for message-targeted effects
    fn store(&mut self, effect: Effect) {
        match effect {
            Effect::StoreStage { stage, data } => {
                let field = match stage {
                    Stage::Stage1 => &mut self.stage1,
                    Stage::Stage2 => &mut self.stage2,
                    Stage::Stage3 => &mut self.stage3,
                };
                *field = Some(data);
            }
            Effect::StoreMetadata { metadata } => self.metadata = Some(metadata),
            Effect::RefreshDirectory | Effect::CloseSession | Effect::SurfaceError { .. } => {}
        }
    }
}

/// A conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
}

impl Message {
    pub fn user(content: impl Into<String>, images: Vec<String>) -> Self {
        Message::User(UserMessage {
            content: content.into(),
            images,
        })
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Message::Assistant(message) => Some(message),
            Message::User(_) => None,
        }
    }
}

// ============================================================================
// Stream sessions
// ============================================================================

/// Identifier of one streamed send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Addresses the assistant message a session writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub session: SessionId,
    pub conversation_id: String,
    pub message_index: usize,
}

/// What the transport-failure path did to the exchange
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFailure {
    /// Nothing had arrived yet; the optimistic pair was removed
    RolledBack,
    /// Partial data is kept; the message is marked interrupted
    Interrupted { effects: Vec<Effect> },
}

/// Bookkeeping for the optimistic exchange
#[derive(Debug, Clone, PartialEq)]
enum Exchange {
    Idle,
    /// A user message was appended, no stream yet
    Composing { start: usize },
    Streaming {
        start: usize,
        session: SessionId,
        message_index: usize,
        events_applied: usize,
    },
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("A response is still streaming in conversation {0}")]
    Busy(String),
    #[error("No pending exchange to roll back")]
    NothingToRollBack,
    #[error("Stream events already arrived; the exchange can no longer be rolled back")]
    ExchangeCommitted,
    #[error("Rejected stream event: {0}")]
    Transition(#[from] TransitionError),
}

// ============================================================================
// Conversation
// ============================================================================

/// One conversation's messages and stream state
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    created_at: String,
    title: Option<String>,
    messages: Vec<Message>,
    exchange: Exchange,
}

impl Conversation {
    pub fn new(id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.into(),
            title: None,
            messages: Vec::new(),
            exchange: Exchange::Idle,
        }
    }

    pub fn from_record(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            created_at: record.created_at,
            title: record.title,
            messages: record.messages,
            exchange: Exchange::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// A stream is active on this conversation
    pub fn is_busy(&self) -> bool {
        matches!(self.exchange, Exchange::Streaming { .. })
    }

    pub fn active_session(&self) -> Option<SessionId> {
        match self.exchange {
            Exchange::Streaming { session, .. } => Some(session),
            Exchange::Idle | Exchange::Composing { .. } => None,
        }
    }

    /// Append a user message; always succeeds
    pub fn append_user_message(&mut self, content: impl Into<String>, images: Vec<String>) -> usize {
        let index = self.messages.len();
        self.messages.push(Message::user(content, images));
        if self.exchange == Exchange::Idle {
            self.exchange = Exchange::Composing { start: index };
        }
        index
    }

    /// Append the assistant placeholder and open a stream session
    pub fn begin_assistant_stream(&mut self) -> Result<StreamHandle, ConversationError> {
        let start = match self.exchange {
            Exchange::Streaming { .. } => return Err(ConversationError::Busy(self.id.clone())),
            Exchange::Composing { start } => start,
            Exchange::Idle => self.messages.len(),
        };

        let message_index = self.messages.len();
        self.messages
            .push(Message::Assistant(AssistantMessage::placeholder()));

        let session = SessionId::new();
        self.exchange = Exchange::Streaming {
            start,
            session,
            message_index,
            events_applied: 0,
        };

        tracing::debug!(conv_id = %self.id, %session, message_index, "Stream session opened");

        Ok(StreamHandle {
            session,
            conversation_id: self.id.clone(),
            message_index,
        })
    }

    /// Apply one event to the streamed message.
    ///
    /// Returns the effects that concern the world outside this message. A
    /// session that is not the active one is ignored.
    pub fn apply_transition(
        &mut self,
        session: SessionId,
        event: Event,
    ) -> Result<Vec<Effect>, ConversationError> {
        let Exchange::Streaming {
            session: active,
            message_index,
            ref mut events_applied,
            ..
        } = self.exchange
        else {
            tracing::debug!(conv_id = %self.id, %session, "No active stream, ignoring event");
            return Ok(vec![]);
        };
        if active != session {
            tracing::debug!(conv_id = %self.id, %session, "Stale stream session, ignoring event");
            return Ok(vec![]);
        }
        *events_applied += 1;

        let Some(Message::Assistant(message)) = self.messages.get_mut(message_index) else {
            tracing::error!(conv_id = %self.id, message_index, "Streamed message is missing");
            self.exchange = Exchange::Idle;
            return Ok(vec![Effect::CloseSession]);
        };

        let result = transition(&message.state, event)?;
        message.state = result.new_state;

        let mut outward = Vec::new();
        for effect in result.effects {
            if effect.targets_message() {
                message.store(effect);
            } else {
                outward.push(effect);
            }
        }

        if outward.contains(&Effect::CloseSession) {
            tracing::debug!(conv_id = %self.id, %session, state = %message.state, "Stream session closed");
            self.exchange = Exchange::Idle;
        }

        Ok(outward)
    }

    /// Remove the optimistic exchange that has not received any event yet
    pub fn rollback_last_exchange(&mut self) -> Result<(), ConversationError> {
        let start = match self.exchange {
            Exchange::Idle => return Err(ConversationError::NothingToRollBack),
            Exchange::Streaming {
                events_applied, ..
            } if events_applied > 0 => return Err(ConversationError::ExchangeCommitted),
            Exchange::Composing { start } | Exchange::Streaming { start, .. } => start,
        };

        self.messages.truncate(start);
        self.exchange = Exchange::Idle;
        tracing::debug!(conv_id = %self.id, remaining = self.messages.len(), "Rolled back exchange");
        Ok(())
    }

    /// Transport-failure path for the active session
    pub fn fail_stream(
        &mut self,
        session: SessionId,
        reason: impl Into<String>,
    ) -> Result<StreamFailure, ConversationError> {
        match self.exchange {
            Exchange::Streaming {
                session: active,
                events_applied: 0,
                ..
            } if active == session => {
                self.rollback_last_exchange()?;
                Ok(StreamFailure::RolledBack)
            }
            _ => {
                let effects = self.apply_transition(
                    session,
                    Event::Disconnected {
                        reason: reason.into(),
                    },
                )?;
                Ok(StreamFailure::Interrupted { effects })
            }
        }
    }
}
