//! Council runtime
//!
//! Wires the directory, the loaded conversations and the live stream
//! sessions together. The owner drives it through `&mut self`: user actions
//! are async methods, stream progress is pulled with [`Council::next_update`].

mod session;


pub use session::{SessionMessage, SessionPayload};

use crate::api::{ApiError, CouncilApi, SendMessageRequest};
use crate::conversation::{Conversation, ConversationError, SessionId, StreamFailure};
use crate::directory::{ConversationDirectory, ConversationSummary, Removal};
use crate::protocol::StageEvent;
use crate::state_machine::{Effect, Event};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Shown when a body ends before the terminal event
const STREAM_ENDED_EARLY: &str = "Stream ended before the response completed";

/// Observable result of processing stream input
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// The streamed message changed
    MessageUpdated {
        conversation_id: String,
        message_index: usize,
    },
    /// The session closed normally
    Finished { conversation_id: String },
    /// The session ended with an error shown to the user
    Failed {
        conversation_id: String,
        message: String,
        rolled_back: bool,
    },
}

impl Update {
    pub fn conversation_id(&self) -> &str {
        match self {
            Update::MessageUpdated {
                conversation_id, ..
            }
            | Update::Finished { conversation_id }
            | Update::Failed {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("No conversation is selected")]
    NoActiveConversation,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Conversation {0} is not loaded")]
    NotLoaded(String),
    #[error("A response is still streaming in conversation {0}")]
    Busy(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

/// Where a live session writes
#[derive(Debug, Clone)]
struct LiveSession {
    conversation_id: String,
    message_index: usize,
}

/// Client-side controller for the council backend
pub struct Council<A: CouncilApi> {
    api: A,
    directory: ConversationDirectory,
    conversations: HashMap<String, Conversation>,
    sessions: HashMap<SessionId, LiveSession>,
    session_tx: mpsc::UnboundedSender<SessionMessage>,
    session_rx: mpsc::UnboundedReceiver<SessionMessage>,
}

impl<A: CouncilApi> Council<A> {
    pub fn new(api: A) -> Self {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        Self {
            api,
            directory: ConversationDirectory::new(),
            conversations: HashMap::new(),
            sessions: HashMap::new(),
            session_tx,
            session_rx,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.directory
            .active()
            .and_then(|id| self.conversations.get(id))
    }

    /// Number of streams still being read
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    // ------------------------------------------------------------------------
    // Directory operations
    // ------------------------------------------------------------------------

    /// Fetch the summary list
    pub async fn load_conversations(&mut self) -> Result<(), ApiError> {
        let summaries = self.api.list_conversations().await?;
        tracing::debug!(count = summaries.len(), "Loaded conversations");
        self.reconcile_directory(summaries).await;
        Ok(())
    }

    /// Create a conversation, list it first and select it
    pub async fn new_conversation(&mut self) -> Result<String, ApiError> {
        let created = self.api.create_conversation().await?;
        tracing::info!(conv_id = %created.id, "Created conversation");

        self.directory
            .insert_front(ConversationSummary::new(&created.id, &created.created_at));
        self.conversations.insert(
            created.id.clone(),
            Conversation::new(&created.id, &created.created_at),
        );
        self.directory.select(&created.id);
        Ok(created.id)
    }

    /// Select a conversation, fetching its messages.
    ///
    /// A conversation with a live stream keeps its local copy.
    pub async fn select_conversation(&mut self, id: &str) -> Result<(), ApiError> {
        let busy = self.conversations.get(id).is_some_and(Conversation::is_busy);
        if busy {
            tracing::debug!(conv_id = %id, "Conversation is streaming, keeping local copy");
        } else {
            self.fetch_conversation(id).await?;
        }

        if !self.directory.select(id) {
            // Not listed yet; the next refresh places it
            if let Some(conversation) = self.conversations.get(id) {
                let mut summary = ConversationSummary::new(id, conversation.created_at());
                summary.message_count = conversation.messages().len();
                summary.title = conversation.title().map(str::to_string);
                self.directory.insert_front(summary);
                self.directory.select(id);
            }
        }
        Ok(())
    }

    /// Delete a conversation. Deleting the active one selects the front
    /// entry and loads it.
    pub async fn delete_conversation(&mut self, id: &str) -> Result<Removal, ApiError> {
        self.api.delete_conversation(id).await?;
        tracing::info!(conv_id = %id, "Deleted conversation");

        self.conversations.remove(id);
        self.sessions
            .retain(|_, session| session.conversation_id != id);
        let removal = self.directory.remove(id);

        if removal.selection_changed {
            if let Some(next) = removal.active.as_deref() {
                if let Err(e) = self.fetch_conversation(next).await {
                    tracing::warn!(conv_id = %next, error = %e, "Failed to load next conversation");
                }
            }
        }
        Ok(removal)
    }

    async fn fetch_conversation(&mut self, id: &str) -> Result<(), ApiError> {
        let record = self.api.get_conversation(id).await?;
        tracing::debug!(conv_id = %id, messages = record.messages.len(), "Fetched conversation");
        self.conversations
            .insert(id.to_string(), Conversation::from_record(record));
        Ok(())
    }

    async fn refresh_directory(&mut self) {
        match self.api.list_conversations().await {
            Ok(summaries) => self.reconcile_directory(summaries).await,
            Err(e) => tracing::warn!(error = %e, "Failed to refresh conversations"),
        }
    }

    /// Replace the listing; a selection that moved is loaded like one moved
    /// by deletion
    async fn reconcile_directory(&mut self, summaries: Vec<ConversationSummary>) {
        if !self.directory.replace_all(summaries) {
            return;
        }
        tracing::info!(active = ?self.directory.active(), "Active conversation no longer listed");

        let Some(next) = self.directory.active().map(str::to_string) else {
            return;
        };
        if self.conversations.contains_key(&next) {
            return;
        }
        if let Err(e) = self.fetch_conversation(&next).await {
            tracing::warn!(conv_id = %next, error = %e, "Failed to load next conversation");
        }
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Send a message to the active conversation and start streaming the
    /// council's answer into it
    pub async fn send_message(
        &mut self,
        content: impl Into<String>,
        images: Vec<String>,
    ) -> Result<SessionId, SendError> {
        let content = content.into();
        let conversation_id = self
            .directory
            .active()
            .ok_or(SendError::NoActiveConversation)?
            .to_string();
        if content.trim().is_empty() && images.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| SendError::NotLoaded(conversation_id.clone()))?;
        if conversation.is_busy() {
            return Err(SendError::Busy(conversation_id));
        }

        conversation.append_user_message(content.clone(), images.clone());
        let handle = conversation.begin_assistant_stream()?;

        let request = SendMessageRequest { content, images };
        let body = match self
            .api
            .send_message_stream(&conversation_id, &request)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(conv_id = %conversation_id, error = %e, "Failed to open stream");
                if let Err(rollback) = conversation.rollback_last_exchange() {
                    tracing::error!(conv_id = %conversation_id, error = %rollback, "Rollback failed");
                }
                return Err(SendError::Api(e));
            }
        };

        tracing::info!(conv_id = %conversation_id, session = %handle.session, "Streaming response");
        self.sessions.insert(
            handle.session,
            LiveSession {
                conversation_id,
                message_index: handle.message_index,
            },
        );
        session::spawn_reader(handle.session, body, self.session_tx.clone());
        Ok(handle.session)
    }

    // ------------------------------------------------------------------------
    // Stream progress
    // ------------------------------------------------------------------------

    /// Process session input until something observable happens.
    ///
    /// Returns `None` once no session is live.
    pub async fn next_update(&mut self) -> Option<Update> {
        loop {
            if self.sessions.is_empty() {
                return None;
            }
            // The council holds a sender, so the channel never closes here
            let message = self.session_rx.recv().await?;
            if let Some(update) = self.handle_session_message(message).await {
                return Some(update);
            }
        }
    }

    /// Drain updates until every session has ended
    pub async fn run_until_idle(&mut self) -> Vec<Update> {
        let mut updates = Vec::new();
        while let Some(update) = self.next_update().await {
            updates.push(update);
        }
        updates
    }

    async fn handle_session_message(&mut self, message: SessionMessage) -> Option<Update> {
        let SessionMessage { session, payload } = message;
        let Some(live) = self.sessions.get(&session).cloned() else {
            tracing::debug!(%session, "Message for ended session, ignoring");
            return None;
        };
        let Some(conversation) = self.conversations.get_mut(&live.conversation_id) else {
            tracing::debug!(%session, conv_id = %live.conversation_id, "Conversation gone, dropping session");
            self.sessions.remove(&session);
            return None;
        };

        match payload {
            SessionPayload::Record(record) => {
                let event = StageEvent::from_record(record);
                if let StageEvent::Unrecognized { event_type } = &event {
                    tracing::debug!(%session, %event_type, "Ignoring unrecognized event");
                }

                match conversation.apply_transition(session, Event::Stream(event)) {
                    Ok(effects) => Some(self.execute_effects(session, live, effects).await),
                    Err(e) => {
                        tracing::warn!(%session, conv_id = %live.conversation_id, error = %e, "Dropping stream event");
                        None
                    }
                }
            }
            SessionPayload::Closed => self.fail_session(session, live, STREAM_ENDED_EARLY).await,
            SessionPayload::Failed(e) => self.fail_session(session, live, &e.to_string()).await,
        }
    }

    async fn fail_session(
        &mut self,
        session: SessionId,
        live: LiveSession,
        reason: &str,
    ) -> Option<Update> {
        let conversation = self.conversations.get_mut(&live.conversation_id)?;
        match conversation.fail_stream(session, reason) {
            Ok(StreamFailure::RolledBack) => {
                tracing::warn!(%session, conv_id = %live.conversation_id, %reason, "Stream failed before any event");
                self.sessions.remove(&session);
                Some(Update::Failed {
                    conversation_id: live.conversation_id,
                    message: reason.to_string(),
                    rolled_back: true,
                })
            }
            Ok(StreamFailure::Interrupted { effects }) => {
                tracing::warn!(%session, conv_id = %live.conversation_id, %reason, "Stream ended without a terminal event");
                Some(self.execute_effects(session, live, effects).await)
            }
            Err(e) => {
                tracing::error!(%session, conv_id = %live.conversation_id, error = %e, "Failed to close stream");
                self.sessions.remove(&session);
                Some(Update::Failed {
                    conversation_id: live.conversation_id,
                    message: reason.to_string(),
                    rolled_back: false,
                })
            }
        }
    }

    async fn execute_effects(
        &mut self,
        session: SessionId,
        live: LiveSession,
        effects: Vec<Effect>,
    ) -> Update {
        let mut closed = false;
        let mut error = None;

        for effect in effects {
            match effect {
                Effect::RefreshDirectory => self.refresh_directory().await,
                Effect::CloseSession => {
                    self.sessions.remove(&session);
                    closed = true;
                }
                Effect::SurfaceError { message } => error = Some(message),
                // Already written into the message
                Effect::StoreStage { .. } | Effect::StoreMetadata { .. } => {}
            }
        }

        match (error, closed) {
            (Some(message), _) => Update::Failed {
                conversation_id: live.conversation_id,
                message,
                rolled_back: false,
            },
            (None, true) => Update::Finished {
                conversation_id: live.conversation_id,
            },
            (None, false) => Update::MessageUpdated {
                conversation_id: live.conversation_id,
                message_index: live.message_index,
            },
        }
    }
}
