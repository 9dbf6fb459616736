//! Council client
//!
//! Client for a multi-stage "council" backend: several models answer, rank
//! each other, and a chairman synthesizes a final response. Results stream
//! back over one chunked HTTP response and are reconstructed stage by stage.
//!
//! Layers, bottom up:
//! - [`protocol`]: `data: <json>` frame decoding and typed stage events
//! - [`state_machine`]: pure `(state, event) -> (state, effects)` transitions
//! - [`conversation`]: messages, optimistic exchanges, one stream per conversation
//! - [`directory`]: the summary list and active selection
//! - [`api`]: the HTTP transport
//! - [`runtime`]: the [`Council`] controller tying them together

pub mod api;
pub mod config;
pub mod conversation;
pub mod directory;
pub mod protocol;
pub mod runtime;
pub mod state_machine;

pub use api::{ApiError, CouncilApi, HttpTransport};
pub use config::{ClientConfig, ConfigError, Environment};
pub use conversation::{AssistantMessage, Conversation, Message, SessionId, UserMessage};
pub use directory::{ConversationDirectory, ConversationSummary};
pub use runtime::{Council, SendError, Update};
pub use state_machine::{LoadingFlags, Stage, StageState};

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install JSON logging filtered by `RUST_LOG`.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_logging() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "council_client=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .try_init()
}

/// Council talking to the configured backend over HTTP
///
/// # Errors
///
/// Returns [`ApiError::Config`] if the HTTP client cannot be built.
pub fn connect(config: ClientConfig) -> Result<Council<HttpTransport>, ApiError> {
    let transport = HttpTransport::new(config)?;
    tracing::info!(base_url = %transport.config().base_url, "Council client ready");
    Ok(Council::new(transport))
}
