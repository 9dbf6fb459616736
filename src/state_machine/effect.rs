//! Effects produced by stage transitions

use super::state::Stage;
use serde_json::Value;

/// Effects to be executed after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Replace one stage field of the streamed message
    StoreStage { stage: Stage, data: Value },

    /// Replace the metadata field of the streamed message
    StoreMetadata { metadata: Value },

    /// Re-fetch the conversation summary list
    RefreshDirectory,

    /// The stream session is over; clear the busy flag
    CloseSession,

    /// Show a failure to the user
    SurfaceError { message: String },
}

impl Effect {
    pub fn store_stage(stage: Stage, data: Value) -> Self {
        Effect::StoreStage { stage, data }
    }

    pub fn surface_error(message: impl Into<String>) -> Self {
        Effect::SurfaceError {
            message: message.into(),
        }
    }

    /// Effects that write into the streamed message itself
    pub fn targets_message(&self) -> bool {
        matches!(self, Effect::StoreStage { .. } | Effect::StoreMetadata { .. })
    }
}
