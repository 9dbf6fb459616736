//! Pure stage transition function
//!
//! Given the same state and event it always produces the same result, with
//! no I/O. Field writes and follow-up work are returned as effects.

use super::state::{AbortCause, Stage, StageState};
use super::{Effect, Event};
use crate::protocol::StageEvent;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: StageState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: StageState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("{event} is not valid while {state}")]
    OutOfOrder { state: &'static str, event: String },
    #[error("duplicate {event}")]
    Duplicate { event: String },
    #[error("stream already finished ({state}), ignoring {event}")]
    AlreadyFinished { state: &'static str, event: String },
}

/// Pure transition function
pub fn transition(state: &StageState, event: Event) -> Result<TransitionResult, TransitionError> {
    if let StageState::Aborted { .. } = state {
        return Err(TransitionError::AlreadyFinished {
            state: state.label(),
            event: event.name().to_string(),
        });
    }

    let event = match event {
        Event::Stream(event) => event,
        Event::Disconnected { reason } => return Ok(disconnect(state, reason)),
    };

    match (state, event) {
        // ============================================================
        // Stage starts
        // ============================================================
        (StageState::PendingStage1 { started: false }, StageEvent::Stage1Start) => {
            Ok(TransitionResult::new(StageState::PendingStage1 { started: true }))
        }
        (StageState::PendingStage2 { started: false }, StageEvent::Stage2Start) => {
            Ok(TransitionResult::new(StageState::PendingStage2 { started: true }))
        }
        (StageState::PendingStage3 { started: false }, StageEvent::Stage3Start) => {
            Ok(TransitionResult::new(StageState::PendingStage3 { started: true }))
        }
        (
            StageState::PendingStage1 { started: true },
            event @ StageEvent::Stage1Start,
        )
        | (
            StageState::PendingStage2 { started: true },
            event @ StageEvent::Stage2Start,
        )
        | (
            StageState::PendingStage3 { started: true },
            event @ StageEvent::Stage3Start,
        ) => Err(TransitionError::Duplicate {
            event: event.name().to_string(),
        }),

        // ============================================================
        // Stage completions: store data, next stage starts loading
        // ============================================================
        (StageState::PendingStage1 { .. }, StageEvent::Stage1Complete { data }) => Ok(
            TransitionResult::new(StageState::pending(Stage::Stage2))
                .with_effect(Effect::store_stage(Stage::Stage1, data)),
        ),
        (StageState::PendingStage2 { .. }, StageEvent::Stage2Complete { data, metadata }) => Ok(
            TransitionResult::new(StageState::pending(Stage::Stage3))
                .with_effect(Effect::store_stage(Stage::Stage2, data))
                .with_effect(Effect::StoreMetadata { metadata }),
        ),
        (StageState::PendingStage3 { .. }, StageEvent::Stage3Complete { data }) => Ok(
            TransitionResult::new(StageState::Settled)
                .with_effect(Effect::store_stage(Stage::Stage3, data)),
        ),

        // ============================================================
        // Directory notifications
        // ============================================================
        (state, StageEvent::TitleComplete) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::RefreshDirectory))
        }

        // ============================================================
        // Terminal events
        // ============================================================
        (StageState::Settled, StageEvent::Complete) => Ok(TransitionResult::new(StageState::Settled)
            .with_effects([Effect::CloseSession, Effect::RefreshDirectory])),

        // Backend finished before stage 3 settled
        (state, StageEvent::Complete) => {
            let during = state.pending_stage().unwrap_or(Stage::Stage3);
            Ok(TransitionResult::new(StageState::Aborted {
                cause: AbortCause::Interrupted { during },
            })
            .with_effects([Effect::CloseSession, Effect::RefreshDirectory]))
        }

        (_, StageEvent::Error { message }) => Ok(TransitionResult::new(StageState::Aborted {
            cause: AbortCause::Error {
                message: message.clone(),
            },
        })
        .with_effect(Effect::CloseSession)
        .with_effect(Effect::surface_error(message))),

        // ============================================================
        // Forward compatibility
        // ============================================================
        (state, StageEvent::Unrecognized { .. }) => Ok(TransitionResult::new(state.clone())),

        (state, event) => Err(TransitionError::OutOfOrder {
            state: state.label(),
            event: event.name().to_string(),
        }),
    }
}

fn disconnect(state: &StageState, reason: String) -> TransitionResult {
    match state.pending_stage() {
        Some(during) => TransitionResult::new(StageState::Aborted {
            cause: AbortCause::Interrupted { during },
        })
        .with_effect(Effect::CloseSession)
        .with_effect(Effect::surface_error(reason)),
        // All three stages arrived; only the closing `complete` is missing
        None => TransitionResult::new(state.clone())
            .with_effects([Effect::CloseSession, Effect::RefreshDirectory]),
    }
}
