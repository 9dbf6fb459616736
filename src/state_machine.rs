//! Assistant message state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: each
//! streamed event maps the previous stage state to a new one plus effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{AbortCause, LoadingFlags, Stage, StageState};
pub use transition::{transition, TransitionError, TransitionResult};
