//! Council stream protocol
//!
//! Decoding of the chunked `data: <json>` response body into typed events.

pub mod event;
pub mod frame;

#[cfg(test)]
mod proptests;

pub use event::StageEvent;
pub use frame::{decode_frames, EventRecord, FrameDecoder, FrameError, DATA_PREFIX};
