//! Events that drive an assistant message

use crate::protocol::StageEvent;

/// Events that trigger stage transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A record decoded from the stream body
    Stream(StageEvent),
    /// The byte stream ended or failed without a terminal event
    Disconnected { reason: String },
}

impl Event {
    pub fn name(&self) -> &str {
        match self {
            Event::Stream(event) => event.name(),
            Event::Disconnected { .. } => "disconnected",
        }
    }
}

impl From<StageEvent> for Event {
    fn from(event: StageEvent) -> Self {
        Event::Stream(event)
    }
}
