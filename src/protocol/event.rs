//! Typed stage events
//!
//! Closed mapping from wire event types to the events the stage state
//! machine understands. Unknown types are kept as `Unrecognized` so newer
//! backends do not break older clients.

use super::frame::EventRecord;
use serde_json::Value;

const UNKNOWN_ERROR: &str = "Unknown error";

/// Event emitted by the council backend during one streamed exchange
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Stage1Start,
    Stage1Complete {
        data: Value,
    },
    Stage2Start,
    Stage2Complete {
        data: Value,
        /// Opinion-aggregation data (e.g. `label_to_model`)
        metadata: Value,
    },
    Stage3Start,
    Stage3Complete {
        data: Value,
    },
    /// The backend finished generating the conversation title
    TitleComplete,
    /// Terminal: the exchange finished
    Complete,
    /// Terminal: the backend reported a failure
    Error {
        message: String,
    },
    Unrecognized {
        event_type: String,
    },
}

impl StageEvent {
    /// Interpret a decoded record
    #[must_use]
    pub fn from_record(record: EventRecord) -> Self {
        let EventRecord {
            event_type,
            mut payload,
        } = record;

        match event_type.as_str() {
            "stage1_start" => StageEvent::Stage1Start,
            "stage1_complete" => StageEvent::Stage1Complete {
                data: take_field(&mut payload, "data"),
            },
            "stage2_start" => StageEvent::Stage2Start,
            "stage2_complete" => StageEvent::Stage2Complete {
                data: take_field(&mut payload, "data"),
                metadata: take_field(&mut payload, "metadata"),
            },
            "stage3_start" => StageEvent::Stage3Start,
            "stage3_complete" => StageEvent::Stage3Complete {
                data: take_field(&mut payload, "data"),
            },
            "title_complete" => StageEvent::TitleComplete,
            "complete" => StageEvent::Complete,
            "error" => StageEvent::Error {
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_ERROR)
                    .to_string(),
            },
            _ => StageEvent::Unrecognized { event_type },
        }
    }

    /// Wire name of the event
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            StageEvent::Stage1Start => "stage1_start",
            StageEvent::Stage1Complete { .. } => "stage1_complete",
            StageEvent::Stage2Start => "stage2_start",
            StageEvent::Stage2Complete { .. } => "stage2_complete",
            StageEvent::Stage3Start => "stage3_start",
            StageEvent::Stage3Complete { .. } => "stage3_complete",
            StageEvent::TitleComplete => "title_complete",
            StageEvent::Complete => "complete",
            StageEvent::Error { .. } => "error",
            StageEvent::Unrecognized { event_type } => event_type,
        }
    }

    /// `complete` and `error` end a stream session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageEvent::Complete | StageEvent::Error { .. })
    }
}

fn take_field(payload: &mut Value, key: &str) -> Value {
    payload
        .as_object_mut()
        .and_then(|fields| fields.remove(key))
        .unwrap_or(Value::Null)
}
