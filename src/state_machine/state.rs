//! Assistant message stage state

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three council phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Individual responses
    Stage1,
    /// Peer rankings
    Stage2,
    /// Final synthesis
    Stage3,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Stage1, Stage::Stage2, Stage::Stage3];

    pub fn number(self) -> u8 {
        match self {
            Stage::Stage1 => 1,
            Stage::Stage2 => 2,
            Stage::Stage3 => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage{}", self.number())
    }
}

/// Which stage is actively streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadingFlags {
    pub stage1: bool,
    pub stage2: bool,
    pub stage3: bool,
}

impl LoadingFlags {
    #[must_use]
    pub fn only(stage: Stage) -> Self {
        let mut flags = Self::default();
        match stage {
            Stage::Stage1 => flags.stage1 = true,
            Stage::Stage2 => flags.stage2 = true,
            Stage::Stage3 => flags.stage3 = true,
        }
        flags
    }

    pub fn is_loading(self, stage: Stage) -> bool {
        match stage {
            Stage::Stage1 => self.stage1,
            Stage::Stage2 => self.stage2,
            Stage::Stage3 => self.stage3,
        }
    }

    pub fn any(self) -> bool {
        self.stage1 || self.stage2 || self.stage3
    }

    pub fn count(self) -> usize {
        Stage::ALL.iter().filter(|s| self.is_loading(**s)).count()
    }
}

/// Why a streamed message stopped before settling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbortCause {
    /// The backend sent an `error` event
    Error { message: String },
    /// The stream went away while `during` was still running
    Interrupted { during: Stage },
}

/// Lifecycle of one assistant message
///
/// `started` records whether the stage's `_start` event has been seen, so a
/// duplicate start is detectable. The stage is considered loading either way:
/// the previous stage's completion already announced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageState {
    PendingStage1 { started: bool },
    PendingStage2 { started: bool },
    PendingStage3 { started: bool },
    /// All three stages delivered
    Settled,
    /// Stopped early; partial stage data is kept
    Aborted { cause: AbortCause },
}

impl Default for StageState {
    fn default() -> Self {
        StageState::PendingStage1 { started: false }
    }
}

impl StageState {
    /// State of a message loaded from the backend
    pub fn settled() -> Self {
        StageState::Settled
    }

    pub fn pending(stage: Stage) -> Self {
        match stage {
            Stage::Stage1 => StageState::PendingStage1 { started: false },
            Stage::Stage2 => StageState::PendingStage2 { started: false },
            Stage::Stage3 => StageState::PendingStage3 { started: false },
        }
    }

    /// The stage this message is waiting on, if any
    pub fn pending_stage(&self) -> Option<Stage> {
        match self {
            StageState::PendingStage1 { .. } => Some(Stage::Stage1),
            StageState::PendingStage2 { .. } => Some(Stage::Stage2),
            StageState::PendingStage3 { .. } => Some(Stage::Stage3),
            StageState::Settled | StageState::Aborted { .. } => None,
        }
    }

    pub fn loading(&self) -> LoadingFlags {
        match self {
            StageState::Aborted {
                cause: AbortCause::Interrupted { during },
            } => LoadingFlags::only(*during),
            _ => self
                .pending_stage()
                .map(LoadingFlags::only)
                .unwrap_or_default(),
        }
    }

    /// Stage data will not change anymore
    pub fn is_final(&self) -> bool {
        matches!(self, StageState::Settled | StageState::Aborted { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageState::PendingStage1 { .. } => "pending_stage1",
            StageState::PendingStage2 { .. } => "pending_stage2",
            StageState::PendingStage3 { .. } => "pending_stage3",
            StageState::Settled => "settled",
            StageState::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
