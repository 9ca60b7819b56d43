use serde::Serialize;

use crate::module::ModuleId;

/// Phase of one runnable application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Stopped | Phase::Failed)
    }

    /// Only a running application can be stopped.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }
}

/// What the orchestrator knows about one application.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleRecord {
    pub id: ModuleId,
    pub phase: Phase,
    pub last_error: Option<String>,
}

impl LifecycleRecord {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            phase: Phase::Pending,
            last_error: None,
        }
    }

    /// Moves to `next` if allowed. Returns whether the phase changed.
    pub fn advance(&mut self, next: Phase) -> bool {
        if !self.phase.can_transition_to(next) {
            return false;
        }
        self.phase = next;
        true
    }

    pub fn fail(&mut self, error: &anyhow::Error) -> bool {
        let changed = self.advance(Phase::Failed);
        if changed {
            self.last_error = Some(format!("{error:#}"));
        }
        changed
    }
}
