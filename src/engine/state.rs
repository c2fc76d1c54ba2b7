use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Pipeline execution states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Initializing,
    Running {
        #[serde(skip)]
        start_time: Option<Instant>,
    },
    Completed {
        #[serde(skip)]
        duration: Option<Duration>,
    },
    /// Stopped by `cancel` before every process completed
    Cancelled,
    Error {
        error_msg: String,
    },
}

impl PipelineState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Idle, Initializing) |

            (Initializing, Running { .. }) |
            (Initializing, Error { .. }) |

            (Running { .. }, Completed { .. }) |
            (Running { .. }, Cancelled) |
            (Running { .. }, Error { .. })
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Cancelled | Self::Error { .. }
        )
    }

    /// Get human-readable state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Initializing => "Initializing",
            Self::Running { .. } => "Running",
            Self::Completed { .. } => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Error { .. } => "Error",
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Lifecycle of a single process. Strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Created,
    Configured,
    Initialized,
    Running,
    Completed,
}

impl ProcessState {
    pub fn can_transition_to(&self, target: ProcessState) -> bool {
        use ProcessState::*;

        matches!(
            (self, target),
            (Created, Configured)
                | (Configured, Initialized)
                | (Initialized, Running)
                | (Running, Completed)
                // a process that fails before running is still finished
                | (Configured, Completed)
                | (Initialized, Completed)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Configured => "Configured",
            Self::Initialized => "Initialized",
            Self::Running => "Running",
            Self::Completed => "Completed",
        }
    }
}
