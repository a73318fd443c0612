use chrono::{DateTime, Utc};
use hierarchy_core::errors::{HierarchyError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage of a level request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Source,
    Initialize,
    PreProcess,
    Grouping,
    Finalize,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Source => "source",
            StageId::Initialize => "initialize",
            StageId::PreProcess => "pre_process",
            StageId::Grouping => "grouping",
            StageId::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Level request state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LevelRequestState {
    Queued {
        queued_at: DateTime<Utc>,
    },
    Running {
        started_at: DateTime<Utc>,
        current_stage: StageId,
    },
    Finalized {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
        nodes: usize,
    },
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error: String,
        error_category: String,
        failed_stage: StageId,
    },
}

impl LevelRequestState {
    pub fn state_name(&self) -> &'static str {
        match self {
            LevelRequestState::Queued { .. } => "queued",
            LevelRequestState::Running { .. } => "running",
            LevelRequestState::Finalized { .. } => "finalized",
            LevelRequestState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LevelRequestState::Finalized { .. } | LevelRequestState::Failed { .. }
        )
    }
}

/// One `get_nodes` call for one parent
#[derive(Debug, Clone)]
pub struct LevelRequest {
    pub id: Uuid,
    /// Display form of the parent key, `None` for the root level
    pub parent: Option<String>,
    pub state: LevelRequestState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LevelRequest {
    pub fn new_queued(id: Uuid, parent: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent,
            state: LevelRequestState::Queued { queued_at: now },
            created_at: now,
            updated_at: now,
        }
    }
}

fn invalid_transition(from: &LevelRequestState, to: &str) -> HierarchyError {
    HierarchyError::internal(format!(
        "invalid level request transition: {} -> {}",
        from.state_name(),
        to
    ))
}

/// Level request state machine for transitions
pub struct LevelRequestStateMachine {
    request: LevelRequest,
}

impl LevelRequestStateMachine {
    pub fn new(request: LevelRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &LevelRequest {
        &self.request
    }

    pub fn into_request(self) -> LevelRequest {
        self.request
    }

    pub fn current_stage(&self) -> Option<StageId> {
        match &self.request.state {
            LevelRequestState::Running { current_stage, .. } => Some(*current_stage),
            _ => None,
        }
    }

    /// Transition: QUEUED → RUNNING
    pub fn start(&mut self, stage: StageId) -> Result<()> {
        match &self.request.state {
            LevelRequestState::Queued { .. } => {
                let now = Utc::now();
                self.request.state = LevelRequestState::Running {
                    started_at: now,
                    current_stage: stage,
                };
                self.request.updated_at = now;
                Ok(())
            }
            other => Err(invalid_transition(other, "running")),
        }
    }

    /// Move a running request forward; stages never go back
    pub fn update_stage(&mut self, stage: StageId) -> Result<()> {
        match &mut self.request.state {
            LevelRequestState::Running { current_stage, .. } if *current_stage <= stage => {
                *current_stage = stage;
                self.request.updated_at = Utc::now();
                Ok(())
            }
            other => Err(invalid_transition(other, stage.as_str())),
        }
    }

    /// Transition: RUNNING → FINALIZED
    pub fn complete(&mut self, nodes: usize) -> Result<()> {
        match &self.request.state {
            LevelRequestState::Running { started_at, .. } => {
                let now = Utc::now();
                let duration_ms = (now - *started_at).num_milliseconds().max(0) as u64;
                self.request.state = LevelRequestState::Finalized {
                    started_at: *started_at,
                    finished_at: now,
                    duration_ms,
                    nodes,
                };
                self.request.updated_at = now;
                Ok(())
            }
            other => Err(invalid_transition(other, "finalized")),
        }
    }

    /// Transition: RUNNING → FAILED, at the current stage
    pub fn fail(&mut self, error: &HierarchyError) -> Result<()> {
        match &self.request.state {
            LevelRequestState::Running {
                started_at,
                current_stage,
            } => {
                let now = Utc::now();
                self.request.state = LevelRequestState::Failed {
                    started_at: *started_at,
                    failed_at: now,
                    error: error.to_string(),
                    error_category: error.category().to_string(),
                    failed_stage: *current_stage,
                };
                self.request.updated_at = now;
                Ok(())
            }
            other => Err(invalid_transition(other, "failed")),
        }
    }
}
