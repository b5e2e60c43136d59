//! Run outcomes and the run state machine.

use notifier::DeliveryError;
use serde::Serialize;
use thiserror::Error;

use crate::error::EngineError;

/// Why a run finished without reaching an `end` step.
///
/// Every variant is a reported, terminal state; none is raised as a fault.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    #[error("flow has no steps or no connections")]
    EmptyFlow,

    #[error("flow has no start step")]
    NoStart,

    #[error("start step has no outgoing connection")]
    NoOutgoingFromStart,

    /// A connection points at a step ID absent from the flow.
    #[error("connection points at unknown step '{step_id}'")]
    DanglingReference { step_id: String },

    /// The chain ended without an explicit `end` step.
    #[error("chain ended before reaching an end step")]
    ChainExhausted,

    #[error("walk revisited step '{step_id}'")]
    CycleDetected { step_id: String },

    /// The flow could not be indexed as a single chain.
    #[error("invalid flow: {0}")]
    InvalidFlow(EngineError),

    #[error("delivery failed at step '{step_id}': {error}")]
    DeliveryFailed { step_id: String, error: DeliveryError },

    #[error("run was cancelled")]
    Cancelled,

    /// The run's task died unexpectedly.
    #[error("run aborted: {0}")]
    Aborted(String),
}

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    ReachedEnd,
    Stopped(StopReason),
}

impl RunOutcome {
    pub fn reached_end(&self) -> bool {
        matches!(self, Self::ReachedEnd)
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        match self {
            Self::ReachedEnd => None,
            Self::Stopped(reason) => Some(reason),
        }
    }
}

impl From<StopReason> for RunOutcome {
    fn from(reason: StopReason) -> Self {
        Self::Stopped(reason)
    }
}

/// Observable progress of a run.
///
/// `NotStarted → Walking → Completed`; `Walking` is republished for each step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Walking { step_id: String },
    Completed { outcome: RunOutcome },
}

impl RunState {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
