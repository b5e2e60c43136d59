//! Engine-level error types.

use serde::Serialize;
use thiserror::Error;

/// Structural problems in a flow definition.
///
/// These are never raised out of a run: the executor turns them into a
/// [`crate::StopReason`].  Callers that want to reject a flow up front use
/// [`crate::validate_flow`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    /// Two or more steps share the same ID.
    #[error("duplicate step ID: '{step_id}'")]
    DuplicateStepId { step_id: String },

    /// A step has more than one outgoing connection.
    #[error("step '{step_id}' has {count} outgoing connections; at most one is allowed")]
    MultipleOutgoing { step_id: String, count: usize },

    /// More than one step is of kind `start`.
    #[error("flow has {count} start steps; exactly one is required")]
    MultipleStarts { count: usize },

    /// No step is of kind `start`.
    #[error("flow has no start step")]
    MissingStart,

    /// A connection references a step ID that doesn't exist in the flow.
    #[error("connection references unknown step '{step_id}' ({side} side)")]
    UnknownStepReference { step_id: String, side: &'static str },

    /// Walking the chain from start revisits a step.
    #[error("flow contains a cycle through step '{step_id}'")]
    Cycle { step_id: String },
}
