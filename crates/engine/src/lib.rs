//! `engine` crate — flow model, chain validation, and the execution engine.

pub mod models;
pub mod error;
pub mod chain;
pub mod delay;
pub mod outcome;
pub mod timer;
pub mod executor;

pub use models::{
    ActionPayload, Connection, DelayMode, DelayPayload, DelayUnit, FlowModel, RunContext, Step,
    StepKind,
};
pub use error::EngineError;
pub use chain::{validate_flow, ChainIndex};
pub use delay::compute_delay;
pub use outcome::{RunOutcome, RunState, StopReason};
pub use timer::{ManualTimer, Timer, TokioTimer};
pub use executor::{ExecutorConfig, FlowExecutor, RunHandle};

#[cfg(test)]
mod executor_tests;
