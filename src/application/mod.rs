//! Application layer - step orchestration.
//!
//! Coordinates the domain with the ports: locks a session, runs one step
//! through context resolution, prompt assembly, and provider invocation, and
//! records the outcome.

pub mod failure;
pub mod flow_engine;
pub mod llm_invoker;
pub mod session_locks;

pub use failure::{FailureKind, StepFailure};
pub use flow_engine::{
    ExecutionStatus, FlowEngine, FlowEngineConfig, StepDebugInfo, StepOutcome, StepTiming,
};
pub use llm_invoker::{InvocationError, InvocationOutcome, LlmInvoker, RetryPolicy};
pub use session_locks::{SessionGuard, SessionLocks};
