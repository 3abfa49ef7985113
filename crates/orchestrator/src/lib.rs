//! Ties the conversation gate, scan pipeline, planner, approval manager,
//! and tool executor together into the task pipeline every channel (and
//! the routine engine) drives requests through.

pub mod context;
pub mod orchestrator;
pub mod provenance;

pub use context::ExecutionContext;
pub use orchestrator::{Orchestrator, StepResult, TaskResult};
pub use provenance::ProvenanceStore;
