pub mod config;
pub mod data;
pub mod error;

pub use config::Config;
pub use data::{
    ActionConfig, ApprovalStatus, ConversationTurn, DataSource, ExecutionStatus, OutputFormat,
    PendingApproval, Plan, PlanStep, PipelineScanResult, ResultStatus, Routine, RoutineExecution,
    ScanMatch, ScanResult, Session, StepType, TaggedData, ToolDescription, TriggerType, TrustLevel,
};
pub use error::{Error, Result};
