//! The tool executor: the handful of side-effecting actions a plan can
//! invoke (file I/O scoped to a workspace, a network fetch), each
//! returning provenance-tagged data with a tool-determined trust level.

pub mod error;
pub mod executor;
pub mod fetch;
pub mod file_ops;

pub use error::ToolError;
pub use executor::{SentinelToolExecutor, ToolExecutor};
