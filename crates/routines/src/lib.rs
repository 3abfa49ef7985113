//! Routine engine: cron/interval/event-triggered recurring task execution.
//!
//! A routine is a standing instruction ("every morning, summarize my
//! inbox") that re-enters the same task pipeline a live request would,
//! through the [`engine::TaskHandler`] seam — routines never bypass
//! scanning, conversation analysis, or approval.

pub mod cron;
pub mod engine;
pub mod store;

pub use cron::{cron_matches, cron_next, cron_next_tz, parse_tz, validate_cron, validate_trigger_config};
pub use engine::{RoutineEngine, RoutineEngineConfig, TaskHandler};
pub use store::RoutineStore;
