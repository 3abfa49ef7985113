//! Generic LLM-role clients: planner, worker, embedder. Concrete vendor
//! wire formats never surface above this crate — every role is reached
//! through its trait, resolved to a plain OpenAI-compatible HTTP endpoint.

pub mod auth;
pub mod embedder;
pub mod error;
pub mod planner;
pub mod worker;

pub use embedder::{Embedder, HttpEmbedder};
pub use error::ProviderError;
pub use planner::{HttpPlannerClient, PlannerClient, PlannerError};
pub use worker::HttpWorkerClient;
