//! Infrastructure layer: persistence, object storage, the worker client,
//! configuration, and the orchestration services built on top of them.

pub mod config;
pub mod inspect;
pub mod orchestrator;
pub mod storage;
pub mod store;
pub mod worker;

pub use config::{AppConfig, ConfigError};
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorSettings};
