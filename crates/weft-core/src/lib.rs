//! Assistant engine, weighted multi-source retrieval, configuration and bootstrap.

pub mod assistant;
pub mod bootstrap;
pub mod config;
pub mod prompt;
pub mod rag;
pub mod registry;

pub use assistant::{Assistant, AssistantError, AssistantSpec, Fragment, Reply, ReplyStream};
pub use config::{Config, ConfigError};
pub use registry::{AssistantRegistry, RegistryError};
