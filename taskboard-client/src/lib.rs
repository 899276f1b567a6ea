/// Taskboard client: REST store, config loading, logging and CLI commands.
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod rest_store;

pub use cli::{Cli, Commands};
pub use error::ClientError;
pub use rest_store::RestStore;
