pub mod config;
pub mod core;
pub mod domain;
pub mod resources;
pub mod utils;

pub use config::cli::LocalStorage;
pub use config::toml_config::ProviderConfig;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::{client::ApiClient, engine::Reconciler, poll::PollPolicy};
pub use resources::ResourceRegistry;
pub use utils::error::{ProviderError, Result};
