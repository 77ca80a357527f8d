pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand, ValueEnum};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "neon-provisioner")]
#[command(about = "Declarative provisioning for Neon projects, branches, endpoints, databases and roles")]
pub struct CliConfig {
    #[arg(long, short, default_value = "neon.toml")]
    pub config: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create or update every resource declared in the manifest
    Apply,
    /// Show what apply would change
    Plan,
    /// Delete every managed resource in reverse order
    Destroy,
    /// Create one declared resource
    Create { address: String },
    /// Refresh one resource from the API
    Read { address: String },
    /// Push the declared attributes of one resource
    Update { address: String },
    /// Delete one resource
    Delete { address: String },
    /// Bind an existing remote object to a declared address
    Import { address: String, id: String },
    /// Read a remote object by id without tracking it
    Lookup { kind: String, id: String },
    /// Print stored state
    Show { address: String },
}
