//! Server configuration.
//!
//! Everything is settable from the command line or from `ATRIUM_*`
//! environment variables (a `.env` file is honored via dotenvy in main).

use clap::Parser;
use std::path::PathBuf;

/// Atrium workspace server.
#[derive(Debug, Clone, Parser)]
#[command(name = "atrium", version, about)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "ATRIUM_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "ATRIUM_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Workspace root directory served by the file API and used as the
    /// working directory for new terminals
    #[arg(long, env = "ATRIUM_WORKSPACE", default_value = ".")]
    pub workspace: PathBuf,

    /// Shell binary for terminal sessions (defaults to $SHELL, then
    /// /bin/bash)
    #[arg(long, env = "ATRIUM_SHELL")]
    pub shell: Option<String>,

    /// Maximum concurrently live terminal sessions
    #[arg(long, env = "ATRIUM_MAX_TERMINALS", default_value_t = 32)]
    pub max_terminals: usize,

    /// Seconds between host metrics samples
    #[arg(long, env = "ATRIUM_METRICS_INTERVAL_SECS", default_value_t = 5)]
    pub metrics_interval_secs: u64,

    /// Completion delay of the simulated AI/deployment executor
    #[arg(long, env = "ATRIUM_TASK_DELAY_SECS", default_value_t = 5)]
    pub task_delay_secs: u64,
}

impl ServerConfig {
    /// Shell to spawn, after fallbacks.
    #[must_use]
    pub fn resolved_shell(&self) -> String {
        self.shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| "/bin/bash".to_string())
    }
}
