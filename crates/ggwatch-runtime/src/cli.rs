//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use ggwatch_core::threshold::AlertPolicy;

#[derive(Parser)]
#[command(name = "ggwatch", about = "fortnite.gg player-count alerts")]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/ggwatch/ggwatchd.sock)
    #[arg(long, short = 's', global = true, env = "GGWATCH_SOCKET")]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (poll loop + UDS server)
    Daemon(DaemonOpts),
    /// Send one JSON-RPC request to the daemon and print the result
    Call(CallOpts),
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Seconds between poll cycles
    #[arg(long, default_value = "60", env = "GGWATCH_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: u64,

    /// Per-request timeout for upstream fetches, in seconds
    #[arg(long, default_value = "10", env = "GGWATCH_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: u64,

    /// SQLite database file (default: $XDG_DATA_HOME/ggwatch/ggwatch.db)
    #[arg(long, env = "GGWATCH_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// JSON catalog served by the bundled provider
    #[arg(long, env = "GGWATCH_CATALOG")]
    pub catalog: PathBuf,

    /// What happens to a subscription after it fires
    #[arg(long, value_enum, default_value_t = PolicyArg::Rearm, env = "GGWATCH_ALERT_POLICY")]
    pub alert_policy: PolicyArg,

    /// Banner image URL for the home screen
    #[arg(long, env = "GGWATCH_BANNER")]
    pub banner: Option<String>,
}

#[derive(clap::Args)]
pub struct CallOpts {
    /// Method name: action, list_subscriptions, list_targets, status
    pub method: String,

    /// Params as a JSON object
    pub params: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Re-arm once the count drops below the threshold
    Rearm,
    /// Delete the subscription after it fires
    OneShot,
}

impl From<PolicyArg> for AlertPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Rearm => AlertPolicy::Rearm,
            PolicyArg::OneShot => AlertPolicy::OneShot,
        }
    }
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/ggwatch/ggwatchd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/ggwatch-{user}/ggwatchd.sock")
}

/// Default database path under the XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(dir).join("ggwatch").join("ggwatch.db");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("ggwatch")
        .join("ggwatch.db")
}
