//! Drove server — replica-set coordination, sharding state, and router
//! cursor federation for the Drove distributed document database.

pub mod balancer;
pub mod commands;
pub mod config;
pub mod distlock;
pub mod error;
pub mod network;
pub mod repl;
pub mod router;
pub mod sharding;

pub use commands::{Command, CommandContext, CommandRegistry, LockLevel, Services};
pub use config::NodeConfig;
pub use error::{CommandError, ErrorKind};

/// Installs the process-wide tracing subscriber, honoring `RUST_LOG`.
/// Call once from the embedding binary's main.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
