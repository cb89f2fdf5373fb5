//! subreg server binary
//!
//! Run with: subreg [--port 3513] [--bind 0.0.0.0] [--verbose]
//!
//! Clients subscribe with:
//!   printf accept | nc -q -1 <host> 3513

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use subreg::protocol::constants::DEFAULT_PORT;
use subreg::server::primary_interface_addr;
use subreg::{ListenerServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "subreg")]
#[command(about = "TCP control listener that tracks stream subscribers", long_about = None)]
struct Args {
    /// Control port
    #[arg(short, long, env = "SUBREG_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address (defaults to the primary outward-facing interface)
    #[arg(long, env = "SUBREG_BIND")]
    bind: Option<IpAddr>,

    /// Periodically log connections and subscribers
    #[arg(short, long, env = "SUBREG_VERBOSE")]
    verbose: bool,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "SUBREG_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Close connections idle for this many seconds (0 = never)
    #[arg(long, env = "SUBREG_IDLE_TIMEOUT_SECS", default_value_t = 300)]
    idle_timeout_secs: u64,

    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "SUBREG_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let ip = self.bind.unwrap_or_else(primary_interface_addr);

        let config = ServerConfig::with_addr(SocketAddr::new(ip, self.port))
            .max_connections(self.max_connections)
            .verbose(self.verbose);

        if self.idle_timeout_secs == 0 {
            config.disable_idle_timeout()
        } else {
            config.idle_timeout(Duration::from_secs(self.idle_timeout_secs))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .compact()
        .init();

    let config = args.server_config();
    tracing::info!(addr = %config.bind_addr, verbose = config.verbose, "Starting control server");

    let server = ListenerServer::bind(config).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await;

    Ok(())
}
