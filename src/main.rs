//! IdP gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     IDP GATEWAY                      │
//!                     │                                                      │
//!   POST /auth/login  │  ┌────────┐   ┌──────────────┐   ┌────────────────┐  │
//!  ───────────────────┼─▶│  http  │──▶│ login_guard  │──▶│   idp client   │──┼──▶ IdP token
//!                     │  │ server │   └──────────────┘   │ retry+breaker  │  │    endpoint
//!                     │  │        │                      │  + fallback    │  │
//!   GET /auth/me      │  │        │   ┌──────────────┐   └───────▲────────┘  │
//!  ───────────────────┼─▶│        │──▶│token verifier│           │           │
//!                     │  └────────┘   └──────┬───────┘   ┌───────┴────────┐  │
//!                     │                      └──────────▶│ key-set cache  │──┼──▶ IdP JWKS
//!                     │                                  └────────────────┘  │    endpoint
//!                     │  ┌────────────────────────────────────────────────┐  │
//!                     │  │  config · observability · lifecycle · security │  │
//!                     │  └────────────────────────────────────────────────┘  │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use idp_gateway::config::{load_config, GatewayConfig};
use idp_gateway::lifecycle::{self, signals, Shutdown};
use idp_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "idp-gateway")]
#[command(about = "Resilient identity provider gateway", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for in-flight requests on shutdown.
    #[arg(long, default_value_t = 10)]
    drain_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "idp-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        token_url = %config.idp.token_url,
        jwks_url = %config.idp.jwks_url,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let running = lifecycle::start(config, &shutdown).await?;

    signals::shutdown_on_signal(shutdown.clone()).await;

    if !running.stopped(Duration::from_secs(args.drain_secs)).await {
        tracing::warn!("Forced shutdown");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
