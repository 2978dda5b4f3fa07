//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the gateway (IdP client, key cache, verifier, guard)
//! - Start background tasks (sweeper)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener starts last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, GatewayConfig};
use crate::gateway::{AuthGateway, GatewayBuildError};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::drain;
use crate::lifecycle::sweeper::Sweeper;
use crate::lifecycle::Shutdown;
use crate::security::RequestThrottle;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] GatewayBuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// A started gateway and its background tasks.
pub struct RunningGateway {
    local_addr: SocketAddr,
    gateway: Arc<AuthGateway>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningGateway {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn gateway(&self) -> &Arc<AuthGateway> {
        &self.gateway
    }

    /// Wait for every task to stop after shutdown was triggered.
    pub async fn stopped(self, deadline: Duration) -> bool {
        drain(self.tasks, deadline).await
    }
}

/// Build and start everything `config` describes.
pub async fn start(
    config: GatewayConfig,
    shutdown: &Shutdown,
) -> Result<RunningGateway, StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    let gateway = Arc::new(AuthGateway::from_config(&config)?);
    let throttle = config
        .rate_limit
        .enabled
        .then(|| Arc::new(RequestThrottle::from_config(&config.rate_limit)));

    let bind_error = |source| StartupError::Bind {
        address: config.listener.bind_address.clone(),
        source,
    };
    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    let sweeper = Sweeper::new(
        gateway.guard().clone(),
        throttle.clone(),
        Duration::from_secs(config.login_guard.sweep_interval_secs),
    );
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.subscribe()));

    let server = HttpServer::new(&config.listener, gateway.clone(), throttle);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(listener, server_shutdown).await {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    tracing::info!(
        address = %local_addr,
        fail_max = config.circuit_breaker.fail_max,
        max_attempts = config.retries.max_attempts,
        lockout_threshold = config.login_guard.threshold,
        "Gateway started"
    );

    Ok(RunningGateway {
        local_addr,
        gateway,
        tasks: vec![server_task, sweeper_task],
    })
}
