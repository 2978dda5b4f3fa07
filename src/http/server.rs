//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the auth handlers
//! - Wire up middleware (tracing, limits, request ID, throttling)
//! - Bind server to listener and shut down gracefully
//!
//! # Routes
//! - `POST /auth/login`   → `AuthGateway::login`
//! - `POST /auth/refresh` → `AuthGateway::refresh`
//! - `GET  /auth/me`      → `AuthGateway::authenticate_header`
//! - `GET  /health`       → `AuthGateway::health`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::gateway::{AuthGateway, GatewayError, HealthStatus, TokenPair};
use crate::http::request::{LoginRequest, MakeRequestUuid, RefreshRequest};
use crate::security::{rate_limit_middleware, RequestThrottle};
use crate::token::{InvalidReason, TokenClaims};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AuthGateway>,
}

/// HTTP front end for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// `throttle` guards login and refresh; `None` disables throttling.
    pub fn new(
        config: &ListenerConfig,
        gateway: Arc<AuthGateway>,
        throttle: Option<Arc<RequestThrottle>>,
    ) -> Self {
        let router = Self::build_router(config, AppState { gateway }, throttle);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        config: &ListenerConfig,
        state: AppState,
        throttle: Option<Arc<RequestThrottle>>,
    ) -> Router {
        let mut credentials = Router::new()
            .route("/auth/login", post(login_handler))
            .route("/auth/refresh", post(refresh_handler));
        if let Some(throttle) = throttle {
            credentials = credentials
                .route_layer(middleware::from_fn_with_state(throttle, rate_limit_middleware));
        }

        Router::new()
            .merge(credentials)
            .route("/auth/me", get(me_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
                    .layer(TimeoutLayer::with_status_code(
                        StatusCode::REQUEST_TIMEOUT,
                        Duration::from_secs(config.request_timeout_secs),
                    )),
            )
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn login_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, GatewayError> {
    let Json(body) = payload.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let pair = state
        .gateway
        .login(&body.identity, &body.secret, &addr.ip().to_string())
        .await?;
    Ok(Json(pair))
}

async fn refresh_handler(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, GatewayError> {
    let Json(body) = payload.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    Ok(Json(state.gateway.refresh(&body.refresh_token).await?))
}

async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenClaims>, GatewayError> {
    let header = headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str())
        .transpose()
        .map_err(|_| GatewayError::InvalidToken {
            reason: InvalidReason::Malformed,
        })?;
    Ok(Json(state.gateway.authenticate_header(header).await?))
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let report = state.gateway.health().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}
