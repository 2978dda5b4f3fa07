//! IdP gateway library.
//!
//! Resilient outbound calls to an identity provider and local verification
//! of the bearer tokens it issues.

pub mod config;
pub mod gateway;
pub mod http;
pub mod idp;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod token;

pub use config::GatewayConfig;
pub use gateway::{AuthGateway, GatewayError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
