//! Gateway facade.
//!
//! # Data Flow
//! ```text
//! login        → security::LoginAttemptGuard → idp::IdentityProviderClient
//! authenticate → token::extract_bearer → token::TokenVerifier
//! refresh      → idp::IdentityProviderClient
//! ```
//!
//! All three return `GatewayError`, never a lower-level error.

pub mod error;
pub mod facade;
pub mod types;

pub use error::GatewayError;
pub use facade::{AuthGateway, GatewayBuildError};
pub use types::{HealthReport, HealthStatus, IdpProbe, KeySetHealth, TokenPair};
