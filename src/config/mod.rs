//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, secret from environment)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to the gateway builder at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; breaker and guard state live for the
//!   process lifetime, so there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, GatewayConfig, IdpConfig, JwksConfig, ListenerConfig,
    LoginGuardConfig, ObservabilityConfig, RateLimitConfig, RetryConfig, TokenConfig,
};
