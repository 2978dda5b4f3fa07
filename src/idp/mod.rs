//! Identity provider client subsystem.
//!
//! # Data Flow
//! ```text
//! gateway / key-set cache
//!     → client.rs (retry + breaker + fallback)
//!     → transport.rs (one HTTP exchange, reqwest)
//!     ← fallback.rs (last known-good key set / health while open)
//! ```
//!
//! # Design Decisions
//! - The breaker is owned by the client and injected, never global
//! - Token responses are never replayed from cache

pub mod client;
pub mod fallback;
pub mod transport;
pub mod types;

pub use client::IdentityProviderClient;
pub use transport::{HttpTransport, IdpEndpoints, IdpTransport};
pub use types::{
    ClientBuildError, Endpoint, IdpError, IdpErrorBody, IdpRequest, IdpResponse, RawResponse,
    TokenGrant, TransportError,
};
