//! Inbound token verification subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization header
//!     → bearer.rs (missing vs malformed)
//!     → verifier.rs (pinned alg, signature, registered claims)
//!         → cache.rs (key by kid, single-flight refresh)
//!             → idp::IdentityProviderClient (key-set endpoint)
//!             → jwks.rs (parse, reject malformed documents whole)
//!     → claims.rs (TokenClaims)
//! ```

pub mod bearer;
pub mod cache;
pub mod claims;
pub mod error;
pub mod jwks;
pub mod verifier;

pub use bearer::{extract_bearer, BearerError};
pub use cache::KeySetCache;
pub use claims::TokenClaims;
pub use error::{InvalidReason, KeyError, TokenError};
pub use jwks::{KeySet, PublicKey};
pub use verifier::{TokenVerifier, UnsupportedAlgorithm};
