//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Login / refresh request:
//!     → rate_limit.rs (per-IP fixed window, HTTP layer)
//!     → login_guard.rs (per identity+source lockout, inside the gateway)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a locked-out pair never reaches the IdP
//! - Only credential rejections count toward lockout; an unreachable IdP
//!   says nothing about the secret

pub mod login_guard;
pub mod rate_limit;

pub use login_guard::{AttemptKey, AttemptRecord, LockedOut, LoginAttemptGuard};
pub use rate_limit::{rate_limit_middleware, RequestThrottle};
