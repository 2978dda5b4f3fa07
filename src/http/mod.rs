//! HTTP surface subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, handlers)
//!     → request.rs (request ID, JSON bodies)
//!     → gateway::AuthGateway
//!     → response.rs (GatewayError → status + JSON body)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::MakeRequestUuid;
pub use server::{AppState, HttpServer};
