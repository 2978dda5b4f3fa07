//! `Authorization` header parsing.

use crate::token::{InvalidReason, TokenError};

/// The header was absent, as opposed to present but unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerError {
    Missing,
    Invalid(TokenError),
}

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive;
/// anything other than exactly two parts is malformed.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, BearerError> {
    let header = match header.map(str::trim) {
        None | Some("") => return Err(BearerError::Missing),
        Some(header) => header,
    };

    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(BearerError::Invalid(TokenError::invalid(InvalidReason::Malformed))),
    }
}
