//! Metrics recording.
//!
//! # Responsibilities
//! - Define gateway metrics (IdP attempts, breaker transitions, verifications)
//! - Record through the `metrics` facade; the embedding process picks the exporter
//!
//! # Metrics
//! - `idp_gateway_idp_attempts_total` (counter): outbound attempts by endpoint, outcome
//! - `idp_gateway_circuit_transitions_total` (counter): breaker transitions by state
//! - `idp_gateway_key_set_refreshes_total` (counter): key-set fetches by outcome
//! - `idp_gateway_token_verifications_total` (counter): verifications by outcome
//! - `idp_gateway_logins_total` (counter): login attempts by outcome
//! - `idp_gateway_lockouts_total` (counter): identities locked out
//! - `idp_gateway_rate_limited_total` (counter): throttled requests by route
//!
//! # Design Decisions
//! - Label values are low-cardinality; identities and addresses never become labels
//! - Recording without an installed recorder is a no-op

use metrics::counter;

pub fn record_idp_attempt(endpoint: &'static str, outcome: &'static str) {
    counter!(
        "idp_gateway_idp_attempts_total",
        "endpoint" => endpoint,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_circuit_transition(circuit: &str, state: &'static str) {
    counter!(
        "idp_gateway_circuit_transitions_total",
        "circuit" => circuit.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_key_set_refresh(outcome: &'static str) {
    counter!("idp_gateway_key_set_refreshes_total", "outcome" => outcome).increment(1);
}

pub fn record_token_verification(outcome: &'static str) {
    counter!("idp_gateway_token_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_login(outcome: &'static str) {
    counter!("idp_gateway_logins_total", "outcome" => outcome).increment(1);
}

pub fn record_lockout() {
    counter!("idp_gateway_lockouts_total").increment(1);
}

pub fn record_rate_limited(route: &'static str) {
    counter!("idp_gateway_rate_limited_total", "route" => route).increment(1);
}
