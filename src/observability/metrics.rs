//! Metrics collection.
//!
//! # Metrics
//! - `secure_listener_handshakes_total` (counter): finished handshake tasks by outcome
//! - `secure_listener_accept_errors_total` (counter): raw transport accept failures
//! - `secure_listener_handshakes_in_flight` (gauge): handshake tasks still running
//!
//! # Design Decisions
//! - Goes through the `metrics` facade only; installing an exporter is left
//!   to the embedding application
//! - Updates are cheap enough for the accept path

use metrics::{counter, gauge};

use crate::net::connection::HandshakeState;

/// Record a handshake task reaching its terminal state.
pub fn record_handshake(state: HandshakeState) {
    counter!("secure_listener_handshakes_total", "outcome" => state.as_str()).increment(1);
}

pub fn record_accept_error() {
    counter!("secure_listener_accept_errors_total").increment(1);
}

pub fn record_in_flight(count: usize) {
    gauge!("secure_listener_handshakes_in_flight").set(count as f64);
}
