//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! accept loop / handshake tasks produce:
//!     → tracing events (bind, accept errors, handshake results, close)
//!     → metrics.rs (outcome counters, in-flight gauge)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → whatever metrics recorder the application installs
//! ```

pub mod logging;
pub mod metrics;
