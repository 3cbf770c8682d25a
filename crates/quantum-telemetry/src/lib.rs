//! # Quantum Telemetry
//!
//! Logging setup shared by Quantum-Chain subsystems.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quantum_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::for_subsystem("18", "block-exchange");
//!     init_logging(&config).expect("Failed to init logging");
//!
//!     // Application code here; `tracing` events are now emitted.
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `quantum-chain` | Service name in log records |
//! | `QC_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `QC_SUBSYSTEM_ID` | `00` | Subsystem identifier |
//! | `QC_CONSOLE_OUTPUT` | `true` | Write log records to stdout |
//! | `QC_JSON_LOGS` | `false` (`true` in containers) | JSON instead of pretty output |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install log subscriber: {0}")]
    SubscriberInit(String),
}
