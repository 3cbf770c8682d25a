//! # Block Exchange Subsystem (qc-18)
//!
//! Decides which content blocks to request from peers, which to serve to
//! them and in what order, while keeping per-peer byte accounting.
//!
//! ## Architecture Role
//!
//! ```text
//! [Network] ──want/cancel/block──→ [ExchangeEvents]
//!                                        │
//!                    ┌───────────────────┼──────────────────┐
//!                    ↓                   ↓                  ↓
//!              [WantManager]     [DecisionEngine]     [LedgerStore]
//!                    │                   │
//!                    ↓ broadcast         ↓ per-peer workers
//!              [BlockTransport] ←────────┘
//!
//! [Operator] ──wantlist/stat/unwant/ledger──→ [commands] ──→ [BlockExchangeApi]
//! ```
//!
//! ## Fairness
//!
//! Peers whose debt ratio (bytes sent to them over bytes received from them)
//! exceeds the configured ceiling are served less often and after a delay.
//! They are never starved outright.

pub mod adapters;
pub mod commands;
pub mod domain;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;

pub use domain::*;
pub use events::{ExchangeError, TransportError, WantMessage};
pub use metrics::{ExchangeMetrics, MetricsSnapshot};
pub use ports::inbound::{BlockExchangeApi, Exchange, ExchangeEvents};
pub use ports::outbound::{BlockStore, BlockTransport};
pub use service::{
    DecisionEngine, ExchangeService, ServeOutcome, StatsAggregator, WantDecision, WantManager,
};
