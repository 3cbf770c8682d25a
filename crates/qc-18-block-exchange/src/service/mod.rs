//! Application services: the stateful components and their wiring.

mod engine;
mod exchange;
mod stats;
mod want_manager;

pub use engine::{DecisionEngine, ServeOutcome, WantDecision};
pub use exchange::ExchangeService;
pub use stats::StatsAggregator;
pub use want_manager::WantManager;
