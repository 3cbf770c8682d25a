//! Configuration value objects for the block exchange.
//!
//! # Example
//!
//! ```ignore
//! use qc_18_block_exchange::domain::ExchangeConfigBuilder;
//!
//! let config = ExchangeConfigBuilder::new()
//!     .provide_buffer_capacity(512)
//!     .max_send_retries(3)
//!     .debt_ratio_ceiling(1.5)
//!     .build()
//!     .expect("valid config");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::ExchangeError;

/// Throttling curve applied to peers by debt ratio.
///
/// At or below `debt_ratio_ceiling` a peer is served at full weight after
/// `base_delay_ms`. Above it, weight falls as `ceiling / ratio` and every
/// unit of ratio over the ceiling adds `throttle_step_ms`, up to
/// `max_delay_ms`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessPolicy {
    pub debt_ratio_ceiling: f64,
    pub base_delay_ms: u64,
    pub throttle_step_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for FairnessPolicy {
    fn default() -> Self {
        Self {
            debt_ratio_ceiling: 2.0,
            base_delay_ms: 0,
            throttle_step_ms: 50,
            max_delay_ms: 1_000,
        }
    }
}

impl FairnessPolicy {
    /// Relative service weight in `(0, 1]`. Non-increasing in `debt_ratio`.
    pub fn weight(&self, debt_ratio: f64) -> f64 {
        if !self.is_throttled(debt_ratio) {
            return 1.0;
        }
        if debt_ratio.is_infinite() {
            return 0.0;
        }
        self.debt_ratio_ceiling / debt_ratio
    }

    /// Delay before each send to a peer. Non-decreasing in `debt_ratio`.
    pub fn delay(&self, debt_ratio: f64) -> Duration {
        let base = self.base_delay_ms.min(self.max_delay_ms);
        if !self.is_throttled(debt_ratio) {
            return Duration::from_millis(base);
        }
        let excess = debt_ratio - self.debt_ratio_ceiling;
        let extra = (self.throttle_step_ms as f64 * excess).min(self.max_delay_ms as f64);
        let millis = (base as f64 + extra).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Whether the peer is currently throttled.
    pub fn is_throttled(&self, debt_ratio: f64) -> bool {
        debt_ratio > self.debt_ratio_ceiling
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        if !self.debt_ratio_ceiling.is_finite() || self.debt_ratio_ceiling <= 0.0 {
            return Err(ExchangeError::InvalidConfig(format!(
                "debt_ratio_ceiling must be a positive number, got {}",
                self.debt_ratio_ceiling
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ExchangeError::InvalidConfig(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Block exchange configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Capacity of the provide buffer (newly available keys).
    pub provide_buffer_capacity: usize,
    /// Retries after the first failed send before a task is dropped.
    pub max_send_retries: u32,
    /// Cross-peer throttling curve.
    pub fairness: FairnessPolicy,
    /// Wants accepted per remote peer; further wants are ignored.
    pub max_wantlist_entries_per_peer: usize,
    /// How often an idle send worker re-checks its queue.
    pub worker_idle_poll_ms: u64,
    /// How long shutdown waits for a send already on the wire. The send is
    /// abandoned after that and its task returned to the queue.
    pub shutdown_grace_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            provide_buffer_capacity: 256,
            max_send_retries: 1,
            fairness: FairnessPolicy::default(),
            max_wantlist_entries_per_peer: 1024,
            worker_idle_poll_ms: 250,
            shutdown_grace_ms: 500,
        }
    }
}

impl ExchangeConfig {
    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.max_wantlist_entries_per_peer == 0 {
            return Err(ExchangeError::InvalidConfig(
                "max_wantlist_entries_per_peer cannot be 0".to_string(),
            ));
        }
        if self.worker_idle_poll_ms == 0 {
            return Err(ExchangeError::InvalidConfig(
                "worker_idle_poll_ms cannot be 0".to_string(),
            ));
        }
        self.fairness.validate()
    }

    pub fn worker_idle_poll(&self) -> Duration {
        Duration::from_millis(self.worker_idle_poll_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Loads configuration from `QC_EXCHANGE_*` environment variables,
    /// falling back to defaults for unset ones.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `QC_EXCHANGE_PROVIDE_BUFFER` | `provide_buffer_capacity` |
    /// | `QC_EXCHANGE_MAX_RETRIES` | `max_send_retries` |
    /// | `QC_EXCHANGE_DEBT_CEILING` | `fairness.debt_ratio_ceiling` |
    /// | `QC_EXCHANGE_BASE_DELAY_MS` | `fairness.base_delay_ms` |
    /// | `QC_EXCHANGE_THROTTLE_STEP_MS` | `fairness.throttle_step_ms` |
    /// | `QC_EXCHANGE_MAX_DELAY_MS` | `fairness.max_delay_ms` |
    /// | `QC_EXCHANGE_MAX_PEER_WANTS` | `max_wantlist_entries_per_peer` |
    /// | `QC_EXCHANGE_IDLE_POLL_MS` | `worker_idle_poll_ms` |
    /// | `QC_EXCHANGE_SHUTDOWN_GRACE_MS` | `shutdown_grace_ms` |
    pub fn from_env() -> Result<Self, ExchangeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ExchangeError> {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
            target: &mut T,
        ) -> Result<(), ExchangeError> {
            if let Some(raw) = lookup(name) {
                *target = raw.trim().parse().map_err(|_| {
                    ExchangeError::InvalidConfig(format!("{name}: cannot parse {raw:?}"))
                })?;
            }
            Ok(())
        }

        let mut config = Self::default();
        parse(&lookup, "QC_EXCHANGE_PROVIDE_BUFFER", &mut config.provide_buffer_capacity)?;
        parse(&lookup, "QC_EXCHANGE_MAX_RETRIES", &mut config.max_send_retries)?;
        parse(&lookup, "QC_EXCHANGE_DEBT_CEILING", &mut config.fairness.debt_ratio_ceiling)?;
        parse(&lookup, "QC_EXCHANGE_BASE_DELAY_MS", &mut config.fairness.base_delay_ms)?;
        parse(&lookup, "QC_EXCHANGE_THROTTLE_STEP_MS", &mut config.fairness.throttle_step_ms)?;
        parse(&lookup, "QC_EXCHANGE_MAX_DELAY_MS", &mut config.fairness.max_delay_ms)?;
        parse(&lookup, "QC_EXCHANGE_MAX_PEER_WANTS", &mut config.max_wantlist_entries_per_peer)?;
        parse(&lookup, "QC_EXCHANGE_IDLE_POLL_MS", &mut config.worker_idle_poll_ms)?;
        parse(&lookup, "QC_EXCHANGE_SHUTDOWN_GRACE_MS", &mut config.shutdown_grace_ms)?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`ExchangeConfig`] with validation on `build`.
#[derive(Clone, Debug, Default)]
pub struct ExchangeConfigBuilder {
    config: ExchangeConfig,
}

impl ExchangeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.provide_buffer_capacity = capacity;
        self
    }

    pub fn max_send_retries(mut self, retries: u32) -> Self {
        self.config.max_send_retries = retries;
        self
    }

    pub fn fairness(mut self, policy: FairnessPolicy) -> Self {
        self.config.fairness = policy;
        self
    }

    pub fn debt_ratio_ceiling(mut self, ceiling: f64) -> Self {
        self.config.fairness.debt_ratio_ceiling = ceiling;
        self
    }

    pub fn throttle(mut self, step_ms: u64, max_delay_ms: u64) -> Self {
        self.config.fairness.throttle_step_ms = step_ms;
        self.config.fairness.max_delay_ms = max_delay_ms;
        self
    }

    pub fn max_wantlist_entries_per_peer(mut self, max: usize) -> Self {
        self.config.max_wantlist_entries_per_peer = max;
        self
    }

    pub fn worker_idle_poll_ms(mut self, millis: u64) -> Self {
        self.config.worker_idle_poll_ms = millis;
        self
    }

    pub fn shutdown_grace_ms(mut self, millis: u64) -> Self {
        self.config.shutdown_grace_ms = millis;
        self
    }

    pub fn build(self) -> Result<ExchangeConfig, ExchangeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
