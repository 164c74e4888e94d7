//! Configuration for the managed strategy.
//!
//! The configuration controls detection thresholds and diagnostics:
//! - the per-location visit count that triggers first-pass spin detection,
//! - the global execution ceiling that declares a livelock,
//! - obstruction-freedom checking,
//! - local-object elimination,
//! - state-representation snapshots in traces,
//! - the wall-clock budget of one invocation.
//!
//! `StrategyConfig` uses a fluent, move-based builder style: each method
//! consumes `self` and returns the updated configuration.
//!
//! ```ignore
//! use lockstep::StrategyConfig;
//!
//! let config = StrategyConfig::new(42)
//!     .hanging_detection_threshold(31)
//!     .check_obstruction_freedom(true)
//!     .timeout_ms(5_000);
//! config.validate()?;
//! # Ok::<(), lockstep::EngineError>(())
//! ```

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Configuration for the managed strategy engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Seed for the built-in random scheduling oracle and derived decisions.
    pub seed: u64,
    /// Per-location visit count triggering first-pass spin detection.
    pub hanging_detection_threshold: usize,
    /// Global total-events ceiling before declaring a livelock.
    ///
    /// Must be strictly greater than `hanging_detection_threshold`.
    pub livelock_events_threshold: u64,
    /// When true, any lock, wait, or spin in a non-blocking actor is fatal.
    pub check_obstruction_freedom: bool,
    /// Enable the local-object tracker: accesses to objects not yet
    /// published to shared state are not switch points.
    pub eliminate_local_objects: bool,
    /// Include data-structure state snapshots in collected traces.
    pub collect_state_representation: bool,
    /// Wall-clock budget of one invocation, in milliseconds.
    pub timeout_ms: u64,
}

impl StrategyConfig {
    /// Creates a configuration with the given seed and default thresholds.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            hanging_detection_threshold: 101,
            livelock_events_threshold: 10_001,
            check_obstruction_freedom: false,
            eliminate_local_objects: true,
            collect_state_representation: false,
            timeout_ms: 10_000,
        }
    }

    /// Sets the per-location spin detection threshold.
    #[must_use]
    pub const fn hanging_detection_threshold(mut self, threshold: usize) -> Self {
        self.hanging_detection_threshold = threshold;
        self
    }

    /// Sets the global livelock ceiling.
    #[must_use]
    pub const fn livelock_events_threshold(mut self, threshold: u64) -> Self {
        self.livelock_events_threshold = threshold;
        self
    }

    /// Sets whether obstruction-freedom is enforced.
    #[must_use]
    pub const fn check_obstruction_freedom(mut self, value: bool) -> Self {
        self.check_obstruction_freedom = value;
        self
    }

    /// Sets whether local objects are eliminated from switch points.
    #[must_use]
    pub const fn eliminate_local_objects(mut self, value: bool) -> Self {
        self.eliminate_local_objects = value;
        self
    }

    /// Sets whether traces include state-representation snapshots.
    #[must_use]
    pub const fn collect_state_representation(mut self, value: bool) -> Self {
        self.collect_state_representation = value;
        self
    }

    /// Sets the invocation wall-clock budget.
    #[must_use]
    pub const fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Validates threshold consistency.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] when the livelock ceiling is
    /// not strictly greater than the spin detection threshold, or when a
    /// threshold is zero.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.hanging_detection_threshold == 0 {
            return Err(EngineError::InvalidConfig(
                "hanging_detection_threshold must be positive".to_string(),
            ));
        }
        if self.livelock_events_threshold <= self.hanging_detection_threshold as u64 {
            return Err(EngineError::InvalidConfig(format!(
                "livelock_events_threshold ({}) must be strictly greater than \
                 hanging_detection_threshold ({})",
                self.livelock_events_threshold, self.hanging_detection_threshold
            )));
        }
        if self.timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::new(42)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    #[test]
    fn default_config_is_valid() {
        init_test_logging();
        crate::test_phase!("default_config_is_valid");
        let config = StrategyConfig::default();
        crate::assert_with_log!(config.seed == 42, "seed", 42, config.seed);
        assert!(config.validate().is_ok());
        crate::test_complete!("default_config_is_valid");
    }

    #[test]
    fn builder_chaining() {
        init_test_logging();
        let config = StrategyConfig::new(7)
            .hanging_detection_threshold(3)
            .livelock_events_threshold(500)
            .check_obstruction_freedom(true)
            .eliminate_local_objects(false)
            .collect_state_representation(true)
            .timeout_ms(1_000);
        assert_eq!(config.hanging_detection_threshold, 3);
        assert_eq!(config.livelock_events_threshold, 500);
        assert!(config.check_obstruction_freedom);
        assert!(!config.eliminate_local_objects);
        assert!(config.collect_state_representation);
        assert_eq!(config.timeout_ms, 1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn livelock_ceiling_must_exceed_hanging_threshold() {
        init_test_logging();
        let config = StrategyConfig::new(1)
            .hanging_detection_threshold(100)
            .livelock_events_threshold(100);
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
        let config = config.livelock_events_threshold(101);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_thresholds_rejected() {
        init_test_logging();
        let config = StrategyConfig::new(1).hanging_detection_threshold(0);
        assert!(config.validate().is_err());
        let config = StrategyConfig::new(1).timeout_ms(0);
        assert!(config.validate().is_err());
    }
}
