//! Reconnect delay policy.
//!
//! The default policy is built for a long-lived background client, not a
//! request with a deadline: delays start small, double to a ceiling, and
//! then keep growing by one unit per failure — unbounded but
//! decelerating, so a server that is down for a weekend is not hammered,
//! yet the client never gives up on its own.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default first delay, in units.
pub const DEFAULT_INITIAL_UNITS: u64 = 2;
/// Default doubling ceiling, in units.
pub const DEFAULT_CEILING_UNITS: u64 = 512;

/// Maps a consecutive-failure count to the delay before the next attempt.
pub trait BackoffPolicy: Send + Sync {
    /// Delay after `failures` consecutive failures (`failures >= 1`).
    fn delay(&self, failures: u32) -> Duration;
}

/// The default policy: start at 2 units, double to 512, then +1 per
/// failure thereafter.
///
/// The unit is one second in production ([`DoublingBackoff::seconds`]);
/// tests inject a smaller one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoublingBackoff {
    /// Length of one time-unit.
    pub unit: Duration,
    /// First delay, in units.
    pub initial_units: u64,
    /// Doubling stops at this many units; beyond it delays grow by one
    /// unit per failure.
    pub ceiling_units: u64,
}

impl DoublingBackoff {
    /// Production policy with one-second units.
    #[must_use]
    pub fn seconds() -> Self {
        Self::with_unit(Duration::from_secs(1))
    }

    /// Policy with an explicit unit length.
    #[must_use]
    pub fn with_unit(unit: Duration) -> Self {
        Self {
            unit,
            initial_units: DEFAULT_INITIAL_UNITS,
            ceiling_units: DEFAULT_CEILING_UNITS,
        }
    }

    /// Delay in units after `failures` consecutive failures.
    #[must_use]
    pub fn units(&self, failures: u32) -> u64 {
        let n = u64::from(failures.max(1));
        // Doubling phase: initial * 2^(n-1), until the ceiling.
        let doubled = self
            .initial_units
            .checked_shl(u32::try_from(n - 1).unwrap_or(u32::MAX))
            .unwrap_or(u64::MAX);
        if doubled <= self.ceiling_units {
            return doubled;
        }
        // Linear phase: +1 per failure past the step that reaches the
        // ceiling.
        let steps_to_ceiling = u64::from(
            (self.ceiling_units / self.initial_units.max(1))
                .max(1)
                .ilog2(),
        ) + 1;
        self.ceiling_units + n.saturating_sub(steps_to_ceiling)
    }
}

impl Default for DoublingBackoff {
    fn default() -> Self {
        Self::seconds()
    }
}

impl BackoffPolicy for DoublingBackoff {
    fn delay(&self, failures: u32) -> Duration {
        let units = u32::try_from(self.units(failures)).unwrap_or(u32::MAX);
        self.unit.saturating_mul(units)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
