//! Playback speed multiplier.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Rejected speed value.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SpeedError {
    #[error("Speed must be finite and positive, got {0}")]
    Invalid(f64),
}

/// A finite, strictly positive speed multiplier.
///
/// Real wait time is script time divided by the speed, so 2× halves every
/// wait.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Speed(f64);

impl Speed {
    pub const NORMAL: Speed = Speed(1.0);
    pub const DOUBLE: Speed = Speed(2.0);
    pub const QUAD: Speed = Speed(4.0);
    pub const QUINTUPLE: Speed = Speed(5.0);

    /// Creates a speed multiplier.
    ///
    /// # Errors
    /// `SpeedError::Invalid` for zero, negative, NaN or infinite values.
    pub fn new(value: f64) -> Result<Self, SpeedError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(SpeedError::Invalid(value))
        }
    }

    pub fn get(&self) -> f64 {
        self.0
    }

    /// Converts a script-time wait into real time.
    pub fn to_real(&self, script_time: Duration) -> Duration {
        nanos(script_time.as_nanos() as f64 / self.0)
    }

    /// Converts a real-time wait back into script time.
    pub fn to_script(&self, real_time: Duration) -> Duration {
        nanos(real_time.as_nanos() as f64 * self.0)
    }
}

/// Rounds to the nearest nanosecond, saturating at `u64::MAX` nanoseconds.
fn nanos(value: f64) -> Duration {
    Duration::from_nanos(value.round() as u64)
}

impl Default for Speed {
    fn default() -> Self {
        Speed::NORMAL
    }
}

impl TryFrom<f64> for Speed {
    type Error = SpeedError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Speed::new(value)
    }
}

impl From<Speed> for f64 {
    fn from(speed: Speed) -> Self {
        speed.0
    }
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.0)
    }
}

impl std::str::FromStr for Speed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().trim_end_matches(['x', 'X']);
        let value: f64 = raw.parse().map_err(|_| format!("Invalid speed: {}", s))?;
        Speed::new(value).map_err(|e| e.to_string())
    }
}
