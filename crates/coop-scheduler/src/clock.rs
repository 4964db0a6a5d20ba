use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SchedulerError;

/// Seconds to a duration: negative and NaN become zero, too large or `+inf` become `Duration::MAX`
pub(crate) fn saturating_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// A point on the scheduler's virtual timeline
///
/// Virtual time only moves when the driver calls `advance`, it has no relation to
/// wall-clock time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualTime(Duration);

impl VirtualTime {
    pub const ZERO: VirtualTime = VirtualTime(Duration::ZERO);

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    /// Saturates like `Scheduler::sleep_secs`
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(saturating_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Offset this time by `duration`, saturating at the largest representable time
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration))
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

/// When a sleeping task counts as due
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeBoundary {
    /// Due once the clock is strictly past the wake time
    #[default]
    Strict,
    /// Due as soon as the clock reaches the wake time
    Inclusive,
}

impl WakeBoundary {
    pub fn is_due(&self, wake_at: VirtualTime, now: VirtualTime) -> bool {
        match self {
            WakeBoundary::Strict => wake_at < now,
            WakeBoundary::Inclusive => wake_at <= now,
        }
    }
}

/// What to do with a negative step handed to `advance_secs`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPolicy {
    /// Treat the step as zero and log a warning
    #[default]
    Clamp,
    /// Refuse the step with `SchedulerError::NegativeStep`
    Reject,
}

impl StepPolicy {
    /// Turn an engine-provided step in seconds into a duration
    pub fn step_from_secs(&self, secs: f64) -> Result<Duration, SchedulerError> {
        if !secs.is_finite() {
            return Err(SchedulerError::NonFiniteStep(secs));
        }

        if secs >= 0.0 {
            return Ok(saturating_secs(secs));
        }

        match self {
            StepPolicy::Clamp => {
                warn!(target: "scheduler", "Negative time step {} clamped to zero", secs);
                Ok(Duration::ZERO)
            }
            StepPolicy::Reject => Err(SchedulerError::NegativeStep(secs)),
        }
    }
}

/// Monotonic virtual clock owned by a scheduler
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: VirtualTime,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Move the clock forward and return the new time
    pub fn advance(&mut self, dt: Duration) -> VirtualTime {
        self.now = self.now.saturating_add(dt);
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_accumulates() {
        let mut clock = VirtualClock::new();
        clock.advance(Duration::from_millis(500));
        clock.advance(Duration::from_millis(600));
        assert_eq!(clock.now(), VirtualTime::from_duration(Duration::from_millis(1100)));
    }

    #[test]
    fn test_advance_by_zero_keeps_time() {
        let mut clock = VirtualClock::new();
        clock.advance(Duration::from_secs(2));
        let before = clock.now();
        clock.advance(Duration::ZERO);
        assert_eq!(clock.now(), before);
    }

    #[test]
    fn test_strict_boundary_waits_past_wake_time() {
        let wake_at = VirtualTime::from_secs_f64(15.0);
        assert!(!WakeBoundary::Strict.is_due(wake_at, VirtualTime::from_secs_f64(15.0)));
        assert!(WakeBoundary::Strict.is_due(wake_at, VirtualTime::from_secs_f64(15.001)));
    }

    #[test]
    fn test_inclusive_boundary_fires_at_wake_time() {
        let wake_at = VirtualTime::from_secs_f64(15.0);
        assert!(WakeBoundary::Inclusive.is_due(wake_at, VirtualTime::from_secs_f64(15.0)));
        assert!(!WakeBoundary::Inclusive.is_due(wake_at, VirtualTime::from_secs_f64(14.9)));
    }

    #[test]
    fn test_step_policy() {
        assert_eq!(StepPolicy::Clamp.step_from_secs(-1.0).unwrap(), Duration::ZERO);
        assert_eq!(
            StepPolicy::Clamp.step_from_secs(0.25).unwrap(),
            Duration::from_millis(250)
        );
        assert!(matches!(
            StepPolicy::Reject.step_from_secs(-0.5),
            Err(SchedulerError::NegativeStep(_))
        ));
        assert!(matches!(
            StepPolicy::Clamp.step_from_secs(f64::NAN),
            Err(SchedulerError::NonFiniteStep(_))
        ));
    }

    #[test]
    fn test_step_beyond_duration_range_saturates() {
        assert_eq!(StepPolicy::Clamp.step_from_secs(1e20), Ok(Duration::MAX));
        assert_eq!(StepPolicy::Reject.step_from_secs(f64::MAX), Ok(Duration::MAX));
    }

    #[test]
    fn test_saturating_secs() {
        assert_eq!(saturating_secs(f64::INFINITY), Duration::MAX);
        assert_eq!(saturating_secs(1e30), Duration::MAX);
        assert_eq!(saturating_secs(-2.0), Duration::ZERO);
        assert_eq!(saturating_secs(f64::NAN), Duration::ZERO);
        assert_eq!(saturating_secs(0.5), Duration::from_millis(500));
    }

    #[test]
    fn test_display() {
        assert_eq!(VirtualTime::from_secs_f64(1.5).to_string(), "1.500s");
    }
}
