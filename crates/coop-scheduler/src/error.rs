use thiserror::Error;

/// Errors reported by scheduler entry points
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("negative time step: {0}")]
    NegativeStep(f64),
    #[error("time step is not a finite number: {0}")]
    NonFiniteStep(f64),
}
