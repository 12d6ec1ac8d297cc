use thiserror::Error;

/// Errors raised while validating allowance and contest configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("max questions per day must be > 0")]
    InvalidMaxQuestionsPerDay,

    #[error("rollover cap must be > 0")]
    InvalidRolloverCap,

    #[error("contest must last at least 1 day")]
    InvalidContestDays,
}
