mod allowance;
mod contest;

pub use allowance::{
    AllowancePolicy, DailyAllowance, DEFAULT_MAX_QUESTIONS_PER_DAY, DEFAULT_ROLLOVER_CAP,
};
pub use contest::{
    default_contest_start, ContestProgress, ContestRecord, ContestSettings, DEFAULT_CONTEST_DAYS,
};
