use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::model::allowance::AllowancePolicy;

/// Length of the promotional contest in days.
pub const DEFAULT_CONTEST_DAYS: u32 = 90;

/// First day of the contest.
///
/// # Panics
///
/// Panics if the built-in start date cannot be represented.
#[must_use]
pub fn default_contest_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).expect("contest start date should be valid")
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Fixed contest window: a start date and a length in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContestSettings {
    start_date: NaiveDate,
    max_days: u32,
}

impl ContestSettings {
    /// Build contest settings.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidContestDays` if `max_days` is zero.
    pub fn new(start_date: NaiveDate, max_days: u32) -> Result<Self, PolicyError> {
        if max_days == 0 {
            return Err(PolicyError::InvalidContestDays);
        }
        Ok(Self {
            start_date,
            max_days,
        })
    }

    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    #[must_use]
    pub fn max_days(&self) -> u32 {
        self.max_days
    }

    /// 1-based contest day for `today`, clamped to `[1, max_days]`.
    ///
    /// Dates before the start report day 1; dates past the end stay pinned
    /// at the last day.
    #[must_use]
    pub fn day_number(&self, today: NaiveDate) -> u32 {
        let elapsed = today.signed_duration_since(self.start_date).num_days();
        let day = elapsed.saturating_add(1).clamp(1, i64::from(self.max_days));
        u32::try_from(day).unwrap_or(self.max_days)
    }

    /// Total questions obtainable over the contest at the base daily rate.
    #[must_use]
    pub fn max_questions(&self, policy: &AllowancePolicy) -> u32 {
        self.max_days
            .saturating_mul(policy.max_questions_per_day())
    }
}

impl Default for ContestSettings {
    fn default() -> Self {
        Self {
            start_date: default_contest_start(),
            max_days: DEFAULT_CONTEST_DAYS,
        }
    }
}

//
// ─── PERSISTED RECORD ──────────────────────────────────────────────────────────
//

/// Persisted shape of contest progress; everything else is derived on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestRecord {
    pub total_questions_played: u32,
}

impl ContestRecord {
    /// Add `n` questions to the cumulative counter.
    pub fn record_played(&mut self, n: u32) {
        self.total_questions_played = self.total_questions_played.saturating_add(n);
    }
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// Cumulative progress across the contest window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestProgress {
    contest_start_date: NaiveDate,
    total_questions_played: u32,
    day_number: u32,
    max_contest_days: u32,
    max_questions_per_contest: u32,
}

impl ContestProgress {
    #[must_use]
    pub fn compute(
        settings: &ContestSettings,
        policy: &AllowancePolicy,
        today: NaiveDate,
        record: ContestRecord,
    ) -> Self {
        Self {
            contest_start_date: settings.start_date(),
            total_questions_played: record.total_questions_played,
            day_number: settings.day_number(today),
            max_contest_days: settings.max_days(),
            max_questions_per_contest: settings.max_questions(policy),
        }
    }

    #[must_use]
    pub fn contest_start_date(&self) -> NaiveDate {
        self.contest_start_date
    }

    #[must_use]
    pub fn total_questions_played(&self) -> u32 {
        self.total_questions_played
    }

    #[must_use]
    pub fn day_number(&self) -> u32 {
        self.day_number
    }

    #[must_use]
    pub fn max_contest_days(&self) -> u32 {
        self.max_contest_days
    }

    #[must_use]
    pub fn max_questions_per_contest(&self) -> u32 {
        self.max_questions_per_contest
    }

    #[must_use]
    pub fn questions_remaining(&self) -> u32 {
        self.max_questions_per_contest
            .saturating_sub(self.total_questions_played)
    }

    #[must_use]
    pub fn days_remaining(&self) -> u32 {
        self.max_contest_days.saturating_sub(self.day_number)
    }
}
