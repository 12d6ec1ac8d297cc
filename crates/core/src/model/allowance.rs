use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Questions granted to a player each calendar day.
pub const DEFAULT_MAX_QUESTIONS_PER_DAY: u32 = 10;

/// Upper bound on unused questions carried over from previous days.
pub const DEFAULT_ROLLOVER_CAP: u32 = 50;

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Limits applied to the daily allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowancePolicy {
    max_questions_per_day: u32,
    rollover_cap: u32,
}

impl AllowancePolicy {
    /// Build a policy with explicit limits.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` if either limit is zero.
    pub fn new(max_questions_per_day: u32, rollover_cap: u32) -> Result<Self, PolicyError> {
        if max_questions_per_day == 0 {
            return Err(PolicyError::InvalidMaxQuestionsPerDay);
        }
        if rollover_cap == 0 {
            return Err(PolicyError::InvalidRolloverCap);
        }
        Ok(Self {
            max_questions_per_day,
            rollover_cap,
        })
    }

    #[must_use]
    pub fn max_questions_per_day(&self) -> u32 {
        self.max_questions_per_day
    }

    #[must_use]
    pub fn rollover_cap(&self) -> u32 {
        self.rollover_cap
    }
}

impl Default for AllowancePolicy {
    fn default() -> Self {
        Self {
            max_questions_per_day: DEFAULT_MAX_QUESTIONS_PER_DAY,
            rollover_cap: DEFAULT_ROLLOVER_CAP,
        }
    }
}

//
// ─── DAILY ALLOWANCE ───────────────────────────────────────────────────────────
//

/// Per-day question allowance, persisted once per calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAllowance {
    date: NaiveDate,
    questions_played: u32,
    max_questions_per_day: u32,
    accumulated_questions: u32,
}

impl DailyAllowance {
    /// A first-run record: nothing played, nothing accumulated.
    #[must_use]
    pub fn fresh(date: NaiveDate, policy: &AllowancePolicy) -> Self {
        Self {
            date,
            questions_played: 0,
            max_questions_per_day: policy.max_questions_per_day(),
            accumulated_questions: 0,
        }
    }

    /// Rehydrate a record from persisted values.
    ///
    /// Values are taken as stored; the rollover cap is enforced by
    /// [`DailyAllowance::for_day`].
    #[must_use]
    pub fn from_persisted(
        date: NaiveDate,
        questions_played: u32,
        max_questions_per_day: u32,
        accumulated_questions: u32,
    ) -> Self {
        Self {
            date,
            questions_played,
            max_questions_per_day,
            accumulated_questions,
        }
    }

    /// Resolve the record that applies on `today`.
    ///
    /// A stored record for `today` is kept, with its accumulated questions
    /// clamped to the rollover cap. A record from any other day rolls over
    /// once into a new record; no stored record yields a fresh one.
    #[must_use]
    pub fn for_day(stored: Option<Self>, today: NaiveDate, policy: &AllowancePolicy) -> Self {
        match stored {
            Some(record) if record.date == today => Self {
                accumulated_questions: record.accumulated_questions.min(policy.rollover_cap()),
                ..record
            },
            Some(record) => record.roll_over(today, policy),
            None => Self::fresh(today, policy),
        }
    }

    /// Start a new day, carrying this record's unused allowance forward.
    #[must_use]
    pub fn roll_over(&self, date: NaiveDate, policy: &AllowancePolicy) -> Self {
        let accumulated_questions = self
            .accumulated_questions
            .saturating_add(self.unused_daily_questions())
            .min(policy.rollover_cap());

        Self {
            date,
            questions_played: 0,
            max_questions_per_day: policy.max_questions_per_day(),
            accumulated_questions,
        }
    }

    /// Count `n` more questions as played.
    pub fn record_played(&mut self, n: u32) {
        self.questions_played = self.questions_played.saturating_add(n);
    }

    /// Part of today's base allowance that has not been used.
    #[must_use]
    pub fn unused_daily_questions(&self) -> u32 {
        self.max_questions_per_day
            .saturating_sub(self.questions_played)
    }

    /// Questions the player may still answer today, never negative.
    #[must_use]
    pub fn available_questions(&self) -> u32 {
        self.max_questions_per_day
            .saturating_add(self.accumulated_questions)
            .saturating_sub(self.questions_played)
    }

    #[must_use]
    pub fn can_play(&self) -> bool {
        self.available_questions() > 0
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    #[must_use]
    pub fn questions_played(&self) -> u32 {
        self.questions_played
    }

    #[must_use]
    pub fn max_questions_per_day(&self) -> u32 {
        self.max_questions_per_day
    }

    #[must_use]
    pub fn accumulated_questions(&self) -> u32 {
        self.accumulated_questions
    }
}
