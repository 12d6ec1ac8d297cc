use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, TimeZone, Utc};

/// A simple clock abstraction for deterministic dates in services and tests.
///
/// Calendar dates are always taken in the clock's own offset: the default
/// clock follows the device's local timezone, a fixed clock keeps the offset
/// it was built with.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<FixedOffset>),
}

impl Clock {
    /// Returns a clock that uses the current local system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed<Tz: TimeZone>(at: DateTime<Tz>) -> Self {
        Self::Fixed(at.fixed_offset())
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<FixedOffset> {
        match self {
            Clock::Default => Local::now().fixed_offset(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Returns the local calendar date according to the clock.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Time left until the next local midnight.
    ///
    /// The default clock resolves midnight through the local timezone, so a
    /// DST shift on the boundary is reflected in the result. Returns zero if
    /// the next midnight cannot be represented.
    #[must_use]
    pub fn until_next_midnight(&self) -> Duration {
        let now = self.now();
        let Some(midnight) = now
            .date_naive()
            .succ_opt()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        else {
            return Duration::zero();
        };

        let next = match self {
            Clock::Default => Local
                .from_local_datetime(&midnight)
                .earliest()
                .map(|at| at.fixed_offset()),
            Clock::Fixed(t) => t.offset().from_local_datetime(&midnight).single(),
        };

        next.map_or_else(Duration::zero, |at| (at - now).max(Duration::zero()))
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Returns true if this clock represents real time.
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, Clock::Default)
    }

    /// Returns true if this clock is fixed.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic timestamp for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<FixedOffset> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
        .fixed_offset()
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

/// Returns a `Clock` fixed at noon UTC on the given date.
///
/// # Panics
///
/// Panics if noon cannot be represented on `date`.
#[must_use]
pub fn clock_on(date: NaiveDate) -> Clock {
    let noon = date.and_hms_opt(12, 0, 0).expect("noon should be valid");
    Clock::fixed(Utc.from_utc_datetime(&noon))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fixed_clock_reports_its_own_date() {
        let clock = fixed_clock();
        assert!(clock.is_fixed());
        assert_eq!(clock.today(), date(2023, 11, 14));
    }

    #[test]
    fn today_uses_the_fixed_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let clock = Clock::fixed(fixed_now().with_timezone(&offset));
        // 22:13 UTC is already past midnight at UTC+3.
        assert_eq!(clock.today(), date(2023, 11, 15));
    }

    #[test]
    fn advance_moves_fixed_clock_across_days() {
        let mut clock = clock_on(date(2025, 9, 1));
        clock.advance(Duration::days(3));
        assert_eq!(clock.today(), date(2025, 9, 4));
    }

    #[test]
    fn advance_is_noop_for_default_clock() {
        let mut clock = Clock::default_clock();
        clock.advance(Duration::days(3));
        assert!(clock.is_default());
    }

    #[test]
    fn until_next_midnight_counts_down_from_noon() {
        let clock = clock_on(date(2025, 9, 1));
        assert_eq!(clock.until_next_midnight(), Duration::hours(12));
    }

    #[test]
    fn until_next_midnight_is_short_just_before_midnight() {
        let clock = Clock::fixed(fixed_now());
        assert_eq!(
            clock.until_next_midnight(),
            Duration::hours(1) + Duration::minutes(46) + Duration::seconds(40)
        );
    }
}
