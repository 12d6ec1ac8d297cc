use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use quiz_core::model::{
    AllowancePolicy, ContestProgress, ContestRecord, ContestSettings, DailyAllowance,
};
use storage::repository::KeyValueStore;

use crate::Clock;
use crate::error::AllowanceServiceError;

/// Storage key of today's allowance record.
pub const DAILY_LIMIT_KEY: &str = "quiz2play-daily-limit";

/// Storage key of the cumulative contest counter.
pub const CONTEST_PROGRESS_KEY: &str = "quiz2play-contest-progress";

/// Everything the quiz screens need to gate play and render countdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceStatus {
    pub today: DailyAllowance,
    pub available_questions: u32,
    pub can_play: bool,
    pub contest: ContestProgress,
    pub seconds_until_reset: i64,
}

/// Tracks the daily question allowance and contest progress of one player.
///
/// Reads never write back: a rolled-over record only reaches storage once
/// something is recorded on the new day. Updates are serialized per service
/// (and its clones) so concurrent callers do not lose increments.
#[derive(Clone)]
pub struct AllowanceService {
    clock: Clock,
    policy: AllowancePolicy,
    contest: ContestSettings,
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl AllowanceService {
    /// Service with the default allowance policy and contest window.
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_settings(
            clock,
            AllowancePolicy::default(),
            ContestSettings::default(),
            store,
        )
    }

    #[must_use]
    pub fn with_settings(
        clock: Clock,
        policy: AllowancePolicy,
        contest: ContestSettings,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            clock,
            policy,
            contest,
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Same store and lock, different clock.
    #[must_use]
    pub fn with_clock(&self, clock: Clock) -> Self {
        Self {
            clock,
            ..self.clone()
        }
    }

    /// Today's allowance record, rolled over from the stored one if needed.
    ///
    /// # Errors
    ///
    /// Returns `AllowanceServiceError` if storage cannot be read.
    pub async fn daily_question_data(&self) -> Result<DailyAllowance, AllowanceServiceError> {
        let today = self.clock.today();
        let stored: Option<DailyAllowance> = self.load_record(DAILY_LIMIT_KEY).await?;
        if let Some(previous) = stored.as_ref().filter(|record| record.date() != today) {
            debug!(
                from = %previous.date(),
                to = %today,
                unused = previous.unused_daily_questions(),
                "rolling over daily allowance"
            );
        }
        Ok(DailyAllowance::for_day(stored, today, &self.policy))
    }

    /// Count `n` questions against today's allowance and persist the record.
    ///
    /// # Errors
    ///
    /// Returns `AllowanceServiceError` if storage fails or the record cannot be encoded.
    pub async fn update_daily_question_count(
        &self,
        n: u32,
    ) -> Result<DailyAllowance, AllowanceServiceError> {
        let _guard = self.write_lock.lock().await;
        self.apply_daily(n).await
    }

    /// Questions still available today, never negative.
    ///
    /// # Errors
    ///
    /// Returns `AllowanceServiceError` if storage cannot be read.
    pub async fn available_questions(&self) -> Result<u32, AllowanceServiceError> {
        Ok(self.daily_question_data().await?.available_questions())
    }

    /// Whether at least one question is available today.
    ///
    /// # Errors
    ///
    /// Returns `AllowanceServiceError` if storage cannot be read.
    pub async fn can_play_quiz(&self) -> Result<bool, AllowanceServiceError> {
        Ok(self.available_questions().await? > 0)
    }

    /// Progress through the contest window as of today.
    ///
    /// # Errors
    ///
    /// Returns `AllowanceServiceError` if storage cannot be read.
    pub async fn contest_progress(&self) -> Result<ContestProgress, AllowanceServiceError> {
        let record: ContestRecord = self
            .load_record(CONTEST_PROGRESS_KEY)
            .await?
            .unwrap_or_default();
        Ok(self.progress_from(record))
    }

    /// Add `n` questions to the cumulative contest counter.
    ///
    /// # Errors
    ///
    /// Returns `AllowanceServiceError` if storage fails or the record cannot be encoded.
    pub async fn update_contest_progress(
        &self,
        n: u32,
    ) -> Result<ContestProgress, AllowanceServiceError> {
        let _guard = self.write_lock.lock().await;
        self.apply_contest(n).await
    }

    /// Record a finished round against both the daily allowance and the contest.
    ///
    /// # Errors
    ///
    /// Returns `AllowanceServiceError` if storage fails or a record cannot be encoded.
    pub async fn record_questions_played(
        &self,
        n: u32,
    ) -> Result<AllowanceStatus, AllowanceServiceError> {
        let _guard = self.write_lock.lock().await;
        let today = self.apply_daily(n).await?;
        let contest = self.apply_contest(n).await?;
        Ok(self.status_from(today, contest))
    }

    /// Time until the daily allowance resets at local midnight.
    #[must_use]
    pub fn time_until_reset(&self) -> Duration {
        self.clock.until_next_midnight()
    }

    /// Snapshot of today's allowance, contest progress and reset countdown.
    ///
    /// # Errors
    ///
    /// Returns `AllowanceServiceError` if storage cannot be read.
    pub async fn status(&self) -> Result<AllowanceStatus, AllowanceServiceError> {
        let today = self.daily_question_data().await?;
        let contest = self.contest_progress().await?;
        Ok(self.status_from(today, contest))
    }

    async fn apply_daily(&self, n: u32) -> Result<DailyAllowance, AllowanceServiceError> {
        let mut record = self.daily_question_data().await?;
        record.record_played(n);
        self.save_record(DAILY_LIMIT_KEY, &record).await?;
        info!(
            date = %record.date(),
            added = n,
            played = record.questions_played(),
            available = record.available_questions(),
            "updated daily question count"
        );
        Ok(record)
    }

    async fn apply_contest(&self, n: u32) -> Result<ContestProgress, AllowanceServiceError> {
        let mut record: ContestRecord = self
            .load_record(CONTEST_PROGRESS_KEY)
            .await?
            .unwrap_or_default();
        record.record_played(n);
        self.save_record(CONTEST_PROGRESS_KEY, &record).await?;
        info!(
            added = n,
            total = record.total_questions_played,
            "updated contest progress"
        );
        Ok(self.progress_from(record))
    }

    fn progress_from(&self, record: ContestRecord) -> ContestProgress {
        ContestProgress::compute(&self.contest, &self.policy, self.clock.today(), record)
    }

    fn status_from(&self, today: DailyAllowance, contest: ContestProgress) -> AllowanceStatus {
        AllowanceStatus {
            available_questions: today.available_questions(),
            can_play: today.can_play(),
            today,
            contest,
            seconds_until_reset: self.time_until_reset().num_seconds(),
        }
    }

    /// Read and decode a record; undecodable values count as absent.
    async fn load_record<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, AllowanceServiceError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(key, error = %err, "ignoring malformed stored record");
                Ok(None)
            }
        }
    }

    async fn save_record<T: Serialize>(
        &self,
        key: &str,
        record: &T,
    ) -> Result<(), AllowanceServiceError> {
        let raw = serde_json::to_string(record)?;
        self.store.set(key, &raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use quiz_core::time::clock_on;
    use storage::repository::{InMemoryStore, StorageError};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn service_on(d: u32, store: &InMemoryStore) -> AllowanceService {
        AllowanceService::new(clock_on(day(d)), Arc::new(store.clone()))
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    #[tokio::test]
    async fn reads_do_not_write_back() {
        let store = InMemoryStore::new();
        let service = service_on(1, &store);

        let record = service.daily_question_data().await.unwrap();
        assert_eq!(record.available_questions(), 10);
        assert_eq!(store.get(DAILY_LIMIT_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_daily_record_is_treated_as_absent() {
        let store = InMemoryStore::new();
        store.set(DAILY_LIMIT_KEY, "{not json").await.unwrap();
        let service = service_on(1, &store);

        let record = service.daily_question_data().await.unwrap();
        assert_eq!(record, DailyAllowance::fresh(day(1), &AllowancePolicy::default()));

        let updated = service.update_daily_question_count(2).await.unwrap();
        assert_eq!(updated.questions_played(), 2);
    }

    #[tokio::test]
    async fn negative_counts_are_treated_as_malformed() {
        let store = InMemoryStore::new();
        store
            .set(CONTEST_PROGRESS_KEY, r#"{"totalQuestionsPlayed":-4}"#)
            .await
            .unwrap();
        let service = service_on(1, &store);

        let progress = service.contest_progress().await.unwrap();
        assert_eq!(progress.total_questions_played(), 0);
    }

    #[tokio::test]
    async fn writes_use_the_documented_layout() {
        let store = InMemoryStore::new();
        let service = service_on(3, &store);
        service.record_questions_played(4).await.unwrap();

        let daily: serde_json::Value =
            serde_json::from_str(&store.get(DAILY_LIMIT_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(
            daily,
            serde_json::json!({
                "date": "2025-09-03",
                "questionsPlayed": 4,
                "maxQuestionsPerDay": 10,
                "accumulatedQuestions": 0
            })
        );

        let contest = store.get(CONTEST_PROGRESS_KEY).await.unwrap().unwrap();
        assert_eq!(contest, r#"{"totalQuestionsPlayed":4}"#);
    }

    #[tokio::test]
    async fn storage_failures_propagate() {
        let service = AllowanceService::new(clock_on(day(1)), Arc::new(BrokenStore));
        let err = service.can_play_quiz().await.unwrap_err();
        assert!(matches!(err, AllowanceServiceError::Storage(_)));
    }

    #[tokio::test]
    async fn with_clock_shares_the_store() {
        let store = InMemoryStore::new();
        let monday = service_on(1, &store);
        monday.update_daily_question_count(3).await.unwrap();

        let tuesday = monday.with_clock(clock_on(day(2)));
        let record = tuesday.daily_question_data().await.unwrap();
        assert_eq!(record.accumulated_questions(), 7);
        assert_eq!(tuesday.available_questions().await.unwrap(), 17);
    }

    #[tokio::test]
    async fn status_reports_reset_countdown() {
        let store = InMemoryStore::new();
        let service = service_on(1, &store);
        let status = service.status().await.unwrap();
        assert_eq!(status.seconds_until_reset, 12 * 3600);
        assert_eq!(status.available_questions, 10);
        assert!(status.can_play);
        assert_eq!(status.contest.day_number(), 1);
    }
}
