use std::sync::Arc;

use quiz_core::model::{AllowancePolicy, ContestSettings};
use storage::repository::Storage;

use crate::Clock;
use crate::allowance_service::AllowanceService;
use crate::error::AppServicesError;

/// Assembles app-facing services over a storage backend.
#[derive(Clone)]
pub struct AppServices {
    allowance: Arc<AllowanceService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        policy: AllowancePolicy,
        contest: ContestSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, policy, contest))
    }

    /// Build services over an already opened storage backend.
    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        policy: AllowancePolicy,
        contest: ContestSettings,
    ) -> Self {
        let allowance = Arc::new(AllowanceService::with_settings(
            clock,
            policy,
            contest,
            Arc::clone(&storage.kv),
        ));
        Self { allowance }
    }

    #[must_use]
    pub fn allowance(&self) -> Arc<AllowanceService> {
        Arc::clone(&self.allowance)
    }
}
