#![forbid(unsafe_code)]

pub mod allowance_service;
pub mod app_services;
pub mod error;

pub use quiz_core::Clock;

pub use allowance_service::{
    AllowanceService, AllowanceStatus, CONTEST_PROGRESS_KEY, DAILY_LIMIT_KEY,
};
pub use app_services::AppServices;
pub use error::{AllowanceServiceError, AppServicesError};
