pub mod app_config;
pub mod booking_repo;
pub mod bundle_repo;
pub mod database;
pub mod proof_storage;
pub mod redis_repo;

pub use booking_repo::PgBookingRepository;
pub use bundle_repo::PgBundleOrderRepository;
pub use database::DbClient;
pub use proof_storage::{FsProofStorage, InlineProofStorage};
pub use redis_repo::RedisClient;

use marquee_core::{BookingStatus, RepositoryError};

pub(crate) fn db_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

/// Maps a unique violation on insert to `DuplicateReference`.
pub(crate) fn insert_err(e: sqlx::Error, reference: &str) -> RepositoryError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => RepositoryError::DuplicateReference(reference.to_string()),
        _ => db_err(e),
    }
}

/// Every spelling of `status` that may sit in the column, legacy synonyms included.
pub(crate) fn stored_names(status: BookingStatus) -> Vec<String> {
    let mut names = vec![status.as_str().to_string()];
    match status {
        BookingStatus::PendingVerification => names.push("waiting_verification".to_string()),
        BookingStatus::PaymentRejected => names.push("rejected".to_string()),
        BookingStatus::Cancelled => names.push("canceled".to_string()),
        _ => {}
    }
    names
}

pub(crate) fn parse_status(raw: &str) -> Result<BookingStatus, RepositoryError> {
    raw.parse()
        .map_err(|e: marquee_core::UnknownStatus| RepositoryError::Corrupt(e.to_string()))
}
