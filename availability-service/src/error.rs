use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Interval not found: {0}")]
    IntervalNotFound(Uuid),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Insufficient stock: {0}")]
    Insufficient(String),

    #[error("Concurrent update, retry: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<diesel::result::Error> for AvailabilityError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
                AvailabilityError::Conflict(info.message().to_string())
            }
            other => AvailabilityError::Database(other.to_string()),
        }
    }
}
