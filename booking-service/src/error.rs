use chrono::NaiveDate;
use shared::{CheckoutErrorCode, ReservationStatus};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Invalid checkout: {0}")]
    Validation(String),

    #[error("Line {line}: product {product_id} is not available ({reason})")]
    LineUnavailable {
        line: usize,
        product_id: Uuid,
        available: i32,
        conflicting_dates: Vec<NaiveDate>,
        reason: String,
    },

    #[error("Could not verify availability, please contact us: {0}")]
    VerificationFailed(String),

    #[error("Guest checkout failed: {0}")]
    GuestProcedure(String),

    #[error("Checkout could not be committed: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    pub fn code(&self) -> CheckoutErrorCode {
        match self {
            CheckoutError::Validation(_) => CheckoutErrorCode::Validation,
            CheckoutError::LineUnavailable { .. } => CheckoutErrorCode::Unavailable,
            CheckoutError::VerificationFailed(_) => CheckoutErrorCode::VerificationFailed,
            CheckoutError::GuestProcedure(_) | CheckoutError::Store(_) => CheckoutErrorCode::CommitFailed,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Reservation not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot move reservation from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Deposit for reservation {0} was already refunded")]
    DepositAlreadyRefunded(Uuid),

    #[error("Deposit can only be refunded once a reservation is cancelled or completed (status: {0})")]
    DepositNotRefundable(ReservationStatus),

    #[error(transparent)]
    Store(#[from] StoreError),
}
