use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

use crate::checkout::CheckoutOrchestrator;
use crate::error::LifecycleError;
use crate::lifecycle::ReservationLifecycle;
use crate::store::{BookingStore, Reservation, ReservationDetails};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

pub struct AppState<S: BookingStore + 'static> {
    pub checkout: Arc<CheckoutOrchestrator<S>>,
    pub lifecycle: ReservationLifecycle<S>,
}

impl<S: BookingStore + 'static> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            checkout: self.checkout.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ReservationStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: LifecycleError) -> ApiError {
    let status = match &err {
        LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::InvalidTransition { .. }
        | LifecycleError::DepositAlreadyRefunded(_)
        | LifecycleError::DepositNotRefundable(_) => StatusCode::CONFLICT,
        LifecycleError::Store(_) => {
            tracing::error!("Reservation request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}

fn checkout_status(code: CheckoutErrorCode) -> StatusCode {
    match code {
        CheckoutErrorCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutErrorCode::Unavailable => StatusCode::CONFLICT,
        CheckoutErrorCode::VerificationFailed => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutErrorCode::CommitFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The gateway sets both headers for signed-in callers and strips them from
/// anonymous requests.
fn principal_from(headers: &HeaderMap) -> Result<Option<Principal>, String> {
    let Some(raw_id) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let user_id = raw_id
        .to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| format!("malformed {} header", USER_ID_HEADER))?;
    let email = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Ok(Some(Principal { user_id, email }))
}

pub fn create_router<S: BookingStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/checkout", post(checkout::<S>))
        .route("/reservations/:id", get(get_reservation::<S>))
        .route("/reservations/:id/cancel", post(cancel_reservation::<S>))
        .route("/reservations/:id/refund-deposit", post(refund_deposit::<S>))
        .route("/reservations/:id/status", put(update_status::<S>))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn checkout<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutPayload>,
) -> (StatusCode, Json<CheckoutResult>) {
    let principal = match principal_from(&headers) {
        Ok(principal) => principal,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(CheckoutResult::failed(CheckoutErrorCode::Validation, e)),
            )
        }
    };

    match state.checkout.checkout(principal.as_ref(), payload).await {
        Ok(receipt) => (StatusCode::OK, Json(CheckoutResult::from(&receipt))),
        Err(e) => {
            let code = e.code();
            (checkout_status(code), Json(CheckoutResult::failed(code, e.to_string())))
        }
    }
}

pub async fn get_reservation<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationDetails>, ApiError> {
    state.lifecycle.get_reservation(id).await.map(Json).map_err(api_error)
}

pub async fn cancel_reservation<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    state.lifecycle.cancel_reservation(id).await.map(Json).map_err(api_error)
}

pub async fn refund_deposit<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    state.lifecycle.refund_deposit(id).await.map(Json).map_err(api_error)
}

pub async fn update_status<S: BookingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Reservation>, ApiError> {
    state
        .lifecycle
        .update_status(id, request.status)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn health_check() -> &'static str {
    "OK"
}
