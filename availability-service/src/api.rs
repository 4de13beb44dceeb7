use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

use crate::error::AvailabilityError;
use crate::repository::{AvailabilityRepository, ManualBlock};
use crate::service::AvailabilityService;

pub struct AppState<R: AvailabilityRepository> {
    pub service: AvailabilityService<R>,
}

impl<R: AvailabilityRepository> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CatalogFilterRequest {
    pub product_ids: Vec<Uuid>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity: i32,
    pub status: IntervalStatus,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: AvailabilityError) -> ApiError {
    let status = match &err {
        AvailabilityError::ProductNotFound(_) | AvailabilityError::IntervalNotFound(_) => StatusCode::NOT_FOUND,
        AvailabilityError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AvailabilityError::Insufficient(_) | AvailabilityError::Conflict(_) => StatusCode::CONFLICT,
        AvailabilityError::Database(_) => {
            tracing::error!("Availability request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}

pub fn create_router<R: AvailabilityRepository + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .route("/products/:id/availability", get(check_availability::<R>))
        .route("/products/:id/calendar/:year/:month", get(project_month::<R>))
        .route("/products/:id/blocks", post(block_dates::<R>))
        .route("/blocks/:id/release", post(release_block::<R>))
        .route("/catalog/unavailable", post(filter_unavailable::<R>))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn check_availability<R: AvailabilityRepository>(
    State(state): State<AppState<R>>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResult>, ApiError> {
    state
        .service
        .check_availability(product_id, query.start, query.end, query.quantity)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn project_month<R: AvailabilityRepository>(
    State(state): State<AppState<R>>,
    Path((product_id, year, month)): Path<(Uuid, i32, u32)>,
) -> Result<Json<MonthProjection>, ApiError> {
    state
        .service
        .project_month(product_id, year, month)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn filter_unavailable<R: AvailabilityRepository>(
    State(state): State<AppState<R>>,
    Json(request): Json<CatalogFilterRequest>,
) -> Result<Json<UnavailabilityResult>, ApiError> {
    state
        .service
        .filter_unavailable_ids(request.product_ids, request.start, request.end)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn block_dates<R: AvailabilityRepository>(
    State(state): State<AppState<R>>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<BlockRequest>,
) -> Result<(StatusCode, Json<AvailabilityInterval>), ApiError> {
    let block = ManualBlock {
        product_id,
        start_date: request.start_date,
        end_date: request.end_date,
        quantity: request.quantity,
        status: request.status,
        note: request.note,
    };
    state
        .service
        .block_dates(block)
        .await
        .map(|interval| (StatusCode::CREATED, Json(interval)))
        .map_err(api_error)
}

pub async fn release_block<R: AvailabilityRepository>(
    State(state): State<AppState<R>>,
    Path(interval_id): Path<Uuid>,
) -> Result<Json<AvailabilityInterval>, ApiError> {
    state
        .service
        .release_block(interval_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "availability-service"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockAvailabilityRepository;
    use crate::service::AvailabilityConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(repo: MockAvailabilityRepository) -> Router {
        create_router(AppState {
            service: AvailabilityService::new(repo, AvailabilityConfig::default()),
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn availability_query_defaults_to_one_unit() {
        let product = Product {
            id: Uuid::new_v4(),
            name: "Dance floor panel".to_string(),
            total_stock: 4,
            is_active: true,
        };
        let id = product.id;
        let mut repo = MockAvailabilityRepository::new();
        repo.expect_get_product().returning(move |_| Ok(Some(product.clone())));
        repo.expect_query_intervals().returning(|_, _, _| Ok(Vec::new()));

        let response = app(repo)
            .oneshot(
                Request::get(format!("/products/{}/availability?start=2025-06-10&end=2025-06-12", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["available"], true);
        assert_eq!(body["min_available_quantity"], 4);
    }

    #[tokio::test]
    async fn inverted_range_is_unprocessable() {
        let response = app(MockAvailabilityRepository::new())
            .oneshot(
                Request::get(format!(
                    "/products/{}/availability?start=2025-06-12&end=2025-06-10",
                    Uuid::new_v4()
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn releasing_unknown_block_is_not_found() {
        let mut repo = MockAvailabilityRepository::new();
        repo.expect_get_interval().returning(|_| Ok(None));

        let response = app(repo)
            .oneshot(
                Request::post(format!("/blocks/{}/release", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
