use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{AvailabilityInterval, AvailabilityResult, IntervalStatus, Product};
use uuid::Uuid;

use crate::error::AvailabilityError;

/// An operator hold on a product's stock that is not tied to a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualBlock {
    pub product_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity: i32,
    pub status: IntervalStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Created(AvailabilityInterval),
    Insufficient(AvailabilityResult),
    ProductMissing,
}

/// Read access to the catalog and the interval ledger, plus operator blocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AvailabilityError>;

    async fn get_products(&self, ids: Vec<Uuid>) -> Result<Vec<Product>, AvailabilityError>;

    /// Consuming intervals of any of `product_ids` overlapping `[start, end]`.
    async fn query_intervals(
        &self,
        product_ids: Vec<Uuid>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailabilityInterval>, AvailabilityError>;

    /// Re-checks stock and inserts the block in one locked transaction.
    async fn insert_block(&self, block: ManualBlock) -> Result<BlockOutcome, AvailabilityError>;

    async fn get_interval(&self, id: Uuid) -> Result<Option<AvailabilityInterval>, AvailabilityError>;

    async fn release_interval(&self, id: Uuid) -> Result<(), AvailabilityError>;
}
