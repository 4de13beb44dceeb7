//! Persistence seams of the write path.
//!
//! `BookingStore` hands out `BookingTx` units of work. Everything a checkout or a
//! lifecycle transition writes goes through one `BookingTx` and becomes visible
//! only on `commit`; dropping or rolling back a transaction discards it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerIdentity {
    /// Keyed by the account's user id.
    Account(Uuid),
    /// Keyed by lower-cased email.
    Guest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpsert {
    pub identity: CustomerIdentity,
    pub contact: ContactInfo,
    pub marketing_opt_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub address_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub delivery_type: DeliveryType,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub deposit_amount: i64,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub deposit_status: DepositStatus,
    pub deposit_refunded_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub duration_days: i32,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentTask {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub task_type: FulfillmentTaskType,
    pub scheduled_date: NaiveDate,
    pub status: String,
    pub snapshot: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationDetails {
    pub reservation: Reservation,
    pub items: Vec<LineItem>,
    pub tasks: Vec<FulfillmentTask>,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError>;

    async fn get_products(&self, ids: Vec<Uuid>) -> Result<Vec<Product>, StoreError>;

    async fn get_reservation(&self, id: Uuid) -> Result<Option<ReservationDetails>, StoreError>;

    /// Written outside any checkout transaction; callers treat failure as non-fatal.
    async fn create_fulfillment_tasks(&self, tasks: Vec<FulfillmentTask>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BookingTx: Send {
    /// Serializes writers per product until the transaction ends. Ids are locked in
    /// sorted order.
    async fn lock_products(&mut self, product_ids: &[Uuid]) -> Result<(), StoreError>;

    async fn get_products(&mut self, product_ids: &[Uuid]) -> Result<Vec<Product>, StoreError>;

    /// Consuming intervals overlapping `[start, end]`, cancelled reservations excluded.
    async fn query_intervals(
        &mut self,
        product_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailabilityInterval>, StoreError>;

    async fn upsert_customer(&mut self, customer: &CustomerUpsert) -> Result<Uuid, StoreError>;

    async fn create_address(&mut self, customer_id: Uuid, address: &AddressInput) -> Result<Uuid, StoreError>;

    async fn insert_reservation_header(&mut self, reservation: &Reservation) -> Result<(), StoreError>;

    /// All or none of `items` are written.
    async fn insert_line_items(&mut self, items: &[LineItem]) -> Result<(), StoreError>;

    async fn delete_reservation(&mut self, reservation_id: Uuid) -> Result<(), StoreError>;

    async fn insert_intervals(&mut self, intervals: &[AvailabilityInterval]) -> Result<(), StoreError>;

    /// Reads the header and holds it against concurrent transitions.
    async fn lock_reservation(&mut self, reservation_id: Uuid) -> Result<Option<Reservation>, StoreError>;

    async fn set_status(&mut self, reservation_id: Uuid, status: ReservationStatus) -> Result<(), StoreError>;

    async fn mark_deposit_refunded(&mut self, reservation_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn append_outbox(&mut self, event: &OutboxEvent) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}
