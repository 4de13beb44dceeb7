use bigdecimal::BigDecimal;
use diesel::prelude::*;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use shared::*;

use crate::error::StoreError;
use crate::store::{FulfillmentTask, LineItem, Reservation};

pub fn to_numeric(amount: i64) -> BigDecimal {
    BigDecimal::from(amount)
}

pub fn from_numeric(column: &str, value: &BigDecimal) -> Result<i64, StoreError> {
    value
        .to_i64()
        .ok_or_else(|| StoreError::Corrupt(format!("{} out of range: {}", column, value)))
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::products)]
pub struct ProductRow {
    pub id: Uuid,
    pub name: String,
    pub total_stock: i32,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            total_stock: row.total_stock,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::customers)]
pub struct NewCustomer {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub marketing_opt_in: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::addresses)]
pub struct NewAddress {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::reservations)]
pub struct ReservationRow {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub address_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub delivery_type: String,
    pub subtotal: BigDecimal,
    pub delivery_fee: BigDecimal,
    pub discount: BigDecimal,
    pub total: BigDecimal,
    pub deposit_amount: BigDecimal,
    pub status: String,
    pub payment_status: String,
    pub deposit_status: String,
    pub deposit_refunded_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::reservation_items)]
pub struct LineItemRow {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub duration_days: i32,
    pub unit_price: BigDecimal,
    pub subtotal: BigDecimal,
}

/// Row shape of `OVERLAPPING_INTERVALS_SQL`.
#[derive(Debug, Clone, QueryableByName)]
#[diesel(table_name = crate::schema::availability_intervals)]
pub struct IntervalRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity: i32,
    pub status: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::availability_intervals)]
pub struct NewIntervalRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity: i32,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::fulfillment_tasks)]
pub struct FulfillmentTaskRow {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub task_type: String,
    pub scheduled_date: NaiveDate,
    pub status: String,
    pub snapshot: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Reservation> for ReservationRow {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id,
            order_number: reservation.order_number.clone(),
            customer_id: reservation.customer_id,
            address_id: reservation.address_id,
            start_date: reservation.start_date,
            end_date: reservation.end_date,
            delivery_type: reservation.delivery_type.as_str().to_string(),
            subtotal: to_numeric(reservation.subtotal),
            delivery_fee: to_numeric(reservation.delivery_fee),
            discount: to_numeric(reservation.discount),
            total: to_numeric(reservation.total),
            deposit_amount: to_numeric(reservation.deposit_amount),
            status: reservation.status.as_str().to_string(),
            payment_status: reservation.payment_status.as_str().to_string(),
            deposit_status: reservation.deposit_status.as_str().to_string(),
            deposit_refunded_at: reservation.deposit_refunded_at,
            notes: reservation.notes.clone(),
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        }
    }
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let corrupt = |column: &str, value: &str| StoreError::Corrupt(format!("{} = {:?}", column, value));

        Ok(Self {
            id: row.id,
            order_number: row.order_number,
            customer_id: row.customer_id,
            address_id: row.address_id,
            start_date: row.start_date,
            end_date: row.end_date,
            delivery_type: DeliveryType::parse(&row.delivery_type)
                .ok_or_else(|| corrupt("delivery_type", &row.delivery_type))?,
            subtotal: from_numeric("subtotal", &row.subtotal)?,
            delivery_fee: from_numeric("delivery_fee", &row.delivery_fee)?,
            discount: from_numeric("discount", &row.discount)?,
            total: from_numeric("total", &row.total)?,
            deposit_amount: from_numeric("deposit_amount", &row.deposit_amount)?,
            status: ReservationStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?,
            payment_status: PaymentStatus::parse(&row.payment_status)
                .ok_or_else(|| corrupt("payment_status", &row.payment_status))?,
            deposit_status: DepositStatus::parse(&row.deposit_status)
                .ok_or_else(|| corrupt("deposit_status", &row.deposit_status))?,
            deposit_refunded_at: row.deposit_refunded_at,
            notes: row.notes,
        })
    }
}

impl From<&LineItem> for LineItemRow {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id,
            reservation_id: item.reservation_id,
            product_id: item.product_id,
            quantity: item.quantity,
            duration_days: item.duration_days,
            unit_price: to_numeric(item.unit_price),
            subtotal: to_numeric(item.subtotal),
        }
    }
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = StoreError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            reservation_id: row.reservation_id,
            product_id: row.product_id,
            quantity: row.quantity,
            duration_days: row.duration_days,
            unit_price: from_numeric("unit_price", &row.unit_price)?,
            subtotal: from_numeric("subtotal", &row.subtotal)?,
        })
    }
}

impl From<IntervalRow> for AvailabilityInterval {
    fn from(row: IntervalRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            reservation_id: row.reservation_id,
            start_date: row.start_date,
            end_date: row.end_date,
            quantity: row.quantity,
            status: IntervalStatus::parse(&row.status),
        }
    }
}

impl From<&AvailabilityInterval> for NewIntervalRow {
    fn from(interval: &AvailabilityInterval) -> Self {
        Self {
            id: interval.id,
            product_id: interval.product_id,
            reservation_id: interval.reservation_id,
            start_date: interval.start_date,
            end_date: interval.end_date,
            quantity: interval.quantity,
            status: interval.status.as_str().to_string(),
        }
    }
}

impl From<&FulfillmentTask> for FulfillmentTaskRow {
    fn from(task: &FulfillmentTask) -> Self {
        Self {
            id: task.id,
            reservation_id: task.reservation_id,
            task_type: task.task_type.as_str().to_string(),
            scheduled_date: task.scheduled_date,
            status: task.status.clone(),
            snapshot: task.snapshot.clone(),
            created_at: Some(Utc::now()),
        }
    }
}

impl TryFrom<FulfillmentTaskRow> for FulfillmentTask {
    type Error = StoreError;

    fn try_from(row: FulfillmentTaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            reservation_id: row.reservation_id,
            task_type: FulfillmentTaskType::parse(&row.task_type)
                .ok_or_else(|| StoreError::Corrupt(format!("task_type = {:?}", row.task_type)))?,
            scheduled_date: row.scheduled_date,
            status: row.status,
            snapshot: row.snapshot,
        })
    }
}

impl From<&OutboxEvent> for DbOutboxEvent {
    fn from(event: &OutboxEvent) -> Self {
        Self {
            id: event.id,
            aggregate_id: event.aggregate_id,
            event_type: event.event_type.clone(),
            event_data: event.event_data.clone(),
            processed: Some(event.processed),
            created_at: Some(event.created_at),
        }
    }
}
