use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use shared::*;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::products)]
pub struct ProductRow {
    pub id: Uuid,
    pub name: String,
    pub total_stock: i32,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
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

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::availability_intervals)]
pub struct StoredInterval {
    pub id: Uuid,
    pub product_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity: i32,
    pub status: String,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
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
    pub note: Option<String>,
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

impl From<StoredInterval> for AvailabilityInterval {
    fn from(row: StoredInterval) -> Self {
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
