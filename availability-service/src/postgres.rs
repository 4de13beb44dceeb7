use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Date};
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use shared::*;
use tracing::info;
use uuid::Uuid;

use crate::error::AvailabilityError;
use crate::models::*;
use crate::repository::{AvailabilityRepository, BlockOutcome, ManualBlock};
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

pub struct PgAvailabilityRepository {
    pool: DbPool,
}

impl PgAvailabilityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(
        &self,
    ) -> Result<diesel_async::pooled_connection::bb8::PooledConnection<'_, AsyncPgConnection>, AvailabilityError> {
        self.pool
            .get()
            .await
            .map_err(|e| AvailabilityError::Database(format!("connection pool: {}", e)))
    }
}

async fn load_overlapping(
    conn: &mut AsyncPgConnection,
    product_ids: Vec<Uuid>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<AvailabilityInterval>, AvailabilityError> {
    let rows = diesel::sql_query(OVERLAPPING_INTERVALS_SQL)
        .bind::<Array<diesel::sql_types::Uuid>, _>(product_ids)
        .bind::<Date, _>(start)
        .bind::<Date, _>(end)
        .load::<IntervalRow>(conn)
        .await?;
    Ok(rows.into_iter().map(AvailabilityInterval::from).collect())
}

#[async_trait]
impl AvailabilityRepository for PgAvailabilityRepository {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AvailabilityError> {
        let mut conn = self.conn().await?;
        let row = products::table
            .filter(products::id.eq(id))
            .first::<ProductRow>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Product::from))
    }

    async fn get_products(&self, ids: Vec<Uuid>) -> Result<Vec<Product>, AvailabilityError> {
        let mut conn = self.conn().await?;
        let rows = products::table
            .filter(products::id.eq_any(ids))
            .load::<ProductRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn query_intervals(
        &self,
        product_ids: Vec<Uuid>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailabilityInterval>, AvailabilityError> {
        let mut conn = self.conn().await?;
        load_overlapping(&mut conn, product_ids, start, end).await
    }

    async fn insert_block(&self, block: ManualBlock) -> Result<BlockOutcome, AvailabilityError> {
        let mut conn = self.conn().await?;

        conn.build_transaction()
            .serializable()
            .run::<_, AvailabilityError, _>(|conn| {
                Box::pin(async move {
                    diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
                        .bind::<BigInt, _>(advisory_lock_key(&block.product_id))
                        .execute(conn)
                        .await?;

                    let product = products::table
                        .filter(products::id.eq(block.product_id))
                        .first::<ProductRow>(conn)
                        .await
                        .optional()?;
                    let product = match product {
                        Some(row) if row.is_active => row,
                        _ => return Ok(BlockOutcome::ProductMissing),
                    };

                    let intervals =
                        load_overlapping(conn, vec![block.product_id], block.start_date, block.end_date).await?;
                    let check = compute_availability(
                        product.total_stock,
                        &intervals,
                        block.start_date,
                        block.end_date,
                        block.quantity,
                    );
                    if !check.available {
                        return Ok(BlockOutcome::Insufficient(check));
                    }

                    let row = NewIntervalRow {
                        id: Uuid::new_v4(),
                        product_id: block.product_id,
                        reservation_id: None,
                        start_date: block.start_date,
                        end_date: block.end_date,
                        quantity: block.quantity,
                        status: block.status.as_str().to_string(),
                        note: block.note.clone(),
                    };
                    diesel::insert_into(availability_intervals::table)
                        .values(&row)
                        .execute(conn)
                        .await?;

                    info!(
                        "Blocked {} unit(s) of product {} from {} to {}",
                        row.quantity, row.product_id, row.start_date, row.end_date
                    );

                    Ok(BlockOutcome::Created(AvailabilityInterval {
                        id: row.id,
                        product_id: row.product_id,
                        reservation_id: None,
                        start_date: row.start_date,
                        end_date: row.end_date,
                        quantity: row.quantity,
                        status: block.status,
                    }))
                })
            })
            .await
    }

    async fn get_interval(&self, id: Uuid) -> Result<Option<AvailabilityInterval>, AvailabilityError> {
        let mut conn = self.conn().await?;
        let row = availability_intervals::table
            .filter(availability_intervals::id.eq(id))
            .first::<StoredInterval>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(AvailabilityInterval::from))
    }

    async fn release_interval(&self, id: Uuid) -> Result<(), AvailabilityError> {
        let mut conn = self.conn().await?;
        diesel::update(
            availability_intervals::table
                .filter(availability_intervals::id.eq(id))
                .filter(availability_intervals::reservation_id.is_null()),
        )
        .set(availability_intervals::status.eq(IntervalStatus::Released.as_str()))
        .execute(&mut conn)
        .await?;
        Ok(())
    }
}
