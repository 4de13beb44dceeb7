use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Date};
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AnsiTransactionManager, AsyncConnection, AsyncPgConnection, RunQueryDsl, TransactionManager};
use shared::*;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::*;
use crate::schema::*;
use crate::store::*;

pub type DbPool = Pool<AsyncPgConnection>;

type OwnedConn = bb8::PooledConnection<'static, AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: DbPool,
}

impl PgBookingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<OwnedConn, StoreError> {
        self.pool
            .get_owned()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        let mut conn = self.conn().await?;
        AnsiTransactionManager::begin_transaction_sql(&mut *conn, "BEGIN TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .await?;
        Ok(Box::new(PgBookingTx { conn }))
    }

    async fn get_products(&self, ids: Vec<Uuid>) -> Result<Vec<Product>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = products::table
            .filter(products::id.eq_any(ids))
            .load::<ProductRow>(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<ReservationDetails>, StoreError> {
        let mut conn = self.conn().await?;

        let row = reservations::table
            .filter(reservations::id.eq(id))
            .first::<ReservationRow>(&mut *conn)
            .await
            .optional()?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let items = reservation_items::table
            .filter(reservation_items::reservation_id.eq(id))
            .load::<LineItemRow>(&mut *conn)
            .await?;
        let tasks = fulfillment_tasks::table
            .filter(fulfillment_tasks::reservation_id.eq(id))
            .order(fulfillment_tasks::scheduled_date.asc())
            .load::<FulfillmentTaskRow>(&mut *conn)
            .await?;

        Ok(Some(ReservationDetails {
            reservation: row.try_into()?,
            items: items.into_iter().map(LineItem::try_from).collect::<Result<_, _>>()?,
            tasks: tasks.into_iter().map(FulfillmentTask::try_from).collect::<Result<_, _>>()?,
        }))
    }

    async fn create_fulfillment_tasks(&self, tasks: Vec<FulfillmentTask>) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let rows: Vec<FulfillmentTaskRow> = tasks.iter().map(FulfillmentTaskRow::from).collect();
        diesel::insert_into(fulfillment_tasks::table)
            .values(&rows)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// One `SERIALIZABLE` transaction on a dedicated pooled connection. A connection
/// dropped mid-transaction is discarded by the pool rather than reused.
pub struct PgBookingTx {
    conn: OwnedConn,
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn lock_products(&mut self, product_ids: &[Uuid]) -> Result<(), StoreError> {
        let mut keys: Vec<i64> = product_ids.iter().map(advisory_lock_key).collect();
        keys.sort_unstable();
        keys.dedup();

        for key in keys {
            diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
                .bind::<BigInt, _>(key)
                .execute(&mut *self.conn)
                .await?;
        }
        Ok(())
    }

    async fn get_products(&mut self, product_ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let rows = products::table
            .filter(products::id.eq_any(product_ids.to_vec()))
            .load::<ProductRow>(&mut *self.conn)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn query_intervals(
        &mut self,
        product_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailabilityInterval>, StoreError> {
        let rows = diesel::sql_query(OVERLAPPING_INTERVALS_SQL)
            .bind::<Array<diesel::sql_types::Uuid>, _>(product_ids.to_vec())
            .bind::<Date, _>(start)
            .bind::<Date, _>(end)
            .load::<IntervalRow>(&mut *self.conn)
            .await?;
        Ok(rows.into_iter().map(AvailabilityInterval::from).collect())
    }

    async fn upsert_customer(&mut self, customer: &CustomerUpsert) -> Result<Uuid, StoreError> {
        let email = customer.contact.email.to_lowercase();

        let existing = match customer.identity {
            CustomerIdentity::Account(user_id) => customers::table
                .filter(customers::user_id.eq(user_id))
                .select(customers::id)
                .first::<Uuid>(&mut *self.conn)
                .await
                .optional()?,
            CustomerIdentity::Guest => customers::table
                .filter(customers::user_id.is_null())
                .filter(customers::email.eq(&email))
                .select(customers::id)
                .first::<Uuid>(&mut *self.conn)
                .await
                .optional()?,
        };

        if let Some(id) = existing {
            diesel::update(customers::table.filter(customers::id.eq(id)))
                .set((
                    customers::full_name.eq(&customer.contact.full_name),
                    customers::email.eq(&email),
                    customers::phone.eq(&customer.contact.phone),
                    customers::marketing_opt_in.eq(customer.marketing_opt_in),
                    customers::updated_at.eq(Some(Utc::now())),
                ))
                .execute(&mut *self.conn)
                .await?;
            return Ok(id);
        }

        let row = NewCustomer {
            id: Uuid::new_v4(),
            user_id: match customer.identity {
                CustomerIdentity::Account(user_id) => Some(user_id),
                CustomerIdentity::Guest => None,
            },
            full_name: customer.contact.full_name.clone(),
            email,
            phone: customer.contact.phone.clone(),
            marketing_opt_in: customer.marketing_opt_in,
        };
        diesel::insert_into(customers::table)
            .values(&row)
            .execute(&mut *self.conn)
            .await?;
        Ok(row.id)
    }

    async fn create_address(&mut self, customer_id: Uuid, address: &AddressInput) -> Result<Uuid, StoreError> {
        let row = NewAddress {
            id: Uuid::new_v4(),
            customer_id,
            street: address.street.clone(),
            city: address.city.clone(),
            postal_code: address.postal_code.clone(),
            notes: address.notes.clone(),
        };
        diesel::insert_into(addresses::table)
            .values(&row)
            .execute(&mut *self.conn)
            .await?;
        Ok(row.id)
    }

    async fn insert_reservation_header(&mut self, reservation: &Reservation) -> Result<(), StoreError> {
        diesel::insert_into(reservations::table)
            .values(&ReservationRow::from(reservation))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn insert_line_items(&mut self, items: &[LineItem]) -> Result<(), StoreError> {
        let rows: Vec<LineItemRow> = items.iter().map(LineItemRow::from).collect();
        // Nested transaction = savepoint, so the outer transaction stays usable
        // for the compensating delete if this insert fails.
        self.conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    diesel::insert_into(reservation_items::table)
                        .values(&rows)
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .await?;
        Ok(())
    }

    async fn delete_reservation(&mut self, reservation_id: Uuid) -> Result<(), StoreError> {
        diesel::delete(availability_intervals::table.filter(availability_intervals::reservation_id.eq(reservation_id)))
            .execute(&mut *self.conn)
            .await?;
        diesel::delete(reservation_items::table.filter(reservation_items::reservation_id.eq(reservation_id)))
            .execute(&mut *self.conn)
            .await?;
        diesel::delete(reservations::table.filter(reservations::id.eq(reservation_id)))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn insert_intervals(&mut self, intervals: &[AvailabilityInterval]) -> Result<(), StoreError> {
        let rows: Vec<NewIntervalRow> = intervals.iter().map(NewIntervalRow::from).collect();
        diesel::insert_into(availability_intervals::table)
            .values(&rows)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn lock_reservation(&mut self, reservation_id: Uuid) -> Result<Option<Reservation>, StoreError> {
        let row = reservations::table
            .filter(reservations::id.eq(reservation_id))
            .for_update()
            .first::<ReservationRow>(&mut *self.conn)
            .await
            .optional()?;
        row.map(Reservation::try_from).transpose()
    }

    async fn set_status(&mut self, reservation_id: Uuid, status: ReservationStatus) -> Result<(), StoreError> {
        diesel::update(reservations::table.filter(reservations::id.eq(reservation_id)))
            .set((
                reservations::status.eq(status.as_str()),
                reservations::updated_at.eq(Some(Utc::now())),
            ))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn mark_deposit_refunded(&mut self, reservation_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        diesel::update(reservations::table.filter(reservations::id.eq(reservation_id)))
            .set((
                reservations::deposit_status.eq(DepositStatus::Refunded.as_str()),
                reservations::deposit_refunded_at.eq(Some(at)),
                reservations::updated_at.eq(Some(Utc::now())),
            ))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn append_outbox(&mut self, event: &OutboxEvent) -> Result<(), StoreError> {
        diesel::insert_into(outbox_events::table)
            .values(&DbOutboxEvent::from(event))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::commit_transaction(&mut *self.conn).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::rollback_transaction(&mut *self.conn).await?;
        Ok(())
    }
}
