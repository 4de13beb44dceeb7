//! In-memory `BookingStore` with fault injection.
//!
//! Transactions take the whole store's lock for their lifetime and work on a
//! staged copy that replaces the live state on commit, so concurrent checkouts
//! serialize exactly as they do under the per-product advisory locks in Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::*;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    QueryIntervals,
    UpsertCustomer,
    LineItems,
    Intervals,
    FulfillmentTasks,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCustomer {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub contact: ContactInfo,
    pub marketing_opt_in: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub products: HashMap<Uuid, Product>,
    pub customers: HashMap<Uuid, StoredCustomer>,
    pub addresses: HashMap<Uuid, (Uuid, AddressInput)>,
    pub reservations: HashMap<Uuid, Reservation>,
    pub items: Vec<LineItem>,
    pub intervals: Vec<AvailabilityInterval>,
    pub tasks: Vec<FulfillmentTask>,
    pub outbox: Vec<OutboxEvent>,
}

impl MemoryState {
    /// Same filter as `OVERLAPPING_INTERVALS_SQL`.
    pub fn consuming_intervals(
        &self,
        product_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<AvailabilityInterval> {
        self.intervals
            .iter()
            .filter(|i| product_ids.contains(&i.product_id))
            .filter(|i| i.status.is_consuming() && i.overlaps(start, end))
            .filter(|i| match i.reservation_id.and_then(|id| self.reservations.get(&id)) {
                Some(reservation) => reservation.status != ReservationStatus::Cancelled,
                None => true,
            })
            .cloned()
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryBookingStore {
    state: Arc<AsyncMutex<MemoryState>>,
    faults: Arc<Mutex<HashSet<FaultPoint>>>,
    removed_headers: Arc<Mutex<Vec<Uuid>>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn add_interval(&self, interval: AvailabilityInterval) {
        self.state.lock().await.intervals.push(interval);
    }

    pub fn fail_on(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(point);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    /// Reservations a transaction deleted while their header was staged, in
    /// order. Kept even when that transaction later rolls back.
    pub fn removed_headers(&self) -> Vec<Uuid> {
        self.removed_headers
            .lock()
            .map(|removed| removed.clone())
            .unwrap_or_default()
    }

    /// A copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

fn check_fault(faults: &Mutex<HashSet<FaultPoint>>, point: FaultPoint) -> Result<(), StoreError> {
    let injected = faults.lock().map(|f| f.contains(&point)).unwrap_or(false);
    if injected {
        return Err(StoreError::Database(format!("injected failure at {:?}", point)));
    }
    Ok(())
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            staged,
            faults: self.faults.clone(),
            removed_headers: self.removed_headers.clone(),
        }))
    }

    async fn get_products(&self, ids: Vec<Uuid>) -> Result<Vec<Product>, StoreError> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<ReservationDetails>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.reservations.get(&id).map(|reservation| ReservationDetails {
            reservation: reservation.clone(),
            items: state.items.iter().filter(|i| i.reservation_id == id).cloned().collect(),
            tasks: state.tasks.iter().filter(|t| t.reservation_id == id).cloned().collect(),
        }))
    }

    async fn create_fulfillment_tasks(&self, tasks: Vec<FulfillmentTask>) -> Result<(), StoreError> {
        check_fault(&self.faults, FaultPoint::FulfillmentTasks)?;
        self.state.lock().await.tasks.extend(tasks);
        Ok(())
    }
}

struct MemoryTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    staged: MemoryState,
    faults: Arc<Mutex<HashSet<FaultPoint>>>,
    removed_headers: Arc<Mutex<Vec<Uuid>>>,
}

impl MemoryTx {
    fn open(&mut self) -> Result<&mut MemoryState, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Database("transaction already closed".to_string()));
        }
        Ok(&mut self.staged)
    }

    fn fault(&self, point: FaultPoint) -> Result<(), StoreError> {
        check_fault(&self.faults, point)
    }
}

#[async_trait]
impl BookingTx for MemoryTx {
    async fn lock_products(&mut self, _product_ids: &[Uuid]) -> Result<(), StoreError> {
        self.open().map(|_| ())
    }

    async fn get_products(&mut self, product_ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let state = self.open()?;
        Ok(product_ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn query_intervals(
        &mut self,
        product_ids: &[Uuid],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailabilityInterval>, StoreError> {
        self.fault(FaultPoint::QueryIntervals)?;
        Ok(self.open()?.consuming_intervals(product_ids, start, end))
    }

    async fn upsert_customer(&mut self, customer: &CustomerUpsert) -> Result<Uuid, StoreError> {
        self.fault(FaultPoint::UpsertCustomer)?;
        let state = self.open()?;
        let email = customer.contact.email.to_lowercase();

        let existing = state.customers.values_mut().find(|c| match customer.identity {
            CustomerIdentity::Account(user_id) => c.user_id == Some(user_id),
            CustomerIdentity::Guest => c.user_id.is_none() && c.contact.email == email,
        });

        if let Some(found) = existing {
            found.contact = ContactInfo {
                email,
                ..customer.contact.clone()
            };
            found.marketing_opt_in = customer.marketing_opt_in;
            return Ok(found.id);
        }

        let id = Uuid::new_v4();
        state.customers.insert(
            id,
            StoredCustomer {
                id,
                user_id: match customer.identity {
                    CustomerIdentity::Account(user_id) => Some(user_id),
                    CustomerIdentity::Guest => None,
                },
                contact: ContactInfo {
                    email,
                    ..customer.contact.clone()
                },
                marketing_opt_in: customer.marketing_opt_in,
            },
        );
        Ok(id)
    }

    async fn create_address(&mut self, customer_id: Uuid, address: &AddressInput) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.open()?.addresses.insert(id, (customer_id, address.clone()));
        Ok(id)
    }

    async fn insert_reservation_header(&mut self, reservation: &Reservation) -> Result<(), StoreError> {
        self.open()?
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn insert_line_items(&mut self, items: &[LineItem]) -> Result<(), StoreError> {
        self.fault(FaultPoint::LineItems)?;
        self.open()?.items.extend_from_slice(items);
        Ok(())
    }

    async fn delete_reservation(&mut self, reservation_id: Uuid) -> Result<(), StoreError> {
        let state = self.open()?;
        let removed = state.reservations.remove(&reservation_id).is_some();
        state.items.retain(|i| i.reservation_id != reservation_id);
        state.intervals.retain(|i| i.reservation_id != Some(reservation_id));
        if removed {
            if let Ok(mut log) = self.removed_headers.lock() {
                log.push(reservation_id);
            }
        }
        Ok(())
    }

    async fn insert_intervals(&mut self, intervals: &[AvailabilityInterval]) -> Result<(), StoreError> {
        self.fault(FaultPoint::Intervals)?;
        self.open()?.intervals.extend_from_slice(intervals);
        Ok(())
    }

    async fn lock_reservation(&mut self, reservation_id: Uuid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.open()?.reservations.get(&reservation_id).cloned())
    }

    async fn set_status(&mut self, reservation_id: Uuid, status: ReservationStatus) -> Result<(), StoreError> {
        match self.open()?.reservations.get_mut(&reservation_id) {
            Some(reservation) => {
                reservation.status = status;
                Ok(())
            }
            None => Err(StoreError::Database(format!("reservation {} vanished", reservation_id))),
        }
    }

    async fn mark_deposit_refunded(&mut self, reservation_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        match self.open()?.reservations.get_mut(&reservation_id) {
            Some(reservation) => {
                reservation.deposit_status = DepositStatus::Refunded;
                reservation.deposit_refunded_at = Some(at);
                Ok(())
            }
            None => Err(StoreError::Database(format!("reservation {} vanished", reservation_id))),
        }
    }

    async fn append_outbox(&mut self, event: &OutboxEvent) -> Result<(), StoreError> {
        self.open()?.outbox.push(event.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.fault(FaultPoint::Commit)?;
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| StoreError::Database("transaction already closed".to_string()))?;
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard = None;
        self.staged = MemoryState::default();
        Ok(())
    }
}
