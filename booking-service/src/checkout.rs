//! Checkout: turns a cart into a committed reservation.
//!
//! Two commit strategies reach the same end state, a `pending` reservation with
//! its line items and one `reserved` interval per cart line:
//!
//! - authenticated callers are committed step by step by the orchestrator inside
//!   one serializable transaction holding per-product locks;
//! - guests go through a [`GuestCheckoutProcedure`], an indivisible call that
//!   either commits everything or nothing.
//!
//! Delivery and pickup tasks are created afterwards for both paths and never
//! undo a committed reservation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::*;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{CheckoutError, StoreError};
use crate::fulfillment::plan_tasks;
use crate::store::*;

#[derive(Debug, Clone, Copy)]
pub struct CheckoutConfig {
    pub minimum_deposit: i64,
    pub deposit_rate_percent: i64,
    pub max_rental_days: i64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            minimum_deposit: 50,
            deposit_rate_percent: 20,
            max_rental_days: 90,
        }
    }
}

/// Largest amount a `NUMERIC(12, 2)` money column holds in whole units.
pub const MAX_AMOUNT: i64 = 9_999_999_999;

/// `max(ceil(subtotal * rate), minimum)` for a non-negative subtotal.
pub fn compute_deposit(subtotal: i64, config: &CheckoutConfig) -> i64 {
    let proportional = subtotal
        .max(0)
        .saturating_mul(config.deposit_rate_percent)
        .saturating_add(99)
        / 100;
    proportional.max(config.minimum_deposit)
}

pub fn order_number(booked_on: NaiveDate, reservation_id: Uuid) -> String {
    let suffix = reservation_id.simple().to_string()[..8].to_ascii_uppercase();
    format!("RNT-{}-{}", booked_on.format("%Y%m%d"), suffix)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub reservation_id: Uuid,
    pub order_number: String,
    pub total: i64,
    pub deposit_amount: i64,
}

impl From<&CheckoutReceipt> for CheckoutResult {
    fn from(receipt: &CheckoutReceipt) -> Self {
        CheckoutResult::success(
            receipt.reservation_id,
            receipt.order_number.clone(),
            receipt.total,
            receipt.deposit_amount,
        )
    }
}

/// What a successful commit hands back for post-commit work.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub reservation: Reservation,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone)]
pub struct GuestCheckoutRequest {
    pub payload: CheckoutPayload,
    pub deposit_amount: i64,
    pub booked_on: NaiveDate,
}

/// The atomic guest booking procedure: customer upsert, address, reservation,
/// line items and stock intervals as one unit.
#[async_trait]
pub trait GuestCheckoutProcedure: Send + Sync {
    async fn execute(&self, request: &GuestCheckoutRequest) -> Result<CommitOutcome, CheckoutError>;
}

/// Runs the guest procedure as a single serializable transaction on the store.
pub struct TransactionalGuestCheckout<S: BookingStore> {
    store: Arc<S>,
}

impl<S: BookingStore> TransactionalGuestCheckout<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: BookingStore> GuestCheckoutProcedure for TransactionalGuestCheckout<S> {
    async fn execute(&self, request: &GuestCheckoutRequest) -> Result<CommitOutcome, CheckoutError> {
        let customer = CustomerUpsert {
            identity: CustomerIdentity::Guest,
            contact: request.payload.contact.clone(),
            marketing_opt_in: request.payload.consents.marketing_opt_in,
        };
        in_transaction(self.store.as_ref(), customer, &request.payload, request.deposit_amount, request.booked_on).await
    }
}

pub struct CheckoutOrchestrator<S: BookingStore + 'static> {
    store: Arc<S>,
    guest: Arc<dyn GuestCheckoutProcedure>,
    clock: Arc<dyn Clock>,
    config: CheckoutConfig,
}

impl<S: BookingStore + 'static> CheckoutOrchestrator<S> {
    pub fn new(store: Arc<S>, config: CheckoutConfig) -> Self {
        Self {
            guest: Arc::new(TransactionalGuestCheckout::new(store.clone())),
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_guest_procedure(mut self, guest: Arc<dyn GuestCheckoutProcedure>) -> Self {
        self.guest = guest;
        self
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Books the cart for `principal`, or as a guest when there is none.
    /// A member's blank contact email falls back to the account email.
    #[instrument(
        skip(self, principal, payload),
        fields(authenticated = principal.is_some(), lines = payload.lines.len())
    )]
    pub async fn checkout(
        &self,
        principal: Option<&Principal>,
        mut payload: CheckoutPayload,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let today = self.clock.today();
        // Members may leave the contact email blank and book under their account email.
        if let Some(principal) = principal {
            if payload.contact.email.trim().is_empty() {
                payload.contact.email = principal.email.clone();
            }
        }
        validate(&payload, today, &self.config)?;
        let deposit_amount = compute_deposit(payload.pricing.subtotal, &self.config);

        let committed = match principal {
            Some(principal) => self.commit_authenticated(principal, &payload, deposit_amount, today).await,
            None => {
                let request = GuestCheckoutRequest {
                    payload: payload.clone(),
                    deposit_amount,
                    booked_on: today,
                };
                self.guest.execute(&request).await.map_err(|e| match e {
                    CheckoutError::Store(err) => CheckoutError::GuestProcedure(err.to_string()),
                    other => other,
                })
            }
        };

        let outcome = match committed {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Checkout rejected: {}", e);
                return Err(e);
            }
        };

        let reservation = &outcome.reservation;
        info!(
            reservation_id = %reservation.id,
            order_number = %reservation.order_number,
            "Reservation committed for {} to {}",
            reservation.start_date,
            reservation.end_date
        );

        if payload.delivery_type == DeliveryType::Delivery {
            self.schedule_fulfillment(&outcome, &payload).await;
        }

        Ok(CheckoutReceipt {
            reservation_id: reservation.id,
            order_number: reservation.order_number.clone(),
            total: reservation.total,
            deposit_amount: reservation.deposit_amount,
        })
    }

    async fn commit_authenticated(
        &self,
        principal: &Principal,
        payload: &CheckoutPayload,
        deposit_amount: i64,
        today: NaiveDate,
    ) -> Result<CommitOutcome, CheckoutError> {
        let customer = CustomerUpsert {
            identity: CustomerIdentity::Account(principal.user_id),
            contact: payload.contact.clone(),
            marketing_opt_in: payload.consents.marketing_opt_in,
        };
        in_transaction(self.store.as_ref(), customer, payload, deposit_amount, today).await
    }

    /// Failures are logged and swallowed: the reservation already stands and
    /// tasks can be backfilled.
    async fn schedule_fulfillment(&self, outcome: &CommitOutcome, payload: &CheckoutPayload) {
        let reservation_id = outcome.reservation.id;
        let tasks = match plan_tasks(&outcome.reservation, payload, &outcome.products) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(%reservation_id, "Could not build fulfillment snapshot: {}", e);
                return;
            }
        };

        match self.store.create_fulfillment_tasks(tasks).await {
            Ok(()) => info!(%reservation_id, "Scheduled delivery and pickup tasks"),
            Err(e) => warn!(%reservation_id, "Fulfillment tasks not created, backfill required: {}", e),
        }
    }
}

async fn in_transaction<S: BookingStore + ?Sized>(
    store: &S,
    customer: CustomerUpsert,
    payload: &CheckoutPayload,
    deposit_amount: i64,
    today: NaiveDate,
) -> Result<CommitOutcome, CheckoutError> {
    let mut tx = store.begin().await?;

    match commit_booking(tx.as_mut(), customer, payload, deposit_amount, today).await {
        Ok(outcome) => {
            tx.commit().await?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                error!("Rollback after failed checkout also failed: {}", rollback);
            }
            Err(e)
        }
    }
}

/// Total quantity requested per product, keyed to the first cart line naming it.
fn merged_demand(lines: &[CartLine]) -> Result<Vec<(usize, Uuid, i32)>, CheckoutError> {
    let mut order: Vec<(usize, Uuid, i32)> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for (position, line) in lines.iter().enumerate() {
        match index.get(&line.product_id) {
            Some(&slot) => {
                let (first_line, product_id, quantity) = order[slot];
                order[slot].2 = quantity.checked_add(line.quantity).ok_or_else(|| {
                    CheckoutError::Validation(format!(
                        "lines {} and {}: combined quantity of product {} is too large",
                        first_line,
                        position + 1,
                        product_id
                    ))
                })?;
            }
            None => {
                index.insert(line.product_id, order.len());
                order.push((position + 1, line.product_id, line.quantity));
            }
        }
    }
    Ok(order)
}

/// Re-checks every line against current stock, then writes the reservation.
/// Nothing is written unless every line is available.
async fn commit_booking(
    tx: &mut dyn BookingTx,
    customer: CustomerUpsert,
    payload: &CheckoutPayload,
    deposit_amount: i64,
    today: NaiveDate,
) -> Result<CommitOutcome, CheckoutError> {
    let (start, end) = (payload.start_date, payload.end_date);
    let demand = merged_demand(&payload.lines)?;
    let product_ids: Vec<Uuid> = demand.iter().map(|(_, id, _)| *id).collect();

    tx.lock_products(&product_ids).await?;

    let products = tx
        .get_products(&product_ids)
        .await
        .map_err(|e| CheckoutError::VerificationFailed(e.to_string()))?;
    let intervals = tx
        .query_intervals(&product_ids, start, end)
        .await
        .map_err(|e| CheckoutError::VerificationFailed(e.to_string()))?;

    for (line, product_id, quantity) in &demand {
        let unavailable = |available: i32, conflicting_dates: Vec<NaiveDate>, reason: String| {
            CheckoutError::LineUnavailable {
                line: *line,
                product_id: *product_id,
                available,
                conflicting_dates,
                reason,
            }
        };

        let product = match products.iter().find(|p| p.id == *product_id) {
            Some(product) if product.is_active => product,
            Some(_) => return Err(unavailable(0, Vec::new(), "product is not active".to_string())),
            None => return Err(unavailable(0, Vec::new(), "product not found".to_string())),
        };

        let held: Vec<AvailabilityInterval> = intervals
            .iter()
            .filter(|i| i.product_id == *product_id)
            .cloned()
            .collect();
        let check = compute_availability(product.total_stock, &held, start, end, *quantity);
        if !check.available {
            let reason = format!(
                "requested {}, only {} free on {}",
                quantity,
                check.min_available_quantity,
                check
                    .conflicting_dates
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            return Err(unavailable(check.min_available_quantity, check.conflicting_dates, reason));
        }
    }

    let customer_id = tx.upsert_customer(&customer).await?;

    let address_id = match (payload.delivery_type, &payload.address) {
        (DeliveryType::Delivery, Some(address)) => Some(tx.create_address(customer_id, address).await?),
        _ => None,
    };

    let reservation_id = Uuid::new_v4();
    let reservation = Reservation {
        id: reservation_id,
        order_number: order_number(today, reservation_id),
        customer_id,
        address_id,
        start_date: start,
        end_date: end,
        delivery_type: payload.delivery_type,
        subtotal: payload.pricing.subtotal,
        delivery_fee: payload.pricing.delivery_fee,
        discount: payload.pricing.discount,
        total: payload.pricing.total,
        deposit_amount,
        status: ReservationStatus::Pending,
        payment_status: PaymentStatus::Pending,
        deposit_status: DepositStatus::Held,
        deposit_refunded_at: None,
        notes: payload.notes.clone(),
    };

    let duration_days = payload.duration_days() as i32;
    let items: Vec<LineItem> = payload
        .lines
        .iter()
        .map(|line| LineItem {
            id: Uuid::new_v4(),
            reservation_id,
            product_id: line.product_id,
            quantity: line.quantity,
            duration_days,
            unit_price: line.unit_price,
            subtotal: line.subtotal,
        })
        .collect();

    tx.insert_reservation_header(&reservation).await?;

    if let Err(e) = tx.insert_line_items(&items).await {
        warn!(%reservation_id, "Line items not written, removing reservation header: {}", e);
        if let Err(cleanup) = tx.delete_reservation(reservation_id).await {
            error!(%reservation_id, "Could not remove orphaned reservation header: {}", cleanup);
        }
        return Err(e.into());
    }

    let holds: Vec<AvailabilityInterval> = payload
        .lines
        .iter()
        .map(|line| AvailabilityInterval {
            id: Uuid::new_v4(),
            product_id: line.product_id,
            reservation_id: Some(reservation_id),
            start_date: start,
            end_date: end,
            quantity: line.quantity,
            status: IntervalStatus::Reserved,
        })
        .collect();
    tx.insert_intervals(&holds).await?;

    let event = BookingEvent::ReservationCreated {
        reservation_id,
        order_number: reservation.order_number.clone(),
        start_date: start,
        end_date: end,
        lines: payload
            .lines
            .iter()
            .map(|line| BookedLine {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect(),
        total: reservation.total,
    };
    tx.append_outbox(&event.to_outbox().map_err(StoreError::from)?).await?;

    Ok(CommitOutcome { reservation, products })
}

fn validate(payload: &CheckoutPayload, today: NaiveDate, config: &CheckoutConfig) -> Result<(), CheckoutError> {
    let invalid = |msg: String| Err(CheckoutError::Validation(msg));

    if payload.lines.is_empty() {
        return invalid("cart is empty".to_string());
    }
    for (position, line) in payload.lines.iter().enumerate() {
        if line.quantity < 1 {
            return invalid(format!("line {}: quantity must be at least 1", position + 1));
        }
        if line.unit_price < 0 || line.subtotal < 0 {
            return invalid(format!("line {}: prices cannot be negative", position + 1));
        }
        if line.unit_price > MAX_AMOUNT || line.subtotal > MAX_AMOUNT {
            return invalid(format!("line {}: price exceeds {}", position + 1, MAX_AMOUNT));
        }
    }
    merged_demand(&payload.lines)?;
    if payload.start_date > payload.end_date {
        return invalid(format!(
            "start date {} is after end date {}",
            payload.start_date, payload.end_date
        ));
    }
    if payload.start_date < today {
        return invalid(format!("start date {} is in the past", payload.start_date));
    }
    if payload.duration_days() > config.max_rental_days {
        return invalid(format!(
            "rentals are limited to {} days, requested {}",
            config.max_rental_days,
            payload.duration_days()
        ));
    }
    if payload.delivery_type == DeliveryType::Delivery && payload.address.is_none() {
        return invalid("delivery requires an address".to_string());
    }
    if !payload.consents.terms_accepted {
        return invalid("terms must be accepted".to_string());
    }
    let contact = &payload.contact;
    if contact.full_name.trim().is_empty() || contact.phone.trim().is_empty() {
        return invalid("name and phone are required".to_string());
    }
    if !contact.email.contains('@') {
        return invalid(format!("invalid email address {:?}", contact.email));
    }
    let pricing = &payload.pricing;
    if pricing.subtotal < 0 || pricing.delivery_fee < 0 || pricing.discount < 0 || pricing.total < 0 {
        return invalid("pricing amounts cannot be negative".to_string());
    }
    if [pricing.subtotal, pricing.delivery_fee, pricing.discount, pricing.total]
        .iter()
        .any(|amount| *amount > MAX_AMOUNT)
    {
        return invalid(format!("pricing amounts cannot exceed {}", MAX_AMOUNT));
    }
    Ok(())
}
