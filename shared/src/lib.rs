use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

pub mod availability;

pub use availability::{compute_availability, first_shortfall, month_bounds, remaining_on};

/// Interval statuses that count against a product's stock.
pub const CONSUMING_STATUSES: [IntervalStatus; 3] = [
    IntervalStatus::Reserved,
    IntervalStatus::Blocked,
    IntervalStatus::Maintenance,
];

/// Intervals of any product in `$1` overlapping `[$2, $3]` that currently consume stock.
///
/// Intervals owned by a cancelled reservation are excluded here rather than deleted,
/// so cancelling a booking restores stock while keeping the ledger intact.
pub const OVERLAPPING_INTERVALS_SQL: &str = "\
SELECT i.id, i.product_id, i.reservation_id, i.start_date, i.end_date, i.quantity, i.status \
FROM availability_intervals i \
LEFT JOIN reservations r ON r.id = i.reservation_id \
WHERE i.product_id = ANY($1) \
  AND i.start_date <= $3 \
  AND i.end_date >= $2 \
  AND i.status IN ('reserved', 'blocked', 'maintenance') \
  AND (r.id IS NULL OR r.status <> 'cancelled')";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub total_stock: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalStatus {
    Reserved,
    Blocked,
    Maintenance,
    Released,
}

impl IntervalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalStatus::Reserved => "reserved",
            IntervalStatus::Blocked => "blocked",
            IntervalStatus::Maintenance => "maintenance",
            IntervalStatus::Released => "released",
        }
    }

    /// Unknown statuses are inert.
    pub fn parse(value: &str) -> Self {
        match value {
            "reserved" => IntervalStatus::Reserved,
            "blocked" => IntervalStatus::Blocked,
            "maintenance" => IntervalStatus::Maintenance,
            _ => IntervalStatus::Released,
        }
    }

    pub fn is_consuming(&self) -> bool {
        CONSUMING_STATUSES.contains(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityInterval {
    pub id: Uuid,
    pub product_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity: i32,
    pub status: IntervalStatus,
}

impl AvailabilityInterval {
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date >= start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Preparing,
    Delivered,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Preparing => "preparing",
            ReservationStatus::Delivered => "delivered",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReservationStatus::Pending),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "preparing" => Some(ReservationStatus::Preparing),
            "delivered" => Some(ReservationStatus::Delivered),
            "completed" => Some(ReservationStatus::Completed),
            "cancelled" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Completed | ReservationStatus::Cancelled)
    }

    /// Forward one step along the happy path, or cancel from any non-terminal state.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        match (self, next) {
            (from, Cancelled) => !from.is_terminal(),
            (Pending, Confirmed)
            | (Confirmed, Preparing)
            | (Preparing, Delivered)
            | (Delivered, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Held,
    Refunded,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Held => "held",
            DepositStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "held" => Some(DepositStatus::Held),
            "refunded" => Some(DepositStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Delivery,
    Pickup,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Delivery => "delivery",
            DeliveryType::Pickup => "pickup",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "delivery" => Some(DeliveryType::Delivery),
            "pickup" => Some(DeliveryType::Pickup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentTaskType {
    Delivery,
    Pickup,
}

impl FulfillmentTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentTaskType::Delivery => "delivery",
            FulfillmentTaskType::Pickup => "pickup",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "delivery" => Some(FulfillmentTaskType::Delivery),
            "pickup" => Some(FulfillmentTaskType::Pickup),
            _ => None,
        }
    }
}

// Read-path results

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub available: bool,
    pub min_available_quantity: i32,
    pub conflicting_dates: Vec<NaiveDate>,
    /// Set when stock could not be read; `available` is then always false.
    pub verification_failed: bool,
    pub reason: Option<String>,
}

impl AvailabilityResult {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            min_available_quantity: 0,
            conflicting_dates: Vec::new(),
            verification_failed: false,
            reason: Some(reason.into()),
        }
    }

    pub fn unverified(error: impl Into<String>) -> Self {
        Self {
            verification_failed: true,
            ..Self::unavailable(error)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub available: bool,
    pub available_quantity: i32,
    pub is_maintenance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthProjection {
    pub product_id: Uuid,
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDay>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailabilityResult {
    pub unavailable_ids: HashSet<Uuid>,
    pub has_error: bool,
    pub error_message: Option<String>,
}

// Checkout payload

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub subtotal: i64,
}

/// Totals as computed by the pricing layer, in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub discount: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consents {
    pub terms_accepted: bool,
    pub marketing_opt_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPayload {
    pub contact: ContactInfo,
    pub address: Option<AddressInput>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub delivery_type: DeliveryType,
    pub lines: Vec<CartLine>,
    pub pricing: Pricing,
    pub consents: Consents,
    pub notes: Option<String>,
}

impl CheckoutPayload {
    /// Inclusive rental length in days.
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// An authenticated caller, as resolved by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutErrorCode {
    Validation,
    Unavailable,
    VerificationFailed,
    CommitFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub success: bool,
    pub reservation_id: Option<Uuid>,
    pub order_number: Option<String>,
    pub total: Option<i64>,
    pub deposit_amount: Option<i64>,
    pub error: Option<String>,
    pub error_code: Option<CheckoutErrorCode>,
}

impl CheckoutResult {
    pub fn success(reservation_id: Uuid, order_number: String, total: i64, deposit_amount: i64) -> Self {
        Self {
            success: true,
            reservation_id: Some(reservation_id),
            order_number: Some(order_number),
            total: Some(total),
            deposit_amount: Some(deposit_amount),
            error: None,
            error_code: None,
        }
    }

    pub fn failed(code: CheckoutErrorCode, error: String) -> Self {
        Self {
            success: false,
            reservation_id: None,
            order_number: None,
            total: None,
            deposit_amount: None,
            error: Some(error),
            error_code: Some(code),
        }
    }
}

// Outbox

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookedLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BookingEvent {
    ReservationCreated {
        reservation_id: Uuid,
        order_number: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        lines: Vec<BookedLine>,
        total: i64,
    },
    ReservationStatusChanged {
        reservation_id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    ReservationCancelled {
        reservation_id: Uuid,
        previous_status: ReservationStatus,
    },
    DepositRefunded {
        reservation_id: Uuid,
        amount: i64,
    },
}

impl BookingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BookingEvent::ReservationCreated { .. } => "ReservationCreated",
            BookingEvent::ReservationStatusChanged { .. } => "ReservationStatusChanged",
            BookingEvent::ReservationCancelled { .. } => "ReservationCancelled",
            BookingEvent::DepositRefunded { .. } => "DepositRefunded",
        }
    }

    pub fn reservation_id(&self) -> Uuid {
        match self {
            BookingEvent::ReservationCreated { reservation_id, .. }
            | BookingEvent::ReservationStatusChanged { reservation_id, .. }
            | BookingEvent::ReservationCancelled { reservation_id, .. }
            | BookingEvent::DepositRefunded { reservation_id, .. } => *reservation_id,
        }
    }

    pub fn to_outbox(&self) -> Result<OutboxEvent, serde_json::Error> {
        Ok(OutboxEvent {
            id: Uuid::new_v4(),
            aggregate_id: self.reservation_id(),
            event_type: self.event_type().to_string(),
            event_data: serde_json::to_value(self)?,
            processed: false,
            created_at: Utc::now(),
        })
    }
}

// Time

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }
}

/// Key for `pg_advisory_xact_lock` scoped to one product.
pub fn advisory_lock_key(product_id: &Uuid) -> i64 {
    let (high, low) = product_id.as_u64_pair();
    (high ^ low) as i64
}
