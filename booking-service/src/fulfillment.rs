//! Delivery and pickup tasks derived from a committed delivery-type reservation.
//!
//! Each task carries a copy of the customer, address and item data as they were
//! at booking time; later edits to those records do not reach the crew.

use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

use crate::store::{FulfillmentTask, Reservation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub address: AddressInput,
    pub items: Vec<SnapshotItem>,
    pub notes: Option<String>,
}

/// Exactly two tasks: delivery on the first rental day, pickup on the last.
pub fn plan_tasks(
    reservation: &Reservation,
    payload: &CheckoutPayload,
    products: &[Product],
) -> Result<Vec<FulfillmentTask>, serde_json::Error> {
    let Some(address) = payload.address.clone() else {
        return Ok(Vec::new());
    };

    let items = payload
        .lines
        .iter()
        .map(|line| SnapshotItem {
            product_id: line.product_id,
            product_name: products
                .iter()
                .find(|p| p.id == line.product_id)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            quantity: line.quantity,
        })
        .collect();

    let snapshot = serde_json::to_value(TaskSnapshot {
        order_number: reservation.order_number.clone(),
        customer_name: payload.contact.full_name.clone(),
        customer_email: payload.contact.email.clone(),
        customer_phone: payload.contact.phone.clone(),
        address,
        items,
        notes: payload.notes.clone(),
    })?;

    Ok([
        (FulfillmentTaskType::Delivery, reservation.start_date),
        (FulfillmentTaskType::Pickup, reservation.end_date),
    ]
    .into_iter()
    .map(|(task_type, scheduled_date)| FulfillmentTask {
        id: Uuid::new_v4(),
        reservation_id: reservation.id,
        task_type,
        scheduled_date,
        status: "pending".to_string(),
        snapshot: snapshot.clone(),
    })
    .collect())
}
