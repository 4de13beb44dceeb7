#![allow(dead_code)]

use std::sync::Arc;

use booking_service::{CheckoutConfig, CheckoutOrchestrator, MemoryBookingStore};
use chrono::NaiveDate;
use shared::*;
use uuid::Uuid;

pub const UNIT_PRICE: i64 = 25;

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

pub fn today() -> NaiveDate {
    date("2025-06-01")
}

pub fn product(name: &str, total_stock: i32) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        total_stock,
        is_active: true,
    }
}

pub async fn store_with(products: &[Product]) -> MemoryBookingStore {
    let store = MemoryBookingStore::new();
    for product in products {
        store.add_product(product.clone()).await;
    }
    store
}

pub fn line(product_id: Uuid, quantity: i32) -> CartLine {
    CartLine {
        product_id,
        quantity,
        unit_price: UNIT_PRICE,
        subtotal: UNIT_PRICE * quantity as i64,
    }
}

pub fn block(product_id: Uuid, start: &str, end: &str, quantity: i32) -> AvailabilityInterval {
    AvailabilityInterval {
        id: Uuid::new_v4(),
        product_id,
        reservation_id: None,
        start_date: date(start),
        end_date: date(end),
        quantity,
        status: IntervalStatus::Blocked,
    }
}

/// A delivery checkout with address and consent, priced from its lines.
pub fn payload(lines: Vec<CartLine>, start: &str, end: &str) -> CheckoutPayload {
    let subtotal = lines.iter().map(|l| l.subtotal).sum();
    CheckoutPayload {
        contact: ContactInfo {
            full_name: "Dana Reyes".to_string(),
            email: "Dana@Example.com".to_string(),
            phone: "+1 555 0100".to_string(),
        },
        address: Some(AddressInput {
            street: "12 Harbor Road".to_string(),
            city: "Portsmouth".to_string(),
            postal_code: "03801".to_string(),
            notes: Some("gate code 4471".to_string()),
        }),
        start_date: date(start),
        end_date: date(end),
        delivery_type: DeliveryType::Delivery,
        lines,
        pricing: Pricing {
            subtotal,
            delivery_fee: 15,
            discount: 0,
            total: subtotal + 15,
        },
        consents: Consents {
            terms_accepted: true,
            marketing_opt_in: false,
        },
        notes: None,
    }
}

pub fn pickup(mut payload: CheckoutPayload) -> CheckoutPayload {
    payload.delivery_type = DeliveryType::Pickup;
    payload.address = None;
    payload.pricing.delivery_fee = 0;
    payload.pricing.total = payload.pricing.subtotal;
    payload
}

pub fn member() -> Principal {
    Principal {
        user_id: Uuid::new_v4(),
        email: "member@example.com".to_string(),
    }
}

pub fn orchestrator(store: &MemoryBookingStore) -> CheckoutOrchestrator<MemoryBookingStore> {
    CheckoutOrchestrator::new(Arc::new(store.clone()), CheckoutConfig::default())
        .with_clock(Arc::new(FixedClock::new(today())))
}

/// Units of `product_id` held on `day` by the committed state.
pub async fn held_on(store: &MemoryBookingStore, product_id: Uuid, day: NaiveDate) -> i64 {
    let state = store.snapshot().await;
    let intervals = state.consuming_intervals(&[product_id], day, day);
    availability::consumed_on(&intervals, day)
}
