mod common;

use std::sync::Arc;

use booking_service::*;
use common::*;
use shared::*;
use uuid::Uuid;

async fn booked(store: &MemoryBookingStore, product: &Product, quantity: i32) -> Uuid {
    orchestrator(store)
        .checkout(None, payload(vec![line(product.id, quantity)], "2025-06-10", "2025-06-12"))
        .await
        .unwrap()
        .reservation_id
}

fn lifecycle(store: &MemoryBookingStore) -> ReservationLifecycle<MemoryBookingStore> {
    ReservationLifecycle::new(Arc::new(store.clone()))
}

#[tokio::test]
async fn reservation_moves_forward_through_fulfillment() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let id = booked(&store, &tent, 1).await;
    let lifecycle = lifecycle(&store);

    for next in [
        ReservationStatus::Confirmed,
        ReservationStatus::Preparing,
        ReservationStatus::Delivered,
        ReservationStatus::Completed,
    ] {
        let reservation = lifecycle.update_status(id, next).await.unwrap();
        assert_eq!(reservation.status, next);
    }

    let state = store.snapshot().await;
    assert_eq!(state.reservations[&id].status, ReservationStatus::Completed);
    let changes = state
        .outbox
        .iter()
        .filter(|e| e.event_type == "ReservationStatusChanged")
        .count();
    assert_eq!(changes, 4);
}

#[tokio::test]
async fn backward_and_skipping_transitions_are_rejected() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let id = booked(&store, &tent, 1).await;
    let lifecycle = lifecycle(&store);

    let skip = lifecycle.update_status(id, ReservationStatus::Delivered).await.unwrap_err();
    assert!(matches!(
        skip,
        LifecycleError::InvalidTransition {
            from: ReservationStatus::Pending,
            to: ReservationStatus::Delivered
        }
    ));

    lifecycle.update_status(id, ReservationStatus::Confirmed).await.unwrap();
    let back = lifecycle.update_status(id, ReservationStatus::Pending).await.unwrap_err();
    assert!(matches!(back, LifecycleError::InvalidTransition { .. }));

    let same = lifecycle.update_status(id, ReservationStatus::Confirmed).await.unwrap_err();
    assert!(matches!(same, LifecycleError::InvalidTransition { .. }));

    let state = store.snapshot().await;
    assert_eq!(state.reservations[&id].status, ReservationStatus::Confirmed);
}

#[tokio::test]
async fn cancelling_returns_stock_to_every_overlapping_day() {
    let generator = product("Silent generator", 1);
    let store = store_with(&[generator.clone()]).await;
    let id = booked(&store, &generator, 1).await;
    let checkout = orchestrator(&store);
    let competing = payload(vec![line(generator.id, 1)], "2025-06-11", "2025-06-11");

    assert!(checkout.checkout(None, competing.clone()).await.is_err());

    let cancelled = lifecycle(&store).cancel_reservation(id).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    for day in availability::days(date("2025-06-10"), date("2025-06-12")) {
        assert_eq!(held_on(&store, generator.id, day).await, 0);
    }

    checkout.checkout(None, competing).await.unwrap();

    // The cancelled hold stays in the ledger.
    let state = store.snapshot().await;
    assert!(state.intervals.iter().any(|i| i.reservation_id == Some(id)));
}

#[tokio::test]
async fn cancelling_twice_is_a_no_op() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let id = booked(&store, &tent, 2).await;
    let lifecycle = lifecycle(&store);

    lifecycle.cancel_reservation(id).await.unwrap();
    let again = lifecycle.cancel_reservation(id).await.unwrap();
    assert_eq!(again.status, ReservationStatus::Cancelled);

    let state = store.snapshot().await;
    let cancellations = state
        .outbox
        .iter()
        .filter(|e| e.event_type == "ReservationCancelled")
        .count();
    assert_eq!(cancellations, 1);
}

#[tokio::test]
async fn status_update_to_cancelled_goes_through_cancellation() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let id = booked(&store, &tent, 2).await;

    lifecycle(&store)
        .update_status(id, ReservationStatus::Cancelled)
        .await
        .unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.reservations[&id].status, ReservationStatus::Cancelled);
    assert!(state.outbox.iter().any(|e| e.event_type == "ReservationCancelled"));
    assert_eq!(held_on(&store, tent.id, date("2025-06-11")).await, 0);
}

#[tokio::test]
async fn completed_reservation_cannot_be_cancelled() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let id = booked(&store, &tent, 1).await;
    let lifecycle = lifecycle(&store);
    for next in [
        ReservationStatus::Confirmed,
        ReservationStatus::Preparing,
        ReservationStatus::Delivered,
        ReservationStatus::Completed,
    ] {
        lifecycle.update_status(id, next).await.unwrap();
    }

    let err = lifecycle.cancel_reservation(id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
}

#[tokio::test]
async fn deposit_is_refunded_once_after_cancellation() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let id = booked(&store, &tent, 1).await;
    let lifecycle = lifecycle(&store);

    let early = lifecycle.refund_deposit(id).await.unwrap_err();
    assert!(matches!(early, LifecycleError::DepositNotRefundable(ReservationStatus::Pending)));

    lifecycle.cancel_reservation(id).await.unwrap();
    let refunded = lifecycle.refund_deposit(id).await.unwrap();
    assert_eq!(refunded.deposit_status, DepositStatus::Refunded);
    assert!(refunded.deposit_refunded_at.is_some());

    let twice = lifecycle.refund_deposit(id).await.unwrap_err();
    assert!(matches!(twice, LifecycleError::DepositAlreadyRefunded(r) if r == id));

    let state = store.snapshot().await;
    let refunds: Vec<_> = state
        .outbox
        .iter()
        .filter(|e| e.event_type == "DepositRefunded")
        .collect();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].event_data["amount"], 50);
}

#[tokio::test]
async fn unknown_reservation_is_not_found() {
    let store = MemoryBookingStore::new();
    let lifecycle = lifecycle(&store);
    let missing = Uuid::new_v4();

    assert!(matches!(
        lifecycle.get_reservation(missing).await,
        Err(LifecycleError::NotFound(id)) if id == missing
    ));
    assert!(matches!(
        lifecycle.cancel_reservation(missing).await,
        Err(LifecycleError::NotFound(_))
    ));
    assert!(matches!(
        lifecycle.refund_deposit(missing).await,
        Err(LifecycleError::NotFound(_))
    ));
}

#[tokio::test]
async fn reservation_read_includes_items_and_tasks() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let id = booked(&store, &tent, 2).await;

    let details = lifecycle(&store).get_reservation(id).await.unwrap();

    assert_eq!(details.reservation.id, id);
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].quantity, 2);
    assert_eq!(details.tasks.len(), 2);
}
