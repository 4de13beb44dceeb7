mod common;

use std::sync::Arc;

use async_trait::async_trait;
use booking_service::checkout::{CommitOutcome, GuestCheckoutRequest};
use booking_service::*;
use common::*;
use futures::future::join_all;
use shared::*;

#[tokio::test]
async fn delivery_checkout_writes_reservation_stock_and_tasks() {
    let tent = product("Party tent 6x12", 5);
    let store = store_with(&[tent.clone()]).await;

    let receipt = orchestrator(&store)
        .checkout(None, payload(vec![line(tent.id, 2)], "2025-06-10", "2025-06-14"))
        .await
        .unwrap();

    assert!(receipt.order_number.starts_with("RNT-20250601-"));
    assert_eq!(receipt.total, 65);
    assert_eq!(receipt.deposit_amount, 50);

    let state = store.snapshot().await;
    let reservation = &state.reservations[&receipt.reservation_id];
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.payment_status, PaymentStatus::Pending);
    assert_eq!(reservation.deposit_status, DepositStatus::Held);
    assert!(reservation.address_id.is_some());

    assert_eq!(state.items.len(), 1);
    assert_eq!(state.items[0].duration_days, 5);
    assert_eq!(state.items[0].subtotal, 50);

    assert_eq!(state.intervals.len(), 1);
    let hold = &state.intervals[0];
    assert_eq!(hold.reservation_id, Some(receipt.reservation_id));
    assert_eq!(hold.status, IntervalStatus::Reserved);
    assert_eq!((hold.start_date, hold.end_date), (date("2025-06-10"), date("2025-06-14")));

    let mut tasks: Vec<_> = state.tasks.iter().map(|t| (t.task_type, t.scheduled_date)).collect();
    tasks.sort_by_key(|(_, day)| *day);
    assert_eq!(
        tasks,
        vec![
            (FulfillmentTaskType::Delivery, date("2025-06-10")),
            (FulfillmentTaskType::Pickup, date("2025-06-14")),
        ]
    );
    assert_eq!(state.tasks[0].snapshot["items"][0]["product_name"], "Party tent 6x12");
    assert_eq!(state.tasks[0].snapshot["address"]["city"], "Portsmouth");

    assert_eq!(state.outbox.len(), 1);
    assert_eq!(state.outbox[0].event_type, "ReservationCreated");
    assert_eq!(state.outbox[0].aggregate_id, receipt.reservation_id);

    assert_eq!(held_on(&store, tent.id, date("2025-06-12")).await, 2);
}

#[tokio::test]
async fn pickup_checkout_needs_no_address_and_creates_no_tasks() {
    let chairs = product("Folding chair", 40);
    let store = store_with(&[chairs.clone()]).await;

    orchestrator(&store)
        .checkout(None, pickup(payload(vec![line(chairs.id, 20)], "2025-06-10", "2025-06-10")))
        .await
        .unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.reservations.len(), 1);
    assert!(state.addresses.is_empty());
    assert!(state.tasks.is_empty());
}

#[tokio::test]
async fn unavailable_second_line_aborts_the_whole_checkout() {
    let tent = product("Party tent", 5);
    let heater = product("Patio heater", 1);
    let store = store_with(&[tent.clone(), heater.clone()]).await;
    store.add_interval(block(heater.id, "2025-06-12", "2025-06-12", 1)).await;

    let err = orchestrator(&store)
        .checkout(
            None,
            payload(vec![line(tent.id, 1), line(heater.id, 1)], "2025-06-10", "2025-06-14"),
        )
        .await
        .unwrap_err();

    match err {
        CheckoutError::LineUnavailable {
            line,
            product_id,
            available,
            ref conflicting_dates,
            ..
        } => {
            assert_eq!(line, 2);
            assert_eq!(product_id, heater.id);
            assert_eq!(available, 0);
            assert_eq!(conflicting_dates, &vec![date("2025-06-12")]);
        }
        other => panic!("expected LineUnavailable, got {:?}", other),
    }
    assert_eq!(err.code(), CheckoutErrorCode::Unavailable);

    let state = store.snapshot().await;
    assert!(state.reservations.is_empty());
    assert!(state.customers.is_empty());
    assert!(state.items.is_empty());
    assert_eq!(state.intervals.len(), 1);
    assert!(state.outbox.is_empty());
}

#[tokio::test]
async fn duplicate_lines_are_checked_as_one_demand() {
    let table = product("Banquet table", 3);
    let store = store_with(&[table.clone()]).await;

    let err = orchestrator(&store)
        .checkout(
            Some(&member()),
            payload(vec![line(table.id, 2), line(table.id, 2)], "2025-06-10", "2025-06-11"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::LineUnavailable { line: 1, available: 3, .. }));
    assert!(store.snapshot().await.reservations.is_empty());
}

#[tokio::test]
async fn oversized_duplicate_lines_are_rejected_not_wrapped() {
    let generator = product("Silent generator", 1);
    let store = store_with(&[generator.clone()]).await;
    let mut cart = pickup(payload(
        vec![line(generator.id, i32::MAX), line(generator.id, i32::MAX)],
        "2025-06-10",
        "2025-06-10",
    ));
    cart.pricing.subtotal = 0;
    cart.pricing.total = 0;
    for l in cart.lines.iter_mut() {
        l.unit_price = 0;
        l.subtotal = 0;
    }

    let err = orchestrator(&store).checkout(None, cart).await.unwrap_err();

    assert_eq!(err.code(), CheckoutErrorCode::Validation);
    assert!(store.snapshot().await.reservations.is_empty());
    assert_eq!(held_on(&store, generator.id, date("2025-06-10")).await, 0);
}

#[tokio::test]
async fn amounts_beyond_the_money_columns_are_rejected() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let mut cart = pickup(payload(vec![line(tent.id, 1)], "2025-06-10", "2025-06-10"));
    cart.pricing.subtotal = i64::MAX;
    cart.pricing.total = i64::MAX;

    let err = orchestrator(&store).checkout(None, cart).await.unwrap_err();

    assert_eq!(err.code(), CheckoutErrorCode::Validation);
}

#[tokio::test]
async fn inactive_product_cannot_be_booked() {
    let mut retired = product("Retired bounce house", 2);
    retired.is_active = false;
    let store = store_with(&[retired.clone()]).await;

    let err = orchestrator(&store)
        .checkout(None, payload(vec![line(retired.id, 1)], "2025-06-10", "2025-06-10"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), CheckoutErrorCode::Unavailable);
}

#[tokio::test]
async fn line_item_failure_leaves_no_orphaned_header() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    store.fail_on(FaultPoint::LineItems);

    let err = orchestrator(&store)
        .checkout(Some(&member()), payload(vec![line(tent.id, 1)], "2025-06-10", "2025-06-12"))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Store(_)));
    assert_eq!(err.code(), CheckoutErrorCode::CommitFailed);
    assert_eq!(store.removed_headers().len(), 1);

    let state = store.snapshot().await;
    assert!(state.reservations.is_empty());
    assert!(state.items.is_empty());
    assert!(state.intervals.is_empty());
    assert_eq!(held_on(&store, tent.id, date("2025-06-11")).await, 0);
}

#[tokio::test]
async fn guest_store_failure_is_reported_as_procedure_failure() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    store.fail_on(FaultPoint::Intervals);

    let err = orchestrator(&store)
        .checkout(None, payload(vec![line(tent.id, 1)], "2025-06-10", "2025-06-12"))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::GuestProcedure(_)));
    assert_eq!(err.code(), CheckoutErrorCode::CommitFailed);
    assert!(store.snapshot().await.reservations.is_empty());
}

#[tokio::test]
async fn failed_commit_discards_every_write() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    store.fail_on(FaultPoint::Commit);

    let result = orchestrator(&store)
        .checkout(Some(&member()), payload(vec![line(tent.id, 1)], "2025-06-10", "2025-06-12"))
        .await;

    assert!(result.is_err());
    let state = store.snapshot().await;
    assert!(state.reservations.is_empty());
    assert!(state.customers.is_empty());
    assert!(state.outbox.is_empty());
}

#[tokio::test]
async fn fulfillment_failure_does_not_undo_the_reservation() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    store.fail_on(FaultPoint::FulfillmentTasks);

    let receipt = orchestrator(&store)
        .checkout(Some(&member()), payload(vec![line(tent.id, 3)], "2025-06-10", "2025-06-12"))
        .await
        .unwrap();

    let details = store.get_reservation(receipt.reservation_id).await.unwrap().unwrap();
    assert_eq!(details.reservation.total, 90);
    assert_eq!(details.reservation.subtotal, 75);
    assert_eq!(details.items.len(), 1);
    assert!(details.tasks.is_empty());
    assert_eq!(held_on(&store, tent.id, date("2025-06-10")).await, 3);
}

#[tokio::test]
async fn verification_failure_fails_closed() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    store.fail_on(FaultPoint::QueryIntervals);

    for principal in [None, Some(member())] {
        let err = orchestrator(&store)
            .checkout(principal.as_ref(), payload(vec![line(tent.id, 1)], "2025-06-10", "2025-06-12"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::VerificationFailed(_)));
    }
    assert!(store.snapshot().await.reservations.is_empty());
}

#[tokio::test]
async fn guest_and_member_checkouts_reach_the_same_state() {
    let tent = product("Party tent", 5);
    let guest_store = store_with(&[tent.clone()]).await;
    let member_store = store_with(&[tent.clone()]).await;
    let cart = payload(vec![line(tent.id, 2)], "2025-06-10", "2025-06-14");
    let principal = member();

    let guest = orchestrator(&guest_store).checkout(None, cart.clone()).await.unwrap();
    let account = orchestrator(&member_store).checkout(Some(&principal), cart).await.unwrap();

    assert_eq!(guest.total, account.total);
    assert_eq!(guest.deposit_amount, account.deposit_amount);

    let (g, m) = (guest_store.snapshot().await, member_store.snapshot().await);
    let (gr, mr) = (&g.reservations[&guest.reservation_id], &m.reservations[&account.reservation_id]);
    assert_eq!(gr.status, mr.status);
    assert_eq!((gr.subtotal, gr.delivery_fee, gr.total), (mr.subtotal, mr.delivery_fee, mr.total));
    assert_eq!(g.items.len(), m.items.len());
    assert_eq!(g.intervals.len(), m.intervals.len());
    assert_eq!(g.tasks.len(), m.tasks.len());

    let guest_customer = g.customers.values().next().unwrap();
    let member_customer = m.customers.values().next().unwrap();
    assert_eq!(guest_customer.user_id, None);
    assert_eq!(member_customer.user_id, Some(principal.user_id));
    assert_eq!(guest_customer.contact.email, "dana@example.com");
}

#[tokio::test]
async fn member_without_contact_email_books_under_account_email() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let principal = member();
    let mut cart = payload(vec![line(tent.id, 1)], "2025-06-10", "2025-06-10");
    cart.contact.email = "  ".to_string();

    orchestrator(&store).checkout(Some(&principal), cart.clone()).await.unwrap();

    let state = store.snapshot().await;
    let customer = state.customers.values().next().unwrap();
    assert_eq!(customer.contact.email, principal.email);
    assert_eq!(customer.user_id, Some(principal.user_id));

    let err = orchestrator(&store).checkout(None, cart).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));
}

#[tokio::test]
async fn repeat_guest_reuses_customer_by_email() {
    let chairs = product("Folding chair", 40);
    let store = store_with(&[chairs.clone()]).await;
    let checkout = orchestrator(&store);

    checkout
        .checkout(None, pickup(payload(vec![line(chairs.id, 5)], "2025-06-10", "2025-06-10")))
        .await
        .unwrap();
    let mut again = pickup(payload(vec![line(chairs.id, 5)], "2025-06-20", "2025-06-20"));
    again.contact.email = "dana@example.com".to_string();
    again.contact.phone = "+1 555 0199".to_string();
    checkout.checkout(None, again).await.unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.reservations.len(), 2);
    assert_eq!(state.customers.len(), 1);
    assert_eq!(state.customers.values().next().unwrap().contact.phone, "+1 555 0199");
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell_the_last_unit() {
    let generator = product("Silent generator", 1);
    let store = store_with(&[generator.clone()]).await;
    let checkout = Arc::new(orchestrator(&store));
    let cart = payload(vec![line(generator.id, 1)], "2025-06-10", "2025-06-12");

    let attempts = (0..8).map(|i| {
        let checkout = checkout.clone();
        let cart = cart.clone();
        let principal = if i % 2 == 0 { Some(member()) } else { None };
        tokio::spawn(async move { checkout.checkout(principal.as_ref(), cart).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.code(), CheckoutErrorCode::Unavailable);
    }

    for day in availability::days(date("2025-06-10"), date("2025-06-12")) {
        assert_eq!(held_on(&store, generator.id, day).await, 1);
    }
    assert_eq!(store.snapshot().await.reservations.len(), 1);
}

#[tokio::test]
async fn adjacent_rentals_share_a_unit() {
    let generator = product("Silent generator", 1);
    let store = store_with(&[generator.clone()]).await;
    let checkout = orchestrator(&store);

    checkout
        .checkout(None, payload(vec![line(generator.id, 1)], "2025-06-10", "2025-06-12"))
        .await
        .unwrap();
    checkout
        .checkout(None, payload(vec![line(generator.id, 1)], "2025-06-13", "2025-06-15"))
        .await
        .unwrap();

    let err = checkout
        .checkout(None, payload(vec![line(generator.id, 1)], "2025-06-12", "2025-06-13"))
        .await
        .unwrap_err();
    match err {
        CheckoutError::LineUnavailable { conflicting_dates, .. } => {
            assert_eq!(conflicting_dates, vec![date("2025-06-12"), date("2025-06-13")]);
        }
        other => panic!("expected LineUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn deposit_is_proportional_above_the_minimum() {
    let stage = product("Stage riser", 10);
    let store = store_with(&[stage.clone()]).await;
    let mut cart = pickup(payload(vec![line(stage.id, 1)], "2025-06-10", "2025-06-10"));
    cart.lines[0].unit_price = 1001;
    cart.lines[0].subtotal = 1001;
    cart.pricing.subtotal = 1001;
    cart.pricing.total = 1001;

    let receipt = orchestrator(&store).checkout(None, cart).await.unwrap();

    assert_eq!(receipt.deposit_amount, 201);
}

#[tokio::test]
async fn invalid_payloads_are_rejected_before_any_write() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let checkout = orchestrator(&store);
    let base = payload(vec![line(tent.id, 1)], "2025-06-10", "2025-06-12");

    let mut past = base.clone();
    past.start_date = date("2025-05-30");

    let mut reversed = base.clone();
    reversed.start_date = date("2025-06-13");

    let mut too_long = base.clone();
    too_long.end_date = date("2025-12-31");

    let mut no_address = base.clone();
    no_address.address = None;

    let mut no_terms = base.clone();
    no_terms.consents.terms_accepted = false;

    let mut empty = base.clone();
    empty.lines.clear();

    let mut zero_quantity = base.clone();
    zero_quantity.lines[0].quantity = 0;

    let mut bad_email = base.clone();
    bad_email.contact.email = "not-an-email".to_string();

    for invalid in [past, reversed, too_long, no_address, no_terms, empty, zero_quantity, bad_email] {
        let err = checkout.checkout(None, invalid).await.unwrap_err();
        assert_eq!(err.code(), CheckoutErrorCode::Validation, "{}", err);
    }

    let state = store.snapshot().await;
    assert!(state.reservations.is_empty());
    assert!(state.customers.is_empty());
}

struct RejectingProcedure;

#[async_trait]
impl GuestCheckoutProcedure for RejectingProcedure {
    async fn execute(&self, _request: &GuestCheckoutRequest) -> Result<CommitOutcome, CheckoutError> {
        Err(CheckoutError::Store(StoreError::Database("procedure raised".to_string())))
    }
}

#[tokio::test]
async fn guests_go_through_the_configured_procedure() {
    let tent = product("Party tent", 5);
    let store = store_with(&[tent.clone()]).await;
    let checkout = orchestrator(&store).with_guest_procedure(Arc::new(RejectingProcedure));
    let cart = payload(vec![line(tent.id, 1)], "2025-06-10", "2025-06-12");

    let err = checkout.checkout(None, cart.clone()).await.unwrap_err();
    assert!(matches!(err, CheckoutError::GuestProcedure(ref msg) if msg.contains("procedure raised")));

    // Members bypass the procedure.
    checkout.checkout(Some(&member()), cart).await.unwrap();
    assert_eq!(store.snapshot().await.reservations.len(), 1);
}
