use std::sync::Arc;

use chrono::Utc;
use shared::*;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::error::{LifecycleError, StoreError};
use crate::store::*;

/// Post-checkout state changes of a reservation. Each call is one transaction
/// holding the reservation row; the matching event is written to the outbox in
/// the same transaction.
pub struct ReservationLifecycle<S: BookingStore> {
    store: Arc<S>,
}

impl<S: BookingStore> Clone for ReservationLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: BookingStore> ReservationLifecycle<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get_reservation(&self, id: Uuid) -> Result<ReservationDetails, LifecycleError> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    /// Cancelling frees the reservation's stock for every overlapping date.
    /// Cancelling an already cancelled reservation is a no-op.
    #[instrument(skip(self))]
    pub async fn cancel_reservation(&self, id: Uuid) -> Result<Reservation, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let result = cancel_in(tx.as_mut(), id).await;
        finish(tx, result).await
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, to: ReservationStatus) -> Result<Reservation, LifecycleError> {
        if to == ReservationStatus::Cancelled {
            return self.cancel_reservation(id).await;
        }

        let mut tx = self.store.begin().await?;
        let result = advance_in(tx.as_mut(), id, to).await;
        finish(tx, result).await
    }

    #[instrument(skip(self))]
    pub async fn refund_deposit(&self, id: Uuid) -> Result<Reservation, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let result = refund_in(tx.as_mut(), id).await;
        finish(tx, result).await
    }
}

async fn finish(
    mut tx: Box<dyn BookingTx>,
    result: Result<Reservation, LifecycleError>,
) -> Result<Reservation, LifecycleError> {
    match result {
        Ok(reservation) => {
            tx.commit().await?;
            Ok(reservation)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                error!("Rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

async fn locked(tx: &mut dyn BookingTx, id: Uuid) -> Result<Reservation, LifecycleError> {
    tx.lock_reservation(id).await?.ok_or(LifecycleError::NotFound(id))
}

async fn publish(tx: &mut dyn BookingTx, event: BookingEvent) -> Result<(), LifecycleError> {
    let outbox = event.to_outbox().map_err(StoreError::from)?;
    tx.append_outbox(&outbox).await?;
    Ok(())
}

async fn cancel_in(tx: &mut dyn BookingTx, id: Uuid) -> Result<Reservation, LifecycleError> {
    let mut reservation = locked(tx, id).await?;
    let previous = reservation.status;

    if previous == ReservationStatus::Cancelled {
        return Ok(reservation);
    }
    if !previous.can_transition_to(ReservationStatus::Cancelled) {
        return Err(LifecycleError::InvalidTransition {
            from: previous,
            to: ReservationStatus::Cancelled,
        });
    }

    tx.set_status(id, ReservationStatus::Cancelled).await?;
    publish(
        tx,
        BookingEvent::ReservationCancelled {
            reservation_id: id,
            previous_status: previous,
        },
    )
    .await?;

    info!(reservation_id = %id, "Reservation cancelled from {}, stock released", previous);
    reservation.status = ReservationStatus::Cancelled;
    Ok(reservation)
}

async fn advance_in(tx: &mut dyn BookingTx, id: Uuid, to: ReservationStatus) -> Result<Reservation, LifecycleError> {
    let mut reservation = locked(tx, id).await?;
    let from = reservation.status;

    if !from.can_transition_to(to) {
        return Err(LifecycleError::InvalidTransition { from, to });
    }

    tx.set_status(id, to).await?;
    publish(
        tx,
        BookingEvent::ReservationStatusChanged {
            reservation_id: id,
            from,
            to,
        },
    )
    .await?;

    info!(reservation_id = %id, "Reservation moved from {} to {}", from, to);
    reservation.status = to;
    Ok(reservation)
}

async fn refund_in(tx: &mut dyn BookingTx, id: Uuid) -> Result<Reservation, LifecycleError> {
    let mut reservation = locked(tx, id).await?;

    if reservation.deposit_status == DepositStatus::Refunded {
        return Err(LifecycleError::DepositAlreadyRefunded(id));
    }
    if !matches!(
        reservation.status,
        ReservationStatus::Cancelled | ReservationStatus::Completed
    ) {
        return Err(LifecycleError::DepositNotRefundable(reservation.status));
    }

    let at = Utc::now();
    tx.mark_deposit_refunded(id, at).await?;
    publish(
        tx,
        BookingEvent::DepositRefunded {
            reservation_id: id,
            amount: reservation.deposit_amount,
        },
    )
    .await?;

    info!(reservation_id = %id, amount = reservation.deposit_amount, "Deposit refunded");
    reservation.deposit_status = DepositStatus::Refunded;
    reservation.deposit_refunded_at = Some(at);
    Ok(reservation)
}
