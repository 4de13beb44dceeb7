pub mod api;
pub mod checkout;
pub mod error;
pub mod fulfillment;
pub mod lifecycle;
pub mod memory;
pub mod models;
pub mod outbox;
pub mod postgres;
pub mod schema;
pub mod store;

pub use checkout::{
    compute_deposit, CheckoutConfig, CheckoutOrchestrator, CheckoutReceipt, GuestCheckoutProcedure,
    TransactionalGuestCheckout,
};
pub use error::{CheckoutError, LifecycleError, StoreError};
pub use lifecycle::ReservationLifecycle;
pub use memory::{FaultPoint, MemoryBookingStore};
pub use postgres::{DbPool, PgBookingStore};
pub use store::{BookingStore, BookingTx, ReservationDetails};
