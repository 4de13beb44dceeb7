pub mod api;
pub mod error;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod schema;
pub mod service;

pub use error::AvailabilityError;
pub use postgres::PgAvailabilityRepository;
pub use repository::{AvailabilityRepository, BlockOutcome, ManualBlock};
pub use service::{AvailabilityConfig, AvailabilityService};
