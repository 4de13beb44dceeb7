use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use shared::availability::{days, remaining_on};
use shared::*;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::AvailabilityError;
use crate::repository::{AvailabilityRepository, BlockOutcome, ManualBlock};

#[derive(Debug, Clone, Copy)]
pub struct AvailabilityConfig {
    /// Longest range, in days, a single query may walk.
    pub max_range_days: i64,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self { max_range_days: 366 }
    }
}

/// Read path over the interval ledger.
///
/// Every read fails closed: when the ledger cannot be fetched the answer is
/// "not available" with an error marker, never an optimistic guess.
pub struct AvailabilityService<R: AvailabilityRepository> {
    repository: Arc<R>,
    config: AvailabilityConfig,
}

impl<R: AvailabilityRepository> Clone for AvailabilityService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config,
        }
    }
}

impl<R: AvailabilityRepository> AvailabilityService<R> {
    pub fn new(repository: R, config: AvailabilityConfig) -> Self {
        Self {
            repository: Arc::new(repository),
            config,
        }
    }

    fn validate_range(&self, start: NaiveDate, end: NaiveDate) -> Result<(), AvailabilityError> {
        if start > end {
            return Err(AvailabilityError::Validation(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        let length = (end - start).num_days() + 1;
        if length > self.config.max_range_days {
            return Err(AvailabilityError::Validation(format!(
                "range of {} days exceeds the {} day limit",
                length, self.config.max_range_days
            )));
        }
        Ok(())
    }

    /// How many units of a product remain for every day of `[start, end]`.
    #[instrument(skip(self))]
    pub async fn check_availability(
        &self,
        product_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        quantity: i32,
    ) -> Result<AvailabilityResult, AvailabilityError> {
        self.validate_range(start, end)?;
        if quantity < 1 {
            return Err(AvailabilityError::Validation("quantity must be at least 1".to_string()));
        }

        let product = match self.repository.get_product(product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => return Ok(AvailabilityResult::unavailable("product not found")),
            Err(e) => {
                error!("Could not load product {}: {}", product_id, e);
                return Ok(AvailabilityResult::unverified(e.to_string()));
            }
        };
        if !product.is_active {
            return Ok(AvailabilityResult::unavailable("product is not active"));
        }

        match self.repository.query_intervals(vec![product_id], start, end).await {
            Ok(intervals) => Ok(compute_availability(product.total_stock, &intervals, start, end, quantity)),
            Err(e) => {
                error!("Could not load intervals for product {}: {}", product_id, e);
                Ok(AvailabilityResult::unverified(e.to_string()))
            }
        }
    }

    /// Day-by-day availability for one calendar month, from a single ledger fetch.
    #[instrument(skip(self))]
    pub async fn project_month(
        &self,
        product_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<MonthProjection, AvailabilityError> {
        let (first, last) = month_bounds(year, month)
            .ok_or_else(|| AvailabilityError::Validation(format!("invalid month {}-{}", year, month)))?;

        let mut projection = MonthProjection {
            product_id,
            year,
            month,
            days: Vec::new(),
            error: None,
        };

        let product = match self.repository.get_product(product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => return Ok(projection),
            Err(e) => {
                error!("Calendar for product {} unavailable: {}", product_id, e);
                projection.days = closed_month(first, last);
                projection.error = Some(e.to_string());
                return Ok(projection);
            }
        };

        if !product.is_active {
            projection.days = closed_month(first, last);
            return Ok(projection);
        }

        let intervals = match self.repository.query_intervals(vec![product_id], first, last).await {
            Ok(intervals) => intervals,
            Err(e) => {
                error!("Calendar for product {} unavailable: {}", product_id, e);
                projection.days = closed_month(first, last);
                projection.error = Some(e.to_string());
                return Ok(projection);
            }
        };

        projection.days = days(first, last)
            .map(|date| {
                let available_quantity = remaining_on(product.total_stock, &intervals, date);
                let is_maintenance = intervals
                    .iter()
                    .any(|i| i.status == IntervalStatus::Maintenance && i.covers(date));
                CalendarDay {
                    date,
                    available: available_quantity > 0 && !is_maintenance,
                    available_quantity,
                    is_maintenance,
                }
            })
            .collect();

        Ok(projection)
    }

    /// Ids of the given products that cannot supply one unit on every day of the range.
    #[instrument(skip(self, products), fields(products = products.len()))]
    pub async fn filter_unavailable(
        &self,
        products: &[Product],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<UnavailabilityResult, AvailabilityError> {
        self.validate_range(start, end)?;

        let mut result = UnavailabilityResult::default();
        result
            .unavailable_ids
            .extend(products.iter().filter(|p| !p.is_active).map(|p| p.id));

        let active: Vec<&Product> = products.iter().filter(|p| p.is_active).collect();
        if active.is_empty() {
            return Ok(result);
        }

        let ids = active.iter().map(|p| p.id).collect();
        let intervals = match self.repository.query_intervals(ids, start, end).await {
            Ok(intervals) => intervals,
            Err(e) => {
                warn!("Catalog availability could not be verified: {}", e);
                return Ok(UnavailabilityResult {
                    unavailable_ids: Default::default(),
                    has_error: true,
                    error_message: Some(e.to_string()),
                });
            }
        };

        let mut by_product: HashMap<Uuid, Vec<AvailabilityInterval>> = HashMap::new();
        for interval in intervals {
            by_product.entry(interval.product_id).or_default().push(interval);
        }

        // Products with stock and no overlapping interval are fully available and skip the walk.
        for product in active {
            if product.total_stock < 1 {
                result.unavailable_ids.insert(product.id);
                continue;
            }
            if let Some(held) = by_product.get(&product.id) {
                if first_shortfall(product.total_stock, held, start, end, 1).is_some() {
                    result.unavailable_ids.insert(product.id);
                }
            }
        }

        Ok(result)
    }

    /// Loads the products by id, then filters them. Ids with no product are
    /// unavailable. A failed product load is reported the same way as a failed
    /// ledger fetch.
    pub async fn filter_unavailable_ids(
        &self,
        product_ids: Vec<Uuid>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<UnavailabilityResult, AvailabilityError> {
        self.validate_range(start, end)?;
        match self.repository.get_products(product_ids.clone()).await {
            Ok(products) => {
                let mut result = self.filter_unavailable(&products, start, end).await?;
                if result.has_error {
                    return Ok(result);
                }
                let missing = product_ids
                    .into_iter()
                    .filter(|id| !products.iter().any(|p| p.id == *id));
                result.unavailable_ids.extend(missing);
                Ok(result)
            }
            Err(e) => {
                warn!("Catalog products could not be loaded: {}", e);
                Ok(UnavailabilityResult {
                    unavailable_ids: Default::default(),
                    has_error: true,
                    error_message: Some(e.to_string()),
                })
            }
        }
    }

    #[instrument(skip(self), fields(product_id = %block.product_id))]
    pub async fn block_dates(&self, block: ManualBlock) -> Result<AvailabilityInterval, AvailabilityError> {
        self.validate_range(block.start_date, block.end_date)?;
        if block.quantity < 1 {
            return Err(AvailabilityError::Validation("quantity must be at least 1".to_string()));
        }
        if !matches!(block.status, IntervalStatus::Blocked | IntervalStatus::Maintenance) {
            return Err(AvailabilityError::Validation(
                "manual blocks must be blocked or maintenance".to_string(),
            ));
        }

        let product_id = block.product_id;
        match self.repository.insert_block(block).await? {
            BlockOutcome::Created(interval) => Ok(interval),
            BlockOutcome::ProductMissing => Err(AvailabilityError::ProductNotFound(product_id)),
            BlockOutcome::Insufficient(check) => Err(AvailabilityError::Insufficient(format!(
                "only {} unit(s) free; short on {}",
                check.min_available_quantity,
                format_dates(&check.conflicting_dates)
            ))),
        }
    }

    #[instrument(skip(self))]
    pub async fn release_block(&self, interval_id: Uuid) -> Result<AvailabilityInterval, AvailabilityError> {
        let interval = self
            .repository
            .get_interval(interval_id)
            .await?
            .ok_or(AvailabilityError::IntervalNotFound(interval_id))?;

        if interval.reservation_id.is_some() {
            return Err(AvailabilityError::Validation(
                "interval belongs to a reservation; cancel the reservation instead".to_string(),
            ));
        }
        if interval.status == IntervalStatus::Released {
            return Ok(interval);
        }

        self.repository.release_interval(interval_id).await?;
        info!("Released manual block {}", interval_id);

        Ok(AvailabilityInterval {
            status: IntervalStatus::Released,
            ..interval
        })
    }
}

fn closed_month(first: NaiveDate, last: NaiveDate) -> Vec<CalendarDay> {
    days(first, last)
        .map(|date| CalendarDay {
            date,
            available: false,
            available_quantity: 0,
            is_maintenance: false,
        })
        .collect()
}

fn format_dates(dates: &[NaiveDate]) -> String {
    dates.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
}
