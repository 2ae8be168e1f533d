//! Traits for storage abstraction and external collaborators

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::*;
use crate::utils::validation::{normalize_phone, validate_gstin, validate_name};

/// Storage abstraction for the trip ledger
///
/// Every read takes the organization id and must only ever return records
/// of that organization. Implementations back onto any store (PostgreSQL,
/// SQLite, in-memory, etc.).
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Save a new trip
    async fn save_trip(&mut self, trip: &Trip) -> LedgerResult<()>;

    /// Get a trip by ID within an organization
    async fn get_trip(&self, organization_id: &str, trip_id: &str) -> LedgerResult<Option<Trip>>;

    /// List trips of an organization matching a filter, ordered by trip date
    async fn list_trips(&self, organization_id: &str, filter: &TripFilter) -> LedgerResult<Vec<Trip>>;

    /// Replace a trip if its stored version still equals `expected_version`.
    ///
    /// Returns the stored trip carrying the next version, or
    /// [`LedgerError::Conflict`] when another writer got there first.
    async fn update_trip(&mut self, trip: &Trip, expected_version: u64) -> LedgerResult<Trip>;

    /// Delete a trip
    async fn delete_trip(&mut self, organization_id: &str, trip_id: &str) -> LedgerResult<()>;

    /// Save a new consignor
    async fn save_consignor(&mut self, consignor: &Consignor) -> LedgerResult<()>;

    /// Get a consignor by ID within an organization
    async fn get_consignor(
        &self,
        organization_id: &str,
        consignor_id: &str,
    ) -> LedgerResult<Option<Consignor>>;

    /// List all consignors of an organization
    async fn list_consignors(&self, organization_id: &str) -> LedgerResult<Vec<Consignor>>;

    /// Update a consignor
    async fn update_consignor(&mut self, consignor: &Consignor) -> LedgerResult<()>;

    /// Save a new driver
    async fn save_driver(&mut self, driver: &Driver) -> LedgerResult<()>;

    /// Get a driver by ID within an organization
    async fn get_driver(&self, organization_id: &str, driver_id: &str) -> LedgerResult<Option<Driver>>;

    /// List all drivers of an organization
    async fn list_drivers(&self, organization_id: &str) -> LedgerResult<Vec<Driver>>;

    /// Update a driver
    async fn update_driver(&mut self, driver: &Driver) -> LedgerResult<()>;

    /// Set a driver's availability and return the updated driver
    async fn set_driver_status(
        &mut self,
        organization_id: &str,
        driver_id: &str,
        status: DriverStatus,
    ) -> LedgerResult<Driver>;

    /// Save a new hand loan
    async fn save_hand_loan(&mut self, loan: &HandLoan) -> LedgerResult<()>;

    /// Get a hand loan by ID within an organization
    async fn get_hand_loan(&self, organization_id: &str, loan_id: &str) -> LedgerResult<Option<HandLoan>>;

    /// List hand loans of an organization matching a filter
    async fn list_hand_loans(
        &self,
        organization_id: &str,
        filter: &HandLoanFilter,
    ) -> LedgerResult<Vec<HandLoan>>;

    /// Update a hand loan
    async fn update_hand_loan(&mut self, loan: &HandLoan) -> LedgerResult<()>;
}

/// Filter for trip listings and report scans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub consignor_id: Option<String>,
    pub driver_id: Option<String>,
    pub statuses: Option<Vec<TripStatus>>,
    pub limit: Option<usize>,
}

impl TripFilter {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    /// Whether a trip satisfies every criterion except the limit
    pub fn matches(&self, trip: &Trip) -> bool {
        if self.from.is_some_and(|from| trip.trip_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| trip.trip_date > to) {
            return false;
        }
        if let Some(ref consignor_id) = self.consignor_id {
            if trip.consignor_id.as_ref() != Some(consignor_id) {
                return false;
            }
        }
        if let Some(ref driver_id) = self.driver_id {
            if trip.driver_id.as_ref() != Some(driver_id) {
                return false;
            }
        }
        if let Some(ref statuses) = self.statuses {
            if !statuses.contains(&trip.status) {
                return false;
            }
        }
        true
    }
}

/// Filter for hand loan listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandLoanFilter {
    pub driver_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl HandLoanFilter {
    pub fn for_driver(driver_id: impl Into<String>) -> Self {
        Self {
            driver_id: Some(driver_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, loan: &HandLoan) -> bool {
        self.driver_id.as_ref().is_none_or(|d| &loan.driver_id == d)
            && self.from.is_none_or(|from| loan.date >= from)
            && self.to.is_none_or(|to| loan.date <= to)
    }
}

/// Driver status change pushed to live dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverStatusUpdate {
    pub organization_id: String,
    pub driver_id: String,
    pub status: DriverStatus,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl DriverStatusUpdate {
    pub fn from_driver(driver: &Driver) -> Self {
        Self {
            organization_id: driver.organization_id.clone(),
            driver_id: driver.id.clone(),
            status: driver.status,
            lat: driver.current_location.map(|p| p.lat),
            lng: driver.current_location.map(|p| p.lng),
        }
    }
}

/// Fire-and-forget sink for live driver location/status.
///
/// Delivery is not guaranteed; observers that miss an update recover on
/// their next periodic refresh.
pub trait LocationSink: Send + Sync {
    fn publish(&self, update: DriverStatusUpdate);
}

/// Sink that drops every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LocationSink for NullSink {
    fn publish(&self, _update: DriverStatusUpdate) {}
}

/// Trait for implementing custom consignor validation rules
pub trait ConsignorValidator: Send + Sync {
    fn validate_consignor(&self, consignor: &Consignor) -> LedgerResult<()>;
}

/// Trait for implementing custom driver validation rules
pub trait DriverValidator: Send + Sync {
    fn validate_driver(&self, driver: &Driver) -> LedgerResult<()>;
}

/// Default consignor validator with basic rules
pub struct DefaultConsignorValidator;

impl ConsignorValidator for DefaultConsignorValidator {
    fn validate_consignor(&self, consignor: &Consignor) -> LedgerResult<()> {
        validate_name("name", &consignor.name)?;

        if let Some(ref email) = consignor.email {
            if !email.trim().is_empty() && !email.contains('@') {
                return Err(LedgerError::validation("email", "must contain '@'"));
            }
        }

        if let Some(ref gstin) = consignor.gstin {
            validate_gstin(gstin)?;
        }

        for route in &consignor.default_routes {
            if route.rate_per_ton < bigdecimal::BigDecimal::from(0) {
                return Err(LedgerError::validation(
                    "default_routes",
                    format!("rate for {} -> {} cannot be negative", route.from, route.to),
                ));
            }
        }

        Ok(())
    }
}

/// Default driver validator with basic rules
pub struct DefaultDriverValidator;

impl DriverValidator for DefaultDriverValidator {
    fn validate_driver(&self, driver: &Driver) -> LedgerResult<()> {
        validate_name("name", &driver.name)?;

        if normalize_phone(&driver.phone).len() < 10 {
            return Err(LedgerError::validation(
                "phone",
                "must contain at least 10 digits",
            ));
        }

        Ok(())
    }
}
