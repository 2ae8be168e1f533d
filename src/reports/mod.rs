//! Read-only settlement and aging reports
//!
//! Every aggregator here is a pure function over an already scoped and
//! filtered trip set. Reports never write to trips.

pub mod aging;
pub mod loans;
pub mod settlement;

pub use aging::*;
pub use loans::*;
pub use settlement::*;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ReportLimits;
use crate::traits::TripFilter;
use crate::types::*;

/// Date range and optional party filters for a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub consignor_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
}

impl ReportQuery {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from,
            to,
            consignor_id: None,
            driver_id: None,
        }
    }

    pub fn for_consignor(mut self, consignor_id: impl Into<String>) -> Self {
        self.consignor_id = Some(consignor_id.into());
        self
    }

    pub fn for_driver(mut self, driver_id: impl Into<String>) -> Self {
        self.driver_id = Some(driver_id.into());
        self
    }

    /// Check the range against the configured limits
    pub fn validate(&self, limits: &ReportLimits) -> LedgerResult<()> {
        if self.from > self.to {
            return Err(LedgerError::InvalidReportQuery(format!(
                "range start {} is after end {}",
                self.from, self.to
            )));
        }
        let days = (self.to - self.from).num_days() + 1;
        if days > limits.max_range_days {
            return Err(LedgerError::InvalidReportQuery(format!(
                "range of {} days exceeds the limit of {}",
                days, limits.max_range_days
            )));
        }
        Ok(())
    }

    /// Storage filter for the query; fetches one past the cap so overflow is detectable
    pub fn trip_filter(&self, limits: &ReportLimits) -> TripFilter {
        TripFilter {
            from: Some(self.from),
            to: Some(self.to),
            consignor_id: self.consignor_id.clone(),
            driver_id: self.driver_id.clone(),
            statuses: None,
            limit: Some(limits.max_trips.saturating_add(1)),
        }
    }

    /// Reject a matched set larger than the cap instead of silently truncating
    pub fn check_trip_count(&self, count: usize, limits: &ReportLimits) -> LedgerResult<()> {
        if count > limits.max_trips {
            return Err(LedgerError::InvalidReportQuery(format!(
                "more than {} trips match; narrow the date range or add a filter",
                limits.max_trips
            )));
        }
        Ok(())
    }
}

/// Trips that carry money: cancelled trips and draft placeholders are left out
pub(crate) fn billable(trips: &[Trip]) -> impl Iterator<Item = &Trip> {
    trips
        .iter()
        .filter(|t| !matches!(t.status, TripStatus::Cancelled | TripStatus::Draft))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn test_query_range_is_validated() {
        let limits = ReportLimits::default();
        assert!(ReportQuery::between(date(1, 1), date(1, 31)).validate(&limits).is_ok());
        assert!(matches!(
            ReportQuery::between(date(2, 1), date(1, 1)).validate(&limits),
            Err(LedgerError::InvalidReportQuery(_))
        ));

        let tight = ReportLimits {
            max_range_days: 31,
            ..ReportLimits::default()
        };
        assert!(ReportQuery::between(date(1, 1), date(1, 31)).validate(&tight).is_ok());
        assert!(ReportQuery::between(date(1, 1), date(2, 1)).validate(&tight).is_err());
    }

    #[test]
    fn test_trip_cap() {
        let limits = ReportLimits {
            max_trips: 2,
            ..ReportLimits::default()
        };
        let query = ReportQuery::between(date(1, 1), date(1, 31)).for_driver("d1");
        assert_eq!(query.trip_filter(&limits).limit, Some(3));
        assert_eq!(query.trip_filter(&limits).driver_id.as_deref(), Some("d1"));
        assert!(query.check_trip_count(2, &limits).is_ok());
        assert!(query.check_trip_count(3, &limits).is_err());
    }
}
