//! Commission, to-pay, driver and consignor settlement aggregates

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::reports::{billable, AgingReport, HandLoanSummary, ReportQuery};
use crate::types::*;
use crate::utils::validation::consignor_name_key;

/// Expected versus realized commission across a trip set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommissionSummary {
    pub trip_count: usize,
    /// Sum of derived commission, before any cash moves
    pub expected: BigDecimal,
    pub received: BigDecimal,
    pub pending: BigDecimal,
}

/// Trips where the consignor paid the driver directly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToPaySummary {
    pub trip_count: usize,
    pub to_pay_amount: BigDecimal,
    pub commission: BigDecimal,
    pub commission_received: BigDecimal,
    pub commission_pending: BigDecimal,
    pub net_driver_keeps: BigDecimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverLedgerEntry {
    pub driver_id: String,
    pub trip_count: usize,
    pub total_payable: BigDecimal,
    /// Advances paid out
    pub total_paid: BigDecimal,
    /// Signed: negative means the driver owes money back
    pub outstanding: BigDecimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsignorLedgerEntry {
    /// Registered consignor id, or the normalized name for ad-hoc consignors
    pub consignor_key: String,
    pub consignor_name: Option<String>,
    pub trip_count: usize,
    pub invoiced: BigDecimal,
    pub received: BigDecimal,
    pub outstanding: BigDecimal,
}

/// Every settlement view for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub query: ReportQuery,
    pub trip_count: usize,
    /// Absent for roles that may not see profit
    pub commission: Option<CommissionSummary>,
    pub to_pay: ToPaySummary,
    pub drivers: Vec<DriverLedgerEntry>,
    pub consignors: Vec<ConsignorLedgerEntry>,
    pub aging: AgingReport,
    pub hand_loans: HandLoanSummary,
}

fn zero() -> BigDecimal {
    BigDecimal::from(0)
}

/// Cash actually kept on a non-to-pay trip so far
pub fn realized_profit(trip: &Trip) -> BigDecimal {
    let c = &trip.costing;
    let b = &trip.billing;
    let collected = &b.consignor_advance + &b.consignor_balance_received;
    let paid_out = &c.driver_advance + &c.driver_balance_paid;
    collected - paid_out - c.other_expenses_total()
}

pub fn commission_summary(trips: &[Trip]) -> CommissionSummary {
    let mut summary = CommissionSummary::default();
    for trip in billable(trips) {
        summary.trip_count += 1;
        summary.expected += &trip.balances.commission;

        if trip.is_to_pay() {
            let to_pay = &trip.costing.to_pay;
            summary.received += &to_pay.to_pay_commission - &to_pay.to_pay_pending_commission;
            summary.pending += &to_pay.to_pay_pending_commission;
        } else {
            let realized = realized_profit(trip);
            summary.pending += (&trip.balances.commission - &realized).max(zero());
            summary.received += realized.max(zero());
        }
    }
    summary
}

pub fn to_pay_summary(trips: &[Trip]) -> ToPaySummary {
    let mut summary = ToPaySummary::default();
    for trip in billable(trips).filter(|t| t.is_to_pay()) {
        let to_pay = &trip.costing.to_pay;
        summary.trip_count += 1;
        summary.to_pay_amount += &to_pay.to_pay_amount;
        summary.commission += &to_pay.to_pay_commission;
        summary.commission_received += &to_pay.to_pay_commission - &to_pay.to_pay_pending_commission;
        summary.commission_pending += &to_pay.to_pay_pending_commission;
        summary.net_driver_keeps += &trip.balances.net_driver_keeps;
    }
    summary
}

/// Per-driver totals, grouped by assigned driver id
pub fn driver_ledger(trips: &[Trip]) -> Vec<DriverLedgerEntry> {
    let mut entries: BTreeMap<&str, DriverLedgerEntry> = BTreeMap::new();
    for trip in billable(trips) {
        let Some(driver_id) = trip.driver_id.as_deref() else {
            continue;
        };
        let entry = entries.entry(driver_id).or_insert_with(|| DriverLedgerEntry {
            driver_id: driver_id.to_string(),
            ..DriverLedgerEntry::default()
        });

        entry.trip_count += 1;
        entry.total_payable += if trip.is_to_pay() {
            &trip.balances.net_driver_keeps
        } else {
            &trip.costing.hire_value
        };
        entry.total_paid += &trip.costing.driver_advance;
        entry.outstanding += &trip.balances.balance_payable_to_driver;
    }
    entries.into_values().collect()
}

/// What the consignor was billed for one trip
fn invoiced(trip: &Trip) -> &BigDecimal {
    if trip.is_to_pay() {
        &trip.costing.to_pay.to_pay_amount
    } else {
        &trip.billing.gross_amount
    }
}

/// What the consignor still owes for one trip
fn consignor_outstanding(trip: &Trip) -> BigDecimal {
    if trip.is_to_pay() {
        // settled the moment the driver reports collection
        if trip.costing.to_pay.to_pay_date.is_some() {
            zero()
        } else {
            trip.costing.to_pay.to_pay_amount.clone()
        }
    } else {
        trip.balances.balance_receivable.clone()
    }
}

/// Per-consignor totals; received is derived as invoiced minus outstanding
pub fn consignor_ledger(trips: &[Trip]) -> Vec<ConsignorLedgerEntry> {
    let mut entries: BTreeMap<String, ConsignorLedgerEntry> = BTreeMap::new();
    for trip in billable(trips) {
        let key = match (&trip.consignor_id, &trip.consignor_name) {
            (Some(id), _) => id.clone(),
            (None, Some(name)) => consignor_name_key(name),
            (None, None) => continue,
        };
        let entry = entries.entry(key.clone()).or_insert_with(|| ConsignorLedgerEntry {
            consignor_key: key,
            consignor_name: trip.consignor_name.clone(),
            ..ConsignorLedgerEntry::default()
        });

        entry.trip_count += 1;
        entry.invoiced += invoiced(trip);
        entry.outstanding += consignor_outstanding(trip);
    }

    entries
        .into_values()
        .map(|mut entry| {
            entry.received = &entry.invoiced - &entry.outstanding;
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::rederive;
    use chrono::NaiveDate;

    fn trip(id: &str) -> Trip {
        let mut trip = Trip::new(
            id.into(),
            "org1".into(),
            TripKind::Logistics,
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        );
        trip.status = TripStatus::Completed;
        trip.driver_id = Some("d1".into());
        trip.consignor_id = Some("c1".into());
        trip.consignor_name = Some("ABC Traders".into());
        trip.costing.loaded_weight = BigDecimal::from(10);
        trip.costing.driver_rate_per_ton = BigDecimal::from(2000);
        trip.costing.loading_commission = BigDecimal::from(500);
        trip.costing.driver_advance = BigDecimal::from(5000);
        trip.billing.billed_weight = BigDecimal::from(10);
        trip.billing.consignor_rate_per_ton = BigDecimal::from(2500);
        trip.billing.consignor_advance = BigDecimal::from(10000);
        rederive(&mut trip);
        trip
    }

    fn to_pay_trip(id: &str) -> Trip {
        let mut trip = trip(id);
        trip.costing.to_pay.to_pay_amount = BigDecimal::from(18000);
        trip.costing.to_pay.to_pay_commission = BigDecimal::from(1500);
        trip.costing.to_pay.to_pay_pending_commission = BigDecimal::from(500);
        rederive(&mut trip);
        trip
    }

    #[test]
    fn test_commission_realized_versus_expected() {
        let summary = commission_summary(&[trip("t1")]);
        // collected 10000, paid 5000: 5000 realized of 5500 expected
        assert_eq!(summary.expected, BigDecimal::from(5500));
        assert_eq!(summary.received, BigDecimal::from(5000));
        assert_eq!(summary.pending, BigDecimal::from(500));
    }

    #[test]
    fn test_negative_realized_profit_counts_as_pending_only() {
        let mut t = trip("t1");
        t.billing.consignor_advance = BigDecimal::from(0);
        rederive(&mut t);

        let summary = commission_summary(&[t]);
        assert_eq!(summary.received, BigDecimal::from(0));
        assert_eq!(summary.pending, BigDecimal::from(10500));
    }

    #[test]
    fn test_to_pay_trips_feed_both_summaries() {
        let trips = vec![trip("t1"), to_pay_trip("t2")];

        let commission = commission_summary(&trips);
        assert_eq!(commission.received, BigDecimal::from(6000));
        assert_eq!(commission.pending, BigDecimal::from(1000));

        let to_pay = to_pay_summary(&trips);
        assert_eq!(to_pay.trip_count, 1);
        assert_eq!(to_pay.commission_received, BigDecimal::from(1000));
        assert_eq!(to_pay.commission_pending, BigDecimal::from(500));
        assert_eq!(to_pay.net_driver_keeps, BigDecimal::from(16500));
    }

    #[test]
    fn test_driver_ledger_uses_to_pay_formula() {
        let ledger = driver_ledger(&[trip("t1"), to_pay_trip("t2")]);
        assert_eq!(ledger.len(), 1);
        let entry = &ledger[0];
        assert_eq!(entry.trip_count, 2);
        assert_eq!(entry.total_payable, BigDecimal::from(19500 + 16500));
        assert_eq!(entry.total_paid, BigDecimal::from(10000));
        // 14500 owed on the first trip, 19500 - 5000 - 18000 = -3500 on the second
        assert_eq!(entry.outstanding, BigDecimal::from(11000));
    }

    #[test]
    fn test_consignor_ledger_derives_received() {
        let mut collected = to_pay_trip("t3");
        collected.costing.to_pay.to_pay_date = NaiveDate::from_ymd_opt(2024, 4, 3);

        let ledger = consignor_ledger(&[trip("t1"), to_pay_trip("t2"), collected]);
        assert_eq!(ledger.len(), 1);
        let entry = &ledger[0];
        assert_eq!(entry.invoiced, BigDecimal::from(25000 + 18000 + 18000));
        assert_eq!(entry.outstanding, BigDecimal::from(15000 + 18000));
        assert_eq!(entry.received, BigDecimal::from(10000 + 18000));
    }

    #[test]
    fn test_cancelled_trips_are_ignored() {
        let mut cancelled = trip("t1");
        cancelled.status = TripStatus::Cancelled;
        assert_eq!(commission_summary(&[cancelled.clone()]).trip_count, 0);
        assert!(driver_ledger(&[cancelled]).is_empty());
    }
}
