//! Canonical derived snapshot of a trip's money fields

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::derivation::formulas::*;
use crate::types::*;

/// All computed money fields for a trip, produced from persisted inputs only
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedSnapshot {
    pub hire_value: BigDecimal,
    pub gross_amount: BigDecimal,
    pub commission: BigDecimal,
    pub balance_payable_to_driver: BigDecimal,
    pub balance_receivable: BigDecimal,
    pub net_driver_keeps: BigDecimal,
    pub driver_balance_status: DriverBalanceStatus,
}

impl DerivedSnapshot {
    /// Recompute every derived field from the raw costing and billing inputs
    pub fn derive(costing: &DriverCosting, billing: &ConsignorBilling) -> Self {
        let hire_value = derive_hire_value(
            &costing.loaded_weight,
            &costing.driver_rate_per_ton,
            &costing.loading_commission,
        );
        let gross_amount = derive_gross_amount(
            &billing.billed_weight,
            &billing.consignor_rate_per_ton,
            &billing.round_off,
            &billing.loading_mamul,
            &billing.unloading_mamul,
            &billing.payment_mamul,
            &billing.tds,
        );
        let commission = derive_commission(&gross_amount, &hire_value);
        let balance_payable_to_driver = derive_driver_balance(
            &hire_value,
            &costing.driver_advance,
            &costing.other_expenses_total(),
            &costing.driver_balance_paid,
            &costing.to_pay.to_pay_amount,
        );
        let balance_receivable = derive_consignor_balance(
            &gross_amount,
            &billing.consignor_advance,
            &billing.consignor_balance_received,
            &billing.round_off,
            &billing.tds,
        );
        let net_driver_keeps =
            derive_net_driver_keeps(&costing.to_pay.to_pay_amount, &costing.to_pay.to_pay_commission);
        let driver_balance_status = classify_driver_balance(&balance_payable_to_driver);

        Self {
            hire_value,
            gross_amount,
            commission,
            balance_payable_to_driver,
            balance_receivable,
            net_driver_keeps,
            driver_balance_status,
        }
    }

    /// Derive from a whole trip
    pub fn of_trip(trip: &Trip) -> Self {
        Self::derive(&trip.costing, &trip.billing)
    }

    /// Read the derived fields as they were persisted, without recomputing
    pub fn of_stored(trip: &Trip) -> Self {
        Self {
            hire_value: trip.costing.hire_value.clone(),
            gross_amount: trip.billing.gross_amount.clone(),
            commission: trip.balances.commission.clone(),
            balance_payable_to_driver: trip.balances.balance_payable_to_driver.clone(),
            balance_receivable: trip.balances.balance_receivable.clone(),
            net_driver_keeps: trip.balances.net_driver_keeps.clone(),
            driver_balance_status: trip.balances.driver_balance_status,
        }
    }

    /// Write the snapshot back onto the trip's derived fields
    pub fn apply_to(self, trip: &mut Trip) {
        trip.costing.hire_value = self.hire_value;
        trip.billing.gross_amount = self.gross_amount;
        trip.balances = TripBalances {
            commission: self.commission,
            balance_payable_to_driver: self.balance_payable_to_driver,
            balance_receivable: self.balance_receivable,
            net_driver_keeps: self.net_driver_keeps,
            driver_balance_status: self.driver_balance_status,
        };
    }

    /// Driver balance clamped for display
    pub fn display_driver_balance(&self) -> BigDecimal {
        display_balance(&self.balance_payable_to_driver)
    }

    /// Consignor balance clamped for display
    pub fn display_consignor_balance(&self) -> BigDecimal {
        display_balance(&self.balance_receivable)
    }
}

/// Recompute and store every derived field on a trip
pub fn rederive(trip: &mut Trip) {
    let snapshot = DerivedSnapshot::of_trip(trip);
    tracing::debug!(
        trip_id = %trip.id,
        hire_value = %snapshot.hire_value,
        gross_amount = %snapshot.gross_amount,
        commission = %snapshot.commission,
        "Derived trip snapshot"
    );
    snapshot.apply_to(trip);
}

pub fn classify_driver_balance(balance: &BigDecimal) -> DriverBalanceStatus {
    let zero = BigDecimal::from(0);
    if *balance > zero {
        DriverBalanceStatus::Pending
    } else if *balance < zero {
        DriverBalanceStatus::Overpaid
    } else {
        DriverBalanceStatus::Settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn scenario_trip() -> Trip {
        let mut trip = Trip::new(
            "t1".to_string(),
            "org1".to_string(),
            TripKind::Logistics,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        );
        trip.costing.loaded_weight = BigDecimal::from(10);
        trip.costing.driver_rate_per_ton = BigDecimal::from(2000);
        trip.costing.loading_commission = BigDecimal::from(500);
        trip.costing.driver_advance = BigDecimal::from(5000);
        trip.billing.billed_weight = BigDecimal::from(10);
        trip.billing.consignor_rate_per_ton = BigDecimal::from(2500);
        trip.billing.consignor_advance = BigDecimal::from(10000);
        trip
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut trip = scenario_trip();
        rederive(&mut trip);

        assert_eq!(trip.costing.hire_value, BigDecimal::from(19500));
        assert_eq!(trip.billing.gross_amount, BigDecimal::from(25000));
        assert_eq!(trip.balances.commission, BigDecimal::from(5500));
        assert_eq!(trip.balances.balance_payable_to_driver, BigDecimal::from(14500));
        assert_eq!(trip.balances.balance_receivable, BigDecimal::from(15000));
        assert_eq!(trip.balances.driver_balance_status, DriverBalanceStatus::Pending);
    }

    #[test]
    fn test_other_expenses_reduce_driver_balance() {
        let mut trip = scenario_trip();
        trip.costing.other_expenses = vec![
            OtherExpense {
                expense_type: "TOLL".to_string(),
                custom_name: None,
                amount: BigDecimal::from(700),
            },
            OtherExpense {
                expense_type: "OTHER".to_string(),
                custom_name: Some("Weighbridge".to_string()),
                amount: BigDecimal::from(300),
            },
        ];
        rederive(&mut trip);
        assert_eq!(trip.balances.balance_payable_to_driver, BigDecimal::from(13500));
    }

    #[test]
    fn test_overpaid_driver_is_stored_signed() {
        let mut trip = scenario_trip();
        trip.costing.driver_balance_paid = BigDecimal::from(15000);
        let snapshot = DerivedSnapshot::of_trip(&trip);
        assert_eq!(snapshot.balance_payable_to_driver, BigDecimal::from(-500));
        assert_eq!(snapshot.driver_balance_status, DriverBalanceStatus::Overpaid);
        assert_eq!(snapshot.display_driver_balance(), BigDecimal::from(0));
    }

    #[test]
    fn test_rederive_is_idempotent() {
        let mut trip = scenario_trip();
        rederive(&mut trip);
        let first = trip.clone();
        rederive(&mut trip);
        assert_eq!(first, trip);
    }
}
