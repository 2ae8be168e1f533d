//! Read-only trip slip snapshot handed to document generators

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::SlipPreferences;
use crate::derivation::display_balance;
use crate::types::*;

/// Everything a printed trip slip shows, frozen at generation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSlip {
    pub header_text: Option<String>,
    pub phone_lines: Vec<String>,
    pub slogan: Option<String>,

    pub trip_id: String,
    pub status: TripStatus,
    pub trip_date: NaiveDate,
    pub loading_date: Option<NaiveDate>,
    pub loading_location: Option<String>,
    pub unloading_location: Option<String>,
    pub consignment_item: Option<String>,
    pub consignor_name: Option<String>,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,

    pub loaded_weight: BigDecimal,
    pub driver_rate_per_ton: BigDecimal,
    pub hire_value: BigDecimal,
    pub driver_advance: BigDecimal,
    pub other_expenses: Vec<OtherExpense>,
    pub driver_balance_paid: BigDecimal,
    /// Clamped at zero; an overpaid driver shows nothing due
    pub driver_balance_due: BigDecimal,
    pub to_pay_amount: Option<BigDecimal>,
    pub net_driver_keeps: Option<BigDecimal>,

    pub billed_weight: BigDecimal,
    pub consignor_rate_per_ton: BigDecimal,
    pub gross_amount: BigDecimal,
    pub consignor_advance: BigDecimal,
    pub consignor_balance_received: BigDecimal,
    /// Clamped at zero
    pub consignor_balance_due: BigDecimal,
    pub pod_status: PodStatus,
}

impl TripSlip {
    /// Build a slip from a trip and, when registered, its driver
    pub fn build(trip: &Trip, driver: Option<&Driver>, preferences: SlipPreferences) -> Self {
        let vehicle = trip.vehicle.as_ref();
        let vehicle_number = driver
            .and_then(|d| d.vehicle_number.clone())
            .or_else(|| vehicle.and_then(|v| v.lorry_name.clone()));
        let driver_name = driver
            .map(|d| d.name.clone())
            .or_else(|| vehicle.and_then(|v| v.driver_name.clone()));
        let driver_phone = driver
            .map(|d| d.phone.clone())
            .or_else(|| vehicle.and_then(|v| v.driver_phone.clone()));

        let c = &trip.costing;
        let b = &trip.billing;
        let to_pay = trip.is_to_pay();

        Self {
            header_text: preferences.header_text,
            phone_lines: preferences.phone_lines,
            slogan: preferences.slogan,
            trip_id: trip.id.clone(),
            status: trip.status,
            trip_date: trip.trip_date,
            loading_date: trip.loading_date,
            loading_location: trip.loading_location.clone(),
            unloading_location: trip.unloading_location.clone(),
            consignment_item: trip.consignment_item.clone(),
            consignor_name: trip.consignor_name.clone(),
            vehicle_number,
            driver_name,
            driver_phone,
            loaded_weight: c.loaded_weight.clone(),
            driver_rate_per_ton: c.driver_rate_per_ton.clone(),
            hire_value: c.hire_value.clone(),
            driver_advance: c.driver_advance.clone(),
            other_expenses: c.other_expenses.clone(),
            driver_balance_paid: c.driver_balance_paid.clone(),
            driver_balance_due: display_balance(&trip.balances.balance_payable_to_driver),
            to_pay_amount: to_pay.then(|| c.to_pay.to_pay_amount.clone()),
            net_driver_keeps: (to_pay && !trip.profit_redacted)
                .then(|| trip.balances.net_driver_keeps.clone()),
            billed_weight: b.billed_weight.clone(),
            consignor_rate_per_ton: b.consignor_rate_per_ton.clone(),
            gross_amount: b.gross_amount.clone(),
            consignor_advance: b.consignor_advance.clone(),
            consignor_balance_received: b.consignor_balance_received.clone(),
            consignor_balance_due: display_balance(&trip.balances.balance_receivable),
            pod_status: c.pod_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::rederive;

    #[test]
    fn test_slip_clamps_overpaid_driver_balance() {
        let mut trip = Trip::new(
            "t1".into(),
            "org1".into(),
            TripKind::Logistics,
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        );
        trip.costing.loaded_weight = BigDecimal::from(10);
        trip.costing.driver_rate_per_ton = BigDecimal::from(1000);
        trip.costing.driver_advance = BigDecimal::from(12000);
        trip.vehicle = Some(AdHocVehicle {
            lorry_name: Some("TN30 X 4455".into()),
            driver_name: Some("Selvam".into()),
            ..AdHocVehicle::default()
        });
        rederive(&mut trip);
        assert_eq!(trip.balances.balance_payable_to_driver, BigDecimal::from(-2000));

        let prefs = SlipPreferences {
            header_text: Some("Sri Murugan Transports".into()),
            phone_lines: vec!["0427 2345678".into()],
            slogan: None,
        };
        let slip = TripSlip::build(&trip, None, prefs);
        assert_eq!(slip.driver_balance_due, BigDecimal::from(0));
        assert_eq!(slip.vehicle_number.as_deref(), Some("TN30 X 4455"));
        assert_eq!(slip.driver_name.as_deref(), Some("Selvam"));
        assert!(slip.to_pay_amount.is_none());
        assert_eq!(slip.header_text.as_deref(), Some("Sri Murugan Transports"));
    }
}
