//! Property-based tests for the trip derivation engine
//!
//! These check the invariants every derivation must hold for arbitrary
//! money inputs, not just the worked examples in the unit tests.

use bigdecimal::BigDecimal;
use proptest::prelude::*;
use std::str::FromStr;
use trip_ledger::{
    derive_commission, derive_driver_balance, derive_gross_amount, derive_hire_value,
    derive_net_driver_keeps, display_balance, normalize_payment_mode, ConsignorBilling,
    DerivedSnapshot, DriverCosting, FormAmount, OtherExpense, NEFT_MODE,
};

// PROPERTY TEST STRATEGIES

/// Rupee amounts with paise, up to ten lakh
fn amount_strategy() -> impl Strategy<Value = BigDecimal> {
    (0i64..=100_000_000).prop_map(|paise| {
        BigDecimal::from(paise) * BigDecimal::from_str("0.01").unwrap()
    })
}

/// Weights in tons with up to three decimals
fn weight_strategy() -> impl Strategy<Value = BigDecimal> {
    (0i64..=60_000).prop_map(|kg| BigDecimal::from(kg) * BigDecimal::from_str("0.001").unwrap())
}

fn costing_strategy() -> impl Strategy<Value = DriverCosting> {
    (
        weight_strategy(),
        amount_strategy(),
        amount_strategy(),
        amount_strategy(),
        prop::collection::vec(amount_strategy(), 0..4),
        amount_strategy(),
        amount_strategy(),
        amount_strategy(),
    )
        .prop_map(
            |(weight, rate, loading_commission, advance, expenses, paid, to_pay, to_pay_commission)| {
                let mut costing = DriverCosting {
                    loaded_weight: weight,
                    driver_rate_per_ton: rate,
                    loading_commission,
                    driver_advance: advance,
                    other_expenses: expenses
                        .into_iter()
                        .map(|amount| OtherExpense {
                            expense_type: "TOLL".into(),
                            custom_name: None,
                            amount,
                        })
                        .collect(),
                    driver_balance_paid: paid,
                    ..DriverCosting::default()
                };
                costing.to_pay.to_pay_amount = to_pay;
                costing.to_pay.to_pay_commission = to_pay_commission;
                costing
            },
        )
}

fn billing_strategy() -> impl Strategy<Value = ConsignorBilling> {
    (
        weight_strategy(),
        amount_strategy(),
        amount_strategy(),
        (amount_strategy(), amount_strategy(), amount_strategy()),
        amount_strategy(),
        amount_strategy(),
        amount_strategy(),
    )
        .prop_map(
            |(weight, rate, round_off, (lm, um, pm), tds, advance, received)| ConsignorBilling {
                billed_weight: weight,
                consignor_rate_per_ton: rate,
                round_off,
                loading_mamul: lm,
                unloading_mamul: um,
                payment_mamul: pm,
                tds,
                consignor_advance: advance,
                consignor_balance_received: received,
                ..ConsignorBilling::default()
            },
        )
}

// PROPERTY TESTS
proptest! {
    /// The same raw inputs always produce the same snapshot
    #[test]
    fn prop_derivation_is_deterministic(costing in costing_strategy(), billing in billing_strategy()) {
        let first = DerivedSnapshot::derive(&costing, &billing);
        let second = DerivedSnapshot::derive(&costing.clone(), &billing.clone());
        prop_assert_eq!(first, second);
    }

    /// Raising any mamul or TDS lowers gross by exactly the increase
    #[test]
    fn prop_deductions_reduce_gross_exactly(
        billing in billing_strategy(),
        increase in amount_strategy(),
        field in 0usize..4,
    ) {
        let gross = |b: &ConsignorBilling| derive_gross_amount(
            &b.billed_weight,
            &b.consignor_rate_per_ton,
            &b.round_off,
            &b.loading_mamul,
            &b.unloading_mamul,
            &b.payment_mamul,
            &b.tds,
        );

        let mut raised = billing.clone();
        let target = match field {
            0 => &mut raised.loading_mamul,
            1 => &mut raised.unloading_mamul,
            2 => &mut raised.payment_mamul,
            _ => &mut raised.tds,
        };
        *target += &increase;

        prop_assert_eq!(gross(&raised), gross(&billing) - &increase);
    }

    /// Commission is gross minus hire and is never clamped
    #[test]
    fn prop_commission_is_plain_difference(costing in costing_strategy(), billing in billing_strategy()) {
        let snapshot = DerivedSnapshot::derive(&costing, &billing);
        let hire = derive_hire_value(
            &costing.loaded_weight,
            &costing.driver_rate_per_ton,
            &costing.loading_commission,
        );
        prop_assert_eq!(&snapshot.hire_value, &hire);
        prop_assert_eq!(
            snapshot.commission,
            derive_commission(&snapshot.gross_amount, &hire)
        );
    }

    /// What the driver keeps on a to-pay trip is never negative
    #[test]
    fn prop_net_driver_keeps_is_floored(to_pay in amount_strategy(), commission in amount_strategy()) {
        let keeps = derive_net_driver_keeps(&to_pay, &commission);
        prop_assert!(keeps >= BigDecimal::from(0));
        if to_pay >= commission {
            prop_assert_eq!(keeps, &to_pay - &commission);
        }
    }

    /// Stored driver balance keeps its sign; only the display is clamped
    #[test]
    fn prop_driver_balance_clamped_only_for_display(costing in costing_strategy()) {
        let hire = derive_hire_value(
            &costing.loaded_weight,
            &costing.driver_rate_per_ton,
            &costing.loading_commission,
        );
        let raw = derive_driver_balance(
            &hire,
            &costing.driver_advance,
            &costing.other_expenses_total(),
            &costing.driver_balance_paid,
            &costing.to_pay.to_pay_amount,
        );
        let shown = display_balance(&raw);

        prop_assert!(shown >= BigDecimal::from(0));
        if raw >= BigDecimal::from(0) {
            prop_assert_eq!(shown, raw);
        } else {
            prop_assert_eq!(shown, BigDecimal::from(0));
        }
    }

    /// Any text typed into a money field deserializes, falling back to zero
    #[test]
    fn prop_form_amount_never_rejects_input(raw in ".{0,24}") {
        let parsed: Result<FormAmount, _> = serde_json::from_value(serde_json::Value::String(raw));
        prop_assert!(parsed.is_ok());
    }

    /// A configured account code always routes to NEFT, whatever its case
    #[test]
    fn prop_account_codes_route_to_neft(code in "[A-Z]{3,5}[0-9]", lower in any::<bool>()) {
        let typed = if lower { code.to_lowercase() } else { code.clone() };
        let routed = normalize_payment_mode(Some(typed.as_str()), None, &[code.as_str()]);
        prop_assert_eq!(routed.mode.as_deref(), Some(NEFT_MODE));
        prop_assert_eq!(routed.account, Some(code));
    }
}
