//! Pure trip money formulas
//!
//! Deductions and additions are applied in a fixed order. None of these
//! clamp their result; clamping is a display concern handled by
//! [`display_balance`].

use bigdecimal::BigDecimal;

/// Hire value owed to the lorry: `loaded weight x rate - loading commission`.
///
/// Negative results are returned as-is; they indicate a data entry mistake
/// for the caller to surface.
pub fn derive_hire_value(
    loaded_weight: &BigDecimal,
    rate_per_ton: &BigDecimal,
    loading_commission: &BigDecimal,
) -> BigDecimal {
    loaded_weight * rate_per_ton - loading_commission
}

/// Consignor gross amount.
///
/// Mamuls and TDS are deductions even though they are entered on the
/// billing side.
pub fn derive_gross_amount(
    billed_weight: &BigDecimal,
    rate_per_ton: &BigDecimal,
    round_off: &BigDecimal,
    loading_mamul: &BigDecimal,
    unloading_mamul: &BigDecimal,
    payment_mamul: &BigDecimal,
    tds: &BigDecimal,
) -> BigDecimal {
    let additive = billed_weight * rate_per_ton + round_off;
    additive - loading_mamul - unloading_mamul - payment_mamul - tds
}

/// Expected commission on a trip. May be negative for a loss-making trip.
pub fn derive_commission(gross_amount: &BigDecimal, hire_value: &BigDecimal) -> BigDecimal {
    gross_amount - hire_value
}

/// Signed balance the operator still owes the driver.
///
/// To-pay freight is deducted because the consignor already handed it to
/// the driver directly.
pub fn derive_driver_balance(
    hire_value: &BigDecimal,
    advance: &BigDecimal,
    other_expenses_total: &BigDecimal,
    balance_paid: &BigDecimal,
    to_pay_amount: &BigDecimal,
) -> BigDecimal {
    hire_value - advance - other_expenses_total - balance_paid - to_pay_amount
}

/// Signed balance still receivable from the consignor.
///
/// Round off and TDS are applied again here on top of the gross amount;
/// this is the canonical receivable formula for both preview and storage.
pub fn derive_consignor_balance(
    gross_amount: &BigDecimal,
    advance: &BigDecimal,
    balance_received: &BigDecimal,
    round_off: &BigDecimal,
    tds: &BigDecimal,
) -> BigDecimal {
    gross_amount - advance - balance_received + round_off - tds
}

/// What the driver keeps out of to-pay freight after the operator's commission
pub fn derive_net_driver_keeps(to_pay_amount: &BigDecimal, to_pay_commission: &BigDecimal) -> BigDecimal {
    (to_pay_amount - to_pay_commission).max(BigDecimal::from(0))
}

/// Clamp a signed balance for display; storage keeps the signed value
pub fn display_balance(balance: &BigDecimal) -> BigDecimal {
    balance.clone().max(BigDecimal::from(0))
}
