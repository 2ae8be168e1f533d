//! Validation and normalization utilities

use bigdecimal::BigDecimal;

use crate::types::*;

/// Comparison key for consignor names: lower-cased, whitespace collapsed
pub fn consignor_name_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep only the last ten digits of a phone number
pub fn normalize_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let start = digits.len().saturating_sub(10);
    digits[start..].iter().collect()
}

/// Upper-case a vehicle registration and drop whitespace
pub fn normalize_vehicle_number(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Validate that a display name is present and of sane length
pub fn validate_name(field: &str, name: &str) -> LedgerResult<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::validation(field, "cannot be empty"));
    }

    if name.len() > 100 {
        return Err(LedgerError::validation(
            field,
            "cannot exceed 100 characters",
        ));
    }

    Ok(())
}

/// Validate an Indian GSTIN: 15 alphanumeric characters when present
pub fn validate_gstin(gstin: &str) -> LedgerResult<()> {
    let gstin = gstin.trim();
    if gstin.is_empty() {
        return Ok(());
    }

    if gstin.len() != 15 || !gstin.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LedgerError::validation(
            "gstin",
            "must be 15 alphanumeric characters",
        ));
    }

    Ok(())
}

/// Validate that a weight or rate input is not negative
pub fn validate_non_negative(field: &str, amount: &BigDecimal) -> LedgerResult<()> {
    if *amount < BigDecimal::from(0) {
        Err(LedgerError::validation(field, "cannot be negative"))
    } else {
        Ok(())
    }
}

/// Validate that an amount is positive
pub fn validate_positive_amount(field: &str, amount: &BigDecimal) -> LedgerResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(LedgerError::validation(field, "must be positive"))
    } else {
        Ok(())
    }
}

/// Trim an optional text field, dropping it when blank
pub fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consignor_name_key_collapses_case_and_spaces() {
        assert_eq!(consignor_name_key("ABC  Traders"), "abc traders");
        assert_eq!(consignor_name_key(" abc   traders "), "abc traders");
        assert_ne!(consignor_name_key("ABC Traders"), consignor_name_key("ABC Trader"));
    }

    #[test]
    fn test_normalize_phone_keeps_last_ten_digits() {
        assert_eq!(normalize_phone("+91 98400-12345"), "9840012345");
        assert_eq!(normalize_phone("09840012345"), "9840012345");
        assert_eq!(normalize_phone("12345"), "12345");
    }

    #[test]
    fn test_normalize_vehicle_number() {
        assert_eq!(normalize_vehicle_number("tn 38 ab 1234"), "TN38AB1234");
    }

    #[test]
    fn test_gstin() {
        assert!(validate_gstin("33AAAAA0000A1Z5").is_ok());
        assert!(validate_gstin("").is_ok());
        assert!(validate_gstin("33AAAA").is_err());
    }

    #[test]
    fn test_amount_checks() {
        assert!(validate_non_negative("loaded_weight", &BigDecimal::from(0)).is_ok());
        assert!(validate_non_negative("loaded_weight", &BigDecimal::from(-1)).is_err());
        assert!(validate_positive_amount("amount", &BigDecimal::from(0)).is_err());
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text(Some("  Salem ".into())), Some("Salem".into()));
        assert_eq!(clean_text(Some("   ".into())), None);
    }
}
