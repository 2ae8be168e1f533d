//! Lenient numeric input coercion

use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::str::FromStr;

/// Parse a raw numeric string, treating blanks and garbage as zero
pub fn parse_amount(raw: &str) -> BigDecimal {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return BigDecimal::from(0);
    }
    BigDecimal::from_str(&cleaned).unwrap_or_else(|_| BigDecimal::from(0))
}

/// Coerce the raw JSON text of one form value to an amount.
///
/// Numbers are read from their literal text, so values outside the `f64`
/// range keep their exact value instead of failing to parse.
pub fn coerce_amount(raw: &str) -> BigDecimal {
    let raw = raw.trim();
    match raw.as_bytes().first() {
        Some(b'"') => serde_json::from_str::<String>(raw)
            .map(|s| parse_amount(&s))
            .unwrap_or_else(|_| BigDecimal::from(0)),
        Some(b'-' | b'0'..=b'9') => parse_amount(raw),
        _ => BigDecimal::from(0),
    }
}

/// A monetary form field that never fails to deserialize.
///
/// Missing fields default to zero through `#[serde(default)]` on the
/// containing form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormAmount(pub BigDecimal);

impl FormAmount {
    pub fn value(&self) -> &BigDecimal {
        &self.0
    }

    pub fn into_inner(self) -> BigDecimal {
        self.0
    }
}

impl From<BigDecimal> for FormAmount {
    fn from(value: BigDecimal) -> Self {
        FormAmount(value)
    }
}

impl From<i64> for FormAmount {
    fn from(value: i64) -> Self {
        FormAmount(BigDecimal::from(value))
    }
}

impl From<i32> for FormAmount {
    fn from(value: i32) -> Self {
        FormAmount(BigDecimal::from(value))
    }
}

impl From<&str> for FormAmount {
    fn from(value: &str) -> Self {
        FormAmount(parse_amount(value))
    }
}

impl<'de> Deserialize<'de> for FormAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Ok(FormAmount(coerce_amount(raw.get())))
    }
}

impl Serialize for FormAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("2500"), BigDecimal::from(2500));
        assert_eq!(parse_amount(" 1,25,000 "), BigDecimal::from(125000));
        assert_eq!(parse_amount("12.5"), BigDecimal::from_str("12.5").unwrap());
        assert_eq!(parse_amount(""), BigDecimal::from(0));
        assert_eq!(parse_amount("abc"), BigDecimal::from(0));
    }

    #[test]
    fn test_coerce_json_values() {
        assert_eq!(coerce_amount("10"), BigDecimal::from(10));
        assert_eq!(coerce_amount("-7.25"), BigDecimal::from_str("-7.25").unwrap());
        assert_eq!(coerce_amount(r#""300""#), BigDecimal::from(300));
        assert_eq!(coerce_amount(r#"" 1,500 ""#), BigDecimal::from(1500));
        assert_eq!(coerce_amount("null"), BigDecimal::from(0));
        assert_eq!(coerce_amount("true"), BigDecimal::from(0));
        assert_eq!(coerce_amount(r#"{"a": 1}"#), BigDecimal::from(0));
        assert_eq!(coerce_amount("[1, 2]"), BigDecimal::from(0));
    }

    #[test]
    fn test_out_of_range_numbers_still_parse() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default)]
            tds: FormAmount,
            #[serde(default)]
            round_off: FormAmount,
        }

        let row: Row = serde_json::from_str(r#"{"tds": 1e400, "round_off": -1e400}"#).unwrap();
        assert_eq!(row.tds.0, BigDecimal::from_str("1e400").unwrap());
        assert_eq!(row.round_off.0, BigDecimal::from_str("-1e400").unwrap());

        let row: Row = serde_json::from_str(r#"{"tds": 1e99999999999999999999}"#).unwrap();
        assert_eq!(row.tds.0, BigDecimal::from(0));
    }

    #[test]
    fn test_form_amount_deserializes_garbage_as_zero() {
        #[derive(Deserialize)]
        struct AmountRow {
            #[serde(default)]
            a: FormAmount,
            #[serde(default)]
            b: FormAmount,
            #[serde(default)]
            c: FormAmount,
        }

        let row: AmountRow = serde_json::from_value(json!({"a": "n/a", "b": "45.5"})).unwrap();
        assert_eq!(row.a.0, BigDecimal::from(0));
        assert_eq!(row.b.0, BigDecimal::from_str("45.5").unwrap());
        assert_eq!(row.c.0, BigDecimal::from(0));
    }
}
