//! Ledger configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{LedgerError, LedgerResult};

/// Ledger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Settings keyed by organization id
    pub organizations: HashMap<String, OrganizationSettings>,
    /// Account codes used when an organization has none configured
    pub default_account_codes: Vec<String>,
    pub aging: AgingConfig,
    pub reports: ReportLimits,
}

/// Per-organization settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationSettings {
    /// Bank-account short codes accepted as payment modes
    pub bank_account_codes: Vec<String>,
    pub slip: SlipPreferences,
}

/// Presentation preferences handed to the slip generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipPreferences {
    pub header_text: Option<String>,
    pub phone_lines: Vec<String>,
    pub slogan: Option<String>,
}

/// Aging bucket bounds in days since the trip date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgingConfig {
    /// Last day of the first bucket
    pub current_max_days: i64,
    /// Last day of the middle bucket; anything later is overdue
    pub middle_max_days: i64,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            current_max_days: 30,
            middle_max_days: 45,
        }
    }
}

/// Bounds on report aggregation cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportLimits {
    pub max_range_days: i64,
    pub max_trips: usize,
}

impl Default for ReportLimits {
    fn default() -> Self {
        Self {
            max_range_days: 366,
            max_trips: 10_000,
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(raw: &str) -> LedgerResult<Self> {
        let config: LedgerConfig =
            serde_json::from_str(raw).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LedgerError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.aging.current_max_days < 0 {
            return Err(LedgerError::Config(
                "aging.current_max_days cannot be negative".to_string(),
            ));
        }
        if self.aging.middle_max_days <= self.aging.current_max_days {
            return Err(LedgerError::Config(format!(
                "aging.middle_max_days ({}) must exceed aging.current_max_days ({})",
                self.aging.middle_max_days, self.aging.current_max_days
            )));
        }
        if self.reports.max_range_days <= 0 {
            return Err(LedgerError::Config(
                "reports.max_range_days must be positive".to_string(),
            ));
        }
        if self.reports.max_trips == 0 {
            return Err(LedgerError::Config(
                "reports.max_trips must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Account codes that payment modes are routed against for an organization
    pub fn account_codes(&self, organization_id: &str) -> &[String] {
        match self.organizations.get(organization_id) {
            Some(settings) if !settings.bank_account_codes.is_empty() => {
                &settings.bank_account_codes
            }
            _ => &self.default_account_codes,
        }
    }

    pub fn slip_preferences(&self, organization_id: &str) -> SlipPreferences {
        self.organizations
            .get(organization_id)
            .map(|s| s.slip.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.aging.current_max_days, 30);
        assert_eq!(config.aging.middle_max_days, 45);
    }

    #[test]
    fn test_from_json_with_organization_codes() {
        let config = LedgerConfig::from_json_str(
            r#"{
                "default_account_codes": ["MAIN"],
                "organizations": {
                    "org1": {
                        "bank_account_codes": ["HDFC1", "SBI2"],
                        "slip": { "header_text": "Sri Murugan Lorry Service", "phone_lines": ["98400 00000"] }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.account_codes("org1"), ["HDFC1", "SBI2"]);
        assert_eq!(config.account_codes("org2"), ["MAIN"]);
        assert_eq!(
            config.slip_preferences("org1").header_text.as_deref(),
            Some("Sri Murugan Lorry Service")
        );
        assert_eq!(config.reports.max_trips, 10_000);
    }

    #[test]
    fn test_rejects_inverted_aging_bounds() {
        let err = LedgerConfig::from_json_str(r#"{ "aging": { "current_max_days": 45, "middle_max_days": 30 } }"#)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            LedgerConfig::from_json_str("{ not json"),
            Err(LedgerError::Config(_))
        ));
    }
}
