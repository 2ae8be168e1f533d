//! Core types and data structures for the trip ledger

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of trip, which decides how strictly the lifecycle is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripKind {
    /// Passenger trip driven through the driver app
    Taxi,
    /// Lorry hire trip managed from the office
    #[default]
    Logistics,
}

/// Operational status of a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    /// Placeholder for an available lorry not yet matched to a trip
    Draft,
    Pending,
    Assigned,
    Accepted,
    Started,
    Loading,
    InTransit,
    Unloaded,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// Completed and cancelled trips take no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// Statuses in which the assigned driver is occupied by the trip
    pub fn is_driver_engaged(&self) -> bool {
        matches!(
            self,
            TripStatus::Assigned
                | TripStatus::Accepted
                | TripStatus::Started
                | TripStatus::Loading
                | TripStatus::InTransit
                | TripStatus::Unloaded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Draft => "DRAFT",
            TripStatus::Pending => "PENDING",
            TripStatus::Assigned => "ASSIGNED",
            TripStatus::Accepted => "ACCEPTED",
            TripStatus::Started => "STARTED",
            TripStatus::Loading => "LOADING",
            TripStatus::InTransit => "IN_TRANSIT",
            TripStatus::Unloaded => "UNLOADED",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of a driver/vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Online,
    #[default]
    Offline,
    Busy,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverStatus::Online => "ONLINE",
            DriverStatus::Offline => "OFFLINE",
            DriverStatus::Busy => "BUSY",
        };
        f.write_str(s)
    }
}

/// Settlement state of the money owed to the driver on a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverBalanceStatus {
    /// Operator still owes the driver
    #[default]
    Pending,
    /// Nothing owed either way
    Settled,
    /// Driver was paid more than the hire value and owes money back
    Overpaid,
}

/// Proof of delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PodStatus {
    #[default]
    Pending,
    Received,
}

/// Recovery state of a hand loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandLoanStatus {
    #[default]
    Pending,
    PartiallyRecovered,
    Recovered,
}

/// Bank details used for NEFT payouts
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BankDetails {
    pub account_holder: Option<String>,
    pub account_number: Option<String>,
    pub ifsc: Option<String>,
    pub bank_name: Option<String>,
    pub upi_id: Option<String>,
}

/// A geographic position reported by the driver app
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Vehicle snapshot captured on a trip when no registered driver is used
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdHocVehicle {
    pub lorry_name: Option<String>,
    pub owner_name: Option<String>,
    pub owner_phone: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub bank: Option<BankDetails>,
}

impl AdHocVehicle {
    /// Whether a lorry has actually been named
    pub fn has_lorry(&self) -> bool {
        self.lorry_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }
}

/// One itemised driver-side expense (toll, diesel, etc.)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OtherExpense {
    pub expense_type: String,
    pub custom_name: Option<String>,
    pub amount: BigDecimal,
}

/// To-pay arrangement: consignor pays the driver directly at delivery
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToPay {
    pub to_pay_amount: BigDecimal,
    pub to_pay_commission: BigDecimal,
    pub to_pay_pending_commission: BigDecimal,
    pub to_pay_date: Option<NaiveDate>,
}

impl ToPay {
    pub fn is_active(&self) -> bool {
        self.to_pay_amount > BigDecimal::from(0)
    }
}

/// Driver-side money ("costing")
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriverCosting {
    pub loaded_weight: BigDecimal,
    pub driver_rate_per_ton: BigDecimal,
    pub loading_commission: BigDecimal,
    /// Derived: loaded weight x rate - loading commission
    pub hire_value: BigDecimal,
    pub driver_advance: BigDecimal,
    pub driver_advance_payment_mode: Option<String>,
    pub driver_advance_account: Option<String>,
    pub loading_charge: BigDecimal,
    pub unloading_charge: BigDecimal,
    pub other_expenses: Vec<OtherExpense>,
    pub driver_balance_paid: BigDecimal,
    pub driver_balance_paid_date: Option<NaiveDate>,
    pub driver_balance_payment_mode: Option<String>,
    pub driver_balance_account: Option<String>,
    pub pod_status: PodStatus,
    pub pod_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub to_pay: ToPay,
}

impl DriverCosting {
    pub fn other_expenses_total(&self) -> BigDecimal {
        self.other_expenses.iter().map(|e| &e.amount).sum()
    }
}

/// Consignor-side money ("billing")
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsignorBilling {
    pub billed_weight: BigDecimal,
    pub consignor_rate_per_ton: BigDecimal,
    pub round_off: BigDecimal,
    pub loading_mamul: BigDecimal,
    pub unloading_mamul: BigDecimal,
    pub payment_mamul: BigDecimal,
    pub tds: BigDecimal,
    /// Derived: billed weight x rate + round off - mamuls - TDS
    pub gross_amount: BigDecimal,
    pub consignor_advance: BigDecimal,
    pub consignor_advance_payment_mode: Option<String>,
    pub consignor_advance_account: Option<String>,
    pub consignor_balance_received: BigDecimal,
    pub consignor_balance_received_date: Option<NaiveDate>,
    pub consignor_balance_payment_mode: Option<String>,
    pub consignor_balance_account: Option<String>,
}

/// Balance snapshot derived at persistence time
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TripBalances {
    /// Expected commission: gross amount - hire value, may be negative
    pub commission: BigDecimal,
    /// Signed; negative means the driver was overpaid
    pub balance_payable_to_driver: BigDecimal,
    pub balance_receivable: BigDecimal,
    /// To-pay freight left with the driver after commission, floored at zero
    pub net_driver_keeps: BigDecimal,
    pub driver_balance_status: DriverBalanceStatus,
}

/// Cash advanced to the driver against this particular trip
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TripHandLoan {
    pub amount: BigDecimal,
    pub paid_date: Option<NaiveDate>,
    pub payment_mode: Option<String>,
    pub account: Option<String>,
    pub remarks: Option<String>,
}

/// Metrics captured when a taxi trip completes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionMetrics {
    pub total_distance_km: Option<BigDecimal>,
    pub total_hours: Option<BigDecimal>,
}

/// Audit record of an edit made after the trip reached a terminal status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    pub amended_at: NaiveDateTime,
    pub actor_id: String,
    pub reason: String,
    pub previous_version: u64,
}

/// The trip aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub organization_id: String,
    pub kind: TripKind,
    pub status: TripStatus,
    /// Monotonic version used for optimistic concurrency
    pub version: u64,
    pub trip_date: NaiveDate,
    pub loading_date: Option<NaiveDate>,
    pub loading_location: Option<String>,
    pub unloading_location: Option<String>,
    pub consignment_item: Option<String>,
    pub consignor_id: Option<String>,
    pub consignor_name: Option<String>,
    pub consignor_mobile: Option<String>,
    pub driver_id: Option<String>,
    pub vehicle: Option<AdHocVehicle>,
    #[serde(flatten)]
    pub costing: DriverCosting,
    #[serde(flatten)]
    pub billing: ConsignorBilling,
    #[serde(flatten)]
    pub balances: TripBalances,
    pub hand_loan: Option<TripHandLoan>,
    pub completion: Option<CompletionMetrics>,
    pub amendments: Vec<Amendment>,
    /// Set when the commission section was hidden for the reader's role
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub profit_redacted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Trip {
    /// Create an empty trip shell; money fields start at zero
    pub fn new(id: String, organization_id: String, kind: TripKind, trip_date: NaiveDate) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            organization_id,
            kind,
            status: TripStatus::Pending,
            version: 0,
            trip_date,
            loading_date: None,
            loading_location: None,
            unloading_location: None,
            consignment_item: None,
            consignor_id: None,
            consignor_name: None,
            consignor_mobile: None,
            driver_id: None,
            vehicle: None,
            costing: DriverCosting::default(),
            billing: ConsignorBilling::default(),
            balances: TripBalances::default(),
            hand_loan: None,
            completion: None,
            amendments: Vec::new(),
            profit_redacted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_to_pay(&self) -> bool {
        self.costing.to_pay.is_active()
    }

    /// A registered driver or a named ad-hoc lorry is attached
    pub fn has_vehicle_data(&self) -> bool {
        self.driver_id.is_some() || self.vehicle.as_ref().is_some_and(AdHocVehicle::has_lorry)
    }

    /// Driver currently held by this trip, if the status keeps them busy
    pub fn engaged_driver(&self) -> Option<&str> {
        if self.status.is_driver_engaged() {
            self.driver_id.as_deref()
        } else {
            None
        }
    }
}

/// Preset route for a consignor, used to pre-fill the billing rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePreset {
    pub from: String,
    pub to: String,
    pub rate_per_ton: BigDecimal,
}

/// A party that ships goods and is billed for freight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consignor {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    pub default_routes: Vec<RoutePreset>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Consignor {
    pub fn new(id: String, organization_id: String, name: String) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            organization_id,
            name,
            contact_person: None,
            phone: None,
            email: None,
            address: None,
            gstin: None,
            default_routes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rate of the preset matching a loading/unloading pair, compared case-insensitively
    pub fn route_rate(&self, from: &str, to: &str) -> Option<&BigDecimal> {
        let from = from.trim();
        let to = to.trim();
        self.default_routes
            .iter()
            .find(|r| r.from.trim().eq_ignore_ascii_case(from) && r.to.trim().eq_ignore_ascii_case(to))
            .map(|r| &r.rate_per_ton)
    }
}

/// Owner of a lorry when the driver is not the owner
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwnerDetails {
    pub owner_name: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_bank: Option<BankDetails>,
}

/// A registered driver together with the vehicle they operate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    /// Normalized to the last ten digits
    pub phone: String,
    /// Upper-cased with whitespace removed
    pub vehicle_number: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_category: Option<String>,
    pub status: DriverStatus,
    pub current_location: Option<GeoPoint>,
    pub primary_bank: Option<BankDetails>,
    pub secondary_bank: Option<BankDetails>,
    pub owner: Option<OwnerDetails>,
    pub rating: Option<BigDecimal>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Driver {
    pub fn new(id: String, organization_id: String, name: String, phone: String) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            organization_id,
            name,
            phone,
            vehicle_number: None,
            vehicle_model: None,
            vehicle_category: None,
            status: DriverStatus::Offline,
            current_location: None,
            primary_bank: None,
            secondary_bank: None,
            owner: None,
            rating: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial repayment of a hand loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recovery {
    pub amount: BigDecimal,
    pub date: NaiveDate,
}

/// Cash advanced to a driver outside any trip's costing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandLoan {
    pub id: String,
    pub organization_id: String,
    pub driver_id: String,
    pub amount: BigDecimal,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub status: HandLoanStatus,
    pub recoveries: Vec<Recovery>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl HandLoan {
    pub fn new(
        id: String,
        organization_id: String,
        driver_id: String,
        amount: BigDecimal,
        date: NaiveDate,
        reason: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            organization_id,
            driver_id,
            amount,
            date,
            reason,
            status: HandLoanStatus::Pending,
            recoveries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn recovered(&self) -> BigDecimal {
        self.recoveries.iter().map(|r| &r.amount).sum()
    }

    /// Amount still owed, floored at zero so over-recovery never reads as negative
    pub fn outstanding(&self) -> BigDecimal {
        (&self.amount - self.recovered()).max(BigDecimal::from(0))
    }

    /// Status recomputed from the recoveries rather than trusted from storage
    pub fn derived_status(&self) -> HandLoanStatus {
        let recovered = self.recovered();
        if recovered >= self.amount && recovered > BigDecimal::from(0) {
            HandLoanStatus::Recovered
        } else if recovered > BigDecimal::from(0) {
            HandLoanStatus::PartiallyRecovered
        } else {
            HandLoanStatus::Pending
        }
    }

    /// Append a recovery and refresh the stored status
    pub fn apply_recovery(&mut self, amount: BigDecimal, date: NaiveDate) {
        self.recoveries.push(Recovery { amount, date });
        self.status = self.derived_status();
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Errors that can occur in the trip ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("Trip not found: {0}")]
    TripNotFound(String),
    #[error("Consignor not found: {0}")]
    ConsignorNotFound(String),
    #[error("Driver not found: {0}")]
    DriverNotFound(String),
    #[error("Hand loan not found: {0}")]
    HandLoanNotFound(String),
    #[error("Duplicate {entity}: {field} '{value}' already exists")]
    Duplicate {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Trip {trip_id} was modified concurrently: expected version {expected}, found {actual}")]
    Conflict {
        trip_id: String,
        expected: u64,
        actual: u64,
    },
    #[error("Illegal status transition from {from} to {to}")]
    InvalidTransition { from: TripStatus, to: TripStatus },
    #[error("Trip {trip_id} is {status}; reassign or cancel it before deleting")]
    DeletionBlocked { trip_id: String, status: TripStatus },
    #[error("Trip {trip_id} is {status}; use an amendment to change it")]
    TripLocked { trip_id: String, status: TripStatus },
    #[error("Organization scope mismatch: request is for '{expected}', entity belongs to '{actual}'")]
    ScopeViolation { expected: String, actual: String },
    #[error("Role {role} may not modify {field}")]
    Forbidden { role: String, field: String },
    #[error("Invalid report query: {0}")]
    InvalidReportQuery(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stale-write conflicts can be retried after re-fetching; nothing else can
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. })
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_hand_loan_over_recovery_floors_outstanding() {
        let mut loan = HandLoan::new(
            "hl1".to_string(),
            "org1".to_string(),
            "d1".to_string(),
            BigDecimal::from(2000),
            date(2024, 3, 1),
            None,
        );
        loan.apply_recovery(BigDecimal::from(1500), date(2024, 3, 10));
        assert_eq!(loan.status, HandLoanStatus::PartiallyRecovered);
        assert_eq!(loan.outstanding(), BigDecimal::from(500));

        loan.apply_recovery(BigDecimal::from(1000), date(2024, 3, 20));
        assert_eq!(loan.recovered(), BigDecimal::from(2500));
        assert_eq!(loan.outstanding(), BigDecimal::from(0));
        assert_eq!(loan.status, HandLoanStatus::Recovered);
    }

    #[test]
    fn test_derived_status_ignores_drifted_stored_status() {
        let mut loan = HandLoan::new(
            "hl1".to_string(),
            "org1".to_string(),
            "d1".to_string(),
            BigDecimal::from(1000),
            date(2024, 3, 1),
            None,
        );
        loan.status = HandLoanStatus::Recovered;
        assert_eq!(loan.derived_status(), HandLoanStatus::Pending);
        assert_eq!(loan.outstanding(), BigDecimal::from(1000));
    }

    #[test]
    fn test_trip_status_classification() {
        assert!(TripStatus::Completed.is_terminal());
        assert!(TripStatus::Cancelled.is_terminal());
        assert!(!TripStatus::Draft.is_terminal());
        assert!(TripStatus::InTransit.is_driver_engaged());
        assert!(!TripStatus::Pending.is_driver_engaged());
        assert_eq!(TripStatus::InTransit.to_string(), "IN_TRANSIT");
    }

    #[test]
    fn test_route_rate_lookup_is_case_insensitive() {
        let mut consignor = Consignor::new("c1".into(), "org1".into(), "ABC Traders".into());
        consignor.default_routes.push(RoutePreset {
            from: "Salem".into(),
            to: "Chennai".into(),
            rate_per_ton: BigDecimal::from(1800),
        });
        assert_eq!(
            consignor.route_rate(" salem", "CHENNAI"),
            Some(&BigDecimal::from(1800))
        );
        assert!(consignor.route_rate("Salem", "Madurai").is_none());
    }

    #[test]
    fn test_trip_serializes_with_side_prefixes() {
        let trip = Trip::new("t1".into(), "org1".into(), TripKind::Logistics, date(2024, 1, 1));
        let value = serde_json::to_value(&trip).unwrap();
        assert!(value.get("driver_advance").is_some());
        assert!(value.get("consignor_advance").is_some());
        assert!(value.get("to_pay_amount").is_some());
        assert!(value.get("profit_redacted").is_none());
    }
}
