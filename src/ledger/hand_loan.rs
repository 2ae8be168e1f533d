//! Hand loan subledger

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::scope::RequestScope;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{clean_text, validate_positive_amount};

/// Everything a driver currently owes the operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverExposure {
    pub driver_id: String,
    /// Outstanding across subledger loans, each floored at zero
    pub hand_loan_outstanding: BigDecimal,
    /// Trip-scoped hand loans on the driver's trips
    pub trip_hand_loans: BigDecimal,
    /// Overpayments on trips, as a positive amount the driver owes back
    pub overpaid_trip_balance: BigDecimal,
    pub total: BigDecimal,
}

/// Hand loan manager
pub struct HandLoanManager<S: LedgerStorage> {
    pub(crate) storage: S,
}

impl<S: LedgerStorage> HandLoanManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Issue a new PENDING loan to a registered driver
    pub async fn issue_loan(
        &mut self,
        scope: &RequestScope,
        driver_id: &str,
        amount: BigDecimal,
        date: NaiveDate,
        reason: Option<String>,
    ) -> LedgerResult<HandLoan> {
        scope.require_office("hand loans")?;
        validate_positive_amount("amount", &amount)?;

        let driver = self
            .storage
            .get_driver(&scope.organization_id, driver_id)
            .await?
            .ok_or_else(|| LedgerError::DriverNotFound(driver_id.to_string()))?;
        scope.ensure_owns(&driver.organization_id)?;

        let loan = HandLoan::new(
            uuid::Uuid::new_v4().to_string(),
            scope.organization_id.clone(),
            driver.id,
            amount,
            date,
            clean_text(reason),
        );
        self.storage.save_hand_loan(&loan).await?;

        info!(
            loan_id = %loan.id,
            driver_id = %loan.driver_id,
            amount = %loan.amount,
            "Hand loan issued"
        );
        Ok(loan)
    }

    /// Record a recovery against a loan.
    ///
    /// The amount is not checked against what is outstanding; collections
    /// are never blocked and over-recovery simply floors at zero.
    pub async fn record_recovery(
        &mut self,
        scope: &RequestScope,
        loan_id: &str,
        amount: BigDecimal,
        date: NaiveDate,
    ) -> LedgerResult<HandLoan> {
        scope.require_office("hand loans")?;
        validate_positive_amount("amount", &amount)?;

        let mut loan = self.get_loan_required(scope, loan_id).await?;
        loan.apply_recovery(amount, date);
        self.storage.update_hand_loan(&loan).await?;

        info!(
            loan_id = %loan.id,
            recovered = %loan.recovered(),
            outstanding = %loan.outstanding(),
            status = ?loan.status,
            "Hand loan recovery recorded"
        );
        Ok(loan)
    }

    /// Get a loan by ID
    pub async fn get_loan(&self, scope: &RequestScope, loan_id: &str) -> LedgerResult<Option<HandLoan>> {
        self.storage
            .get_hand_loan(&scope.organization_id, loan_id)
            .await
    }

    /// Get a loan by ID, returning an error if not found
    pub async fn get_loan_required(&self, scope: &RequestScope, loan_id: &str) -> LedgerResult<HandLoan> {
        let loan = self
            .get_loan(scope, loan_id)
            .await?
            .ok_or_else(|| LedgerError::HandLoanNotFound(loan_id.to_string()))?;
        scope.ensure_owns(&loan.organization_id)?;
        Ok(loan)
    }

    /// List loans of the organization
    pub async fn list_loans(&self, scope: &RequestScope, filter: &HandLoanFilter) -> LedgerResult<Vec<HandLoan>> {
        self.storage
            .list_hand_loans(&scope.organization_id, filter)
            .await
    }

    /// Combine loan outstanding, trip-scoped loans and trip overpayments for a driver
    pub async fn driver_exposure(&self, scope: &RequestScope, driver_id: &str) -> LedgerResult<DriverExposure> {
        scope.require_office("driver exposure")?;

        let loans = self
            .storage
            .list_hand_loans(&scope.organization_id, &HandLoanFilter::for_driver(driver_id))
            .await?;
        let trips = self
            .storage
            .list_trips(
                &scope.organization_id,
                &TripFilter {
                    driver_id: Some(driver_id.to_string()),
                    ..TripFilter::default()
                },
            )
            .await?;

        Ok(exposure_of(driver_id, &loans, &trips))
    }
}

/// Pure aggregation behind [`HandLoanManager::driver_exposure`]
pub fn exposure_of(driver_id: &str, loans: &[HandLoan], trips: &[Trip]) -> DriverExposure {
    let zero = BigDecimal::from(0);

    let hand_loan_outstanding: BigDecimal = loans
        .iter()
        .filter(|l| l.driver_id == driver_id)
        .map(HandLoan::outstanding)
        .sum();

    let driver_trips: Vec<&Trip> = trips
        .iter()
        .filter(|t| t.driver_id.as_deref() == Some(driver_id) && t.status != TripStatus::Cancelled)
        .collect();
    let trip_hand_loans: BigDecimal = driver_trips
        .iter()
        .filter_map(|t| t.hand_loan.as_ref())
        .map(|h| &h.amount)
        .sum();
    let overpaid_trip_balance: BigDecimal = driver_trips
        .iter()
        .map(|t| &t.balances.balance_payable_to_driver)
        .filter(|b| **b < zero)
        .map(|b| -b.clone())
        .sum();

    let total = &hand_loan_outstanding + &trip_hand_loans + &overpaid_trip_balance;
    DriverExposure {
        driver_id: driver_id.to_string(),
        hand_loan_outstanding,
        trip_hand_loans,
        overpaid_trip_balance,
        total,
    }
}
