//! Main dispatch ledger that coordinates trips, registry, loans and reports

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::derivation::DerivedSnapshot;
use crate::ledger::{
    ConsignorInput, DriverExposure, DriverInput, HandLoanManager, ImportReport, RegistryManager,
    TransitionRequest, TripForm, TripManager,
};
use crate::reconciliation::{DriverStatusReconciler, ReconciliationQueue, ReconciliationReport};
use crate::reports::*;
use crate::scope::RequestScope;
use crate::slip::TripSlip;
use crate::traits::*;
use crate::types::*;

/// Main ledger system that orchestrates all dispatch and billing operations
pub struct DispatchLedger<S: LedgerStorage> {
    trip_manager: TripManager<S>,
    registry: RegistryManager<S>,
    loan_manager: HandLoanManager<S>,
    reconciler: DriverStatusReconciler<S>,
    storage: S,
    config: Arc<LedgerConfig>,
    queue: ReconciliationQueue,
}

impl<S: LedgerStorage + Clone> DispatchLedger<S> {
    /// Create a new ledger with the given storage backend; driver updates go nowhere
    pub fn new(storage: S, config: LedgerConfig) -> LedgerResult<Self> {
        Self::with_sink(storage, config, Arc::new(NullSink))
    }

    /// Create a new ledger that publishes driver status changes to `sink`
    pub fn with_sink(
        storage: S,
        config: LedgerConfig,
        sink: Arc<dyn LocationSink>,
    ) -> LedgerResult<Self> {
        Self::with_validators(
            storage,
            config,
            sink,
            Box::new(DefaultConsignorValidator),
            Box::new(DefaultDriverValidator),
        )
    }

    /// Create a new ledger with custom registry validators
    pub fn with_validators(
        storage: S,
        config: LedgerConfig,
        sink: Arc<dyn LocationSink>,
        consignor_validator: Box<dyn ConsignorValidator>,
        driver_validator: Box<dyn DriverValidator>,
    ) -> LedgerResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let queue = ReconciliationQueue::new();

        Ok(Self {
            trip_manager: TripManager::new(
                storage.clone(),
                config.clone(),
                sink.clone(),
                queue.clone(),
            ),
            registry: RegistryManager::with_validators(
                storage.clone(),
                sink.clone(),
                consignor_validator,
                driver_validator,
            ),
            loan_manager: HandLoanManager::new(storage.clone()),
            reconciler: DriverStatusReconciler::new(storage.clone(), queue.clone(), sink),
            storage,
            config,
            queue,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Driver status writes still waiting for a reconciliation pass
    pub fn reconciliation_queue(&self) -> &ReconciliationQueue {
        &self.queue
    }

    // Trip operations
    /// Derive a form's money fields without saving anything
    pub fn preview_trip(&self, scope: &RequestScope, form: &TripForm) -> LedgerResult<DerivedSnapshot> {
        self.trip_manager.preview(scope, form)
    }

    /// Create a trip
    pub async fn create_trip(&mut self, scope: &RequestScope, form: &TripForm) -> LedgerResult<Trip> {
        self.trip_manager.create_trip(scope, form).await
    }

    /// Update an open trip from a full form resubmission
    pub async fn update_trip(
        &mut self,
        scope: &RequestScope,
        trip_id: &str,
        form: &TripForm,
    ) -> LedgerResult<Trip> {
        self.trip_manager.update_trip(scope, trip_id, form).await
    }

    /// Correct a completed or cancelled trip
    pub async fn amend_trip(
        &mut self,
        scope: &RequestScope,
        trip_id: &str,
        form: &TripForm,
        reason: &str,
    ) -> LedgerResult<Trip> {
        self.trip_manager
            .amend_trip(scope, trip_id, form, reason)
            .await
    }

    /// Move a trip to another status
    pub async fn transition_trip(
        &mut self,
        scope: &RequestScope,
        trip_id: &str,
        request: TransitionRequest,
    ) -> LedgerResult<Trip> {
        self.trip_manager
            .transition_trip(scope, trip_id, request)
            .await
    }

    /// Delete a trip
    pub async fn delete_trip(&mut self, scope: &RequestScope, trip_id: &str) -> LedgerResult<()> {
        self.trip_manager.delete_trip(scope, trip_id).await
    }

    /// Get a trip by ID
    pub async fn get_trip(&self, scope: &RequestScope, trip_id: &str) -> LedgerResult<Option<Trip>> {
        self.trip_manager.get_trip(scope, trip_id).await
    }

    /// List trips
    pub async fn list_trips(&self, scope: &RequestScope, filter: &TripFilter) -> LedgerResult<Vec<Trip>> {
        self.trip_manager.list_trips(scope, filter).await
    }

    // Registry operations
    pub async fn create_consignor(
        &mut self,
        scope: &RequestScope,
        input: &ConsignorInput,
    ) -> LedgerResult<Consignor> {
        self.registry.create_consignor(scope, input).await
    }

    pub async fn update_consignor(
        &mut self,
        scope: &RequestScope,
        consignor_id: &str,
        input: &ConsignorInput,
    ) -> LedgerResult<Consignor> {
        self.registry
            .update_consignor(scope, consignor_id, input)
            .await
    }

    pub async fn get_consignor(
        &self,
        scope: &RequestScope,
        consignor_id: &str,
    ) -> LedgerResult<Option<Consignor>> {
        self.registry.get_consignor(scope, consignor_id).await
    }

    pub async fn list_consignors(&self, scope: &RequestScope) -> LedgerResult<Vec<Consignor>> {
        self.registry.list_consignors(scope).await
    }

    pub async fn import_consignors(
        &mut self,
        scope: &RequestScope,
        rows: &[ConsignorInput],
    ) -> LedgerResult<ImportReport> {
        self.registry.import_consignors(scope, rows).await
    }

    pub async fn create_driver(&mut self, scope: &RequestScope, input: &DriverInput) -> LedgerResult<Driver> {
        self.registry.create_driver(scope, input).await
    }

    pub async fn update_driver(
        &mut self,
        scope: &RequestScope,
        driver_id: &str,
        input: &DriverInput,
    ) -> LedgerResult<Driver> {
        self.registry.update_driver(scope, driver_id, input).await
    }

    pub async fn get_driver(&self, scope: &RequestScope, driver_id: &str) -> LedgerResult<Option<Driver>> {
        self.registry.get_driver(scope, driver_id).await
    }

    pub async fn list_drivers(
        &self,
        scope: &RequestScope,
        status: Option<DriverStatus>,
    ) -> LedgerResult<Vec<Driver>> {
        self.registry.list_drivers(scope, status).await
    }

    pub async fn import_drivers(
        &mut self,
        scope: &RequestScope,
        rows: &[DriverInput],
    ) -> LedgerResult<ImportReport> {
        self.registry.import_drivers(scope, rows).await
    }

    pub async fn update_driver_location(
        &mut self,
        scope: &RequestScope,
        driver_id: &str,
        lat: f64,
        lng: f64,
    ) -> LedgerResult<Driver> {
        self.registry
            .update_driver_location(scope, driver_id, lat, lng)
            .await
    }

    // Hand loan operations
    pub async fn issue_loan(
        &mut self,
        scope: &RequestScope,
        driver_id: &str,
        amount: BigDecimal,
        date: NaiveDate,
        reason: Option<String>,
    ) -> LedgerResult<HandLoan> {
        self.loan_manager
            .issue_loan(scope, driver_id, amount, date, reason)
            .await
    }

    pub async fn record_recovery(
        &mut self,
        scope: &RequestScope,
        loan_id: &str,
        amount: BigDecimal,
        date: NaiveDate,
    ) -> LedgerResult<HandLoan> {
        self.loan_manager
            .record_recovery(scope, loan_id, amount, date)
            .await
    }

    pub async fn get_loan(&self, scope: &RequestScope, loan_id: &str) -> LedgerResult<Option<HandLoan>> {
        self.loan_manager.get_loan(scope, loan_id).await
    }

    pub async fn list_loans(&self, scope: &RequestScope, filter: &HandLoanFilter) -> LedgerResult<Vec<HandLoan>> {
        self.loan_manager.list_loans(scope, filter).await
    }

    pub async fn driver_exposure(&self, scope: &RequestScope, driver_id: &str) -> LedgerResult<DriverExposure> {
        self.loan_manager.driver_exposure(scope, driver_id).await
    }

    // Reporting operations

    /// Fetch the bounded trip set a report runs over, redacted for the caller
    async fn report_trips(&self, scope: &RequestScope, query: &ReportQuery) -> LedgerResult<Vec<Trip>> {
        scope.require_office("reports")?;
        let limits = &self.config.reports;
        query.validate(limits)?;

        let trips = self
            .storage
            .list_trips(&scope.organization_id, &query.trip_filter(limits))
            .await?;
        query.check_trip_count(trips.len(), limits)?;
        Ok(trips.into_iter().map(|t| scope.redact(t)).collect())
    }

    fn require_profit(scope: &RequestScope) -> LedgerResult<()> {
        if !scope.role.sees_profit() {
            return Err(LedgerError::Forbidden {
                role: scope.role.to_string(),
                field: "commission".to_string(),
            });
        }
        Ok(())
    }

    /// Expected versus realized commission
    pub async fn commission_summary(
        &self,
        scope: &RequestScope,
        query: &ReportQuery,
    ) -> LedgerResult<CommissionSummary> {
        Self::require_profit(scope)?;
        let trips = self.report_trips(scope, query).await?;
        Ok(commission_summary(&trips))
    }

    /// To-pay totals; commission and net keeps are zero for restricted roles
    pub async fn to_pay_summary(&self, scope: &RequestScope, query: &ReportQuery) -> LedgerResult<ToPaySummary> {
        let trips = self.report_trips(scope, query).await?;
        Ok(to_pay_summary(&trips))
    }

    pub async fn driver_ledger(
        &self,
        scope: &RequestScope,
        query: &ReportQuery,
    ) -> LedgerResult<Vec<DriverLedgerEntry>> {
        let trips = self.report_trips(scope, query).await?;
        Ok(driver_ledger(&trips))
    }

    pub async fn consignor_ledger(
        &self,
        scope: &RequestScope,
        query: &ReportQuery,
    ) -> LedgerResult<Vec<ConsignorLedgerEntry>> {
        let trips = self.report_trips(scope, query).await?;
        Ok(consignor_ledger(&trips))
    }

    /// Receivable aging as of a given day; pass today's date for a live view
    pub async fn aging_report(
        &self,
        scope: &RequestScope,
        query: &ReportQuery,
        as_of: NaiveDate,
    ) -> LedgerResult<AgingReport> {
        let trips = self.report_trips(scope, query).await?;
        Ok(aging_report(&trips, as_of, &self.config.aging))
    }

    /// Receivable aging as of today's UTC date
    pub async fn current_aging_report(
        &self,
        scope: &RequestScope,
        query: &ReportQuery,
    ) -> LedgerResult<AgingReport> {
        self.aging_report(scope, query, chrono::Utc::now().date_naive())
            .await
    }

    /// Loans issued within the query range
    pub async fn hand_loan_summary(
        &self,
        scope: &RequestScope,
        query: &ReportQuery,
    ) -> LedgerResult<HandLoanSummary> {
        scope.require_office("reports")?;
        query.validate(&self.config.reports)?;
        let loans = self.report_loans(scope, query).await?;
        Ok(hand_loan_summary(&loans))
    }

    async fn report_loans(&self, scope: &RequestScope, query: &ReportQuery) -> LedgerResult<Vec<HandLoan>> {
        let filter = HandLoanFilter {
            driver_id: query.driver_id.clone(),
            from: Some(query.from),
            to: Some(query.to),
        };
        self.storage
            .list_hand_loans(&scope.organization_id, &filter)
            .await
    }

    /// All settlement views over one trip scan
    pub async fn settlement_report(
        &self,
        scope: &RequestScope,
        query: &ReportQuery,
        as_of: NaiveDate,
    ) -> LedgerResult<SettlementReport> {
        let trips = self.report_trips(scope, query).await?;
        let loans = self.report_loans(scope, query).await?;

        let report = SettlementReport {
            query: query.clone(),
            trip_count: trips.len(),
            commission: scope
                .role
                .sees_profit()
                .then(|| commission_summary(&trips)),
            to_pay: to_pay_summary(&trips),
            drivers: driver_ledger(&trips),
            consignors: consignor_ledger(&trips),
            aging: aging_report(&trips, as_of, &self.config.aging),
            hand_loans: hand_loan_summary(&loans),
        };
        info!(
            organization_id = %scope.organization_id,
            from = %query.from,
            to = %query.to,
            trips = report.trip_count,
            "Settlement report generated"
        );
        Ok(report)
    }

    // Maintenance operations
    /// Repair driver availability that drifted from trip statuses.
    ///
    /// The ledger runs no scheduler of its own. Hosts call this periodically
    /// (every few minutes is plenty) and after a storage outage; each call
    /// retries queued writes and rescans every driver of the organization.
    pub async fn reconcile_driver_statuses(
        &mut self,
        scope: &RequestScope,
    ) -> LedgerResult<ReconciliationReport> {
        scope.require_office("driver reconciliation")?;
        let report = self.reconciler.reconcile(&scope.organization_id).await?;
        info!(
            organization_id = %scope.organization_id,
            checked = report.drivers_checked,
            repaired = report.repairs.len(),
            pending = report.still_pending.len(),
            "Driver status reconciliation finished"
        );
        Ok(report)
    }

    /// Check every stored trip's derived fields against a fresh derivation
    pub async fn validate_integrity(&self, scope: &RequestScope) -> LedgerResult<LedgerIntegrityReport> {
        scope.require_office("integrity check")?;
        let trips = self
            .storage
            .list_trips(&scope.organization_id, &TripFilter::default())
            .await?;

        let mut issues = Vec::new();
        for trip in &trips {
            let stored = DerivedSnapshot::of_stored(trip);
            let fresh = DerivedSnapshot::of_trip(trip);
            if stored != fresh {
                warn!(trip_id = %trip.id, "Stored balances differ from derivation");
                issues.push(format!(
                    "Trip {}: stored balance payable {} / receivable {}, derived {} / {}",
                    trip.id,
                    stored.balance_payable_to_driver,
                    stored.balance_receivable,
                    fresh.balance_payable_to_driver,
                    fresh.balance_receivable
                ));
            }
        }

        Ok(LedgerIntegrityReport {
            organization_id: scope.organization_id.clone(),
            trips_checked: trips.len(),
            is_valid: issues.is_empty(),
            issues,
        })
    }

    /// Read-only snapshot for the slip generator
    pub async fn slip_snapshot(&self, scope: &RequestScope, trip_id: &str) -> LedgerResult<TripSlip> {
        let trip = scope.redact(
            self.trip_manager
                .get_trip_required(scope, trip_id)
                .await?,
        );
        let driver = match trip.driver_id.as_deref() {
            Some(driver_id) => {
                self.storage
                    .get_driver(&scope.organization_id, driver_id)
                    .await?
            }
            None => None,
        };
        Ok(TripSlip::build(
            &trip,
            driver.as_ref(),
            self.config.slip_preferences(&scope.organization_id),
        ))
    }
}

/// Report on stored-versus-derived consistency of trip money fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub organization_id: String,
    pub trips_checked: usize,
    pub is_valid: bool,
    pub issues: Vec<String>,
}
