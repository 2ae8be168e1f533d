//! Trip form handling and trip lifecycle management

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::derivation::*;
use crate::ledger::lifecycle::*;
use crate::reconciliation::{PendingDriverSync, ReconciliationQueue};
use crate::scope::{RequestScope, Role};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{clean_text, validate_non_negative};

/// One itemised expense row as submitted by the trip form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherExpenseForm {
    pub expense_type: String,
    pub custom_name: Option<String>,
    pub amount: FormAmount,
}

impl OtherExpenseForm {
    /// Blank rows (no type, zero amount) are dropped
    fn to_expense(&self) -> Option<OtherExpense> {
        let expense_type = self.expense_type.trim();
        if expense_type.is_empty() && self.amount.0 == BigDecimal::from(0) {
            return None;
        }
        Some(OtherExpense {
            expense_type: if expense_type.is_empty() {
                "OTHER".to_string()
            } else {
                expense_type.to_uppercase()
            },
            custom_name: clean_text(self.custom_name.clone()),
            amount: self.amount.0.clone(),
        })
    }
}

/// Trip-scoped hand loan section of the form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripHandLoanForm {
    pub amount: FormAmount,
    pub paid_date: Option<NaiveDate>,
    pub payment_mode: Option<String>,
    pub account: Option<String>,
    pub remarks: Option<String>,
}

/// Raw trip create/update payload.
///
/// Every monetary field is lenient: anything non-numeric becomes zero. The
/// client always resends the full form, so an omitted amount means zero,
/// except for the commission fields a restricted role cannot see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripForm {
    /// Version the client last read; required on update
    pub expected_version: Option<u64>,
    /// Only honoured on create
    pub kind: Option<TripKind>,
    /// Create as a placeholder lorry instead of a pending trip
    pub draft: bool,
    /// Requested status, checked against the lifecycle on update
    pub status: Option<TripStatus>,
    pub trip_date: Option<NaiveDate>,
    pub loading_date: Option<NaiveDate>,
    pub loading_location: Option<String>,
    pub unloading_location: Option<String>,
    pub consignment_item: Option<String>,
    pub consignor_id: Option<String>,
    pub consignor_name: Option<String>,
    pub consignor_mobile: Option<String>,
    pub driver_id: Option<String>,
    pub vehicle: Option<AdHocVehicle>,

    pub loaded_weight: FormAmount,
    pub driver_rate_per_ton: FormAmount,
    pub loading_commission: FormAmount,
    pub driver_advance: FormAmount,
    pub driver_advance_payment_mode: Option<String>,
    pub driver_advance_account: Option<String>,
    pub loading_charge: FormAmount,
    pub unloading_charge: FormAmount,
    pub other_expenses: Vec<OtherExpenseForm>,
    pub driver_balance_paid: FormAmount,
    pub driver_balance_paid_date: Option<NaiveDate>,
    pub driver_balance_payment_mode: Option<String>,
    pub driver_balance_account: Option<String>,
    pub pod_status: Option<PodStatus>,
    pub pod_date: Option<NaiveDate>,
    pub to_pay_amount: FormAmount,
    pub to_pay_commission: Option<FormAmount>,
    pub to_pay_pending_commission: Option<FormAmount>,
    pub to_pay_date: Option<NaiveDate>,

    pub billed_weight: FormAmount,
    pub consignor_rate_per_ton: FormAmount,
    pub round_off: FormAmount,
    pub loading_mamul: FormAmount,
    pub unloading_mamul: FormAmount,
    pub payment_mamul: FormAmount,
    pub tds: FormAmount,
    pub consignor_advance: FormAmount,
    pub consignor_advance_payment_mode: Option<String>,
    pub consignor_advance_account: Option<String>,
    pub consignor_balance_received: FormAmount,
    pub consignor_balance_received_date: Option<NaiveDate>,
    pub consignor_balance_payment_mode: Option<String>,
    pub consignor_balance_account: Option<String>,

    pub hand_loan: Option<TripHandLoanForm>,
    pub completion: Option<CompletionMetrics>,
}

impl TripForm {
    /// Rebuild the form a client would resend for a stored trip
    pub fn from_trip(trip: &Trip) -> Self {
        let c = &trip.costing;
        let b = &trip.billing;
        Self {
            expected_version: Some(trip.version),
            kind: Some(trip.kind),
            draft: trip.status == TripStatus::Draft,
            status: Some(trip.status),
            trip_date: Some(trip.trip_date),
            loading_date: trip.loading_date,
            loading_location: trip.loading_location.clone(),
            unloading_location: trip.unloading_location.clone(),
            consignment_item: trip.consignment_item.clone(),
            consignor_id: trip.consignor_id.clone(),
            consignor_name: trip.consignor_name.clone(),
            consignor_mobile: trip.consignor_mobile.clone(),
            driver_id: trip.driver_id.clone(),
            vehicle: trip.vehicle.clone(),
            loaded_weight: c.loaded_weight.clone().into(),
            driver_rate_per_ton: c.driver_rate_per_ton.clone().into(),
            loading_commission: c.loading_commission.clone().into(),
            driver_advance: c.driver_advance.clone().into(),
            driver_advance_payment_mode: c.driver_advance_payment_mode.clone(),
            driver_advance_account: c.driver_advance_account.clone(),
            loading_charge: c.loading_charge.clone().into(),
            unloading_charge: c.unloading_charge.clone().into(),
            other_expenses: c
                .other_expenses
                .iter()
                .map(|e| OtherExpenseForm {
                    expense_type: e.expense_type.clone(),
                    custom_name: e.custom_name.clone(),
                    amount: e.amount.clone().into(),
                })
                .collect(),
            driver_balance_paid: c.driver_balance_paid.clone().into(),
            driver_balance_paid_date: c.driver_balance_paid_date,
            driver_balance_payment_mode: c.driver_balance_payment_mode.clone(),
            driver_balance_account: c.driver_balance_account.clone(),
            pod_status: Some(c.pod_status),
            pod_date: c.pod_date,
            to_pay_amount: c.to_pay.to_pay_amount.clone().into(),
            // redacted reads must not echo zeroed commission back as an edit
            to_pay_commission: (!trip.profit_redacted)
                .then(|| c.to_pay.to_pay_commission.clone().into()),
            to_pay_pending_commission: (!trip.profit_redacted)
                .then(|| c.to_pay.to_pay_pending_commission.clone().into()),
            to_pay_date: c.to_pay.to_pay_date,
            billed_weight: b.billed_weight.clone().into(),
            consignor_rate_per_ton: b.consignor_rate_per_ton.clone().into(),
            round_off: b.round_off.clone().into(),
            loading_mamul: b.loading_mamul.clone().into(),
            unloading_mamul: b.unloading_mamul.clone().into(),
            payment_mamul: b.payment_mamul.clone().into(),
            tds: b.tds.clone().into(),
            consignor_advance: b.consignor_advance.clone().into(),
            consignor_advance_payment_mode: b.consignor_advance_payment_mode.clone(),
            consignor_advance_account: b.consignor_advance_account.clone(),
            consignor_balance_received: b.consignor_balance_received.clone().into(),
            consignor_balance_received_date: b.consignor_balance_received_date,
            consignor_balance_payment_mode: b.consignor_balance_payment_mode.clone(),
            consignor_balance_account: b.consignor_balance_account.clone(),
            hand_loan: trip.hand_loan.as_ref().map(|h| TripHandLoanForm {
                amount: h.amount.clone().into(),
                paid_date: h.paid_date,
                payment_mode: h.payment_mode.clone(),
                account: h.account.clone(),
                remarks: h.remarks.clone(),
            }),
            completion: trip.completion.clone(),
        }
    }
}

/// Reject weights and rates that cannot be physical
fn validate_form(form: &TripForm) -> LedgerResult<()> {
    validate_non_negative("loaded_weight", form.loaded_weight.value())?;
    validate_non_negative("driver_rate_per_ton", form.driver_rate_per_ton.value())?;
    validate_non_negative("billed_weight", form.billed_weight.value())?;
    validate_non_negative("consignor_rate_per_ton", form.consignor_rate_per_ton.value())?;
    for (index, expense) in form.other_expenses.iter().enumerate() {
        validate_non_negative(&format!("other_expenses[{}].amount", index), expense.amount.value())?;
    }
    Ok(())
}

/// Resolve a commission field the caller's role may be unable to see.
///
/// Restricted roles carry the stored value forward when they omit the
/// field and may not change it.
fn protected_amount(
    scope: &RequestScope,
    field: &str,
    supplied: Option<&FormAmount>,
    stored: &BigDecimal,
) -> LedgerResult<BigDecimal> {
    if scope.role.sees_profit() {
        return Ok(supplied.map(|v| v.0.clone()).unwrap_or_else(|| BigDecimal::from(0)));
    }
    match supplied {
        None => Ok(stored.clone()),
        Some(v) if v.0 == *stored => Ok(stored.clone()),
        Some(_) => Err(LedgerError::Forbidden {
            role: scope.role.to_string(),
            field: field.to_string(),
        }),
    }
}

/// Copy the form's raw fields onto the trip and rederive.
///
/// Pure: no storage lookups, so the live preview and the persistence path
/// run exactly the same mapping.
pub fn apply_form_fields<C: AsRef<str>>(
    scope: &RequestScope,
    trip: &mut Trip,
    form: &TripForm,
    account_codes: &[C],
) -> LedgerResult<()> {
    validate_form(form)?;

    let route = |mode: &Option<String>, account: &Option<String>| {
        normalize_payment_mode(mode.as_deref(), account.as_deref(), account_codes)
    };

    if let Some(date) = form.trip_date {
        trip.trip_date = date;
    }
    trip.loading_date = form.loading_date;
    trip.loading_location = clean_text(form.loading_location.clone());
    trip.unloading_location = clean_text(form.unloading_location.clone());
    trip.consignment_item = clean_text(form.consignment_item.clone());
    trip.consignor_id = clean_text(form.consignor_id.clone());
    trip.consignor_name = clean_text(form.consignor_name.clone());
    trip.consignor_mobile = clean_text(form.consignor_mobile.clone());
    trip.driver_id = clean_text(form.driver_id.clone());
    trip.vehicle = form
        .vehicle
        .clone()
        .filter(|v| *v != AdHocVehicle::default());

    let to_pay_commission = protected_amount(
        scope,
        "to_pay_commission",
        form.to_pay_commission.as_ref(),
        &trip.costing.to_pay.to_pay_commission,
    )?;
    let to_pay_pending_commission = protected_amount(
        scope,
        "to_pay_pending_commission",
        form.to_pay_pending_commission.as_ref(),
        &trip.costing.to_pay.to_pay_pending_commission,
    )?;

    let advance = route(&form.driver_advance_payment_mode, &form.driver_advance_account);
    let balance = route(&form.driver_balance_payment_mode, &form.driver_balance_account);
    trip.costing = DriverCosting {
        loaded_weight: form.loaded_weight.0.clone(),
        driver_rate_per_ton: form.driver_rate_per_ton.0.clone(),
        loading_commission: form.loading_commission.0.clone(),
        hire_value: BigDecimal::from(0),
        driver_advance: form.driver_advance.0.clone(),
        driver_advance_payment_mode: advance.mode,
        driver_advance_account: advance.account,
        loading_charge: form.loading_charge.0.clone(),
        unloading_charge: form.unloading_charge.0.clone(),
        other_expenses: form
            .other_expenses
            .iter()
            .filter_map(OtherExpenseForm::to_expense)
            .collect(),
        driver_balance_paid: form.driver_balance_paid.0.clone(),
        driver_balance_paid_date: form.driver_balance_paid_date,
        driver_balance_payment_mode: balance.mode,
        driver_balance_account: balance.account,
        pod_status: form.pod_status.unwrap_or_default(),
        pod_date: form.pod_date,
        to_pay: ToPay {
            to_pay_amount: form.to_pay_amount.0.clone(),
            to_pay_commission,
            to_pay_pending_commission,
            to_pay_date: form.to_pay_date,
        },
    };

    let advance = route(
        &form.consignor_advance_payment_mode,
        &form.consignor_advance_account,
    );
    let balance = route(
        &form.consignor_balance_payment_mode,
        &form.consignor_balance_account,
    );
    trip.billing = ConsignorBilling {
        billed_weight: form.billed_weight.0.clone(),
        consignor_rate_per_ton: form.consignor_rate_per_ton.0.clone(),
        round_off: form.round_off.0.clone(),
        loading_mamul: form.loading_mamul.0.clone(),
        unloading_mamul: form.unloading_mamul.0.clone(),
        payment_mamul: form.payment_mamul.0.clone(),
        tds: form.tds.0.clone(),
        gross_amount: BigDecimal::from(0),
        consignor_advance: form.consignor_advance.0.clone(),
        consignor_advance_payment_mode: advance.mode,
        consignor_advance_account: advance.account,
        consignor_balance_received: form.consignor_balance_received.0.clone(),
        consignor_balance_received_date: form.consignor_balance_received_date,
        consignor_balance_payment_mode: balance.mode,
        consignor_balance_account: balance.account,
    };

    trip.hand_loan = form.hand_loan.as_ref().and_then(|h| {
        if h.amount.0 == BigDecimal::from(0) {
            return None;
        }
        let routing = route(&h.payment_mode, &h.account);
        Some(TripHandLoan {
            amount: h.amount.0.clone(),
            paid_date: h.paid_date,
            payment_mode: routing.mode,
            account: routing.account,
            remarks: clean_text(h.remarks.clone()),
        })
    });

    if form.completion.is_some() {
        trip.completion = form.completion.clone();
    }

    rederive(trip);
    Ok(())
}

/// Trip manager for handling trip create/update/transition/delete
pub struct TripManager<S: LedgerStorage> {
    pub(crate) storage: S,
    config: Arc<LedgerConfig>,
    sink: Arc<dyn LocationSink>,
    queue: ReconciliationQueue,
}

impl<S: LedgerStorage> TripManager<S> {
    /// Create a new trip manager
    pub fn new(
        storage: S,
        config: Arc<LedgerConfig>,
        sink: Arc<dyn LocationSink>,
        queue: ReconciliationQueue,
    ) -> Self {
        Self {
            storage,
            config,
            sink,
            queue,
        }
    }

    /// Derive the money fields for a form without persisting anything
    pub fn preview(&self, scope: &RequestScope, form: &TripForm) -> LedgerResult<DerivedSnapshot> {
        let mut scratch = Trip::new(
            String::new(),
            scope.organization_id.clone(),
            form.kind.unwrap_or_default(),
            form.trip_date.unwrap_or_else(|| chrono::Utc::now().date_naive()),
        );
        apply_form_fields(
            scope,
            &mut scratch,
            form,
            self.config.account_codes(&scope.organization_id),
        )?;
        let mut snapshot = DerivedSnapshot::of_trip(&scratch);
        if !scope.role.sees_profit() {
            snapshot.commission = BigDecimal::from(0);
            snapshot.net_driver_keeps = BigDecimal::from(0);
        }
        Ok(snapshot)
    }

    /// Get a trip by ID, redacted for the caller's role
    pub async fn get_trip(&self, scope: &RequestScope, trip_id: &str) -> LedgerResult<Option<Trip>> {
        let trip = self
            .storage
            .get_trip(&scope.organization_id, trip_id)
            .await?;
        Ok(trip
            .filter(|t| self.visible_to(scope, t))
            .map(|t| scope.redact(t)))
    }

    /// Get a trip by ID without redaction, returning an error if not found
    pub(crate) async fn get_trip_required(
        &self,
        scope: &RequestScope,
        trip_id: &str,
    ) -> LedgerResult<Trip> {
        let trip = self
            .storage
            .get_trip(&scope.organization_id, trip_id)
            .await?
            .filter(|t| self.visible_to(scope, t))
            .ok_or_else(|| LedgerError::TripNotFound(trip_id.to_string()))?;
        scope.ensure_owns(&trip.organization_id)?;
        Ok(trip)
    }

    /// List trips; drivers only ever see their own
    pub async fn list_trips(&self, scope: &RequestScope, filter: &TripFilter) -> LedgerResult<Vec<Trip>> {
        let mut filter = filter.clone();
        if scope.role == Role::Driver {
            filter.driver_id = Some(scope.actor_id.clone());
        }
        let trips = self
            .storage
            .list_trips(&scope.organization_id, &filter)
            .await?;
        Ok(trips.into_iter().map(|t| scope.redact(t)).collect())
    }

    fn visible_to(&self, scope: &RequestScope, trip: &Trip) -> bool {
        scope.role != Role::Driver
            || trip.driver_id.as_deref() == Some(scope.actor_id.as_str())
    }

    /// Create a trip from a form submission
    pub async fn create_trip(&mut self, scope: &RequestScope, form: &TripForm) -> LedgerResult<Trip> {
        scope.require_office("trip form")?;

        let trip_date = form
            .trip_date
            .ok_or_else(|| LedgerError::validation("trip_date", "is required"))?;

        let mut trip = Trip::new(
            uuid::Uuid::new_v4().to_string(),
            scope.organization_id.clone(),
            form.kind.unwrap_or_default(),
            trip_date,
        );
        trip.status = if form.draft {
            TripStatus::Draft
        } else {
            TripStatus::Pending
        };

        self.fill_trip(scope, &mut trip, form).await?;

        if trip.status == TripStatus::Draft && !trip.has_vehicle_data() {
            return Err(LedgerError::validation(
                "vehicle",
                "a draft placeholder needs a driver or lorry",
            ));
        }
        if trip.status != TripStatus::Draft
            && trip.consignor_id.is_none()
            && trip.consignor_name.is_none()
        {
            return Err(LedgerError::validation(
                "consignor_name",
                "a consignor reference or name is required",
            ));
        }

        try_auto_assign(&mut trip);
        self.ensure_driver_available(scope, None, &trip).await?;

        self.storage.save_trip(&trip).await?;
        info!(
            trip_id = %trip.id,
            organization_id = %trip.organization_id,
            status = %trip.status,
            hire_value = %trip.costing.hire_value,
            gross_amount = %trip.billing.gross_amount,
            "Trip created"
        );

        let effects = driver_effects(None, Some(&trip));
        self.apply_driver_effects(&trip, effects).await;
        Ok(scope.redact(trip))
    }

    /// Update a trip from a full form resubmission
    pub async fn update_trip(
        &mut self,
        scope: &RequestScope,
        trip_id: &str,
        form: &TripForm,
    ) -> LedgerResult<Trip> {
        scope.require_office("trip form")?;
        let expected = form
            .expected_version
            .ok_or_else(|| LedgerError::validation("expected_version", "is required"))?;

        let before = self.get_trip_required(scope, trip_id).await?;
        check_version(&before, expected)?;
        if before.status.is_terminal() {
            return Err(LedgerError::TripLocked {
                trip_id: before.id.clone(),
                status: before.status,
            });
        }

        self.rewrite(scope, before, form, expected, None).await
    }

    /// Edit a completed or cancelled trip, leaving an audit record
    pub async fn amend_trip(
        &mut self,
        scope: &RequestScope,
        trip_id: &str,
        form: &TripForm,
        reason: &str,
    ) -> LedgerResult<Trip> {
        scope.require_admin("trip amendment")?;
        if reason.trim().is_empty() {
            return Err(LedgerError::validation("reason", "an amendment needs a reason"));
        }
        let expected = form
            .expected_version
            .ok_or_else(|| LedgerError::validation("expected_version", "is required"))?;

        let before = self.get_trip_required(scope, trip_id).await?;
        check_version(&before, expected)?;

        let amendment = Amendment {
            amended_at: chrono::Utc::now().naive_utc(),
            actor_id: scope.actor_id.clone(),
            reason: reason.trim().to_string(),
            previous_version: before.version,
        };
        self.rewrite(scope, before, form, expected, Some(amendment))
            .await
    }

    async fn rewrite(
        &mut self,
        scope: &RequestScope,
        before: Trip,
        form: &TripForm,
        expected: u64,
        amendment: Option<Amendment>,
    ) -> LedgerResult<Trip> {
        let mut trip = before.clone();
        self.fill_trip(scope, &mut trip, form).await?;

        if let Some(to) = form.status.filter(|s| *s != trip.status) {
            let request = TransitionRequest {
                to,
                completion: form.completion.clone(),
                expected_version: Some(expected),
            };
            validate_transition(scope, &trip, &request)?;
            apply_transition(&mut trip, request);
        }
        if !trip.has_vehicle_data() {
            match trip.status {
                // vehicle removed from the form; the trip waits for a new one
                TripStatus::Assigned => trip.status = TripStatus::Pending,
                status if status.is_driver_engaged() => {
                    return Err(LedgerError::validation(
                        "vehicle",
                        format!("a {} trip cannot drop its driver or lorry", status),
                    ));
                }
                _ => {}
            }
        }
        try_auto_assign(&mut trip);
        self.ensure_driver_available(scope, Some(&before), &trip)
            .await?;

        if let Some(amendment) = amendment {
            trip.amendments.push(amendment);
        }
        trip.updated_at = chrono::Utc::now().naive_utc();

        let stored = self.storage.update_trip(&trip, expected).await?;
        info!(
            trip_id = %stored.id,
            version = stored.version,
            status = %stored.status,
            balance_payable_to_driver = %stored.balances.balance_payable_to_driver,
            balance_receivable = %stored.balances.balance_receivable,
            "Trip updated"
        );

        let effects = driver_effects(Some(&before), Some(&stored));
        self.apply_driver_effects(&stored, effects).await;
        Ok(scope.redact(stored))
    }

    /// Move a trip through the lifecycle
    pub async fn transition_trip(
        &mut self,
        scope: &RequestScope,
        trip_id: &str,
        request: TransitionRequest,
    ) -> LedgerResult<Trip> {
        let before = self.get_trip_required(scope, trip_id).await?;
        let expected = request.expected_version.unwrap_or(before.version);
        check_version(&before, expected)?;

        validate_transition(scope, &before, &request)?;
        let mut trip = before.clone();
        apply_transition(&mut trip, request);
        try_auto_assign(&mut trip);
        self.ensure_driver_available(scope, Some(&before), &trip)
            .await?;
        trip.updated_at = chrono::Utc::now().naive_utc();

        let stored = self.storage.update_trip(&trip, expected).await?;
        info!(
            trip_id = %stored.id,
            from = %before.status,
            to = %stored.status,
            actor = %scope.actor_id,
            "Trip status changed"
        );

        let effects = driver_effects(Some(&before), Some(&stored));
        self.apply_driver_effects(&stored, effects).await;
        Ok(scope.redact(stored))
    }

    /// Delete a trip that has no driver actively working it
    pub async fn delete_trip(&mut self, scope: &RequestScope, trip_id: &str) -> LedgerResult<()> {
        scope.require_office("trip deletion")?;
        let trip = self.get_trip_required(scope, trip_id).await?;

        if trip.status.is_driver_engaged() {
            return Err(LedgerError::DeletionBlocked {
                trip_id: trip.id,
                status: trip.status,
            });
        }

        self.storage
            .delete_trip(&scope.organization_id, trip_id)
            .await?;
        info!(trip_id, status = %trip.status, "Trip deleted");
        Ok(())
    }

    /// Map the form and resolve consignor/driver references
    async fn fill_trip(&self, scope: &RequestScope, trip: &mut Trip, form: &TripForm) -> LedgerResult<()> {
        apply_form_fields(
            scope,
            trip,
            form,
            self.config.account_codes(&scope.organization_id),
        )?;

        if let Some(consignor_id) = trip.consignor_id.clone() {
            let consignor = self
                .storage
                .get_consignor(&scope.organization_id, &consignor_id)
                .await?
                .ok_or_else(|| LedgerError::ConsignorNotFound(consignor_id.clone()))?;
            scope.ensure_owns(&consignor.organization_id)?;

            trip.consignor_name = Some(consignor.name.clone());
            if trip.consignor_mobile.is_none() {
                trip.consignor_mobile = consignor.phone.clone();
            }
            if trip.billing.consignor_rate_per_ton == BigDecimal::from(0) {
                if let (Some(from), Some(to)) = (&trip.loading_location, &trip.unloading_location) {
                    if let Some(rate) = consignor.route_rate(from, to) {
                        trip.billing.consignor_rate_per_ton = rate.clone();
                        rederive(trip);
                    }
                }
            }
        }

        if let Some(driver_id) = trip.driver_id.clone() {
            let driver = self
                .storage
                .get_driver(&scope.organization_id, &driver_id)
                .await?
                .ok_or_else(|| LedgerError::DriverNotFound(driver_id.clone()))?;
            scope.ensure_owns(&driver.organization_id)?;
        }

        Ok(())
    }

    /// A driver newly engaged by this write must not be busy elsewhere
    async fn ensure_driver_available(
        &self,
        scope: &RequestScope,
        before: Option<&Trip>,
        after: &Trip,
    ) -> LedgerResult<()> {
        let Some(driver_id) = after.engaged_driver() else {
            return Ok(());
        };
        if before.and_then(Trip::engaged_driver) == Some(driver_id) {
            return Ok(());
        }
        let driver = self
            .storage
            .get_driver(&scope.organization_id, driver_id)
            .await?
            .ok_or_else(|| LedgerError::DriverNotFound(driver_id.to_string()))?;
        let holding = self
            .trip_holding(&scope.organization_id, driver_id, &after.id)
            .await?;
        if driver.status == DriverStatus::Busy || holding.is_some() {
            return Err(LedgerError::validation(
                "driver_id",
                format!("driver '{}' is busy on another trip", driver.name),
            ));
        }
        Ok(())
    }

    /// Another active trip that still engages `driver_id`
    async fn trip_holding(
        &self,
        organization_id: &str,
        driver_id: &str,
        trip_id: &str,
    ) -> LedgerResult<Option<String>> {
        let filter = TripFilter {
            driver_id: Some(driver_id.to_string()),
            ..TripFilter::default()
        };
        let trips = self.storage.list_trips(organization_id, &filter).await?;
        Ok(trips
            .into_iter()
            .find(|t| t.id != trip_id && t.engaged_driver() == Some(driver_id))
            .map(|t| t.id))
    }

    /// Flip driver availability after a committed trip write.
    ///
    /// Failures are queued for reconciliation and never fail the trip write.
    async fn apply_driver_effects(&mut self, trip: &Trip, effects: Vec<DriverEffect>) {
        for effect in effects {
            if effect.status == DriverStatus::Online {
                match self
                    .trip_holding(&trip.organization_id, &effect.driver_id, &trip.id)
                    .await
                {
                    Ok(None) => {}
                    Ok(Some(other)) => {
                        info!(
                            driver_id = %effect.driver_id,
                            trip_id = %trip.id,
                            held_by = %other,
                            "Driver stays busy on another trip"
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            driver_id = %effect.driver_id,
                            trip_id = %trip.id,
                            error = %e,
                            "Could not check other trips before release; queued for reconciliation"
                        );
                        self.queue.push(PendingDriverSync {
                            organization_id: trip.organization_id.clone(),
                            driver_id: effect.driver_id,
                            desired_status: effect.status,
                            trip_id: trip.id.clone(),
                            last_error: e.to_string(),
                        });
                        continue;
                    }
                }
            }

            match self
                .storage
                .set_driver_status(&trip.organization_id, &effect.driver_id, effect.status)
                .await
            {
                Ok(driver) => {
                    info!(
                        driver_id = %driver.id,
                        status = %driver.status,
                        trip_id = %trip.id,
                        "Driver availability changed"
                    );
                    self.sink.publish(DriverStatusUpdate::from_driver(&driver));
                }
                Err(e) => {
                    warn!(
                        driver_id = %effect.driver_id,
                        desired = %effect.status,
                        trip_id = %trip.id,
                        error = %e,
                        "Driver status write failed; queued for reconciliation"
                    );
                    self.queue.push(PendingDriverSync {
                        organization_id: trip.organization_id.clone(),
                        driver_id: effect.driver_id,
                        desired_status: effect.status,
                        trip_id: trip.id.clone(),
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}

fn check_version(trip: &Trip, expected: u64) -> LedgerResult<()> {
    if trip.version != expected {
        return Err(LedgerError::Conflict {
            trip_id: trip.id.clone(),
            expected,
            actual: trip.version,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> RequestScope {
        RequestScope::admin("org1")
    }

    fn blank_trip() -> Trip {
        Trip::new(
            "t1".into(),
            "org1".into(),
            TripKind::Logistics,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        )
    }

    #[test]
    fn test_form_parses_lenient_amounts() {
        let form: TripForm = serde_json::from_value(json!({
            "trip_date": "2024-05-01",
            "loaded_weight": "10",
            "driver_rate_per_ton": 2000,
            "loading_commission": "500",
            "driver_advance": "",
            "billed_weight": 10,
            "consignor_rate_per_ton": "2,500",
            "tds": "n/a"
        }))
        .unwrap();

        let mut trip = blank_trip();
        apply_form_fields(&scope(), &mut trip, &form, &["HDFC1"]).unwrap();
        assert_eq!(trip.costing.hire_value, BigDecimal::from(19500));
        assert_eq!(trip.billing.gross_amount, BigDecimal::from(25000));
        assert_eq!(trip.costing.driver_advance, BigDecimal::from(0));
        assert_eq!(trip.billing.tds, BigDecimal::from(0));
    }

    #[test]
    fn test_payment_modes_are_routed() {
        let form = TripForm {
            driver_advance: 5000.into(),
            driver_advance_payment_mode: Some("hdfc1".into()),
            consignor_advance: 10000.into(),
            consignor_advance_payment_mode: Some("CASH".into()),
            ..TripForm::default()
        };
        let mut trip = blank_trip();
        apply_form_fields(&scope(), &mut trip, &form, &["HDFC1"]).unwrap();
        assert_eq!(trip.costing.driver_advance_payment_mode.as_deref(), Some("NEFT"));
        assert_eq!(trip.costing.driver_advance_account.as_deref(), Some("HDFC1"));
        assert_eq!(trip.billing.consignor_advance_payment_mode.as_deref(), Some("CASH"));
        assert!(trip.billing.consignor_advance_account.is_none());
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let form = TripForm {
            loaded_weight: (-3).into(),
            ..TripForm::default()
        };
        let err = apply_form_fields(&scope(), &mut blank_trip(), &form, &[] as &[&str]).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "loaded_weight"));
    }

    #[test]
    fn test_blank_expense_rows_are_dropped() {
        let form = TripForm {
            other_expenses: vec![
                OtherExpenseForm::default(),
                OtherExpenseForm {
                    expense_type: "toll".into(),
                    custom_name: None,
                    amount: 450.into(),
                },
            ],
            ..TripForm::default()
        };
        let mut trip = blank_trip();
        apply_form_fields(&scope(), &mut trip, &form, &[] as &[&str]).unwrap();
        assert_eq!(trip.costing.other_expenses.len(), 1);
        assert_eq!(trip.costing.other_expenses[0].expense_type, "TOLL");
    }

    #[test]
    fn test_restricted_role_keeps_stored_commission() {
        let restricted = RequestScope::new("org1", Role::RestrictedStaff, "u2");
        let mut trip = blank_trip();
        trip.costing.to_pay.to_pay_commission = BigDecimal::from(800);

        let form = TripForm {
            to_pay_amount: 9000.into(),
            ..TripForm::default()
        };
        apply_form_fields(&restricted, &mut trip, &form, &[] as &[&str]).unwrap();
        assert_eq!(trip.costing.to_pay.to_pay_commission, BigDecimal::from(800));
        assert_eq!(trip.balances.net_driver_keeps, BigDecimal::from(8200));

        let tampered = TripForm {
            to_pay_commission: Some(100.into()),
            ..form
        };
        assert!(matches!(
            apply_form_fields(&restricted, &mut trip, &tampered, &[] as &[&str]),
            Err(LedgerError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_round_trip_form_rederives_identically() {
        let mut trip = blank_trip();
        let form = TripForm {
            loaded_weight: 12.into(),
            driver_rate_per_ton: 1800.into(),
            billed_weight: 12.into(),
            consignor_rate_per_ton: 2100.into(),
            round_off: 7.into(),
            tds: 250.into(),
            ..TripForm::default()
        };
        apply_form_fields(&scope(), &mut trip, &form, &[] as &[&str]).unwrap();
        let first = trip.clone();

        apply_form_fields(&scope(), &mut trip, &TripForm::from_trip(&first), &[] as &[&str]).unwrap();
        assert_eq!(trip.costing, first.costing);
        assert_eq!(trip.billing, first.billing);
        assert_eq!(trip.balances, first.balances);
    }
}
