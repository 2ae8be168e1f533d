//! Consignor and driver registry

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::scope::{RequestScope, Role};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::*;

/// Consignor fields as submitted by a form or an import row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsignorInput {
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    pub default_routes: Vec<RoutePreset>,
}

impl ConsignorInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn apply_to(&self, consignor: &mut Consignor) {
        consignor.name = self.name.split_whitespace().collect::<Vec<_>>().join(" ");
        consignor.contact_person = clean_text(self.contact_person.clone());
        consignor.phone = clean_text(self.phone.clone());
        consignor.email = clean_text(self.email.clone());
        consignor.address = clean_text(self.address.clone());
        consignor.gstin = clean_text(self.gstin.clone()).map(|g| g.to_uppercase());
        consignor.default_routes = self.default_routes.clone();
    }
}

/// Driver and vehicle fields as submitted by a form or an import row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverInput {
    pub name: String,
    pub phone: String,
    pub vehicle_number: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_category: Option<String>,
    pub primary_bank: Option<BankDetails>,
    pub secondary_bank: Option<BankDetails>,
    pub owner: Option<OwnerDetails>,
    pub rating: Option<BigDecimal>,
}

impl DriverInput {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            ..Self::default()
        }
    }

    pub fn with_vehicle(mut self, vehicle_number: impl Into<String>) -> Self {
        self.vehicle_number = Some(vehicle_number.into());
        self
    }

    fn apply_to(&self, driver: &mut Driver) {
        driver.name = self.name.trim().to_string();
        driver.phone = normalize_phone(&self.phone);
        driver.vehicle_number = clean_text(self.vehicle_number.clone())
            .map(|v| normalize_vehicle_number(&v));
        driver.vehicle_model = clean_text(self.vehicle_model.clone());
        driver.vehicle_category = clean_text(self.vehicle_category.clone());
        driver.primary_bank = self.primary_bank.clone();
        driver.secondary_bank = self.secondary_bank.clone();
        driver.owner = self.owner.clone();
        driver.rating = self.rating.clone();
    }
}

/// Outcome of one import row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    Created { id: String },
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRowResult {
    /// 1-based row number within the batch
    pub row: usize,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

/// Per-row report of a bulk import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub rows: Vec<ImportRowResult>,
    pub created: usize,
    pub rejected: usize,
}

impl ImportReport {
    fn record(&mut self, row: usize, result: LedgerResult<String>) {
        let outcome = match result {
            Ok(id) => {
                self.created += 1;
                ImportOutcome::Created { id }
            }
            Err(e) => {
                self.rejected += 1;
                ImportOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        };
        self.rows.push(ImportRowResult { row, outcome });
    }
}

/// Registry manager for consignors and drivers
pub struct RegistryManager<S: LedgerStorage> {
    pub(crate) storage: S,
    consignor_validator: Box<dyn ConsignorValidator>,
    driver_validator: Box<dyn DriverValidator>,
    sink: Arc<dyn LocationSink>,
}

impl<S: LedgerStorage> RegistryManager<S> {
    /// Create a new registry manager with the default validators
    pub fn new(storage: S, sink: Arc<dyn LocationSink>) -> Self {
        Self {
            storage,
            consignor_validator: Box::new(DefaultConsignorValidator),
            driver_validator: Box::new(DefaultDriverValidator),
            sink,
        }
    }

    /// Create a new registry manager with custom validators
    pub fn with_validators(
        storage: S,
        sink: Arc<dyn LocationSink>,
        consignor_validator: Box<dyn ConsignorValidator>,
        driver_validator: Box<dyn DriverValidator>,
    ) -> Self {
        Self {
            storage,
            consignor_validator,
            driver_validator,
            sink,
        }
    }

    // Consignors

    /// Create a new consignor
    pub async fn create_consignor(
        &mut self,
        scope: &RequestScope,
        input: &ConsignorInput,
    ) -> LedgerResult<Consignor> {
        scope.require_office("consignor registry")?;

        let mut consignor = Consignor::new(
            uuid::Uuid::new_v4().to_string(),
            scope.organization_id.clone(),
            String::new(),
        );
        input.apply_to(&mut consignor);
        self.consignor_validator.validate_consignor(&consignor)?;
        self.ensure_consignor_unique(&consignor).await?;

        self.storage.save_consignor(&consignor).await?;
        info!(
            consignor_id = %consignor.id,
            organization_id = %consignor.organization_id,
            name = %consignor.name,
            "Consignor created"
        );
        Ok(consignor)
    }

    /// Update an existing consignor
    pub async fn update_consignor(
        &mut self,
        scope: &RequestScope,
        consignor_id: &str,
        input: &ConsignorInput,
    ) -> LedgerResult<Consignor> {
        scope.require_office("consignor registry")?;

        let mut consignor = self.get_consignor_required(scope, consignor_id).await?;
        input.apply_to(&mut consignor);
        consignor.updated_at = chrono::Utc::now().naive_utc();

        self.consignor_validator.validate_consignor(&consignor)?;
        self.ensure_consignor_unique(&consignor).await?;

        self.storage.update_consignor(&consignor).await?;
        info!(consignor_id = %consignor.id, "Consignor updated");
        Ok(consignor)
    }

    /// Get a consignor by ID
    pub async fn get_consignor(
        &self,
        scope: &RequestScope,
        consignor_id: &str,
    ) -> LedgerResult<Option<Consignor>> {
        self.storage
            .get_consignor(&scope.organization_id, consignor_id)
            .await
    }

    /// Get a consignor by ID, returning an error if not found
    pub async fn get_consignor_required(
        &self,
        scope: &RequestScope,
        consignor_id: &str,
    ) -> LedgerResult<Consignor> {
        let consignor = self
            .get_consignor(scope, consignor_id)
            .await?
            .ok_or_else(|| LedgerError::ConsignorNotFound(consignor_id.to_string()))?;
        scope.ensure_owns(&consignor.organization_id)?;
        Ok(consignor)
    }

    /// List consignors of the organization, by name
    pub async fn list_consignors(&self, scope: &RequestScope) -> LedgerResult<Vec<Consignor>> {
        let mut consignors = self
            .storage
            .list_consignors(&scope.organization_id)
            .await?;
        consignors.sort_by_key(|c| consignor_name_key(&c.name));
        Ok(consignors)
    }

    /// Import consignors row by row; a bad row never aborts the batch
    pub async fn import_consignors(
        &mut self,
        scope: &RequestScope,
        rows: &[ConsignorInput],
    ) -> LedgerResult<ImportReport> {
        scope.require_office("consignor import")?;

        let mut report = ImportReport::default();
        for (index, input) in rows.iter().enumerate() {
            let result = self
                .create_consignor(scope, input)
                .await
                .map(|c| c.id);
            report.record(index + 1, result);
        }
        info!(
            organization_id = %scope.organization_id,
            created = report.created,
            rejected = report.rejected,
            "Consignor import finished"
        );
        Ok(report)
    }

    async fn ensure_consignor_unique(&self, consignor: &Consignor) -> LedgerResult<()> {
        let key = consignor_name_key(&consignor.name);
        let existing = self
            .storage
            .list_consignors(&consignor.organization_id)
            .await?;
        if existing
            .iter()
            .any(|c| c.id != consignor.id && consignor_name_key(&c.name) == key)
        {
            return Err(LedgerError::Duplicate {
                entity: "consignor",
                field: "name",
                value: consignor.name.clone(),
            });
        }
        Ok(())
    }

    // Drivers

    /// Register a new driver, initially OFFLINE
    pub async fn create_driver(
        &mut self,
        scope: &RequestScope,
        input: &DriverInput,
    ) -> LedgerResult<Driver> {
        scope.require_office("driver registry")?;

        let mut driver = Driver::new(
            uuid::Uuid::new_v4().to_string(),
            scope.organization_id.clone(),
            String::new(),
            String::new(),
        );
        input.apply_to(&mut driver);
        self.driver_validator.validate_driver(&driver)?;
        self.ensure_driver_unique(&driver).await?;

        self.storage.save_driver(&driver).await?;
        info!(
            driver_id = %driver.id,
            organization_id = %driver.organization_id,
            vehicle_number = driver.vehicle_number.as_deref().unwrap_or("-"),
            "Driver registered"
        );
        Ok(driver)
    }

    /// Update a driver's profile; availability and location are left alone
    pub async fn update_driver(
        &mut self,
        scope: &RequestScope,
        driver_id: &str,
        input: &DriverInput,
    ) -> LedgerResult<Driver> {
        scope.require_office("driver registry")?;

        let mut driver = self.get_driver_required(scope, driver_id).await?;
        input.apply_to(&mut driver);
        driver.updated_at = chrono::Utc::now().naive_utc();

        self.driver_validator.validate_driver(&driver)?;
        self.ensure_driver_unique(&driver).await?;

        self.storage.update_driver(&driver).await?;
        info!(driver_id = %driver.id, "Driver updated");
        Ok(driver)
    }

    /// Get a driver by ID
    pub async fn get_driver(&self, scope: &RequestScope, driver_id: &str) -> LedgerResult<Option<Driver>> {
        self.storage
            .get_driver(&scope.organization_id, driver_id)
            .await
    }

    /// Get a driver by ID, returning an error if not found
    pub async fn get_driver_required(&self, scope: &RequestScope, driver_id: &str) -> LedgerResult<Driver> {
        let driver = self
            .get_driver(scope, driver_id)
            .await?
            .ok_or_else(|| LedgerError::DriverNotFound(driver_id.to_string()))?;
        scope.ensure_owns(&driver.organization_id)?;
        Ok(driver)
    }

    /// List drivers of the organization, optionally by availability
    pub async fn list_drivers(
        &self,
        scope: &RequestScope,
        status: Option<DriverStatus>,
    ) -> LedgerResult<Vec<Driver>> {
        let mut drivers = self.storage.list_drivers(&scope.organization_id).await?;
        if let Some(status) = status {
            drivers.retain(|d| d.status == status);
        }
        drivers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(drivers)
    }

    /// Import drivers row by row; a bad row never aborts the batch
    pub async fn import_drivers(
        &mut self,
        scope: &RequestScope,
        rows: &[DriverInput],
    ) -> LedgerResult<ImportReport> {
        scope.require_office("driver import")?;

        let mut report = ImportReport::default();
        for (index, input) in rows.iter().enumerate() {
            let result = self.create_driver(scope, input).await.map(|d| d.id);
            report.record(index + 1, result);
        }
        info!(
            organization_id = %scope.organization_id,
            created = report.created,
            rejected = report.rejected,
            "Driver import finished"
        );
        Ok(report)
    }

    /// Record a driver's position and broadcast it.
    ///
    /// Drivers may only report their own position.
    pub async fn update_driver_location(
        &mut self,
        scope: &RequestScope,
        driver_id: &str,
        lat: f64,
        lng: f64,
    ) -> LedgerResult<Driver> {
        if scope.role == Role::Driver && scope.actor_id != driver_id {
            return Err(LedgerError::Forbidden {
                role: scope.role.to_string(),
                field: "location".to_string(),
            });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(LedgerError::validation("lat", "must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(LedgerError::validation("lng", "must be between -180 and 180"));
        }

        let mut driver = self.get_driver_required(scope, driver_id).await?;
        driver.current_location = Some(GeoPoint { lat, lng });
        driver.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_driver(&driver).await?;

        debug!(driver_id, lat, lng, "Driver location updated");
        self.sink.publish(DriverStatusUpdate::from_driver(&driver));
        Ok(driver)
    }

    /// Phone and vehicle number are each unique within an organization
    async fn ensure_driver_unique(&self, driver: &Driver) -> LedgerResult<()> {
        let existing = self.storage.list_drivers(&driver.organization_id).await?;
        let others = existing.iter().filter(|d| d.id != driver.id);

        for other in others {
            if other.phone == driver.phone {
                return Err(LedgerError::Duplicate {
                    entity: "driver",
                    field: "phone",
                    value: driver.phone.clone(),
                });
            }
            if let (Some(mine), Some(theirs)) = (&driver.vehicle_number, &other.vehicle_number) {
                if mine == theirs {
                    return Err(LedgerError::Duplicate {
                        entity: "driver",
                        field: "vehicle_number",
                        value: mine.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
