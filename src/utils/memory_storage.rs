//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

/// In-memory storage implementation for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    trips: Arc<RwLock<HashMap<String, Trip>>>,
    consignors: Arc<RwLock<HashMap<String, Consignor>>>,
    drivers: Arc<RwLock<HashMap<String, Driver>>>,
    hand_loans: Arc<RwLock<HashMap<String, HandLoan>>>,
    fail_driver_status: Arc<AtomicBool>,
}

fn read<T>(lock: &RwLock<T>) -> LedgerResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> LedgerResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))
}

fn scoped<T: Clone>(
    map: &HashMap<String, T>,
    id: &str,
    organization_id: &str,
    org_of: impl Fn(&T) -> &str,
) -> Option<T> {
    map.get(id)
        .filter(|item| org_of(item) == organization_id)
        .cloned()
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        write(&self.trips)?.clear();
        write(&self.consignors)?.clear();
        write(&self.drivers)?.clear();
        write(&self.hand_loans)?.clear();
        Ok(())
    }

    /// Make driver status writes fail, to exercise the reconciliation path
    pub fn fail_driver_status_writes(&self, fail: bool) {
        self.fail_driver_status.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn save_trip(&mut self, trip: &Trip) -> LedgerResult<()> {
        let mut trips = write(&self.trips)?;
        if trips.contains_key(&trip.id) {
            return Err(LedgerError::Storage(format!(
                "trip '{}' already exists",
                trip.id
            )));
        }
        trips.insert(trip.id.clone(), trip.clone());
        Ok(())
    }

    async fn get_trip(&self, organization_id: &str, trip_id: &str) -> LedgerResult<Option<Trip>> {
        let trips = read(&self.trips)?;
        Ok(scoped(&*trips, trip_id, organization_id, |t| t.organization_id.as_str()))
    }

    async fn list_trips(&self, organization_id: &str, filter: &TripFilter) -> LedgerResult<Vec<Trip>> {
        let trips = read(&self.trips)?;
        let mut filtered: Vec<Trip> = trips
            .values()
            .filter(|trip| trip.organization_id == organization_id && filter.matches(trip))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.trip_date.cmp(&b.trip_date).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            filtered.truncate(limit);
        }
        Ok(filtered)
    }

    async fn update_trip(&mut self, trip: &Trip, expected_version: u64) -> LedgerResult<Trip> {
        let mut trips = write(&self.trips)?;
        let stored = trips
            .get_mut(&trip.id)
            .filter(|t| t.organization_id == trip.organization_id)
            .ok_or_else(|| LedgerError::TripNotFound(trip.id.clone()))?;

        if stored.version != expected_version {
            return Err(LedgerError::Conflict {
                trip_id: trip.id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut next = trip.clone();
        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete_trip(&mut self, organization_id: &str, trip_id: &str) -> LedgerResult<()> {
        let mut trips = write(&self.trips)?;
        let owned = trips
            .get(trip_id)
            .is_some_and(|t| t.organization_id == organization_id);
        if !owned {
            return Err(LedgerError::TripNotFound(trip_id.to_string()));
        }
        trips.remove(trip_id);
        Ok(())
    }

    async fn save_consignor(&mut self, consignor: &Consignor) -> LedgerResult<()> {
        let mut consignors = write(&self.consignors)?;
        if consignors.contains_key(&consignor.id) {
            return Err(LedgerError::Storage(format!(
                "consignor '{}' already exists",
                consignor.id
            )));
        }
        consignors.insert(consignor.id.clone(), consignor.clone());
        Ok(())
    }

    async fn get_consignor(
        &self,
        organization_id: &str,
        consignor_id: &str,
    ) -> LedgerResult<Option<Consignor>> {
        let consignors = read(&self.consignors)?;
        Ok(scoped(&*consignors, consignor_id, organization_id, |c| {
            c.organization_id.as_str()
        }))
    }

    async fn list_consignors(&self, organization_id: &str) -> LedgerResult<Vec<Consignor>> {
        let consignors = read(&self.consignors)?;
        let mut filtered: Vec<Consignor> = consignors
            .values()
            .filter(|c| c.organization_id == organization_id)
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(filtered)
    }

    async fn update_consignor(&mut self, consignor: &Consignor) -> LedgerResult<()> {
        let mut consignors = write(&self.consignors)?;
        match consignors.get_mut(&consignor.id) {
            Some(stored) if stored.organization_id == consignor.organization_id => {
                *stored = consignor.clone();
                Ok(())
            }
            _ => Err(LedgerError::ConsignorNotFound(consignor.id.clone())),
        }
    }

    async fn save_driver(&mut self, driver: &Driver) -> LedgerResult<()> {
        let mut drivers = write(&self.drivers)?;
        if drivers.contains_key(&driver.id) {
            return Err(LedgerError::Storage(format!(
                "driver '{}' already exists",
                driver.id
            )));
        }
        drivers.insert(driver.id.clone(), driver.clone());
        Ok(())
    }

    async fn get_driver(&self, organization_id: &str, driver_id: &str) -> LedgerResult<Option<Driver>> {
        let drivers = read(&self.drivers)?;
        Ok(scoped(&*drivers, driver_id, organization_id, |d| {
            d.organization_id.as_str()
        }))
    }

    async fn list_drivers(&self, organization_id: &str) -> LedgerResult<Vec<Driver>> {
        let drivers = read(&self.drivers)?;
        let mut filtered: Vec<Driver> = drivers
            .values()
            .filter(|d| d.organization_id == organization_id)
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(filtered)
    }

    async fn update_driver(&mut self, driver: &Driver) -> LedgerResult<()> {
        let mut drivers = write(&self.drivers)?;
        match drivers.get_mut(&driver.id) {
            Some(stored) if stored.organization_id == driver.organization_id => {
                *stored = driver.clone();
                Ok(())
            }
            _ => Err(LedgerError::DriverNotFound(driver.id.clone())),
        }
    }

    async fn set_driver_status(
        &mut self,
        organization_id: &str,
        driver_id: &str,
        status: DriverStatus,
    ) -> LedgerResult<Driver> {
        if self.fail_driver_status.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage(format!(
                "driver status write failed for '{}'",
                driver_id
            )));
        }

        let mut drivers = write(&self.drivers)?;
        match drivers.get_mut(driver_id) {
            Some(driver) if driver.organization_id == organization_id => {
                driver.status = status;
                driver.updated_at = chrono::Utc::now().naive_utc();
                Ok(driver.clone())
            }
            _ => Err(LedgerError::DriverNotFound(driver_id.to_string())),
        }
    }

    async fn save_hand_loan(&mut self, loan: &HandLoan) -> LedgerResult<()> {
        let mut loans = write(&self.hand_loans)?;
        if loans.contains_key(&loan.id) {
            return Err(LedgerError::Storage(format!(
                "hand loan '{}' already exists",
                loan.id
            )));
        }
        loans.insert(loan.id.clone(), loan.clone());
        Ok(())
    }

    async fn get_hand_loan(&self, organization_id: &str, loan_id: &str) -> LedgerResult<Option<HandLoan>> {
        let loans = read(&self.hand_loans)?;
        Ok(scoped(&*loans, loan_id, organization_id, |l| l.organization_id.as_str()))
    }

    async fn list_hand_loans(
        &self,
        organization_id: &str,
        filter: &HandLoanFilter,
    ) -> LedgerResult<Vec<HandLoan>> {
        let loans = read(&self.hand_loans)?;
        let mut filtered: Vec<HandLoan> = loans
            .values()
            .filter(|l| l.organization_id == organization_id && filter.matches(l))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(filtered)
    }

    async fn update_hand_loan(&mut self, loan: &HandLoan) -> LedgerResult<()> {
        let mut loans = write(&self.hand_loans)?;
        match loans.get_mut(&loan.id) {
            Some(stored) if stored.organization_id == loan.organization_id => {
                *stored = loan.clone();
                Ok(())
            }
            _ => Err(LedgerError::HandLoanNotFound(loan.id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trip(id: &str, org: &str) -> Trip {
        Trip::new(
            id.to_string(),
            org.to_string(),
            TripKind::Logistics,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_reads_are_tenant_scoped() {
        let mut storage = MemoryStorage::new();
        storage.save_trip(&trip("t1", "org1")).await.unwrap();

        assert!(storage.get_trip("org1", "t1").await.unwrap().is_some());
        assert!(storage.get_trip("org2", "t1").await.unwrap().is_none());
        assert!(storage
            .list_trips("org2", &TripFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_trip_rejects_stale_version() {
        let mut storage = MemoryStorage::new();
        let original = trip("t1", "org1");
        storage.save_trip(&original).await.unwrap();

        let stored = storage.update_trip(&original, 0).await.unwrap();
        assert_eq!(stored.version, 1);

        let err = storage.update_trip(&original, 0).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Conflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_cross_tenant_delete_is_not_found() {
        let mut storage = MemoryStorage::new();
        storage.save_trip(&trip("t1", "org1")).await.unwrap();
        assert!(matches!(
            storage.delete_trip("org2", "t1").await,
            Err(LedgerError::TripNotFound(_))
        ));
        assert!(storage.delete_trip("org1", "t1").await.is_ok());
    }

    #[tokio::test]
    async fn test_driver_status_failure_injection() {
        let mut storage = MemoryStorage::new();
        let driver = Driver::new("d1".into(), "org1".into(), "Murugan".into(), "9840012345".into());
        storage.save_driver(&driver).await.unwrap();

        storage.fail_driver_status_writes(true);
        assert!(storage
            .set_driver_status("org1", "d1", DriverStatus::Busy)
            .await
            .is_err());

        storage.fail_driver_status_writes(false);
        let updated = storage
            .set_driver_status("org1", "d1", DriverStatus::Busy)
            .await
            .unwrap();
        assert_eq!(updated.status, DriverStatus::Busy);
    }
}
