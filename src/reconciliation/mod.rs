//! Driver availability reconciliation
//!
//! A trip write is the source of truth. When the follow-up driver status
//! flip fails, the desired status is queued here and a reconciliation pass
//! repairs it later, together with a full scan that rebuilds every driver's
//! availability from the trips that currently engage them.
//!
//! Nothing here runs on a timer. The host owns the background pass and calls
//! `DispatchLedger::reconcile_driver_statuses` on its own schedule, for
//! example from a periodic task next to its dashboard refresh.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::traits::*;
use crate::types::*;

/// A driver status write that still has to be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDriverSync {
    pub organization_id: String,
    pub driver_id: String,
    pub desired_status: DriverStatus,
    pub trip_id: String,
    pub last_error: String,
}

/// Shared queue of driver status writes awaiting retry
#[derive(Debug, Clone, Default)]
pub struct ReconciliationQueue {
    pending: Arc<Mutex<VecDeque<PendingDriverSync>>>,
}

impl ReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: PendingDriverSync) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(item);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every queued item belonging to one organization, leaving the rest
    pub fn drain_for(&self, organization_id: &str) -> Vec<PendingDriverSync> {
        let Ok(mut pending) = self.pending.lock() else {
            return Vec::new();
        };
        let (mine, others): (Vec<_>, Vec<_>) = pending
            .drain(..)
            .partition(|item| item.organization_id == organization_id);
        pending.extend(others);
        mine
    }

    pub fn snapshot(&self) -> Vec<PendingDriverSync> {
        self.pending
            .lock()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// One driver whose stored status was corrected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRepair {
    pub driver_id: String,
    pub from: DriverStatus,
    pub to: DriverStatus,
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub organization_id: String,
    pub drivers_checked: usize,
    pub repairs: Vec<DriverRepair>,
    /// Items that failed again and were put back on the queue
    pub still_pending: Vec<PendingDriverSync>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.still_pending.is_empty()
    }
}

/// Brings driver availability back in line with trip statuses
pub struct DriverStatusReconciler<S: LedgerStorage> {
    storage: S,
    queue: ReconciliationQueue,
    sink: Arc<dyn LocationSink>,
}

impl<S: LedgerStorage> DriverStatusReconciler<S> {
    pub fn new(storage: S, queue: ReconciliationQueue, sink: Arc<dyn LocationSink>) -> Self {
        Self {
            storage,
            queue,
            sink,
        }
    }

    /// Status every driver of the organization should have, judged from trips
    async fn expected_busy(&self, organization_id: &str) -> LedgerResult<HashSet<String>> {
        let filter = TripFilter {
            statuses: Some(vec![
                TripStatus::Assigned,
                TripStatus::Accepted,
                TripStatus::Started,
                TripStatus::Loading,
                TripStatus::InTransit,
                TripStatus::Unloaded,
            ]),
            ..TripFilter::default()
        };
        let trips = self.storage.list_trips(organization_id, &filter).await?;
        Ok(trips
            .iter()
            .filter_map(|t| t.engaged_driver().map(str::to_string))
            .collect())
    }

    /// Drain queued writes, then repair any remaining drift for the organization
    pub async fn reconcile(&mut self, organization_id: &str) -> LedgerResult<ReconciliationReport> {
        let busy = self.expected_busy(organization_id).await?;
        let drivers = self.storage.list_drivers(organization_id).await?;

        let mut report = ReconciliationReport {
            organization_id: organization_id.to_string(),
            drivers_checked: drivers.len(),
            ..ReconciliationReport::default()
        };

        // queued items are superseded by the full scan below; only their failures matter
        let queued = self.queue.drain_for(organization_id);
        let mut retried: HashSet<String> = HashSet::new();

        for driver in drivers {
            let desired = if busy.contains(&driver.id) {
                DriverStatus::Busy
            } else if driver.status == DriverStatus::Busy {
                DriverStatus::Online
            } else {
                continue;
            };

            if driver.status == desired {
                continue;
            }

            match self
                .storage
                .set_driver_status(organization_id, &driver.id, desired)
                .await
            {
                Ok(updated) => {
                    info!(
                        driver_id = %driver.id,
                        from = %driver.status,
                        to = %desired,
                        "Driver status reconciled"
                    );
                    self.sink.publish(DriverStatusUpdate::from_driver(&updated));
                    report.repairs.push(DriverRepair {
                        driver_id: driver.id.clone(),
                        from: driver.status,
                        to: desired,
                    });
                }
                Err(e) => {
                    warn!(driver_id = %driver.id, error = %e, "Driver status reconciliation failed");
                    let trip_id = queued
                        .iter()
                        .find(|q| q.driver_id == driver.id)
                        .map(|q| q.trip_id.clone())
                        .unwrap_or_default();
                    let item = PendingDriverSync {
                        organization_id: organization_id.to_string(),
                        driver_id: driver.id.clone(),
                        desired_status: desired,
                        trip_id,
                        last_error: e.to_string(),
                    };
                    self.queue.push(item.clone());
                    report.still_pending.push(item);
                }
            }
            retried.insert(driver.id);
        }

        let dropped = queued
            .iter()
            .filter(|q| !retried.contains(&q.driver_id))
            .count();
        if dropped > 0 {
            info!(
                organization_id,
                dropped, "Queued driver syncs already consistent with trips"
            );
        }

        Ok(report)
    }
}
