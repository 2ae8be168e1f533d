//! Trip status state machine and its driver availability side effects

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::scope::{RequestScope, Role};
use crate::types::*;

/// Explicit status change requested for a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub to: TripStatus,
    /// Required when completing a taxi trip
    #[serde(default)]
    pub completion: Option<CompletionMetrics>,
    /// When set, the write is rejected if the trip moved past this version
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl TransitionRequest {
    pub fn to(status: TripStatus) -> Self {
        Self {
            to: status,
            completion: None,
            expected_version: None,
        }
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn complete_with(total_distance_km: BigDecimal, total_hours: BigDecimal) -> Self {
        Self {
            to: TripStatus::Completed,
            completion: Some(CompletionMetrics {
                total_distance_km: Some(total_distance_km),
                total_hours: Some(total_hours),
            }),
            expected_version: None,
        }
    }
}

/// Driver availability change implied by a trip write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEffect {
    pub driver_id: String,
    pub status: DriverStatus,
}

/// Whether the lifecycle graph has an edge `from -> to` for this kind of trip
pub fn can_transition(kind: TripKind, from: TripStatus, to: TripStatus) -> bool {
    use TripStatus::*;

    if from.is_terminal() {
        return false;
    }

    match to {
        Cancelled => true,
        Completed => match kind {
            TripKind::Taxi => matches!(from, Started | Unloaded),
            // Office-managed lorry trips are closed from the status field directly
            TripKind::Logistics => from != Draft,
        },
        _ => matches!(
            (from, to),
            (Draft, Pending)
                | (Pending, Assigned)
                | (Assigned, Pending)
                | (Assigned, Accepted)
                | (Accepted, Started)
                | (Started, Loading)
                | (Loading, InTransit)
                | (InTransit, Unloaded)
        ),
    }
}

/// Statuses a driver may move their own trip into
pub fn is_driver_initiated(kind: TripKind, to: TripStatus) -> bool {
    use TripStatus::*;
    match to {
        Accepted | Started | Loading | InTransit | Unloaded => true,
        Completed => kind == TripKind::Taxi,
        _ => false,
    }
}

/// Check a requested transition against the graph, the actor, and the trip's data
pub fn validate_transition(
    scope: &RequestScope,
    trip: &Trip,
    request: &TransitionRequest,
) -> LedgerResult<()> {
    if scope.role == Role::Driver {
        let own_trip = trip.driver_id.as_deref() == Some(scope.actor_id.as_str());
        if !own_trip || !is_driver_initiated(trip.kind, request.to) {
            return Err(LedgerError::Forbidden {
                role: scope.role.to_string(),
                field: format!("status {}", request.to),
            });
        }
    }

    if !can_transition(trip.kind, trip.status, request.to) {
        return Err(LedgerError::InvalidTransition {
            from: trip.status,
            to: request.to,
        });
    }

    if request.to == TripStatus::Assigned && !trip.has_vehicle_data() {
        return Err(LedgerError::validation(
            "driver_id",
            "a driver or lorry is required to assign a trip",
        ));
    }

    if request.to == TripStatus::Completed && trip.kind == TripKind::Taxi {
        validate_completion_metrics(request.completion.as_ref())?;
    }

    Ok(())
}

fn validate_completion_metrics(metrics: Option<&CompletionMetrics>) -> LedgerResult<()> {
    let zero = BigDecimal::from(0);
    let metrics = metrics.ok_or_else(|| {
        LedgerError::validation("completion", "total distance and hours are required")
    })?;

    match metrics.total_distance_km {
        Some(ref km) if *km >= zero => {}
        Some(_) => return Err(LedgerError::validation("total_distance_km", "cannot be negative")),
        None => return Err(LedgerError::validation("total_distance_km", "is required")),
    }
    match metrics.total_hours {
        Some(ref hours) if *hours >= zero => {}
        Some(_) => return Err(LedgerError::validation("total_hours", "cannot be negative")),
        None => return Err(LedgerError::validation("total_hours", "is required")),
    }

    Ok(())
}

/// Apply an already validated transition to the trip
pub fn apply_transition(trip: &mut Trip, request: TransitionRequest) {
    if trip.status == TripStatus::Assigned && request.to == TripStatus::Pending {
        // unassigning releases the vehicle, otherwise auto-assign would put it straight back
        trip.driver_id = None;
        trip.vehicle = None;
    }
    if request.completion.is_some() {
        trip.completion = request.completion;
    }
    trip.status = request.to;
}

/// Move a pending trip to ASSIGNED once a driver or lorry is attached.
///
/// Returns whether the status changed. Runs after every trip mutation.
pub fn try_auto_assign(trip: &mut Trip) -> bool {
    if trip.status == TripStatus::Pending && trip.has_vehicle_data() {
        trip.status = TripStatus::Assigned;
        return true;
    }
    false
}

/// Driver availability changes needed to go from one trip state to the next.
///
/// A driver released by the trip goes back ONLINE; a newly engaged driver
/// becomes BUSY.
pub fn driver_effects(before: Option<&Trip>, after: Option<&Trip>) -> Vec<DriverEffect> {
    let held_before = before.and_then(Trip::engaged_driver);
    let held_after = after.and_then(Trip::engaged_driver);

    let mut effects = Vec::new();
    if held_before == held_after {
        return effects;
    }
    if let Some(driver_id) = held_before {
        effects.push(DriverEffect {
            driver_id: driver_id.to_string(),
            status: DriverStatus::Online,
        });
    }
    if let Some(driver_id) = held_after {
        effects.push(DriverEffect {
            driver_id: driver_id.to_string(),
            status: DriverStatus::Busy,
        });
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trip(kind: TripKind, status: TripStatus) -> Trip {
        let mut trip = Trip::new(
            "t1".into(),
            "org1".into(),
            kind,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        trip.status = status;
        trip
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for from in [
            TripStatus::Draft,
            TripStatus::Pending,
            TripStatus::Assigned,
            TripStatus::Started,
            TripStatus::InTransit,
        ] {
            assert!(can_transition(TripKind::Taxi, from, TripStatus::Cancelled));
        }
        assert!(!can_transition(TripKind::Taxi, TripStatus::Completed, TripStatus::Cancelled));
        assert!(!can_transition(TripKind::Logistics, TripStatus::Cancelled, TripStatus::Pending));
    }

    #[test]
    fn test_started_requires_accepted() {
        assert!(!can_transition(TripKind::Taxi, TripStatus::Assigned, TripStatus::Started));
        assert!(can_transition(TripKind::Taxi, TripStatus::Accepted, TripStatus::Started));
    }

    #[test]
    fn test_completion_paths_differ_by_kind() {
        assert!(!can_transition(TripKind::Taxi, TripStatus::Assigned, TripStatus::Completed));
        assert!(can_transition(TripKind::Taxi, TripStatus::Started, TripStatus::Completed));
        assert!(can_transition(TripKind::Logistics, TripStatus::Assigned, TripStatus::Completed));
        assert!(!can_transition(TripKind::Logistics, TripStatus::Draft, TripStatus::Completed));
    }

    #[test]
    fn test_taxi_completion_requires_metrics() {
        let scope = RequestScope::admin("org1");
        let started = trip(TripKind::Taxi, TripStatus::Started);

        let err = validate_transition(&scope, &started, &TransitionRequest::to(TripStatus::Completed))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));

        let with_metrics = TransitionRequest::complete_with(BigDecimal::from(42), BigDecimal::from(3));
        assert!(validate_transition(&scope, &started, &with_metrics).is_ok());
    }

    #[test]
    fn test_driver_may_only_move_own_trip() {
        let mut assigned = trip(TripKind::Taxi, TripStatus::Assigned);
        assigned.driver_id = Some("d1".into());

        let own = RequestScope::new("org1", Role::Driver, "d1");
        assert!(validate_transition(&own, &assigned, &TransitionRequest::to(TripStatus::Accepted)).is_ok());
        assert!(matches!(
            validate_transition(&own, &assigned, &TransitionRequest::to(TripStatus::Cancelled)),
            Err(LedgerError::Forbidden { .. })
        ));

        let other = RequestScope::new("org1", Role::Driver, "d2");
        assert!(matches!(
            validate_transition(&other, &assigned, &TransitionRequest::to(TripStatus::Accepted)),
            Err(LedgerError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_auto_assign_from_data_presence() {
        let mut pending = trip(TripKind::Logistics, TripStatus::Pending);
        assert!(!try_auto_assign(&mut pending));

        pending.vehicle = Some(AdHocVehicle {
            lorry_name: Some("TN38 AB 1234".into()),
            ..AdHocVehicle::default()
        });
        assert!(try_auto_assign(&mut pending));
        assert_eq!(pending.status, TripStatus::Assigned);

        let mut draft = trip(TripKind::Logistics, TripStatus::Draft);
        draft.driver_id = Some("d1".into());
        assert!(!try_auto_assign(&mut draft));
    }

    #[test]
    fn test_unassign_clears_vehicle() {
        let mut assigned = trip(TripKind::Logistics, TripStatus::Assigned);
        assigned.driver_id = Some("d1".into());
        apply_transition(&mut assigned, TransitionRequest::to(TripStatus::Pending));
        assert_eq!(assigned.status, TripStatus::Pending);
        assert!(assigned.driver_id.is_none());
        assert!(!try_auto_assign(&mut assigned));
    }

    #[test]
    fn test_driver_effects() {
        let mut assigned = trip(TripKind::Taxi, TripStatus::Assigned);
        assigned.driver_id = Some("d1".into());
        let pending = trip(TripKind::Taxi, TripStatus::Pending);

        assert_eq!(
            driver_effects(Some(&pending), Some(&assigned)),
            vec![DriverEffect {
                driver_id: "d1".into(),
                status: DriverStatus::Busy
            }]
        );

        let mut completed = assigned.clone();
        completed.status = TripStatus::Completed;
        assert_eq!(
            driver_effects(Some(&assigned), Some(&completed)),
            vec![DriverEffect {
                driver_id: "d1".into(),
                status: DriverStatus::Online
            }]
        );

        let mut reassigned = assigned.clone();
        reassigned.driver_id = Some("d2".into());
        let effects = driver_effects(Some(&assigned), Some(&reassigned));
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[0].status, DriverStatus::Online);
        assert_eq!(effects[1].driver_id, "d2");

        assert!(driver_effects(Some(&assigned), Some(&assigned)).is_empty());
    }
}
