//! Request scoping: tenant filter and role-based field access

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::*;

/// Role of the actor making a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Staff,
    /// Office staff who may not see or change the commission section
    RestrictedStaff,
    Driver,
}

impl Role {
    /// Whether the commission/profit section is visible and writable
    pub fn sees_profit(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }

    /// Office roles may submit trip forms and manage the registry
    pub fn is_office(&self) -> bool {
        !matches!(self, Role::Driver)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "ADMIN",
            Role::Staff => "STAFF",
            Role::RestrictedStaff => "RESTRICTED_STAFF",
            Role::Driver => "DRIVER",
        };
        f.write_str(s)
    }
}

/// Organization filter and actor identity supplied by the auth layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestScope {
    pub organization_id: String,
    pub role: Role,
    /// User id for office roles, driver id for the driver role
    pub actor_id: String,
}

impl RequestScope {
    pub fn new(organization_id: impl Into<String>, role: Role, actor_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            role,
            actor_id: actor_id.into(),
        }
    }

    pub fn admin(organization_id: impl Into<String>) -> Self {
        Self::new(organization_id, Role::Admin, "admin")
    }

    /// Reject any entity that belongs to a different organization
    pub fn ensure_owns(&self, entity_organization_id: &str) -> LedgerResult<()> {
        if self.organization_id != entity_organization_id {
            return Err(LedgerError::ScopeViolation {
                expected: self.organization_id.clone(),
                actual: entity_organization_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn require_office(&self, action: &str) -> LedgerResult<()> {
        if !self.role.is_office() {
            return Err(LedgerError::Forbidden {
                role: self.role.to_string(),
                field: action.to_string(),
            });
        }
        Ok(())
    }

    pub fn require_admin(&self, action: &str) -> LedgerResult<()> {
        if self.role != Role::Admin {
            return Err(LedgerError::Forbidden {
                role: self.role.to_string(),
                field: action.to_string(),
            });
        }
        Ok(())
    }

    /// Hide the commission section from roles that may not see it.
    ///
    /// Net driver keeps is derived from the to-pay commission, so it goes too.
    /// Hire value and gross stay: both come from rates the same role enters.
    pub fn redact(&self, mut trip: Trip) -> Trip {
        if !self.role.sees_profit() {
            let zero = bigdecimal::BigDecimal::from(0);
            trip.balances.commission = zero.clone();
            trip.balances.net_driver_keeps = zero.clone();
            trip.costing.to_pay.to_pay_commission = zero.clone();
            trip.costing.to_pay.to_pay_pending_commission = zero;
            trip.profit_redacted = true;
        }
        trip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    #[test]
    fn test_scope_violation() {
        let scope = RequestScope::admin("org1");
        assert!(scope.ensure_owns("org1").is_ok());
        assert!(matches!(
            scope.ensure_owns("org2"),
            Err(LedgerError::ScopeViolation { .. })
        ));
    }

    #[test]
    fn test_restricted_staff_sees_redacted_trip() {
        let mut trip = Trip::new(
            "t1".into(),
            "org1".into(),
            TripKind::Logistics,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        trip.balances.commission = BigDecimal::from(5500);
        trip.costing.to_pay.to_pay_commission = BigDecimal::from(800);
        trip.balances.net_driver_keeps = BigDecimal::from(8200);

        let restricted = RequestScope::new("org1", Role::RestrictedStaff, "u2");
        let redacted = restricted.redact(trip.clone());
        assert!(redacted.profit_redacted);
        assert_eq!(redacted.balances.commission, BigDecimal::from(0));
        assert_eq!(redacted.costing.to_pay.to_pay_commission, BigDecimal::from(0));
        assert_eq!(redacted.balances.net_driver_keeps, BigDecimal::from(0));

        let staff = RequestScope::new("org1", Role::Staff, "u1");
        assert_eq!(staff.redact(trip.clone()), trip);
    }

    #[test]
    fn test_driver_is_not_office() {
        let scope = RequestScope::new("org1", Role::Driver, "d1");
        assert!(matches!(
            scope.require_office("trip form"),
            Err(LedgerError::Forbidden { .. })
        ));
    }
}
