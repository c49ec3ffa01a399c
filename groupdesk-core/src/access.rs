//! Role based access control.
//!
//! Roles map to a fixed capability table; handlers and services ask for a
//! capability, never compare role strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ManageAgencies,
    ViewAgency,
    ManageUsers,
    ManageFlightGroups,
    ViewFlightGroups,
    HoldSeats,
    ConfirmHolds,
    ReleaseHolds,
    ExpireHolds,
}

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::ManageAgencies,
    Capability::ViewAgency,
    Capability::ManageUsers,
    Capability::ManageFlightGroups,
    Capability::ViewFlightGroups,
    Capability::HoldSeats,
    Capability::ConfirmHolds,
    Capability::ReleaseHolds,
    Capability::ExpireHolds,
];

const MANAGER_CAPABILITIES: &[Capability] = &[
    Capability::ViewAgency,
    Capability::ManageUsers,
    Capability::ManageFlightGroups,
    Capability::ViewFlightGroups,
    Capability::HoldSeats,
    Capability::ConfirmHolds,
    Capability::ReleaseHolds,
];

const SUB_AGENT_CAPABILITIES: &[Capability] = &[
    Capability::ViewAgency,
    Capability::ViewFlightGroups,
    Capability::HoldSeats,
    Capability::ConfirmHolds,
    Capability::ReleaseHolds,
];

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Admin => ADMIN_CAPABILITIES,
            Role::Manager => MANAGER_CAPABILITIES,
            Role::SubAgent => SUB_AGENT_CAPABILITIES,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Roles a user holding `self` may hand out when creating logins.
    pub fn can_grant(&self, role: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::Manager => role != Role::Admin,
            Role::SubAgent => false,
        }
    }
}

/// A pre-validated caller. Built from a verified token; the core trusts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub agency_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, agency_id: Uuid, role: Role) -> Self {
        Self { user_id, agency_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn authorize(&self, capability: Capability) -> CoreResult<()> {
        if self.role.allows(capability) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "role {} lacks {:?}",
                self.role, capability
            )))
        }
    }

    /// Tenancy scoping: own agency only, unless ADMIN.
    pub fn can_access_agency(&self, agency_id: Uuid) -> bool {
        self.is_admin() || self.agency_id == agency_id
    }

    pub fn ensure_agency(&self, agency_id: Uuid) -> CoreResult<()> {
        if self.can_access_agency(agency_id) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(
                "resource belongs to another agency".to_string(),
            ))
        }
    }

    /// `authorize` and `ensure_agency` in one call.
    pub fn require(&self, capability: Capability, agency_id: Uuid) -> CoreResult<()> {
        self.authorize(capability)?;
        self.ensure_agency(agency_id)
    }
}
