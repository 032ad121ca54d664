//! Caller identity and tenant scoping.
//!
//! Authentication happens outside this process; every request carries the
//! already-verified caller. The functions here are the single place that
//! decides which school a caller may act on.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    SchoolAdmin,
    Teacher,
    Accountant,
    IctOfficer,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::SchoolAdmin => "school_admin",
            Role::Teacher => "teacher",
            Role::Accountant => "accountant",
            Role::IctOfficer => "ict_officer",
            Role::Parent => "parent",
        }
    }
}

pub const ADMIN_ROLES: &[Role] = &[Role::SuperAdmin, Role::SchoolAdmin];
pub const GRADE_WRITER_ROLES: &[Role] = &[Role::SuperAdmin, Role::SchoolAdmin, Role::Teacher];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub role: Role,
    #[serde(default)]
    pub school_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Caller {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

/// Picks the school an operation runs against.
///
/// A super-admin must name the school explicitly. Everyone else is pinned to
/// their own school; naming another one is rejected rather than ignored.
pub fn resolve_effective_school(caller: &Caller, requested: Option<&str>) -> CoreResult<String> {
    let requested = requested.map(str::trim).filter(|s| !s.is_empty());
    if caller.is_super_admin() {
        return requested
            .map(str::to_string)
            .ok_or_else(|| CoreError::Validation("schoolId is required".into()));
    }

    let Some(own) = caller.school_id.as_deref() else {
        return Err(CoreError::Forbidden("caller is not attached to a school".into()));
    };
    match requested {
        Some(other) if other != own => Err(CoreError::Forbidden(
            "you do not have permission to access another school".into(),
        )),
        _ => Ok(own.to_string()),
    }
}

pub fn ensure_school_access(caller: &Caller, owner_school_id: &str) -> CoreResult<()> {
    if caller.is_super_admin() || caller.school_id.as_deref() == Some(owner_school_id) {
        return Ok(());
    }
    Err(CoreError::Forbidden(
        "you do not have permission to access this school's records".into(),
    ))
}

pub fn require_role(caller: &Caller, allowed: &[Role], action: &str) -> CoreResult<()> {
    if allowed.contains(&caller.role) {
        return Ok(());
    }
    Err(CoreError::Forbidden(format!(
        "role {} may not {}",
        caller.role.as_str(),
        action
    )))
}

#[cfg(test)]
pub(crate) fn caller(role: Role, school_id: Option<&str>) -> Caller {
    Caller {
        role,
        school_id: school_id.map(str::to_string),
        user_id: Some(format!("user-{}", role.as_str())),
    }
}
