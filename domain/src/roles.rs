use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The roles a caller can hold. The upstream authentication layer decides
/// which one applies to a request.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Organizer,
    FacultyAdmin,
    SystemAdmin,
}

/// Privileged operations. Anything not listed here is open to every role,
/// such as issuing a credential for oneself or opening a live session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Scan,
    /// Create an attendance record on scan even when the activity forbids self-registration.
    ForceRegister,
    Revoke,
    /// Rotate another subject's secret. Subjects may always rotate their own.
    RotateSecret,
    PublishAlert,
    PublishEvent,
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Student => &[],
            Role::Organizer => &[Scan, PublishEvent],
            Role::FacultyAdmin => &[Scan, ForceRegister, Revoke, RotateSecret, PublishEvent],
            Role::SystemAdmin => &[
                Scan,
                ForceRegister,
                Revoke,
                RotateSecret,
                PublishAlert,
                PublishEvent,
            ],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn require(&self, capability: Capability) -> Result<(), Error> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "role {self} lacks capability {capability:?}"
            )))
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(fmt, "student"),
            Role::Organizer => write!(fmt, "organizer"),
            Role::FacultyAdmin => write!(fmt, "faculty_admin"),
            Role::SystemAdmin => write!(fmt, "system_admin"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(role: &str) -> Result<Self, Self::Err> {
        match role.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "organizer" => Ok(Role::Organizer),
            "faculty_admin" => Ok(Role::FacultyAdmin),
            "system_admin" => Ok(Role::SystemAdmin),
            other => Err(Error::invalid(format!("unknown role {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainErrorKind, InternalErrorKind};

    #[test]
    fn test_students_hold_no_capabilities() {
        assert!(Role::Student.capabilities().is_empty());
        assert!(!Role::Student.can(Capability::Scan));
    }

    #[test]
    fn test_only_system_admins_publish_alerts() {
        for role in [Role::Student, Role::Organizer, Role::FacultyAdmin] {
            assert!(!role.can(Capability::PublishAlert));
        }
        assert!(Role::SystemAdmin.can(Capability::PublishAlert));
    }

    #[test]
    fn test_organizers_scan_but_cannot_force_register() {
        assert!(Role::Organizer.can(Capability::Scan));
        let err = Role::Organizer
            .require(Capability::ForceRegister)
            .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Forbidden)
        );
    }

    #[test]
    fn test_role_names_parse_back() {
        for role in [
            Role::Student,
            Role::Organizer,
            Role::FacultyAdmin,
            Role::SystemAdmin,
        ] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("dean".parse::<Role>().is_err());
    }
}
