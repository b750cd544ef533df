use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Role supplied by the authentication layer for the current caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Department-level administrator; the only role allowed to archive or purge evidence.
    Administrator,
    /// Manager of a healthcare unit.
    UnitManager,
    /// Individual practitioner.
    Practitioner,
    /// Read-only reviewer.
    Auditor,
}

impl UserRole {
    /// Returns a stable storage value for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::UnitManager => "unit_manager",
            Self::Practitioner => "practitioner",
            Self::Auditor => "auditor",
        }
    }

    /// Returns whether the role may run evidence archival and purge operations.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Administrator)
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "administrator" => Ok(Self::Administrator),
            "unit_manager" => Ok(Self::UnitManager),
            "practitioner" => Ok(Self::Practitioner),
            "auditor" => Ok(Self::Auditor),
            _ => Err(AppError::Validation(format!("unknown user role '{value}'"))),
        }
    }
}

/// User information persisted in the authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    subject: String,
    display_name: String,
    email: Option<String>,
    role: UserRole,
}

impl UserIdentity {
    /// Creates a user identity from authentication data.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        display_name: impl Into<String>,
        email: Option<String>,
        role: UserRole,
    ) -> Self {
        Self {
            subject: subject.into(),
            display_name: display_name.into(),
            email,
            role,
        }
    }

    /// Returns the stable subject claim from the identity provider.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the display name for the current user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the email, if the provider returned one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the role granted to the identity.
    #[must_use]
    pub fn role(&self) -> UserRole {
        self.role
    }
}
