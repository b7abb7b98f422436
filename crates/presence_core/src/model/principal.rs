//! Authenticated caller as handed over by the external login layer.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Stable identifier of an authenticated principal.
pub type IdentityId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Employee => "employee",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "employee" => Ok(Self::Employee),
            other => Err(format!("unknown role `{other}`; expected admin|employee")),
        }
    }
}

/// Identity already authenticated by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: IdentityId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<IdentityId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn admin(id: impl Into<IdentityId>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn employee(id: impl Into<IdentityId>) -> Self {
        Self::new(id, Role::Employee)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
