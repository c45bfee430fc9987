//! Role records, read from the `team_members` table.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Canonical staff roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Admin")]
    Admin,
    #[serde(rename = "Team Member")]
    TeamMember,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::TeamMember => "Team Member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `team_members` row, keyed by the identity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl RoleRecord {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self {
            id,
            name: None,
            email: None,
            role,
            is_active: true,
        }
    }

    /// The role this record grants; inactive members grant none.
    pub fn granted_role(&self) -> Option<Role> {
        self.is_active.then_some(self.role)
    }
}
