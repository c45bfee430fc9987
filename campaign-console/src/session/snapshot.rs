use serde::Serialize;

use crate::models::{Identity, Role, RoleRecord};

/// Point-in-time view of one browser session's sign-in state.
///
/// Written only by the session resolver. `role` is meaningless while
/// `is_loading` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub role: Option<RoleRecord>,
    pub is_loading: bool,
}

impl SessionSnapshot {
    /// State at process start, before the first identity check returns.
    pub fn loading() -> Self {
        Self {
            identity: None,
            role: None,
            is_loading: true,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            identity: None,
            role: None,
            is_loading: false,
        }
    }

    /// Identity known, role lookup not yet settled.
    pub fn resolving(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            role: None,
            is_loading: true,
        }
    }

    pub fn resolved(identity: Identity, role: Option<RoleRecord>) -> Self {
        Self {
            identity: Some(identity),
            role,
            is_loading: false,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        !self.is_loading && self.identity.is_some()
    }

    /// Role usable for authorization: none while loading, none for
    /// inactive members.
    pub fn effective_role(&self) -> Option<Role> {
        if self.is_loading {
            return None;
        }
        self.role.as_ref().and_then(RoleRecord::granted_role)
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::loading()
    }
}
