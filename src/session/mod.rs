// Session module
// Resolves the identity of a tab on load and exposes it as read-only state

mod bootstrap;

pub use bootstrap::SessionBootstrap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::Role;
use crate::utils::string_or_number;

/// The role-specific application a tab loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Portal {
    role: Role,
}

impl Portal {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn expected_role(&self) -> Role {
        self.role
    }

    /// Whether an identity with `role` may use this portal
    pub fn admits(&self, role: Role) -> bool {
        self.role == role
    }
}

/// Current-identity payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !full.is_empty() {
            full
        } else if let Some(ref email) = self.email {
            email.clone()
        } else {
            format!("user {}", self.id)
        }
    }
}

/// Read-only session state derived by the bootstrap
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub is_loading: bool,
    pub is_authenticated: bool,
}

impl SessionState {
    pub fn loading() -> Self {
        Self {
            identity: None,
            is_loading: true,
            is_authenticated: false,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            identity: None,
            is_loading: false,
            is_authenticated: false,
        }
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            is_loading: false,
            is_authenticated: true,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::loading()
    }
}
