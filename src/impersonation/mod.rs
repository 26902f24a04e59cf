// Impersonation module
// A privileged identity temporarily operating as a substitute identity

mod kinds;
mod stack;

pub use kinds::{ImpersonationKind, TraineeImpersonation, TrainerImpersonation};
pub use stack::{EndOutcome, ImpersonationSessionStack, ImpersonationState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::{Role, TokenPair};
use crate::utils::string_or_number;

/// ADMIN or AMBASSADOR operating as a TRAINER
pub type TrainerImpersonationStack = ImpersonationSessionStack<TrainerImpersonation>;

/// TRAINER operating as a TRAINEE
pub type TraineeImpersonationStack = ImpersonationSessionStack<TraineeImpersonation>;

/// Display information about the substitute identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstituteDescriptor {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubstituteDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            extra: Map::new(),
        }
    }

    /// Label for a "viewing as" indicator
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if let Some(ref email) = self.email {
            email
        } else {
            &self.id
        }
    }
}

/// Saved state of one impersonation, kept in tab-scoped storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationRecord {
    /// Exact pair that was active before the swap
    pub parent_tokens: TokenPair,
    pub parent_role: Role,
    pub substitute: SubstituteDescriptor,
    pub started_at: DateTime<Utc>,
}

/// Impersonation-start endpoint response
#[derive(Debug, Deserialize)]
pub struct ImpersonationGrant {
    pub access: String,
    pub refresh: String,
    #[serde(
        default,
        alias = "substituteDescriptor",
        alias = "substitute_descriptor",
        alias = "trainer",
        alias = "trainee",
        alias = "user"
    )]
    pub substitute: Option<SubstituteDescriptor>,
}
