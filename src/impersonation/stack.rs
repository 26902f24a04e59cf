use chrono::Utc;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use super::kinds::ImpersonationKind;
use super::{ImpersonationGrant, ImpersonationRecord, SubstituteDescriptor};
use crate::auth::{CredentialStore, Role, TokenPair};
use crate::config::{Config, Endpoints, Routes};
use crate::error::{Result, SessionError};
use crate::http_client::AuthenticatedClient;
use crate::navigation::Navigator;
use crate::storage::KeyValueStore;

/// Impersonation state of one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpersonationState {
    Normal,
    Impersonating,
}

/// Result of ending an impersonation
#[derive(Debug, Clone, PartialEq)]
pub struct EndOutcome {
    /// Whether the server acknowledged the end-of-impersonation notification
    pub audit_notified: bool,
    /// Role of the restored parent session
    pub restored_role: Role,
}

/// Save/swap/restore of the active credentials for one impersonation kind
///
/// `start` saves the exact parent pair in tab-scoped storage before installing
/// the substitute; `end` restores it whatever the server says. Both finish with
/// a hard navigation so no identity-keyed state survives the swap.
pub struct ImpersonationSessionStack<K: ImpersonationKind> {
    store: CredentialStore,
    ephemeral: Arc<dyn KeyValueStore>,
    client: Arc<AuthenticatedClient>,
    navigator: Arc<dyn Navigator>,
    endpoints: Endpoints,
    routes: Routes,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ImpersonationKind> ImpersonationSessionStack<K> {
    pub fn new(
        store: CredentialStore,
        ephemeral: Arc<dyn KeyValueStore>,
        client: Arc<AuthenticatedClient>,
        navigator: Arc<dyn Navigator>,
        endpoints: Endpoints,
        routes: Routes,
    ) -> Self {
        Self {
            store,
            ephemeral,
            client,
            navigator,
            endpoints,
            routes,
            _kind: PhantomData,
        }
    }

    pub fn from_config(
        config: &Config,
        store: CredentialStore,
        ephemeral: Arc<dyn KeyValueStore>,
        client: Arc<AuthenticatedClient>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::new(
            store,
            ephemeral,
            client,
            navigator,
            config.endpoints.clone(),
            config.routes.clone(),
        )
    }

    pub fn state(&self) -> ImpersonationState {
        // An unreadable record still counts: it must not be overwritten
        if self.ephemeral.get(K::STORAGE_KEY).is_some() {
            ImpersonationState::Impersonating
        } else {
            ImpersonationState::Normal
        }
    }

    /// Active record, if any
    pub fn current(&self) -> Option<ImpersonationRecord> {
        let raw = self.ephemeral.get(K::STORAGE_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(key = K::STORAGE_KEY, error = %e, "Unreadable impersonation record");
                None
            }
        }
    }

    /// Ask the server for substitute credentials as the parent, then `start`
    pub async fn begin(&self, substitute_id: &str) -> Result<SubstituteDescriptor> {
        self.check_can_start()?;

        let path = K::start_endpoint(&self.endpoints, substitute_id);
        let grant = self
            .client
            .post::<ImpersonationGrant>(&path, None)
            .await?
            .into_content()
            .ok_or_else(|| SessionError::Decode("empty impersonation response".to_string()))?;

        let descriptor = grant
            .substitute
            .unwrap_or_else(|| SubstituteDescriptor::new(substitute_id, ""));
        let tokens = TokenPair::new(grant.access, grant.refresh);

        self.start(&tokens, descriptor.clone())?;
        Ok(descriptor)
    }

    /// Save the parent session, install the substitute and reload into its landing route
    pub fn start(&self, substitute: &TokenPair, descriptor: SubstituteDescriptor) -> Result<()> {
        let (parent_tokens, parent_role) = self.check_can_start()?;

        let record = ImpersonationRecord {
            parent_tokens,
            parent_role,
            substitute: descriptor,
            started_at: Utc::now(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| SessionError::Internal(anyhow::anyhow!("Failed to encode record: {}", e)))?;

        // Record first: from here on the parent is always restorable
        self.ephemeral.set(K::STORAGE_KEY, &json);
        self.store.set(substitute, K::SUBSTITUTE_ROLE);

        tracing::info!(
            parent_role = %parent_role,
            substitute_role = %K::SUBSTITUTE_ROLE,
            substitute = %record.substitute.display_name(),
            "Impersonation started"
        );

        self.navigator.hard_navigate(&K::landing_route(&self.routes));
        Ok(())
    }

    /// Notify the server (best effort), restore the parent and reload
    pub async fn end(&self) -> Result<EndOutcome> {
        let Some(raw) = self.ephemeral.get(K::STORAGE_KEY) else {
            return Err(SessionError::NotImpersonating);
        };

        // Unwinding is last-in first-out; the active credentials belong to the inner view
        if let Some(nested) = K::NESTED_KEYS
            .iter()
            .find(|key| self.ephemeral.get(key).is_some())
        {
            tracing::warn!(
                key = K::STORAGE_KEY,
                nested = *nested,
                "Refusing to end impersonation while a nested one is active"
            );
            return Err(SessionError::NestedImpersonationActive);
        }

        let record: ImpersonationRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                // Parent is unrecoverable; never stay signed in as the substitute
                tracing::error!(error = %e, "Impersonation record is corrupt, logging out");
                self.ephemeral.remove(K::STORAGE_KEY);
                self.store.clear();
                self.navigator.hard_navigate(&self.routes.login);
                return Err(SessionError::Internal(anyhow::anyhow!(
                    "Corrupt impersonation record: {}",
                    e
                )));
            }
        };

        let path = K::end_endpoint(&self.endpoints);
        let audit_notified = match self.client.post::<Value>(&path, None).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "End-of-impersonation notification failed, restoring anyway");
                false
            }
        };

        self.store.set(&record.parent_tokens, record.parent_role);
        self.ephemeral.remove(K::STORAGE_KEY);

        tracing::info!(
            restored_role = %record.parent_role,
            audit_notified = audit_notified,
            "Impersonation ended"
        );

        self.navigator
            .hard_navigate(&K::return_route(record.parent_role, &self.routes));

        Ok(EndOutcome {
            audit_notified,
            restored_role: record.parent_role,
        })
    }

    fn check_can_start(&self) -> Result<(TokenPair, Role)> {
        if self.state() == ImpersonationState::Impersonating {
            tracing::error!(
                key = K::STORAGE_KEY,
                "Refusing to start impersonation over an existing record"
            );
            return Err(SessionError::ImpersonationActive);
        }

        let parent = self.store.get().ok_or(SessionError::NoActiveSession)?;
        let role = self.store.role();
        match role {
            Some(role) if K::PARENT_ROLES.contains(&role) => Ok((parent, role)),
            _ => Err(SessionError::ImpersonationNotPermitted { role }),
        }
    }
}
