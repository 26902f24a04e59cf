// Tab wiring
// Builds every service of one tab once and shares them by reference

use anyhow::Result;
use std::sync::Arc;

use crate::auth::{CredentialStore, TokenLifecycleManager};
use crate::config::Config;
use crate::error::Result as SessionResult;
use crate::http_client::AuthenticatedClient;
use crate::impersonation::{
    EndOutcome, ImpersonationState, TraineeImpersonationStack, TrainerImpersonationStack,
};
use crate::navigation::Navigator;
use crate::session::SessionBootstrap;
use crate::storage::KeyValueStore;

/// All session services of one tab
pub struct SessionTab {
    pub id: uuid::Uuid,
    pub store: CredentialStore,
    pub manager: Arc<TokenLifecycleManager>,
    pub client: Arc<AuthenticatedClient>,
    pub bootstrap: SessionBootstrap,
    pub trainer_impersonation: TrainerImpersonationStack,
    pub trainee_impersonation: TraineeImpersonationStack,
}

impl SessionTab {
    pub fn new(
        config: &Config,
        durable: Arc<dyn KeyValueStore>,
        cookies: Arc<dyn KeyValueStore>,
        ephemeral: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let id = uuid::Uuid::new_v4();
        tracing::debug!(tab = %id, portal = %config.portal.expected_role(), "Building session tab");

        let store = CredentialStore::new(durable, cookies);
        let manager = Arc::new(TokenLifecycleManager::from_config(config, store.clone())?);
        let client = Arc::new(AuthenticatedClient::from_config(
            config,
            manager.clone(),
            navigator.clone(),
        )?);

        let bootstrap =
            SessionBootstrap::from_config(config, manager.clone(), client.clone(), navigator.clone());
        let trainer_impersonation = TrainerImpersonationStack::from_config(
            config,
            store.clone(),
            ephemeral.clone(),
            client.clone(),
            navigator.clone(),
        );
        let trainee_impersonation = TraineeImpersonationStack::from_config(
            config,
            store.clone(),
            ephemeral,
            client.clone(),
            navigator,
        );

        Ok(Self {
            id,
            store,
            manager,
            client,
            bootstrap,
            trainer_impersonation,
            trainee_impersonation,
        })
    }

    /// End the trainer view, unwinding a trainee view started inside it first
    pub async fn end_trainer_impersonation(&self) -> SessionResult<EndOutcome> {
        let inner_notified = match self.trainee_impersonation.state() {
            ImpersonationState::Impersonating => {
                tracing::info!(tab = %self.id, "Ending nested trainee view first");
                self.trainee_impersonation.end().await?.audit_notified
            }
            ImpersonationState::Normal => true,
        };

        let outcome = self.trainer_impersonation.end().await?;
        Ok(EndOutcome {
            audit_notified: inner_notified && outcome.audit_notified,
            ..outcome
        })
    }
}
