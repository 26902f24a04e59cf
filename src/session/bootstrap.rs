use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Identity, Portal, SessionState};
use crate::auth::{LoginRequest, LoginResponse, TokenLifecycleManager, TokenPair};
use crate::config::{Config, Endpoints, Routes};
use crate::error::{Result, SessionError};
use crate::http_client::{ApiResponse, AuthenticatedClient, RequestOptions};
use crate::navigation::Navigator;
use crate::utils::error_message;

/// Session bootstrap
/// Runs once per tab load: decides whether a session exists, refreshes it if
/// needed, resolves the identity and checks it belongs to the portal
pub struct SessionBootstrap {
    portal: Portal,
    manager: Arc<TokenLifecycleManager>,
    client: Arc<AuthenticatedClient>,
    navigator: Arc<dyn Navigator>,
    endpoints: Endpoints,
    routes: Routes,
    state: RwLock<SessionState>,
}

impl SessionBootstrap {
    pub fn new(
        portal: Portal,
        manager: Arc<TokenLifecycleManager>,
        client: Arc<AuthenticatedClient>,
        navigator: Arc<dyn Navigator>,
        endpoints: Endpoints,
        routes: Routes,
    ) -> Self {
        Self {
            portal,
            manager,
            client,
            navigator,
            endpoints,
            routes,
            state: RwLock::new(SessionState::loading()),
        }
    }

    pub fn from_config(
        config: &Config,
        manager: Arc<TokenLifecycleManager>,
        client: Arc<AuthenticatedClient>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::new(
            config.portal,
            manager,
            client,
            navigator,
            config.endpoints.clone(),
            config.routes.clone(),
        )
    }

    pub fn portal(&self) -> Portal {
        self.portal
    }

    /// Snapshot of the current session state
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.state.read().await.identity.clone()
    }

    /// Resolve the session of this tab
    pub async fn run(&self) -> SessionState {
        *self.state.write().await = SessionState::loading();

        let state = match self.resolve().await {
            Ok(identity) => {
                tracing::info!(
                    role = %identity.role,
                    user = %identity.display_name(),
                    "Session resolved"
                );
                SessionState::authenticated(identity)
            }
            Err(SessionError::NoActiveSession) => {
                tracing::debug!("No stored session");
                SessionState::unauthenticated()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session could not be resolved");
                SessionState::unauthenticated()
            }
        };

        *self.state.write().await = state.clone();
        state
    }

    /// Exchange credentials for a session and resolve its identity
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Identity> {
        let body = serde_json::to_value(LoginRequest { identifier, secret })
            .map_err(|e| SessionError::Internal(e.into()))?;

        let tokens = match self
            .client
            .request_public::<LoginResponse>(&self.endpoints.login, RequestOptions::post(Some(body)))
            .await
        {
            Ok(ApiResponse::Content(tokens)) => TokenPair::new(tokens.access, tokens.refresh),
            Ok(ApiResponse::NoContent) => {
                return Err(SessionError::Decode("empty login response".to_string()))
            }
            Err(SessionError::Request { body, .. }) | Err(SessionError::Forbidden { body, .. }) => {
                let message = error_message(&body).unwrap_or_else(|| "Login failed".to_string());
                tracing::warn!(message = %message, "Login rejected");
                return Err(SessionError::Login(message));
            }
            Err(e) => return Err(e),
        };

        self.manager
            .store()
            .set(&tokens, self.portal.expected_role());

        match self.fetch_identity().await {
            Ok(identity) => {
                tracing::info!(role = %identity.role, "Logged in");
                *self.state.write().await = SessionState::authenticated(identity.clone());
                Ok(identity)
            }
            Err(e) => {
                // A session whose identity never resolved is not kept
                tracing::warn!(
                    error = %e,
                    "Login could not resolve the identity, clearing credentials"
                );
                self.manager.store().clear();
                *self.state.write().await = SessionState::unauthenticated();
                Err(e)
            }
        }
    }

    /// Drop the session and leave for the login route
    pub async fn logout(&self) {
        self.manager.store().clear();
        *self.state.write().await = SessionState::unauthenticated();
        tracing::info!("Logged out");
        self.navigator.hard_navigate(&self.routes.login);
    }

    async fn resolve(&self) -> Result<Identity> {
        if !self.manager.store().has_session() {
            return Err(SessionError::NoActiveSession);
        }

        if self.manager.is_expired() && !self.manager.refresh().await {
            return Err(SessionError::SessionExpired);
        }

        self.fetch_identity().await
    }

    async fn fetch_identity(&self) -> Result<Identity> {
        let identity = self
            .client
            .get::<Identity>(&self.endpoints.current_user)
            .await?
            .into_content()
            .ok_or_else(|| SessionError::Decode("empty current-user response".to_string()))?;

        let expected = self.portal.expected_role();
        if !self.portal.admits(identity.role) {
            tracing::warn!(
                expected = %expected,
                actual = %identity.role,
                "Identity does not belong to this portal, clearing credentials"
            );
            self.manager.store().clear();
            return Err(SessionError::RoleMismatch {
                expected,
                actual: identity.role,
            });
        }

        self.manager.store().set_role(identity.role);
        Ok(identity)
    }
}
