use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::claims;
use super::credentials::CredentialStore;
use super::refresh;
use crate::config::Config;

type PendingRefresh = Shared<BoxFuture<'static, bool>>;

/// Token lifecycle manager
/// Decides whether the stored access token is usable and refreshes it,
/// issuing at most one refresh network call at a time
pub struct TokenLifecycleManager {
    /// Session storage
    store: CredentialStore,

    /// HTTP client for refresh requests
    client: Client,

    /// Absolute refresh endpoint URL
    refresh_url: String,

    /// A token expiring within this margin counts as expired
    expiry_margin: Duration,

    /// Upper bound for one refresh exchange
    refresh_timeout: std::time::Duration,

    /// Refresh currently in flight, shared by every concurrent caller
    in_flight: Arc<Mutex<Option<PendingRefresh>>>,

    /// Number of refresh network calls issued
    refresh_attempts: Arc<AtomicU64>,
}

impl TokenLifecycleManager {
    pub fn new(
        store: CredentialStore,
        client: Client,
        refresh_url: String,
        expiry_margin_secs: u64,
        refresh_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            client,
            refresh_url,
            expiry_margin: Duration::seconds(expiry_margin_secs as i64),
            refresh_timeout,
            in_flight: Arc::new(Mutex::new(None)),
            refresh_attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a manager from configuration
    pub fn from_config(config: &Config, store: CredentialStore) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.http_connect_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::new(
            store,
            client,
            config.endpoint_url(&config.endpoints.refresh)?,
            config.expiry_margin_secs,
            std::time::Duration::from_secs(config.refresh_timeout_secs),
        ))
    }

    /// Session storage this manager reads and writes
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Check if the access token is expired or expires within the safety margin
    /// A missing token or an undecodable expiry claim counts as expired
    pub fn is_expired(&self) -> bool {
        let Some(tokens) = self.store.get() else {
            return true;
        };

        match claims::expires_at(&tokens.access) {
            None => true,
            Some(exp) => Utc::now() + self.expiry_margin >= exp,
        }
    }

    /// Current access token, as stored
    pub fn access_token(&self) -> Option<String> {
        self.store.get().map(|tokens| tokens.access)
    }

    /// Refresh the token pair
    /// Concurrent callers share one network call and observe the same outcome.
    /// On any failure the credentials are cleared.
    pub async fn refresh(&self) -> bool {
        let pending = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_refresh();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Refresh only when the access token is expired
    pub async fn ensure_fresh(&self) -> bool {
        if !self.is_expired() {
            return true;
        }
        self.refresh().await
    }

    /// Number of refresh network calls issued so far
    pub fn refresh_attempts(&self) -> u64 {
        self.refresh_attempts.load(Ordering::SeqCst)
    }

    fn spawn_refresh(&self) -> PendingRefresh {
        let store = self.store.clone();
        let client = self.client.clone();
        let url = self.refresh_url.clone();
        let timeout = self.refresh_timeout;
        let slot = self.in_flight.clone();
        let attempts = self.refresh_attempts.clone();

        async move {
            let refreshed = match store.get() {
                None => {
                    tracing::warn!("No refresh token stored, cannot refresh");
                    false
                }
                Some(current) => {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    match refresh::refresh_token_pair(&client, &url, &current.refresh, timeout)
                        .await
                    {
                        Ok(tokens) => {
                            store.replace_tokens(&tokens);
                            match claims::expires_at(&tokens.access) {
                                Some(exp) => tracing::info!(
                                    "Token refreshed, expires: {}",
                                    exp.to_rfc3339()
                                ),
                                None => tracing::info!("Token refreshed"),
                            }
                            true
                        }
                        Err(e) => {
                            tracing::error!("Token refresh failed: {:#}", e);
                            false
                        }
                    }
                }
            };

            if !refreshed {
                store.clear();
            }

            // Cleared before resolving so a later expiry starts a new refresh
            *slot.lock().await = None;
            refreshed
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::token_expiring_in;
    use crate::auth::{Role, TokenPair};
    use crate::storage::MemoryStore;
    use futures::future::join_all;

    fn manager_with(url: &str, tokens: Option<TokenPair>) -> TokenLifecycleManager {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()));
        if let Some(tokens) = tokens {
            store.set(&tokens, Role::Trainer);
        }
        TokenLifecycleManager::new(
            store,
            Client::new(),
            url.to_string(),
            60,
            std::time::Duration::from_secs(5),
        )
    }

    #[test]
    fn test_expiry_margin() {
        let url = "http://127.0.0.1:9/refresh";

        // 30 seconds left, margin is 60: expired
        let manager = manager_with(url, Some(TokenPair::new(token_expiring_in(30), "R1")));
        assert!(manager.is_expired());

        // An hour left: usable
        let manager = manager_with(url, Some(TokenPair::new(token_expiring_in(3600), "R1")));
        assert!(!manager.is_expired());

        // Already past expiry
        let manager = manager_with(url, Some(TokenPair::new(token_expiring_in(-60), "R1")));
        assert!(manager.is_expired());
    }

    #[test]
    fn test_undecodable_or_missing_token_is_expired() {
        let url = "http://127.0.0.1:9/refresh";

        let manager = manager_with(url, Some(TokenPair::new("opaque", "R1")));
        assert!(manager.is_expired());

        let manager = manager_with(url, None);
        assert!(manager.is_expired());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_call() {
        let mut server = mockito::Server::new_async().await;
        let a2 = token_expiring_in(3600);
        let mock = server
            .mock("POST", "/refresh")
            .with_status(200)
            .with_body(format!(r#"{{"access":"{}","refresh":"R2"}}"#, a2))
            .expect(1)
            .create_async()
            .await;

        let manager = manager_with(
            &format!("{}/refresh", server.url()),
            Some(TokenPair::new(token_expiring_in(5), "R1")),
        );

        let outcomes = join_all((0..5).map(|_| manager.ensure_fresh())).await;

        assert!(outcomes.iter().all(|ok| *ok));
        assert_eq!(manager.refresh_attempts(), 1);
        assert_eq!(manager.store().get(), Some(TokenPair::new(a2, "R2")));
        assert_eq!(manager.store().role(), Some(Role::Trainer));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_call_and_clear() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/refresh")
            .with_status(401)
            .with_body(r#"{"detail":"Token is blacklisted"}"#)
            .expect(1)
            .create_async()
            .await;

        let manager = manager_with(
            &format!("{}/refresh", server.url()),
            Some(TokenPair::new(token_expiring_in(-10), "R1")),
        );

        let outcomes = join_all((0..3).map(|_| manager.refresh())).await;

        assert!(outcomes.iter().all(|ok| !*ok));
        assert!(manager.store().get().is_none());
        assert!(manager.store().role().is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_settled_refresh_is_not_reused() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/refresh")
            .with_status(200)
            .with_body(format!(r#"{{"access":"{}"}}"#, token_expiring_in(3600)))
            .expect(2)
            .create_async()
            .await;

        let manager = manager_with(
            &format!("{}/refresh", server.url()),
            Some(TokenPair::new(token_expiring_in(5), "R1")),
        );

        assert!(manager.refresh().await);
        assert!(manager.refresh().await);
        assert_eq!(manager.refresh_attempts(), 2);
        assert_eq!(manager.store().get().unwrap().refresh, "R1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_timeout_is_a_shared_failure() {
        let (base_url, server) = crate::auth::testing::silent_server().await;

        let store = CredentialStore::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()));
        store.set(&TokenPair::new(token_expiring_in(5), "R1"), Role::Trainer);
        let manager = TokenLifecycleManager::new(
            store,
            Client::new(),
            format!("{}/refresh", base_url),
            60,
            std::time::Duration::from_millis(200),
        );

        let outcomes = join_all((0..3).map(|_| manager.ensure_fresh())).await;

        assert_eq!(outcomes, vec![false, false, false]);
        assert_eq!(manager.refresh_attempts(), 1);
        assert!(manager.store().get().is_none());
        assert!(manager.store().role().is_none());
        server.abort();
    }

    #[tokio::test]
    async fn test_fresh_token_skips_network() {
        let manager = manager_with(
            "http://127.0.0.1:9/refresh",
            Some(TokenPair::new(token_expiring_in(3600), "R1")),
        );
        assert!(manager.ensure_fresh().await);
        assert_eq!(manager.refresh_attempts(), 0);
    }

    #[tokio::test]
    async fn test_refresh_without_tokens_fails_without_network() {
        let manager = manager_with("http://127.0.0.1:9/refresh", None);
        assert!(!manager.refresh().await);
        assert_eq!(manager.refresh_attempts(), 0);
    }
}
