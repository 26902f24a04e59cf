// Credential store
// Durable token pair of the active identity plus the token-free session cookies

use std::sync::Arc;

use super::types::{Role, TokenPair};
use crate::storage::KeyValueStore;

const ACCESS_KEY: &str = "access_token";
const REFRESH_KEY: &str = "refresh_token";
const SESSION_COOKIE: &str = "session";
const ROLE_COOKIE: &str = "role";

/// Storage of the currently active session
///
/// Tokens live in durable storage; the cookie jar only carries a session
/// marker and the active role, so server-side gating never decodes tokens.
#[derive(Clone)]
pub struct CredentialStore {
    durable: Arc<dyn KeyValueStore>,
    cookies: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(durable: Arc<dyn KeyValueStore>, cookies: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, cookies }
    }

    /// Current token pair; `None` unless both tokens are present
    pub fn get(&self) -> Option<TokenPair> {
        let access = self.durable.get(ACCESS_KEY)?;
        let refresh = self.durable.get(REFRESH_KEY)?;
        Some(TokenPair { access, refresh })
    }

    /// Install a session: both tokens and the role cookie
    pub fn set(&self, tokens: &TokenPair, role: Role) {
        self.write_tokens(tokens);
        self.cookies
            .set_many(&[(SESSION_COOKIE, "1"), (ROLE_COOKIE, role.as_str())]);
        tracing::debug!(role = %role, "Credentials stored");
    }

    /// Replace the token pair of the current session, keeping its role
    pub fn replace_tokens(&self, tokens: &TokenPair) {
        self.write_tokens(tokens);
        self.cookies.set(SESSION_COOKIE, "1");
    }

    /// Update the role cookie only
    pub fn set_role(&self, role: Role) {
        self.cookies.set(ROLE_COOKIE, role.as_str());
    }

    /// Remove both tokens and the cookies
    pub fn clear(&self) {
        self.durable.remove_many(&[ACCESS_KEY, REFRESH_KEY]);
        self.cookies.remove_many(&[SESSION_COOKIE, ROLE_COOKIE]);
        tracing::debug!("Credentials cleared");
    }

    /// True iff both tokens are present
    pub fn has_session(&self) -> bool {
        self.get().is_some()
    }

    /// Role cookie of the active session
    pub fn role(&self) -> Option<Role> {
        self.cookies.get(ROLE_COOKIE)?.parse().ok()
    }

    /// Raw value of the session cookie (as seen by server-side gating)
    pub fn session_cookie(&self) -> Option<String> {
        self.cookies.get(SESSION_COOKIE)
    }

    fn write_tokens(&self, tokens: &TokenPair) {
        self.durable.set_many(&[
            (ACCESS_KEY, tokens.access.as_str()),
            (REFRESH_KEY, tokens.refresh.as_str()),
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> (CredentialStore, MemoryStore, MemoryStore) {
        let durable = MemoryStore::new();
        let cookies = MemoryStore::new();
        let store = CredentialStore::new(Arc::new(durable.clone()), Arc::new(cookies.clone()));
        (store, durable, cookies)
    }

    #[test]
    fn test_set_and_get() {
        let (store, _, _) = store();
        assert!(store.get().is_none());
        assert!(!store.has_session());

        let pair = TokenPair::new("A1", "R1");
        store.set(&pair, Role::Trainer);

        assert_eq!(store.get(), Some(pair));
        assert!(store.has_session());
        assert_eq!(store.role(), Some(Role::Trainer));
        assert_eq!(store.session_cookie().as_deref(), Some("1"));
    }

    #[test]
    fn test_clear_removes_tokens_and_cookies() {
        let (store, durable, cookies) = store();
        store.set(&TokenPair::new("A1", "R1"), Role::Admin);

        store.clear();

        assert!(store.get().is_none());
        assert!(store.role().is_none());
        assert!(durable.is_empty());
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_single_token_is_not_a_session() {
        let (store, durable, _) = store();
        durable.set(ACCESS_KEY, "A1");
        assert!(!store.has_session());
        assert!(store.get().is_none());
    }

    #[test]
    fn test_replace_tokens_keeps_role() {
        let (store, _, _) = store();
        store.set(&TokenPair::new("A1", "R1"), Role::Ambassador);
        store.replace_tokens(&TokenPair::new("A2", "R2"));

        assert_eq!(store.get(), Some(TokenPair::new("A2", "R2")));
        assert_eq!(store.role(), Some(Role::Ambassador));
    }

    #[test]
    fn test_cookies_hold_no_token_material() {
        let (store, _, cookies) = store();
        store.set(&TokenPair::new("access-secret", "refresh-secret"), Role::Trainee);

        for key in [SESSION_COOKIE, ROLE_COOKIE] {
            let value = cookies.get(key).unwrap();
            assert!(!value.contains("secret"));
        }
    }
}
