use anyhow::Context;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenLifecycleManager;
use crate::config::{resolve_url, Config};
use crate::error::{Result, SessionError};
use crate::navigation::Navigator;

/// Parsed body of a successful response
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Content(T),
    /// 204 or an empty body
    NoContent,
}

impl<T> ApiResponse<T> {
    pub fn into_content(self) -> Option<T> {
        match self {
            ApiResponse::Content(value) => Some(value),
            ApiResponse::NoContent => None,
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, ApiResponse::NoContent)
    }
}

/// Method, body and extra headers of a request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub json: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            json: None,
            headers: Vec::new(),
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(json: Option<Value>) -> Self {
        Self {
            method: Method::POST,
            json,
            ..Self::default()
        }
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// HTTP client that authenticates every request as the active session
///
/// - expired token: refresh before sending
/// - 401: one refresh, one retry with the new token
/// - session-fatal failures clear credentials and navigate to the login route
pub struct AuthenticatedClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Token lifecycle manager (also owns the credential store)
    manager: Arc<TokenLifecycleManager>,

    /// Used to leave the application when the session is unusable
    navigator: Arc<dyn Navigator>,

    /// Base URL relative paths are joined to
    base_url: String,

    /// Unauthenticated entry point
    login_route: String,
}

impl AuthenticatedClient {
    /// Create a new client
    pub fn new(
        manager: Arc<TokenLifecycleManager>,
        navigator: Arc<dyn Navigator>,
        base_url: &str,
        login_route: &str,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            manager,
            navigator,
            base_url: base_url.trim_end_matches('/').to_string(),
            login_route: login_route.to_string(),
        })
    }

    /// Create a client from configuration
    pub fn from_config(
        config: &Config,
        manager: Arc<TokenLifecycleManager>,
        navigator: Arc<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        Self::new(
            manager,
            navigator,
            &config.api_base_url,
            &config.routes.login,
            config.http_connect_timeout,
            config.http_request_timeout,
        )
    }

    /// Token lifecycle manager used by this client
    pub fn manager(&self) -> &Arc<TokenLifecycleManager> {
        &self.manager
    }

    /// Issue an authenticated request and parse the response body as `T`
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        let url = resolve_url(&self.base_url, path)?;

        if self.manager.is_expired() {
            tracing::debug!("Access token expired, refreshing before request");
            if !self.manager.refresh().await {
                return Err(self.expire_session("token refresh failed before request"));
            }
        }

        let (response, sent_with) = self.send_authenticated(&url, &options).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            let replaced = self
                .manager
                .access_token()
                .is_some_and(|current| current != sent_with);

            if replaced {
                // Another refresh landed while this request was in flight
                tracing::debug!(url = %url, "Received 401 for a replaced token, retrying...");
            } else {
                tracing::warn!(url = %url, "Received 401, refreshing token and retrying...");
                if !self.manager.refresh().await {
                    return Err(self.expire_session("token refresh failed after 401"));
                }
            }

            let (retried, _) = self.send_authenticated(&url, &options).await?;
            if retried.status() == StatusCode::UNAUTHORIZED {
                return Err(self.expire_session("request rejected again after refresh"));
            }
            retried
        } else {
            response
        };

        parse_response(response).await
    }

    /// Issue a request without credentials (login and other public endpoints)
    pub async fn request_public<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        let url = resolve_url(&self.base_url, path)?;
        let response = self.send(self.build(&url, &options)).await?;
        parse_response(response).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>> {
        self.request(path, RequestOptions::get()).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        json: Option<Value>,
    ) -> Result<ApiResponse<T>> {
        self.request(path, RequestOptions::post(json)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>> {
        self.request(path, RequestOptions::delete()).await
    }

    fn build(&self, url: &str, options: &RequestOptions) -> RequestBuilder {
        let mut builder = self.client.request(options.method.clone(), url);
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref json) = options.json {
            builder = builder.json(json);
        }
        builder
    }

    /// Send with the stored access token; returns the token the request carried
    async fn send_authenticated(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<(Response, String)> {
        // The header is rebuilt from the store on every attempt
        let Some(token) = self.manager.access_token() else {
            return Err(self.expire_session("no access token available"));
        };

        let builder = self.build(url, options).bearer_auth(&token);
        let response = self.send(builder).await?;
        Ok((response, token))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder
            .build()
            .map_err(|e| SessionError::Internal(anyhow::anyhow!("Invalid request: {}", e)))?;

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            "Sending HTTP request"
        );

        let url = request.url().clone();
        match self.client.execute(request).await {
            Ok(response) => {
                tracing::debug!(status = %response.status(), "Received HTTP response");
                Ok(response)
            }
            Err(e) => {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else {
                    "request_error"
                };
                tracing::warn!(
                    error_kind = error_kind,
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );
                Err(SessionError::Network(format!("{} (kind: {})", e, error_kind)))
            }
        }
    }

    /// Clear credentials, leave for the login route, and produce `SessionExpired`
    fn expire_session(&self, reason: &str) -> SessionError {
        tracing::error!(reason = reason, "Session is no longer usable, logging out");
        self.manager.store().clear();
        self.navigator.hard_navigate(&self.login_route);
        SessionError::SessionExpired
    }
}

/// Turn a response into a typed body or a typed error
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<ApiResponse<T>> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SessionError::Network(format!("Failed to read response body: {}", e)))?;

    if status.is_success() {
        if status == StatusCode::NO_CONTENT || bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(ApiResponse::NoContent);
        }
        return serde_json::from_slice(&bytes)
            .map(ApiResponse::Content)
            .map_err(|e| SessionError::Decode(e.to_string()));
    }

    let body = serde_json::from_slice::<Value>(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

    tracing::warn!(
        status = status.as_u16(),
        response_body = %body,
        "Request failed with error response"
    );

    if status == StatusCode::FORBIDDEN {
        Err(SessionError::Forbidden {
            status: status.as_u16(),
            body,
        })
    } else {
        Err(SessionError::Request {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{token_expiring_in, token_for};
    use crate::auth::{CredentialStore, Role, TokenPair};
    use crate::navigation::RecordingNavigator;
    use crate::storage::MemoryStore;
    use serde_json::json;

    struct Harness {
        client: AuthenticatedClient,
        store: CredentialStore,
        navigator: Arc<RecordingNavigator>,
    }

    fn harness(base_url: &str, tokens: TokenPair) -> Harness {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()));
        store.set(&tokens, Role::Trainer);

        let manager = Arc::new(TokenLifecycleManager::new(
            store.clone(),
            Client::new(),
            format!("{}/auth/token/refresh/", base_url),
            60,
            Duration::from_secs(5),
        ));
        let navigator = Arc::new(RecordingNavigator::new());
        let client =
            AuthenticatedClient::new(manager, navigator.clone(), base_url, "/login", 5, 5).unwrap();

        Harness {
            client,
            store,
            navigator,
        }
    }

    #[test]
    fn test_request_options_builders() {
        let options = RequestOptions::post(Some(json!({"a": 1}))).with_header("X-Tab", "1");
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.headers, vec![("X-Tab".to_string(), "1".to_string())]);
        assert_eq!(RequestOptions::delete().method, Method::DELETE);
        assert!(RequestOptions::get().json.is_none());
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let access = token_expiring_in(3600);
        let mock = server
            .mock("GET", "/programs/")
            .match_header("authorization", format!("Bearer {}", access).as_str())
            .with_status(200)
            .with_body(r#"[{"id":1}]"#)
            .create_async()
            .await;

        let h = harness(&server.url(), TokenPair::new(access, "R1"));
        let body: ApiResponse<Value> = h.client.get("/programs/").await.unwrap();

        assert_eq!(body, ApiResponse::Content(json!([{"id": 1}])));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/coupons/7/")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("POST", "/ping/")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let h = harness(&server.url(), TokenPair::new(token_expiring_in(3600), "R1"));

        let deleted: ApiResponse<Value> = h.client.delete("/coupons/7/").await.unwrap();
        assert!(deleted.is_no_content());

        let pinged: ApiResponse<Value> = h.client.post("/ping/", None).await.unwrap();
        assert!(pinged.is_no_content());
    }

    #[tokio::test]
    async fn test_forbidden_is_surfaced_without_logout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/admin/stats/")
            .with_status(403)
            .with_body(r#"{"detail":"You do not have permission"}"#)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/token/refresh/")
            .expect(0)
            .create_async()
            .await;

        let tokens = TokenPair::new(token_expiring_in(3600), "R1");
        let h = harness(&server.url(), tokens.clone());

        let err = h.client.get::<Value>("/admin/stats/").await.unwrap_err();
        match err {
            SessionError::Forbidden { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body["detail"], "You do not have permission");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(h.store.get(), Some(tokens));
        assert!(h.navigator.history().is_empty());
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trainees/")
            .with_status(500)
            .with_body("upstream exploded")
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url(), TokenPair::new(token_expiring_in(3600), "R1"));

        let err = h.client.get::<Value>("/trainees/").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(matches!(
            err,
            SessionError::Request { body: Value::String(ref s), .. } if s == "upstream exploded"
        ));
        assert!(h.store.has_session());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/me/")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let h = harness(&server.url(), TokenPair::new(token_expiring_in(3600), "R1"));
        let err = h.client.get::<Value>("/auth/me/").await.unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[tokio::test]
    async fn test_401_for_replaced_token_retries_without_refresh() {
        let mut server = mockito::Server::new_async().await;
        let a1 = token_for(3600, "a1");
        let a2 = token_for(3600, "a2");

        let store = CredentialStore::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()));
        store.set(&TokenPair::new(a1.clone(), "R1"), Role::Trainer);

        // A concurrent refresh stores A2/R2 while the A1 request is in flight
        let rotated = TokenPair::new(a2.clone(), "R2");
        let concurrent = store.clone();
        let stale = server
            .mock("GET", "/programs/")
            .match_header("authorization", format!("Bearer {}", a1).as_str())
            .with_status(401)
            .with_body_from_request(move |_| {
                concurrent.replace_tokens(&rotated);
                br#"{"detail":"Token is invalid or expired"}"#.to_vec()
            })
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/programs/")
            .match_header("authorization", format!("Bearer {}", a2).as_str())
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/token/refresh/")
            .expect(0)
            .create_async()
            .await;

        let manager = Arc::new(TokenLifecycleManager::new(
            store.clone(),
            Client::new(),
            format!("{}/auth/token/refresh/", server.url()),
            60,
            Duration::from_secs(5),
        ));
        let navigator = Arc::new(RecordingNavigator::new());
        let client = AuthenticatedClient::new(
            manager.clone(),
            navigator.clone(),
            &server.url(),
            "/login",
            5,
            5,
        )
        .unwrap();

        let body: ApiResponse<Value> = client.get("/programs/").await.unwrap();

        assert_eq!(body, ApiResponse::Content(json!([])));
        assert_eq!(manager.refresh_attempts(), 0);
        assert_eq!(store.get(), Some(TokenPair::new(a2, "R2")));
        assert!(navigator.history().is_empty());
        stale.assert_async().await;
        fresh.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_token_with_failed_refresh_skips_request() {
        let mut server = mockito::Server::new_async().await;
        let request = server
            .mock("GET", "/programs/")
            .expect(0)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/token/refresh/")
            .with_status(401)
            .create_async()
            .await;

        let h = harness(&server.url(), TokenPair::new(token_expiring_in(10), "R1"));

        let err = h.client.get::<Value>("/programs/").await.unwrap_err();
        assert!(err.is_session_fatal());
        assert!(!h.store.has_session());
        assert_eq!(h.navigator.last().as_deref(), Some("/login"));
        request.assert_async().await;
    }
}
