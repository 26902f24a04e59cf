// Authentication module
// Credential storage and token lifecycle

mod claims;
mod credentials;
mod manager;
mod refresh;
mod types;

pub use claims::{decode_claims, expires_at, TokenClaims};
pub use credentials::CredentialStore;
pub use manager::TokenLifecycleManager;
pub use types::{redact, LoginRequest, LoginResponse, Role, TokenPair};
