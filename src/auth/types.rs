// Authentication types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access/refresh token pair of the active identity
///
/// Both tokens are opaque; only the access token's expiry claim is ever read.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

// Tokens must never end up in logs through `{:?}`
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &redact(&self.access))
            .field("refresh", &redact(&self.refresh))
            .finish()
    }
}

/// Short, log-safe prefix of a token
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}

/// Application role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[serde(alias = "admin")]
    Admin,
    #[serde(alias = "trainer")]
    Trainer,
    #[serde(alias = "ambassador")]
    Ambassador,
    #[serde(alias = "trainee")]
    Trainee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Trainer => "TRAINER",
            Role::Ambassador => "AMBASSADOR",
            Role::Trainee => "TRAINEE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "TRAINER" => Ok(Role::Trainer),
            "AMBASSADOR" => Ok(Role::Ambassador),
            "TRAINEE" => Ok(Role::Trainee),
            other => anyhow::bail!("Unknown role: {}", other),
        }
    }
}

/// Refresh endpoint request
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Refresh endpoint response; the refresh token is only present when rotated
#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    pub refresh: Option<String>,
}

/// Login endpoint request
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub identifier: &'a str,
    pub secret: &'a str,
}

/// Login endpoint response
#[derive(Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_uses_uppercase() {
        assert_eq!(serde_json::to_string(&Role::Ambassador).unwrap(), "\"AMBASSADOR\"");
        let role: Role = serde_json::from_str("\"TRAINEE\"").unwrap();
        assert_eq!(role, Role::Trainee);
    }

    #[test]
    fn test_role_from_str_case_insensitive() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" Trainer ".parse::<Role>().unwrap(), Role::Trainer);
        assert!("coach".parse::<Role>().is_err());
    }

    #[test]
    fn test_token_pair_debug_is_redacted() {
        let pair = TokenPair::new("eyJhbGciOiJIUzI1NiJ9.secret", "refresh-secret-value");
        let debug = format!("{:?}", pair);
        assert!(!debug.contains("secret-value"));
        assert!(!debug.contains(".secret"));
    }
}
