use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::auth::Role;
use crate::session::Portal;

/// Portal Session - identity and session shell
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the API server
    #[arg(short = 'u', long, env = "PORTAL_API_URL", default_value = "http://127.0.0.1:8000/api")]
    pub api_url: String,

    /// Portal this session loads (admin, trainer, ambassador, trainee)
    #[arg(short, long, env = "PORTAL", default_value = "trainer")]
    pub portal: String,

    /// Path to the durable session database
    #[arg(
        short = 'd',
        long,
        env = "SESSION_DB_FILE",
        default_value = "~/.local/share/portal-session/session.sqlite3"
    )]
    pub db_file: String,

    /// Seconds before expiry at which an access token counts as expired
    #[arg(long, env = "TOKEN_EXPIRY_MARGIN", default_value = "60")]
    pub expiry_margin: u64,

    /// Timeout for one token refresh exchange in seconds
    #[arg(long, env = "TOKEN_REFRESH_TIMEOUT", default_value = "10")]
    pub refresh_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// API endpoint paths, relative to the base URL
/// `{id}` is replaced with the substitute identity's id
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub login: String,
    pub refresh: String,
    pub current_user: String,
    pub trainer_impersonation_start: String,
    pub trainer_impersonation_end: String,
    pub trainee_impersonation_start: String,
    pub trainee_impersonation_end: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login/".to_string(),
            refresh: "/auth/token/refresh/".to_string(),
            current_user: "/auth/me/".to_string(),
            trainer_impersonation_start: "/admin/trainers/{id}/impersonate/".to_string(),
            trainer_impersonation_end: "/admin/impersonation/end/".to_string(),
            trainee_impersonation_start: "/trainer/trainees/{id}/impersonate/".to_string(),
            trainee_impersonation_end: "/trainer/impersonation/end/".to_string(),
        }
    }
}

/// Application routes used for hard navigation
#[derive(Clone, Debug)]
pub struct Routes {
    pub login: String,
    pub admin_home: String,
    pub trainer_home: String,
    pub ambassador_home: String,
    pub trainee_home: String,
    pub admin_trainers: String,
    pub trainer_trainees: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            admin_home: "/admin/dashboard".to_string(),
            trainer_home: "/trainer/dashboard".to_string(),
            ambassador_home: "/ambassador/dashboard".to_string(),
            trainee_home: "/trainee/dashboard".to_string(),
            admin_trainers: "/admin/trainers".to_string(),
            trainer_trainees: "/trainer/trainees".to_string(),
        }
    }
}

impl Routes {
    /// Landing route of a role's portal
    pub fn home(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.admin_home,
            Role::Trainer => &self.trainer_home,
            Role::Ambassador => &self.ambassador_home,
            Role::Trainee => &self.trainee_home,
        }
    }

    /// Portal a route belongs to, from its first path segment
    pub fn role_for_route(&self, route: &str) -> Option<Role> {
        let segment = route.trim_start_matches('/').split(['/', '?', '#']).next()?;
        match segment {
            "admin" => Some(Role::Admin),
            "trainer" => Some(Role::Trainer),
            "ambassador" => Some(Role::Ambassador),
            "trainee" => Some(Role::Trainee),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub api_base_url: String,
    pub endpoints: Endpoints,

    // Portal
    pub portal: Portal,
    pub routes: Routes,

    // Storage
    pub store_path: PathBuf,

    // Token lifecycle
    pub expiry_margin_secs: u64,
    pub refresh_timeout_secs: u64,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Config {
            api_base_url: args.api_url.trim_end_matches('/').to_string(),
            endpoints: Endpoints::default(),

            portal: args
                .portal
                .parse::<Role>()
                .map(Portal::new)
                .with_context(|| format!("Invalid portal: {}", args.portal))?,
            routes: Routes::default(),

            store_path: expand_tilde(&args.db_file),

            expiry_margin_secs: args.expiry_margin,
            refresh_timeout_secs: args.refresh_timeout,

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Default configuration against a given API base URL
    pub fn for_base_url(api_base_url: &str) -> Self {
        Config {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            endpoints: Endpoints::default(),
            portal: Portal::new(Role::Trainer),
            routes: Routes::default(),
            store_path: PathBuf::from("session.sqlite3"),
            expiry_margin_secs: 60,
            refresh_timeout_secs: 10,
            http_connect_timeout: 10,
            http_request_timeout: 30,
            log_level: "info".to_string(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.api_base_url)
            .with_context(|| format!("PORTAL_API_URL is not a valid URL: {}", self.api_base_url))?;

        if self.expiry_margin_secs == 0 {
            anyhow::bail!("TOKEN_EXPIRY_MARGIN must be greater than zero");
        }
        if self.refresh_timeout_secs == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("Timeouts must be greater than zero");
        }

        Ok(())
    }

    /// Resolve an endpoint path (or absolute URL) against the API base URL
    pub fn endpoint_url(&self, path: &str) -> Result<String> {
        resolve_url(&self.api_base_url, path)
    }
}

/// Join `path` to `base`, leaving absolute URLs untouched
pub fn resolve_url(base: &str, path: &str) -> Result<String> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(path.to_string());
    }

    let url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    reqwest::Url::parse(&url).with_context(|| format!("Invalid request URL: {}", url))?;
    Ok(url)
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
