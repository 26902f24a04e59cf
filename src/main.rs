use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use serde_json::Value;
use std::sync::Arc;

use portal_session::config::Config;
use portal_session::navigation::RecordingNavigator;
use portal_session::session::{Portal, SessionState};
use portal_session::storage::{KeyValueStore, MemoryStore, SqliteStore};
use portal_session::tab::SessionTab;

const HELP: &str = "\
Commands:
  login                     sign in to this portal
  whoami                    show the resolved identity
  get <path>                authenticated GET, prints the JSON body
  impersonate-trainer <id>  view the app as a trainer (admin/ambassador)
  impersonate-trainee <id>  view the app as a trainee (trainer)
  viewing                   show active impersonations
  end-trainer               stop viewing as a trainer
  end-trainee               stop viewing as a trainee
  logout                    sign out
  help                      this text
  quit                      exit (tab-scoped state is lost)";

/// Storage shared by every load of this tab
struct TabStorage {
    durable: Arc<dyn KeyValueStore>,
    ephemeral: Arc<dyn KeyValueStore>,
    navigator: Arc<RecordingNavigator>,
}

impl TabStorage {
    /// A fresh set of services, as after a full page load
    fn load(&self, config: &Config) -> Result<SessionTab> {
        SessionTab::new(
            config,
            self.durable.clone(),
            self.durable.clone(),
            self.ephemeral.clone(),
            self.navigator.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("🚀 Portal session starting...");
    tracing::info!(
        "API: {} | portal: {} | store: {}",
        config.api_base_url,
        config.portal.expected_role(),
        config.store_path.display()
    );

    let storage = TabStorage {
        durable: Arc::new(SqliteStore::open(&config.store_path)?),
        ephemeral: Arc::new(MemoryStore::new()),
        navigator: Arc::new(RecordingNavigator::new()),
    };

    let mut tab = storage.load(&config)?;
    report(&tab.bootstrap.run().await);
    println!("{}", HELP);

    loop {
        let line: String = Input::new()
            .with_prompt(format!("[{}]", config.portal.expected_role()))
            .allow_empty(true)
            .interact_text()
            .context("Failed to read command")?;

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let argument = parts.next();

        match (command, argument) {
            ("", _) => continue,
            ("quit" | "exit", _) => break,
            ("help", _) => println!("{}", HELP),
            ("login", _) => login(&tab).await?,
            ("whoami", _) => report(&tab.bootstrap.state().await),
            ("get", Some(path)) => match tab.client.get::<Value>(path).await {
                Ok(body) => match body.into_content() {
                    Some(json) => println!(
                        "{}",
                        serde_json::to_string_pretty(&json).unwrap_or_default()
                    ),
                    None => println!("(no content)"),
                },
                Err(e) => println!("❌ {}", e),
            },
            ("impersonate-trainer", Some(id)) => {
                match tab.trainer_impersonation.begin(id).await {
                    Ok(descriptor) => println!("👀 Viewing as {}", descriptor.display_name()),
                    Err(e) => println!("❌ {}", e),
                }
            }
            ("impersonate-trainee", Some(id)) => {
                match tab.trainee_impersonation.begin(id).await {
                    Ok(descriptor) => println!("👀 Viewing as {}", descriptor.display_name()),
                    Err(e) => println!("❌ {}", e),
                }
            }
            ("viewing", _) => {
                let records = [
                    ("trainer", tab.trainer_impersonation.current()),
                    ("trainee", tab.trainee_impersonation.current()),
                ];
                let mut any = false;
                for (kind, record) in records {
                    if let Some(record) = record {
                        any = true;
                        println!(
                            "👀 {} view: {} (from {} since {})",
                            kind,
                            record.substitute.display_name(),
                            record.parent_role,
                            record.started_at.to_rfc3339()
                        );
                    }
                }
                if !any {
                    println!("Not impersonating");
                }
            }
            ("end-trainer", _) => match tab.end_trainer_impersonation().await {
                Ok(outcome) if !outcome.audit_notified => {
                    println!("⚠️  Restored, but the server was not notified")
                }
                Ok(_) => println!("✅ Restored"),
                Err(e) => println!("❌ {}", e),
            },
            ("end-trainee", _) => match tab.trainee_impersonation.end().await {
                Ok(outcome) if !outcome.audit_notified => {
                    println!("⚠️  Restored, but the server was not notified")
                }
                Ok(_) => println!("✅ Restored"),
                Err(e) => println!("❌ {}", e),
            },
            ("logout", _) => tab.bootstrap.logout().await,
            _ => println!("Unknown command, try `help`"),
        }

        // Hard navigation: drop every in-memory service and load again
        if let Some(route) = storage.navigator.take_pending() {
            if let Some(role) = config.routes.role_for_route(&route) {
                config.portal = Portal::new(role);
            }
            println!("↻ Reloading {}", route);
            tab = storage.load(&config)?;
            report(&tab.bootstrap.run().await);
        }
    }

    tracing::info!("Tab closed");
    Ok(())
}

async fn login(tab: &SessionTab) -> Result<()> {
    let identifier: String = Input::new()
        .with_prompt("Email")
        .interact_text()
        .context("Failed to read email")?;
    let secret = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;

    match tab.bootstrap.login(&identifier, &secret).await {
        Ok(identity) => println!("✅ Signed in as {}", identity.display_name()),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

fn report(state: &SessionState) {
    match state.identity {
        Some(ref identity) if state.is_authenticated => {
            println!("✅ {} ({})", identity.display_name(), identity.role)
        }
        _ => println!("🔒 Not signed in, use `login`"),
    }
}
