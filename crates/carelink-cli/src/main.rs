//! carelink - terminal front end for the carelink patient portal.
//!
//! Signs in, shows the cached session and edits account settings on top of
//! `carelink-core`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use carelink_core::auth::{KeyStore, SessionCipher};
use carelink_core::cache::{format_age, FileStorage};
use carelink_core::services::Services;
use carelink_core::{ApiClient, Config, SessionCache, SystemClock};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for a daily rolling log file, in addition to stderr
const LOG_DIR_ENV: &str = "CARELINK_LOG_DIR";

const USAGE: &str = "\
Usage: carelink <command>

Commands:
  login [email]            Sign in and cache the session
  whoami                   Show the signed-in user (from the server)
  status                   Show the cached session without network access
  refresh                  Refresh the access token now
  settings                 Show account settings
  settings set KEY=VALUE.. Update account settings
  logout                   Sign out and clear the cached session
";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "carelink.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

/// Session cache over the configured directory, keyed from the passphrase
/// in the environment or else the OS keychain.
fn open_session(config: &Config) -> Result<SessionCache> {
    let cipher = match config.cache_secret {
        Some(ref secret) => SessionCipher::from_passphrase(secret)?,
        None => SessionCipher::from_key(&KeyStore::load_or_create()?),
    };
    let cache_dir = config.cache_dir()?;
    let storage = FileStorage::new(cache_dir.clone())
        .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?;
    Ok(SessionCache::with_freshness_window(
        Arc::new(storage),
        cipher,
        Arc::new(SystemClock),
        config.freshness_window(),
    ))
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn millis_age(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(at) => format_age(Utc::now() - at),
        None => "unknown".to_string(),
    }
}

/// Parse `KEY=VALUE` pairs into a settings patch. Values that parse as JSON
/// keep their type; anything else is a string.
fn parse_assignments(pairs: &[String]) -> Result<Value> {
    let mut patch = serde_json::Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{}'", pair);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        patch.insert(key.trim().to_string(), value);
    }
    Ok(Value::Object(patch))
}

async fn login(services: &Services, config: &mut Config, email: Option<&str>) -> Result<()> {
    let email = match email {
        Some(email) => email.to_string(),
        None => match config.last_email.clone() {
            Some(last) => {
                let entered = prompt_line(&format!("Email [{}]: ", last))?;
                if entered.is_empty() { last } else { entered }
            }
            None => prompt_line("Email: ")?,
        },
    };
    if email.is_empty() {
        bail!("An email address is required");
    }
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let user = services.auth.login(&email, &password).await?;
    config.last_email = Some(email);
    config.save()?;

    let role = user.role.as_deref().unwrap_or("unknown role");
    println!("Signed in as {} ({})", user.full_name(), role);
    Ok(())
}

fn status(session: &SessionCache) {
    let record = session.get();
    if record.is_empty() {
        println!("No cached session");
        return;
    }
    if let Some(user) = record.user.as_ref() {
        let email = user.get("email").and_then(Value::as_str).unwrap_or("-");
        let role = user.get("role").and_then(Value::as_str).unwrap_or("-");
        println!("User:          {} ({})", email, role);
    }
    println!(
        "Token:         {}",
        if session.is_token_valid() { "valid" } else { "missing" }
    );
    if let Some(written) = record.timestamp {
        println!("Last written:  {}", millis_age(written));
    }
    if let Some(refreshed) = record.last_refresh {
        println!("Last refresh:  {}", millis_age(refreshed));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "help" | "--help" | "-h") {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    let session = open_session(&config)?;
    let api = ApiClient::new(&config, session.clone())?;
    let services = Services::new(api.clone(), config.ttl());
    info!(command, api = %config.api_base_url, "carelink starting");

    match command {
        "login" => login(&services, &mut config, args.get(1).map(String::as_str)).await?,
        "whoami" => {
            let user = services.auth.current_user().await?;
            println!("{} <{}>", user.full_name(), user.email);
            if let Some(role) = user.role.as_deref() {
                println!("Role: {}", role);
            }
        }
        "status" => status(&session),
        "refresh" => {
            api.refresher().refresh().await?;
            println!("Access token refreshed");
        }
        "settings" => {
            let settings = match args.get(1).map(String::as_str) {
                Some("set") => services.settings.update_settings(&parse_assignments(&args[2..])?).await?,
                Some(other) => bail!("Unknown settings subcommand '{}'\n\n{}", other, USAGE),
                None => services.settings.get_settings().await?,
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        "logout" => {
            services.auth.logout().await;
            println!("Signed out");
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
    Ok(())
}
