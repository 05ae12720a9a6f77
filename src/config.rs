//! Console configuration loaded from the environment.
//!
//! Built once at startup and passed to the pieces that need it; nothing reads the environment
//! after that. Secrets can be given inline (`ADMIN_PASSWORD`) or as a path to a file holding
//! them (`ADMIN_PASSWORD_FILE`, e.g. a Docker secret under `/run/secrets`).

use std::fmt;
use std::fs::read_to_string;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ConsoleError, Result};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_MAIL_FROM: &str = "grant-console@localhost";

/// The single operator credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upgrade the connection with STARTTLS; turn off only for local relays
    pub starttls: bool,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("starttls", &self.starttls)
            .finish()
    }
}

/// Configuration for the console.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub admin: AdminCredentials,

    /// Postgres connection string; `None` keeps requests in memory
    pub database_url: Option<String>,

    pub database_max_connections: u32,

    /// SMTP relay; `None` makes delivery a manual confirmation
    pub smtp: Option<SmtpConfig>,

    pub mail_from: String,

    /// Directory generated reports are written to
    pub report_dir: PathBuf,

    /// Grant-Forge endpoint; `None` renders drafts locally
    pub grant_forge_url: Option<String>,

    /// Timeout for each Grant-Forge call in milliseconds
    pub grant_forge_timeout_ms: u64,

    pub bind_addr: String,

    /// Runs older than this (milliseconds) are released back to `created` at startup
    pub stale_run_timeout_ms: u64,
}

impl ConsoleConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    ///
    /// Values are trimmed, except secrets, which are taken verbatim.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get = |key: &str| raw(key).map(|v| v.trim().to_string());

        let admin = AdminCredentials {
            username: get("ADMIN_USERNAME")
                .ok_or_else(|| ConsoleError::Config("ADMIN_USERNAME must be set".to_string()))?,
            password: secret(&raw, "ADMIN_PASSWORD")?.ok_or_else(|| {
                ConsoleError::Config(
                    "ADMIN_PASSWORD or ADMIN_PASSWORD_FILE must be set".to_string(),
                )
            })?,
        };

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&get, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
                username: get("SMTP_USERNAME"),
                password: secret(&raw, "SMTP_PASSWORD")?,
                starttls: parse_or(&get, "SMTP_STARTTLS", true)?,
            }),
            None => {
                info!("SMTP_HOST not set, deliveries will be confirmed manually");
                None
            }
        };

        let database_url = get("DATABASE_URL");
        if database_url.is_none() {
            info!("DATABASE_URL not set, requests will be kept in memory");
        }

        let grant_forge_url = get("GRANT_FORGE_URL");
        if grant_forge_url.is_none() {
            info!("GRANT_FORGE_URL not set, reports will be rendered as local drafts");
        }

        Ok(Self {
            admin,
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            smtp,
            mail_from: get("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            report_dir: get("REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_report_dir),
            grant_forge_url,
            grant_forge_timeout_ms: parse_or(&get, "GRANT_FORGE_TIMEOUT_MS", 60_000)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            stale_run_timeout_ms: parse_or(&get, "STALE_RUN_TIMEOUT_MS", 600_000)?,
        })
    }

    pub fn grant_forge_timeout(&self) -> Duration {
        Duration::from_millis(self.grant_forge_timeout_ms)
    }

    pub fn stale_run_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_run_timeout_ms)
    }
}

/// `<temp dir>/grant-forge`
pub fn default_report_dir() -> PathBuf {
    std::env::temp_dir().join("grant-forge")
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ConsoleError::Config(format!("Invalid {key} value '{raw}': {e}"))),
        None => {
            debug!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

/// Read `key` verbatim, falling back to the contents of the file named by `<key>_FILE`.
///
/// Only the file's trailing line break is dropped.
fn secret<G>(raw: &G, key: &str) -> Result<Option<String>>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(value) = raw(key) {
        return Ok(Some(value));
    }

    let file_key = format!("{key}_FILE");
    let Some(path) = raw(&file_key).map(|p| p.trim().to_string()) else {
        return Ok(None);
    };

    read_to_string(&path)
        .map(|s| Some(s.trim_end_matches(['\r', '\n']).to_string()).filter(|s| !s.is_empty()))
        .map_err(|e| ConsoleError::Config(format!("Failed to read {file_key} ({path}): {e}")))
}
