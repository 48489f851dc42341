//! Environment-driven configuration

use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the IMAP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapSecurity {
    /// TLS from the first byte (usually port 993).
    Tls,
    /// Plain TCP upgraded with STARTTLS (usually port 143).
    StartTls,
}

impl FromStr for ImapSecurity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "implicit" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(Error::Config(format!("Invalid IMAP_SECURITY: {other}"))),
        }
    }
}

/// IMAP connection configuration for the ingestion job
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: ImapSecurity,
    /// Skip certificate verification (self-signed test servers).
    pub accept_invalid_certs: bool,
    pub folder: String,
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME` (or `IMAP_USER`)
    /// - `IMAP_PASSWORD` (or `MAIL_PASS`)
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `127.0.0.1`)
    /// - `IMAP_PORT` (default: `993`)
    /// - `IMAP_SECURITY` (`tls` or `starttls`, default: `tls`)
    /// - `IMAP_ACCEPT_INVALID_CERTS` (default: `false`)
    /// - `IMAP_FOLDER` (default: `INBOX`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing or malformed variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: var_or("IMAP_HOST", "127.0.0.1"),
            port: parse_var("IMAP_PORT", "993")?,
            username: require_any(&["IMAP_USERNAME", "IMAP_USER"])?,
            password: require_any(&["IMAP_PASSWORD", "MAIL_PASS"])?,
            security: var_or("IMAP_SECURITY", "tls").parse()?,
            accept_invalid_certs: parse_var("IMAP_ACCEPT_INVALID_CERTS", "false")?,
            folder: var_or("IMAP_FOLDER", "INBOX"),
        })
    }
}

/// SMTP relay configuration for outbound delivery
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub subject_prefix: String,
}

impl SmtpConfig {
    /// Load SMTP configuration from environment variables
    ///
    /// Required: `SMTP_HOST`, `SMTP_USER`, `SMTP_PASSWORD` (or
    /// `MAIL_PASS`). Optional: `SMTP_PORT` (default: `465`),
    /// `SMTP_SUBJECT_PREFIX` (default: empty).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing or malformed variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: require_any(&["SMTP_HOST"])?,
            port: parse_var("SMTP_PORT", "465")?,
            username: require_any(&["SMTP_USER"])?,
            password: require_any(&["SMTP_PASSWORD", "MAIL_PASS"])?,
            subject_prefix: var_or("SMTP_SUBJECT_PREFIX", ""),
        })
    }
}

/// Settings of the engine itself
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Addresses containing this domain are local and never relayed.
    pub local_domain: String,
    pub poll_interval: Duration,
    pub store_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_domain: "gomail.kurs".to_string(),
            poll_interval: Duration::from_secs(10),
            store_path: PathBuf::from("mailstore.json"),
        }
    }
}

impl EngineConfig {
    /// Load engine settings from environment variables
    ///
    /// Optional: `MAIL_DOMAIN` (default: `gomail.kurs`, must not be
    /// blank),
    /// `POLL_INTERVAL_SECS` (default: `10`), `MAIL_STORE` (default:
    /// `mailstore.json`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let secs: u64 = parse_var("POLL_INTERVAL_SECS", "10")?;
        if secs == 0 {
            return Err(Error::Config("POLL_INTERVAL_SECS must be positive".into()));
        }

        Ok(Self {
            local_domain: local_domain(env::var("MAIL_DOMAIN").ok(), defaults.local_domain)?,
            poll_interval: Duration::from_secs(secs),
            store_path: env::var("MAIL_STORE").map_or(defaults.store_path, PathBuf::from),
        })
    }
}

fn local_domain(value: Option<String>, default: String) -> Result<String> {
    match value {
        None => Ok(default),
        Some(domain) if domain.trim().is_empty() => {
            Err(Error::Config("MAIL_DOMAIN must not be empty".into()))
        }
        Some(domain) => Ok(domain.trim().to_string()),
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn require_any(names: &[&str]) -> Result<String> {
    names
        .iter()
        .find_map(|name| env::var(name).ok())
        .ok_or_else(|| Error::Config(format!("{} not set", names.join(" or "))))
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var_or(name, default)
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {name}: {e}")))
}
