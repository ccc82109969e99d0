//! Configuración del ledger desde variables de entorno (`FLEET_*`).
//!
//! `.env` se carga una sola vez; los valores numéricos inválidos son error de
//! configuración, no se reemplazan silenciosamente por el default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::constants::*;
use crate::queue::QueueConfig;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env.
pub fn init_dotenv() { Lazy::force(&DOTENV_LOADED); }

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("valor inválido para {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} debe ser mayor que cero")]
    MustBePositive { key: &'static str },
}

/// Política de retención usada por el scheduler de mantenimiento.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub orphan_threshold_secs: i64,
    pub orphan_purge_days: i64,
    pub report_retention_days: i64,
    pub history_retain_days: usize,
    pub staging_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { orphan_threshold_secs: DEFAULT_ORPHAN_THRESHOLD_SECS,
               orphan_purge_days: DEFAULT_ORPHAN_PURGE_DAYS,
               report_retention_days: DEFAULT_REPORT_RETENTION_DAYS,
               history_retain_days: DEFAULT_HISTORY_RETAIN_DAYS,
               staging_max_age: Duration::from_secs(DEFAULT_STAGING_MAX_AGE_SECS) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub report_root: PathBuf,
    pub staging_dir: PathBuf,
    pub queue: QueueConfig,
    pub retention: RetentionPolicy,
    pub report_list_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { report_root: PathBuf::from("./reports"),
               staging_dir: env::temp_dir().join("fleet-ledger-staging"),
               queue: QueueConfig::default(),
               retention: RetentionPolicy::default(),
               report_list_limit: DEFAULT_REPORT_LIST_LIMIT }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        init_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let d = Self::default();
        let workers: usize = parse_or(&lookup, "FLEET_ASYNC_WORKERS", d.queue.workers)?;
        if workers == 0 {
            return Err(ConfigError::MustBePositive { key: "FLEET_ASYNC_WORKERS" });
        }
        let retention = RetentionPolicy {
            orphan_threshold_secs: positive_or(&lookup, "FLEET_ORPHAN_THRESHOLD_SECS", d.retention.orphan_threshold_secs)?,
            orphan_purge_days: positive_or(&lookup, "FLEET_ORPHAN_PURGE_DAYS", d.retention.orphan_purge_days)?,
            report_retention_days: positive_or(&lookup, "FLEET_REPORT_RETENTION_DAYS", d.retention.report_retention_days)?,
            history_retain_days: positive_or(&lookup, "FLEET_HISTORY_RETAIN_DAYS", d.retention.history_retain_days)?,
            staging_max_age: Duration::from_secs(parse_or(&lookup,
                                                          "FLEET_STAGING_MAX_AGE_SECS",
                                                          d.retention.staging_max_age.as_secs())?),
        };
        Ok(Self { report_root: lookup("FLEET_REPORT_ROOT").map(PathBuf::from).unwrap_or(d.report_root),
                  staging_dir: lookup("FLEET_STAGING_DIR").map(PathBuf::from).unwrap_or(d.staging_dir),
                  queue: QueueConfig { workers,
                                       capacity: parse_or(&lookup, "FLEET_QUEUE_CAPACITY", d.queue.capacity)? },
                  retention,
                  report_list_limit: parse_or(&lookup, "FLEET_REPORT_LIST_LIMIT", d.report_list_limit)? })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
    where T: FromStr,
          F: Fn(&str) -> Option<String>
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Como `parse_or`, pero rechaza valores `<= 0`.
fn positive_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
    where T: FromStr + PartialOrd + Default,
          F: Fn(&str) -> Option<String>
{
    let value = parse_or(lookup, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::MustBePositive { key });
    }
    Ok(value)
}
