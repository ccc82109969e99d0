//! Carga de configuración de conexión desde variables de entorno.
//! Usa convención `DATABASE_URL` y parámetros opcionales de pool; el motor se
//! deduce de la URL.

use std::env;

use crate::error::PersistenceError;

pub use fleet_core::config::init_dotenv;

pub const DEFAULT_DATABASE_URL: &str = "fleet-ledger.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    /// `postgres://` / `postgresql://` → Postgres; cualquier otra cosa
    /// (`sqlite://ruta`, ruta pelada, `:memory:`) → SQLite.
    pub fn detect(url: &str) -> Self {
        let lower = url.trim().to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Backend::Postgres
        } else {
            Backend::Sqlite
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        // asegura que .env se haya cargado
        init_dotenv();
        let url = env::var("DATABASE_URL").ok()
                                          .filter(|v| !v.trim().is_empty())
                                          .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let min_connections = parse_env("DATABASE_MIN_CONNECTIONS", 2)?;
        let max_connections = parse_env("DATABASE_MAX_CONNECTIONS", 16)?;
        Ok(Self { url,
                  min_connections,
                  max_connections })
    }

    pub fn backend(&self) -> Backend { Backend::detect(&self.url) }

    /// Ruta del archivo SQLite (sin prefijo `sqlite://` / `sqlite:`).
    pub fn sqlite_path(&self) -> &str { sqlite_path(&self.url) }
}

pub fn sqlite_path(url: &str) -> &str {
    let url = url.trim();
    url.strip_prefix("sqlite://")
       .or_else(|| url.strip_prefix("sqlite:"))
       .unwrap_or(url)
}

fn parse_env(key: &str, default: u32) -> Result<u32, PersistenceError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => {
            v.trim().parse().map_err(|_| PersistenceError::Config(format!("{key}='{v}' no es un entero válido")))
        }
        _ => Ok(default),
    }
}
