use fleet_core::{ConfigError, IngestError, StoreError};
use fleet_persistence::PersistenceError;
use thiserror::Error;

/// Errores de arranque y de la fachada.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Error de configuración: {0}")]
    Config(#[from] ConfigError),

    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
