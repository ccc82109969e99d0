//! Errores del core: almacenamiento (`StoreError`) e ingesta (`IngestError`).

use std::path::PathBuf;

use fleet_domain::ParseError;
use thiserror::Error;

/// Fallo de una sentencia o transacción del Report Store.
///
/// `Transient` agrupa los casos reintentables (conflictos de serialización,
/// base bloqueada, pool agotado); las implementaciones ya reintentan
/// internamente antes de devolverlo.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("not found")]
    NotFound,
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store backend error: {0}")]
    Backend(String),
    /// Parámetro fuera de rango (ventanas negativas, término vacío).
    #[error("argumento inválido: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report {0} not found")]
    NotFound(i64),

    #[error("report {0} artifact was pruned")]
    ArtifactPruned(i64),

    #[error("ingest queue closed")]
    QueueClosed,

    #[error("could not spawn ingest worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl IngestError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Filesystem { path: path.into(),
                                  source }
    }
}
