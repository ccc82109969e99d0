//! Constantes operativas del ledger.
//!
//! Los valores por defecto de la política de retención replican el
//! comportamiento histórico del servicio; todos se pueden sobreescribir vía
//! `LedgerConfig` salvo el centinela de artifacts compactados.

/// Valor de `reports.yaml_file` para reportes cuyo artifact fue compactado.
pub const PRUNED_SENTINEL: &str = "pruned";

pub const SECONDS_PER_DAY: i64 = 86_400;

/// 3.5 días sin reportes ⇒ host huérfano.
pub const DEFAULT_ORPHAN_THRESHOLD_SECS: i64 = 302_400;
pub const DEFAULT_ORPHAN_PURGE_DAYS: i64 = 30;
pub const DEFAULT_REPORT_RETENTION_DAYS: i64 = 14;
pub const DEFAULT_HISTORY_RETAIN_DAYS: usize = 14;
pub const DEFAULT_REPORT_LIST_LIMIT: usize = 50;
pub const DEFAULT_ASYNC_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Antigüedad a partir de la cual un archivo en staging se considera abandonado.
pub const DEFAULT_STAGING_MAX_AGE_SECS: u64 = 3_600;

/// Tamaño de lote para `UPDATE ... WHERE id IN (...)` (límite de variables de SQLite).
pub const MARK_BATCH_SIZE: usize = 500;

/// Prefijo de los archivos en el directorio de staging.
pub const STAGING_PREFIX: &str = "report-";

/// Sufijo de los temporales de `ArtifactStore::write`.
pub const PARTIAL_SUFFIX: &str = ".partial";
