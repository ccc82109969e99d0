//! `ReportStore` respaldado por Diesel + r2d2, genérico sobre el motor.
//!
//! Cada operación toma una conexión del pool y ejecuta la consulta de
//! `LedgerConnection` correspondiente; los errores transitorios (conflictos de
//! serialización, base bloqueada, pool agotado) se reintentan con un backoff
//! lineal corto antes de llegar al core.

use std::sync::Arc;

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use diesel::sqlite::SqliteConnection;
use fleet_core::{ArtifactRef, HistoryBucket, HistoryDelta, Host, HostSnapshot, IngestionRecord, RecordOutcome,
                 ReportStore, ReportSummary, StoreError};
use fleet_domain::{ContentHash, Fqdn, HostState};
use log::{debug, info, warn};

use crate::config::{Backend, DbConfig};
use crate::error::{is_retryable, PersistenceError};
use crate::queries::LedgerConnection;

pub type LedgerPool<C> = r2d2::Pool<ConnectionManager<C>>;

const MAX_RETRIES: u32 = 3;

/// Retry simple con backoff lineal (hasta 3 reintentos: 15ms, 30ms, 45ms).
pub(crate) fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < MAX_RETRIES => {
                let delay_ms = 15 * u64::from(attempts + 1);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Construye un pool para el motor `C` y corre las migraciones pendientes.
///
/// - Tamaños 0 se elevan a 1; si `min > max` se usa `min = max`.
/// - SQLite `:memory:` fuerza un pool de una conexión (cada conexión sería
///   una base distinta).
pub fn build_pool<C: LedgerConnection>(url: &str, min_size: u32, max_size: u32) -> Result<LedgerPool<C>, PersistenceError> {
    let (min_size, max_size) = if url == ":memory:" { (1, 1) } else { (min_size.max(1), max_size.max(1)) };
    if min_size > max_size {
        warn!("pool:build min_size > max_size ({min_size} > {max_size}), ajustando min=max");
    }
    let mut builder = r2d2::Pool::builder().min_idle(Some(min_size.min(max_size)))
                                           .max_size(max_size);
    if let Some(customizer) = C::customizer() {
        builder = builder.connection_customizer(customizer);
    }
    let pool = builder.build(ConnectionManager::<C>::new(url))
                      .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        C::run_migrations(&mut *conn)?;
    }
    info!("pool:ready backend={} max_size={max_size}", C::NAME);
    Ok(pool)
}

pub struct DieselReportStore<C: LedgerConnection> {
    pool: LedgerPool<C>,
}

pub type PgReportStore = DieselReportStore<PgConnection>;
pub type SqliteReportStore = DieselReportStore<SqliteConnection>;

impl<C: LedgerConnection> DieselReportStore<C> {
    pub fn new(pool: LedgerPool<C>) -> Self { Self { pool } }

    pub fn connect(url: &str, min_size: u32, max_size: u32) -> Result<Self, PersistenceError> {
        Ok(Self::new(build_pool::<C>(url, min_size, max_size)?))
    }

    pub fn pool(&self) -> &LedgerPool<C> { &self.pool }

    fn connection(&self) -> Result<PooledConnection<ConnectionManager<C>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }

    /// Ejecuta `op` con una conexión del pool, reintentando errores transitorios.
    fn run<T, F>(&self, op: &'static str, mut f: F) -> Result<T, StoreError>
        where F: FnMut(&mut C) -> Result<T, PersistenceError>
    {
        debug!("{op}:start backend={}", C::NAME);
        with_retry(|| {
            let mut conn = self.connection()?;
            f(&mut *conn)
        }).map_err(|e| {
              warn!("{op}:failed backend={} err={e}", C::NAME);
              StoreError::from(e)
          })
    }
}

impl<C: LedgerConnection> ReportStore for DieselReportStore<C> {
    fn record_ingestion(&self, record: &IngestionRecord) -> Result<RecordOutcome, StoreError> {
        self.run("record_ingestion", |c| c.record_ingestion(record))
    }

    fn upsert_host(&self, snapshot: &HostSnapshot) -> Result<i64, StoreError> { self.run("upsert_host", |c| c.upsert_host(snapshot)) }

    fn find_host(&self, fqdn: &Fqdn) -> Result<Option<Host>, StoreError> { self.run("find_host", |c| c.find_host(fqdn.as_str())) }

    fn list_hosts(&self) -> Result<Vec<Host>, StoreError> { self.run("list_hosts", |c| c.list_hosts(None)) }

    fn hosts_in_state(&self, state: HostState) -> Result<Vec<Host>, StoreError> {
        self.run("hosts_in_state", |c| c.list_hosts(Some(state)))
    }

    fn set_pinned(&self, fqdn: &Fqdn, pinned: bool) -> Result<bool, StoreError> {
        self.run("set_pinned", |c| c.set_pinned(fqdn.as_str(), pinned))
    }

    fn mark_orphaned_before(&self, cutoff: i64) -> Result<usize, StoreError> {
        self.run("mark_orphaned", |c| c.mark_orphaned_before(cutoff))
    }

    fn purgeable_hosts(&self, cutoff: i64) -> Result<Vec<Host>, StoreError> {
        self.run("purgeable_hosts", |c| c.purgeable_hosts(cutoff))
    }

    fn search_hosts(&self, term: &str) -> Result<Vec<Host>, StoreError> { self.run("search_hosts", |c| c.search_hosts(term)) }

    fn delete_orphaned_host(&self, host_id: i64, cutoff: i64) -> Result<Option<Vec<String>>, StoreError> {
        self.run("delete_orphaned_host", |c| c.delete_orphaned_host(host_id, cutoff))
    }

    fn reports_for_host(&self, fqdn: &Fqdn, limit: usize) -> Result<Vec<ReportSummary>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run("reports_for_host", |c| c.reports_for_host(fqdn.as_str(), limit))
    }

    fn report(&self, id: i64) -> Result<Option<ReportSummary>, StoreError> { self.run("report", |c| c.report(id)) }

    fn find_report(&self, fqdn: &Fqdn, hash: &ContentHash) -> Result<Option<ReportSummary>, StoreError> {
        self.run("find_report", |c| c.find_report(fqdn.as_str(), hash.as_str()))
    }

    fn reports_executed_before(&self, cutoff: i64) -> Result<Vec<ArtifactRef>, StoreError> {
        self.run("reports_executed_before", |c| c.reports_executed_before(cutoff))
    }

    fn delete_reports_executed_before(&self, cutoff: i64) -> Result<usize, StoreError> {
        self.run("delete_reports_executed_before", |c| c.delete_reports_executed_before(cutoff))
    }

    fn unchanged_unpruned_reports(&self) -> Result<Vec<ArtifactRef>, StoreError> {
        self.run("unchanged_unpruned_reports", |c| c.unchanged_unpruned_reports())
    }

    fn mark_reports_pruned(&self, ids: &[i64]) -> Result<usize, StoreError> {
        self.run("mark_reports_pruned", |c| c.mark_reports_pruned(ids))
    }

    fn count_reports(&self) -> Result<i64, StoreError> { self.run("count_reports", |c| c.count_reports()) }

    fn count_pruned_reports(&self) -> Result<i64, StoreError> { self.run("count_pruned_reports", |c| c.count_pruned_reports()) }

    fn increment_history(&self, date: &str, delta: HistoryDelta) -> Result<(), StoreError> {
        self.run("increment_history", |c| c.increment_history(date, delta))
    }

    fn history_buckets(&self) -> Result<Vec<HistoryBucket>, StoreError> { self.run("history_buckets", |c| c.history_buckets()) }

    fn prune_history(&self, retain: usize) -> Result<usize, StoreError> { self.run("prune_history", |c| c.prune_history(retain)) }
}

/// Abre el store indicado por la configuración (motor deducido de la URL).
pub fn open_store(cfg: &DbConfig) -> Result<Arc<dyn ReportStore>, PersistenceError> {
    match cfg.backend() {
        Backend::Postgres => Ok(Arc::new(PgReportStore::connect(&cfg.url, cfg.min_connections, cfg.max_connections)?)),
        Backend::Sqlite => Ok(Arc::new(SqliteReportStore::connect(cfg.sqlite_path(),
                                                                  cfg.min_connections,
                                                                  cfg.max_connections)?)),
    }
}

/// Helper: carga `.env`, lee `DbConfig` y abre el store ya migrado.
pub fn open_store_from_env() -> Result<Arc<dyn ReportStore>, PersistenceError> {
    let cfg = DbConfig::from_env()?;
    info!("store:open backend={:?}", cfg.backend());
    open_store(&cfg)
}
