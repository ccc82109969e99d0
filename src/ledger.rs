//! `Ledger`: composición de los componentes del core sobre un único store.

use std::sync::Arc;
use std::time::Duration;

use fleet_core::{ArtifactStore, Clock, HistoryAggregator, HistoryBucket, Host, HostRegistry, IngestError,
                 IngestOutcome, IngestPipeline, IngestQueue, LedgerConfig, PurgeSummary, QueueToken, ReportStore,
                 ReportSummary, RetentionManager, StagingArea, StateCount, StoreError, SweepSummary, SystemClock};
use fleet_domain::{Fqdn, HostState, PuppetYamlParser, ReportParser};
use fleet_persistence::DbConfig;
use log::{info, warn};
use serde::Serialize;

use crate::error::LedgerError;

/// Resultado de una pasada completa de mantenimiento.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub orphaned: usize,
    pub purged: PurgeSummary,
    pub aged_out: SweepSummary,
    pub history_pruned: usize,
    pub staging: SweepSummary,
}

pub struct Ledger {
    config: LedgerConfig,
    store: Arc<dyn ReportStore>,
    artifacts: ArtifactStore,
    staging: StagingArea,
    pipeline: Arc<IngestPipeline>,
    registry: Arc<HostRegistry>,
    history: Arc<HistoryAggregator>,
    retention: RetentionManager,
    queue: Option<IngestQueue>,
}

impl Ledger {
    /// Lee `DbConfig` + `LedgerConfig` del entorno y abre el store (ya migrado).
    pub fn open_from_env() -> Result<Self, LedgerError> {
        let config = LedgerConfig::from_env()?;
        let db = DbConfig::from_env()?;
        let store = fleet_persistence::open_store(&db)?;
        info!("ledger:open backend={:?} report_root={}", db.backend(), config.report_root.display());
        Ok(Self::with_store(store, config, Arc::new(PuppetYamlParser), Arc::new(SystemClock)))
    }

    pub fn with_store(store: Arc<dyn ReportStore>,
                      config: LedgerConfig,
                      parser: Arc<dyn ReportParser>,
                      clock: Arc<dyn Clock>)
                      -> Self {
        let artifacts = ArtifactStore::new(&config.report_root);
        let staging = StagingArea::new(&config.staging_dir);
        let registry = Arc::new(HostRegistry::new(store.clone(), artifacts.clone(), clock.clone()));
        let history = Arc::new(HistoryAggregator::new(store.clone()));
        let pipeline = Arc::new(IngestPipeline::new(store.clone(), artifacts.clone(), parser, clock.clone()));
        let retention = RetentionManager::new(store.clone(),
                                              artifacts.clone(),
                                              registry.clone(),
                                              history.clone(),
                                              staging.clone(),
                                              clock);
        Self { config,
               store,
               artifacts,
               staging,
               pipeline,
               registry,
               history,
               retention,
               queue: None }
    }

    pub fn config(&self) -> &LedgerConfig { &self.config }

    pub fn artifacts(&self) -> &ArtifactStore { &self.artifacts }

    // --- ingesta

    /// Arranca el pool de workers de la cola asíncrona (idempotente).
    pub fn start_queue(&mut self) -> Result<(), LedgerError> {
        if self.queue.is_none() {
            self.queue = Some(IngestQueue::start(self.pipeline.clone(), self.staging.clone(), self.config.queue)?);
        }
        Ok(())
    }

    pub fn ingest(&self, bytes: &[u8]) -> Result<IngestOutcome, IngestError> { self.pipeline.ingest(bytes) }

    /// Falla con `QueueClosed` si la cola no fue arrancada o ya se cerró.
    pub fn enqueue(&self, bytes: &[u8]) -> Result<QueueToken, IngestError> {
        match &self.queue {
            Some(queue) => queue.enqueue(bytes),
            None => Err(IngestError::QueueClosed),
        }
    }

    // --- mantenimiento

    pub fn prune_older_than(&self, days: i64) -> Result<SweepSummary, StoreError> { self.retention.prune_older_than(days) }

    pub fn compact_unchanged(&self) -> Result<SweepSummary, StoreError> { self.retention.compact_unchanged() }

    pub fn mark_orphaned(&self, threshold_secs: i64) -> Result<usize, StoreError> { self.retention.mark_orphaned(threshold_secs) }

    pub fn purge_orphaned(&self, days: i64) -> Result<PurgeSummary, StoreError> { self.retention.purge_orphaned(days) }

    pub fn prune_history(&self, retain_days: usize) -> Result<usize, StoreError> { self.retention.prune_history(retain_days) }

    pub fn sweep_staging(&self, max_age: Duration) -> SweepSummary { self.retention.sweep_staging(max_age) }

    /// Pasada completa con la política configurada: marcar huérfanos, purgar
    /// huérfanos viejos, retención por edad, historia y staging.
    /// La compactación de `unchanged` queda fuera (es opcional y explícita).
    pub fn run_maintenance(&self) -> Result<MaintenanceReport, StoreError> {
        let policy = &self.config.retention;
        let report = MaintenanceReport { orphaned: self.mark_orphaned(policy.orphan_threshold_secs)?,
                                         purged: self.purge_orphaned(policy.orphan_purge_days)?,
                                         aged_out: self.prune_older_than(policy.report_retention_days)?,
                                         history_pruned: self.prune_history(policy.history_retain_days)?,
                                         staging: self.sweep_staging(policy.staging_max_age) };
        info!("ledger:maintenance orphaned={} purged_hosts={} aged_out={} history_pruned={}",
              report.orphaned, report.purged.hosts, report.aged_out.rows, report.history_pruned);
        Ok(report)
    }

    // --- lecturas

    pub fn list_hosts(&self) -> Result<Vec<Host>, StoreError> { self.registry.list_hosts() }

    pub fn host(&self, fqdn: &Fqdn) -> Result<Option<Host>, StoreError> { self.registry.host(fqdn) }

    /// Hosts cuyo fqdn contiene `term` (literal, sensible a mayúsculas).
    pub fn search_hosts(&self, term: &str) -> Result<Vec<Host>, StoreError> { self.registry.search_hosts(term) }

    pub fn hosts_in_state(&self, state: HostState) -> Result<Vec<Host>, StoreError> { self.registry.hosts_in_state(state) }

    pub fn set_pinned(&self, fqdn: &Fqdn, pinned: bool) -> Result<(), StoreError> { self.registry.set_pinned(fqdn, pinned) }

    pub fn state_summary(&self) -> Result<Vec<StateCount>, StoreError> { self.registry.state_summary() }

    /// Reportes más recientes primero; `limit` por defecto según configuración.
    pub fn reports_for_host(&self, fqdn: &Fqdn, limit: Option<usize>) -> Result<Vec<ReportSummary>, StoreError> {
        self.store.reports_for_host(fqdn, limit.unwrap_or(self.config.report_list_limit))
    }

    pub fn history_buckets(&self) -> Result<Vec<HistoryBucket>, StoreError> { self.history.all_buckets() }

    /// Bytes crudos del reporte `id`.
    pub fn report_by_identifier(&self, id: i64) -> Result<Vec<u8>, IngestError> {
        let report = self.store.report(id)?.ok_or(IngestError::NotFound(id))?;
        if report.is_pruned() {
            return Err(IngestError::ArtifactPruned(id));
        }
        self.artifacts.read(&report.yaml_file)
    }

    pub fn count_reports(&self) -> Result<i64, StoreError> { self.store.count_reports() }

    pub fn count_pruned_reports(&self) -> Result<i64, StoreError> { self.store.count_pruned_reports() }

    /// Drena la cola (si estaba arrancada) y libera el store.
    pub fn shutdown(mut self) {
        if let Some(mut queue) = self.queue.take() {
            let pending = queue.pending();
            if pending > 0 {
                warn!("ledger:shutdown draining pending={pending}");
            }
            queue.shutdown();
        }
        info!("ledger:closed");
    }
}
