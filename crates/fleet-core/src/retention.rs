//! Retention Manager: barridos periódicos de mantenimiento.
//!
//! Todos los barridos son idempotentes. Los artifacts se borran (best-effort)
//! antes de tocar las filas; un fallo al borrar se cuenta y se registra pero
//! no impide la mutación de la fila.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::artifacts::{ArtifactStore, StagingArea};
use crate::clock::{cutoff_before, Clock};
use crate::constants::{MARK_BATCH_SIZE, SECONDS_PER_DAY};
use crate::errors::StoreError;
use crate::history::HistoryAggregator;
use crate::model::{PurgeSummary, SweepSummary};
use crate::registry::HostRegistry;
use crate::store::ReportStore;

pub struct RetentionManager {
    store: Arc<dyn ReportStore>,
    artifacts: ArtifactStore,
    registry: Arc<HostRegistry>,
    history: Arc<HistoryAggregator>,
    staging: StagingArea,
    clock: Arc<dyn Clock>,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn ReportStore>,
               artifacts: ArtifactStore,
               registry: Arc<HostRegistry>,
               history: Arc<HistoryAggregator>,
               staging: StagingArea,
               clock: Arc<dyn Clock>)
               -> Self {
        Self { store,
               artifacts,
               registry,
               history,
               staging,
               clock }
    }

    /// Borra reportes con `executed_at < now - days`.
    pub fn prune_older_than(&self, days: i64) -> Result<SweepSummary, StoreError> {
        let cutoff = cutoff_before(self.clock.now(), days, SECONDS_PER_DAY)?;
        let mut summary = SweepSummary::default();
        for artifact in self.store.reports_executed_before(cutoff)? {
            self.artifacts.remove_best_effort(&artifact.yaml_file).tally(&mut summary);
        }
        summary.rows = self.store.delete_reports_executed_before(cutoff)?;
        info!("retention:prune_older_than days={days} rows={} artifacts={} failures={}",
              summary.rows, summary.artifacts_removed, summary.artifact_failures);
        Ok(summary)
    }

    /// Borra los artifacts de reportes `unchanged` y marca exactamente esas
    /// filas con el centinela `pruned`.
    pub fn compact_unchanged(&self) -> Result<SweepSummary, StoreError> {
        let mut summary = SweepSummary::default();
        let visited = self.store.unchanged_unpruned_reports()?;
        for artifact in &visited {
            self.artifacts.remove_best_effort(&artifact.yaml_file).tally(&mut summary);
        }
        let ids: Vec<i64> = visited.iter().map(|a| a.id).collect();
        for chunk in ids.chunks(MARK_BATCH_SIZE) {
            summary.rows += self.store.mark_reports_pruned(chunk)?;
        }
        info!("retention:compact_unchanged rows={} artifacts={} failures={}",
              summary.rows, summary.artifacts_removed, summary.artifact_failures);
        Ok(summary)
    }

    pub fn mark_orphaned(&self, threshold_secs: i64) -> Result<usize, StoreError> { self.registry.mark_orphaned(threshold_secs) }

    pub fn purge_orphaned(&self, days: i64) -> Result<PurgeSummary, StoreError> { self.registry.purge_orphaned(days) }

    pub fn prune_history(&self, retain_days: usize) -> Result<usize, StoreError> { self.history.prune(retain_days) }

    /// Borra restos de staging y temporales `.partial` de escrituras de
    /// artifacts interrumpidas, más viejos que `max_age`.
    pub fn sweep_staging(&self, max_age: Duration) -> SweepSummary {
        let mut summary = self.staging.sweep_older_than(max_age);
        summary.merge(self.artifacts.sweep_partials_older_than(max_age));
        if summary.rows > 0 || summary.artifact_failures > 0 {
            info!("retention:sweep_staging removed={} failures={}", summary.rows, summary.artifact_failures);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::pipeline::{IngestOutcome, IngestPipeline};
    use crate::store::InMemoryReportStore;
    use fleet_domain::PuppetYamlParser;

    const T0: i64 = 1_709_287_200;

    struct Fixture {
        _dir: tempfile::TempDir,
        clock: Arc<FixedClock>,
        store: Arc<InMemoryReportStore>,
        pipeline: IngestPipeline,
        retention: RetentionManager,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(T0));
        let store = Arc::new(InMemoryReportStore::new());
        let artifacts = ArtifactStore::new(dir.path().join("reports"));
        let registry = Arc::new(HostRegistry::new(store.clone(), artifacts.clone(), clock.clone()));
        let history = Arc::new(HistoryAggregator::new(store.clone()));
        let pipeline = IngestPipeline::new(store.clone(), artifacts.clone(), Arc::new(PuppetYamlParser), clock.clone());
        let retention = RetentionManager::new(store.clone(),
                                              artifacts,
                                              registry,
                                              history,
                                              StagingArea::new(dir.path().join("staging")),
                                              clock.clone());
        Fixture { _dir: dir,
                  clock,
                  store,
                  pipeline,
                  retention }
    }

    fn ingest(f: &Fixture, host: &str, status: &str, salt: u32) -> i64 {
        let doc = format!("host: {host}\nstatus: {status}\nconfiguration_version: {salt}\n");
        match f.pipeline.ingest(doc.as_bytes()).unwrap() {
            IngestOutcome::Recorded { report_id, .. } => report_id,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prune_older_than_deletes_rows_and_artifacts() {
        let f = fixture();
        let old = ingest(&f, "a", "changed", 1);
        f.clock.advance(20 * SECONDS_PER_DAY);
        let fresh = ingest(&f, "a", "changed", 2);
        let old_path = f.pipeline.artifacts().resolve(&f.store.report(old).unwrap().unwrap().yaml_file).unwrap();

        let summary = f.retention.prune_older_than(14).unwrap();
        assert_eq!(summary.rows, 1);
        assert_eq!(summary.artifacts_removed, 1);
        assert!(!old_path.exists());
        assert!(f.store.report(old).unwrap().is_none());
        assert!(f.store.report(fresh).unwrap().is_some());
        // idempotente
        assert_eq!(f.retention.prune_older_than(14).unwrap(), SweepSummary::default());
    }

    #[test]
    fn compaction_marks_only_unchanged_rows() {
        let f = fixture();
        let unchanged = ingest(&f, "a", "unchanged", 1);
        let failed = ingest(&f, "a", "failed", 2);

        let summary = f.retention.compact_unchanged().unwrap();
        assert_eq!(summary.rows, 1);
        assert_eq!(summary.artifacts_removed, 1);
        assert!(f.store.report(unchanged).unwrap().unwrap().is_pruned());
        assert!(!f.store.report(failed).unwrap().unwrap().is_pruned());
        assert_eq!(f.store.count_pruned_reports().unwrap(), 1);

        assert_eq!(f.retention.compact_unchanged().unwrap().rows, 0);
    }

    #[test]
    fn prune_with_missing_artifact_still_deletes_row() {
        let f = fixture();
        let id = ingest(&f, "a", "unchanged", 1);
        f.retention.compact_unchanged().unwrap();
        f.clock.advance(30 * SECONDS_PER_DAY);
        let summary = f.retention.prune_older_than(14).unwrap();
        assert_eq!(summary.rows, 1);
        assert_eq!(summary.artifacts_removed, 0);
        assert!(f.store.report(id).unwrap().is_none());
    }

    #[test]
    fn negative_retention_is_rejected_and_huge_retention_keeps_everything() {
        let f = fixture();
        let id = ingest(&f, "a", "changed", 1);
        assert!(matches!(f.retention.prune_older_than(-1), Err(StoreError::InvalidArgument(_))));
        assert_eq!(f.retention.prune_older_than(i64::MAX).unwrap(), SweepSummary::default());
        assert!(f.store.report(id).unwrap().is_some());
        assert_eq!(f.store.count_reports().unwrap(), 1);
    }

    #[test]
    fn sweep_removes_stale_partial_writes_but_not_artifacts() {
        let f = fixture();
        let id = ingest(&f, "a", "changed", 1);
        let host_dir = f.pipeline.artifacts().root().join("a");
        let partial = host_dir.join(".deadbeef.0123.partial");
        std::fs::write(&partial, b"half a rep").unwrap();

        assert_eq!(f.retention.sweep_staging(Duration::from_secs(3_600)).rows, 0);
        assert!(partial.exists());
        let swept = f.retention.sweep_staging(Duration::ZERO);
        assert_eq!(swept.rows, 1);
        assert!(!partial.exists());
        let pointer = f.store.report(id).unwrap().unwrap().yaml_file;
        assert!(f.pipeline.artifacts().read(&pointer).is_ok());
    }
}
