//! Host Registry: snapshot por host, detección y purga de huérfanos, pinning.

use std::sync::Arc;

use fleet_domain::{Fqdn, HostState, Report};
use log::{debug, info, warn};

use crate::artifacts::ArtifactStore;
use crate::clock::{cutoff_before, Clock};
use crate::constants::SECONDS_PER_DAY;
use crate::errors::StoreError;
use crate::model::{Host, HostSnapshot, PurgeSummary, StateCount, SweepSummary};
use crate::store::ReportStore;

pub struct HostRegistry {
    store: Arc<dyn ReportStore>,
    artifacts: ArtifactStore,
    clock: Arc<dyn Clock>,
}

impl HostRegistry {
    pub fn new(store: Arc<dyn ReportStore>, artifacts: ArtifactStore, clock: Arc<dyn Clock>) -> Self {
        Self { store,
               artifacts,
               clock }
    }

    /// Snapshot que deja una ingesta de `report` observada en `seen_at`.
    pub fn snapshot_for(report: &Report, seen_at: i64) -> HostSnapshot {
        HostSnapshot { fqdn: report.fqdn.clone(),
                       state: report.state.into(),
                       last_seen: seen_at,
                       runtime: report.runtime,
                       role: report.role.clone(),
                       branch: report.branch.clone(),
                       build_time: report.build_time }
    }

    pub fn upsert_on_ingestion(&self, snapshot: &HostSnapshot) -> Result<i64, StoreError> {
        let host_id = self.store.upsert_host(snapshot)?;
        debug!("registry:upsert fqdn={} host_id={host_id} state={}", snapshot.fqdn, snapshot.state);
        Ok(host_id)
    }

    /// Marca como huérfanos los hosts con `last_seen < now - threshold_secs`.
    pub fn mark_orphaned(&self, threshold_secs: i64) -> Result<usize, StoreError> {
        let cutoff = cutoff_before(self.clock.now(), threshold_secs, 1)?;
        let n = self.store.mark_orphaned_before(cutoff)?;
        if n > 0 {
            info!("registry:orphaned count={n} cutoff={cutoff}");
        }
        Ok(n)
    }

    /// Borra hosts huérfanos no fijados sin reportes en `threshold_days`,
    /// junto con sus reportes. Las filas se borran primero (re-verificando la
    /// elegibilidad) y después sólo los artifacts de las filas borradas.
    pub fn purge_orphaned(&self, threshold_days: i64) -> Result<PurgeSummary, StoreError> {
        let cutoff = cutoff_before(self.clock.now(), threshold_days, SECONDS_PER_DAY)?;
        let mut summary = PurgeSummary::default();
        for host in self.store.purgeable_hosts(cutoff)? {
            let Some(paths) = self.store.delete_orphaned_host(host.host_id, cutoff)? else {
                warn!("registry:purge_skipped fqdn={} reason=no_longer_eligible", host.fqdn);
                continue;
            };
            let mut removal = SweepSummary::default();
            for path in &paths {
                self.artifacts.remove_best_effort(path).tally(&mut removal);
            }
            summary.hosts += 1;
            summary.reports += paths.len();
            summary.artifacts_removed += removal.artifacts_removed;
            summary.artifact_failures += removal.artifact_failures;
            self.artifacts.remove_host_dir_if_empty(&host.fqdn);
            debug!("registry:purged fqdn={} reports={}", host.fqdn, paths.len());
        }
        if summary.hosts > 0 {
            info!("registry:purge_done hosts={} reports={} artifacts={} failures={}",
                  summary.hosts, summary.reports, summary.artifacts_removed, summary.artifact_failures);
        }
        Ok(summary)
    }

    pub fn set_pinned(&self, fqdn: &Fqdn, pinned: bool) -> Result<(), StoreError> {
        if self.store.set_pinned(fqdn, pinned)? {
            info!("registry:pinned fqdn={fqdn} pinned={pinned}");
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    pub fn host(&self, fqdn: &Fqdn) -> Result<Option<Host>, StoreError> { self.store.find_host(fqdn) }

    pub fn list_hosts(&self) -> Result<Vec<Host>, StoreError> { self.store.list_hosts() }

    pub fn hosts_in_state(&self, state: HostState) -> Result<Vec<Host>, StoreError> { self.store.hosts_in_state(state) }

    /// Búsqueda por subcadena del fqdn; un término vacío es un error.
    pub fn search_hosts(&self, term: &str) -> Result<Vec<Host>, StoreError> {
        if term.is_empty() {
            return Err(StoreError::InvalidArgument("término de búsqueda vacío".to_string()));
        }
        self.store.search_hosts(term)
    }

    /// Conteo y porcentaje por estado conocido (orden alfabético). Los hosts
    /// aún sin snapshot cuentan en el total pero no tienen fila propia.
    pub fn state_summary(&self) -> Result<Vec<StateCount>, StoreError> {
        let hosts = self.store.list_hosts()?;
        let total = hosts.len();
        Ok(HostState::KNOWN.iter()
                           .map(|state| {
                               let count = hosts.iter().filter(|h| h.state == *state).count();
                               let percentage = if total == 0 { 0.0 } else { 100.0 * count as f64 / total as f64 };
                               StateCount { state: *state,
                                            count,
                                            percentage }
                           })
                           .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::{ArtifactRef, HistoryBucket, HistoryDelta, IngestionRecord, RecordOutcome, ReportSummary};
    use crate::pipeline::{IngestOutcome, IngestPipeline};
    use crate::store::InMemoryReportStore;
    use fleet_domain::{ContentHash, PuppetYamlParser, ReportState};

    const NOW: i64 = 1_700_000_000;

    fn registry() -> (HostRegistry, Arc<InMemoryReportStore>) {
        let store = Arc::new(InMemoryReportStore::new());
        let reg = HostRegistry::new(store.clone(), ArtifactStore::new("/nonexistent"), Arc::new(FixedClock::new(NOW)));
        (reg, store)
    }

    fn seen(reg: &HostRegistry, name: &str, state: ReportState, at: i64) {
        let report = Report::new(Fqdn::new(name).unwrap(), state);
        reg.upsert_on_ingestion(&HostRegistry::snapshot_for(&report, at)).unwrap();
    }

    #[test]
    fn orphan_boundary_is_strict() {
        let (reg, _) = registry();
        let threshold = 302_400;
        seen(&reg, "old", ReportState::Changed, NOW - threshold - 1);
        seen(&reg, "edge", ReportState::Changed, NOW - threshold);
        seen(&reg, "fresh", ReportState::Changed, NOW - threshold + 1);
        assert_eq!(reg.mark_orphaned(threshold).unwrap(), 1);
        let orphaned = reg.hosts_in_state(HostState::Orphaned).unwrap();
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].fqdn.as_str(), "old");
        // idempotente
        assert_eq!(reg.mark_orphaned(threshold).unwrap(), 0);
    }

    #[test]
    fn pinned_orphans_survive_purge() {
        let (reg, _) = registry();
        let long_ago = NOW - 40 * SECONDS_PER_DAY;
        seen(&reg, "keep", ReportState::Failed, long_ago);
        seen(&reg, "drop", ReportState::Failed, long_ago);
        reg.set_pinned(&Fqdn::new("keep").unwrap(), true).unwrap();
        reg.mark_orphaned(302_400).unwrap();

        let summary = reg.purge_orphaned(30).unwrap();
        assert_eq!(summary.hosts, 1);
        let left: Vec<String> = reg.list_hosts().unwrap().into_iter().map(|h| h.fqdn.to_string()).collect();
        assert_eq!(left, vec!["keep".to_string()]);
    }

    #[test]
    fn set_pinned_on_unknown_host_is_not_found() {
        let (reg, _) = registry();
        assert_eq!(reg.set_pinned(&Fqdn::new("ghost").unwrap(), true), Err(StoreError::NotFound));
    }

    #[test]
    fn state_summary_percentages() {
        let (reg, _) = registry();
        seen(&reg, "a", ReportState::Changed, NOW);
        seen(&reg, "b", ReportState::Changed, NOW);
        seen(&reg, "c", ReportState::Failed, NOW);
        seen(&reg, "d", ReportState::Unchanged, NOW);
        let summary = reg.state_summary().unwrap();
        let changed = summary.iter().find(|s| s.state == HostState::Changed).unwrap();
        assert_eq!(changed.count, 2);
        assert!((changed.percentage - 50.0).abs() < 1e-9);
        assert_eq!(summary.iter().map(|s| s.count).sum::<usize>(), 4);
    }

    #[test]
    fn negative_windows_are_rejected_and_huge_ones_are_no_ops() {
        let (reg, _) = registry();
        seen(&reg, "a", ReportState::Changed, NOW);
        assert!(matches!(reg.mark_orphaned(-1), Err(StoreError::InvalidArgument(_))));
        assert!(matches!(reg.purge_orphaned(-1), Err(StoreError::InvalidArgument(_))));
        assert_eq!(reg.mark_orphaned(i64::MAX).unwrap(), 0);
        assert_eq!(reg.purge_orphaned(i64::MAX).unwrap(), PurgeSummary::default());
        assert_eq!(reg.hosts_in_state(HostState::Changed).unwrap().len(), 1);
    }

    #[test]
    fn empty_search_term_is_rejected() {
        let (reg, _) = registry();
        seen(&reg, "web01", ReportState::Changed, NOW);
        assert!(matches!(reg.search_hosts(""), Err(StoreError::InvalidArgument(_))));
        assert_eq!(reg.search_hosts("eb0").unwrap().len(), 1);
    }

    /// Fija cada host justo después de listarlo como purgable, como haría un
    /// operador concurrente.
    struct PinAfterListing(InMemoryReportStore);

    impl ReportStore for PinAfterListing {
        fn record_ingestion(&self, r: &IngestionRecord) -> Result<RecordOutcome, StoreError> { self.0.record_ingestion(r) }
        fn upsert_host(&self, s: &HostSnapshot) -> Result<i64, StoreError> { self.0.upsert_host(s) }
        fn find_host(&self, f: &Fqdn) -> Result<Option<Host>, StoreError> { self.0.find_host(f) }
        fn list_hosts(&self) -> Result<Vec<Host>, StoreError> { self.0.list_hosts() }
        fn hosts_in_state(&self, s: HostState) -> Result<Vec<Host>, StoreError> { self.0.hosts_in_state(s) }
        fn set_pinned(&self, f: &Fqdn, p: bool) -> Result<bool, StoreError> { self.0.set_pinned(f, p) }
        fn mark_orphaned_before(&self, c: i64) -> Result<usize, StoreError> { self.0.mark_orphaned_before(c) }
        fn purgeable_hosts(&self, c: i64) -> Result<Vec<Host>, StoreError> {
            let hosts = self.0.purgeable_hosts(c)?;
            for h in &hosts {
                self.0.set_pinned(&h.fqdn, true)?;
            }
            Ok(hosts)
        }
        fn delete_orphaned_host(&self, id: i64, c: i64) -> Result<Option<Vec<String>>, StoreError> {
            self.0.delete_orphaned_host(id, c)
        }
        fn search_hosts(&self, t: &str) -> Result<Vec<Host>, StoreError> { self.0.search_hosts(t) }
        fn reports_for_host(&self, f: &Fqdn, l: usize) -> Result<Vec<ReportSummary>, StoreError> { self.0.reports_for_host(f, l) }
        fn report(&self, id: i64) -> Result<Option<ReportSummary>, StoreError> { self.0.report(id) }
        fn find_report(&self, f: &Fqdn, h: &ContentHash) -> Result<Option<ReportSummary>, StoreError> { self.0.find_report(f, h) }
        fn reports_executed_before(&self, c: i64) -> Result<Vec<ArtifactRef>, StoreError> { self.0.reports_executed_before(c) }
        fn delete_reports_executed_before(&self, c: i64) -> Result<usize, StoreError> { self.0.delete_reports_executed_before(c) }
        fn unchanged_unpruned_reports(&self) -> Result<Vec<ArtifactRef>, StoreError> { self.0.unchanged_unpruned_reports() }
        fn mark_reports_pruned(&self, ids: &[i64]) -> Result<usize, StoreError> { self.0.mark_reports_pruned(ids) }
        fn count_reports(&self) -> Result<i64, StoreError> { self.0.count_reports() }
        fn count_pruned_reports(&self) -> Result<i64, StoreError> { self.0.count_pruned_reports() }
        fn increment_history(&self, d: &str, delta: HistoryDelta) -> Result<(), StoreError> { self.0.increment_history(d, delta) }
        fn history_buckets(&self) -> Result<Vec<HistoryBucket>, StoreError> { self.0.history_buckets() }
        fn prune_history(&self, r: usize) -> Result<usize, StoreError> { self.0.prune_history(r) }
    }

    #[test]
    fn host_pinned_mid_purge_keeps_rows_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(NOW - 40 * SECONDS_PER_DAY));
        let store = Arc::new(PinAfterListing(InMemoryReportStore::new()));
        let artifacts = ArtifactStore::new(dir.path());
        let pipeline = IngestPipeline::new(store.clone(), artifacts.clone(), Arc::new(PuppetYamlParser), clock.clone());
        let IngestOutcome::Recorded { report_id, .. } = pipeline.ingest(b"host: late\nstatus: failed\n").unwrap() else {
            panic!("expected record")
        };
        clock.set(NOW);
        let reg = HostRegistry::new(store.clone(), artifacts.clone(), clock);
        reg.mark_orphaned(302_400).unwrap();

        let summary = reg.purge_orphaned(30).unwrap();
        assert_eq!(summary, PurgeSummary::default());
        let row = store.report(report_id).unwrap().unwrap();
        assert!(artifacts.read(&row.yaml_file).is_ok());
        assert!(store.find_host(&Fqdn::new("late").unwrap()).unwrap().unwrap().pinned);
    }
}
