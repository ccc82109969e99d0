//! Ingestion Pipeline: bytes crudos → artifact en disco + filas en el store.
//!
//! Orden de efectos:
//! 1. parseo (un `ParseError` no deja rastro),
//! 2. hash de contenido y chequeo de duplicado por existencia del artifact,
//! 3. escritura atómica del artifact,
//! 4. una transacción: upsert de host + insert de reporte + incremento de historia.
//!
//! Un fallo en (4) deja el artifact escrito; reenviar el mismo reporte es
//! entonces un duplicado silencioso.

use std::sync::Arc;

use fleet_domain::{ContentHash, Fqdn, Report, ReportParser};
use log::{debug, info, warn};

use crate::artifacts::ArtifactStore;
use crate::clock::Clock;
use crate::errors::IngestError;
use crate::history::HistoryAggregator;
use crate::model::{HistoryDelta, IngestionRecord, NewReport, RecordOutcome};
use crate::registry::HostRegistry;
use crate::store::ReportStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Recorded { fqdn: Fqdn, report_id: i64 },
    Duplicate { fqdn: Fqdn },
}

impl IngestOutcome {
    pub fn fqdn(&self) -> &Fqdn {
        match self {
            IngestOutcome::Recorded { fqdn, .. } | IngestOutcome::Duplicate { fqdn } => fqdn,
        }
    }

    pub fn is_duplicate(&self) -> bool { matches!(self, IngestOutcome::Duplicate { .. }) }
}

pub struct IngestPipeline {
    store: Arc<dyn ReportStore>,
    artifacts: ArtifactStore,
    parser: Arc<dyn ReportParser>,
    clock: Arc<dyn Clock>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn ReportStore>,
               artifacts: ArtifactStore,
               parser: Arc<dyn ReportParser>,
               clock: Arc<dyn Clock>)
               -> Self {
        Self { store,
               artifacts,
               parser,
               clock }
    }

    pub fn artifacts(&self) -> &ArtifactStore { &self.artifacts }

    pub fn ingest(&self, bytes: &[u8]) -> Result<IngestOutcome, IngestError> {
        let report = self.parser.parse(bytes)?;
        let hash = report.hash.clone().unwrap_or_else(|| ContentHash::of(bytes));
        let fqdn = report.fqdn.clone();
        debug!("ingest:parsed fqdn={fqdn} state={} hash={hash}", report.state);

        if self.artifacts.exists(&fqdn, &hash) {
            info!("ingest:duplicate fqdn={fqdn} hash={hash}");
            return Ok(IngestOutcome::Duplicate { fqdn });
        }
        self.artifacts.write(&fqdn, &hash, bytes)?;

        let relative = ArtifactStore::relative_path(&fqdn, &hash);
        let record = Self::record_for(&report, hash, relative.clone(), self.clock.now());
        match self.store.record_ingestion(&record)? {
            RecordOutcome::Inserted { report_id, .. } => {
                info!("ingest:recorded fqdn={fqdn} report_id={report_id} state={}", report.state);
                Ok(IngestOutcome::Recorded { fqdn, report_id })
            }
            RecordOutcome::AlreadyRecorded { report_id } => {
                // la fila existente ya no apunta a este archivo (p.ej. compactada)
                let existing = self.store.report(report_id)?.map(|r| r.yaml_file);
                if existing.as_deref() != Some(relative.as_str()) {
                    self.artifacts.remove_best_effort(&relative);
                }
                warn!("ingest:duplicate_row fqdn={fqdn} report_id={report_id}");
                Ok(IngestOutcome::Duplicate { fqdn })
            }
        }
    }

    fn record_for(report: &Report, hash: ContentHash, yaml_file: String, now: i64) -> IngestionRecord {
        IngestionRecord { host: HostRegistry::snapshot_for(report, now),
                          report: NewReport { fqdn: report.fqdn.clone(),
                                              state: report.state,
                                              yaml_file,
                                              content_hash: hash,
                                              runtime: report.runtime,
                                              executed_at: now,
                                              role: report.role.clone(),
                                              branch: report.branch.clone(),
                                              build_time: report.build_time,
                                              total: report.total,
                                              skipped: report.skipped,
                                              failed: report.failed,
                                              changed: report.changed },
                          history_date: HistoryAggregator::date_key(now),
                          history_delta: HistoryDelta::from(report.state) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::InMemoryReportStore;
    use fleet_domain::PuppetYamlParser;

    fn pipeline(root: &std::path::Path) -> (IngestPipeline, Arc<InMemoryReportStore>) {
        let store = Arc::new(InMemoryReportStore::new());
        let p = IngestPipeline::new(store.clone(),
                                    ArtifactStore::new(root),
                                    Arc::new(PuppetYamlParser),
                                    Arc::new(FixedClock::new(1_709_287_200)));
        (p, store)
    }

    #[test]
    fn parse_failure_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let (p, store) = pipeline(dir.path());
        let err = p.ingest(b"status: changed\n").unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
        assert_eq!(store.count_reports().unwrap(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn duplicate_row_after_compaction_drops_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (p, store) = pipeline(dir.path());
        let body = b"host: a.example\nstatus: unchanged\n";
        let IngestOutcome::Recorded { report_id, .. } = p.ingest(body).unwrap() else { panic!("expected record") };

        // compactación: artifact borrado, fila marcada
        let rel = store.report(report_id).unwrap().unwrap().yaml_file;
        p.artifacts().remove_best_effort(&rel);
        store.mark_reports_pruned(&[report_id]).unwrap();

        let again = p.ingest(body).unwrap();
        assert!(again.is_duplicate());
        assert_eq!(store.count_reports().unwrap(), 1);
        assert!(p.artifacts().resolve(&rel).is_some_and(|path| !path.exists()));
    }
}
