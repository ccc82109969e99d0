//! Utilidades compartidas por los tests de integración de persistencia.
//!
//! Las funciones `check_*` son el contrato del `ReportStore`: se corren contra
//! el store en memoria, SQLite y (si hay `DATABASE_URL`) Postgres. Las que
//! tocan tablas completas (`history`, conteos globales) sólo se usan con bases
//! aisladas.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use fleet_core::{HistoryDelta, HostSnapshot, IngestionRecord, NewReport, RecordOutcome, ReportStore};
use fleet_domain::{ContentHash, Fqdn, HostState, ReportState};
use fleet_persistence::{DbConfig, PgReportStore, SqliteReportStore};
use once_cell::sync::Lazy;

pub const NOW: i64 = 1_709_287_200;

pub static PG_STORE: Lazy<Option<Arc<PgReportStore>>> = Lazy::new(|| {
    if std::env::var("DATABASE_URL").map(|u| !u.starts_with("postgres")).unwrap_or(true) {
        return None;
    }
    let cfg = DbConfig::from_env().ok()?;
    match PgReportStore::connect(&cfg.url, 1, 4) {
        Ok(s) => Some(Arc::new(s)),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

// Los checks de huérfanos marcan por `last_seen` en toda la tabla; sobre la
// base compartida se serializan.
static PG_LOCK: Mutex<()> = Mutex::new(());

pub fn with_pg<F, R>(f: F) -> Option<R>
    where F: FnOnce(&PgReportStore) -> R
{
    let store = PG_STORE.as_ref()?;
    let _guard = PG_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Some(f(store))
}

/// Base SQLite nueva en un directorio temporal (se borra al soltar el `TempDir`).
pub fn sqlite_store() -> (tempfile::TempDir, Arc<SqliteReportStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.db");
    let store = SqliteReportStore::connect(path.to_str().expect("utf8 path"), 1, 4).expect("sqlite store");
    (dir, Arc::new(store))
}

pub fn unique_fqdn(prefix: &str) -> Fqdn {
    Fqdn::new(&format!("{prefix}-{}.test", uuid::Uuid::new_v4().simple())).expect("fqdn")
}

pub fn record(fqdn: &Fqdn, body: &str, state: ReportState, at: i64) -> IngestionRecord {
    let hash = ContentHash::of(body.as_bytes());
    IngestionRecord { host: HostSnapshot { fqdn: fqdn.clone(),
                                           state: state.into(),
                                           last_seen: at,
                                           runtime: 3.5,
                                           role: "web".into(),
                                           branch: "production".into(),
                                           build_time: at - 60 },
                      report: NewReport { fqdn: fqdn.clone(),
                                          state,
                                          yaml_file: format!("{fqdn}/{hash}"),
                                          content_hash: hash,
                                          runtime: 3.5,
                                          executed_at: at,
                                          role: "web".into(),
                                          branch: "production".into(),
                                          build_time: at - 60,
                                          total: 10,
                                          skipped: 1,
                                          failed: if state == ReportState::Failed { 2 } else { 0 },
                                          changed: if state == ReportState::Changed { 3 } else { 0 } },
                      history_date: "2024/03/01".into(),
                      history_delta: state.into() }
}

fn inserted(outcome: RecordOutcome) -> (i64, i64) {
    match outcome {
        RecordOutcome::Inserted { host_id, report_id } => (host_id, report_id),
        other => panic!("expected insert, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Contrato con alcance por host (seguro sobre una base compartida)

pub fn check_record_is_idempotent(store: &dyn ReportStore) {
    let fqdn = unique_fqdn("idem");
    let rec = record(&fqdn, "body-a", ReportState::Changed, NOW);
    let (_, report_id) = inserted(store.record_ingestion(&rec).expect("first"));
    let again = store.record_ingestion(&rec).expect("second");
    assert_eq!(again, RecordOutcome::AlreadyRecorded { report_id });

    let rows = store.reports_for_host(&fqdn, 50).expect("reports");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.id, report_id);
    assert_eq!(row.state, ReportState::Changed);
    assert_eq!((row.total, row.skipped, row.failed, row.changed), (10, 1, 0, 3));
    assert_eq!(row.branch, "production");
    assert!((row.runtime - 3.5).abs() < f64::EPSILON);

    let host = store.find_host(&fqdn).expect("host").expect("exists");
    assert_eq!(host.state, HostState::Changed);
    assert_eq!(host.last_seen, NOW);
    assert_eq!(host.role, "web");
    assert!(!host.pinned);

    let found = store.find_report(&fqdn, &rec.report.content_hash).expect("find").expect("exists");
    assert_eq!(found.id, report_id);
}

pub fn check_snapshot_tracks_latest_and_keeps_pin(store: &dyn ReportStore) {
    let fqdn = unique_fqdn("snap");
    let (host_a, _) = inserted(store.record_ingestion(&record(&fqdn, "a", ReportState::Changed, NOW)).expect("a"));
    assert!(store.set_pinned(&fqdn, true).expect("pin"));
    let (host_b, _) = inserted(store.record_ingestion(&record(&fqdn, "b", ReportState::Failed, NOW + 3_600)).expect("b"));
    assert_eq!(host_a, host_b);

    let host = store.find_host(&fqdn).expect("host").expect("exists");
    assert_eq!(host.state, HostState::Failed);
    assert_eq!(host.last_seen, NOW + 3_600);
    assert!(host.pinned);

    let rows = store.reports_for_host(&fqdn, 50).expect("reports");
    assert_eq!(rows.iter().map(|r| r.state).collect::<Vec<_>>(), vec![ReportState::Failed, ReportState::Changed]);
    assert_eq!(store.reports_for_host(&fqdn, 1).expect("limited").len(), 1);
    assert!(!store.set_pinned(&unique_fqdn("ghost"), true).expect("pin ghost"));
}

/// Usa `last_seen` muy antiguos para no interferir con otros hosts.
pub fn check_orphan_purge_respects_pin(store: &dyn ReportStore) {
    let old = unique_fqdn("old");
    let pinned = unique_fqdn("pinned");
    let recent = unique_fqdn("recent");
    let (old_id, _) = inserted(store.record_ingestion(&record(&old, "o", ReportState::Unchanged, 10)).expect("old"));
    let (pinned_id, _) = inserted(store.record_ingestion(&record(&pinned, "p", ReportState::Unchanged, 10)).expect("pinned"));
    store.record_ingestion(&record(&recent, "r", ReportState::Unchanged, 30)).expect("recent");
    store.set_pinned(&pinned, true).expect("pin");

    assert!(store.mark_orphaned_before(20).expect("mark") >= 2);
    assert_eq!(store.find_host(&old).unwrap().unwrap().state, HostState::Orphaned);
    assert_eq!(store.find_host(&pinned).unwrap().unwrap().state, HostState::Orphaned);
    assert_eq!(store.find_host(&recent).unwrap().unwrap().state, HostState::Unchanged);

    let purgeable: Vec<i64> = store.purgeable_hosts(20).expect("purgeable").iter().map(|h| h.host_id).collect();
    assert!(purgeable.contains(&old_id));
    assert!(!purgeable.contains(&pinned_id));

    assert_eq!(store.delete_orphaned_host(pinned_id, 20).expect("pinned delete"), None);
    let paths = store.delete_orphaned_host(old_id, 20).expect("delete").expect("purged");
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with(old.as_str()));
    assert!(store.find_host(&old).unwrap().is_none());
    assert!(store.reports_for_host(&old, 50).unwrap().is_empty());
    assert!(store.find_host(&pinned).unwrap().is_some());
}

/// `last_seen == cutoff` no es huérfano ni purgable; sólo `< cutoff`.
pub fn check_orphan_boundary(store: &dyn ReportStore) {
    let edge = unique_fqdn("edge");
    let stale = unique_fqdn("stale");
    let (edge_id, _) = inserted(store.record_ingestion(&record(&edge, "e", ReportState::Changed, 5)).expect("edge"));
    let (stale_id, _) = inserted(store.record_ingestion(&record(&stale, "s", ReportState::Changed, 4)).expect("stale"));

    assert!(store.mark_orphaned_before(5).expect("mark") >= 1);
    assert_eq!(store.find_host(&edge).unwrap().unwrap().state, HostState::Changed);
    assert_eq!(store.find_host(&stale).unwrap().unwrap().state, HostState::Orphaned);

    let ids = |cutoff| -> Vec<i64> { store.purgeable_hosts(cutoff).expect("purgeable").iter().map(|h| h.host_id).collect() };
    assert!(ids(5).contains(&stale_id));
    assert!(!ids(5).contains(&edge_id));
    assert!(!ids(4).contains(&stale_id));

    assert_eq!(store.delete_orphaned_host(stale_id, 4).expect("edge delete"), None);
    assert!(store.find_host(&stale).unwrap().is_some());
    assert_eq!(store.delete_orphaned_host(stale_id, 5).expect("delete").map(|p| p.len()), Some(1));
    assert!(store.find_host(&stale).unwrap().is_none());
    assert_eq!(store.delete_orphaned_host(edge_id, 5).expect("live delete"), None);
}

/// Un host fijado sigue huérfano pero no se purga hasta soltarlo.
pub fn check_pinned_purge_exempt(store: &dyn ReportStore) {
    let fqdn = unique_fqdn("keep");
    let (host_id, report_id) = inserted(store.record_ingestion(&record(&fqdn, "k", ReportState::Failed, 2)).expect("keep"));
    store.mark_orphaned_before(3).expect("mark");
    assert!(store.set_pinned(&fqdn, true).expect("pin"));

    let host = store.find_host(&fqdn).unwrap().unwrap();
    assert_eq!((host.state, host.pinned), (HostState::Orphaned, true));
    assert!(!store.purgeable_hosts(3).unwrap().iter().any(|h| h.host_id == host_id));
    assert_eq!(store.delete_orphaned_host(host_id, 3).expect("pinned delete"), None);
    assert!(store.report(report_id).unwrap().is_some());

    assert!(store.set_pinned(&fqdn, false).expect("unpin"));
    assert!(store.delete_orphaned_host(host_id, 3).expect("delete").is_some());
    assert!(store.report(report_id).unwrap().is_none());
}

/// Subcadena literal y sensible a mayúsculas; `%` y `_` no son comodines.
pub fn check_search_hosts(store: &dyn ReportStore) {
    let token = format!("srch{}", uuid::Uuid::new_v4().simple());
    let literal = Fqdn::new(&format!("{token}_x%y.test")).expect("fqdn");
    let plain = Fqdn::new(&format!("{token}ax.test")).expect("fqdn");
    let upper = Fqdn::new(&format!("{}.test", token.to_uppercase())).expect("fqdn");
    for (i, fqdn) in [&literal, &plain, &upper].into_iter().enumerate() {
        store.record_ingestion(&record(fqdn, &format!("q{i}"), ReportState::Unchanged, NOW)).expect("record");
    }
    let names = |term: &str| -> Vec<String> {
        let mut v: Vec<String> = store.search_hosts(term).expect("search").into_iter().map(|h| h.fqdn.to_string()).collect();
        v.sort();
        v
    };

    let mut both = vec![literal.to_string(), plain.to_string()];
    both.sort();
    assert_eq!(names(&token), both);
    assert_eq!(names(&format!("{token}_")), vec![literal.to_string()]);
    assert_eq!(names(&format!("{token}_x%")), vec![literal.to_string()]);
    assert!(names(&format!("{token}a%")).is_empty());
    assert_eq!(names(&token.to_uppercase()), vec![upper.to_string()]);
    assert!(names(&format!("{token}-missing")).is_empty());
}

pub fn check_mark_pruned_touches_only_given_ids(store: &dyn ReportStore) {
    let fqdn = unique_fqdn("compact");
    let (_, a) = inserted(store.record_ingestion(&record(&fqdn, "a", ReportState::Unchanged, NOW)).expect("a"));
    let (_, b) = inserted(store.record_ingestion(&record(&fqdn, "b", ReportState::Unchanged, NOW + 1)).expect("b"));

    let candidates: Vec<i64> = store.unchanged_unpruned_reports().expect("candidates").iter().map(|r| r.id).collect();
    assert!(candidates.contains(&a) && candidates.contains(&b));

    assert_eq!(store.mark_reports_pruned(&[a]).expect("mark"), 1);
    assert!(store.report(a).unwrap().unwrap().is_pruned());
    assert!(!store.report(b).unwrap().unwrap().is_pruned());
    let candidates: Vec<i64> = store.unchanged_unpruned_reports().expect("candidates").iter().map(|r| r.id).collect();
    assert!(!candidates.contains(&a));
    assert_eq!(store.mark_reports_pruned(&[]).expect("empty"), 0);
}

// ---------------------------------------------------------------------------
// Contrato global (sólo bases aisladas)

pub fn check_history_counters_and_prune(store: &dyn ReportStore) {
    for day in 1..=20 {
        let date = format!("2024/01/{day:02}");
        store.increment_history(&date, HistoryDelta::for_label("changed")).expect("inc");
        store.increment_history(&date, HistoryDelta::for_label("failed")).expect("inc");
    }
    store.increment_history("2024/01/20", HistoryDelta::for_label("bogus")).expect("inc bogus");
    let buckets = store.history_buckets().expect("buckets");
    assert_eq!(buckets.len(), 20);
    assert!(buckets.windows(2).all(|w| w[0].date < w[1].date));
    assert_eq!((buckets[19].changed, buckets[19].failed, buckets[19].unchanged), (1, 1, 0));

    assert_eq!(store.prune_history(14).expect("prune"), 6);
    let dates: Vec<String> = store.history_buckets().unwrap().into_iter().map(|b| b.date).collect();
    assert_eq!(dates.len(), 14);
    assert_eq!(dates[0], "2024/01/07");
    assert_eq!(store.prune_history(14).expect("prune again"), 0);
    assert_eq!(store.prune_history(usize::MAX).expect("prune max"), 0);
    assert_eq!(store.history_buckets().unwrap().len(), 14);
}

pub fn check_age_prune_and_counts(store: &dyn ReportStore) {
    let fqdn = unique_fqdn("age");
    store.record_ingestion(&record(&fqdn, "old", ReportState::Unchanged, NOW - 20 * 86_400)).expect("old");
    store.record_ingestion(&record(&fqdn, "new", ReportState::Unchanged, NOW)).expect("new");
    assert_eq!(store.count_reports().unwrap(), 2);

    let cutoff = NOW - 14 * 86_400;
    let old = store.reports_executed_before(cutoff).expect("old refs");
    assert_eq!(old.len(), 1);
    store.mark_reports_pruned(&[old[0].id]).expect("mark");
    assert_eq!(store.count_pruned_reports().unwrap(), 1);

    assert_eq!(store.delete_reports_executed_before(cutoff).expect("delete"), 1);
    assert_eq!(store.count_reports().unwrap(), 1);
    assert_eq!(store.count_pruned_reports().unwrap(), 0);
    assert_eq!(store.hosts_in_state(HostState::Unchanged).unwrap().len(), 1);
    // la historia no se toca al borrar reportes
    assert_eq!(store.history_buckets().unwrap()[0].unchanged, 2);
}
