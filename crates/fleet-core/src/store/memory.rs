use std::collections::BTreeMap;

use fleet_domain::{ContentHash, Fqdn, HostState, ReportState};
use parking_lot::Mutex;

use super::ReportStore;
use crate::constants::PRUNED_SENTINEL;
use crate::errors::StoreError;
use crate::model::{ArtifactRef, HistoryBucket, HistoryDelta, Host, HostSnapshot, IngestionRecord, RecordOutcome,
                   ReportSummary};

#[derive(Default)]
struct Tables {
    hosts: BTreeMap<i64, Host>,
    reports: BTreeMap<i64, ReportSummary>,
    history: BTreeMap<String, HistoryBucket>,
    next_host_id: i64,
    next_report_id: i64,
}

impl Tables {
    fn host_id_of(&self, fqdn: &Fqdn) -> Option<i64> {
        self.hosts.values().find(|h| &h.fqdn == fqdn).map(|h| h.host_id)
    }

    fn upsert_host(&mut self, snapshot: &HostSnapshot) -> i64 {
        let host_id = match self.host_id_of(&snapshot.fqdn) {
            Some(id) => id,
            None => {
                self.next_host_id += 1;
                let id = self.next_host_id;
                self.hosts.insert(id,
                                  Host { host_id: id,
                                         fqdn: snapshot.fqdn.clone(),
                                         state: HostState::Pending,
                                         last_seen: 0,
                                         runtime: 0.0,
                                         role: String::new(),
                                         branch: String::new(),
                                         build_time: 0,
                                         pinned: false });
                id
            }
        };
        if let Some(host) = self.hosts.get_mut(&host_id) {
            host.state = snapshot.state;
            host.last_seen = snapshot.last_seen;
            host.runtime = snapshot.runtime;
            host.role = snapshot.role.clone();
            host.branch = snapshot.branch.clone();
            host.build_time = snapshot.build_time;
        }
        host_id
    }

    fn increment_history(&mut self, date: &str, delta: HistoryDelta) {
        self.history
            .entry(date.to_string())
            .or_insert_with(|| HistoryBucket::empty(date))
            .apply(delta);
    }

    fn find_report(&self, fqdn: &Fqdn, hash: &ContentHash) -> Option<&ReportSummary> {
        self.reports.values().find(|r| &r.fqdn == fqdn && &r.content_hash == hash)
    }
}

/// Report Store en memoria protegido por un único mutex; cada operación del
/// trait es atómica respecto de las demás.
#[derive(Default)]
pub struct InMemoryReportStore {
    inner: Mutex<Tables>,
}

impl InMemoryReportStore {
    pub fn new() -> Self { Self::default() }
}

impl ReportStore for InMemoryReportStore {
    fn record_ingestion(&self, record: &IngestionRecord) -> Result<RecordOutcome, StoreError> {
        let mut t = self.inner.lock();
        if let Some(existing) = t.find_report(&record.report.fqdn, &record.report.content_hash) {
            return Ok(RecordOutcome::AlreadyRecorded { report_id: existing.id });
        }
        let host_id = t.upsert_host(&record.host);
        t.next_report_id += 1;
        let report_id = t.next_report_id;
        let r = &record.report;
        t.reports.insert(report_id,
                         ReportSummary { id: report_id,
                                         host_id,
                                         fqdn: r.fqdn.clone(),
                                         state: r.state,
                                         yaml_file: r.yaml_file.clone(),
                                         content_hash: r.content_hash.clone(),
                                         runtime: r.runtime,
                                         executed_at: r.executed_at,
                                         role: r.role.clone(),
                                         branch: r.branch.clone(),
                                         build_time: r.build_time,
                                         total: r.total,
                                         skipped: r.skipped,
                                         failed: r.failed,
                                         changed: r.changed });
        t.increment_history(&record.history_date, record.history_delta);
        Ok(RecordOutcome::Inserted { host_id, report_id })
    }

    fn upsert_host(&self, snapshot: &HostSnapshot) -> Result<i64, StoreError> { Ok(self.inner.lock().upsert_host(snapshot)) }

    fn find_host(&self, fqdn: &Fqdn) -> Result<Option<Host>, StoreError> {
        Ok(self.inner.lock().hosts.values().find(|h| &h.fqdn == fqdn).cloned())
    }

    fn list_hosts(&self) -> Result<Vec<Host>, StoreError> {
        let mut hosts: Vec<Host> = self.inner.lock().hosts.values().cloned().collect();
        hosts.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        Ok(hosts)
    }

    fn hosts_in_state(&self, state: HostState) -> Result<Vec<Host>, StoreError> {
        Ok(self.list_hosts()?.into_iter().filter(|h| h.state == state).collect())
    }

    fn set_pinned(&self, fqdn: &Fqdn, pinned: bool) -> Result<bool, StoreError> {
        let mut t = self.inner.lock();
        match t.hosts.values_mut().find(|h| &h.fqdn == fqdn) {
            Some(host) => {
                host.pinned = pinned;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mark_orphaned_before(&self, cutoff: i64) -> Result<usize, StoreError> {
        let mut t = self.inner.lock();
        let mut n = 0;
        for host in t.hosts.values_mut() {
            if host.last_seen < cutoff && host.state != HostState::Orphaned {
                host.state = HostState::Orphaned;
                n += 1;
            }
        }
        Ok(n)
    }

    fn purgeable_hosts(&self, cutoff: i64) -> Result<Vec<Host>, StoreError> {
        Ok(self.inner
               .lock()
               .hosts
               .values()
               .filter(|h| h.state == HostState::Orphaned && !h.pinned && h.last_seen < cutoff)
               .cloned()
               .collect())
    }

    fn delete_orphaned_host(&self, host_id: i64, cutoff: i64) -> Result<Option<Vec<String>>, StoreError> {
        let mut t = self.inner.lock();
        let eligible = t.hosts
                        .get(&host_id)
                        .is_some_and(|h| h.state == HostState::Orphaned && !h.pinned && h.last_seen < cutoff);
        if !eligible {
            return Ok(None);
        }
        let paths: Vec<String> = t.reports
                                  .values()
                                  .filter(|r| r.host_id == host_id)
                                  .map(|r| r.yaml_file.clone())
                                  .collect();
        t.reports.retain(|_, r| r.host_id != host_id);
        t.hosts.remove(&host_id);
        Ok(Some(paths))
    }

    fn search_hosts(&self, term: &str) -> Result<Vec<Host>, StoreError> {
        Ok(self.list_hosts()?.into_iter().filter(|h| h.fqdn.as_str().contains(term)).collect())
    }

    fn reports_for_host(&self, fqdn: &Fqdn, limit: usize) -> Result<Vec<ReportSummary>, StoreError> {
        let t = self.inner.lock();
        let mut rows: Vec<ReportSummary> = t.reports.values().filter(|r| &r.fqdn == fqdn).cloned().collect();
        rows.sort_by(|a, b| b.executed_at.cmp(&a.executed_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    fn report(&self, id: i64) -> Result<Option<ReportSummary>, StoreError> { Ok(self.inner.lock().reports.get(&id).cloned()) }

    fn find_report(&self, fqdn: &Fqdn, hash: &ContentHash) -> Result<Option<ReportSummary>, StoreError> {
        Ok(self.inner.lock().find_report(fqdn, hash).cloned())
    }

    fn reports_executed_before(&self, cutoff: i64) -> Result<Vec<ArtifactRef>, StoreError> {
        Ok(self.inner
               .lock()
               .reports
               .values()
               .filter(|r| r.executed_at < cutoff)
               .map(|r| ArtifactRef { id: r.id,
                                      yaml_file: r.yaml_file.clone() })
               .collect())
    }

    fn delete_reports_executed_before(&self, cutoff: i64) -> Result<usize, StoreError> {
        let mut t = self.inner.lock();
        let before = t.reports.len();
        t.reports.retain(|_, r| r.executed_at >= cutoff);
        Ok(before - t.reports.len())
    }

    fn unchanged_unpruned_reports(&self) -> Result<Vec<ArtifactRef>, StoreError> {
        Ok(self.inner
               .lock()
               .reports
               .values()
               .filter(|r| r.state == ReportState::Unchanged && r.yaml_file != PRUNED_SENTINEL)
               .map(|r| ArtifactRef { id: r.id,
                                      yaml_file: r.yaml_file.clone() })
               .collect())
    }

    fn mark_reports_pruned(&self, ids: &[i64]) -> Result<usize, StoreError> {
        let mut t = self.inner.lock();
        let mut n = 0;
        for id in ids {
            if let Some(r) = t.reports.get_mut(id) {
                r.yaml_file = PRUNED_SENTINEL.to_string();
                n += 1;
            }
        }
        Ok(n)
    }

    fn count_reports(&self) -> Result<i64, StoreError> { Ok(self.inner.lock().reports.len() as i64) }

    fn count_pruned_reports(&self) -> Result<i64, StoreError> {
        Ok(self.inner.lock().reports.values().filter(|r| r.yaml_file == PRUNED_SENTINEL).count() as i64)
    }

    fn increment_history(&self, date: &str, delta: HistoryDelta) -> Result<(), StoreError> {
        self.inner.lock().increment_history(date, delta);
        Ok(())
    }

    fn history_buckets(&self) -> Result<Vec<HistoryBucket>, StoreError> {
        Ok(self.inner.lock().history.values().cloned().collect())
    }

    fn prune_history(&self, retain: usize) -> Result<usize, StoreError> {
        let mut t = self.inner.lock();
        let excess = t.history.len().saturating_sub(retain);
        let oldest: Vec<String> = t.history.keys().take(excess).cloned().collect();
        for date in &oldest {
            t.history.remove(date);
        }
        Ok(oldest.len())
    }
}
