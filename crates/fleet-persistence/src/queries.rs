//! Consultas del ledger sobre Diesel.
//!
//! El DSL es el mismo para ambos motores pero Diesel lo tipa por backend, así
//! que `impl_ledger_connection!` estampa el mismo cuerpo para `PgConnection` y
//! `SqliteConnection`. Sólo se usan construcciones soportadas por los dos
//! (upsert con `ON CONFLICT ... DO NOTHING`, sin `RETURNING`).
//!
//! Los métodos con sufijo `_row` no abren transacción; los demás son la unidad
//! atómica que expone el store.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use fleet_core::constants::PRUNED_SENTINEL;
use fleet_core::{ArtifactRef, HistoryBucket, HistoryDelta, Host, HostSnapshot, IngestionRecord, RecordOutcome,
                 ReportSummary};
use fleet_domain::{HostState, ReportState};

use crate::backend::BackendConnection;
use crate::error::PersistenceError;
use crate::models::{convert_all, HostRow, HostSnapshotChanges, NewHistoryRow, NewHostRow, NewReportRow, ReportRow};
use crate::schema::{history, hosts, reports};

pub trait LedgerConnection: BackendConnection {
    fn ensure_host_row(&mut self, fqdn: &str) -> Result<i64, PersistenceError>;
    fn bump_history_row(&mut self, date: &str, delta: HistoryDelta) -> Result<(), PersistenceError>;

    fn record_ingestion(&mut self, record: &IngestionRecord) -> Result<RecordOutcome, PersistenceError>;
    fn upsert_host(&mut self, snapshot: &HostSnapshot) -> Result<i64, PersistenceError>;
    fn find_host(&mut self, fqdn: &str) -> Result<Option<Host>, PersistenceError>;
    fn list_hosts(&mut self, state: Option<HostState>) -> Result<Vec<Host>, PersistenceError>;
    fn set_pinned(&mut self, fqdn: &str, pinned: bool) -> Result<bool, PersistenceError>;
    fn mark_orphaned_before(&mut self, cutoff: i64) -> Result<usize, PersistenceError>;
    fn purgeable_hosts(&mut self, cutoff: i64) -> Result<Vec<Host>, PersistenceError>;
    fn search_hosts(&mut self, term: &str) -> Result<Vec<Host>, PersistenceError>;
    /// Devuelve los `yaml_file` de los reportes borrados, o `None` si el host
    /// dejó de ser purgable.
    fn delete_orphaned_host(&mut self, host_id: i64, cutoff: i64) -> Result<Option<Vec<String>>, PersistenceError>;

    fn reports_for_host(&mut self, fqdn: &str, limit: i64) -> Result<Vec<ReportSummary>, PersistenceError>;
    fn report(&mut self, id: i64) -> Result<Option<ReportSummary>, PersistenceError>;
    fn find_report(&mut self, fqdn: &str, hash: &str) -> Result<Option<ReportSummary>, PersistenceError>;
    fn reports_executed_before(&mut self, cutoff: i64) -> Result<Vec<ArtifactRef>, PersistenceError>;
    fn delete_reports_executed_before(&mut self, cutoff: i64) -> Result<usize, PersistenceError>;
    fn unchanged_unpruned_reports(&mut self) -> Result<Vec<ArtifactRef>, PersistenceError>;
    fn mark_reports_pruned(&mut self, ids: &[i64]) -> Result<usize, PersistenceError>;
    fn count_reports(&mut self) -> Result<i64, PersistenceError>;
    fn count_pruned_reports(&mut self) -> Result<i64, PersistenceError>;

    fn increment_history(&mut self, date: &str, delta: HistoryDelta) -> Result<(), PersistenceError>;
    fn history_buckets(&mut self) -> Result<Vec<HistoryBucket>, PersistenceError>;
    fn prune_history(&mut self, retain: usize) -> Result<usize, PersistenceError>;
}

fn artifact_refs(rows: Vec<(i64, String)>) -> Vec<ArtifactRef> {
    rows.into_iter()
        .map(|(id, yaml_file)| ArtifactRef { id, yaml_file })
        .collect()
}

/// Patrón `LIKE` de subcadena literal: escapa `\\`, `%` y `_`.
fn like_contains(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

macro_rules! impl_ledger_connection {
    ($conn:ty) => {
        impl LedgerConnection for $conn {
            fn ensure_host_row(&mut self, fqdn: &str) -> Result<i64, PersistenceError> {
                diesel::insert_into(hosts::table).values(NewHostRow { fqdn })
                                                 .on_conflict(hosts::fqdn)
                                                 .do_nothing()
                                                 .execute(self)?;
                Ok(hosts::table.filter(hosts::fqdn.eq(fqdn))
                               .select(hosts::host_id)
                               .first::<i64>(self)?)
            }

            fn bump_history_row(&mut self, date: &str, delta: HistoryDelta) -> Result<(), PersistenceError> {
                diesel::insert_into(history::table).values(NewHistoryRow { date })
                                                   .on_conflict(history::date)
                                                   .do_nothing()
                                                   .execute(self)?;
                if !delta.is_zero() {
                    diesel::update(history::table.filter(history::date.eq(date)))
                        .set((history::failed.eq(history::failed + delta.failed),
                              history::changed.eq(history::changed + delta.changed),
                              history::unchanged.eq(history::unchanged + delta.unchanged)))
                        .execute(self)?;
                }
                Ok(())
            }

            fn record_ingestion(&mut self, record: &IngestionRecord) -> Result<RecordOutcome, PersistenceError> {
                self.write_transaction(|conn| {
                        let host_id = conn.ensure_host_row(record.host.fqdn.as_str())?;
                        let hash = record.report.content_hash.as_str();
                        let inserted = diesel::insert_into(reports::table)
                            .values(NewReportRow::new(host_id, &record.report))
                            .on_conflict((reports::host_id, reports::content_hash))
                            .do_nothing()
                            .execute(conn)?;
                        let report_id = reports::table.filter(reports::host_id.eq(host_id))
                                                      .filter(reports::content_hash.eq(hash))
                                                      .select(reports::id)
                                                      .first::<i64>(conn)?;
                        if inserted == 0 {
                            return Ok(RecordOutcome::AlreadyRecorded { report_id });
                        }
                        diesel::update(hosts::table.find(host_id))
                            .set(HostSnapshotChanges::from(&record.host))
                            .execute(conn)?;
                        conn.bump_history_row(&record.history_date, record.history_delta)?;
                        Ok(RecordOutcome::Inserted { host_id, report_id })
                    })
            }

            fn upsert_host(&mut self, snapshot: &HostSnapshot) -> Result<i64, PersistenceError> {
                self.write_transaction(|conn| {
                        let host_id = conn.ensure_host_row(snapshot.fqdn.as_str())?;
                        diesel::update(hosts::table.find(host_id))
                            .set(HostSnapshotChanges::from(snapshot))
                            .execute(conn)?;
                        Ok(host_id)
                    })
            }

            fn find_host(&mut self, fqdn: &str) -> Result<Option<Host>, PersistenceError> {
                hosts::table.filter(hosts::fqdn.eq(fqdn))
                            .first::<HostRow>(self)
                            .optional()?
                            .map(Host::try_from)
                            .transpose()
            }

            fn list_hosts(&mut self, state: Option<HostState>) -> Result<Vec<Host>, PersistenceError> {
                let mut query = hosts::table.order(hosts::fqdn.asc()).into_boxed();
                if let Some(state) = state {
                    query = query.filter(hosts::state.eq(state.as_str()));
                }
                convert_all(query.load::<HostRow>(self)?)
            }

            fn set_pinned(&mut self, fqdn: &str, pinned: bool) -> Result<bool, PersistenceError> {
                let n = diesel::update(hosts::table.filter(hosts::fqdn.eq(fqdn)))
                    .set(hosts::pinned.eq(pinned))
                    .execute(self)?;
                Ok(n > 0)
            }

            fn mark_orphaned_before(&mut self, cutoff: i64) -> Result<usize, PersistenceError> {
                let orphaned = HostState::Orphaned.as_str();
                Ok(diesel::update(hosts::table.filter(hosts::last_seen.lt(cutoff))
                                              .filter(hosts::state.ne(orphaned)))
                   .set(hosts::state.eq(orphaned))
                   .execute(self)?)
            }

            fn purgeable_hosts(&mut self, cutoff: i64) -> Result<Vec<Host>, PersistenceError> {
                let rows = hosts::table.filter(hosts::state.eq(HostState::Orphaned.as_str()))
                                       .filter(hosts::pinned.eq(false))
                                       .filter(hosts::last_seen.lt(cutoff))
                                       .order(hosts::fqdn.asc())
                                       .load::<HostRow>(self)?;
                convert_all(rows)
            }

            fn search_hosts(&mut self, term: &str) -> Result<Vec<Host>, PersistenceError> {
                let rows = hosts::table.filter(hosts::fqdn.like(like_contains(term)).escape('\\'))
                                       .order(hosts::fqdn.asc())
                                       .load::<HostRow>(self)?;
                // LIKE de SQLite ignora mayúsculas en ASCII
                Ok(convert_all::<_, Host>(rows)?.into_iter()
                                     .filter(|h| h.fqdn.as_str().contains(term))
                                     .collect())
            }

            fn delete_orphaned_host(&mut self, host_id: i64, cutoff: i64) -> Result<Option<Vec<String>>, PersistenceError> {
                self.write_transaction(|conn| {
                        // UPDATE no-op: bloquea la fila y re-verifica las condiciones de purga
                        let claimed = diesel::update(hosts::table.find(host_id)
                                                                 .filter(hosts::state.eq(HostState::Orphaned.as_str()))
                                                                 .filter(hosts::pinned.eq(false))
                                                                 .filter(hosts::last_seen.lt(cutoff)))
                            .set(hosts::pinned.eq(false))
                            .execute(conn)?;
                        if claimed == 0 {
                            return Ok(None);
                        }
                        let paths = reports::table.filter(reports::host_id.eq(host_id))
                                                  .select(reports::yaml_file)
                                                  .load::<String>(conn)?;
                        diesel::delete(reports::table.filter(reports::host_id.eq(host_id))).execute(conn)?;
                        diesel::delete(hosts::table.find(host_id)).execute(conn)?;
                        Ok(Some(paths))
                    })
            }

            fn reports_for_host(&mut self, fqdn: &str, limit: i64) -> Result<Vec<ReportSummary>, PersistenceError> {
                let rows = reports::table.filter(reports::fqdn.eq(fqdn))
                                         .order((reports::executed_at.desc(), reports::id.desc()))
                                         .limit(limit)
                                         .load::<ReportRow>(self)?;
                convert_all(rows)
            }

            fn report(&mut self, id: i64) -> Result<Option<ReportSummary>, PersistenceError> {
                reports::table.find(id)
                              .first::<ReportRow>(self)
                              .optional()?
                              .map(ReportSummary::try_from)
                              .transpose()
            }

            fn find_report(&mut self, fqdn: &str, hash: &str) -> Result<Option<ReportSummary>, PersistenceError> {
                reports::table.filter(reports::fqdn.eq(fqdn))
                              .filter(reports::content_hash.eq(hash))
                              .first::<ReportRow>(self)
                              .optional()?
                              .map(ReportSummary::try_from)
                              .transpose()
            }

            fn reports_executed_before(&mut self, cutoff: i64) -> Result<Vec<ArtifactRef>, PersistenceError> {
                let rows = reports::table.filter(reports::executed_at.lt(cutoff))
                                         .select((reports::id, reports::yaml_file))
                                         .load::<(i64, String)>(self)?;
                Ok(artifact_refs(rows))
            }

            fn delete_reports_executed_before(&mut self, cutoff: i64) -> Result<usize, PersistenceError> {
                Ok(diesel::delete(reports::table.filter(reports::executed_at.lt(cutoff))).execute(self)?)
            }

            fn unchanged_unpruned_reports(&mut self) -> Result<Vec<ArtifactRef>, PersistenceError> {
                let rows = reports::table.filter(reports::state.eq(ReportState::Unchanged.as_str()))
                                         .filter(reports::yaml_file.ne(PRUNED_SENTINEL))
                                         .select((reports::id, reports::yaml_file))
                                         .load::<(i64, String)>(self)?;
                Ok(artifact_refs(rows))
            }

            fn mark_reports_pruned(&mut self, ids: &[i64]) -> Result<usize, PersistenceError> {
                if ids.is_empty() {
                    return Ok(0);
                }
                Ok(diesel::update(reports::table.filter(reports::id.eq_any(ids.to_vec())))
                   .set(reports::yaml_file.eq(PRUNED_SENTINEL))
                   .execute(self)?)
            }

            fn count_reports(&mut self) -> Result<i64, PersistenceError> {
                Ok(reports::table.count().get_result::<i64>(self)?)
            }

            fn count_pruned_reports(&mut self) -> Result<i64, PersistenceError> {
                Ok(reports::table.filter(reports::yaml_file.eq(PRUNED_SENTINEL))
                                 .count()
                                 .get_result::<i64>(self)?)
            }

            fn increment_history(&mut self, date: &str, delta: HistoryDelta) -> Result<(), PersistenceError> {
                self.write_transaction(|conn| conn.bump_history_row(date, delta))
            }

            fn history_buckets(&mut self) -> Result<Vec<HistoryBucket>, PersistenceError> {
                let rows = history::table.order(history::date.asc())
                                         .select((history::date, history::failed, history::changed, history::unchanged))
                                         .load::<(String, i64, i64, i64)>(self)?;
                Ok(rows.into_iter()
                       .map(|(date, failed, changed, unchanged)| HistoryBucket { date,
                                                                                 failed,
                                                                                 changed,
                                                                                 unchanged })
                       .collect())
            }

            fn prune_history(&mut self, retain: usize) -> Result<usize, PersistenceError> {
                self.write_transaction(|conn| {
                        let total = history::table.count().get_result::<i64>(conn)?;
                        let retain = i64::try_from(retain).unwrap_or(i64::MAX);
                        if total <= retain {
                            return Ok(0);
                        }
                        let excess = total - retain;
                        let oldest = history::table.order(history::date.asc())
                                                   .select(history::id)
                                                   .limit(excess)
                                                   .load::<i64>(conn)?;
                        Ok(diesel::delete(history::table.filter(history::id.eq_any(oldest))).execute(conn)?)
                    })
            }
        }
    };
}

impl_ledger_connection!(PgConnection);
impl_ledger_connection!(SqliteConnection);
