//! Filas Diesel y su conversión a los tipos del core.
//!
//! Las lecturas validan de nuevo fqdn, hash y estados: una fila que no pasa la
//! validación se reporta como `PersistenceError::CorruptRow`.

use diesel::prelude::*;
use fleet_core::{Host, HostSnapshot, NewReport, ReportSummary};
use fleet_domain::{ContentHash, Fqdn, HostState, ReportState};

use crate::error::PersistenceError;
use crate::schema::{history, hosts, reports};

/// Fila de `hosts` (orden de columnas del `table!`).
#[derive(Queryable, Debug)]
pub struct HostRow {
    pub host_id: i64,
    pub fqdn: String,
    pub role: String,
    pub branch: String,
    pub build_time: i64,
    pub state: String,
    pub last_seen: i64,
    pub runtime: f64,
    pub pinned: bool,
}

/// Alta mínima de host; el resto de columnas toma sus defaults.
#[derive(Insertable, Debug)]
#[diesel(table_name = hosts)]
pub struct NewHostRow<'a> {
    pub fqdn: &'a str,
}

/// Columnas que cada ingesta sobreescribe (nunca `pinned`).
#[derive(AsChangeset, Debug)]
#[diesel(table_name = hosts)]
pub struct HostSnapshotChanges<'a> {
    pub state: &'a str,
    pub last_seen: i64,
    pub runtime: f64,
    pub role: &'a str,
    pub branch: &'a str,
    pub build_time: i64,
}

impl<'a> From<&'a HostSnapshot> for HostSnapshotChanges<'a> {
    fn from(s: &'a HostSnapshot) -> Self {
        Self { state: s.state.as_str(),
               last_seen: s.last_seen,
               runtime: s.runtime,
               role: &s.role,
               branch: &s.branch,
               build_time: s.build_time }
    }
}

#[derive(Queryable, Debug)]
pub struct ReportRow {
    pub id: i64,
    pub host_id: i64,
    pub fqdn: String,
    pub state: String,
    pub yaml_file: String,
    pub content_hash: String,
    pub runtime: f64,
    pub executed_at: i64,
    pub role: String,
    pub branch: String,
    pub build_time: i64,
    pub total: i64,
    pub skipped: i64,
    pub failed: i64,
    pub changed: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = reports)]
pub struct NewReportRow<'a> {
    pub host_id: i64,
    pub fqdn: &'a str,
    pub state: &'a str,
    pub yaml_file: &'a str,
    pub content_hash: &'a str,
    pub runtime: f64,
    pub executed_at: i64,
    pub role: &'a str,
    pub branch: &'a str,
    pub build_time: i64,
    pub total: i64,
    pub skipped: i64,
    pub failed: i64,
    pub changed: i64,
}

impl<'a> NewReportRow<'a> {
    pub fn new(host_id: i64, r: &'a NewReport) -> Self {
        Self { host_id,
               fqdn: r.fqdn.as_str(),
               state: r.state.as_str(),
               yaml_file: &r.yaml_file,
               content_hash: r.content_hash.as_str(),
               runtime: r.runtime,
               executed_at: r.executed_at,
               role: &r.role,
               branch: &r.branch,
               build_time: r.build_time,
               total: r.total,
               skipped: r.skipped,
               failed: r.failed,
               changed: r.changed }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = history)]
pub struct NewHistoryRow<'a> {
    pub date: &'a str,
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::CorruptRow(format!("{what}: {detail}"))
}

impl TryFrom<HostRow> for Host {
    type Error = PersistenceError;
    fn try_from(row: HostRow) -> Result<Self, Self::Error> {
        Ok(Host { host_id: row.host_id,
                  fqdn: Fqdn::new(&row.fqdn).map_err(|e| corrupt("hosts.fqdn", e))?,
                  state: row.state.parse::<HostState>().map_err(|e| corrupt("hosts.state", e))?,
                  last_seen: row.last_seen,
                  runtime: row.runtime,
                  role: row.role,
                  branch: row.branch,
                  build_time: row.build_time,
                  pinned: row.pinned })
    }
}

impl TryFrom<ReportRow> for ReportSummary {
    type Error = PersistenceError;
    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        Ok(ReportSummary { id: row.id,
                           host_id: row.host_id,
                           fqdn: Fqdn::new(&row.fqdn).map_err(|e| corrupt("reports.fqdn", e))?,
                           state: row.state.parse::<ReportState>().map_err(|e| corrupt("reports.state", e))?,
                           yaml_file: row.yaml_file,
                           content_hash: ContentHash::parse(&row.content_hash).map_err(|e| corrupt("reports.content_hash", e))?,
                           runtime: row.runtime,
                           executed_at: row.executed_at,
                           role: row.role,
                           branch: row.branch,
                           build_time: row.build_time,
                           total: row.total,
                           skipped: row.skipped,
                           failed: row.failed,
                           changed: row.changed })
    }
}

/// Convierte un lote de filas, abortando en la primera corrupta.
pub fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, PersistenceError>
    where T: TryFrom<R, Error = PersistenceError>
{
    rows.into_iter().map(T::try_from).collect()
}
