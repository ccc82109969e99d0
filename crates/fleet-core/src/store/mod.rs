//! Report Store: frontera transaccional del ledger.
//!
//! `ReportStore` expone primitivas CRUD sobre `hosts`, `reports` e `history`;
//! la única operación multi-tabla es `record_ingestion`, que debe ser atómica.
//! Las implementaciones relacionales viven en `fleet-persistence`; aquí se
//! incluye `InMemoryReportStore` para pruebas y ejecuciones efímeras.

mod memory;

pub use memory::InMemoryReportStore;

use fleet_domain::{ContentHash, Fqdn, HostState};

use crate::errors::StoreError;
use crate::model::{ArtifactRef, HistoryBucket, HistoryDelta, Host, HostSnapshot, IngestionRecord, RecordOutcome,
                   ReportSummary};

/// Acceso compartido (`Arc<dyn ReportStore>`) desde handlers, workers y el
/// scheduler de mantenimiento.
pub trait ReportStore: Send + Sync {
    // --- ingesta

    /// Upsert del host + insert del reporte + incremento de historia en una
    /// transacción. Si (host, hash) ya existe no escribe nada y devuelve
    /// `AlreadyRecorded`.
    fn record_ingestion(&self, record: &IngestionRecord) -> Result<RecordOutcome, StoreError>;

    // --- hosts

    /// Crea el host si no existe (clave: fqdn) y sobreescribe el snapshot.
    /// Nunca modifica `pinned`. Devuelve `host_id`.
    fn upsert_host(&self, snapshot: &HostSnapshot) -> Result<i64, StoreError>;
    fn find_host(&self, fqdn: &Fqdn) -> Result<Option<Host>, StoreError>;
    /// Orden ascendente por fqdn.
    fn list_hosts(&self) -> Result<Vec<Host>, StoreError>;
    fn hosts_in_state(&self, state: HostState) -> Result<Vec<Host>, StoreError>;
    /// `false` si el host no existe.
    fn set_pinned(&self, fqdn: &Fqdn, pinned: bool) -> Result<bool, StoreError>;
    /// `state = orphaned` para hosts con `last_seen < cutoff` que aún no lo son.
    fn mark_orphaned_before(&self, cutoff: i64) -> Result<usize, StoreError>;
    /// Hosts huérfanos, no fijados, con `last_seen < cutoff`.
    fn purgeable_hosts(&self, cutoff: i64) -> Result<Vec<Host>, StoreError>;
    /// Borra el host y sus reportes si sigue cumpliendo las condiciones de
    /// purga. `None` si dejó de cumplirlas (reactivado o fijado entretanto);
    /// `Some(paths)` con los punteros de los reportes borrados, para que el
    /// llamador elimine sólo artifacts que ya no referencia ninguna fila.
    fn delete_orphaned_host(&self, host_id: i64, cutoff: i64) -> Result<Option<Vec<String>>, StoreError>;
    /// Hosts cuyo fqdn contiene `term` (subcadena literal, sensible a
    /// mayúsculas), orden ascendente por fqdn.
    fn search_hosts(&self, term: &str) -> Result<Vec<Host>, StoreError>;

    // --- reports

    /// Más recientes primero (`executed_at DESC`), como máximo `limit`.
    fn reports_for_host(&self, fqdn: &Fqdn, limit: usize) -> Result<Vec<ReportSummary>, StoreError>;
    fn report(&self, id: i64) -> Result<Option<ReportSummary>, StoreError>;
    fn find_report(&self, fqdn: &Fqdn, hash: &ContentHash) -> Result<Option<ReportSummary>, StoreError>;
    fn reports_executed_before(&self, cutoff: i64) -> Result<Vec<ArtifactRef>, StoreError>;
    fn delete_reports_executed_before(&self, cutoff: i64) -> Result<usize, StoreError>;
    /// Reportes `unchanged` cuyo puntero aún no es el centinela `pruned`.
    fn unchanged_unpruned_reports(&self) -> Result<Vec<ArtifactRef>, StoreError>;
    /// Marca exactamente los ids indicados con el centinela `pruned`.
    fn mark_reports_pruned(&self, ids: &[i64]) -> Result<usize, StoreError>;
    fn count_reports(&self) -> Result<i64, StoreError>;
    fn count_pruned_reports(&self) -> Result<i64, StoreError>;

    // --- history

    /// Crea el bucket de `date` si falta y suma `delta`.
    fn increment_history(&self, date: &str, delta: HistoryDelta) -> Result<(), StoreError>;
    /// Orden ascendente por fecha.
    fn history_buckets(&self) -> Result<Vec<HistoryBucket>, StoreError>;
    /// Conserva los `retain` buckets más recientes; devuelve los borrados.
    fn prune_history(&self, retain: usize) -> Result<usize, StoreError>;
}
