//! Filas y valores que cruzan la frontera del Report Store.
//!
//! Los tipos de lectura (`Host`, `ReportSummary`, `HistoryBucket`) reflejan las
//! tres tablas; los de escritura (`HostSnapshot`, `NewReport`,
//! `IngestionRecord`) describen lo que una ingesta exitosa persiste.

use fleet_domain::{ContentHash, Fqdn, HostState, ReportState};
use serde::{Deserialize, Serialize};

use crate::constants::PRUNED_SENTINEL;

/// Fila de `hosts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub host_id: i64,
    pub fqdn: Fqdn,
    pub state: HostState,
    pub last_seen: i64,
    pub runtime: f64,
    pub role: String,
    pub branch: String,
    pub build_time: i64,
    pub pinned: bool,
}

/// Campos del host que cada ingesta sobreescribe (nunca `pinned`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub fqdn: Fqdn,
    pub state: HostState,
    pub last_seen: i64,
    pub runtime: f64,
    pub role: String,
    pub branch: String,
    pub build_time: i64,
}

/// Fila de `reports` tal como se lee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: i64,
    pub host_id: i64,
    pub fqdn: Fqdn,
    pub state: ReportState,
    /// `<fqdn>/<hash>` relativo a la raíz de reportes, o `pruned`.
    pub yaml_file: String,
    pub content_hash: ContentHash,
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

impl ReportSummary {
    pub fn is_pruned(&self) -> bool { self.yaml_file == PRUNED_SENTINEL }
}

/// Fila de `reports` a insertar (el `host_id` lo resuelve el store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub fqdn: Fqdn,
    pub state: ReportState,
    pub yaml_file: String,
    pub content_hash: ContentHash,
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

/// Incremento por estado para un bucket de historia.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDelta {
    pub failed: i64,
    pub changed: i64,
    pub unchanged: i64,
}

impl HistoryDelta {
    /// Delta unitario para la etiqueta de estado; etiquetas desconocidas no suman nada.
    pub fn for_label(state: &str) -> Self {
        match state {
            "failed" => Self { failed: 1,
                               ..Self::default() },
            "changed" => Self { changed: 1,
                                ..Self::default() },
            "unchanged" => Self { unchanged: 1,
                                  ..Self::default() },
            _ => Self::default(),
        }
    }

    pub fn is_zero(&self) -> bool { self.failed == 0 && self.changed == 0 && self.unchanged == 0 }
}

impl From<ReportState> for HistoryDelta {
    fn from(state: ReportState) -> Self { Self::for_label(state.as_str()) }
}

/// Fila de `history`; `date` es `YYYY/MM/DD` en hora local del servidor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryBucket {
    pub date: String,
    pub failed: i64,
    pub changed: i64,
    pub unchanged: i64,
}

impl HistoryBucket {
    pub fn empty(date: impl Into<String>) -> Self {
        Self { date: date.into(),
               failed: 0,
               changed: 0,
               unchanged: 0 }
    }

    pub fn apply(&mut self, delta: HistoryDelta) {
        self.failed += delta.failed;
        self.changed += delta.changed;
        self.unchanged += delta.unchanged;
    }

    pub fn total(&self) -> i64 { self.failed + self.changed + self.unchanged }
}

/// Todo lo que una ingesta persiste en una única transacción.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionRecord {
    pub host: HostSnapshot,
    pub report: NewReport,
    pub history_date: String,
    pub history_delta: HistoryDelta,
}

/// Resultado de `ReportStore::record_ingestion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted { host_id: i64, report_id: i64 },
    /// El par (host, hash) ya existía; no se escribió nada.
    AlreadyRecorded { report_id: i64 },
}

/// Puntero a artifact de un reporte, usado por los barridos de retención.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub id: i64,
    pub yaml_file: String,
}

/// Conteo y porcentaje de hosts por estado (vista de resumen de flota).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCount {
    pub state: HostState,
    pub count: usize,
    pub percentage: f64,
}

/// Resumen de un barrido de retención.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Filas borradas o marcadas.
    pub rows: usize,
    pub artifacts_removed: usize,
    pub artifact_failures: usize,
}

impl SweepSummary {
    pub fn merge(&mut self, other: SweepSummary) {
        self.rows += other.rows;
        self.artifacts_removed += other.artifacts_removed;
        self.artifact_failures += other.artifact_failures;
    }
}

/// Resultado de la purga de hosts huérfanos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeSummary {
    pub hosts: usize,
    pub reports: usize,
    pub artifacts_removed: usize,
    pub artifact_failures: usize,
}

impl From<PurgeSummary> for SweepSummary {
    fn from(p: PurgeSummary) -> Self {
        SweepSummary { rows: p.hosts + p.reports,
                       artifacts_removed: p.artifacts_removed,
                       artifact_failures: p.artifact_failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_for_unknown_label_is_zero() {
        assert!(HistoryDelta::for_label("skipped").is_zero());
        assert_eq!(HistoryDelta::from(ReportState::Failed).failed, 1);
    }

    #[test]
    fn bucket_apply_accumulates() {
        let mut bucket = HistoryBucket::empty("2024/03/01");
        bucket.apply(HistoryDelta::for_label("changed"));
        bucket.apply(HistoryDelta::for_label("changed"));
        bucket.apply(HistoryDelta::for_label("failed"));
        assert_eq!((bucket.changed, bucket.failed, bucket.unchanged), (2, 1, 0));
        assert_eq!(bucket.total(), 3);
    }
}
