//! Reporte de ejecución normalizado y estados de reporte / host.
//!
//! - `ReportState`: conjunto cerrado de resultados de una ejecución
//!   (`changed`, `unchanged`, `failed`). Cualquier otro valor es un error de
//!   parseo.
//! - `HostState`: snapshot del host. Agrega `orphaned` (sin reportes dentro del
//!   umbral) y el estado vacío de un host recién creado.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ContentHash, DomainError, Fqdn};

/// Resultado de una ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportState {
    Changed,
    Unchanged,
    Failed,
}

impl ReportState {
    pub const ALL: [ReportState; 3] = [ReportState::Changed, ReportState::Unchanged, ReportState::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportState::Changed => "changed",
            ReportState::Unchanged => "unchanged",
            ReportState::Failed => "failed",
        }
    }
}

impl fmt::Display for ReportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ReportState {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "changed" => Ok(ReportState::Changed),
            "unchanged" => Ok(ReportState::Unchanged),
            "failed" => Ok(ReportState::Failed),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Estado actual de un host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    /// Fila creada pero aún sin snapshot (se guarda como `''`).
    Pending,
    Changed,
    Unchanged,
    Failed,
    Orphaned,
}

impl HostState {
    /// Estados que se reportan en el resumen de flota (orden alfabético).
    pub const KNOWN: [HostState; 4] =
        [HostState::Changed, HostState::Failed, HostState::Orphaned, HostState::Unchanged];

    pub fn as_str(self) -> &'static str {
        match self {
            HostState::Pending => "",
            HostState::Changed => "changed",
            HostState::Unchanged => "unchanged",
            HostState::Failed => "failed",
            HostState::Orphaned => "orphaned",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for HostState {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(HostState::Pending),
            "orphaned" => Ok(HostState::Orphaned),
            other => other.parse::<ReportState>().map(HostState::from),
        }
    }
}

impl From<ReportState> for HostState {
    fn from(value: ReportState) -> Self {
        match value {
            ReportState::Changed => HostState::Changed,
            ReportState::Unchanged => HostState::Unchanged,
            ReportState::Failed => HostState::Failed,
        }
    }
}

/// Reporte normalizado que entrega el parser.
///
/// `hash` es opcional: si el parser no lo provee, el pipeline calcula el
/// SHA-256 de los bytes crudos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub fqdn: Fqdn,
    pub state: ReportState,
    pub hash: Option<ContentHash>,
    pub total: i64,
    pub changed: i64,
    pub failed: i64,
    pub skipped: i64,
    /// Duración de la ejecución en segundos.
    pub runtime: f64,
    pub role: String,
    pub branch: String,
    /// Epoch (segundos) del build desplegado; 0 si es desconocido.
    pub build_time: i64,
}

impl Report {
    /// Reporte mínimo (contadores en cero, sin metadata de despliegue).
    pub fn new(fqdn: Fqdn, state: ReportState) -> Self {
        Self { fqdn,
               state,
               hash: None,
               total: 0,
               changed: 0,
               failed: 0,
               skipped: 0,
               runtime: 0.0,
               role: String::new(),
               branch: String::new(),
               build_time: 0 }
    }
}
