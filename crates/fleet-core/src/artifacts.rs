//! Almacenamiento de bytes crudos en disco.
//!
//! - `ArtifactStore`: reportes direccionados por contenido en
//!   `<root>/<fqdn>/<hash>`. La fila de `reports` guarda la ruta relativa
//!   `<fqdn>/<hash>` (o el centinela `pruned`). La escritura es atómica:
//!   archivo temporal en el mismo directorio + `rename`, de modo que la
//!   existencia del archivo final implica contenido completo.
//! - `StagingArea`: directorio plano donde la cola asíncrona deja los bytes
//!   (`report-<uuid>`) hasta que un worker los procesa.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use fleet_domain::{ContentHash, Fqdn};
use log::{debug, warn};
use uuid::Uuid;

use crate::constants::{PARTIAL_SUFFIX, PRUNED_SENTINEL, STAGING_PREFIX};
use crate::errors::IngestError;
use crate::model::SweepSummary;

/// Resultado de un borrado best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// Ya no existía (o el puntero era `pruned`).
    Missing,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    /// Puntero relativo que se persiste en `reports.yaml_file`.
    pub fn relative_path(fqdn: &Fqdn, hash: &ContentHash) -> String { format!("{fqdn}/{hash}") }

    pub fn path_for(&self, fqdn: &Fqdn, hash: &ContentHash) -> PathBuf {
        self.root.join(fqdn.as_str()).join(hash.as_str())
    }

    /// Ruta absoluta de un puntero persistido. `None` para `pruned` o punteros
    /// que intentan salir de la raíz.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        if relative.is_empty() || relative == PRUNED_SENTINEL {
            return None;
        }
        let rel = Path::new(relative);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(rel))
    }

    pub fn exists(&self, fqdn: &Fqdn, hash: &ContentHash) -> bool { self.path_for(fqdn, hash).is_file() }

    /// Escribe los bytes de forma atómica y devuelve la ruta final.
    pub fn write(&self, fqdn: &Fqdn, hash: &ContentHash, bytes: &[u8]) -> Result<PathBuf, IngestError> {
        let dir = self.root.join(fqdn.as_str());
        fs::create_dir_all(&dir).map_err(|e| IngestError::fs(&dir, e))?;
        let target = dir.join(hash.as_str());
        let tmp = dir.join(format!(".{hash}.{}{PARTIAL_SUFFIX}", Uuid::new_v4().simple()));
        let written = fs::File::create(&tmp).and_then(|mut f| {
                                                 f.write_all(bytes)?;
                                                 f.sync_all()
                                             })
                                            .and_then(|_| fs::rename(&tmp, &target));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(IngestError::fs(&target, e));
        }
        debug!("artifact:written path={}", target.display());
        Ok(target)
    }

    pub fn read(&self, relative: &str) -> Result<Vec<u8>, IngestError> {
        let path = self.resolve(relative)
                       .ok_or_else(|| IngestError::fs(relative, std::io::Error::new(ErrorKind::InvalidInput, "invalid artifact pointer")))?;
        fs::read(&path).map_err(|e| IngestError::fs(path, e))
    }

    /// Borra el artifact; los fallos se registran y no se propagan.
    pub fn remove_best_effort(&self, relative: &str) -> Removal {
        let Some(path) = self.resolve(relative) else {
            return Removal::Missing;
        };
        match fs::remove_file(&path) {
            Ok(()) => Removal::Removed,
            Err(e) if e.kind() == ErrorKind::NotFound => Removal::Missing,
            Err(e) => {
                warn!("artifact:remove_failed path={} err={e}", path.display());
                Removal::Failed
            }
        }
    }

    /// Elimina `<root>/<fqdn>` si quedó vacío.
    pub fn remove_host_dir_if_empty(&self, fqdn: &Fqdn) {
        let dir = self.root.join(fqdn.as_str());
        // remove_dir falla si el directorio no está vacío
        if fs::remove_dir(&dir).is_ok() {
            debug!("artifact:host_dir_removed path={}", dir.display());
        }
    }

    /// Borra los temporales `.partial` que dejó una escritura interrumpida
    /// en `<root>/<fqdn>/`. Sin ellos el directorio del host puede quedar
    /// vacío y eliminarse tras una purga.
    pub fn sweep_partials_older_than(&self, max_age: Duration) -> SweepSummary {
        let mut summary = SweepSummary::default();
        let hosts = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return summary,
            Err(e) => {
                warn!("artifact:sweep_unreadable dir={} err={e}", self.root.display());
                return summary;
            }
        };
        for host in hosts.flatten() {
            if host.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                sweep_dir(&host.path(), max_age, |name| name.ends_with(PARTIAL_SUFFIX), &mut summary);
            }
        }
        summary
    }
}

impl Removal {
    pub(crate) fn tally(self, summary: &mut SweepSummary) {
        match self {
            Removal::Removed => summary.artifacts_removed += 1,
            Removal::Failed => summary.artifact_failures += 1,
            Removal::Missing => {}
        }
    }
}

/// Identificador opaco de un reporte en staging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueToken(String);

impl QueueToken {
    fn generate() -> Self { Self(format!("{STAGING_PREFIX}{}", Uuid::new_v4())) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for QueueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn path_of(&self, token: &QueueToken) -> PathBuf { self.dir.join(token.as_str()) }

    pub fn stage(&self, bytes: &[u8]) -> Result<QueueToken, IngestError> {
        fs::create_dir_all(&self.dir).map_err(|e| IngestError::fs(&self.dir, e))?;
        let token = QueueToken::generate();
        let path = self.path_of(&token);
        fs::write(&path, bytes).map_err(|e| IngestError::fs(&path, e))?;
        Ok(token)
    }

    pub fn load(&self, token: &QueueToken) -> Result<Vec<u8>, IngestError> {
        let path = self.path_of(token);
        fs::read(&path).map_err(|e| IngestError::fs(path, e))
    }

    pub fn discard(&self, token: &QueueToken) -> std::io::Result<()> {
        match fs::remove_file(self.path_of(token)) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Borra archivos `report-*` con mtime anterior a `now - max_age`.
    pub fn sweep_older_than(&self, max_age: Duration) -> SweepSummary {
        let mut summary = SweepSummary::default();
        sweep_dir(&self.dir, max_age, |name| name.starts_with(STAGING_PREFIX), &mut summary);
        summary
    }
}

/// Borra los archivos de `dir` cuyo nombre acepta `matches` y cuyo mtime es
/// `<= now - max_age`.
fn sweep_dir(dir: &Path, max_age: Duration, matches: impl Fn(&str) -> bool, summary: &mut SweepSummary) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            warn!("sweep:dir_unreadable dir={} err={e}", dir.display());
            return;
        }
    };
    let cutoff = SystemTime::now().checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
    for entry in entries.flatten() {
        if !matches(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let stale = entry.metadata()
                         .and_then(|m| m.modified())
                         .map(|mtime| mtime <= cutoff)
                         .unwrap_or(false);
        if !stale {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                summary.rows += 1;
                summary.artifacts_removed += 1;
            }
            Err(e) => {
                warn!("sweep:remove_failed path={} err={e}", entry.path().display());
                summary.artifact_failures += 1;
            }
        }
    }
}
