//! Async Ingestion Queue: staging en disco + canal acotado + pool fijo de workers.
//!
//! `enqueue` deja los bytes en el staging y envía el token; bloquea mientras
//! el canal está lleno. Cada worker procesa tokens con el pipeline síncrono y
//! borra el archivo de staging sin importar el resultado. Los errores dentro
//! de los workers sólo se registran en el log.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::artifacts::{QueueToken, StagingArea};
use crate::constants::{DEFAULT_ASYNC_WORKERS, DEFAULT_QUEUE_CAPACITY};
use crate::errors::IngestError;
use crate::pipeline::{IngestOutcome, IngestPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Mínimo 1.
    pub workers: usize,
    /// 0 = canal de rendezvous.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { workers: DEFAULT_ASYNC_WORKERS,
               capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

pub struct IngestQueue {
    sender: Option<Sender<QueueToken>>,
    staging: StagingArea,
    workers: Vec<JoinHandle<()>>,
}

impl IngestQueue {
    pub fn start(pipeline: Arc<IngestPipeline>, staging: StagingArea, config: QueueConfig) -> Result<Self, IngestError> {
        let (tx, rx) = bounded::<QueueToken>(config.capacity);
        let mut queue = Self { sender: Some(tx),
                               staging,
                               workers: Vec::with_capacity(config.workers.max(1)) };
        for id in 0..config.workers.max(1) {
            let rx = rx.clone();
            let pipeline = Arc::clone(&pipeline);
            let staging = queue.staging.clone();
            let handle = thread::Builder::new().name(format!("ingest-worker-{id}"))
                                               .spawn(move || worker_loop(id, rx, pipeline, staging))
                                               .map_err(IngestError::Spawn)?;
            queue.workers.push(handle);
        }
        info!("queue:started workers={} capacity={}", queue.workers.len(), config.capacity);
        Ok(queue)
    }

    /// Deja los bytes en staging y los encola. Devuelve en cuanto el token
    /// fue aceptado por el canal.
    pub fn enqueue(&self, bytes: &[u8]) -> Result<QueueToken, IngestError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(IngestError::QueueClosed);
        };
        let token = self.staging.stage(bytes)?;
        if sender.send(token.clone()).is_err() {
            let _ = self.staging.discard(&token);
            return Err(IngestError::QueueClosed);
        }
        debug!("queue:enqueued token={token}");
        Ok(token)
    }

    /// Tokens aceptados que ningún worker tomó todavía.
    pub fn pending(&self) -> usize { self.sender.as_ref().map_or(0, Sender::len) }

    pub fn worker_count(&self) -> usize { self.workers.len() }

    /// Cierra el canal y espera a que los workers drenen lo ya encolado.
    /// Posteriores `enqueue` fallan con `QueueClosed`.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("ingest-worker").to_string();
            if handle.join().is_err() {
                error!("queue:worker_panicked worker={name}");
            }
        }
        info!("queue:stopped");
    }
}

impl Drop for IngestQueue {
    fn drop(&mut self) { self.shutdown(); }
}

fn worker_loop(id: usize, rx: Receiver<QueueToken>, pipeline: Arc<IngestPipeline>, staging: StagingArea) {
    while let Ok(token) = rx.recv() {
        match staging.load(&token).and_then(|bytes| pipeline.ingest(&bytes)) {
            Ok(IngestOutcome::Recorded { fqdn, report_id }) => {
                debug!("queue:processed worker={id} token={token} fqdn={fqdn} report_id={report_id}")
            }
            Ok(IngestOutcome::Duplicate { fqdn }) => debug!("queue:duplicate worker={id} token={token} fqdn={fqdn}"),
            Err(e) => error!("queue:ingest_failed worker={id} token={token} err={e}"),
        }
        if let Err(e) = staging.discard(&token) {
            warn!("queue:discard_failed worker={id} token={token} err={e}");
        }
    }
    debug!("queue:worker_exit worker={id}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::clock::FixedClock;
    use crate::store::{InMemoryReportStore, ReportStore};
    use fleet_domain::PuppetYamlParser;

    #[test]
    fn shutdown_drains_and_cleans_staging() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryReportStore::new());
        let pipeline = Arc::new(IngestPipeline::new(store.clone(),
                                                    ArtifactStore::new(dir.path().join("reports")),
                                                    Arc::new(PuppetYamlParser),
                                                    Arc::new(FixedClock::new(1_709_287_200))));
        let staging = StagingArea::new(dir.path().join("staging"));
        let mut queue = IngestQueue::start(pipeline,
                                           staging.clone(),
                                           QueueConfig { workers: 2,
                                                         capacity: 1 })
                        .unwrap();
        for i in 0..10 {
            queue.enqueue(format!("host: n{i}.example\nstatus: changed\n").as_bytes()).unwrap();
        }
        // un documento inválido sólo se registra en el log
        queue.enqueue(b"not: a report\n").unwrap();
        queue.shutdown();

        assert_eq!(store.count_reports().unwrap(), 10);
        assert_eq!(std::fs::read_dir(staging.dir()).unwrap().count(), 0);
        assert_eq!(queue.pending(), 0);

        assert!(matches!(queue.enqueue(b"host: late\nstatus: failed\n"), Err(IngestError::QueueClosed)));
        assert_eq!(std::fs::read_dir(staging.dir()).unwrap().count(), 0);
    }
}
