//! fleet-core: ingesta exactly-once de reportes y mantenimiento del estado
//! derivado (hosts, historia diaria) sobre un `ReportStore` compartido.
pub mod artifacts;
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod history;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod retention;
pub mod store;

pub use artifacts::{ArtifactStore, QueueToken, Removal, StagingArea};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, LedgerConfig, RetentionPolicy};
pub use errors::{IngestError, StoreError};
pub use history::HistoryAggregator;
pub use model::{ArtifactRef, HistoryBucket, HistoryDelta, Host, HostSnapshot, IngestionRecord, NewReport, PurgeSummary,
                RecordOutcome, ReportSummary, StateCount, SweepSummary};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use queue::{IngestQueue, QueueConfig};
pub use registry::HostRegistry;
pub use retention::RetentionManager;
pub use store::{InMemoryReportStore, ReportStore};
