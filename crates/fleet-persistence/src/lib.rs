//! fleet-persistence
//!
//! Implementación relacional del `ReportStore` del core sobre Diesel, con dos
//! motores intercambiables: SQLite (archivo local) y PostgreSQL (en red).
//!
//! Módulos:
//! - `backend`: diferencias por motor (transacción de escritura, PRAGMAs).
//! - `queries`: consultas Diesel compartidas por ambos motores.
//! - `store`: `DieselReportStore`, pool r2d2 y reintentos.
//! - `migrations`: migraciones embebidas por motor.
//! - `config`: `DATABASE_URL` y tamaños de pool desde `.env` / entorno.
//! - `schema` / `models`: tablas y filas Diesel.

pub mod backend;
pub mod config;
pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod schema;
pub mod store;

pub use config::{init_dotenv, Backend, DbConfig};
pub use error::PersistenceError;
pub use queries::LedgerConnection;
pub use store::{build_pool, open_store, open_store_from_env, DieselReportStore, LedgerPool, PgReportStore,
                SqliteReportStore};
