//! fleet-ledger
//!
//! Fachada del ledger de reportes de flota:
//! - Abre el Report Store una sola vez (SQLite o Postgres según `DATABASE_URL`).
//! - Construye pipeline de ingesta, cola asíncrona, registro de hosts,
//!   historia y retención sobre ese mismo store.
//! - Expone la superficie de operaciones (ingesta, mantenimiento, lecturas).
//!
//! Los crates internos se re-exportan para clientes que necesiten piezas sueltas.

pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::{Ledger, MaintenanceReport};

pub use fleet_core as core;
pub use fleet_domain as domain;
pub use fleet_persistence as persistence;
