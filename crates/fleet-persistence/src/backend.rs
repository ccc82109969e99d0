//! Diferencias por motor: tipo de transacción de escritura, migraciones y
//! ajustes de cada conexión del pool.
//!
//! - SQLite: `BEGIN IMMEDIATE` toma el lock de escritura al inicio, así dos
//!   ingestas concurrentes se serializan en vez de fallar al hacer commit.
//!   Cada conexión activa WAL, `busy_timeout` y claves foráneas.
//! - Postgres: transacción read-write estándar.

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{self, CustomizeConnection, R2D2Connection};
use diesel::sqlite::SqliteConnection;

use crate::error::PersistenceError;
use crate::migrations::{run_pg_migrations, run_sqlite_migrations};

pub trait BackendConnection: R2D2Connection + Send + Sized + 'static {
    const NAME: &'static str;

    /// Ejecuta `f` dentro de una transacción de escritura.
    fn write_transaction<T, F>(&mut self, f: F) -> Result<T, PersistenceError>
        where F: FnOnce(&mut Self) -> Result<T, PersistenceError>;

    fn run_migrations(&mut self) -> Result<(), PersistenceError>;

    fn customizer() -> Option<Box<dyn CustomizeConnection<Self, r2d2::Error>>> { None }
}

impl BackendConnection for PgConnection {
    const NAME: &'static str = "postgres";

    fn write_transaction<T, F>(&mut self, f: F) -> Result<T, PersistenceError>
        where F: FnOnce(&mut Self) -> Result<T, PersistenceError>
    {
        self.build_transaction().read_write().run(f)
    }

    fn run_migrations(&mut self) -> Result<(), PersistenceError> { run_pg_migrations(self) }
}

impl BackendConnection for SqliteConnection {
    const NAME: &'static str = "sqlite";

    fn write_transaction<T, F>(&mut self, f: F) -> Result<T, PersistenceError>
        where F: FnOnce(&mut Self) -> Result<T, PersistenceError>
    {
        self.immediate_transaction(f)
    }

    fn run_migrations(&mut self) -> Result<(), PersistenceError> { run_sqlite_migrations(self) }

    fn customizer() -> Option<Box<dyn CustomizeConnection<Self, r2d2::Error>>> { Some(Box::new(SqlitePragmas)) }
}

/// PRAGMAs aplicados a cada conexión SQLite al salir del pool por primera vez.
#[derive(Debug, Clone, Copy)]
pub struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000;
                            PRAGMA journal_mode = WAL;
                            PRAGMA synchronous = NORMAL;
                            PRAGMA foreign_keys = ON;")
            .map_err(r2d2::Error::QueryError)
    }
}
