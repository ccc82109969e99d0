//! Migraciones embebidas, una serie por motor.
//! Se ejecutan una vez al construir el pool.

use diesel::pg::PgConnection;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::PersistenceError;

pub const PG_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

fn migration_error(e: impl std::fmt::Display) -> PersistenceError { PersistenceError::Unknown(format!("migration error: {e}")) }

pub fn run_pg_migrations(conn: &mut PgConnection) -> Result<(), PersistenceError> {
    conn.run_pending_migrations(PG_MIGRATIONS).map(|_| ()).map_err(migration_error)
}

pub fn run_sqlite_migrations(conn: &mut SqliteConnection) -> Result<(), PersistenceError> {
    conn.run_pending_migrations(SQLITE_MIGRATIONS).map(|_| ()).map_err(migration_error)
}
