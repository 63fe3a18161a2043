//! Library reservation service: book inventory, user lookup, reservations
//! with rental and late fees, and synchronisation with an external catalog.

pub mod api;
pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod inventory;
pub mod models;
pub mod reservations;
pub mod schema;

use diesel::{Connection, PgConnection};
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<AsyncPgConnection>;

pub fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(())
}

pub async fn connect_pool(database_url: &str, max_size: u32) -> anyhow::Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder().max_size(max_size).build(manager).await?;
    Ok(pool)
}

/// A pool that only connects when a connection is first requested.
pub fn lazy_pool(database_url: &str, max_size: u32) -> DbPool {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder().max_size(max_size).build_unchecked(manager)
}
