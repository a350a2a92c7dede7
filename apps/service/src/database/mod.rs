pub mod migrations;
/// Database module - durable storage for collected status events
pub mod repository;

use std::path::Path;

use anyhow::Result;
use deadpool::managed::{self, Pool, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

pub use repository::{StatusRepository, StatusStore};

pub struct StoreManager {
    database: Database,
}

impl StoreManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for StoreManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.database.connect()
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        conn.query("SELECT 1", ()).await?;
        Ok(())
    }
}

pub type StorePool = Pool<StoreManager>;

/// Open (or create) the status database and bring its schema up to date
pub async fn open(path: impl AsRef<Path>) -> Result<StorePool> {
    let database = libsql::Builder::new_local(path).build().await?;
    let pool = StorePool::builder(StoreManager::new(database)).build()?;

    let conn = pool.get().await?;
    migrations::run_migrations(&conn).await?;

    Ok(pool)
}
