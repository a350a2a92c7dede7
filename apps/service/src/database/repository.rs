use anyhow::Result;
use async_trait::async_trait;
use libsql::{Value, params};

use super::StorePool;
use crate::monitoring::HealthStatus;

/// Durable sink for collected status events
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Record one status event; a duplicate (url, timestamp) pair is a
    /// no-op so redelivered events collapse into a single row
    async fn save(&self, url: &str, status: &HealthStatus) -> Result<()>;
}

/// LibSQL-backed status store
pub struct StatusRepository {
    pool: StorePool,
}

impl StatusRepository {
    pub fn new_from_pool(pool: StorePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for StatusRepository {
    async fn save(&self, url: &str, status: &HealthStatus) -> Result<()> {
        let conn = self.pool.get().await?;

        let error_kind = match &status.error {
            Some(error) => Value::from(error.kind.to_string()),
            None => Value::Null,
        };
        let error_details = match &status.error {
            Some(error) => Value::from(serde_json::to_string(&error.details)?),
            None => Value::Null,
        };

        conn.execute(
            "INSERT OR IGNORE INTO health_status
                (url, timestamp, healthy, status_code, response_time_ms,
                 error_kind, error_details, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                url,
                status.timestamp.to_rfc3339(),
                if status.healthy { 1_i64 } else { 0_i64 },
                status.status_code as i64,
                status.response_time_ms,
                error_kind,
                error_details,
                chrono::Utc::now().timestamp()
            ],
        )
        .await?;

        Ok(())
    }
}
