//! Job history repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{JobRecord, JobRecordDbModel};

/// Append-only store of finished jobs.
#[async_trait]
pub trait JobHistoryRepository: Send + Sync {
    async fn append(&self, record: &JobRecord) -> Result<()>;
    /// Most recent records first, optionally for a single device.
    async fn list_recent(&self, device_id: Option<&str>, limit: i64) -> Result<Vec<JobRecord>>;
}

/// SQLx implementation of JobHistoryRepository.
pub struct SqlxJobHistoryRepository {
    pool: SqlitePool,
}

impl SqlxJobHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobHistoryRepository for SqlxJobHistoryRepository {
    async fn append(&self, record: &JobRecord) -> Result<()> {
        let model = JobRecordDbModel::from(record);
        sqlx::query(
            r#"
            INSERT INTO job_history
                (id, device_id, device_name, job_name, status, started_at, finished_at, duration_seconds)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&model.id)
        .bind(&model.device_id)
        .bind(&model.device_name)
        .bind(&model.job_name)
        .bind(&model.status)
        .bind(model.started_at)
        .bind(model.finished_at)
        .bind(model.duration_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(&self, device_id: Option<&str>, limit: i64) -> Result<Vec<JobRecord>> {
        let limit = limit.clamp(1, 500);
        let models = match device_id {
            Some(device_id) => {
                sqlx::query_as::<_, JobRecordDbModel>(
                    "SELECT * FROM job_history WHERE device_id = ? ORDER BY finished_at DESC LIMIT ?",
                )
                .bind(device_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, JobRecordDbModel>(
                    "SELECT * FROM job_history ORDER BY finished_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        models.into_iter().map(JobRecord::try_from).collect()
    }
}
