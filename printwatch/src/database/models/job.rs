//! Job history models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};

/// Terminal outcome of a print job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A finished job. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    pub job_name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

impl JobRecord {
    /// Build a record, clamping the duration at zero.
    pub fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        job_name: impl Into<String>,
        status: JobStatus,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration_seconds = (finished_at - started_at).num_seconds().max(0);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            device_name: device_name.into(),
            job_name: job_name.into(),
            status,
            started_at,
            finished_at,
            duration_seconds,
        }
    }
}

/// Job history database model.
#[derive(Debug, Clone, FromRow)]
pub struct JobRecordDbModel {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    pub job_name: String,
    pub status: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub duration_seconds: i64,
}

impl From<&JobRecord> for JobRecordDbModel {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            device_id: record.device_id.clone(),
            device_name: record.device_name.clone(),
            job_name: record.job_name.clone(),
            status: record.status.as_str().to_string(),
            started_at: datetime_to_ms(record.started_at),
            finished_at: datetime_to_ms(record.finished_at),
            duration_seconds: record.duration_seconds,
        }
    }
}

impl TryFrom<JobRecordDbModel> for JobRecord {
    type Error = crate::Error;

    fn try_from(model: JobRecordDbModel) -> Result<Self, Self::Error> {
        let status = model.status.parse::<JobStatus>().map_err(|_| {
            crate::Error::Database(format!(
                "Unknown job status '{}' for job {}",
                model.status, model.id
            ))
        })?;
        Ok(Self {
            id: model.id,
            device_id: model.device_id,
            device_name: model.device_name,
            job_name: model.job_name,
            status,
            started_at: ms_to_datetime(model.started_at),
            finished_at: ms_to_datetime(model.finished_at),
            duration_seconds: model.duration_seconds,
        })
    }
}
