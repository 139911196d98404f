use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use super::store::StoreError;
use crate::models::job::{InputKind, Job, JobStage, JobStatus, StageTiming};

const JOB_COLUMNS: &str = "id, mode, quality, enable_4k, aspect_ratio, fingerprint, status, stage, \
     stage_timings, inputs, output_ref, remote_handle, request_id, error_message, \
     created_at, updated_at, started_at, finished_at";

/// Insert a new job row
pub async fn insert_job(pool: &PgPool, job: &Job) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (id, mode, quality, enable_4k, aspect_ratio, fingerprint, status, stage,
                          stage_timings, inputs, output_ref, remote_handle, request_id, error_message,
                          created_at, updated_at, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(job.id)
    .bind(job.mode.as_ref())
    .bind(job.quality.as_ref())
    .bind(job.enable_4k)
    .bind(job.aspect_ratio.as_ref())
    .bind(&job.fingerprint)
    .bind(job.status.as_ref())
    .bind(job.stage.as_ref())
    .bind(Json(&job.stage_timings))
    .bind(Json(&job.inputs))
    .bind(&job.output_ref)
    .bind(&job.remote_handle)
    .bind(&job.request_id)
    .bind(&job.error_message)
    .bind(job.created_at)
    .bind(job.updated_at)
    .bind(job.started_at)
    .bind(job.finished_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(job.id));
    }
    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, StoreError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
    let row = sqlx::query(&sql).bind(job_id).fetch_optional(pool).await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Overwrite the mutable columns of a job
pub async fn update_job(pool: &PgPool, job: &Job) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $2,
            stage = $3,
            stage_timings = $4,
            output_ref = $5,
            remote_handle = $6,
            request_id = $7,
            error_message = $8,
            updated_at = $9,
            started_at = $10,
            finished_at = $11
        WHERE id = $1
        "#,
    )
    .bind(job.id)
    .bind(job.status.as_ref())
    .bind(job.stage.as_ref())
    .bind(Json(&job.stage_timings))
    .bind(&job.output_ref)
    .bind(&job.remote_handle)
    .bind(&job.request_id)
    .bind(&job.error_message)
    .bind(job.updated_at)
    .bind(job.started_at)
    .bind(job.finished_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(job.id));
    }
    Ok(())
}

/// Newest job for a fingerprint among the given statuses
pub async fn find_latest_by_fingerprint(
    pool: &PgPool,
    fingerprint: &str,
    statuses: &[JobStatus],
) -> Result<Option<Job>, StoreError> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM jobs \
         WHERE fingerprint = $1 AND status = ANY($2) \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(fingerprint)
        .bind(status_names(statuses))
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Jobs in the given statuses (for startup recovery)
pub async fn list_jobs_by_status(
    pool: &PgPool,
    statuses: &[JobStatus],
) -> Result<Vec<Job>, StoreError> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ANY($1) ORDER BY created_at ASC, id ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(status_names(statuses))
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}

/// Processing jobs with a remote handle (for the reconciliation sweep)
pub async fn list_inflight_jobs(pool: &PgPool) -> Result<Vec<Job>, StoreError> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM jobs \
         WHERE status = 'processing' AND remote_handle IS NOT NULL \
         ORDER BY created_at ASC, id ASC"
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter().map(job_from_row).collect()
}

fn status_names(statuses: &[JobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_ref().to_string()).collect()
}

fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unexpected {column} value {raw:?}")))
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let stage_timings: Json<BTreeMap<JobStage, StageTiming>> = row.try_get("stage_timings")?;
    let inputs: Json<BTreeMap<InputKind, String>> = row.try_get("inputs")?;

    Ok(Job {
        id: row.try_get("id")?,
        mode: parse_column(row, "mode")?,
        quality: parse_column(row, "quality")?,
        enable_4k: row.try_get("enable_4k")?,
        aspect_ratio: parse_column(row, "aspect_ratio")?,
        fingerprint: row.try_get("fingerprint")?,
        status: parse_column(row, "status")?,
        stage: parse_column(row, "stage")?,
        stage_timings: stage_timings.0,
        inputs: inputs.0,
        output_ref: row.try_get("output_ref")?,
        remote_handle: row.try_get("remote_handle")?,
        request_id: row.try_get("request_id")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}
