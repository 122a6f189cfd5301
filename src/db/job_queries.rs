use sqlx::{PgPool, Row};

/// Insert a job-run row at start; returns its id.
pub async fn record_job_start(pool: &PgPool, job_name: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "INSERT INTO job_runs (job_name, status) VALUES ($1, 'running') RETURNING id",
    )
    .bind(job_name)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

pub async fn record_job_success(
    pool: &PgPool,
    job_id: i64,
    items_processed: i32,
    items_failed: i32,
    duration_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE job_runs
        SET completed_at = NOW(),
            status = 'success',
            items_processed = $2,
            items_failed = $3,
            duration_ms = $4
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(items_processed)
    .bind(items_failed)
    .bind(duration_ms)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn record_job_failure(
    pool: &PgPool,
    job_id: i64,
    error_message: &str,
    duration_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE job_runs
        SET completed_at = NOW(),
            status = 'failed',
            error_message = $2,
            duration_ms = $3
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(error_message)
    .bind(duration_ms)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a skipped fire because the previous invocation was still running.
pub async fn record_job_overrun(pool: &PgPool, job_name: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO job_runs (job_name, status, completed_at, duration_ms)
        VALUES ($1, 'skipped_overrun', NOW(), 0)
        "#,
    )
    .bind(job_name)
    .execute(pool)
    .await?;

    Ok(())
}
