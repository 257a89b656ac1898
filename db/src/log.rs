use common::error::{AppError, Res};
use sqlx::{Executor, Postgres, QueryBuilder};

use crate::{dtos::log::ReportFilter, models::log::Log};

const DEFAULT_REPORT_LIMIT: i64 = 100;
const MAX_REPORT_LIMIT: i64 = 1_000;

/// Newest requests first.
pub async fn get_report<'e, E>(executor: E, filter: ReportFilter) -> Res<Vec<Log>>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM request_logs WHERE 1 = 1");

    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }

    if let Some(method) = filter.method {
        qb.push(" AND method = ").push_bind(method.to_uppercase());
    }

    if let Some(status_code) = filter.status_code {
        qb.push(" AND status_code = ").push_bind(status_code);
    }

    if let Some(min_status) = filter.min_status {
        qb.push(" AND status_code >= ").push_bind(min_status);
    }

    if let Some(path) = filter.path {
        qb.push(" AND path LIKE ").push_bind(format!("%{}%", path));
    }

    if let Some(before) = filter.before {
        qb.push(" AND timestamp < ").push_bind(before);
    }

    if let Some(after) = filter.after {
        qb.push(" AND timestamp > ").push_bind(after);
    }

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_REPORT_LIMIT)
        .clamp(1, MAX_REPORT_LIMIT);
    qb.push(" ORDER BY timestamp DESC LIMIT ").push_bind(limit);

    qb.build_query_as::<Log>()
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_log<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    entry: Log,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO request_logs
            (id, timestamp, method, path, status_code, duration_ms, user_id,
             params, request_body, response_body, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(entry.id)
    .bind(entry.timestamp)
    .bind(entry.method)
    .bind(entry.path)
    .bind(entry.status_code)
    .bind(entry.duration_ms)
    .bind(entry.user_id)
    .bind(entry.params)
    .bind(entry.request_body)
    .bind(entry.response_body)
    .bind(entry.ip_address)
    .bind(entry.user_agent)
    .execute(executor)
    .await
    .map_err(AppError::from)?;

    Ok(())
}
