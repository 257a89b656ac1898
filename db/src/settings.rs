use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::{dtos::settings::SettingsUpdateRequest, models::settings::SiteSettings};

pub async fn get_settings<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<SiteSettings> {
    sqlx::query_as::<_, SiteSettings>(
        r#"
        SELECT maintenance_mode, maintenance_message, soft_close_seconds, updated_at
        FROM site_settings WHERE id = 1
        "#,
    )
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn update_settings<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: SettingsUpdateRequest,
) -> Res<SiteSettings> {
    sqlx::query_as::<_, SiteSettings>(
        r#"
        UPDATE site_settings SET
            maintenance_mode = COALESCE($1, maintenance_mode),
            maintenance_message = COALESCE($2, maintenance_message),
            soft_close_seconds = COALESCE($3, soft_close_seconds),
            updated_at = now()
        WHERE id = 1
        RETURNING maintenance_mode, maintenance_message, soft_close_seconds, updated_at
        "#,
    )
    .bind(data.maintenance_mode)
    .bind(data.maintenance_message)
    .bind(data.soft_close_seconds)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}
