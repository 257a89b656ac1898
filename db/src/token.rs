use common::{
    error::{AppError, Res},
    misc::TokenPurpose,
};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{dtos::token::TokenCreateRequest, models::token::AuthToken};

pub async fn insert_token<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: TokenCreateRequest,
) -> Res<AuthToken> {
    sqlx::query_as::<_, AuthToken>(
        r#"
        INSERT INTO auth_tokens (user_id, purpose, token_hash, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.purpose.as_str())
    .bind(data.token_hash)
    .bind(data.expires_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Retires every outstanding token of the given purpose for a user.
pub async fn invalidate_tokens<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    purpose: TokenPurpose,
) -> Res<u64> {
    let result = sqlx::query(
        r#"
        UPDATE auth_tokens SET consumed_at = now()
        WHERE user_id = $1 AND purpose = $2 AND consumed_at IS NULL
        "#,
    )
    .bind(user_id)
    .bind(purpose.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Marks a live token as used and returns it. A token can be consumed once;
/// expired, used or unknown tokens yield `None`.
pub async fn consume_token<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    purpose: TokenPurpose,
    token_hash: &str,
    user_id: Option<Uuid>,
) -> Res<Option<AuthToken>> {
    sqlx::query_as::<_, AuthToken>(
        r#"
        UPDATE auth_tokens SET consumed_at = now()
        WHERE id = (
            SELECT id FROM auth_tokens
            WHERE purpose = $1
              AND token_hash = $2
              AND ($3::uuid IS NULL OR user_id = $3)
              AND consumed_at IS NULL
              AND expires_at > now()
            ORDER BY created_at DESC
            LIMIT 1
        )
        AND consumed_at IS NULL
        RETURNING *
        "#,
    )
    .bind(purpose.as_str())
    .bind(token_hash)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}
