use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    dtos::profile::{ProfileCreateRequest, ProfileUpdateRequest},
    models::profile::{AuthCredentials, Profile, ProfileWithPassword},
};

pub async fn exists_profile_by_email<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    email: &str,
) -> Res<bool> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE lower(email) = lower($1))")
        .bind(email)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_profile_by_email<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    email: &str,
) -> Res<Option<Profile>> {
    sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_profile_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Profile> {
    sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
        .bind(user_id)
        .fetch_one(executor)
        .await
        .map_err(|e| AppError::not_found_or(e.into(), "Profile"))
}

pub async fn get_profiles_by_ids<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_ids: &[Uuid],
) -> Res<Vec<Profile>> {
    sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ANY($1)")
        .bind(user_ids)
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_profile<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: ProfileCreateRequest,
) -> Res<Profile> {
    sqlx::query_as::<_, Profile>(
        r#"
        INSERT INTO profiles (email, first_name, last_name, company_name, phone, role, stripe_customer_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(data.email)
    .bind(data.first_name)
    .bind(data.last_name)
    .bind(data.company_name)
    .bind(data.phone)
    .bind(data.role.as_str())
    .bind(data.stripe_customer_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_credentials<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: AuthCredentials,
) -> Res<()> {
    sqlx::query("INSERT INTO auth_credentials (user_id, password_hash) VALUES ($1, $2)")
        .bind(data.user_id)
        .bind(data.password_hash)
        .execute(executor)
        .await?;
    Ok(())
}

/// Creates or replaces the password of a user.
pub async fn upsert_password<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    password_hash: &str,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO auth_credentials (user_id, password_hash) VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET password_hash = EXCLUDED.password_hash
        "#,
    )
    .bind(user_id)
    .bind(password_hash)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_profile_with_password_hash<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    email: &str,
) -> Res<Option<ProfileWithPassword>> {
    sqlx::query_as::<_, ProfileWithPassword>(
        r#"
        SELECT p.*, ac.password_hash
        FROM profiles p
        JOIN auth_credentials ac ON p.id = ac.user_id
        WHERE lower(p.email) = lower($1)
        "#,
    )
    .bind(email)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

pub async fn update_profile<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    data: ProfileUpdateRequest,
) -> Res<Profile> {
    sqlx::query_as::<_, Profile>(
        r#"
        UPDATE profiles SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            company_name = COALESCE($4, company_name),
            phone = COALESCE($5, phone),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(data.first_name)
    .bind(data.last_name)
    .bind(data.company_name)
    .bind(data.phone)
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::not_found_or(e.into(), "Profile"))
}

pub async fn set_email_verified<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Profile> {
    sqlx::query_as::<_, Profile>(
        "UPDATE profiles SET email_verified = TRUE, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn set_verified<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    verified: bool,
) -> Res<Profile> {
    sqlx::query_as::<_, Profile>(
        "UPDATE profiles SET verified = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .bind(verified)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn set_stripe_customer<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    customer_id: &str,
) -> Res<Profile> {
    sqlx::query_as::<_, Profile>(
        r#"
        UPDATE profiles SET stripe_customer_id = $2, updated_at = now()
        WHERE id = $1 AND stripe_customer_id IS NULL
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(customer_id)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}
