use common::{
    env_config::Config,
    error::{AppError, Res},
    misc::Role,
    stripe,
};
use db::{
    dtos::profile::{ProfileCreateRequest, ProfileUpdateRequest},
    models::profile::{AuthCredentials, Profile},
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    dtos::auth::{ProfileUpdate, RegisterRequest},
    services::auth::{hash_password, validate_password},
};

pub async fn get_profile_by_id(pool: &PgPool, user_id: Uuid) -> Res<Profile> {
    db::profile::get_profile_by_id(pool, user_id).await
}

fn normalize_email(email: &str) -> Res<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    Ok(email)
}

fn non_empty(value: &str, field: &str) -> Res<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Inserts profile and credentials. The Stripe customer is created up front
/// so every bidder can save cards right after signing up.
pub async fn create_profile_with_credentials(
    pool: &PgPool,
    req: RegisterRequest,
    config: &Config,
) -> Res<Profile> {
    let email = normalize_email(&req.email)?;
    let first_name = non_empty(&req.first_name, "First name")?;
    let last_name = non_empty(&req.last_name, "Last name")?;
    validate_password(&req.password)?;

    if db::profile::exists_profile_by_email(pool, &email).await? {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let password_hash = hash_password(&req.password)?;

    let stripe_customer_id = if config.stripe.secret_key.is_empty() {
        log::warn!("Stripe is not configured, registering {} without a customer", email);
        None
    } else {
        let client = stripe::create_client(&config.stripe.secret_key);
        let name = format!("{} {}", first_name, last_name);
        let customer = stripe::create_customer(&client, &email, &name).await?;
        Some(customer.id.to_string())
    };

    let mut tx = pool.begin().await?;

    let profile = db::profile::insert_profile(
        &mut *tx,
        ProfileCreateRequest {
            email,
            first_name,
            last_name,
            company_name: req.company_name,
            phone: req.phone,
            role: Role::Bidder,
            stripe_customer_id,
        },
    )
    .await?;

    db::profile::insert_credentials(
        &mut *tx,
        AuthCredentials {
            user_id: profile.id,
            password_hash,
        },
    )
    .await?;

    tx.commit().await?;
    log::info!("Registered user {}", profile.id);
    Ok(profile)
}

pub async fn update_profile(pool: &PgPool, user_id: Uuid, req: ProfileUpdate) -> Res<Profile> {
    let first_name = req.first_name.map(|v| non_empty(&v, "First name")).transpose()?;
    let last_name = req.last_name.map(|v| non_empty(&v, "Last name")).transpose()?;

    db::profile::update_profile(
        pool,
        user_id,
        ProfileUpdateRequest {
            first_name,
            last_name,
            company_name: req.company_name,
            phone: req.phone,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Buyer@Example.COM ").unwrap(), "buyer@example.com");
        assert!(normalize_email("nobody").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a@localhost").is_err());
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(non_empty("   ", "First name").is_err());
        assert_eq!(non_empty(" Ann ", "First name").unwrap(), "Ann");
    }
}
