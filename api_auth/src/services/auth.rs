use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::{OsRng, RngCore},
    },
};
use chrono::{Duration, Utc};
use common::{
    env_config::Config,
    error::{AppError, Res},
    jwt::{self, ClaimsSpec},
    misc::{Role, TokenPurpose, hash_str},
};
use db::{dtos::token::TokenCreateRequest, models::profile::Profile};
use notifier::{Notifier, templates};
use sqlx::PgPool;
use uuid::Uuid;

use crate::dtos::auth::{AuthResponse, LoginRequest};

pub const OTP_TTL_MINUTES: i64 = 10;
pub const MAGIC_LINK_TTL_MINUTES: i64 = 15;
pub const PASSWORD_RESET_TTL_MINUTES: i64 = 60;
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn hash_password(password: &str) -> Res<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

pub fn validate_password(password: &str) -> Res<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Six digit numeric one-time code.
pub fn generate_otp() -> String {
    format!("{:06}", OsRng.next_u32() % 1_000_000)
}

/// Random 256-bit token, hex encoded, for links sent by email.
pub fn generate_link_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn issue_token(profile: Profile, config: &Config) -> Res<AuthResponse> {
    let token = jwt::generate_jwt(
        ClaimsSpec {
            user_id: profile.id,
            email: profile.email.clone(),
            role: Role::from_str(&profile.role)?,
            stripe_customer_id: profile.stripe_customer_id.clone(),
        },
        &config.jwt_config,
    )?;
    Ok(AuthResponse {
        token,
        user: profile,
    })
}

/// Checks email and password. Unknown emails and wrong passwords get the
/// same error.
pub async fn authenticate_user(pool: &PgPool, req: &LoginRequest) -> Res<Profile> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());
    let record = db::profile::get_profile_with_password_hash(pool, req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &record.password_hash) {
        return Err(invalid());
    }
    Ok(record.profile)
}

/// Stores a fresh one-time token for the user, retiring older ones of the
/// same purpose, and returns the raw secret to send out.
async fn store_token(
    pool: &PgPool,
    user_id: Uuid,
    purpose: TokenPurpose,
    secret: String,
    ttl_minutes: i64,
) -> Res<String> {
    let mut tx = pool.begin().await?;
    db::token::invalidate_tokens(&mut *tx, user_id, purpose).await?;
    db::token::insert_token(
        &mut *tx,
        TokenCreateRequest {
            user_id,
            purpose,
            token_hash: hash_str(&secret),
            expires_at: Utc::now() + Duration::minutes(ttl_minutes),
        },
    )
    .await?;
    tx.commit().await?;
    Ok(secret)
}

/// Emails a sign-in code. Unknown addresses are ignored silently.
pub async fn request_otp(pool: &PgPool, notifier: &Notifier, email: &str) -> Res<()> {
    let Some(profile) = db::profile::get_profile_by_email(pool, email.trim()).await? else {
        log::info!("Sign-in code requested for unknown email");
        return Ok(());
    };

    let code = store_token(pool, profile.id, TokenPurpose::Otp, generate_otp(), OTP_TTL_MINUTES).await?;
    notifier
        .send(
            &profile.email,
            templates::otp_code(&profile.first_name, &code, OTP_TTL_MINUTES),
        )
        .await;
    Ok(())
}

pub async fn verify_otp(pool: &PgPool, email: &str, code: &str) -> Res<Profile> {
    let invalid = || AppError::Unauthorized("Invalid or expired code".to_string());
    let profile = db::profile::get_profile_by_email(pool, email.trim())
        .await?
        .ok_or_else(invalid)?;

    db::token::consume_token(pool, TokenPurpose::Otp, &hash_str(code.trim()), Some(profile.id))
        .await?
        .ok_or_else(invalid)?;

    db::profile::set_email_verified(pool, profile.id).await
}

pub async fn request_magic_link(
    pool: &PgPool,
    notifier: &Notifier,
    email: &str,
) -> Res<()> {
    let Some(profile) = db::profile::get_profile_by_email(pool, email.trim()).await? else {
        log::info!("Magic link requested for unknown email");
        return Ok(());
    };

    let token = store_token(
        pool,
        profile.id,
        TokenPurpose::MagicLink,
        generate_link_token(),
        MAGIC_LINK_TTL_MINUTES,
    )
    .await?;
    let link = notifier.url(&format!("auth/magic?token={}", token));
    notifier
        .send(
            &profile.email,
            templates::magic_link(&profile.first_name, &link, MAGIC_LINK_TTL_MINUTES),
        )
        .await;
    Ok(())
}

pub async fn verify_magic_link(pool: &PgPool, token: &str) -> Res<Profile> {
    let consumed = db::token::consume_token(pool, TokenPurpose::MagicLink, &hash_str(token.trim()), None)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired link".to_string()))?;

    db::profile::set_email_verified(pool, consumed.user_id).await
}

pub async fn request_password_reset(
    pool: &PgPool,
    notifier: &Notifier,
    email: &str,
) -> Res<()> {
    let Some(profile) = db::profile::get_profile_by_email(pool, email.trim()).await? else {
        log::info!("Password reset requested for unknown email");
        return Ok(());
    };

    let token = store_token(
        pool,
        profile.id,
        TokenPurpose::PasswordReset,
        generate_link_token(),
        PASSWORD_RESET_TTL_MINUTES,
    )
    .await?;
    let link = notifier.url(&format!("auth/reset-password?token={}", token));
    notifier
        .send(
            &profile.email,
            templates::password_reset(&profile.first_name, &link, PASSWORD_RESET_TTL_MINUTES),
        )
        .await;
    Ok(())
}

pub async fn reset_password(pool: &PgPool, token: &str, new_password: &str) -> Res<()> {
    validate_password(new_password)?;
    let password_hash = hash_password(new_password)?;

    let mut tx = pool.begin().await?;
    let consumed = db::token::consume_token(
        &mut *tx,
        TokenPurpose::PasswordReset,
        &hash_str(token.trim()),
        None,
    )
    .await?
    .ok_or_else(|| AppError::Unauthorized("Invalid or expired link".to_string()))?;

    db::profile::upsert_password(&mut *tx, consumed.user_id, &password_hash).await?;
    // Possessing the emailed link proves ownership of the address.
    db::profile::set_email_verified(&mut *tx, consumed.user_id).await?;
    tx.commit().await?;

    log::info!("Password reset for user {}", consumed.user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..50 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn link_tokens_are_long_and_unique() {
        let a = generate_link_token();
        let b = generate_link_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_ne!(hash_str(&a), a);
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(matches!(validate_password("short"), Err(AppError::BadRequest(_))));
        assert!(validate_password("long enough").is_ok());
    }
}
