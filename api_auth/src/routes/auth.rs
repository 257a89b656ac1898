use actix_web::{Responder, post, web};
use common::env_config::Config;
use common::error::Res;
use common::http::Success;
use notifier::Notifier;
use sqlx::PgPool;
use std::sync::Arc;

use crate::dtos::auth::{
    EmailRequest, LoginRequest, MessageResponse, OtpVerifyRequest, PasswordResetRequest,
    RegisterRequest, TokenRequest,
};
use crate::services;

const CHECK_INBOX: MessageResponse = MessageResponse {
    message: "If an account exists for this email, a message is on its way",
};

/// Registers a new bidder with email and password.
///
/// # Input
/// - `req`: JSON payload with email, password, names and optional company/phone
///
/// # Output
/// - Success: 201 Created with the auth token and the new profile
/// - Error: 400 for invalid input, 409 if the email is already registered
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/auth/register', {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json' },
///   body: JSON.stringify({
///     email: 'buyer@example.com',
///     password: 'securepassword',
///     first_name: 'Jane',
///     last_name: 'Doe',
///     company_name: 'Doe Machining' // Optional
///   })
/// });
/// const { token, user } = await response.json();
/// ```
#[post("/register")]
pub async fn post_register(
    req: web::Json<RegisterRequest>,
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let pg_pool: &PgPool = &pool;
    let profile =
        services::user::create_profile_with_credentials(pg_pool, req.into_inner(), &config).await?;
    let response = services::auth::issue_token(profile, &config)?;
    Success::created(response)
}

/// Authenticates a user with email and password.
///
/// # Output
/// - Success: auth token and profile
/// - Error: 401 Unauthorized for invalid credentials
#[post("/login")]
pub async fn post_login(
    login_data: web::Json<LoginRequest>,
    config: web::Data<Arc<Config>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let pg_pool: &PgPool = &pool;
    let profile = services::auth::authenticate_user(pg_pool, &login_data).await?;
    Success::ok(services::auth::issue_token(profile, &config)?)
}

/// Emails a six digit sign-in code valid for ten minutes.
/// Always answers 200 so the endpoint does not reveal which accounts exist.
#[post("/otp/request")]
pub async fn post_otp_request(
    req: web::Json<EmailRequest>,
    pool: web::Data<Arc<PgPool>>,
    notifier: web::Data<Notifier>,
) -> Res<impl Responder> {
    services::auth::request_otp(&pool, &notifier, &req.email).await?;
    Success::ok(CHECK_INBOX)
}

/// Exchanges an emailed code for an auth token.
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/auth/otp/verify', {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json' },
///   body: JSON.stringify({ email: 'buyer@example.com', code: '042519' })
/// });
/// ```
#[post("/otp/verify")]
pub async fn post_otp_verify(
    req: web::Json<OtpVerifyRequest>,
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let profile = services::auth::verify_otp(&pool, &req.email, &req.code).await?;
    Success::ok(services::auth::issue_token(profile, &config)?)
}

#[post("/magic-link/request")]
pub async fn post_magic_link_request(
    req: web::Json<EmailRequest>,
    pool: web::Data<Arc<PgPool>>,
    notifier: web::Data<Notifier>,
) -> Res<impl Responder> {
    services::auth::request_magic_link(&pool, &notifier, &req.email).await?;
    Success::ok(CHECK_INBOX)
}

/// Called by the web app with the `token` query parameter of the emailed link.
#[post("/magic-link/verify")]
pub async fn post_magic_link_verify(
    req: web::Json<TokenRequest>,
    pool: web::Data<Arc<PgPool>>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let profile = services::auth::verify_magic_link(&pool, &req.token).await?;
    Success::ok(services::auth::issue_token(profile, &config)?)
}

#[post("/password/forgot")]
pub async fn post_password_forgot(
    req: web::Json<EmailRequest>,
    pool: web::Data<Arc<PgPool>>,
    notifier: web::Data<Notifier>,
) -> Res<impl Responder> {
    services::auth::request_password_reset(&pool, &notifier, &req.email).await?;
    Success::ok(CHECK_INBOX)
}

/// Sets a new password using the token from the reset email.
///
/// # Output
/// - Success: 200 with a confirmation message
/// - Error: 400 for a weak password, 401 for an invalid or expired token
#[post("/password/reset")]
pub async fn post_password_reset(
    req: web::Json<PasswordResetRequest>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    services::auth::reset_password(&pool, &req.token, &req.password).await?;
    Success::ok(MessageResponse {
        message: "Password updated",
    })
}
