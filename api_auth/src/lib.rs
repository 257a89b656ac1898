use actix_web::web;
use middleware::auth::{AdminMiddleware, AuthMiddleware};

pub mod middleware {
    pub mod auth;
}
pub mod routes {
    pub mod auth;
    pub mod user;
}
pub mod services {
    pub mod auth;
    pub mod user;
}
mod dtos {
    pub(crate) mod auth;
}

/// Requires a valid bearer token on every route of the wrapped scope.
pub fn auth_middleware() -> AuthMiddleware {
    AuthMiddleware::new()
}

/// Requires a valid bearer token issued to an admin.
pub fn admin_middleware() -> AdminMiddleware {
    AdminMiddleware::new()
}

pub fn mount_auth() -> actix_web::Scope {
    web::scope("/auth")
        .service(routes::auth::post_register)
        .service(routes::auth::post_login)
        .service(routes::auth::post_otp_request)
        .service(routes::auth::post_otp_verify)
        .service(routes::auth::post_magic_link_request)
        .service(routes::auth::post_magic_link_verify)
        .service(routes::auth::post_password_forgot)
        .service(routes::auth::post_password_reset)
}

pub fn mount_user() -> actix_web::Scope {
    web::scope("/me")
        .service(routes::user::get_me)
        .service(routes::user::patch_me)
}
