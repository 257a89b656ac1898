use actix_web::{HttpMessage, HttpResponse, dev::ServiceRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    env_config::JwtConfig,
    error::{AppError, Res},
    misc::Role,
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub stripe_customer_id: Option<String>,
    pub exp: usize,
}

impl JwtClaims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Stripe customer of the caller, required by every payment flow.
    pub fn customer_id(&self) -> Res<&str> {
        self.stripe_customer_id
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("No payment profile on this account".to_string()))
    }
}

pub struct ClaimsSpec {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub stripe_customer_id: Option<String>,
}

/// Generates JWT token based on user object and JWT configuration options
pub fn generate_jwt(spec: ClaimsSpec, config: &JwtConfig) -> Res<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(config.expiration_hours))
        .ok_or_else(|| AppError::Internal("Invalid token expiration".to_string()))?
        .timestamp();

    let claims = JwtClaims {
        user_id: spec.user_id,
        email: spec.email,
        role: spec.role,
        stripe_customer_id: spec.stripe_customer_id,
        exp: expiration as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(AppError::from)
}

/// Extracts claims object from JWT token.
/// Requires JWT secret.
pub fn validate_jwt(token: &str, secret: &str) -> Res<JwtClaims> {
    let token_data = jsonwebtoken::decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn get_jwt_claims_or_error(req: &ServiceRequest) -> Result<JwtClaims, HttpResponse> {
    if let Some(jwt_claims_res) = req.extensions().get::<Res<JwtClaims>>() {
        match jwt_claims_res {
            Ok(claims) => Ok(claims.clone()),
            Err(app_error) => Err(app_error.to_http_response()),
        }
    } else {
        Err(
            AppError::Unauthorized("No authorization token provided".to_string())
                .to_http_response(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test_secret".to_string(),
            expiration_hours: 1,
        }
    }

    #[test]
    fn token_carries_role_and_customer() {
        let user_id = Uuid::new_v4();
        let token = generate_jwt(
            ClaimsSpec {
                user_id,
                email: "bidder@example.com".to_string(),
                role: Role::Admin,
                stripe_customer_id: Some("cus_123".to_string()),
            },
            &config(),
        )
        .unwrap();

        let claims = validate_jwt(&token, "test_secret").unwrap();
        assert_eq!(claims.user_id, user_id);
        assert!(claims.is_admin());
        assert_eq!(claims.customer_id().unwrap(), "cus_123");
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = generate_jwt(
            ClaimsSpec {
                user_id: Uuid::new_v4(),
                email: "bidder@example.com".to_string(),
                role: Role::Bidder,
                stripe_customer_id: None,
            },
            &config(),
        )
        .unwrap();

        assert!(validate_jwt(&token, "another_secret").is_err());
    }

    #[test]
    fn missing_customer_is_a_bad_request() {
        let claims = JwtClaims {
            user_id: Uuid::new_v4(),
            email: "bidder@example.com".to_string(),
            role: Role::Bidder,
            stripe_customer_id: None,
            exp: 0,
        };
        assert!(matches!(claims.customer_id(), Err(AppError::BadRequest(_))));
    }
}
