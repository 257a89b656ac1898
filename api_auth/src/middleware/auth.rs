use std::{future::Future, pin::Pin, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::{error::AppError, jwt::get_jwt_claims_or_error};
use futures::future::{Ready, ok};

/// Rejects requests without valid claims and exposes the claims to handlers
/// as `web::ReqData<JwtClaims>`. Relies on the extractor having run first.
pub struct AuthMiddleware {}

impl AuthMiddleware {
    pub fn new() -> Self {
        AuthMiddleware {}
    }
}

impl Default for AuthMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            admin_only: false,
        })
    }
}

/// Same as [`AuthMiddleware`] but only lets admins through.
pub struct AdminMiddleware {}

impl AdminMiddleware {
    pub fn new() -> Self {
        AdminMiddleware {}
    }
}

impl Default for AdminMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            admin_only: true,
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    admin_only: bool,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Arc::clone(&self.service);
        let admin_only = self.admin_only;

        Box::pin(async move {
            let claims = match get_jwt_claims_or_error(&req) {
                Ok(claims) => claims,
                Err(response) => return Ok(req.into_response(response)),
            };

            if admin_only && !claims.is_admin() {
                log::warn!("User {} tried to reach {}", claims.user_id, req.path());
                let response =
                    AppError::Forbidden("Admin access required".to_string()).to_http_response();
                return Ok(req.into_response(response));
            }

            req.extensions_mut().insert(claims);
            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}
