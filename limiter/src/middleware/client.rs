use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::error::AppError;
use governor::{Quota, RateLimiter, clock::QuantaClock, state::keyed::DashMapStateStore};
use std::{future::Future, num::NonZeroU32, pin::Pin, rc::Rc, sync::Arc};

type ClientStateStore = DashMapStateStore<String>;

/// Per-client limiter keyed by the caller's IP. Mounted on the sign-in
/// routes so one client cannot hammer passwords or one-time codes.
pub struct ClientRateLimiter {
    limiter: Arc<RateLimiter<String, ClientStateStore, QuantaClock>>,
}

impl ClientRateLimiter {
    pub fn new(permits_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(permits_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::dashmap(Quota::per_minute(per_minute)));
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ClientRateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = ClientRateLimiterService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(ClientRateLimiterService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct ClientRateLimiterService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter<String, ClientStateStore, QuantaClock>>,
}

impl<S, B> Service<ServiceRequest> for ClientRateLimiterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let client = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        Box::pin(async move {
            if limiter.check_key(&client).is_err() {
                log::warn!("Client {} exceeded the sign-in rate limit", client);
                return Ok(req.error_response(AppError::TooManyRequests(
                    "Too many attempts. Please wait a minute and try again.".to_string(),
                )));
            }

            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};

    #[actix_web::test]
    async fn blocks_client_after_quota() {
        let app = test::init_service(
            App::new()
                .wrap(ClientRateLimiter::new(2))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get()
                .uri("/")
                .peer_addr("10.0.0.1:4000".parse().unwrap())
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }

        let req = test::TestRequest::get()
            .uri("/")
            .peer_addr("10.0.0.1:4000".parse().unwrap())
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        let other = test::TestRequest::get()
            .uri("/")
            .peer_addr("10.0.0.2:4000".parse().unwrap())
            .to_request();
        assert_eq!(test::call_service(&app, other).await.status(), StatusCode::OK);
    }
}
