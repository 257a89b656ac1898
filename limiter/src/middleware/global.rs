use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::error::AppError;
use governor::{
    Quota, RateLimiter,
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
};
use std::{future::Future, num::NonZeroU32, pin::Pin, rc::Rc, sync::Arc};

type SharedLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, QuantaClock>>;

/// Processor callbacks are never throttled; Stripe backs off on its own and
/// a dropped `payment_intent.*` event would leave a sale out of date.
const EXEMPT_PREFIXES: [&str; 1] = ["/api/pay/webhook"];

/// One bucket shared by every caller. Protects the database and Stripe
/// quota during a bidding rush at the end of an event.
pub struct GlobalLimiter {
    limiter: SharedLimiter,
}

impl GlobalLimiter {
    pub fn new(permits_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(permits_per_second).unwrap_or(NonZeroU32::MIN);
        // Allow a burst of up to two seconds worth of requests.
        let burst = per_second.saturating_mul(NonZeroU32::MIN.saturating_add(1));
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

fn is_exempt(path: &str) -> bool {
    EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

impl<S, B> Transform<S, ServiceRequest> for GlobalLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = GlobalLimiterService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(GlobalLimiterService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct GlobalLimiterService<S> {
    service: Rc<S>,
    limiter: SharedLimiter,
}

impl<S, B> Service<ServiceRequest> for GlobalLimiterService<S>
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
        let allowed = is_exempt(req.path()) || self.limiter.check().is_ok();

        Box::pin(async move {
            if !allowed {
                log::warn!("Global rate limit hit on {} {}", req.method(), req.path());
                return Ok(req.error_response(AppError::TooManyRequests(
                    "Server overloaded. Please try again later.".to_string(),
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

    #[::std::prelude::v1::test]
    fn webhook_is_exempt() {
        assert!(is_exempt("/api/pay/webhook"));
        assert!(!is_exempt("/api/secured/pay/cards"));
        assert!(!is_exempt("/api/secured/auctions/lots/1/bids"));
    }

    #[actix_web::test]
    async fn rejects_once_the_bucket_is_empty() {
        let app = test::init_service(
            App::new()
                .wrap(GlobalLimiter::new(1))
                .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() }))
                .route(
                    "/api/pay/webhook",
                    web::post().to(|| async { HttpResponse::Ok().finish() }),
                ),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/ping").to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }
        let req = test::TestRequest::get().uri("/ping").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        let webhook = test::TestRequest::post().uri("/api/pay/webhook").to_request();
        assert_eq!(test::call_service(&app, webhook).await.status(), StatusCode::OK);
    }
}
