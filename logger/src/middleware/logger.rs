use actix_web::body::{self, BoxBody, MessageBody};
use actix_web::dev::Payload;
use actix_web::web::{self, Bytes};
use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use actix_web::{HttpMessage, HttpResponse, ResponseError};
use chrono::Utc;
use colored::Colorize;
use common::env_config::Config;
use common::jwt::get_jwt_claims_or_error;
use db::models::log::Log;
use futures::StreamExt;
use futures::future::{LocalBoxFuture, Ready, ready};
use log::{debug, error, info};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::types::ipnetwork::IpNetwork;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Paths whose bodies carry credentials or raw processor payloads.
const REDACTED_PREFIXES: [&str; 2] = ["/api/auth", "/api/pay/webhook"];

pub struct LoggerMiddleware {}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
    <B as MessageBody>::Error: ResponseError,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = LoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggerMiddlewareService {
            service: Arc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
    <B as MessageBody>::Error: ResponseError,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let query_string = req.query_string().to_string();
        let redact = is_redacted(&path);

        let ip_address = req
            .connection_info()
            .realip_remote_addr()
            .and_then(|s| parse_ip(s))
            .unwrap_or_else(|| IpNetwork::from(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));

        let user_agent = req
            .headers()
            .get("User-Agent")
            .map(|ua| ua.to_str().unwrap_or_default().to_string())
            .unwrap_or_default();

        let console_logging_enabled = req
            .app_data::<web::Data<Arc<Config>>>()
            .map(|config| config.console_logging_enabled)
            .unwrap_or(true);
        let pool = req
            .app_data::<web::Data<Arc<PgPool>>>()
            .map(|pool| Arc::clone(pool.get_ref()));
        let srv = Arc::clone(&self.service);

        Box::pin(async move {
            let user_id = get_jwt_claims_or_error(&req).ok().map(|c| c.user_id);

            // Copy request body from payload and put it back for the handler
            let mut payload = req.take_payload();
            let body_bytes = extract_body(&mut payload).await?;
            let request_body = if redact || body_bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice::<Value>(&body_bytes).unwrap_or(Value::Null)
            };
            let new_stream: Pin<
                Box<dyn futures::Stream<Item = Result<Bytes, actix_web::error::PayloadError>>>,
            > = futures::stream::once(async move {
                Ok::<Bytes, actix_web::error::PayloadError>(body_bytes)
            })
            .boxed();
            req.set_payload(Payload::from(new_stream));

            let res = srv.call(req).await?;

            let status = res.status();
            let status_code = status.as_u16() as i32;
            let timestamp = Utc::now();
            let params_json = parse_params(&query_string);

            // Copy response body and rebuild the response
            let (req, res) = res.into_parts();
            let headers = res.headers().clone();
            let response_body_bytes = body::to_bytes(res.into_body()).await?;
            let response_body = if redact {
                Value::Null
            } else {
                serde_json::from_slice::<Value>(&response_body_bytes).unwrap_or(Value::Null)
            };
            let mut new_res = HttpResponse::build(status);
            for (key, value) in headers.iter() {
                new_res.insert_header((key.clone(), value.clone()));
            }
            let res = ServiceResponse::new(req, new_res.body(response_body_bytes));

            let duration_ms = started.elapsed().as_millis() as i64;

            if console_logging_enabled {
                let colored_status = match status_code {
                    200..=299 => status_code.to_string().green(),
                    300..=399 => status_code.to_string().yellow(),
                    400..=499 => status_code.to_string().bright_red(),
                    _ => status_code.to_string().red(),
                };

                let colored_method = match method.as_str() {
                    "GET" => method.blue(),
                    "POST" => method.yellow(),
                    "PUT" | "PATCH" => method.purple(),
                    "DELETE" => method.red(),
                    _ => method.normal(),
                };

                info!(
                    "[{}] {} {} {} user_id={} params={}",
                    colored_status,
                    colored_method,
                    path.bright_white(),
                    format!("({}ms)", duration_ms).bright_black(),
                    user_id
                        .map_or("None".to_string(), |id| id.to_string())
                        .bright_blue(),
                    params_json.to_string().bright_cyan(),
                );

                if request_body.as_object().is_some_and(|body| !body.is_empty()) {
                    debug!(
                        "  Request: {}",
                        serde_json::to_string(&request_body)
                            .unwrap_or_default()
                            .bright_green()
                    );
                }

                if status_code >= 400 {
                    debug!(
                        "  Response: {}",
                        serde_json::to_string(&response_body)
                            .unwrap_or_default()
                            .bright_yellow()
                    );
                }
            }

            if let Some(pool) = pool {
                let entry = Log {
                    id: Uuid::new_v4(),
                    timestamp,
                    method,
                    path,
                    status_code,
                    duration_ms,
                    user_id,
                    params: Some(params_json),
                    request_body: Some(request_body),
                    response_body: Some(response_body),
                    ip_address,
                    user_agent,
                };
                // A failed audit write never fails the request itself.
                if let Err(e) = db::log::insert_log(pool.as_ref(), entry).await {
                    error!("Failed to store request log: {}", e);
                }
            }

            Ok(res)
        })
    }
}

fn is_redacted(path: &str) -> bool {
    REDACTED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Parses `ip` or `ip:port` as reported by the connection info.
fn parse_ip(raw: &str) -> Option<IpNetwork> {
    if let Ok(ip) = IpNetwork::from_str(raw) {
        return Some(ip);
    }
    std::net::SocketAddr::from_str(raw)
        .ok()
        .map(|addr| IpNetwork::from(addr.ip()))
}

fn parse_params(query_string: &str) -> Value {
    if query_string.is_empty() {
        return json!({});
    }
    let mut params_map = HashMap::new();
    for pair in query_string.split('&') {
        if let Some(pos) = pair.find('=') {
            let key = &pair[0..pos];
            let value = &pair[pos + 1..];
            params_map.insert(key.to_string(), json!(value));
        } else {
            params_map.insert(pair.to_string(), json!(true));
        }
    }
    json!(params_map)
}

async fn extract_body(payload: &mut Payload) -> Result<Bytes, Error> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_webhook_bodies_are_redacted() {
        assert!(is_redacted("/api/auth/login"));
        assert!(is_redacted("/api/pay/webhook"));
        assert!(!is_redacted("/api/secured/auctions/bids"));
    }

    #[test]
    fn query_string_becomes_json() {
        let params = parse_params("status=live&drafts");
        assert_eq!(params["status"], "live");
        assert_eq!(params["drafts"], true);
        assert_eq!(parse_params(""), json!({}));
    }

    #[test]
    fn ip_with_port_is_accepted() {
        assert_eq!(
            parse_ip("10.0.0.7:5123").unwrap().ip().to_string(),
            "10.0.0.7"
        );
        assert_eq!(parse_ip("::1").unwrap().ip().to_string(), "::1");
        assert!(parse_ip("not-an-ip").is_none());
    }
}
