//! Request correlation.
//!
//! Every request carries an `x-request-id`: the inbound value when the
//! caller supplied one, a fresh UUID otherwise. The id is stored in the
//! request extensions as [`RequestId`] and echoed on the response, so a
//! Tessaro admin front-end can join its own traces to the service logs.

use axum::http::{HeaderName, HeaderValue};
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id of the current request, available to handlers through
/// the request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = match req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        Some(inbound) => inbound.to_string(),
        None => Uuid::new_v4().to_string(),
    };

    req.extensions_mut().insert(RequestId(id.clone()));
    if let Ok(value) = HeaderValue::from_str(&id) {
        req.headers_mut().insert(&REQUEST_ID_HEADER, value);
    }

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(&REQUEST_ID_HEADER, value);
    }
    response
}
