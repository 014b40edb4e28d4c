//! Upstream reverse proxy.
//!
//! Requests the filter lets through are forwarded to the application
//! behind the gateway. Hop-by-hop headers are dropped; everything else,
//! including the buffered body, passes through unchanged.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::error::ApiError;

const PROXY_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PROXY_BODY: usize = 50 * 1024 * 1024;

#[derive(Clone)]
struct ProxyState {
    client: reqwest::Client,
    base_url: String,
}

/// Router that forwards every request to `base_url`.
pub fn upstream_router(base_url: impl Into<String>) -> Router {
    let state = ProxyState {
        client: reqwest::Client::builder()
            .timeout(PROXY_TIMEOUT)
            .build()
            .expect("reqwest client"),
        base_url: base_url.into().trim_end_matches('/').to_string(),
    };

    Router::new().fallback(proxy).with_state(state)
}

async fn proxy(State(state): State<ProxyState>, req: Request) -> Response {
    let path_and_query = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = format!("{}{}", state.base_url, path_and_query);

    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_PROXY_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::new(StatusCode::BAD_REQUEST, format!("Cannot read request body: {e}"))
                .into_response()
        }
    };

    let mut upstream_request = state.client.request(parts.method, &url);
    for (name, value) in parts.headers.iter() {
        if name == header::HOST {
            continue;
        }
        upstream_request = upstream_request.header(name, value);
    }

    let upstream_response = match upstream_request.body(body_bytes.to_vec()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, url, "upstream request failed");
            return ApiError::new(StatusCode::BAD_GATEWAY, "Upstream unavailable").into_response();
        }
    };

    let status = upstream_response.status();
    let headers = upstream_response.headers().clone();
    let bytes = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, url, "upstream body read failed");
            return ApiError::new(StatusCode::BAD_GATEWAY, "Upstream unavailable").into_response();
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    for (name, value) in headers.iter() {
        if name == header::TRANSFER_ENCODING || name == header::CONNECTION {
            continue;
        }
        response.headers_mut().insert(name, value.clone());
    }
    response
}
