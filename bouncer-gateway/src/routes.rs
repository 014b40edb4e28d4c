//! Router assembly.
//!
//! Wraps the upstream router with the attestation filter and the common
//! middleware layers: tracing, request timeout, and request-id
//! propagation.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use axum::{middleware, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use crate::filter::attestation_filter;
use crate::state::GatewayState;

/// Wrap `upstream` with the device-integrity filter and shared layers.
pub fn create_router(state: Arc<GatewayState>, upstream: Router) -> Router {
    let timeout = TimeoutLayer::new(Duration::from_secs(state.config.timeout_secs));
    let x_request_id = HeaderName::from_static("x-request-id");

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().include_headers(true))
        .on_response(DefaultOnResponse::new().include_headers(true));

    upstream
        .layer(middleware::from_fn_with_state(state, attestation_filter))
        .layer(timeout)
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
}
