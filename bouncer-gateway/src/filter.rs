//! Device-integrity filter.
//!
//! Axum middleware guarding the protected auth routes. A protected request
//! either receives a fresh integrity challenge (HTTP 480) or has its
//! challenge response verified against the platform attestation service;
//! verified requests continue to the upstream handler, everything else is
//! rejected with a terse 403.
//!
//! The request body is buffered once here and restored, so downstream
//! handlers read the identical bytes.

use std::sync::{Arc, LazyLock};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use bouncer_core::{evaluate, verify_assertion, AndroidOutcome, IntegrityError};
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;

use crate::device_error::parse_self_reported;
use crate::error::ApiError;
use crate::nonce::compute_request_nonce;
use crate::platform::{meets_minimum_version, Platform};
use crate::state::GatewayState;
use crate::store::AttestationRecord;

/// Out-of-standard status code agreed with the app teams to initiate the
/// integrity check.
pub const CHALLENGE_STATUS: u16 = 480;

const CHALLENGE_BYTES: usize = 128;

/// Protected bodies are small auth forms; anything beyond this is not a
/// request we would forward anyway.
const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

static PHONE_NUMBER_LOGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bphoneNumber=").unwrap());

const PROTECTED_ROUTES: [&str; 1] = ["/v2.5/auth/sign-up"];

/// The filter activates only for sign-up, and for login when the body is a
/// phone-number login.
fn is_protected_route(uri: &Uri, body: &[u8]) -> bool {
    let request_uri = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if request_uri == "/v2.5/auth/login" {
        return PHONE_NUMBER_LOGIN.is_match(&String::from_utf8_lossy(body));
    }

    PROTECTED_ROUTES.contains(&request_uri)
}

enum Decision {
    Forward,
    Respond(Response),
}

fn respond(err: ApiError) -> Decision {
    Decision::Respond(err.into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Middleware entry point.
pub async fn attestation_filter(
    State(state): State<Arc<GatewayState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // Bodies can only be read once; buffer and restore so the upstream
    // sees the identical bytes.
    let body = std::mem::replace(req.body_mut(), Body::empty());
    let body_bytes = match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::new(StatusCode::BAD_REQUEST, format!("Cannot read request body: {e}"))
                .into_response()
        }
    };
    *req.body_mut() = Body::from(body_bytes.clone());

    if !is_protected_route(req.uri(), &body_bytes) {
        return next.run(req).await;
    }

    match screen_request(&state, req.uri(), req.headers(), &body_bytes).await {
        Decision::Forward => next.run(req).await,
        Decision::Respond(response) => response,
    }
}

/// The protocol state machine for one protected request.
async fn screen_request(
    state: &GatewayState,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Decision {
    let udid = header_str(headers, "udid");
    let user_agent = header_str(headers, "user-agent");
    let app_version = header_str(headers, "appVersion");
    let authorization = header_str(headers, "authorization");
    let bypass = header_str(headers, "x-muzz-bypass-device-integrity-check");
    let encoded_key_id = header_str(headers, "x-keyid");
    let encoded_assertion = header_str(headers, "x-assertation");

    let platform = Platform::from_user_agent(user_agent);

    if udid.is_empty() {
        return respond(ApiError::forbidden("Missing UDID in request"));
    }
    if app_version.is_empty() {
        return respond(ApiError::forbidden("Missing app version in request"));
    }
    let Some(platform) = platform else {
        return respond(ApiError::forbidden("Invalid OS"));
    };

    if !meets_minimum_version(platform, app_version) {
        let accept = header_str(headers, "accept-language");
        return Decision::Respond(upgrade_response(state, platform, accept));
    }

    // Test/staging affordance, and Android is version-gated only at this
    // release.
    if !bypass.is_empty()
        || (platform == Platform::Android && !state.config.enforce_android_attestation)
    {
        return Decision::Forward;
    }

    let existing = match state.store.get(udid).await {
        Ok(existing) => existing,
        Err(e) => {
            tracing::error!(error = %e, udid, "session store read failed");
            None
        }
    };

    // No prior state, or the client has not begun the integrity exchange:
    // round 1, issue a challenge.
    let Some(mut record) = existing.filter(|_| !authorization.is_empty()) else {
        return issue_challenge(state, platform, udid, headers, body).await;
    };

    // The SDK could not attest and said why; record it and let the request
    // through. A captcha challenge is the planned follow-up here.
    if let Some(code) = parse_self_reported(platform, authorization) {
        record.device_error_code = Some(code.to_string());
        if let Err(e) = state.store.update(&mut record).await {
            tracing::error!(error = %e, udid, "update device error code");
        }
        tracing::info!(udid, code, "client self-reported attestation error");
        return Decision::Forward;
    }

    let Some(token) = authorization.strip_prefix("Integrity ") else {
        return respond(ApiError::forbidden("Missing integrity authorization header"));
    };
    if token.is_empty() {
        return respond(ApiError::forbidden("Empty authorization header"));
    }

    record.challenge_response = Some(token.to_string());
    if let Err(e) = state.store.update(&mut record).await {
        tracing::error!(error = %e, udid, "update challenge response");
    }

    let server_nonce =
        match compute_request_nonce(uri, body, &record.challenge, state.config.environment) {
            Ok(nonce) => nonce,
            Err(e) => {
                tracing::error!(error = %e, "cannot canonicalize request for nonce");
                return respond(ApiError::internal("Failed to calculate server nonce"));
            }
        };

    match platform {
        Platform::Android => verify_android(state, record, token, &server_nonce).await,
        Platform::Ios => {
            verify_ios(
                state,
                record,
                token,
                encoded_key_id,
                encoded_assertion,
                &server_nonce,
            )
            .await
        }
    }
}

/// Round 1: mint a challenge, persist it, and short-circuit with 480.
async fn issue_challenge(
    state: &GatewayState,
    platform: Platform,
    udid: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Decision {
    let mut challenge_bytes = [0u8; CHALLENGE_BYTES];
    OsRng.fill_bytes(&mut challenge_bytes);
    let challenge = URL_SAFE.encode(challenge_bytes);

    let record = AttestationRecord::new(
        udid,
        challenge.clone(),
        platform,
        format!("{headers:?}"),
        String::from_utf8_lossy(body),
    );

    if let Err(e) = state.store.create(record).await {
        tracing::error!(error = %e, udid, "create attestation record");
        return respond(ApiError::internal("Could not issue integrity challenge"));
    }

    tracing::info!(udid, platform = platform.as_str(), "issued integrity challenge");

    let response = (
        StatusCode::from_u16(CHALLENGE_STATUS).expect("480 is a valid status code"),
        [(header::WWW_AUTHENTICATE, "Integrity")],
        Json(serde_json::json!({ "challenge": challenge })),
    )
        .into_response();
    Decision::Respond(response)
}

fn upgrade_response(state: &GatewayState, platform: Platform, accept_language: &str) -> Response {
    let message = state.messages.for_request(platform, accept_language);
    let body = serde_json::json!({
        "status": StatusCode::UPGRADE_REQUIRED.as_u16(),
        "error": { "type": 0, "message": message }
    });
    (StatusCode::UPGRADE_REQUIRED, Json(body)).into_response()
}

async fn verify_android(
    state: &GatewayState,
    mut record: AttestationRecord,
    token: &str,
    server_nonce: &str,
) -> Decision {
    let udid = record.udid.clone();

    let token_bytes = match URL_SAFE.decode(token) {
        Ok(bytes) => bytes,
        Err(_) => {
            return respond(ApiError::forbidden(
                "Could not decode challenge response from base64 URL encoding",
            ))
        }
    };
    let integrity_token = String::from_utf8_lossy(&token_bytes).into_owned();

    let outcome = match state
        .google
        .decode(&state.android_policy.production_package, &integrity_token)
        .await
    {
        Err(e) => {
            tracing::error!(error = %e, udid, "Play Integrity decode failed");
            record.google_response = Some(e.to_string());
            record.platform_success = false;
            record.muzz_error = Some("Google threw an error".into());
            AndroidOutcome::Failure
        }
        Ok(payload) => {
            record.google_response = serde_json::to_string(&payload).ok();

            let verdict = evaluate(&payload, server_nonce, &state.android_policy);
            record.platform_success = verdict.platform_success;
            record.nonce_success = verdict.nonce_success;
            if !verdict.diagnostics.is_empty() {
                record.muzz_error = Some(verdict.diagnostics.join("\n"));
            }
            verdict.outcome
        }
    };

    if let Err(e) = state.store.update(&mut record).await {
        tracing::error!(error = %e, udid, "update android verdict");
    }

    match outcome {
        AndroidOutcome::Success => Decision::Forward,
        // Captcha challenge is the planned follow-up; let it through.
        AndroidOutcome::Unevaluated => Decision::Forward,
        AndroidOutcome::Failure => respond(ApiError::forbidden("Integrity check failed")),
    }
}

async fn verify_ios(
    state: &GatewayState,
    mut record: AttestationRecord,
    token: &str,
    encoded_key_id: &str,
    encoded_assertion: &str,
    server_nonce: &str,
) -> Decision {
    let udid = record.udid.clone();

    if encoded_assertion.is_empty() {
        return respond(ApiError::forbidden("Empty x-assertation header"));
    }
    if encoded_key_id.is_empty() {
        return respond(ApiError::forbidden("Empty x-keyid header"));
    }

    let result = verify_ios_round(
        state,
        &mut record,
        token,
        encoded_key_id,
        encoded_assertion,
        server_nonce,
    );
    if let Err(ref e) = result {
        record.muzz_error = Some(e.to_string());
    }

    if let Err(e) = state.store.update(&mut record).await {
        tracing::error!(error = %e, udid, "update ios verdict");
    }

    match result {
        Ok(()) => {
            tracing::info!(udid, counter = record.counter, "device integrity verified");
            Decision::Forward
        }
        Err(e) => {
            tracing::warn!(udid, error = %e, "ios integrity check failed");
            respond(ApiError::forbidden("Integrity check failed"))
        }
    }
}

/// iOS round 2: bind the device key on first contact via the attestation,
/// then check the request-bound assertion against it.
fn verify_ios_round(
    state: &GatewayState,
    record: &mut AttestationRecord,
    token: &str,
    encoded_key_id: &str,
    encoded_assertion: &str,
    server_nonce: &str,
) -> Result<(), IntegrityError> {
    let public_key = match record.public_key.as_deref() {
        Some(stored) if !stored.is_empty() => STANDARD.decode(stored).map_err(|e| {
            IntegrityError::Malformed(format!("stored public key is not base64: {e}"))
        })?,
        _ => {
            let attested =
                state
                    .apple
                    .verify(token, record.challenge.as_bytes(), encoded_key_id)?;
            record.public_key = Some(STANDARD.encode(&attested.public_key));
            record.counter = attested.counter;
            record.key_id = Some(encoded_key_id.to_string());
            record.platform_success = true;
            record.nonce_success = true;
            attested.public_key
        }
    };

    let new_counter = verify_assertion(
        encoded_assertion,
        encoded_key_id,
        &public_key,
        record.counter,
        server_nonce.as_bytes(),
    )?;
    record.counter = new_counter;
    record.platform_success = true;
    record.nonce_success = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_up_is_protected() {
        let uri: Uri = "/v2.5/auth/sign-up".parse().unwrap();
        assert!(is_protected_route(&uri, b""));
    }

    #[test]
    fn login_is_protected_only_for_phone_numbers() {
        let uri: Uri = "/v2.5/auth/login".parse().unwrap();
        assert!(is_protected_route(&uri, b"phoneNumber=%2B447700900123"));
        assert!(is_protected_route(&uri, b"foo=1&phoneNumber=123"));
        assert!(!is_protected_route(&uri, b"password=x"));
        assert!(!is_protected_route(&uri, b""));
    }

    #[test]
    fn other_routes_are_untouched() {
        let uri: Uri = "/v2.5/profile".parse().unwrap();
        assert!(!is_protected_route(&uri, b"phoneNumber=123"));

        let uri: Uri = "/v2.5/auth/sign-up/extra".parse().unwrap();
        assert!(!is_protected_route(&uri, b""));
    }
}
