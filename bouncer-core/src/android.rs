//! Play Integrity verdict evaluation.
//!
//! The gateway asks Google to decode the opaque integrity token; this module
//! owns the pure policy half: given the decoded payload and the
//! server-derived nonce, decide success / unevaluated / failure. Keeping it
//! free of I/O lets every branch be table-tested.

use serde::{Deserialize, Serialize};

pub const APP_VERDICT_PLAY_RECOGNIZED: &str = "PLAY_RECOGNIZED";
pub const APP_VERDICT_UNEVALUATED: &str = "UNEVALUATED";
pub const DEVICE_VERDICT_MEETS_INTEGRITY: &str = "MEETS_DEVICE_INTEGRITY";

/// Decoded integrity token payload, as returned by Google's
/// `decodeIntegrityToken` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    #[serde(default)]
    pub app_integrity: AppIntegrity,
    #[serde(default)]
    pub device_integrity: DeviceIntegrity,
    #[serde(default)]
    pub request_details: RequestDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIntegrity {
    #[serde(default)]
    pub app_recognition_verdict: String,
    #[serde(default)]
    pub certificate_sha256_digest: Vec<String>,
    #[serde(default)]
    pub package_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIntegrity {
    #[serde(default)]
    pub device_recognition_verdict: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    #[serde(default)]
    pub request_package_name: String,
    #[serde(default)]
    pub nonce: String,
}

/// Pinned signing-certificate digests and package names the payload is
/// checked against.
#[derive(Debug, Clone)]
pub struct AndroidPolicy {
    pub production_package: String,
    pub debug_package: String,
    pub production_cert_digest: String,
    pub debug_cert_digest: String,
}

impl Default for AndroidPolicy {
    fn default() -> Self {
        Self {
            production_package: "com.muzmatch.muzmatchapp".into(),
            debug_package: "com.muzmatch.muzmatchapp.debug".into(),
            production_cert_digest: "Wp1Jx7kzDQ1tJtFzBAmCFkAGGPTvSbXTvRzAUMU9i5g".into(),
            debug_cert_digest: "GJxL0YRjFmlJZrX6kRqAYOZzD0Y2pW-ckcDTZ1vuIsE".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndroidOutcome {
    Success,
    Unevaluated,
    Failure,
}

/// Projection of the checks onto the session record: which halves
/// succeeded, plus the diagnostics that explain any failure.
#[derive(Debug, Clone)]
pub struct AndroidVerdict {
    pub outcome: AndroidOutcome,
    pub platform_success: bool,
    pub nonce_success: bool,
    pub diagnostics: Vec<String>,
}

/// Apply the verdict checks to a decoded payload.
pub fn evaluate(payload: &TokenPayload, server_nonce: &str, policy: &AndroidPolicy) -> AndroidVerdict {
    let app_verdict = payload.app_integrity.app_recognition_verdict.as_str();
    if app_verdict == APP_VERDICT_UNEVALUATED {
        return AndroidVerdict {
            outcome: AndroidOutcome::Unevaluated,
            platform_success: false,
            nonce_success: false,
            diagnostics: vec!["Google app verdict is UNEVALUATED".into()],
        };
    }

    let mut diagnostics = Vec::new();

    let cert_digest = payload
        .app_integrity
        .certificate_sha256_digest
        .first()
        .map(String::as_str)
        .unwrap_or_default();
    if cert_digest != policy.production_cert_digest && cert_digest != policy.debug_cert_digest {
        diagnostics.push(format!("Invalid Android CertificateSha256Digest: {cert_digest}"));
    }

    let request_package = payload.request_details.request_package_name.as_str();
    if request_package != policy.production_package && request_package != policy.debug_package {
        diagnostics.push(format!("Invalid Android RequestPackageName: {request_package}"));
    }

    let mut platform_success = true;

    // Debug builds are not distributed through the Play Store, so the
    // recognition requirement only applies off the production package.
    if request_package != policy.production_package && app_verdict != APP_VERDICT_PLAY_RECOGNIZED {
        platform_success = false;
        diagnostics.push(format!("Invalid AppRecognitionVerdict: {app_verdict}"));
    }

    let device_verdict = payload
        .device_integrity
        .device_recognition_verdict
        .first()
        .map(String::as_str)
        .unwrap_or_default();
    if device_verdict != DEVICE_VERDICT_MEETS_INTEGRITY {
        platform_success = false;
        diagnostics.push(format!("Invalid DeviceRecognitionVerdict: {device_verdict}"));
    }

    let nonce_success = payload.request_details.nonce == server_nonce;
    if !nonce_success {
        diagnostics.push(format!(
            "Nonce mismatch: server {:?} app {:?}",
            server_nonce, payload.request_details.nonce
        ));
    }

    let outcome = if diagnostics.is_empty() {
        AndroidOutcome::Success
    } else {
        AndroidOutcome::Failure
    };

    AndroidVerdict {
        outcome,
        platform_success,
        nonce_success,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: &str = "c2VydmVyLW5vbmNl";

    fn policy() -> AndroidPolicy {
        AndroidPolicy::default()
    }

    fn good_payload(policy: &AndroidPolicy) -> TokenPayload {
        TokenPayload {
            app_integrity: AppIntegrity {
                app_recognition_verdict: APP_VERDICT_PLAY_RECOGNIZED.into(),
                certificate_sha256_digest: vec![policy.production_cert_digest.clone()],
                package_name: policy.production_package.clone(),
            },
            device_integrity: DeviceIntegrity {
                device_recognition_verdict: vec![DEVICE_VERDICT_MEETS_INTEGRITY.into()],
            },
            request_details: RequestDetails {
                request_package_name: policy.production_package.clone(),
                nonce: NONCE.into(),
            },
        }
    }

    #[test]
    fn clean_payload_succeeds() {
        let policy = policy();
        let verdict = evaluate(&good_payload(&policy), NONCE, &policy);
        assert_eq!(verdict.outcome, AndroidOutcome::Success);
        assert!(verdict.platform_success);
        assert!(verdict.nonce_success);
        assert!(verdict.diagnostics.is_empty());
    }

    #[test]
    fn unevaluated_short_circuits() {
        let policy = policy();
        let mut payload = good_payload(&policy);
        payload.app_integrity.app_recognition_verdict = APP_VERDICT_UNEVALUATED.into();

        let verdict = evaluate(&payload, NONCE, &policy);
        assert_eq!(verdict.outcome, AndroidOutcome::Unevaluated);
        assert!(!verdict.platform_success);
        assert_eq!(verdict.diagnostics, vec!["Google app verdict is UNEVALUATED"]);
    }

    #[test]
    fn unknown_cert_digest_fails() {
        let policy = policy();
        let mut payload = good_payload(&policy);
        payload.app_integrity.certificate_sha256_digest = vec!["bogus".into()];

        let verdict = evaluate(&payload, NONCE, &policy);
        assert_eq!(verdict.outcome, AndroidOutcome::Failure);
        assert!(verdict.diagnostics[0].contains("CertificateSha256Digest"));
    }

    #[test]
    fn empty_cert_digest_list_fails_rather_than_panics() {
        let policy = policy();
        let mut payload = good_payload(&policy);
        payload.app_integrity.certificate_sha256_digest.clear();

        let verdict = evaluate(&payload, NONCE, &policy);
        assert_eq!(verdict.outcome, AndroidOutcome::Failure);
    }

    #[test]
    fn debug_package_requires_play_recognition() {
        let policy = policy();
        let mut payload = good_payload(&policy);
        payload.request_details.request_package_name = policy.debug_package.clone();
        payload.app_integrity.app_recognition_verdict = "UNRECOGNIZED_VERSION".into();
        payload.app_integrity.certificate_sha256_digest = vec![policy.debug_cert_digest.clone()];

        let verdict = evaluate(&payload, NONCE, &policy);
        assert_eq!(verdict.outcome, AndroidOutcome::Failure);
        assert!(!verdict.platform_success);
    }

    #[test]
    fn debug_package_with_play_recognition_succeeds() {
        let policy = policy();
        let mut payload = good_payload(&policy);
        payload.request_details.request_package_name = policy.debug_package.clone();
        payload.app_integrity.certificate_sha256_digest = vec![policy.debug_cert_digest.clone()];

        let verdict = evaluate(&payload, NONCE, &policy);
        assert_eq!(verdict.outcome, AndroidOutcome::Success);
    }

    #[test]
    fn failed_device_verdict_fails() {
        let policy = policy();
        let mut payload = good_payload(&policy);
        payload.device_integrity.device_recognition_verdict =
            vec!["MEETS_BASIC_INTEGRITY".into()];

        let verdict = evaluate(&payload, NONCE, &policy);
        assert_eq!(verdict.outcome, AndroidOutcome::Failure);
        assert!(!verdict.platform_success);
        assert!(verdict.nonce_success);
    }

    #[test]
    fn nonce_mismatch_fails() {
        let policy = policy();
        let verdict = evaluate(&good_payload(&policy), "another-nonce", &policy);
        assert_eq!(verdict.outcome, AndroidOutcome::Failure);
        assert!(verdict.platform_success);
        assert!(!verdict.nonce_success);
        assert!(verdict.diagnostics[0].contains("Nonce mismatch"));
    }

    #[test]
    fn payload_round_trips_through_json() {
        let policy = policy();
        let payload = good_payload(&policy);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("appRecognitionVerdict"));
        let back: TokenPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request_details.nonce, NONCE);
    }
}
