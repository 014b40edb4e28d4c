//! Self-reported client SDK errors.
//!
//! When the device-side SDK cannot produce an attestation it reports why in
//! the `Authorization` header instead. These are recorded on the session
//! record and the request is allowed through; a captcha challenge is the
//! planned follow-up for this path.

use crate::platform::Platform;

/// iOS `DCError` codes, sent as `Authorization: Error <code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppleDeviceError {
    FeatureUnsupported,
    InvalidInput,
    InvalidKey,
    ServerUnavailable,
    UnknownSystemFailure,
}

impl AppleDeviceError {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "featureUnsupported" => Some(Self::FeatureUnsupported),
            "invalidInput" => Some(Self::InvalidInput),
            "invalidKey" => Some(Self::InvalidKey),
            "serverUnavailable" => Some(Self::ServerUnavailable),
            "unknownSystemFailure" => Some(Self::UnknownSystemFailure),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeatureUnsupported => "featureUnsupported",
            Self::InvalidInput => "invalidInput",
            Self::InvalidKey => "invalidKey",
            Self::ServerUnavailable => "serverUnavailable",
            Self::UnknownSystemFailure => "unknownSystemFailure",
        }
    }
}

/// Play Integrity client error codes, sent verbatim in `Authorization`.
///
/// `InvalidError` is the client's catch-all for an unrecognised Google SDK
/// error; `Error` covers non-Google failures that stopped authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoogleDeviceError {
    ApiNotAvailable,
    NetworkError,
    PlayStoreNotFound,
    PlayStoreVersionOutdated,
    PlayStoreAccountNotFound,
    CannotBindToService,
    PlayServicesNotFound,
    PlayServicesVersionOutdated,
    TooManyRequests,
    GoogleServerUnavailable,
    ClientTransientError,
    InternalError,
    AppNotInstalled,
    NonceTooShort,
    NonceTooLong,
    NonceIsNotBase64,
    CloudProjectNumberIsInvalid,
    AppUidMismatch,
    InvalidError,
    Error,
}

impl GoogleDeviceError {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "API_NOT_AVAILABLE" => Some(Self::ApiNotAvailable),
            "NETWORK_ERROR" => Some(Self::NetworkError),
            "PLAY_STORE_NOT_FOUND" => Some(Self::PlayStoreNotFound),
            "PLAY_STORE_VERSION_OUTDATED" => Some(Self::PlayStoreVersionOutdated),
            "PLAY_STORE_ACCOUNT_NOT_FOUND" => Some(Self::PlayStoreAccountNotFound),
            "CANNOT_BIND_TO_SERVICE" => Some(Self::CannotBindToService),
            "PLAY_SERVICES_NOT_FOUND" => Some(Self::PlayServicesNotFound),
            "PLAY_SERVICES_VERSION_OUTDATED" => Some(Self::PlayServicesVersionOutdated),
            "TOO_MANY_REQUESTS" => Some(Self::TooManyRequests),
            "GOOGLE_SERVER_UNAVAILABLE" => Some(Self::GoogleServerUnavailable),
            "CLIENT_TRANSIENT_ERROR" => Some(Self::ClientTransientError),
            "INTERNAL_ERROR" => Some(Self::InternalError),
            "APP_NOT_INSTALLED" => Some(Self::AppNotInstalled),
            "NONCE_TOO_SHORT" => Some(Self::NonceTooShort),
            "NONCE_TOO_LONG" => Some(Self::NonceTooLong),
            "NONCE_IS_NOT_BASE64" => Some(Self::NonceIsNotBase64),
            "CLOUD_PROJECT_NUMBER_IS_INVALID" => Some(Self::CloudProjectNumberIsInvalid),
            "APP_UID_MISMATCH" => Some(Self::AppUidMismatch),
            "INVALID_ERROR" => Some(Self::InvalidError),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiNotAvailable => "API_NOT_AVAILABLE",
            Self::NetworkError => "NETWORK_ERROR",
            Self::PlayStoreNotFound => "PLAY_STORE_NOT_FOUND",
            Self::PlayStoreVersionOutdated => "PLAY_STORE_VERSION_OUTDATED",
            Self::PlayStoreAccountNotFound => "PLAY_STORE_ACCOUNT_NOT_FOUND",
            Self::CannotBindToService => "CANNOT_BIND_TO_SERVICE",
            Self::PlayServicesNotFound => "PLAY_SERVICES_NOT_FOUND",
            Self::PlayServicesVersionOutdated => "PLAY_SERVICES_VERSION_OUTDATED",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::GoogleServerUnavailable => "GOOGLE_SERVER_UNAVAILABLE",
            Self::ClientTransientError => "CLIENT_TRANSIENT_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::AppNotInstalled => "APP_NOT_INSTALLED",
            Self::NonceTooShort => "NONCE_TOO_SHORT",
            Self::NonceTooLong => "NONCE_TOO_LONG",
            Self::NonceIsNotBase64 => "NONCE_IS_NOT_BASE64",
            Self::CloudProjectNumberIsInvalid => "CLOUD_PROJECT_NUMBER_IS_INVALID",
            Self::AppUidMismatch => "APP_UID_MISMATCH",
            Self::InvalidError => "INVALID_ERROR",
            Self::Error => "ERROR",
        }
    }
}

/// Interpret an `Authorization` header value as a self-reported SDK error
/// for the given platform. Returns the canonical code string to persist.
pub fn parse_self_reported(platform: Platform, authorization: &str) -> Option<&'static str> {
    match platform {
        Platform::Ios => {
            let code = authorization.strip_prefix("Error ").unwrap_or(authorization);
            AppleDeviceError::parse(code).map(|e| e.as_str())
        }
        Platform::Android => GoogleDeviceError::parse(authorization).map(|e| e.as_str()),
    }
}
