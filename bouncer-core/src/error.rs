use thiserror::Error;

/// Broad classification of a verification failure.
///
/// The gateway never surfaces these to clients; it uses them to pick a
/// response code and records the diagnostic on the session record for
/// offline analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input that could not be decoded: base64, ZLIB, CBOR, ASN.1, or the
    /// authenticator-data binary layout.
    MalformedInput,
    /// Certificate-chain verification, signature verification, or a hash
    /// comparison failed.
    CryptoFailure,
    /// Everything decoded and verified, but a protocol policy was violated
    /// (wrong RP-ID, wrong AAGUID, counter not increasing, nonce mismatch).
    PolicyFailure,
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("policy failure: {0}")]
    Policy(String),
}

impl IntegrityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntegrityError::Malformed(_) => ErrorKind::MalformedInput,
            IntegrityError::Crypto(_) => ErrorKind::CryptoFailure,
            IntegrityError::Policy(_) => ErrorKind::PolicyFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, IntegrityError>;
