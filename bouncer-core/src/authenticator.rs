//! Binary codec for the WebAuthn-style authenticator data blob.
//!
//! Both App Attest attestations and assertions embed the same fixed-prefix
//! layout:
//!
//! ```text
//! rpIdHash[32] || flags[1] || counter[4 BE] || attestedCredentialData?
//! attestedCredentialData = aaguid[16] || credLen[2 BE]
//!                       || credentialId[credLen] || credentialPublicKey[..]
//! ```
//!
//! Assertions carry only the 37-byte prefix; attestations append the
//! attested-credential record. Bytes beyond the credential public key are
//! extension data and are tolerated.

use crate::error::{IntegrityError, Result};

/// Length of the fixed prefix (rpIdHash + flags + counter).
pub const MIN_AUTH_DATA_LEN: usize = 37;

const AAGUID_LEN: usize = 16;
const CRED_LEN_FIELD: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    /// Raw credential public key bytes; everything after the credential id.
    pub credential_public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub counter: u32,
    /// Present only when the buffer extends past the 37-byte prefix.
    pub attested_credential: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_AUTH_DATA_LEN {
            return Err(IntegrityError::Malformed(format!(
                "authenticator data too short: {} bytes, need at least {}",
                data.len(),
                MIN_AUTH_DATA_LEN
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&data[..32]);

        let flags = data[32];
        let counter = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

        let attested_credential = if data.len() > MIN_AUTH_DATA_LEN {
            Some(Self::parse_attested_credential(&data[MIN_AUTH_DATA_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            counter,
            attested_credential,
        })
    }

    fn parse_attested_credential(rest: &[u8]) -> Result<AttestedCredentialData> {
        if rest.len() < AAGUID_LEN + CRED_LEN_FIELD {
            return Err(IntegrityError::Malformed(format!(
                "attested credential data truncated: {} bytes after prefix",
                rest.len()
            )));
        }

        let mut aaguid = [0u8; AAGUID_LEN];
        aaguid.copy_from_slice(&rest[..AAGUID_LEN]);

        let cred_len = u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]) as usize;
        let cred_start = AAGUID_LEN + CRED_LEN_FIELD;

        if cred_start + cred_len > rest.len() {
            return Err(IntegrityError::Malformed(format!(
                "credential id length {} overruns buffer ({} bytes remain)",
                cred_len,
                rest.len() - cred_start
            )));
        }

        Ok(AttestedCredentialData {
            aaguid,
            credential_id: rest[cred_start..cred_start + cred_len].to_vec(),
            credential_public_key: rest[cred_start + cred_len..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(counter: u32) -> Vec<u8> {
        let mut data = vec![0xAB; 32];
        data.push(0x40);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    #[test]
    fn parses_exact_37_byte_assertion_form() {
        let parsed = AuthenticatorData::parse(&prefix(7)).unwrap();
        assert_eq!(parsed.rp_id_hash, [0xAB; 32]);
        assert_eq!(parsed.flags, 0x40);
        assert_eq!(parsed.counter, 7);
        assert!(parsed.attested_credential.is_none());
    }

    #[test]
    fn rejects_36_bytes() {
        let err = AuthenticatorData::parse(&[0u8; 36]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn parses_attested_credential_data() {
        let mut data = prefix(0);
        data.extend_from_slice(b"appattestdevelop"); // aaguid
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]); // credential id
        data.extend_from_slice(&[9, 9]); // credential public key

        let parsed = AuthenticatorData::parse(&data).unwrap();
        let att = parsed.attested_credential.unwrap();
        assert_eq!(&att.aaguid, b"appattestdevelop");
        assert_eq!(att.credential_id, vec![1, 2, 3, 4]);
        assert_eq!(att.credential_public_key, vec![9, 9]);
    }

    #[test]
    fn zero_length_credential_id_is_permitted() {
        let mut data = prefix(0);
        data.extend_from_slice(&[0u8; AAGUID_LEN]);
        data.extend_from_slice(&0u16.to_be_bytes());

        let parsed = AuthenticatorData::parse(&data).unwrap();
        let att = parsed.attested_credential.unwrap();
        assert!(att.credential_id.is_empty());
        assert!(att.credential_public_key.is_empty());
    }

    #[test]
    fn credential_length_overrunning_buffer_fails() {
        let mut data = prefix(0);
        data.extend_from_slice(&[0u8; AAGUID_LEN]);
        data.extend_from_slice(&64u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 8]); // only 8 of the promised 64 bytes

        let err = AuthenticatorData::parse(&data).unwrap_err();
        assert!(err.to_string().contains("overruns"));
    }

    #[test]
    fn truncated_attested_credential_fails() {
        let mut data = prefix(0);
        data.extend_from_slice(&[0u8; 10]); // shorter than aaguid + credLen

        assert!(AuthenticatorData::parse(&data).is_err());
    }
}
