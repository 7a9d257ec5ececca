//! The attendance credential and its compact wire encoding.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// Current credential format version. Anything else is rejected outright.
pub const CREDENTIAL_VERSION: u8 = 1;

/// A short-lived, signed proof of identity presented once at an attendance scan.
///
/// Immutable once issued. `signature` covers every other field, so altering
/// any of them invalidates the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub subject_id: String,
    /// Unix timestamp in seconds.
    pub issued_at: i64,
    /// Hex encoded random bytes, unique per credential.
    pub nonce: String,
    pub version: u8,
    /// Memory-hard digest binding the subject's secret to this issuance.
    pub secret_digest: String,
    /// Hex encoded HMAC-SHA256 over the fields above.
    pub signature: String,
}

impl Credential {
    pub fn issued_at_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.issued_at, 0)
    }

    /// Encodes the credential as URL-safe base64 JSON, suitable for a QR code.
    pub fn encode(&self) -> Result<String, Error> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }

    /// Decodes a credential produced by [`Credential::encode`].
    pub fn decode(raw: &str) -> Result<Self, Error> {
        let bytes = BASE64.decode(raw.trim()).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Encoding,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The byte sequence the signature is computed over. Each field is
    /// length-prefixed so no two distinct credentials share a payload.
    pub(crate) fn signing_payload(&self) -> Vec<u8> {
        let issued_at = self.issued_at.to_string();
        let version = self.version.to_string();
        let fields: [&[u8]; 5] = [
            self.subject_id.as_bytes(),
            issued_at.as_bytes(),
            self.nonce.as_bytes(),
            version.as_bytes(),
            self.secret_digest.as_bytes(),
        ];

        let mut payload = Vec::new();
        for field in fields {
            payload.extend_from_slice(&(field.len() as u32).to_be_bytes());
            payload.extend_from_slice(field);
        }
        payload
    }
}
