//! HMAC-SHA256 credential signing and the memory-hard secret digest.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString, SecretVec};
use sha2::Sha256;

use crate::credential::Credential;
use crate::error::{signing_error, Error};

type HmacSha256 = Hmac<Sha256>;

/// Context string mixed into the master secret to obtain the signing key.
const SIGNING_KEY_CONTEXT: &[u8] = b"attendance-credential-signing-key/v1";

/// Process-wide key used to sign and verify credentials.
pub struct SigningKey {
    key: SecretVec<u8>,
}

impl SigningKey {
    /// Derives the signing key from the configured master secret.
    pub fn derive(master_secret: &SecretString) -> Result<Self, Error> {
        if master_secret.expose_secret().is_empty() {
            return Err(signing_error("Master secret must not be empty"));
        }

        let mut mac = HmacSha256::new_from_slice(master_secret.expose_secret().as_bytes())
            .map_err(|_| signing_error("Invalid master secret"))?;
        mac.update(SIGNING_KEY_CONTEXT);

        Ok(Self {
            key: SecretVec::new(mac.finalize().into_bytes().to_vec()),
        })
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(self.key.expose_secret())
            .map_err(|_| signing_error("Invalid signing key"))
    }

    /// Hex encoded signature over every field except `signature` itself.
    pub fn sign(&self, credential: &Credential) -> Result<String, Error> {
        let mut mac = self.mac()?;
        mac.update(&credential.signing_payload());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of the credential's signature.
    pub fn verify(&self, credential: &Credential) -> Result<bool, Error> {
        let Ok(expected) = hex::decode(&credential.signature) else {
            return Ok(false);
        };

        let mut mac = self.mac()?;
        mac.update(&credential.signing_payload());
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

fn digest_input(secret: &str, subject_id: &str, issued_at: i64) -> String {
    format!("{secret}:{subject_id}:{issued_at}")
}

/// Argon2 digest binding a subject secret to one issuance.
pub fn secret_digest(secret: &SecretString, subject_id: &str, issued_at: i64) -> String {
    password_auth::generate_hash(digest_input(
        secret.expose_secret(),
        subject_id,
        issued_at,
    ))
}

/// True when `digest` was produced from this exact secret, subject and timestamp.
pub fn verify_secret_digest(
    digest: &str,
    secret: &SecretString,
    subject_id: &str,
    issued_at: i64,
) -> bool {
    password_auth::verify_password(
        digest_input(secret.expose_secret(), subject_id, issued_at),
        digest,
    )
    .is_ok()
}
