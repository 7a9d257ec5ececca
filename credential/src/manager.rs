//! Issuance and validation of attendance credentials.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::*;
use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::credential::{Credential, CREDENTIAL_VERSION};
use crate::error::{store_error, Error, StoreErrorKind};
use crate::signing::{secret_digest, verify_secret_digest, SigningKey};
use crate::store::Store;

const SECRET_KEY_PREFIX: &str = "credential:secret";
const USED_KEY_PREFIX: &str = "credential:used";
const BLACKLIST_KEY_PREFIX: &str = "credential:blacklist";
const RATE_KEY_PREFIX: &str = "credential:rate";

/// Bytes of randomness in a subject secret.
const SUBJECT_SECRET_BYTES: usize = 32;
/// Bytes of randomness in a credential nonce.
const NONCE_BYTES: usize = 16;
/// Length of a rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Tunable policy for issuance and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// How long a credential is valid after issuance.
    pub ttl: Duration,
    /// How far in the future an `issued_at` may be before it is refused.
    pub clock_skew: Duration,
    /// Validation attempts allowed per subject per minute.
    pub rate_limit_per_minute: u64,
    /// Lifetime of a subject secret before it is regenerated.
    pub secret_ttl: Duration,
    /// Extra time a revoked signature stays blacklisted after expiry.
    pub blacklist_margin: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(15 * 60),
            clock_skew: Duration::from_secs(60),
            rate_limit_per_minute: 5,
            secret_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            blacklist_margin: Duration::from_secs(5 * 60),
        }
    }
}

/// Why a presented credential was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    ParseError,
    Blacklisted,
    VersionMismatch,
    Expired,
    FutureTimestamp,
    Replay,
    RateLimited,
    InvalidSignature,
    InvalidSecret,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::ParseError => "parse_error",
            Rejection::Blacklisted => "blacklisted",
            Rejection::VersionMismatch => "version_mismatch",
            Rejection::Expired => "expired",
            Rejection::FutureTimestamp => "future_timestamp",
            Rejection::Replay => "replay",
            Rejection::RateLimited => "rate_limited",
            Rejection::InvalidSignature => "invalid_signature",
            Rejection::InvalidSecret => "invalid_secret",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of validating a presented credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid {
        subject_id: String,
        signature: String,
    },
    /// `subject_id` is present whenever the credential could be parsed.
    Rejected {
        reason: Rejection,
        subject_id: Option<String>,
    },
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid { .. })
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Validation::Valid { .. } => None,
            Validation::Rejected { reason, .. } => Some(*reason),
        }
    }

    pub fn subject_id(&self) -> Option<&str> {
        match self {
            Validation::Valid { subject_id, .. } => Some(subject_id),
            Validation::Rejected { subject_id, .. } => subject_id.as_deref(),
        }
    }
}

/// Single-use marker written once a credential has been accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub subject_id: String,
    pub used_at: i64,
    pub scanner_id: String,
}

/// Counters for monitoring issuance and validation volume on this instance.
#[derive(Debug, Default)]
pub struct CredentialStats {
    issued: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl CredentialStats {
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Issues, validates and revokes attendance credentials.
///
/// All replay, blacklist and rate-limit state lives in the shared [`Store`],
/// so any number of instances can validate concurrently and a credential is
/// still accepted at most once overall.
pub struct CredentialManager {
    store: Arc<dyn Store>,
    signing_key: SigningKey,
    clock: Arc<dyn Clock>,
    settings: Settings,
    stats: CredentialStats,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn Store>,
        master_secret: &SecretString,
        settings: Settings,
    ) -> Result<Self, Error> {
        Self::with_clock(store, master_secret, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        master_secret: &SecretString,
        settings: Settings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        Ok(Self {
            store,
            signing_key: SigningKey::derive(master_secret)?,
            clock,
            settings,
            stats: CredentialStats::default(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> &CredentialStats {
        &self.stats
    }

    /// Issue a fresh credential for `subject_id`.
    ///
    /// Nothing is marked as used here; the credential becomes single-use only
    /// once a validation accepts it.
    pub async fn issue(&self, subject_id: &str) -> Result<Credential, Error> {
        let secret = self.subject_secret(subject_id).await?;
        let issued_at = self.clock.now().timestamp();

        let mut nonce = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut credential = Credential {
            subject_id: subject_id.to_string(),
            issued_at,
            nonce: hex::encode(nonce),
            version: CREDENTIAL_VERSION,
            secret_digest: secret_digest(&secret, subject_id, issued_at),
            signature: String::new(),
        };
        credential.signature = self.signing_key.sign(&credential)?;

        self.stats.issued.fetch_add(1, Ordering::Relaxed);
        info!(
            "Issued attendance credential for subject {} (issued_at={}, ttl={}s)",
            subject_id,
            issued_at,
            self.settings.ttl.as_secs()
        );

        Ok(credential)
    }

    /// Validate a raw, encoded credential presented by `scanner_id`.
    ///
    /// Checks short-circuit in a fixed order, cheapest first. Only store
    /// connectivity problems are returned as `Err`; every other failure is a
    /// [`Validation::Rejected`] carrying the precise reason.
    pub async fn validate(&self, raw: &str, scanner_id: &str) -> Result<Validation, Error> {
        let validation = self.run_checks(raw, scanner_id).await?;

        match &validation {
            Validation::Valid { subject_id, .. } => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Accepted credential for subject {} at scanner {}",
                    subject_id, scanner_id
                );
            }
            Validation::Rejected { reason, subject_id } => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Rejected credential for subject {} at scanner {}: {}",
                    subject_id.as_deref().unwrap_or("<unknown>"),
                    scanner_id,
                    reason
                );
            }
        }

        Ok(validation)
    }

    async fn run_checks(&self, raw: &str, scanner_id: &str) -> Result<Validation, Error> {
        let credential = match Credential::decode(raw) {
            Ok(credential) => credential,
            Err(e) => {
                debug!("Credential parse failure: {e}");
                return Ok(Validation::Rejected {
                    reason: Rejection::ParseError,
                    subject_id: None,
                });
            }
        };

        let reject = |reason: Rejection| -> Result<Validation, Error> {
            Ok(Validation::Rejected {
                reason,
                subject_id: Some(credential.subject_id.clone()),
            })
        };

        if self
            .store
            .exists(&key(BLACKLIST_KEY_PREFIX, &credential.signature))
            .await?
        {
            return reject(Rejection::Blacklisted);
        }

        if credential.version != CREDENTIAL_VERSION {
            return reject(Rejection::VersionMismatch);
        }

        let now = self.clock.now().timestamp();
        if now - credential.issued_at > secs(self.settings.ttl) {
            return reject(Rejection::Expired);
        }
        if credential.issued_at > now + secs(self.settings.clock_skew) {
            return reject(Rejection::FutureTimestamp);
        }

        let used_key = key(USED_KEY_PREFIX, &credential.signature);
        if self.store.exists(&used_key).await? {
            return reject(Rejection::Replay);
        }

        if self.over_rate_limit(&credential.subject_id).await? {
            return reject(Rejection::RateLimited);
        }

        if !self.signing_key.verify(&credential)? {
            return reject(Rejection::InvalidSignature);
        }

        let secret = self
            .store
            .get(&key(SECRET_KEY_PREFIX, &credential.subject_id))
            .await?;
        let digest_matches = secret
            .map(SecretString::new)
            .map(|secret| {
                verify_secret_digest(
                    &credential.secret_digest,
                    &secret,
                    &credential.subject_id,
                    credential.issued_at,
                )
            })
            .unwrap_or(false);
        if !digest_matches {
            return reject(Rejection::InvalidSecret);
        }

        let usage = serde_json::to_string(&UsageRecord {
            subject_id: credential.subject_id.clone(),
            used_at: now,
            scanner_id: scanner_id.to_string(),
        })?;
        // A concurrent validation on any instance may have won the race.
        if !self
            .store
            .set_if_absent(&used_key, &usage, self.settings.ttl * 2)
            .await?
        {
            return reject(Rejection::Replay);
        }

        Ok(Validation::Valid {
            subject_id: credential.subject_id,
            signature: credential.signature,
        })
    }

    /// The window opens at the subject's first attempt and closes a minute
    /// later, however the attempts line up with wall-clock minutes.
    async fn over_rate_limit(&self, subject_id: &str) -> Result<bool, Error> {
        let attempts = self
            .store
            .increment(&key(RATE_KEY_PREFIX, subject_id), RATE_WINDOW)
            .await?;
        Ok(attempts > self.settings.rate_limit_per_minute)
    }

    /// Blacklist a credential signature for the rest of any credential lifetime.
    pub async fn revoke(&self, signature: &str, reason: &str) -> Result<(), Error> {
        self.blacklist(signature, reason, self.settings.ttl + self.settings.blacklist_margin)
            .await
    }

    /// Blacklist an encoded credential, keeping the entry only as long as the
    /// credential could still be presented.
    pub async fn revoke_raw(&self, raw: &str, reason: &str) -> Result<(), Error> {
        let credential = Credential::decode(raw)?;
        let elapsed = (self.clock.now().timestamp() - credential.issued_at).max(0) as u64;
        let remaining = self
            .settings
            .ttl
            .saturating_sub(Duration::from_secs(elapsed));
        self.blacklist(
            &credential.signature,
            reason,
            remaining + self.settings.blacklist_margin,
        )
        .await
    }

    async fn blacklist(&self, signature: &str, reason: &str, ttl: Duration) -> Result<(), Error> {
        self.store
            .set(&key(BLACKLIST_KEY_PREFIX, signature), reason, ttl)
            .await?;
        info!(
            "Revoked credential signature {}… for {}s: {}",
            signature.get(..12).unwrap_or(signature),
            ttl.as_secs(),
            reason
        );
        Ok(())
    }

    /// Drop the subject's secret. Every credential issued under it will now
    /// fail its secret digest check; the next issuance creates a new secret.
    pub async fn rotate_secret(&self, subject_id: &str) -> Result<(), Error> {
        self.store
            .delete(&key(SECRET_KEY_PREFIX, subject_id))
            .await?;
        info!("Rotated credential secret for subject {}", subject_id);
        Ok(())
    }

    async fn subject_secret(&self, subject_id: &str) -> Result<SecretString, Error> {
        let secret_key = key(SECRET_KEY_PREFIX, subject_id);
        if let Some(existing) = self.store.get(&secret_key).await? {
            return Ok(SecretString::new(existing));
        }

        let mut bytes = [0u8; SUBJECT_SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let candidate = hex::encode(bytes);

        // Two instances may race to create the secret; whichever wrote first wins.
        if self
            .store
            .set_if_absent(&secret_key, &candidate, self.settings.secret_ttl)
            .await?
        {
            debug!("Generated new credential secret for subject {}", subject_id);
            return Ok(SecretString::new(candidate));
        }

        self.store
            .get(&secret_key)
            .await?
            .map(SecretString::new)
            .ok_or_else(|| {
                store_error(
                    StoreErrorKind::Corrupt,
                    "Subject secret vanished immediately after creation",
                )
            })
    }

    /// Seconds left before `credential` expires, for callers that render a
    /// countdown next to the code.
    pub fn expires_in(&self, credential: &Credential) -> i64 {
        (credential.issued_at + secs(self.settings.ttl) - self.clock.now().timestamp()).max(0)
    }
}

fn key(prefix: &str, id: &str) -> String {
    format!("{prefix}:{id}")
}

fn secs(duration: Duration) -> i64 {
    duration.as_secs() as i64
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("settings", &self.settings)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    struct Harness {
        manager: CredentialManager,
        clock: ManualClock,
        store: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let clock = ManualClock::default();
        let store = Arc::new(MemoryStore::new());
        let manager = CredentialManager::with_clock(
            store.clone(),
            &SecretString::new("test-master-secret".to_string()),
            Settings::default(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        Harness {
            manager,
            clock,
            store,
        }
    }

    fn encode(credential: &Credential) -> String {
        credential.encode().unwrap()
    }

    fn credential_signature(raw: &str) -> String {
        Credential::decode(raw).unwrap().signature
    }

    #[tokio::test]
    async fn test_validate_immediately_after_issue_is_valid() {
        let h = harness();
        let credential = h.manager.issue("S1").await.unwrap();

        let validation = h.manager.validate(&encode(&credential), "gate-1").await.unwrap();

        assert!(validation.is_valid());
        assert_eq!(validation.subject_id(), Some("S1"));
        assert_eq!(h.manager.stats().issued(), 1);
        assert_eq!(h.manager.stats().accepted(), 1);
    }

    #[tokio::test]
    async fn test_second_validation_is_replay() {
        let h = harness();
        let raw = encode(&h.manager.issue("S1").await.unwrap());

        assert!(h.manager.validate(&raw, "gate-1").await.unwrap().is_valid());
        let second = h.manager.validate(&raw, "gate-2").await.unwrap();

        assert_eq!(second.rejection(), Some(Rejection::Replay));
        assert_eq!(second.subject_id(), Some("S1"));
    }

    #[tokio::test]
    async fn test_usage_record_written_once_with_scanner() {
        let h = harness();
        let credential = h.manager.issue("S1").await.unwrap();
        let used_key = key(USED_KEY_PREFIX, &credential.signature);
        assert!(!h.store.exists(&used_key).await.unwrap());

        h.manager.validate(&encode(&credential), "gate-7").await.unwrap();

        let stored = h.store.get(&used_key).await.unwrap().unwrap();
        let usage: UsageRecord = serde_json::from_str(&stored).unwrap();
        assert_eq!(usage.subject_id, "S1");
        assert_eq!(usage.scanner_id, "gate-7");
    }

    #[tokio::test]
    async fn test_malformed_input_is_parse_error() {
        let h = harness();

        let garbage = h.manager.validate("%%%not-base64", "gate-1").await.unwrap();
        assert_eq!(garbage.rejection(), Some(Rejection::ParseError));
        assert_eq!(garbage.subject_id(), None);

        let wrong_shape = BASE64.encode(br#"{"hello":"world"}"#);
        let wrong_shape = h.manager.validate(&wrong_shape, "gate-1").await.unwrap();
        assert_eq!(wrong_shape.rejection(), Some(Rejection::ParseError));
    }

    #[tokio::test]
    async fn test_single_field_mutations_never_validate() {
        let h = harness();
        let credential = h.manager.issue("S1").await.unwrap();

        let mut nonce = credential.clone();
        nonce.nonce = format!("{}00", nonce.nonce);
        let mut timestamp = credential.clone();
        timestamp.issued_at -= 1;
        let mut subject = credential.clone();
        subject.subject_id = "S2".to_string();
        let mut signature = credential.clone();
        signature.signature.replace_range(0..2, "00");
        if signature.signature == credential.signature {
            signature.signature.replace_range(0..2, "ff");
        }

        for mutated in [nonce, timestamp, subject, signature] {
            let validation = h.manager.validate(&encode(&mutated), "gate-1").await.unwrap();
            let reason = validation.rejection();
            assert!(
                matches!(
                    reason,
                    Some(Rejection::InvalidSignature) | Some(Rejection::InvalidSecret)
                ),
                "mutation produced {reason:?}"
            );
        }

        // The untouched original is still usable afterwards.
        assert!(h
            .manager
            .validate(&encode(&credential), "gate-1")
            .await
            .unwrap()
            .is_valid());
    }

    #[tokio::test]
    async fn test_expired_after_ttl_even_if_unused() {
        let h = harness();
        let raw = encode(&h.manager.issue("S1").await.unwrap());

        h.clock.advance(ChronoDuration::minutes(16));

        let validation = h.manager.validate(&raw, "gate-1").await.unwrap();
        assert_eq!(validation.rejection(), Some(Rejection::Expired));
    }

    #[tokio::test]
    async fn test_exactly_at_ttl_is_still_valid() {
        let h = harness();
        let raw = encode(&h.manager.issue("S1").await.unwrap());

        h.clock.advance(ChronoDuration::minutes(15));

        assert!(h.manager.validate(&raw, "gate-1").await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_future_timestamp_beyond_skew_is_rejected() {
        let h = harness();
        h.clock.advance(ChronoDuration::minutes(5));
        let raw = encode(&h.manager.issue("S1").await.unwrap());

        h.clock.advance(ChronoDuration::minutes(-5));

        let validation = h.manager.validate(&raw, "gate-1").await.unwrap();
        assert_eq!(validation.rejection(), Some(Rejection::FutureTimestamp));
    }

    #[tokio::test]
    async fn test_timestamp_within_skew_is_accepted() {
        let h = harness();
        h.clock.advance(ChronoDuration::seconds(30));
        let raw = encode(&h.manager.issue("S1").await.unwrap());

        h.clock.advance(ChronoDuration::seconds(-30));

        assert!(h.manager.validate(&raw, "gate-1").await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_hard_failure() {
        let h = harness();
        let mut credential = h.manager.issue("S1").await.unwrap();
        credential.version = CREDENTIAL_VERSION + 1;
        // Re-sign so only the version differs from a genuine credential.
        credential.signature = h.manager.signing_key.sign(&credential).unwrap();

        let validation = h.manager.validate(&encode(&credential), "gate-1").await.unwrap();
        assert_eq!(validation.rejection(), Some(Rejection::VersionMismatch));
    }

    #[tokio::test]
    async fn test_rotate_secret_invalidates_earlier_credentials() {
        let h = harness();
        let before = encode(&h.manager.issue("S1").await.unwrap());

        h.manager.rotate_secret("S1").await.unwrap();
        let after = encode(&h.manager.issue("S1").await.unwrap());

        let stale = h.manager.validate(&before, "gate-1").await.unwrap();
        assert_eq!(stale.rejection(), Some(Rejection::InvalidSecret));
        assert!(h.manager.validate(&after, "gate-1").await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_rotate_without_reissue_fails_secret_check() {
        let h = harness();
        let raw = encode(&h.manager.issue("S1").await.unwrap());

        h.manager.rotate_secret("S1").await.unwrap();

        let validation = h.manager.validate(&raw, "gate-1").await.unwrap();
        assert_eq!(validation.rejection(), Some(Rejection::InvalidSecret));
    }

    #[tokio::test]
    async fn test_secret_is_reused_across_issuances() {
        let h = harness();
        let first = h.manager.issue("S1").await.unwrap();
        let second = h.manager.issue("S1").await.unwrap();

        assert_ne!(first.nonce, second.nonce);
        assert!(h.manager.validate(&encode(&first), "g").await.unwrap().is_valid());
        assert!(h.manager.validate(&encode(&second), "g").await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_revoked_signature_is_blacklisted() {
        let h = harness();
        let credential = h.manager.issue("S1").await.unwrap();

        h.manager
            .revoke(&credential.signature, "device reported stolen")
            .await
            .unwrap();

        let validation = h.manager.validate(&encode(&credential), "gate-1").await.unwrap();
        assert_eq!(validation.rejection(), Some(Rejection::Blacklisted));
    }

    #[tokio::test]
    async fn test_revoke_raw_blacklists_decoded_signature() {
        let h = harness();
        let raw = encode(&h.manager.issue("S1").await.unwrap());

        h.manager.revoke_raw(&raw, "manual").await.unwrap();

        let validation = h.manager.validate(&raw, "gate-1").await.unwrap();
        assert_eq!(validation.rejection(), Some(Rejection::Blacklisted));
    }

    #[tokio::test]
    async fn test_sixth_attempt_in_a_minute_is_rate_limited() {
        let h = harness();
        let mut raws = Vec::new();
        for _ in 0..6 {
            raws.push(encode(&h.manager.issue("S1").await.unwrap()));
        }

        for raw in &raws[..5] {
            assert!(h.manager.validate(raw, "gate-1").await.unwrap().is_valid());
        }
        let sixth = h.manager.validate(&raws[5], "gate-1").await.unwrap();
        assert_eq!(sixth.rejection(), Some(Rejection::RateLimited));
    }

    // The in-memory store expires counters on tokio time, so both clocks move together.
    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_per_subject_and_resets_after_a_minute() {
        let h = harness();
        for _ in 0..6 {
            let raw = encode(&h.manager.issue("S1").await.unwrap());
            h.manager.validate(&raw, "gate-1").await.unwrap();
        }

        let other = encode(&h.manager.issue("S2").await.unwrap());
        assert!(h.manager.validate(&other, "gate-1").await.unwrap().is_valid());

        h.clock.advance(ChronoDuration::seconds(61));
        tokio::time::advance(Duration::from_secs(61)).await;
        let later = encode(&h.manager.issue("S1").await.unwrap());
        assert!(h.manager.validate(&later, "gate-1").await.unwrap().is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_window_ignores_minute_boundaries() {
        let h = harness();
        h.clock.set(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 58).unwrap());

        let mut results = Vec::new();
        for attempt in 0..6 {
            if attempt == 3 {
                h.clock.advance(ChronoDuration::seconds(2));
                tokio::time::advance(Duration::from_secs(2)).await;
            }
            let raw = encode(&h.manager.issue("S1").await.unwrap());
            results.push(h.manager.validate(&raw, "gate-1").await.unwrap());
        }

        assert!(results[..5].iter().all(Validation::is_valid));
        assert_eq!(results[5].rejection(), Some(Rejection::RateLimited));
    }

    #[tokio::test]
    async fn test_concurrent_validation_accepts_exactly_once() {
        let h = harness();
        let raw = encode(&h.manager.issue("S1").await.unwrap());
        let manager = Arc::new(h.manager);

        let attempts: Vec<_> = (0..4)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let raw = raw.clone();
                tokio::spawn(async move { manager.validate(&raw, &format!("gate-{i}")).await })
            })
            .collect();

        let mut accepted = 0;
        for attempt in attempts {
            let validation = attempt.await.unwrap().unwrap();
            if validation.is_valid() {
                accepted += 1;
            } else {
                assert_eq!(validation.rejection(), Some(Rejection::Replay));
            }
        }
        assert_eq!(accepted, 1);
        assert!(h
            .store
            .exists(&key(USED_KEY_PREFIX, &credential_signature(&raw)))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expires_in_counts_down_with_clock() {
        let h = harness();
        let credential = h.manager.issue("S1").await.unwrap();
        assert_eq!(h.manager.expires_in(&credential), 900);

        h.clock.advance(ChronoDuration::minutes(10));
        assert_eq!(h.manager.expires_in(&credential), 300);

        h.clock.advance(ChronoDuration::minutes(10));
        assert_eq!(h.manager.expires_in(&credential), 0);
    }

    #[test]
    fn test_rejection_names_are_stable() {
        assert_eq!(Rejection::ParseError.as_str(), "parse_error");
        assert_eq!(Rejection::FutureTimestamp.to_string(), "future_timestamp");
        assert_eq!(
            serde_json::to_string(&Rejection::InvalidSecret).unwrap(),
            "\"invalid_secret\""
        );
    }
}
