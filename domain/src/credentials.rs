use chrono::{DateTime, Utc};
use credential::{Credential, CredentialManager};
use log::*;
use serde::Serialize;

use crate::error::Error;
use crate::roles::{Capability, Role};

/// An issued credential ready to be rendered as a scannable code.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub subject_id: String,
    /// URL-safe encoding of the full credential.
    pub credential: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_in_secs: i64,
}

/// Issue a credential for the caller's own subject id.
pub async fn issue(manager: &CredentialManager, subject_id: &str) -> Result<IssuedCredential, Error> {
    let credential = manager.issue(subject_id).await?;
    Ok(IssuedCredential {
        subject_id: credential.subject_id.clone(),
        credential: credential.encode()?,
        issued_at: credential.issued_at_time(),
        expires_in_secs: manager.expires_in(&credential),
    })
}

/// What to revoke: a bare signature or a whole encoded credential.
#[derive(Debug, Clone)]
pub enum RevokeTarget {
    Signature(String),
    Credential(String),
}

pub async fn revoke(
    manager: &CredentialManager,
    role: Role,
    target: RevokeTarget,
    reason: &str,
) -> Result<(), Error> {
    role.require(Capability::Revoke)?;
    match target {
        RevokeTarget::Signature(signature) => manager.revoke(&signature, reason).await?,
        RevokeTarget::Credential(raw) => {
            // Reject undecodable input as a bad request rather than an internal error.
            Credential::decode(&raw).map_err(|e| {
                warn!("Refusing to revoke undecodable credential: {}", e);
                Error::invalid("credential could not be decoded")
            })?;
            manager.revoke_raw(&raw, reason).await?
        }
    }
    Ok(())
}

/// Subjects may rotate their own secret; rotating anyone else's needs
/// [`Capability::RotateSecret`].
pub async fn rotate_secret(
    manager: &CredentialManager,
    caller_id: &str,
    role: Role,
    subject_id: &str,
) -> Result<(), Error> {
    if caller_id != subject_id {
        role.require(Capability::RotateSecret)?;
    }
    Ok(manager.rotate_secret(subject_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainErrorKind, InternalErrorKind};
    use credential::store::MemoryStore;
    use credential::{Rejection, Settings};
    use secrecy::SecretString;
    use std::sync::Arc;

    fn manager() -> CredentialManager {
        CredentialManager::new(
            Arc::new(MemoryStore::new()),
            &SecretString::new("test-master-secret".to_string()),
            Settings::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_issued_credential_decodes_and_counts_down() {
        let manager = manager();
        let issued = issue(&manager, "S1").await.unwrap();

        let credential = Credential::decode(&issued.credential).unwrap();
        assert_eq!(credential.subject_id, "S1");
        assert!(issued.expires_in_secs > 0);
        assert!(issued.expires_in_secs <= 900);
    }

    #[tokio::test]
    async fn test_revoke_requires_capability() {
        let manager = manager();
        let issued = issue(&manager, "S1").await.unwrap();

        let err = revoke(
            &manager,
            Role::Organizer,
            RevokeTarget::Credential(issued.credential.clone()),
            "lost phone",
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Forbidden)
        );

        revoke(
            &manager,
            Role::FacultyAdmin,
            RevokeTarget::Credential(issued.credential.clone()),
            "lost phone",
        )
        .await
        .unwrap();
        let validation = manager.validate(&issued.credential, "gate-1").await.unwrap();
        assert_eq!(validation.rejection(), Some(Rejection::Blacklisted));
    }

    #[tokio::test]
    async fn test_revoking_garbage_is_invalid() {
        let err = revoke(
            &manager(),
            Role::SystemAdmin,
            RevokeTarget::Credential("%%%".to_string()),
            "test",
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Invalid)
        );
    }

    #[tokio::test]
    async fn test_subjects_rotate_only_their_own_secret() {
        let manager = manager();
        assert!(rotate_secret(&manager, "S1", Role::Student, "S1").await.is_ok());
        assert!(rotate_secret(&manager, "S1", Role::Student, "S2").await.is_err());
        assert!(rotate_secret(&manager, "admin", Role::FacultyAdmin, "S2")
            .await
            .is_ok());
    }
}
