//! Attendance scanning: validate a presented credential, record attendance
//! and announce the result.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use credential::{CredentialManager, Rejection, Validation};
use events::{Event, EventBus, EventKind};
use log::*;
use serde::Serialize;
use serde_json::{json, Value};
use service::logging::SCAN_AUDIT_TARGET;

use crate::attendance::{AttendanceRecord, AttendanceRepository};
use crate::error::Error;
use crate::roles::{Capability, Role};

/// Why a scan did not record attendance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanReason {
    ParseError,
    Blacklisted,
    VersionMismatch,
    Expired,
    FutureTimestamp,
    Replay,
    RateLimited,
    InvalidSignature,
    InvalidSecret,
    /// The subject has no record for the activity and the activity does not
    /// allow registering on scan.
    RegistrationRequired,
}

impl ScanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanReason::ParseError => "parse_error",
            ScanReason::Blacklisted => "blacklisted",
            ScanReason::VersionMismatch => "version_mismatch",
            ScanReason::Expired => "expired",
            ScanReason::FutureTimestamp => "future_timestamp",
            ScanReason::Replay => "replay",
            ScanReason::RateLimited => "rate_limited",
            ScanReason::InvalidSignature => "invalid_signature",
            ScanReason::InvalidSecret => "invalid_secret",
            ScanReason::RegistrationRequired => "registration_required",
        }
    }

    /// The reason shown to clients. Signature and secret mismatches are not
    /// told apart.
    pub fn public_reason(&self) -> &'static str {
        match self {
            ScanReason::InvalidSignature | ScanReason::InvalidSecret => "invalid_credential",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ScanReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Rejection> for ScanReason {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::ParseError => ScanReason::ParseError,
            Rejection::Blacklisted => ScanReason::Blacklisted,
            Rejection::VersionMismatch => ScanReason::VersionMismatch,
            Rejection::Expired => ScanReason::Expired,
            Rejection::FutureTimestamp => ScanReason::FutureTimestamp,
            Rejection::Replay => ScanReason::Replay,
            Rejection::RateLimited => ScanReason::RateLimited,
            Rejection::InvalidSignature => ScanReason::InvalidSignature,
            Rejection::InvalidSecret => ScanReason::InvalidSecret,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub raw_credential: String,
    pub activity_id: String,
    pub scanner_id: String,
    pub scanner_role: Role,
    /// Create the attendance record even if the activity forbids it.
    /// Requires [`Capability::ForceRegister`].
    pub force_register: bool,
    /// Opaque client details (device, app version), kept in the audit log.
    pub client_meta: Value,
}

/// The full, internal record of one scan attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub success: bool,
    /// On failure this is whatever the credential claimed, unverified.
    pub subject_id: Option<String>,
    pub reason: Option<ScanReason>,
    pub attendance_ref: Option<String>,
    pub activity_id: String,
    pub scanner_id: String,
    pub timestamp: DateTime<Utc>,
}

/// What the scanning client is told.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReceipt {
    pub success: bool,
    pub reason: Option<&'static str>,
    pub attendance_ref: Option<String>,
}

impl ScanOutcome {
    fn succeeded(request: &ScanRequest, subject_id: String, attendance_ref: String) -> Self {
        Self {
            success: true,
            subject_id: Some(subject_id),
            reason: None,
            attendance_ref: Some(attendance_ref),
            activity_id: request.activity_id.clone(),
            scanner_id: request.scanner_id.clone(),
            timestamp: Utc::now(),
        }
    }

    fn failed(request: &ScanRequest, subject_id: Option<String>, reason: ScanReason) -> Self {
        Self {
            success: false,
            subject_id,
            reason: Some(reason),
            attendance_ref: None,
            activity_id: request.activity_id.clone(),
            scanner_id: request.scanner_id.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn receipt(&self) -> ScanReceipt {
        ScanReceipt {
            success: self.success,
            reason: self.reason.map(|reason| reason.public_reason()),
            attendance_ref: self.attendance_ref.clone(),
        }
    }

    /// Payload of the `scan_result` event. Unverified subject ids are left out.
    fn event_payload(&self) -> Value {
        json!({
            "success": self.success,
            "subject_id": if self.success { self.subject_id.as_deref() } else { None },
            "reason": self.reason.map(|reason| reason.public_reason()),
            "attendance_ref": self.attendance_ref,
            "scanner_id": self.scanner_id,
            "timestamp": self.timestamp,
        })
    }
}

pub struct ScanCoordinator {
    credentials: Arc<CredentialManager>,
    attendance: Arc<dyn AttendanceRepository>,
    bus: Arc<EventBus>,
}

impl ScanCoordinator {
    pub fn new(
        credentials: Arc<CredentialManager>,
        attendance: Arc<dyn AttendanceRepository>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            credentials,
            attendance,
            bus,
        }
    }

    /// Validate the presented credential and, if it is accepted, mark the
    /// subject as attended. Every attempt is written to the audit log.
    ///
    /// Every rejection comes back as an unsuccessful outcome. `Err` means the
    /// scan could not be decided, e.g. the shared store is unreachable, or the
    /// scanner is not allowed to make the request.
    ///
    /// An accepted credential is used up before attendance is looked at. A
    /// `registration_required` outcome, or an attendance repository error,
    /// still consumes it: register the subject, then issue a new credential.
    /// A refused scanner consumes nothing.
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanOutcome, Error> {
        let result = match authorize(&request) {
            Ok(()) => self.decide(&request).await,
            Err(err) => Err(err),
        };
        let (outcome, record) = match result {
            Ok(decided) => decided,
            Err(err) => {
                audit_undecided(&request, &err);
                return Err(err);
            }
        };
        audit(&outcome, &request.client_meta);

        self.announce(&outcome, record.as_ref()).await;
        Ok(outcome)
    }

    async fn decide(
        &self,
        request: &ScanRequest,
    ) -> Result<(ScanOutcome, Option<AttendanceRecord>), Error> {
        let validation = self
            .credentials
            .validate(&request.raw_credential, &request.scanner_id)
            .await?;

        let subject_id = match validation {
            Validation::Valid { subject_id, .. } => subject_id,
            Validation::Rejected { reason, subject_id } => {
                return Ok((ScanOutcome::failed(request, subject_id, reason.into()), None));
            }
        };

        match self.mark_attended(&subject_id, request).await? {
            Some(record) => Ok((
                ScanOutcome::succeeded(request, subject_id, record.id.clone()),
                Some(record),
            )),
            None => Ok((
                ScanOutcome::failed(request, Some(subject_id), ScanReason::RegistrationRequired),
                None,
            )),
        }
    }

    /// `None` when the subject has no record and one may not be created.
    async fn mark_attended(
        &self,
        subject_id: &str,
        request: &ScanRequest,
    ) -> Result<Option<AttendanceRecord>, Error> {
        let activity_id = &request.activity_id;
        let mut record = match self.attendance.find(subject_id, activity_id).await? {
            Some(record) => record,
            None => {
                let policy = self.attendance.policy(activity_id).await?;
                if !policy.allow_registration_on_scan {
                    if !request.force_register {
                        return Ok(None);
                    }
                    info!(
                        "Force-registering subject {} for activity {} by scanner {}",
                        subject_id, activity_id, request.scanner_id
                    );
                }
                let mut record = AttendanceRecord::registered(subject_id, activity_id.as_str());
                record.registered_on_scan = true;
                self.attendance.create(record).await?
            }
        };

        record.mark_attended(&request.scanner_id, Utc::now());
        Ok(Some(self.attendance.update(record).await?))
    }

    async fn announce(&self, outcome: &ScanOutcome, record: Option<&AttendanceRecord>) {
        self.bus
            .publish(Event::new(
                EventKind::ScanResult,
                outcome.activity_id.as_str(),
                outcome.event_payload(),
            ))
            .await;

        let Some(record) = record else {
            return;
        };
        match serde_json::to_value(record) {
            Ok(payload) => {
                self.bus
                    .publish(
                        Event::new(
                            EventKind::ParticipationUpdated,
                            record.activity_id.as_str(),
                            payload,
                        )
                        .addressed_to(record.subject_id.as_str()),
                    )
                    .await
            }
            Err(e) => error!("Failed to serialize attendance record {}: {}", record.id, e),
        }
    }
}

fn authorize(request: &ScanRequest) -> Result<(), Error> {
    request.scanner_role.require(Capability::Scan)?;
    if request.force_register {
        request.scanner_role.require(Capability::ForceRegister)?;
    }
    Ok(())
}

fn audit(outcome: &ScanOutcome, client_meta: &Value) {
    let record = match serde_json::to_string(outcome) {
        Ok(json) => json,
        Err(e) => {
            error!(target: SCAN_AUDIT_TARGET, "Failed to serialize scan outcome: {}", e);
            return;
        }
    };
    if outcome.success {
        info!(target: SCAN_AUDIT_TARGET, "{} client_meta={}", record, client_meta);
    } else {
        warn!(target: SCAN_AUDIT_TARGET, "{} client_meta={}", record, client_meta);
    }
}

/// Audit reason for a scan that ended in `err`.
fn undecided_reason(err: &Error) -> &'static str {
    if err.is_forbidden() {
        "forbidden"
    } else if err.is_service_unavailable() {
        "service_unavailable"
    } else {
        "internal_error"
    }
}

fn audit_undecided(request: &ScanRequest, err: &Error) {
    let reason = undecided_reason(err);
    let level = if err.is_forbidden() {
        Level::Warn
    } else {
        Level::Error
    };
    log!(
        target: SCAN_AUDIT_TARGET,
        level,
        "{} client_meta={} error={}",
        json!({
            "success": false,
            "reason": reason,
            "activity_id": request.activity_id,
            "scanner_id": request.scanner_id,
            "scanner_role": request.scanner_role,
            "timestamp": Utc::now(),
        }),
        request.client_meta,
        err
    );
}
