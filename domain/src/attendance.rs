//! Attendance records and the seam to whatever persists them.
//!
//! Activities, registrations and their storage belong to the surrounding
//! CRUD layer. Scanning only needs to find a subject's record for an
//! activity, create one when the activity allows it, and mark it attended.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Registered,
    Attended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub subject_id: String,
    pub activity_id: String,
    pub status: AttendanceStatus,
    pub registered_at: DateTime<Utc>,
    pub attended_at: Option<DateTime<Utc>>,
    pub scanner_id: Option<String>,
    /// Created by a scan rather than by registering beforehand.
    pub registered_on_scan: bool,
}

impl AttendanceRecord {
    pub fn registered(subject_id: impl Into<String>, activity_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            activity_id: activity_id.into(),
            status: AttendanceStatus::Registered,
            registered_at: Utc::now(),
            attended_at: None,
            scanner_id: None,
            registered_on_scan: false,
        }
    }

    pub fn mark_attended(&mut self, scanner_id: &str, at: DateTime<Utc>) {
        self.status = AttendanceStatus::Attended;
        self.attended_at = Some(at);
        self.scanner_id = Some(scanner_id.to_string());
    }
}

/// Per-activity rules consulted when a scanned subject has no record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPolicy {
    pub allow_registration_on_scan: bool,
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    async fn find(
        &self,
        subject_id: &str,
        activity_id: &str,
    ) -> Result<Option<AttendanceRecord>, Error>;

    /// Insert a new record. If one already exists for the subject and
    /// activity, that record is returned unchanged instead.
    async fn create(&self, record: AttendanceRecord) -> Result<AttendanceRecord, Error>;

    async fn update(&self, record: AttendanceRecord) -> Result<AttendanceRecord, Error>;

    /// Activities without a stored policy forbid registration on scan.
    async fn policy(&self, activity_id: &str) -> Result<ActivityPolicy, Error>;
}

/// In-process repository for single-instance deployments and tests.
#[derive(Default)]
pub struct InMemoryAttendance {
    records: DashMap<(String, String), AttendanceRecord>,
    policies: DashMap<String, ActivityPolicy>,
}

impl InMemoryAttendance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_policy(&self, activity_id: impl Into<String>, policy: ActivityPolicy) {
        self.policies.insert(activity_id.into(), policy);
    }

    /// Pre-register a subject, as the registration flow would.
    pub fn register(&self, subject_id: &str, activity_id: &str) -> AttendanceRecord {
        let record = AttendanceRecord::registered(subject_id, activity_id);
        self.records
            .entry(key(subject_id, activity_id))
            .or_insert(record)
            .clone()
    }
}

fn key(subject_id: &str, activity_id: &str) -> (String, String) {
    (subject_id.to_string(), activity_id.to_string())
}

#[async_trait]
impl AttendanceRepository for InMemoryAttendance {
    async fn find(
        &self,
        subject_id: &str,
        activity_id: &str,
    ) -> Result<Option<AttendanceRecord>, Error> {
        Ok(self
            .records
            .get(&key(subject_id, activity_id))
            .map(|record| record.clone()))
    }

    async fn create(&self, record: AttendanceRecord) -> Result<AttendanceRecord, Error> {
        let key = key(&record.subject_id, &record.activity_id);
        Ok(self.records.entry(key).or_insert(record).clone())
    }

    async fn update(&self, record: AttendanceRecord) -> Result<AttendanceRecord, Error> {
        let key = key(&record.subject_id, &record.activity_id);
        self.records.insert(key, record.clone());
        Ok(record)
    }

    async fn policy(&self, activity_id: &str) -> Result<ActivityPolicy, Error> {
        Ok(self
            .policies
            .get(activity_id)
            .map(|policy| *policy)
            .unwrap_or_default())
    }
}
