//! Wire types exchanged over the control and status topics
//!
//! Inbound: firmware job notifications (JSON) and plain-text device
//! directives on the control topic. Outbound: status reports on the status
//! topic. The job document is deliberately small; richer descriptors stay
//! behind the coordinator's notification boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Plain-text directives understood by the liveness/peripheral task
pub const DEVICE_ON_MESSAGE: &str = "TURN ON";
pub const DEVICE_OFF_MESSAGE: &str = "TURN OFF";

/// MQTT delivery guarantee tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QosLevel {
    /// QoS 0 - at most once
    AtMostOnce,
    /// QoS 1 - at least once
    AtLeastOnce,
    /// QoS 2 - exactly once
    ExactlyOnce,
}

impl TryFrom<u8> for QosLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QosLevel::AtMostOnce),
            1 => Ok(QosLevel::AtLeastOnce),
            2 => Ok(QosLevel::ExactlyOnce),
            other => Err(format!("QoS level must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(value: QosLevel) -> Self {
        match value {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

/// Descriptor of the firmware image a job refers to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageDescriptor {
    /// Total image size in bytes
    pub size_bytes: u64,
    /// Opaque checksum/signature reference interpreted by the verifier
    pub checksum: String,
    /// Locator the chunk source resolves (URL or slot name)
    pub source: String,
}

/// One firmware update job as announced on the control topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobNotification {
    pub job_id: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub source: String,
}

impl JobNotification {
    /// Structural validation of an inbound job document
    pub fn validate(&self) -> Result<(), String> {
        if self.job_id.is_empty() {
            return Err("job_id must not be empty".to_string());
        }
        if self.size_bytes == 0 {
            return Err("size_bytes must be non-zero".to_string());
        }
        if self.source.is_empty() {
            return Err("source must not be empty".to_string());
        }
        Ok(())
    }

    pub fn descriptor(&self) -> ImageDescriptor {
        ImageDescriptor {
            size_bytes: self.size_bytes,
            checksum: self.checksum.clone(),
            source: self.source.clone(),
        }
    }
}

/// Lifecycle states of an update job, as reported on the status topic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    Downloading,
    Downloaded,
    Verifying,
    Staged,
    Failed,
    Rejected,
}

impl JobStatus {
    /// Terminal states release the single-active-job slot
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Staged | JobStatus::Failed | JobStatus::Rejected)
    }
}

/// Wire-level error classification in status reports
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Connection,
    Protocol,
    Timeout,
    Verification,
    Resource,
    Busy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetails {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outbound status report published on each coordinator transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

impl StatusReport {
    pub fn new(device_id: &str, job_id: Option<&str>, status: JobStatus) -> Self {
        Self {
            device_id: device_id.to_string(),
            job_id: job_id.map(|s| s.to_string()),
            status,
            offset: None,
            size_bytes: None,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn with_progress(mut self, offset: u64, size_bytes: u64) -> Self {
        self.offset = Some(offset);
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_error(mut self, error: ErrorDetails) -> Self {
        self.error = Some(error);
        self
    }
}

/// On/off directive for the liveness/peripheral task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirective {
    On,
    Off,
}

/// Everything that can arrive on the control topic
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Job(JobNotification),
    Directive(DeviceDirective),
    Unrecognized,
}

/// Classify an inbound control payload
///
/// Job documents are JSON; directives are the original plain-text commands.
/// Unrecognized payloads are reported to the caller rather than dropped here
/// so the transport layer can log them with topic context.
pub fn parse_control_payload(payload: &[u8]) -> ControlMessage {
    if let Ok(notification) = serde_json::from_slice::<JobNotification>(payload) {
        return ControlMessage::Job(notification);
    }

    match std::str::from_utf8(payload).map(str::trim) {
        Ok(DEVICE_ON_MESSAGE) => ControlMessage::Directive(DeviceDirective::On),
        Ok(DEVICE_OFF_MESSAGE) => ControlMessage::Directive(DeviceDirective::Off),
        _ => ControlMessage::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobNotification {
        JobNotification {
            job_id: id.to_string(),
            size_bytes: 4096,
            checksum: "a1b2c3".to_string(),
            source: "https://images.example.com/fw.bin".to_string(),
        }
    }

    #[test]
    fn test_qos_level_conversions() {
        assert_eq!(QosLevel::try_from(0), Ok(QosLevel::AtMostOnce));
        assert_eq!(QosLevel::try_from(1), Ok(QosLevel::AtLeastOnce));
        assert_eq!(QosLevel::try_from(2), Ok(QosLevel::ExactlyOnce));
        assert!(QosLevel::try_from(3).is_err());
        assert_eq!(u8::from(QosLevel::ExactlyOnce), 2);
    }

    #[test]
    fn test_job_notification_roundtrip() {
        let original = job("j1");
        let json = serde_json::to_vec(&original).unwrap();
        let parsed: JobNotification = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_job_validation() {
        assert!(job("j1").validate().is_ok());

        let mut bad = job("");
        assert!(bad.validate().is_err());

        bad = job("j1");
        bad.size_bytes = 0;
        assert!(bad.validate().is_err());

        bad = job("j1");
        bad.source = String::new();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_job_status_terminality() {
        assert!(JobStatus::Staged.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Rejected.is_terminal());
        assert!(!JobStatus::Received.is_terminal());
        assert!(!JobStatus::Downloading.is_terminal());
        assert!(!JobStatus::Verifying.is_terminal());
    }

    #[test]
    fn test_status_report_serialization_skips_empty_fields() {
        let report = StatusReport::new("device-1", None, JobStatus::Received);
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("job_id"));
        assert!(!json.contains("offset"));
        assert!(!json.contains("error"));

        let with_progress = StatusReport::new("device-1", Some("j1"), JobStatus::Downloading)
            .with_progress(2048, 4096);
        let json = serde_json::to_string(&with_progress).unwrap();
        assert!(json.contains("\"offset\":2048"));
        assert!(json.contains("\"size_bytes\":4096"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let report = StatusReport::new("device-1", Some("j1"), JobStatus::Downloading);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"downloading\""));
    }

    #[test]
    fn test_parse_control_payload_job() {
        let payload = serde_json::to_vec(&job("j1")).unwrap();
        assert_eq!(parse_control_payload(&payload), ControlMessage::Job(job("j1")));
    }

    #[test]
    fn test_parse_control_payload_directives() {
        assert_eq!(
            parse_control_payload(b"TURN ON"),
            ControlMessage::Directive(DeviceDirective::On)
        );
        assert_eq!(
            parse_control_payload(b"TURN OFF"),
            ControlMessage::Directive(DeviceDirective::Off)
        );
        // Trailing whitespace from hand-published messages is tolerated
        assert_eq!(
            parse_control_payload(b"TURN ON\n"),
            ControlMessage::Directive(DeviceDirective::On)
        );
    }

    #[test]
    fn test_parse_control_payload_unrecognized() {
        assert_eq!(parse_control_payload(b"reboot"), ControlMessage::Unrecognized);
        assert_eq!(
            parse_control_payload(b"{\"unrelated\":true}"),
            ControlMessage::Unrecognized
        );
        assert_eq!(parse_control_payload(&[0xff, 0xfe]), ControlMessage::Unrecognized);
    }
}
