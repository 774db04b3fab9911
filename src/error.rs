//! Error types for the firmware update agent
//!
//! Maps internal errors to the wire-level error kinds carried in outbound
//! status reports, and sanitizes messages before they leave the device.

use crate::protocol::messages::{ErrorDetails, ErrorKind};
use thiserror::Error;

/// Main error type for update-agent operations
#[derive(Debug, Error)]
pub enum OtaError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] crate::config::ConfigError),

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Operation timed out: {message}")]
    Timeout { message: String },

    #[error("Verification failed: {message}")]
    Verification { message: String },

    #[error("Staging space exhausted: {requested} bytes requested, limit is {limit}")]
    Resource { requested: u64, limit: u64 },

    #[error("Update job {active} already in progress")]
    Busy { active: String },

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::mqtt::MqttError),
}

impl OtaError {
    /// Wire-level error kind carried in status reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            OtaError::Configuration(_) => ErrorKind::Configuration,
            OtaError::Connection { .. } => ErrorKind::Connection,
            OtaError::Protocol { .. } => ErrorKind::Protocol,
            OtaError::Timeout { .. } => ErrorKind::Timeout,
            OtaError::Verification { .. } => ErrorKind::Verification,
            OtaError::Resource { .. } => ErrorKind::Resource,
            OtaError::Busy { .. } => ErrorKind::Busy,
            OtaError::Transport(e) => match e {
                crate::transport::mqtt::MqttError::Timeout(_) => ErrorKind::Timeout,
                _ => ErrorKind::Connection,
            },
        }
    }

    /// Convert to the details block of an outbound status report
    pub fn to_details(&self) -> ErrorDetails {
        ErrorDetails {
            kind: self.kind(),
            message: sanitize_error_message(&self.to_string()),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a verification error
    pub fn verification<S: Into<String>>(message: S) -> Self {
        Self::Verification {
            message: message.into(),
        }
    }
}

/// Sanitize error messages before they are published off-device
///
/// Broker credentials and key paths can end up embedded in transport error
/// strings; status topics are often readable by more parties than the device
/// trusts with those values.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    // Redact common secret patterns
    sanitized = regex::Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+")
        .unwrap()
        .replace_all(&sanitized, "${1}=***")
        .to_string();

    // Redact file paths that might reveal credential locations
    sanitized =
        regex::Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|certs?|\.ssh|private)/[a-zA-Z0-9._/-]+")
            .unwrap()
            .replace_all(&sanitized, "/***REDACTED***/")
            .to_string();

    // Constrained status payloads; keep total length <= 500
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let max_content_len = 500 - truncate_suffix.len();
        sanitized = format!("{}{}", &sanitized[..max_content_len], truncate_suffix);
    }

    sanitized
}

/// Result type for update-agent operations
pub type OtaResult<T> = Result<T, OtaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            OtaError::connection("refused").kind(),
            ErrorKind::Connection
        );
        assert_eq!(OtaError::protocol("bad frame").kind(), ErrorKind::Protocol);
        assert_eq!(OtaError::timeout("no connack").kind(), ErrorKind::Timeout);
        assert_eq!(
            OtaError::verification("digest mismatch").kind(),
            ErrorKind::Verification
        );
        assert_eq!(
            OtaError::Resource {
                requested: 8192,
                limit: 4096
            }
            .kind(),
            ErrorKind::Resource
        );
        assert_eq!(
            OtaError::Busy {
                active: "j1".to_string()
            }
            .kind(),
            ErrorKind::Busy
        );
    }

    #[test]
    fn test_busy_display_names_active_job() {
        let err = OtaError::Busy {
            active: "job-17".to_string(),
        };
        assert!(err.to_string().contains("job-17"));
    }

    #[test]
    fn test_resource_details() {
        let err = OtaError::Resource {
            requested: 1_048_576,
            limit: 65_536,
        };
        let details = err.to_details();
        assert_eq!(details.kind, ErrorKind::Resource);
        assert!(details.message.contains("1048576"));
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        let sanitized =
            sanitize_error_message("broker rejected login: password=hunter2 token=abc456");
        assert!(!sanitized.contains("hunter2"));
        assert!(!sanitized.contains("abc456"));
        assert!(sanitized.contains("password=***"));
        assert!(sanitized.contains("token=***"));
    }

    #[test]
    fn test_sanitize_redacts_credential_paths() {
        let sanitized = sanitize_error_message("cannot read /etc/device/certs/client.key");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("client.key"));
    }

    #[test]
    fn test_sanitize_truncates_long_messages() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_leaves_short_messages_alone() {
        assert_eq!(sanitize_error_message("plain failure"), "plain failure");
        assert_eq!(sanitize_error_message(""), "");
    }
}
