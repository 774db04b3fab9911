//! Topic canonicalization and device ID validation
//!
//! Topic strings come from operator-edited configuration; brokers treat
//! `a//b` and `a/b/` as distinct filters, so everything is normalized once
//! at load time and never re-derived ad hoc.

use thiserror::Error;

pub fn canonicalize_topic(topic: &str) -> String {
    if topic.is_empty() {
        return "/".to_string();
    }

    let mut result = if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("/{topic}")
    };

    // Collapse consecutive slashes
    while result.contains("//") {
        result = result.replace("//", "/");
    }

    // Strip trailing slash (except for root "/")
    if result.len() > 1 && result.ends_with('/') {
        result.pop();
    }

    result
}

pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    if device_id.is_empty() {
        return Err(ValidationError::EmptyDeviceId);
    }

    for ch in device_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(ValidationError::InvalidDeviceIdChar(ch));
        }
    }

    Ok(())
}

/// Build the last-will topic for a given status topic
///
/// The will message lands on a sibling of the status topic so downstream
/// consumers can watch one subtree for both orderly and unexpected exits.
pub fn will_topic(status_topic: &str) -> String {
    canonicalize_topic(&format!("{status_topic}/will"))
}

/// Validation errors for operator-supplied identifiers
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Device ID cannot be empty")]
    EmptyDeviceId,
    #[error("Device ID contains invalid character: '{0}'")]
    InvalidDeviceIdChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn canonicalize_topic_is_idempotent(topic in ".*") {
            let first = canonicalize_topic(&topic);
            let second = canonicalize_topic(&first);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn canonicalize_topic_starts_with_slash(topic in ".*") {
            let result = canonicalize_topic(&topic);
            prop_assert!(result.starts_with('/'));
            prop_assert!(!result.starts_with("//"));
        }

        #[test]
        fn canonicalize_topic_no_consecutive_slashes(topic in ".*") {
            let result = canonicalize_topic(&topic);
            prop_assert!(!result.contains("//"));
        }
    }

    #[test]
    fn test_canonicalize_examples() {
        assert_eq!(canonicalize_topic("devices/ota/status"), "/devices/ota/status");
        assert_eq!(
            canonicalize_topic("//devices//ota/status/"),
            "/devices/ota/status"
        );
        assert_eq!(canonicalize_topic(""), "/");
        assert_eq!(canonicalize_topic("///"), "/");
        assert_eq!(canonicalize_topic("/status/"), "/status");
    }

    #[test]
    fn test_will_topic() {
        assert_eq!(will_topic("/devices/d1/status"), "/devices/d1/status/will");
        assert_eq!(will_topic("devices/d1/status/"), "/devices/d1/status/will");
    }

    #[test]
    fn test_device_id_validation() {
        assert!(validate_device_id("device-1").is_ok());
        assert!(validate_device_id("psoc6.mqtt_client").is_ok());
        assert_eq!(validate_device_id(""), Err(ValidationError::EmptyDeviceId));
        assert_eq!(
            validate_device_id("device 1"),
            Err(ValidationError::InvalidDeviceIdChar(' '))
        );
        assert!(validate_device_id("device/1").is_err());
    }
}
