//! Status publisher: coordinator transitions -> outbound status messages
//!
//! Publishing never gates update progress. A failed publish is logged,
//! buffered, and retried on the next transition; the update itself carries
//! on. The buffer is bounded so a long outage cannot grow it without limit.

use crate::protocol::messages::{QosLevel, StatusReport};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Oldest reports are dropped beyond this depth
const MAX_PENDING_REPORTS: usize = 32;

/// Publishes coordinator transitions on the status topic
///
/// ```
/// # use std::sync::Arc;
/// # use otagent::protocol::messages::{JobStatus, QosLevel, StatusReport};
/// # use otagent::status::StatusPublisher;
/// # use otagent::testing::mocks::MockTransport;
/// # tokio_test::block_on(async {
/// let transport = Arc::new(MockTransport::new());
/// let publisher = StatusPublisher::new(
///     "device-1".to_string(),
///     "/devices/device-1/status".to_string(),
///     QosLevel::AtLeastOnce,
///     transport.clone(),
/// );
///
/// publisher
///     .report(StatusReport::new("device-1", Some("j1"), JobStatus::Received))
///     .await;
/// assert_eq!(transport.published().await.len(), 1);
/// # });
/// ```
pub struct StatusPublisher<T: Transport + 'static> {
    device_id: String,
    topic: String,
    qos: QosLevel,
    transport: Arc<T>,
    pending: Mutex<VecDeque<StatusReport>>,
}

impl<T: Transport + 'static> StatusPublisher<T> {
    pub fn new(device_id: String, topic: String, qos: QosLevel, transport: Arc<T>) -> Self {
        Self {
            device_id,
            topic,
            qos,
            transport,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Queue a report and flush everything queued, oldest first
    pub async fn report(&self, report: StatusReport) {
        let mut pending = self.pending.lock().await;
        pending.push_back(report);

        while pending.len() > MAX_PENDING_REPORTS {
            let dropped = pending.pop_front();
            warn!(
                "Status buffer full, dropping oldest report: {:?}",
                dropped.map(|r| r.status)
            );
        }

        while let Some(front) = pending.front() {
            let payload = match serde_json::to_vec(front) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize status report: {}", e);
                    pending.pop_front();
                    continue;
                }
            };

            match self
                .transport
                .publish(&self.topic, payload, self.qos, false)
                .await
            {
                Ok(()) => {
                    debug!(
                        topic = %self.topic,
                        status = ?front.status,
                        "Published status report"
                    );
                    pending.pop_front();
                }
                Err(e) => {
                    // Not fatal to the update; retried on the next transition
                    warn!(
                        "Status publish failed ({} queued), will retry on next transition: {}",
                        pending.len(),
                        e
                    );
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::JobStatus;
    use crate::testing::mocks::MockTransport;

    fn publisher(transport: Arc<MockTransport>) -> StatusPublisher<MockTransport> {
        StatusPublisher::new(
            "device-1".to_string(),
            "/devices/device-1/status".to_string(),
            QosLevel::AtLeastOnce,
            transport,
        )
    }

    #[tokio::test]
    async fn test_report_publishes_on_configured_topic() {
        let transport = Arc::new(MockTransport::new());
        let publisher = publisher(transport.clone());

        publisher
            .report(StatusReport::new("device-1", Some("j1"), JobStatus::Received))
            .await;

        let published = transport.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "/devices/device-1/status");
        assert_eq!(published[0].qos, QosLevel::AtLeastOnce);
        let report: StatusReport = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(report.status, JobStatus::Received);
    }

    #[tokio::test]
    async fn test_failed_publish_retried_on_next_transition() {
        let transport = Arc::new(MockTransport::new());
        let publisher = publisher(transport.clone());

        transport.set_fail_publish(true);
        publisher
            .report(StatusReport::new("device-1", Some("j1"), JobStatus::Received))
            .await;
        assert!(transport.published().await.is_empty());
        assert_eq!(publisher.pending_len().await, 1);

        transport.set_fail_publish(false);
        publisher
            .report(StatusReport::new(
                "device-1",
                Some("j1"),
                JobStatus::Downloading,
            ))
            .await;

        // Both reports delivered, in original order
        let published = transport.published().await;
        assert_eq!(published.len(), 2);
        let first: StatusReport = serde_json::from_slice(&published[0].payload).unwrap();
        let second: StatusReport = serde_json::from_slice(&published[1].payload).unwrap();
        assert_eq!(first.status, JobStatus::Received);
        assert_eq!(second.status, JobStatus::Downloading);
        assert_eq!(publisher.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_buffer_is_bounded() {
        let transport = Arc::new(MockTransport::new());
        let publisher = publisher(transport.clone());

        transport.set_fail_publish(true);
        for _ in 0..(MAX_PENDING_REPORTS + 10) {
            publisher
                .report(StatusReport::new(
                    "device-1",
                    Some("j1"),
                    JobStatus::Downloading,
                ))
                .await;
        }

        assert_eq!(publisher.pending_len().await, MAX_PENDING_REPORTS);
    }
}
