//! Update coordinator: drives download, verify and stage for one job
//!
//! The coordinator consumes job notifications from the control channel and
//! walks the active job through `Received -> Downloading -> Downloaded ->
//! Verifying -> Staged`. Transient transfer failures defer to the
//! reconnection controller through the link watch channel and resume at the
//! last acknowledged offset; nothing is ever re-downloaded or silently
//! restarted.

use crate::config::DeviceConfig;
use crate::coordinator::state::{Adoption, JobLedger, Phase, UpdateJob};
use crate::error::{OtaError, OtaResult};
use crate::image::{ChunkSource, ImageSink, ImageVerifier, SourceError};
use crate::protocol::messages::{ImageDescriptor, JobNotification, JobStatus, StatusReport};
use crate::status::StatusPublisher;
use crate::transport::mqtt::{LinkState, RetryPolicy};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// What became of an inbound job notification
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
    /// Job adopted; the caller should drive it to completion
    Adopted,
    /// Duplicate of the active or last-staged job; nothing to do
    Ignored,
    /// Another job holds the single active slot; rejection published
    Busy { active: String },
    /// Structurally invalid job document; rejection published
    RejectedInvalid,
    /// Image larger than the staging area; rejection published
    RejectedOversized,
}

/// Result of one download step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Chunk confirmed; offset advanced
    Advanced(u64),
    /// Transient failure; deferred to the link, same offset next step
    Deferred(u64),
    /// All bytes confirmed
    Complete,
}

pub struct UpdateCoordinator<T: Transport + 'static> {
    ledger: JobLedger,
    link: watch::Receiver<LinkState>,
    source: Arc<dyn ChunkSource>,
    verifier: Arc<dyn ImageVerifier>,
    sink: Box<dyn ImageSink>,
    status: Arc<StatusPublisher<T>>,
    retry: RetryPolicy,
    chunk_size: usize,
    progress_interval: u32,
    operation_timeout: Duration,
    transient_failures: u32,
    chunks_since_report: u32,
}

impl<T: Transport + 'static> UpdateCoordinator<T> {
    pub fn new(
        config: &DeviceConfig,
        link: watch::Receiver<LinkState>,
        source: Arc<dyn ChunkSource>,
        verifier: Arc<dyn ImageVerifier>,
        sink: Box<dyn ImageSink>,
        status: Arc<StatusPublisher<T>>,
    ) -> Self {
        Self {
            ledger: JobLedger::new(config.update.staging_limit_bytes),
            link,
            source,
            verifier,
            sink,
            status,
            retry: RetryPolicy::from_config(config),
            chunk_size: config.update.chunk_size,
            progress_interval: config.update.progress_interval_chunks.max(1),
            operation_timeout: config.timing.operation_timeout(),
            transient_failures: 0,
            chunks_since_report: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.ledger.phase()
    }

    /// Mark the coordinator as listening for notifications
    pub fn arm(&mut self) {
        self.ledger.arm();
    }

    pub fn active_job(&self) -> Option<&UpdateJob> {
        self.ledger.active()
    }

    /// Main loop: adopt notifications and drive each job to a terminal state
    pub async fn run(mut self, mut jobs: mpsc::Receiver<JobNotification>) {
        self.arm();
        info!("Update coordinator awaiting job notifications");

        while let Some(notification) = jobs.recv().await {
            if self.on_job_notification(notification).await == NotificationOutcome::Adopted {
                self.run_active_job(&mut jobs).await;
            }
        }
        info!("Control channel closed, update coordinator stopping");
    }

    /// Offer a job notification to the coordinator
    ///
    /// Never returns an error: every failure mode is job-level, concluded
    /// with a published status so the outcome is observable downstream.
    pub async fn on_job_notification(
        &mut self,
        notification: JobNotification,
    ) -> NotificationOutcome {
        if let Err(reason) = notification.validate() {
            warn!(job_id = %notification.job_id, "Rejecting invalid job notification: {}", reason);
            let err = OtaError::protocol(format!("invalid job notification: {reason}"));
            self.report_rejection(&notification.job_id, &err).await;
            return NotificationOutcome::RejectedInvalid;
        }

        match self.ledger.adopt(&notification) {
            Adoption::Adopted => {
                info!(
                    job_id = %notification.job_id,
                    size_bytes = notification.size_bytes,
                    "Adopted update job"
                );
                let report = StatusReport::new(
                    self.status.device_id(),
                    Some(&notification.job_id),
                    JobStatus::Received,
                )
                .with_progress(0, notification.size_bytes);
                self.status.report(report).await;
                NotificationOutcome::Adopted
            }
            Adoption::AlreadyActive => {
                debug!(job_id = %notification.job_id, "Duplicate notification for active job ignored");
                NotificationOutcome::Ignored
            }
            Adoption::AlreadyStaged => {
                info!(
                    job_id = %notification.job_id,
                    "Job already staged, re-acknowledging without re-staging"
                );
                let report = StatusReport::new(
                    self.status.device_id(),
                    Some(&notification.job_id),
                    JobStatus::Staged,
                );
                self.status.report(report).await;
                NotificationOutcome::Ignored
            }
            Adoption::Busy { active } => {
                let err = OtaError::Busy {
                    active: active.clone(),
                };
                warn!(
                    job_id = %notification.job_id,
                    active = %active,
                    "Rejecting job notification, another update is in flight"
                );
                self.report_rejection(&notification.job_id, &err).await;
                NotificationOutcome::Busy { active }
            }
            Adoption::Oversized { requested, limit } => {
                let err = OtaError::Resource { requested, limit };
                warn!(job_id = %notification.job_id, "Rejecting oversized job: {}", err);
                self.report_rejection(&notification.job_id, &err).await;
                NotificationOutcome::RejectedOversized
            }
        }
    }

    /// Drive the adopted job to a terminal state, handling intruding
    /// notifications between steps
    pub async fn run_active_job(&mut self, jobs: &mut mpsc::Receiver<JobNotification>) {
        if !self.ledger.is_active() {
            return;
        }
        if let Err(error) = self.drive(jobs).await {
            self.conclude_with_error(error).await;
        }
    }

    async fn drive(&mut self, jobs: &mut mpsc::Receiver<JobNotification>) -> OtaResult<()> {
        loop {
            // Notifications that raced in during the last step get their
            // busy rejection now; there is no preemptive cancellation.
            self.drain_intruders(jobs).await;
            if self.download_step().await? == StepOutcome::Complete {
                break;
            }
        }
        self.drain_intruders(jobs).await;
        self.verify().await?;
        self.stage().await?;
        Ok(())
    }

    /// Transfer one chunk at the current offset
    ///
    /// The first step after adoption transitions the job into Downloading.
    /// Transient failures pause on the link watch and leave the offset
    /// untouched; the next step resumes exactly where the last confirmed
    /// byte ended.
    pub async fn download_step(&mut self) -> OtaResult<StepOutcome> {
        if self.ledger.active().map(|j| j.status) == Some(JobStatus::Received) {
            self.ledger
                .begin_download()
                .map_err(|e| OtaError::protocol(e.to_string()))?;
            self.transient_failures = 0;
            self.chunks_since_report = 0;
            let (job_id, descriptor, _) = self.active_snapshot()?;
            let report =
                StatusReport::new(self.status.device_id(), Some(&job_id), JobStatus::Downloading)
                    .with_progress(0, descriptor.size_bytes);
            self.status.report(report).await;
        }

        let (job_id, descriptor, offset) = self.active_snapshot()?;
        if offset == descriptor.size_bytes {
            return Ok(StepOutcome::Complete);
        }

        let len = std::cmp::min(self.chunk_size as u64, descriptor.size_bytes - offset) as usize;
        let fetched = tokio::time::timeout(
            self.operation_timeout,
            self.source.fetch(&descriptor.source, offset, len),
        )
        .await;

        let chunk = match fetched {
            Err(_) => {
                return self
                    .defer(offset, format!("chunk fetch timed out at offset {offset}"))
                    .await;
            }
            Ok(Err(SourceError::Transient(reason))) => return self.defer(offset, reason).await,
            Ok(Err(SourceError::Protocol(reason))) => return Err(OtaError::protocol(reason)),
            Ok(Ok(chunk)) => chunk,
        };

        if chunk.len() != len {
            return Err(OtaError::protocol(format!(
                "source returned {} bytes for a {len}-byte range at offset {offset}",
                chunk.len()
            )));
        }

        self.sink.write_range(offset, &chunk).await?;
        let new_offset = offset + len as u64;
        self.ledger
            .advance(new_offset)
            .map_err(|e| OtaError::protocol(e.to_string()))?;
        self.transient_failures = 0;

        self.chunks_since_report += 1;
        if self.chunks_since_report >= self.progress_interval {
            self.chunks_since_report = 0;
            let report =
                StatusReport::new(self.status.device_id(), Some(&job_id), JobStatus::Downloading)
                    .with_progress(new_offset, descriptor.size_bytes);
            self.status.report(report).await;
        }

        if self.ledger.is_download_complete() {
            Ok(StepOutcome::Complete)
        } else {
            Ok(StepOutcome::Advanced(new_offset))
        }
    }

    /// Hand the fully downloaded image to the verifier
    pub async fn verify(&mut self) -> OtaResult<()> {
        self.ledger
            .mark_downloaded()
            .map_err(|e| OtaError::protocol(e.to_string()))?;
        let (job_id, descriptor, offset) = self.active_snapshot()?;
        let report =
            StatusReport::new(self.status.device_id(), Some(&job_id), JobStatus::Downloaded)
                .with_progress(offset, descriptor.size_bytes);
        self.status.report(report).await;

        self.ledger
            .begin_verify()
            .map_err(|e| OtaError::protocol(e.to_string()))?;
        let report =
            StatusReport::new(self.status.device_id(), Some(&job_id), JobStatus::Verifying);
        self.status.report(report).await;

        self.verifier.verify(&descriptor, offset).await
    }

    /// Commit the verified image to the staging area
    ///
    /// Only a confirmed commit moves the job to Staged; the sink guarantees
    /// a partial write never looks complete to the bootloader.
    pub async fn stage(&mut self) -> OtaResult<()> {
        let (_, descriptor, _) = self.active_snapshot()?;
        self.sink.commit(descriptor.size_bytes).await?;

        let staged = self
            .ledger
            .mark_staged()
            .map_err(|e| OtaError::protocol(e.to_string()))?;
        info!(
            job_id = %staged.id,
            size_bytes = staged.descriptor.size_bytes,
            "Image staged; bootloader will activate it on next restart"
        );
        let report = StatusReport::new(self.status.device_id(), Some(&staged.id), JobStatus::Staged)
            .with_progress(staged.descriptor.size_bytes, staged.descriptor.size_bytes);
        self.status.report(report).await;
        Ok(())
    }

    async fn drain_intruders(&mut self, jobs: &mut mpsc::Receiver<JobNotification>) {
        while let Ok(notification) = jobs.try_recv() {
            self.on_job_notification(notification).await;
        }
    }

    async fn defer(&mut self, offset: u64, reason: String) -> OtaResult<StepOutcome> {
        self.transient_failures += 1;
        if self.transient_failures > self.retry.max_attempts {
            return Err(OtaError::connection(format!(
                "download retry budget exhausted at offset {offset}: {reason}"
            )));
        }

        warn!(
            attempt = self.transient_failures,
            max = self.retry.max_attempts,
            offset,
            "Transient download failure, deferring to the link: {}",
            reason
        );
        self.wait_for_link().await?;
        tokio::time::sleep(self.retry.interval).await;
        Ok(StepOutcome::Deferred(offset))
    }

    /// Block until the reconnection controller reports Connected
    async fn wait_for_link(&mut self) -> OtaResult<()> {
        if !matches!(*self.link.borrow(), LinkState::Connected) {
            info!("Download paused while the link recovers");
        }
        loop {
            let state = self.link.borrow().clone();
            match state {
                LinkState::Connected => return Ok(()),
                LinkState::Failed(reason) => {
                    return Err(OtaError::connection(format!(
                        "link failed during download: {reason}"
                    )));
                }
                _ => {}
            }
            self.link
                .changed()
                .await
                .map_err(|_| OtaError::connection("link supervisor stopped"))?;
        }
    }

    async fn conclude_with_error(&mut self, error: OtaError) {
        // Partially staged data must never survive a failed job
        if let Err(e) = self.sink.abort().await {
            warn!("Failed to discard staged data: {}", e);
        }
        self.transient_failures = 0;
        self.chunks_since_report = 0;

        let rejected = matches!(
            error,
            OtaError::Verification { .. } | OtaError::Resource { .. }
        );
        let concluded = if rejected {
            self.ledger.mark_rejected()
        } else {
            self.ledger.mark_failed()
        };

        match concluded {
            Ok(job) => {
                error!(
                    job_id = %job.id,
                    status = ?job.status,
                    "Update job concluded with error: {}",
                    error
                );
                let report = StatusReport::new(self.status.device_id(), Some(&job.id), job.status)
                    .with_progress(job.offset, job.descriptor.size_bytes)
                    .with_error(error.to_details());
                self.status.report(report).await;
            }
            Err(state_error) => {
                error!(
                    "Job conclusion without active job: {} (original error: {})",
                    state_error, error
                );
            }
        }
    }

    async fn report_rejection(&self, job_id: &str, error: &OtaError) {
        let report = StatusReport::new(self.status.device_id(), Some(job_id), JobStatus::Rejected)
            .with_error(error.to_details());
        self.status.report(report).await;
    }

    fn active_snapshot(&self) -> OtaResult<(String, ImageDescriptor, u64)> {
        self.ledger
            .active()
            .map(|job| (job.id.clone(), job.descriptor.clone(), job.offset))
            .ok_or_else(|| OtaError::protocol("no active update job"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{ErrorKind, QosLevel};
    use crate::testing::mocks::{
        MemorySink, MockTransport, RejectingVerifier, ScriptedChunkSource, SinkState,
    };
    use std::sync::Mutex as StdMutex;

    struct Fixture {
        coordinator: UpdateCoordinator<MockTransport>,
        transport: Arc<MockTransport>,
        source: Arc<ScriptedChunkSource>,
        sink_state: Arc<StdMutex<SinkState>>,
    }

    fn fixture(image: Vec<u8>, verifier: Arc<dyn ImageVerifier>) -> Fixture {
        let mut config = DeviceConfig::test_config();
        config.timing.reconnect_interval_ms = 1;
        config.timing.max_reconnect_attempts = 3;
        config.update.chunk_size = 1024;
        config.update.progress_interval_chunks = 2;
        config.update.staging_limit_bytes = 64 * 1024;

        let transport = Arc::new(MockTransport::new());
        let status = Arc::new(StatusPublisher::new(
            "device-1".to_string(),
            "/devices/device-1/status".to_string(),
            QosLevel::AtLeastOnce,
            transport.clone(),
        ));
        let source = Arc::new(ScriptedChunkSource::new(image));
        let sink = MemorySink::new();
        let sink_state = sink.state();
        let link = transport.link_watch().expect("mock link watch");

        let mut coordinator = UpdateCoordinator::new(
            &config,
            link,
            source.clone(),
            verifier,
            Box::new(sink),
            status,
        );
        coordinator.arm();

        Fixture {
            coordinator,
            transport,
            source,
            sink_state,
        }
    }

    fn notification(id: &str, size: u64) -> JobNotification {
        JobNotification {
            job_id: id.to_string(),
            size_bytes: size,
            checksum: "cafe".to_string(),
            source: "https://images.example.com/fw.bin".to_string(),
        }
    }

    async fn published_statuses(transport: &MockTransport) -> Vec<(Option<String>, JobStatus)> {
        transport
            .published()
            .await
            .iter()
            .map(|m| {
                let report: StatusReport = serde_json::from_slice(&m.payload).unwrap();
                (report.job_id, report.status)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_happy_path_reaches_staged() {
        let image: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let mut fx = fixture(image.clone(), Arc::new(crate::image::LengthVerifier));
        let (_tx, mut rx) = mpsc::channel(4);

        let outcome = fx
            .coordinator
            .on_job_notification(notification("j1", 4096))
            .await;
        assert_eq!(outcome, NotificationOutcome::Adopted);

        fx.coordinator.run_active_job(&mut rx).await;

        // Staged exactly once, with the full image
        let state = fx.sink_state.lock().unwrap();
        assert_eq!(state.commit_count, 1);
        assert_eq!(state.committed.as_deref(), Some(image.as_slice()));
        drop(state);

        let statuses = published_statuses(&fx.transport).await;
        let sequence: Vec<JobStatus> = statuses.iter().map(|(_, s)| *s).collect();
        assert_eq!(sequence.first(), Some(&JobStatus::Received));
        assert_eq!(sequence.last(), Some(&JobStatus::Staged));
        assert!(sequence.contains(&JobStatus::Downloading));
        assert!(sequence.contains(&JobStatus::Downloaded));
        assert!(sequence.contains(&JobStatus::Verifying));

        assert_eq!(fx.coordinator.phase(), Phase::AwaitingJob);
    }

    #[tokio::test]
    async fn test_busy_second_job_rejected_active_untouched() {
        let mut fx = fixture(vec![7u8; 4096], Arc::new(crate::image::LengthVerifier));

        assert_eq!(
            fx.coordinator
                .on_job_notification(notification("j1", 4096))
                .await,
            NotificationOutcome::Adopted
        );
        // Partially download j1
        fx.coordinator.download_step().await.unwrap();
        assert_eq!(fx.coordinator.active_job().unwrap().offset, 1024);

        let outcome = fx
            .coordinator
            .on_job_notification(notification("j2", 4096))
            .await;
        assert_eq!(
            outcome,
            NotificationOutcome::Busy {
                active: "j1".to_string()
            }
        );

        // j1 is unaffected
        let active = fx.coordinator.active_job().unwrap();
        assert_eq!(active.id, "j1");
        assert_eq!(active.offset, 1024);

        // The busy rejection is explicit and observable, never silent
        let reports = fx.transport.published().await;
        let busy: StatusReport = serde_json::from_slice(&reports.last().unwrap().payload).unwrap();
        assert_eq!(busy.job_id.as_deref(), Some("j2"));
        assert_eq!(busy.status, JobStatus::Rejected);
        assert_eq!(busy.error.as_ref().unwrap().kind, ErrorKind::Busy);
        assert!(busy.error.as_ref().unwrap().message.contains("j1"));
    }

    #[tokio::test]
    async fn test_network_flap_resumes_at_offset() {
        let image: Vec<u8> = (0..4096u32).map(|i| (i % 199) as u8).collect();
        let mut fx = fixture(image.clone(), Arc::new(crate::image::LengthVerifier));
        let (_tx, mut rx) = mpsc::channel(4);

        // Drop the link at byte 2048, recover shortly after
        fx.source.fail_transiently_at(2048, 1);
        fx.transport.set_link_state(LinkState::Reconnecting(1));
        let transport = fx.transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            transport.set_link_state(LinkState::Connected);
        });

        fx.coordinator
            .on_job_notification(notification("j1", 4096))
            .await;
        fx.coordinator.run_active_job(&mut rx).await;

        // Resumed at 2048, not restarted; staged byte count is still 4096
        let state = fx.sink_state.lock().unwrap();
        assert_eq!(state.committed.as_deref(), Some(image.as_slice()));
        assert_eq!(state.commit_count, 1);
        // 4 chunks + 1 failed fetch at 2048
        assert_eq!(fx.source.fetch_count(), 5);
    }

    #[tokio::test]
    async fn test_download_fails_when_link_terminally_fails() {
        let mut fx = fixture(vec![1u8; 4096], Arc::new(crate::image::LengthVerifier));
        let (_tx, mut rx) = mpsc::channel(4);

        fx.source.fail_transiently_at(1024, 1);
        fx.transport
            .set_link_state(LinkState::Failed("max attempts".to_string()));

        fx.coordinator
            .on_job_notification(notification("j1", 4096))
            .await;
        fx.coordinator.run_active_job(&mut rx).await;

        assert_eq!(fx.coordinator.phase(), Phase::AwaitingJob);
        let statuses = published_statuses(&fx.transport).await;
        assert_eq!(statuses.last().unwrap().1, JobStatus::Failed);
        assert!(fx.sink_state.lock().unwrap().aborted);
    }

    #[tokio::test]
    async fn test_transient_budget_exhaustion_fails_job() {
        let mut fx = fixture(vec![1u8; 2048], Arc::new(crate::image::LengthVerifier));
        let (_tx, mut rx) = mpsc::channel(4);

        // More consecutive failures than the retry budget (3)
        fx.source.fail_transiently_at(0, 10);

        fx.coordinator
            .on_job_notification(notification("j1", 2048))
            .await;
        fx.coordinator.run_active_job(&mut rx).await;

        let statuses = published_statuses(&fx.transport).await;
        let (job_id, status) = statuses.last().unwrap();
        assert_eq!(job_id.as_deref(), Some("j1"));
        assert_eq!(*status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_verification_failure_rejects_and_discards() {
        let mut fx = fixture(vec![9u8; 2048], Arc::new(RejectingVerifier));
        let (_tx, mut rx) = mpsc::channel(4);

        fx.coordinator
            .on_job_notification(notification("j1", 2048))
            .await;
        fx.coordinator.run_active_job(&mut rx).await;

        let state = fx.sink_state.lock().unwrap();
        assert!(state.aborted);
        assert!(state.committed.is_none());
        drop(state);

        let reports = fx.transport.published().await;
        let last: StatusReport = serde_json::from_slice(&reports.last().unwrap().payload).unwrap();
        assert_eq!(last.status, JobStatus::Rejected);
        assert_eq!(last.error.unwrap().kind, ErrorKind::Verification);
    }

    #[tokio::test]
    async fn test_oversized_job_rejected_without_adoption() {
        let mut fx = fixture(vec![0u8; 16], Arc::new(crate::image::LengthVerifier));

        let outcome = fx
            .coordinator
            .on_job_notification(notification("huge", 10 * 1024 * 1024))
            .await;
        assert_eq!(outcome, NotificationOutcome::RejectedOversized);
        assert!(fx.coordinator.active_job().is_none());

        let statuses = published_statuses(&fx.transport).await;
        assert_eq!(statuses.last().unwrap().1, JobStatus::Rejected);
    }

    #[tokio::test]
    async fn test_invalid_notification_rejected() {
        let mut fx = fixture(vec![0u8; 16], Arc::new(crate::image::LengthVerifier));

        let mut bad = notification("j1", 4096);
        bad.source = String::new();
        assert_eq!(
            fx.coordinator.on_job_notification(bad).await,
            NotificationOutcome::RejectedInvalid
        );
        assert!(fx.coordinator.active_job().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_staged_job_never_restaged() {
        let image = vec![3u8; 1024];
        let mut fx = fixture(image, Arc::new(crate::image::LengthVerifier));
        let (_tx, mut rx) = mpsc::channel(4);

        fx.coordinator
            .on_job_notification(notification("j1", 1024))
            .await;
        fx.coordinator.run_active_job(&mut rx).await;
        assert_eq!(fx.sink_state.lock().unwrap().commit_count, 1);

        // Duplicate notification with the same identifier: acknowledged,
        // not re-staged
        let outcome = fx
            .coordinator
            .on_job_notification(notification("j1", 1024))
            .await;
        assert_eq!(outcome, NotificationOutcome::Ignored);
        assert_eq!(fx.sink_state.lock().unwrap().commit_count, 1);
    }

    #[tokio::test]
    async fn test_intruder_during_run_gets_busy_rejection() {
        let image = vec![5u8; 4096];
        let mut fx = fixture(image, Arc::new(crate::image::LengthVerifier));
        let (tx, mut rx) = mpsc::channel(4);

        fx.coordinator
            .on_job_notification(notification("j1", 4096))
            .await;
        // Queue an intruder before driving; it is drained between steps
        tx.send(notification("j2", 4096)).await.unwrap();
        fx.coordinator.run_active_job(&mut rx).await;

        let statuses = published_statuses(&fx.transport).await;
        assert!(statuses
            .iter()
            .any(|(id, s)| id.as_deref() == Some("j2") && *s == JobStatus::Rejected));
        // j1 still completed
        assert!(statuses
            .iter()
            .any(|(id, s)| id.as_deref() == Some("j1") && *s == JobStatus::Staged));
    }
}
