//! Pure state tracking for the update coordinator
//!
//! The ledger owns the single-active-job rule, the adoption tie-break and
//! the monotonic-offset invariant. Nothing here performs I/O; the engine
//! drives it and turns decisions into transfers and status publishes.

use crate::protocol::messages::{ImageDescriptor, JobNotification, JobStatus};
use thiserror::Error;

/// One firmware update attempt, tracked download through staging
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateJob {
    pub id: String,
    pub descriptor: ImageDescriptor,
    pub offset: u64,
    pub status: JobStatus,
}

/// Coordinator phase, derived from the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not yet listening for jobs
    Idle,
    /// Subscribed and ready; no job active
    AwaitingJob,
    /// A job is in flight (its `JobStatus` gives the detail)
    Working,
}

/// Outcome of offering a notification to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum Adoption {
    /// New job accepted; it is now the active job in `Received` state
    Adopted,
    /// Same identifier as the in-flight job; nothing to do
    AlreadyActive,
    /// Same identifier as the last staged job; never re-staged
    AlreadyStaged,
    /// A different job is in flight; the active one wins the tie-break
    Busy { active: String },
    /// Image exceeds the staging area; job is rejected without adoption
    Oversized { requested: u64, limit: u64 },
}

/// Invariant violations; always a programming or protocol error
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("no active update job")]
    NoActiveJob,
    #[error("offset {proposed} regresses below {current} for job {job_id}")]
    OffsetRegression {
        job_id: String,
        current: u64,
        proposed: u64,
    },
    #[error("offset {proposed} exceeds image size {size}")]
    OffsetBeyondImage { proposed: u64, size: u64 },
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Tracks the active job and the last staged identifier
#[derive(Debug, Default)]
pub struct JobLedger {
    armed: bool,
    active: Option<UpdateJob>,
    last_staged: Option<String>,
    staging_limit: u64,
}

impl JobLedger {
    pub fn new(staging_limit: u64) -> Self {
        Self {
            armed: false,
            active: None,
            last_staged: None,
            staging_limit,
        }
    }

    /// Mark the coordinator as listening for notifications
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn phase(&self) -> Phase {
        if self.active.is_some() {
            Phase::Working
        } else if self.armed {
            Phase::AwaitingJob
        } else {
            Phase::Idle
        }
    }

    pub fn active(&self) -> Option<&UpdateJob> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn last_staged(&self) -> Option<&str> {
        self.last_staged.as_deref()
    }

    /// Offer a notification; the already-adopted job wins every race
    pub fn adopt(&mut self, notification: &JobNotification) -> Adoption {
        if let Some(active) = &self.active {
            if active.id == notification.job_id {
                return Adoption::AlreadyActive;
            }
            return Adoption::Busy {
                active: active.id.clone(),
            };
        }

        if self.last_staged.as_deref() == Some(notification.job_id.as_str()) {
            return Adoption::AlreadyStaged;
        }

        if notification.size_bytes > self.staging_limit {
            return Adoption::Oversized {
                requested: notification.size_bytes,
                limit: self.staging_limit,
            };
        }

        self.active = Some(UpdateJob {
            id: notification.job_id.clone(),
            descriptor: notification.descriptor(),
            offset: 0,
            status: JobStatus::Received,
        });
        Adoption::Adopted
    }

    /// Transition Received -> Downloading
    pub fn begin_download(&mut self) -> Result<(), StateError> {
        self.transition(JobStatus::Downloading)
    }

    /// Advance the confirmed byte offset; regression is an invariant
    /// violation, never a silent restart
    pub fn advance(&mut self, new_offset: u64) -> Result<(), StateError> {
        let job = self.active.as_mut().ok_or(StateError::NoActiveJob)?;
        if job.status != JobStatus::Downloading {
            return Err(StateError::InvalidTransition {
                from: job.status,
                to: JobStatus::Downloading,
            });
        }
        if new_offset < job.offset {
            return Err(StateError::OffsetRegression {
                job_id: job.id.clone(),
                current: job.offset,
                proposed: new_offset,
            });
        }
        if new_offset > job.descriptor.size_bytes {
            return Err(StateError::OffsetBeyondImage {
                proposed: new_offset,
                size: job.descriptor.size_bytes,
            });
        }
        job.offset = new_offset;
        Ok(())
    }

    pub fn is_download_complete(&self) -> bool {
        self.active
            .as_ref()
            .map(|job| job.offset == job.descriptor.size_bytes)
            .unwrap_or(false)
    }

    /// Transition Downloading -> Downloaded
    pub fn mark_downloaded(&mut self) -> Result<(), StateError> {
        self.transition(JobStatus::Downloaded)
    }

    /// Transition Downloaded -> Verifying
    pub fn begin_verify(&mut self) -> Result<(), StateError> {
        self.transition(JobStatus::Verifying)
    }

    /// Transition Verifying -> Staged; releases the active slot and records
    /// the identifier so a duplicate notification is never re-staged
    pub fn mark_staged(&mut self) -> Result<UpdateJob, StateError> {
        self.transition(JobStatus::Staged)?;
        let job = self.active.take().expect("transition checked active job");
        self.last_staged = Some(job.id.clone());
        Ok(job)
    }

    /// Terminal failure; releases the active slot
    pub fn mark_failed(&mut self) -> Result<UpdateJob, StateError> {
        let job = self.active.as_mut().ok_or(StateError::NoActiveJob)?;
        job.status = JobStatus::Failed;
        Ok(self.active.take().expect("active job present"))
    }

    /// Terminal rejection; releases the active slot
    pub fn mark_rejected(&mut self) -> Result<UpdateJob, StateError> {
        let job = self.active.as_mut().ok_or(StateError::NoActiveJob)?;
        job.status = JobStatus::Rejected;
        Ok(self.active.take().expect("active job present"))
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), StateError> {
        let job = self.active.as_mut().ok_or(StateError::NoActiveJob)?;
        let legal = matches!(
            (job.status, to),
            (JobStatus::Received, JobStatus::Downloading)
                | (JobStatus::Downloading, JobStatus::Downloaded)
                | (JobStatus::Downloaded, JobStatus::Verifying)
                | (JobStatus::Verifying, JobStatus::Staged)
        );
        if !legal {
            return Err(StateError::InvalidTransition {
                from: job.status,
                to,
            });
        }
        job.status = to;
        Ok(())
    }
}
