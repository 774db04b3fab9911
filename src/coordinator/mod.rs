//! Update coordinator: the download-verify-stage state machine
//!
//! `state` holds the pure job ledger (single-active-job rule, adoption
//! tie-break, monotonic offsets); `engine` drives it against the transport,
//! chunk source, verifier and staging sink.

pub mod engine;
pub mod state;

pub use engine::{NotificationOutcome, StepOutcome, UpdateCoordinator};
pub use state::{Adoption, JobLedger, Phase, StateError, UpdateJob};
