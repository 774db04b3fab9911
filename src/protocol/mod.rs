//! Wire types and topic handling for the update-delivery protocol
//!
//! Defines the control/status message shapes and the normalization rules for
//! operator-supplied topics and identifiers.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
