//! Firmware update agent for MQTT-connected embedded devices
//!
//! The agent maintains a mutually-authenticated TLS session to an MQTT
//! broker, listens for firmware job notifications on a control topic,
//! downloads the image in resumable chunks, verifies it, and stages it for
//! a separate bootloader to activate on the next restart.
//!
//! # Overview
//!
//! - Transport session and bounded-retry reconnection ([`transport`])
//! - Download-verify-stage job state machine ([`coordinator`])
//! - Status publishing with last-will support ([`status`])
//! - External collaborator seams for chunk retrieval, verification and
//!   flashing ([`image`])
//! - Independent liveness/peripheral task ([`indicator`])
//!
//! # Quick Start
//!
//! ```no_run
//! use otagent::config::DeviceConfig;
//! use otagent::transport::{mqtt::MqttSession, Transport};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::load_from_file(Path::new("device.toml"))?;
//! let credentials = config.credentials()?;
//!
//! let mut session = MqttSession::new(config.clone(), credentials)?;
//! session.connect().await?;
//! session
//!     .subscribe(&config.topics.control, config.topics.qos)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod image;
pub mod indicator;
pub mod observability;
pub mod protocol;
pub mod status;
pub mod testing;
pub mod transport;

pub use config::{Credentials, DeviceConfig};
pub use coordinator::{NotificationOutcome, StepOutcome, UpdateCoordinator};
pub use error::{OtaError, OtaResult};
pub use image::{ChunkSource, FileImageSink, HttpChunkSource, ImageSink, ImageVerifier};
pub use protocol::*;
pub use status::StatusPublisher;
pub use transport::mqtt::MqttSession;
pub use transport::Transport;
