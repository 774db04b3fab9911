//! Transport layer for broker communication
//!
//! Provides the transport abstraction the coordinator and status publisher
//! are written against, plus the MQTT implementation.

use crate::protocol::messages::{ControlMessage, QosLevel};
use tokio::sync::{mpsc, watch};

pub mod mqtt;

/// Transport trait for publish/subscribe broker communication
///
/// Abstracts the MQTT session so the update coordinator and status publisher
/// can be tested against mock transports.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish the session, running the bounded retry sequence
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Idempotent connectivity check: a no-op while connected, a full retry
    /// sequence restart from a disconnected or failed state
    async fn ensure_connected(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker and stop the session supervisor
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Publish a payload; fails fast outside the Connected state
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error>;

    /// Subscribe to a topic filter; tracked for re-subscription after
    /// reconnects
    async fn subscribe(&mut self, topic: &str, qos: QosLevel) -> Result<(), Self::Error>;

    /// Check if the transport is currently connected
    fn is_connected(&self) -> bool;

    /// Current link state, None before the first connect
    fn link_state(&self) -> Option<mqtt::LinkState>;

    /// Watch channel over link state transitions, None before the first
    /// connect; this is how the coordinator pauses on link loss
    fn link_watch(&self) -> Option<watch::Receiver<mqtt::LinkState>>;

    /// Check if the retry budget has been exhausted
    fn is_failed(&self) -> bool;

    /// Register the channel inbound control messages are delivered on
    fn set_control_sender(&self, sender: mpsc::Sender<ControlMessage>);
}

/// Type alias for the MQTT transport
pub type MqttTransport = mqtt::MqttSession;
