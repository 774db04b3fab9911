//! Pure event routing and inbound message forwarding
//!
//! Classifies raw rumqttc events into the handful of routes the session
//! supervisor cares about, and forwards control-topic payloads to the
//! coordinator's channel.

use crate::protocol::messages::{parse_control_payload, ControlMessage};
use rumqttc::{Event, Packet, SubscribeReasonCode};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// CONNACK - session is up, re-subscribe and unblock publishers
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    Inbound {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// Broker-side disconnect
    Disconnected,
    /// SUBACK with per-filter results
    SubscriptionConfirmed { failures: usize },
    /// Anything else incoming (PingResp, PubAck, ...)
    Infrastructure(String),
    /// Outgoing packet event, handled by rumqttc
    Outgoing,
}

/// Classify a rumqttc event (pure function)
pub fn route_mqtt_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
            Packet::Publish(publish) => EventRoute::Inbound {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
                retain: publish.retain,
            },
            Packet::Disconnect => EventRoute::Disconnected,
            Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                failures: suback
                    .return_codes
                    .iter()
                    .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                    .count(),
            },
            other => EventRoute::Infrastructure(format!("{other:?}")),
        },
        Event::Outgoing(_) => EventRoute::Outgoing,
    }
}

/// Forwards control-topic payloads to the coordinator channel
///
/// Retained messages are processed like live ones: a retained job document
/// is the broker-held "current job", which is what replaces the original
/// firmware's periodic job-document poll.
pub struct ControlForwarder {
    control_topic: String,
    sender: Option<mpsc::Sender<ControlMessage>>,
}

impl ControlForwarder {
    pub fn new(control_topic: String) -> Self {
        Self {
            control_topic,
            sender: None,
        }
    }

    pub fn set_sender(&mut self, sender: mpsc::Sender<ControlMessage>) {
        self.sender = Some(sender);
    }

    pub fn sender(&self) -> Option<mpsc::Sender<ControlMessage>> {
        self.sender.clone()
    }

    /// Whether an inbound publish belongs to the control channel
    pub fn accepts(&self, topic: &str) -> bool {
        topic == self.control_topic
    }
}

/// Parse and forward one inbound payload (impure I/O half)
pub async fn forward_control_payload(
    sender: &mpsc::Sender<ControlMessage>,
    topic: &str,
    payload: &[u8],
) {
    let message = parse_control_payload(payload);
    if message == ControlMessage::Unrecognized {
        warn!(topic = %topic, len = payload.len(), "Ignoring unrecognized control payload");
        return;
    }

    debug!(topic = %topic, "Forwarding control message");
    if sender.send(message).await.is_err() {
        warn!("Control channel closed - message dropped");
    }
}
