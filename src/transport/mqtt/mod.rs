//! MQTT implementation of the transport layer
//!
//! Split into pure decision logic and impure I/O:
//! `connection` assembles options and states without touching the network,
//! `monitor` makes retry decisions, `events` routes raw events, and
//! `session` owns the client, the event loop and the supervisor task.

pub mod connection;
pub mod events;
pub mod monitor;
pub mod session;

pub use connection::{
    configure_mqtt_options, unique_client_id, validate_tls_material, LinkState, MqttError,
    RetryPolicy,
};
pub use events::{route_mqtt_event, ControlForwarder, EventRoute};
pub use monitor::{LinkEvent, LinkMonitor, RetryDecision};
pub use session::MqttSession;
