//! Pure reconnection and link-state decision logic
//!
//! The session supervisor feeds link events through these functions; the
//! functions never touch the network, which keeps the retry semantics
//! testable without a broker.

use super::connection::{LinkState, RetryPolicy};
use tracing::{error, info, warn};

/// Pure decision logic for the reconnection controller
pub struct LinkMonitor;

impl LinkMonitor {
    /// Decide whether another connection attempt is allowed
    ///
    /// `completed_attempts` counts attempts already made in the current
    /// retry sequence; it resets to zero on every successful CONNACK.
    pub fn next_retry(
        completed_attempts: u32,
        policy: &RetryPolicy,
        shutdown_requested: bool,
    ) -> RetryDecision {
        if shutdown_requested {
            return RetryDecision::AbortShutdownRequested;
        }

        if completed_attempts >= policy.max_attempts {
            return RetryDecision::AbortExhausted;
        }

        RetryDecision::Proceed {
            attempt: completed_attempts + 1,
            delay: policy.interval,
        }
    }

    /// Determine the next link state after an event
    pub fn next_state(event: LinkEvent) -> LinkState {
        match event {
            LinkEvent::ConnAckReceived => {
                info!("MQTT session connected");
                LinkState::Connected
            }
            LinkEvent::BrokerDisconnect => {
                warn!("Broker closed the MQTT session");
                LinkState::Disconnected("Broker disconnected".to_string())
            }
            LinkEvent::NetworkError(reason) => {
                warn!("MQTT link error: {}", reason);
                LinkState::Disconnected(reason)
            }
            LinkEvent::RetryStarted(attempt) => {
                info!("Starting reconnection attempt {}", attempt);
                LinkState::Reconnecting(attempt)
            }
            LinkEvent::RetriesExhausted(reason) => {
                error!("Reconnection budget exhausted: {}", reason);
                LinkState::Failed(reason)
            }
        }
    }

    /// Publishes are only legal while Connected
    pub fn can_publish(state: &LinkState) -> bool {
        matches!(state, LinkState::Connected)
    }

    /// Same gate for subscriptions
    pub fn can_subscribe(state: &LinkState) -> bool {
        matches!(state, LinkState::Connected)
    }

    /// Log a state transition at the appropriate level
    pub fn log_transition(from: &LinkState, to: &LinkState) {
        match (from, to) {
            (LinkState::Connecting, LinkState::Connected) => {
                info!("MQTT connection established");
            }
            (LinkState::Reconnecting(attempt), LinkState::Connected) => {
                info!("Reconnected after {} attempts", attempt);
            }
            (LinkState::Connected, LinkState::Disconnected(reason)) => {
                warn!("MQTT connection lost: {}", reason);
            }
            (_, LinkState::Failed(reason)) => {
                error!("MQTT connection permanently failed: {}", reason);
            }
            _ => {
                info!("MQTT link state: {:?} -> {:?}", from, to);
            }
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum RetryDecision {
    /// Proceed with the next attempt after the fixed delay
    Proceed {
        attempt: u32,
        delay: std::time::Duration,
    },
    /// Abort: shutdown requested
    AbortShutdownRequested,
    /// Abort: retry budget exhausted
    AbortExhausted,
}

/// Link events that drive state transitions
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// CONNACK received from the broker
    ConnAckReceived,
    /// Broker initiated a disconnect
    BrokerDisconnect,
    /// Network or protocol error from the event loop (includes missed
    /// keep-alive responses)
    NetworkError(String),
    /// Reconnection attempt started
    RetryStarted(u32),
    /// Retry budget exhausted; link is terminally failed
    RetriesExhausted(String),
}
