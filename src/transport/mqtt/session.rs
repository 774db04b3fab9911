//! MQTT session with a supervised, bounded reconnection loop
//!
//! One `MqttSession` owns one broker connection. A background supervisor
//! task polls the rumqttc event loop, publishes every link-state transition
//! on a watch channel, and drives the fixed-interval retry sequence when the
//! link drops. Exhausting the retry budget parks the session in
//! `LinkState::Failed`; the decision what to do next belongs to the caller.

use super::connection::{
    configure_mqtt_options, to_rumqttc_qos, LinkState, MqttError, RetryPolicy,
};
use super::events::{forward_control_payload, route_mqtt_event, ControlForwarder, EventRoute};
use super::monitor::{LinkEvent, LinkMonitor, RetryDecision};
use crate::config::{Credentials, DeviceConfig};
use crate::protocol::messages::{ControlMessage, QosLevel};
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// MQTT transport session for the update agent
pub struct MqttSession {
    config: DeviceConfig,
    credentials: Credentials,
    retry: RetryPolicy,
    operation_timeout: Duration,
    client: Arc<Mutex<AsyncClient>>,
    // Mutex only for the Sync bound; ownership moves to the supervisor task
    event_loop: Option<Mutex<EventLoop>>,
    supervisor: Option<JoinHandle<()>>,
    state_tx: Option<watch::Sender<LinkState>>,
    state_rx: Option<watch::Receiver<LinkState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    subscriptions: Arc<StdMutex<Vec<(String, QosLevel)>>>,
    forwarder: Arc<StdMutex<ControlForwarder>>,
}

impl MqttSession {
    /// Create a session; validates TLS material but performs no network I/O
    pub fn new(config: DeviceConfig, credentials: Credentials) -> Result<Self, MqttError> {
        let options = configure_mqtt_options(&config, &credentials)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let retry = RetryPolicy::from_config(&config);
        let operation_timeout = config.timing.operation_timeout();
        let control_topic = config.topics.control.clone();

        Ok(MqttSession {
            config,
            credentials,
            retry,
            operation_timeout,
            client: Arc::new(Mutex::new(client)),
            event_loop: Some(Mutex::new(event_loop)),
            supervisor: None,
            state_tx: None,
            state_rx: None,
            shutdown_tx: None,
            subscriptions: Arc::new(StdMutex::new(Vec::new())),
            forwarder: Arc::new(StdMutex::new(ControlForwarder::new(control_topic))),
        })
    }

    fn spawn_supervisor(&mut self, event_loop: EventLoop) {
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state_tx = Some(state_tx.clone());
        self.state_rx = Some(state_rx);
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(Self::run_supervisor(
            event_loop,
            state_tx,
            shutdown_rx,
            self.client.clone(),
            self.subscriptions.clone(),
            self.forwarder.clone(),
            self.config.clone(),
            self.credentials.clone(),
            self.retry.clone(),
        ));
        self.supervisor = Some(handle);
    }

    /// Event-loop supervisor: polls, routes, reconnects
    #[allow(clippy::too_many_arguments)]
    async fn run_supervisor(
        mut event_loop: EventLoop,
        state_tx: watch::Sender<LinkState>,
        mut shutdown_rx: watch::Receiver<bool>,
        client: Arc<Mutex<AsyncClient>>,
        subscriptions: Arc<StdMutex<Vec<(String, QosLevel)>>>,
        forwarder: Arc<StdMutex<ControlForwarder>>,
        config: DeviceConfig,
        credentials: Credentials,
        retry: RetryPolicy,
    ) {
        info!(device_id = %config.device.id, "Starting MQTT session supervisor");
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping session supervisor");
                        break;
                    }
                }

                polled = event_loop.poll() => match polled {
                    Ok(event) => match route_mqtt_event(&event) {
                        EventRoute::ConnectionAcknowledged => {
                            let previous = state_tx.borrow().clone();
                            let next = LinkMonitor::next_state(LinkEvent::ConnAckReceived);
                            LinkMonitor::log_transition(&previous, &next);
                            let _ = state_tx.send(next);
                            attempts = 0;
                            Self::resubscribe(&client, &subscriptions, config.timing.operation_timeout()).await;
                        }
                        EventRoute::Inbound { topic, payload, retain } => {
                            Self::handle_inbound(&forwarder, &topic, &payload, retain).await;
                        }
                        EventRoute::Disconnected => {
                            let _ = state_tx.send(LinkMonitor::next_state(LinkEvent::BrokerDisconnect));
                            if !Self::retry_cycle(
                                &mut event_loop,
                                &mut attempts,
                                &state_tx,
                                shutdown_rx.clone(),
                                &client,
                                &config,
                                &credentials,
                                &retry,
                            )
                            .await
                            {
                                break;
                            }
                        }
                        EventRoute::SubscriptionConfirmed { failures } => {
                            if failures > 0 {
                                warn!("{} subscription filters rejected by broker", failures);
                            } else {
                                debug!(target: "mqtt_transport", "Subscription confirmed");
                            }
                        }
                        EventRoute::Infrastructure(event) => {
                            debug!(target: "mqtt_transport", "MQTT event: {}", event);
                        }
                        EventRoute::Outgoing => {}
                    },
                    Err(e) => {
                        // Missed keep-alive responses surface here as well
                        let _ = state_tx.send(LinkMonitor::next_state(
                            LinkEvent::NetworkError(e.to_string()),
                        ));
                        if !Self::retry_cycle(
                            &mut event_loop,
                            &mut attempts,
                            &state_tx,
                            shutdown_rx.clone(),
                            &client,
                            &config,
                            &credentials,
                            &retry,
                        )
                        .await
                        {
                            break;
                        }
                    }
                }
            }
        }
        info!(device_id = %config.device.id, "MQTT session supervisor stopped");
    }

    async fn handle_inbound(
        forwarder: &Arc<StdMutex<ControlForwarder>>,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) {
        debug!(target: "mqtt_transport", topic = %topic, retain, "Received message");

        let (accepted, sender) = {
            let guard = forwarder.lock().expect("control forwarder lock poisoned");
            (guard.accepts(topic), guard.sender())
        };

        if !accepted {
            debug!(topic = %topic, "Message outside the control topic ignored");
            return;
        }

        match sender {
            Some(sender) => forward_control_payload(&sender, topic, payload).await,
            None => warn!("No control sender registered - message dropped"),
        }
    }

    /// One turn of the fixed-interval retry sequence.
    /// Returns false when the supervisor should stop.
    #[allow(clippy::too_many_arguments)]
    async fn retry_cycle(
        event_loop: &mut EventLoop,
        attempts: &mut u32,
        state_tx: &watch::Sender<LinkState>,
        shutdown_rx: watch::Receiver<bool>,
        client: &Arc<Mutex<AsyncClient>>,
        config: &DeviceConfig,
        credentials: &Credentials,
        retry: &RetryPolicy,
    ) -> bool {
        let is_shutdown = *shutdown_rx.borrow();
        match LinkMonitor::next_retry(*attempts, retry, is_shutdown) {
            RetryDecision::Proceed { attempt, delay } => {
                *attempts = attempt;
                let _ =
                    state_tx.send(LinkMonitor::next_state(LinkEvent::RetryStarted(attempt)));
                info!(
                    "Reconnection attempt {}/{} after {:?}",
                    attempt, retry.max_attempts, delay
                );

                if !Self::interruptible_sleep(shutdown_rx.clone(), delay).await {
                    return false;
                }
                if *shutdown_rx.borrow() {
                    info!("Shutdown signal received, aborting reconnection");
                    return false;
                }

                match configure_mqtt_options(config, credentials) {
                    Ok(options) => {
                        let (new_client, new_event_loop) =
                            AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
                        *event_loop = new_event_loop;
                        let mut guard = client.lock().await;
                        *guard = new_client;
                        true
                    }
                    Err(e) => {
                        error!("Failed to rebuild connection: {}", e);
                        true
                    }
                }
            }
            RetryDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
            RetryDecision::AbortExhausted => {
                let reason = format!(
                    "max reconnection attempts ({}) exceeded",
                    retry.max_attempts
                );
                let _ = state_tx.send(LinkMonitor::next_state(LinkEvent::RetriesExhausted(
                    reason,
                )));
                false
            }
        }
    }

    /// Sleep that can be interrupted by the shutdown signal.
    /// Returns false if shutdown was requested.
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Re-establish tracked subscriptions after a reconnect
    async fn resubscribe(
        client: &Arc<Mutex<AsyncClient>>,
        subscriptions: &Arc<StdMutex<Vec<(String, QosLevel)>>>,
        operation_timeout: Duration,
    ) {
        let tracked: Vec<(String, QosLevel)> = subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .clone();

        let client_guard = client.lock().await;
        for (topic, qos) in tracked {
            let request = client_guard.subscribe(&topic, to_rumqttc_qos(qos));
            match tokio::time::timeout(operation_timeout, request).await {
                Ok(Ok(())) => debug!(target: "mqtt_transport", "Re-subscribed to {}", topic),
                Ok(Err(e)) => error!("Failed to re-subscribe to {}: {}", topic, e),
                Err(_) => error!("Timed out re-subscribing to {}", topic),
            }
        }
    }

    /// Wait for the supervisor to reach Connected or give up
    async fn await_link_up(
        mut state_rx: watch::Receiver<LinkState>,
        deadline: Duration,
        max_attempts: u32,
    ) -> Result<(), MqttError> {
        let outcome = tokio::time::timeout(deadline, async {
            loop {
                let state = state_rx.borrow().clone();
                match state {
                    LinkState::Connected => return Ok(()),
                    LinkState::Failed(reason) => {
                        return Err(MqttError::RetriesExhausted {
                            attempts: max_attempts,
                            reason,
                        });
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "session supervisor stopped".to_string(),
                    ));
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(MqttError::Timeout(deadline)),
        }
    }

    async fn wait_until_connected(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.clone().ok_or_else(|| {
            MqttError::ConnectionFailed("session not started".to_string())
        })?;
        let budget = self.retry.connect_budget(self.operation_timeout);
        Self::await_link_up(state_rx, budget, self.retry.max_attempts).await
    }

    /// Restart the retry sequence from a disconnected or failed state
    async fn restart(&mut self) -> Result<(), MqttError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.supervisor.take() {
            if tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                warn!("Previous session supervisor did not stop in time");
            }
        }

        let options = configure_mqtt_options(&self.config, &self.credentials)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        {
            let mut guard = self.client.lock().await;
            *guard = client;
        }

        self.spawn_supervisor(event_loop);
        self.wait_until_connected().await
    }

    fn current_state(&self) -> Option<LinkState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Fail fast when the link is not in a publishable state
    fn check_link(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or(MqttError::NotConnected {
            state: LinkState::Disconnected("session not started".to_string()),
        })?;

        let state = state_rx.borrow().clone();
        if !LinkMonitor::can_publish(&state) {
            return Err(MqttError::NotConnected { state });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MqttSession {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        let event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| MqttError::ConnectionFailed("session already started".to_string()))?
            .into_inner();
        self.spawn_supervisor(event_loop);
        self.wait_until_connected().await
    }

    async fn ensure_connected(&mut self) -> Result<(), Self::Error> {
        match self.current_state() {
            None => Transport::connect(self).await,
            Some(LinkState::Connected) => Ok(()),
            Some(LinkState::Connecting) | Some(LinkState::Reconnecting(_)) => {
                self.wait_until_connected().await
            }
            Some(LinkState::Disconnected(_)) | Some(LinkState::Failed(_)) => {
                self.restart().await
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
            info!("Sent shutdown signal to session supervisor");
        }

        // Best effort; the link may already be down
        {
            let client = self.client.lock().await;
            if let Err(e) = client.disconnect().await {
                debug!("Disconnect request not delivered: {}", e);
            }
        }

        if let Some(state_tx) = &self.state_tx {
            let _ = state_tx.send(LinkState::Disconnected(
                "client disconnected".to_string(),
            ));
        }

        if let Some(handle) = self.supervisor.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => info!("Session supervisor shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Session supervisor ended with error: {}", e);
                }
                Err(_) => warn!("Session supervisor did not shut down in time"),
                _ => {}
            }
        }

        info!("MQTT session disconnected");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error> {
        self.check_link()?;

        let client = self.client.lock().await;
        let request = client.publish(topic, to_rumqttc_qos(qos), retain, payload);
        tokio::time::timeout(self.operation_timeout, request)
            .await
            .map_err(|_| MqttError::Timeout(self.operation_timeout))?
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(target: "mqtt_transport", topic = %topic, "Published");
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: QosLevel) -> Result<(), Self::Error> {
        self.check_link()?;

        {
            let client = self.client.lock().await;
            let request = client.subscribe(topic, to_rumqttc_qos(qos));
            tokio::time::timeout(self.operation_timeout, request)
                .await
                .map_err(|_| MqttError::Timeout(self.operation_timeout))?
                .map_err(|e| MqttError::SubscribeFailed(Box::new(e)))?;
        }

        // Topic filters are unique per session; track for re-subscription
        let mut tracked = self
            .subscriptions
            .lock()
            .expect("subscription lock poisoned");
        if !tracked.iter().any(|(t, _)| t == topic) {
            tracked.push((topic.to_string(), qos));
        }

        info!("Subscribed to {}", topic);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(self.current_state(), Some(LinkState::Connected))
    }

    fn link_state(&self) -> Option<LinkState> {
        self.current_state()
    }

    fn link_watch(&self) -> Option<watch::Receiver<LinkState>> {
        self.state_rx.clone()
    }

    fn is_failed(&self) -> bool {
        matches!(self.current_state(), Some(LinkState::Failed(_)))
    }

    fn set_control_sender(&self, sender: mpsc::Sender<ControlMessage>) {
        self.forwarder
            .lock()
            .expect("control forwarder lock poisoned")
            .set_sender(sender);
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
        // Graceful teardown needs disconnect(); Drop only stops the
        // background task.
    }
}
