//! Mock implementations for testing
//!
//! Provides a mock transport plus scripted chunk sources, an in-memory
//! staging sink and verifiers, so the coordinator and status publisher can
//! be exercised without a broker or image server.

use crate::error::{OtaError, OtaResult};
use crate::image::{ChunkSource, ImageSink, ImageVerifier, SourceError};
use crate::protocol::messages::{ControlMessage, ImageDescriptor, QosLevel};
use crate::transport::mqtt::{LinkState, MqttError};
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, watch, Mutex};

/// One captured publish
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
    pub retain: bool,
}

/// Mock transport for testing
///
/// Starts Connected; tests flip link state through `set_link_state` and
/// script connection failures through `script_connect_failures`.
pub struct MockTransport {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    subscriptions: Arc<Mutex<Vec<(String, QosLevel)>>>,
    fail_publish: AtomicBool,
    connect_failures: AtomicU32,
    connect_attempts: AtomicU32,
    state_tx: watch::Sender<LinkState>,
    state_rx: watch::Receiver<LinkState>,
    control_sender: StdMutex<Option<mpsc::Sender<ControlMessage>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(LinkState::Connected);
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            fail_publish: AtomicBool::new(false),
            connect_failures: AtomicU32::new(0),
            connect_attempts: AtomicU32::new(0),
            state_tx,
            state_rx,
            control_sender: StdMutex::new(None),
        }
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub async fn subscriptions(&self) -> Vec<(String, QosLevel)> {
        self.subscriptions.lock().await.clone()
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` connection attempts
    pub fn script_connect_failures(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn set_link_state(&self, state: LinkState) {
        let _ = self.state_tx.send(state);
    }

    /// Deliver a control message as if it arrived on the control topic
    pub async fn inject_control(&self, message: ControlMessage) {
        let sender = self
            .control_sender
            .lock()
            .expect("control sender lock poisoned")
            .clone();
        if let Some(sender) = sender {
            sender.send(message).await.expect("control channel closed");
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            let _ = self
                .state_tx
                .send(LinkState::Disconnected("scripted failure".to_string()));
            return Err(MqttError::ConnectionFailed("scripted failure".to_string()));
        }
        let _ = self.state_tx.send(LinkState::Connected);
        Ok(())
    }

    async fn ensure_connected(&mut self) -> Result<(), Self::Error> {
        if matches!(*self.state_rx.borrow(), LinkState::Connected) {
            return Ok(());
        }
        self.connect().await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        let _ = self
            .state_tx
            .send(LinkState::Disconnected("client disconnected".to_string()));
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MqttError::PublishFailed(
                "mock publish failure".to_string().into(),
            ));
        }
        self.published.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: QosLevel) -> Result<(), Self::Error> {
        self.subscriptions
            .lock()
            .await
            .push((topic.to_string(), qos));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(*self.state_rx.borrow(), LinkState::Connected)
    }

    fn link_state(&self) -> Option<LinkState> {
        Some(self.state_rx.borrow().clone())
    }

    fn link_watch(&self) -> Option<watch::Receiver<LinkState>> {
        Some(self.state_rx.clone())
    }

    fn is_failed(&self) -> bool {
        matches!(*self.state_rx.borrow(), LinkState::Failed(_))
    }

    fn set_control_sender(&self, sender: mpsc::Sender<ControlMessage>) {
        *self
            .control_sender
            .lock()
            .expect("control sender lock poisoned") = Some(sender);
    }
}

/// Chunk source backed by an in-memory image with scripted failures
pub struct ScriptedChunkSource {
    image: Vec<u8>,
    transient_failures: StdMutex<HashMap<u64, u32>>,
    fetch_count: AtomicU32,
}

impl ScriptedChunkSource {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            transient_failures: StdMutex::new(HashMap::new()),
            fetch_count: AtomicU32::new(0),
        }
    }

    /// Inject `count` transient failures for fetches at `offset`
    pub fn fail_transiently_at(&self, offset: u64, count: u32) {
        self.transient_failures
            .lock()
            .expect("failure map lock poisoned")
            .insert(offset, count);
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkSource for ScriptedChunkSource {
    async fn fetch(&self, _source: &str, offset: u64, len: usize) -> Result<Bytes, SourceError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self
                .transient_failures
                .lock()
                .expect("failure map lock poisoned");
            if let Some(remaining) = failures.get_mut(&offset) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SourceError::Transient(format!(
                        "scripted link drop at offset {offset}"
                    )));
                }
            }
        }

        let start = offset as usize;
        let end = start + len;
        if end > self.image.len() {
            return Err(SourceError::Protocol(format!(
                "range {start}..{end} beyond image of {} bytes",
                self.image.len()
            )));
        }
        Ok(Bytes::copy_from_slice(&self.image[start..end]))
    }
}

/// Shared state of a [`MemorySink`], inspectable after the sink moves into
/// the coordinator
#[derive(Debug, Default)]
pub struct SinkState {
    pub data: Vec<u8>,
    pub committed: Option<Vec<u8>>,
    pub commit_count: u32,
    pub aborted: bool,
}

/// In-memory staging sink
pub struct MemorySink {
    state: Arc<StdMutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(StdMutex::new(SinkState::default())),
        }
    }

    pub fn state(&self) -> Arc<StdMutex<SinkState>> {
        self.state.clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSink for MemorySink {
    async fn write_range(&mut self, offset: u64, data: &[u8]) -> OtaResult<()> {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        let end = offset as usize + data.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    async fn commit(&mut self, total_len: u64) -> OtaResult<()> {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        if state.data.len() as u64 != total_len {
            return Err(OtaError::protocol(format!(
                "staged {} bytes but image declares {total_len}",
                state.data.len()
            )));
        }
        let staged = state.data.clone();
        state.committed = Some(staged);
        state.commit_count += 1;
        Ok(())
    }

    async fn abort(&mut self) -> OtaResult<()> {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        state.data.clear();
        state.aborted = true;
        Ok(())
    }
}

/// Verifier that rejects everything, for failure-path tests
pub struct RejectingVerifier;

#[async_trait]
impl ImageVerifier for RejectingVerifier {
    async fn verify(&self, _descriptor: &ImageDescriptor, _staged_len: u64) -> OtaResult<()> {
        Err(OtaError::verification("digest mismatch"))
    }
}
