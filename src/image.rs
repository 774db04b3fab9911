//! Image retrieval, verification and staging boundaries
//!
//! The coordinator only ever talks to these traits. The chunk source
//! resolves a job's source locator into byte ranges; the sink is the
//! flashing collaborator that owns the staging region; the verifier decides
//! whether a fully downloaded image may be committed. Cryptographic
//! verification internals and the bootloader's slot-swap logic live behind
//! these seams, outside this crate.

use crate::error::{OtaError, OtaResult};
use crate::protocol::messages::ImageDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Errors from a chunk source, split by recoverability
///
/// Transient failures defer to the reconnection controller and are retried
/// at the same offset; protocol failures abort the job.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transient source failure: {0}")]
    Transient(String),
    #[error("source protocol violation: {0}")]
    Protocol(String),
}

/// Byte-range access to a firmware image
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Fetch exactly `len` bytes at `offset` from the image behind `source`
    async fn fetch(&self, source: &str, offset: u64, len: usize) -> Result<Bytes, SourceError>;
}

/// The flashing collaborator: accepts verified byte ranges and a final
/// commit. Until `commit` returns Ok the staged data must never look like a
/// complete image to the bootloader.
#[async_trait]
pub trait ImageSink: Send + Sync {
    async fn write_range(&mut self, offset: u64, data: &[u8]) -> OtaResult<()>;

    /// Make the staged image visible to the bootloader, atomically
    async fn commit(&mut self, total_len: u64) -> OtaResult<()>;

    /// Discard partially staged data
    async fn abort(&mut self) -> OtaResult<()>;
}

/// Integrity/authenticity gate run after download, before staging commit
#[async_trait]
pub trait ImageVerifier: Send + Sync {
    async fn verify(&self, descriptor: &ImageDescriptor, staged_len: u64) -> OtaResult<()>;
}

/// HTTP(S) chunk source using ranged GETs
///
/// Job documents carry an image URL; each download step turns into one
/// `Range` request so an interrupted transfer resumes at the exact offset.
pub struct HttpChunkSource {
    client: reqwest::Client,
}

impl HttpChunkSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpChunkSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn fetch(&self, source: &str, offset: u64, len: usize) -> Result<Bytes, SourceError> {
        let end = offset + len as u64 - 1;
        let response = self
            .client
            .get(source)
            .header(reqwest::header::RANGE, format!("bytes={offset}-{end}"))
            .send()
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SourceError::Transient(format!(
                "image server returned {status}"
            )));
        }
        if status != reqwest::StatusCode::PARTIAL_CONTENT {
            // A 200 means the server ignored the range header; accepting it
            // would restart the transfer from zero on every step.
            return Err(SourceError::Protocol(format!(
                "expected 206 Partial Content, got {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))?;

        if body.len() != len {
            return Err(SourceError::Protocol(format!(
                "range {offset}-{end} returned {} bytes, expected {len}",
                body.len()
            )));
        }

        Ok(body)
    }
}

/// File-backed staging sink
///
/// Writes land in a `.partial` sibling; `commit` fsyncs and renames it to
/// the final path. The bootloader only ever looks at the final path, so a
/// torn download can never be mistaken for a complete image.
pub struct FileImageSink {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl FileImageSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn partial_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".partial");
        PathBuf::from(name)
    }

    async fn open_partial(&mut self) -> OtaResult<&mut tokio::fs::File> {
        if self.file.is_none() {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(self.partial_path())
                .await
                .map_err(|e| OtaError::protocol(format!("cannot open staging file: {e}")))?;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().expect("staging file just opened"))
    }
}

#[async_trait]
impl ImageSink for FileImageSink {
    async fn write_range(&mut self, offset: u64, data: &[u8]) -> OtaResult<()> {
        let file = self.open_partial().await?;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| OtaError::protocol(format!("staging seek failed: {e}")))?;
        file.write_all(data)
            .await
            .map_err(|e| OtaError::protocol(format!("staging write failed: {e}")))?;
        Ok(())
    }

    async fn commit(&mut self, total_len: u64) -> OtaResult<()> {
        let file = self.open_partial().await?;
        file.flush()
            .await
            .map_err(|e| OtaError::protocol(format!("staging flush failed: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| OtaError::protocol(format!("staging sync failed: {e}")))?;

        let written = file
            .metadata()
            .await
            .map_err(|e| OtaError::protocol(format!("staging metadata failed: {e}")))?
            .len();
        if written != total_len {
            return Err(OtaError::protocol(format!(
                "staged {written} bytes but image declares {total_len}"
            )));
        }

        self.file = None;
        tokio::fs::rename(self.partial_path(), &self.path)
            .await
            .map_err(|e| OtaError::protocol(format!("staging commit failed: {e}")))?;

        info!(path = %self.path.display(), "Staged image committed");
        Ok(())
    }

    async fn abort(&mut self) -> OtaResult<()> {
        self.file = None;
        match tokio::fs::remove_file(self.partial_path()).await {
            Ok(()) => debug!("Discarded partial staging file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial staging file: {}", e),
        }
        Ok(())
    }
}

/// Structural verifier: confirms the staged length matches the descriptor
/// and that a checksum reference is present for the bootloader to check.
/// Cryptographic digest validation belongs to the boot-time verifier, which
/// owns the key material.
pub struct LengthVerifier;

#[async_trait]
impl ImageVerifier for LengthVerifier {
    async fn verify(&self, descriptor: &ImageDescriptor, staged_len: u64) -> OtaResult<()> {
        if descriptor.checksum.is_empty() {
            return Err(OtaError::verification(
                "image descriptor carries no checksum reference",
            ));
        }
        if staged_len != descriptor.size_bytes {
            return Err(OtaError::verification(format!(
                "staged {staged_len} bytes but descriptor declares {}",
                descriptor.size_bytes
            )));
        }
        Ok(())
    }
}

/// Staging path helper used by the binary
pub fn staging_path_for(dir: &Path, device_id: &str) -> PathBuf {
    dir.join(format!("{device_id}-firmware.bin"))
}
