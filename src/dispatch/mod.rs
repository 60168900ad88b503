//! Dispatch adapter
//!
//! Packages finished captures and song/event edits for the outside world and
//! hands them to a [`PanicTransport`], [`SongStore`] or [`EventStore`]. A
//! failed dispatch never consumes the clip or the edit, so callers can retry.

mod http;
mod records;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::audio::{pcm_to_wav, EncodedAudio, PcmFormat};

pub use http::HttpClient;
pub use records::{EventRecord, Library, SongFile, SongRecord};

/// Errors from talking to the transport or store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Connection, timeout or other transport-level failure
    #[error("Network error: {0}")]
    Network(String),
    /// The server answered with a non-success status
    #[error("Server rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The payload could not be packaged
    #[error("Failed to encode payload: {0}")]
    Encode(String),
    /// The server's answer could not be understood
    #[error("Failed to parse server response: {0}")]
    Decode(String),
    /// The server has no endpoint for this operation
    #[error("Server does not support {0}")]
    Unsupported(&'static str),
}

/// Opaque acknowledgement returned by a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Ack {
    pub message: String,
    pub filename: Option<String>,
    pub id: Option<String>,
}

/// Transport-agnostic panic clip.
#[derive(Clone, PartialEq, Eq)]
pub struct PanicPayload {
    pub audio: Vec<u8>,
    pub suggested_filename: String,
    pub mime_type: String,
}

impl std::fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicPayload")
            .field("len", &self.audio.len())
            .field("suggested_filename", &self.suggested_filename)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

const PANIC_FILE_STEM: &str = "panic_message";

impl PanicPayload {
    /// Package a recorded clip. Raw PCM is wrapped in WAV; anything already in
    /// a container is passed through untouched.
    pub fn from_capture(clip: &EncodedAudio) -> Result<Self, DispatchError> {
        if let Some(format) = PcmFormat::from_mime(&clip.mime) {
            let audio =
                pcm_to_wav(&clip.bytes, format).map_err(|e| DispatchError::Encode(e.to_string()))?;
            return Ok(Self {
                audio,
                suggested_filename: format!("{}.wav", PANIC_FILE_STEM),
                mime_type: "audio/wav".to_string(),
            });
        }

        let mime = clip.base_mime();
        Ok(Self {
            audio: clip.bytes.clone(),
            suggested_filename: format!("{}.{}", PANIC_FILE_STEM, extension_for_mime(mime)),
            mime_type: mime.to_string(),
        })
    }
}

/// File extension for common audio MIME types.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.to_ascii_lowercase().as_str() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/webm" => "webm",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/mp4" | "audio/aac" => "m4a",
        _ => "bin",
    }
}

/// Inverse of [`extension_for_mime`] for the formats the editor accepts.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

/// Delivers a panic clip to the playback side.
#[async_trait]
pub trait PanicTransport: Send + Sync {
    async fn send(&self, payload: PanicPayload) -> Result<Ack, DispatchError>;
}

/// Song library persistence.
#[async_trait]
pub trait SongStore: Send + Sync {
    async fn list(&self) -> Result<Vec<SongRecord>, DispatchError>;
    /// Save a song; `file` is `None` when only metadata changed.
    async fn save(
        &self,
        record: SongRecord,
        file: Option<SongFile>,
    ) -> Result<SongRecord, DispatchError>;
    async fn delete(&self, id: &str) -> Result<(), DispatchError>;
}

/// Scheduled event persistence.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list(&self) -> Result<Vec<EventRecord>, DispatchError>;
    async fn save(&self, record: EventRecord) -> Result<EventRecord, DispatchError>;
    async fn delete(&self, id: &str) -> Result<(), DispatchError>;
}

/// Packages recorded clips and sends them through a [`PanicTransport`].
#[derive(Clone)]
pub struct PanicDispatcher {
    transport: Arc<dyn PanicTransport>,
}

impl PanicDispatcher {
    pub fn new(transport: Arc<dyn PanicTransport>) -> Self {
        Self { transport }
    }

    /// Send a clip. The clip is borrowed, so a failure leaves it with the caller.
    pub async fn send(&self, clip: &EncodedAudio) -> Result<Ack, DispatchError> {
        let payload = PanicPayload::from_capture(clip)?;
        log::info!(
            "Dispatching panic clip {} ({} bytes, {})",
            payload.suggested_filename,
            payload.audio.len(),
            payload.mime_type
        );

        match self.transport.send(payload).await {
            Ok(ack) => {
                log::info!("Panic clip delivered: {}", ack.message);
                Ok(ack)
            }
            Err(e) => {
                log::error!("Panic dispatch failed: {}", e);
                Err(e)
            }
        }
    }
}
