//! Capture chunk accumulation
//!
//! The gateway delivers captured audio as ordered chunks. A [`ChunkBuffer`]
//! collects them append-only for the lifetime of one recording and assembles
//! the final clip exactly once via [`ChunkBuffer::finalize`].

use std::fmt;

/// Base MIME type of raw 16-bit little-endian PCM produced by the recorder.
pub const PCM_MIME: &str = "audio/L16";

/// Sample layout of a raw PCM capture, carried in the MIME parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    /// Format as `audio/L16;rate=48000;channels=1`.
    pub fn mime(&self) -> String {
        format!(
            "{};rate={};channels={}",
            PCM_MIME, self.sample_rate, self.channels
        )
    }

    /// Parse a raw PCM MIME type. Returns `None` for anything that isn't
    /// `audio/L16` with a usable `rate` parameter.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mut parts = mime.split(';').map(str::trim);
        let base = parts.next()?;
        if !base.eq_ignore_ascii_case(PCM_MIME) {
            return None;
        }

        let mut sample_rate = None;
        let mut channels = 1u16;
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => sample_rate = value.trim().parse().ok(),
                "channels" => channels = value.trim().parse().ok()?,
                _ => {}
            }
        }

        match sample_rate {
            Some(rate) if rate > 0 && channels > 0 => Some(Self {
                sample_rate: rate,
                channels,
            }),
            _ => None,
        }
    }
}

/// One delivery from the capture device.
#[derive(Clone, PartialEq, Eq)]
pub struct CaptureChunk {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl CaptureChunk {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }
}

impl fmt::Debug for CaptureChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureChunk")
            .field("len", &self.bytes.len())
            .field("mime", &self.mime)
            .finish()
    }
}

/// An assembled, encoded clip: opaque bytes plus their declared MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl EncodedAudio {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type without parameters (`audio/L16;rate=48000` -> `audio/L16`).
    pub fn base_mime(&self) -> &str {
        self.mime.split(';').next().unwrap_or("").trim()
    }
}

impl fmt::Debug for EncodedAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedAudio")
            .field("len", &self.bytes.len())
            .field("mime", &self.mime)
            .finish()
    }
}

/// Append-only chunk collection for a single recording.
#[derive(Debug, Clone, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    mime: Option<String>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk in arrival order. Empty chunks are skipped; the first
    /// non-empty chunk fixes the MIME type of the whole clip.
    pub fn push(&mut self, chunk: CaptureChunk) {
        if chunk.bytes.is_empty() {
            return;
        }
        if self.mime.is_none() {
            self.mime = Some(chunk.mime);
        }
        self.total_bytes += chunk.bytes.len();
        self.chunks.push(chunk.bytes);
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Concatenate all chunks. Returns `None` when nothing was captured.
    pub fn finalize(self) -> Option<EncodedAudio> {
        let mime = self.mime?;
        let mut bytes = Vec::with_capacity(self.total_bytes);
        for chunk in self.chunks {
            bytes.extend_from_slice(&chunk);
        }
        Some(EncodedAudio { bytes, mime })
    }
}
