//! Audio capture module for Panic Bell
//!
//! This module handles microphone access, chunked capture and packaging of
//! the finished clip. Uses CPAL for capture and hound for WAV encoding.

mod chunks;
pub mod gateway;
pub mod recorder;
mod wav;

pub use chunks::{CaptureChunk, ChunkBuffer, EncodedAudio, PcmFormat, PCM_MIME};
pub use gateway::{probe_access, CaptureError, CaptureGateway, CaptureItem, ChunkReceiver, ChunkSender};
pub use recorder::{CpalCapture, CpalDevice, CpalGateway};
pub use wav::pcm_to_wav;
