//! Capture device gateway
//!
//! The seam between the recording state machine and the physical microphone.
//! A gateway grants a device, turns it into a running capture that pushes
//! [`CaptureChunk`]s into a sink, and releases it again. A capture that dies
//! while running pushes an `Err` into the same sink, or simply drops it.

use tokio::sync::mpsc;

use super::chunks::CaptureChunk;

/// What a running capture produces: audio, or the error that ended it.
pub type CaptureItem = Result<CaptureChunk, CaptureError>;

/// Sink the gateway pushes captured chunks into, in capture order.
pub type ChunkSender = mpsc::UnboundedSender<CaptureItem>;
pub type ChunkReceiver = mpsc::UnboundedReceiver<CaptureItem>;

/// Errors that can occur while acquiring or running the microphone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("No audio input device found")]
    NoInputDevice,
    #[error("No supported audio configuration")]
    UnsupportedFormat,
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("Recording produced no audio")]
    EmptyRecording,
}

impl CaptureError {
    /// True when the microphone itself is unusable, which blocks recording
    /// until a later access check succeeds.
    pub fn blocks_microphone(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied(_) | CaptureError::NoInputDevice
        )
    }
}

/// Access to a microphone.
///
/// Contract:
/// - `start_capture` consumes the granted device. If it fails, the device has
///   already been released.
/// - `stop_capture` always releases the device, even when it returns an error,
///   and drops the sink before returning so no chunk arrives afterwards.
/// - `release` gives back a granted device that never started capturing.
/// - A running capture reports device loss by sending `Err` into the sink or
///   by dropping the sink. The caller still calls `stop_capture` afterwards.
///
/// Calls may block (permission prompts, device threads); callers run them on
/// the blocking pool.
pub trait CaptureGateway: Send + Sync + 'static {
    type Device: Send + 'static;
    type Capture: Send + 'static;

    fn request_access(&self) -> Result<Self::Device, CaptureError>;

    fn start_capture(
        &self,
        device: Self::Device,
        sink: ChunkSender,
    ) -> Result<Self::Capture, CaptureError>;

    fn stop_capture(&self, capture: Self::Capture) -> Result<(), CaptureError>;

    fn release(&self, device: Self::Device);
}

/// Request access and immediately give the device back.
pub fn probe_access<G: CaptureGateway + ?Sized>(gateway: &G) -> Result<(), CaptureError> {
    let device = gateway.request_access()?;
    gateway.release(device);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGateway {
        deny: bool,
        released: AtomicUsize,
    }

    impl CaptureGateway for CountingGateway {
        type Device = ();
        type Capture = ();

        fn request_access(&self) -> Result<(), CaptureError> {
            if self.deny {
                Err(CaptureError::PermissionDenied("blocked".into()))
            } else {
                Ok(())
            }
        }

        fn start_capture(&self, _device: (), _sink: ChunkSender) -> Result<(), CaptureError> {
            Ok(())
        }

        fn stop_capture(&self, _capture: ()) -> Result<(), CaptureError> {
            Ok(())
        }

        fn release(&self, _device: ()) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn probe_releases_granted_device() {
        let gateway = CountingGateway {
            deny: false,
            released: AtomicUsize::new(0),
        };
        assert!(probe_access(&gateway).is_ok());
        assert_eq!(gateway.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn probe_reports_denial_without_release() {
        let gateway = CountingGateway {
            deny: true,
            released: AtomicUsize::new(0),
        };
        let err = probe_access(&gateway).unwrap_err();
        assert!(err.blocks_microphone());
        assert_eq!(gateway.released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stream_errors_do_not_block_microphone() {
        assert!(!CaptureError::Stream("xrun".into()).blocks_microphone());
        assert!(CaptureError::NoInputDevice.blocks_microphone());
    }
}
