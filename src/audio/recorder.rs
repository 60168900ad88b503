//! Microphone capture using CPAL
//!
//! [`CpalGateway`] implements [`CaptureGateway`] over the default input
//! device. cpal streams are not `Send`, so every capture runs on its own
//! audio thread which owns the stream and the chunk sink; stopping the
//! capture joins that thread, which drops both and releases the device.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

use super::chunks::{CaptureChunk, PcmFormat};
use super::gateway::{CaptureError, CaptureGateway, ChunkSender};

/// A granted input device: the device name plus the config we will open it with.
#[derive(Debug, Clone)]
pub struct CpalDevice {
    name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CpalDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.config.sample_rate.0,
            channels: self.config.channels,
        }
    }
}

/// A running capture. Dropping it without `stop_capture` still stops the stream.
pub struct CpalCapture {
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    device_name: String,
}

impl CpalCapture {
    fn shutdown(&mut self) -> Result<(), CaptureError> {
        let _ = self.stop_tx.send(());
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| CaptureError::Stream("capture thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if self.thread.is_some() {
            log::warn!("Capture on {} dropped without stop", self.device_name);
            let _ = self.shutdown();
        }
    }
}

/// Capture gateway for the host's default input device.
#[derive(Debug, Default, Clone)]
pub struct CpalGateway;

impl CpalGateway {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureGateway for CpalGateway {
    type Device = CpalDevice;
    type Capture = CpalCapture;

    fn request_access(&self) -> Result<CpalDevice, CaptureError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported_config = device.default_input_config().map_err(|e| match e {
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                CaptureError::UnsupportedFormat
            }
            other => CaptureError::PermissionDenied(other.to_string()),
        })?;

        log::info!(
            "Microphone granted: {} ({} Hz, {} channels, {:?})",
            name,
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(CpalDevice {
            name,
            config,
            sample_format,
        })
    }

    fn start_capture(
        &self,
        device: CpalDevice,
        sink: ChunkSender,
    ) -> Result<CpalCapture, CaptureError> {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), CaptureError>>();
        let device_name = device.name.clone();

        let thread = std::thread::Builder::new()
            .name("panic-bell-capture".to_string())
            .spawn(move || run_capture_thread(device, sink, ready_tx, stop_rx))
            .map_err(|e| CaptureError::Stream(format!("Failed to spawn capture thread: {}", e)))?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(CaptureError::Stream(
                "capture thread exited before starting".to_string(),
            ))
        });

        if let Err(e) = ready {
            // The thread has already dropped the stream; reap it.
            let _ = thread.join();
            return Err(e);
        }

        log::info!("Capture started on {}", device_name);
        Ok(CpalCapture {
            stop_tx,
            thread: Some(thread),
            device_name,
        })
    }

    fn stop_capture(&self, mut capture: CpalCapture) -> Result<(), CaptureError> {
        let result = capture.shutdown();
        log::info!("Capture stopped, {} released", capture.device_name);
        result
    }

    fn release(&self, device: CpalDevice) {
        // No stream was opened for this device; nothing is held open.
        log::debug!("Released unused device {}", device.name);
    }
}

/// Body of the audio thread. Owns the stream until a stop signal arrives.
fn run_capture_thread(
    device: CpalDevice,
    sink: ChunkSender,
    ready_tx: std_mpsc::Sender<Result<(), CaptureError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match open_stream(&device, sink) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::Stream(format!(
            "Failed to start stream: {}",
            e
        ))));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Blocks until stop_capture or the capture handle is dropped.
    let _ = stop_rx.recv();

    if let Err(e) = stream.pause() {
        log::debug!("Pausing stream before drop failed: {}", e);
    }
    drop(stream);
}

fn find_device(name: &str) -> Option<Device> {
    let host = cpal::default_host();
    let by_name = host.input_devices().ok().and_then(|mut devices| {
        devices.find(|d| d.name().map(|n| n == name).unwrap_or(false))
    });
    by_name.or_else(|| host.default_input_device())
}

fn open_stream(device: &CpalDevice, sink: ChunkSender) -> Result<Stream, CaptureError> {
    let input = find_device(&device.name).ok_or(CaptureError::NoInputDevice)?;
    let mime = device.format().mime();

    match device.sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(&input, &device.config, sink, mime),
        SampleFormat::U16 => build_stream_typed::<u16>(&input, &device.config, sink, mime),
        SampleFormat::F32 => build_stream_typed::<f32>(&input, &device.config, sink, mime),
        _ => Err(CaptureError::UnsupportedFormat),
    }
}

fn build_stream_typed<T>(
    input: &Device,
    config: &StreamConfig,
    sink: ChunkSender,
    mime: String,
) -> Result<Stream, CaptureError>
where
    T: cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let err_sink = sink.clone();
    let err_fn = move |err: cpal::StreamError| {
        log::error!("Audio stream error: {}", err);
        let _ = err_sink.send(Err(stream_error(err)));
    };

    input
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if data.is_empty() {
                    return;
                }
                let mut bytes = Vec::with_capacity(data.len() * 2);
                for &sample in data {
                    bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
                }
                // Receiver gone means the session was torn down; drop quietly.
                let _ = sink.send(Ok(CaptureChunk::new(bytes, mime.clone())));
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))
}

/// A device that disappears mid-recording blocks the microphone like a
/// missing one; anything else is a plain stream failure.
fn stream_error(err: cpal::StreamError) -> CaptureError {
    match err {
        cpal::StreamError::DeviceNotAvailable => CaptureError::NoInputDevice,
        other => CaptureError::Stream(other.to_string()),
    }
}

/// Convert any sample type to i16 PCM.
fn sample_to_i16<T>(sample: T) -> i16
where
    f32: cpal::FromSample<T>,
{
    let f32_sample = <f32 as cpal::FromSample<T>>::from_sample_(sample);
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}
