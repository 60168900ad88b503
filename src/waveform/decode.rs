//! Audio file decoding via symphonia
//!
//! Produces a [`DecodedAudio`] holding the first channel of the default track
//! as `f32` amplitudes in `[-1, 1]`.

use std::io::Cursor;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio_util::sync::CancellationToken;

/// Errors from decoding a source file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Unsupported audio format: {0}")]
    Unsupported(String),
    #[error("No audio track found")]
    NoTrack,
    #[error("Malformed audio data: {0}")]
    Malformed(String),
    #[error("Audio file contains no samples")]
    Empty,
    #[error("Decode cancelled")]
    Cancelled,
}

/// A fully decoded source file. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
    duration_secs: f64,
}

impl DecodedAudio {
    /// Build from mono samples. Amplitudes are clamped to `[-1, 1]`.
    pub fn from_samples(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, DecodeError> {
        if samples.is_empty() || sample_rate == 0 {
            return Err(DecodeError::Empty);
        }
        let samples: Arc<[f32]> = samples
            .into_iter()
            .map(|s| if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) })
            .collect();
        let duration_secs = samples.len() as f64 / sample_rate as f64;

        Ok(Self {
            samples,
            sample_rate,
            channels: channels.max(1),
            duration_secs,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the source; only the first channel is kept.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

/// Decode a complete file held in memory.
///
/// `hint` is a file extension (`"mp3"`, `"wav"`) used to speed up probing.
pub fn decode(bytes: Vec<u8>, hint: Option<&str>) -> Result<DecodedAudio, DecodeError> {
    decode_inner(bytes, hint, None)
}

/// Same as [`decode`], but stops between packets once `cancel` fires.
pub fn decode_cancellable(
    bytes: Vec<u8>,
    hint: Option<&str>,
    cancel: &CancellationToken,
) -> Result<DecodedAudio, DecodeError> {
    decode_inner(bytes, hint, Some(cancel))
}

fn decode_inner(
    bytes: Vec<u8>,
    hint_ext: Option<&str>,
    cancel: Option<&CancellationToken>,
) -> Result<DecodedAudio, DecodeError> {
    let byte_len = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = hint_ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
    let mut reader = probed.format;

    let track = reader
        .default_track()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .or_else(|| {
            reader
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        })
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    log::debug!(
        "Decoding {} bytes (hint={:?}, codec={:?})",
        byte_len,
        hint_ext,
        track.codec_params.codec
    );

    let mut samples: Vec<f32> = Vec::new();

    loop {
        if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
            return Err(DecodeError::Cancelled);
        }

        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        let stride = usize::from(channels.max(1));
        samples.extend(buffer.samples().iter().step_by(stride));
    }

    let audio = DecodedAudio::from_samples(samples, sample_rate, channels)?;
    log::info!(
        "Decoded {:.2}s of audio ({} samples @ {} Hz, {} channel(s))",
        audio.duration_secs(),
        audio.sample_count(),
        audio.sample_rate(),
        audio.channels()
    );
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wav(seconds: f32, sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (seconds * sample_rate as f32) as usize;
            for i in 0..frames {
                let v = ((i as f32 / 20.0).sin() * 12_000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(v).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_wav_duration_and_first_channel() {
        let audio = decode(sine_wav(0.5, 8_000, 2), Some("wav")).unwrap();
        assert_eq!(audio.sample_rate(), 8_000);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.sample_count(), 4_000);
        assert!((audio.duration_secs() - 0.5).abs() < 1e-9);
        assert!(audio.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode(b"definitely not audio".to_vec(), None).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));
    }

    #[test]
    fn cancelled_token_stops_decode() {
        let token = CancellationToken::new();
        token.cancel();
        let err = decode_cancellable(sine_wav(0.1, 8_000, 1), Some("wav"), &token).unwrap_err();
        assert_eq!(err, DecodeError::Cancelled);
    }

    #[test]
    fn from_samples_clamps_and_rejects_empty() {
        let audio = DecodedAudio::from_samples(vec![2.0, -3.0, 0.5], 3, 1).unwrap();
        assert_eq!(audio.samples(), &[1.0, -1.0, 0.5]);
        assert!((audio.duration_secs() - 1.0).abs() < 1e-9);

        assert_eq!(
            DecodedAudio::from_samples(Vec::new(), 44_100, 1),
            Err(DecodeError::Empty)
        );
    }
}
