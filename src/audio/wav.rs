//! WAV packaging for raw PCM captures

use std::io::Cursor;

use hound::{WavSpec, WavWriter};

use super::chunks::PcmFormat;

/// Wrap 16-bit little-endian PCM bytes in a WAV container.
///
/// A trailing odd byte (half a sample) is dropped.
pub fn pcm_to_wav(pcm: &[u8], format: PcmFormat) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_preserves_sample_count() {
        let samples: Vec<i16> = (0..480).map(|i| (i * 10) as i16).collect();
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let format = PcmFormat {
            sample_rate: 48_000,
            channels: 1,
        };

        let wav = pcm_to_wav(&pcm, format).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.len(), 480);

        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let format = PcmFormat {
            sample_rate: 8_000,
            channels: 1,
        };
        let wav = pcm_to_wav(&[1, 0, 2, 0, 9], format).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 2);
    }
}
