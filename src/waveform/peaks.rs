//! Peak-envelope downsampling
//!
//! Splits a sample buffer into one bucket per pixel column and keeps the
//! minimum and maximum amplitude of each bucket.

/// Min/max summary of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
    /// Number of source samples the bucket covers
    pub samples: usize,
}

impl Peak {
    /// A bucket that covers no samples; drawn as silence.
    pub const SILENT: Peak = Peak {
        min: 0.0,
        max: 0.0,
        samples: 0,
    };
}

/// Samples per bucket: `ceil(sample_count / buckets)`.
pub fn bucket_size(sample_count: usize, buckets: usize) -> usize {
    if buckets == 0 {
        return 0;
    }
    sample_count.div_ceil(buckets)
}

/// Compute exactly `buckets` peaks over `samples`.
///
/// Every bucket but the last non-empty one covers `bucket_size` samples; if the
/// buffer is shorter than `buckets * bucket_size`, trailing buckets are
/// [`Peak::SILENT`]. Each sample is counted exactly once.
pub fn peak_envelope(samples: &[f32], buckets: usize) -> Vec<Peak> {
    let mut peaks = Vec::with_capacity(buckets);
    let size = bucket_size(samples.len(), buckets);

    if size > 0 {
        for chunk in samples.chunks(size) {
            let (min, max) = chunk
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| {
                    (lo.min(s), hi.max(s))
                });
            peaks.push(Peak {
                min,
                max,
                samples: chunk.len(),
            });
        }
    }

    peaks.resize(buckets, Peak::SILENT);
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_one_peak_per_bucket() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 50.0).sin()).collect();
        for width in [1, 7, 100, 999, 1000, 1500] {
            assert_eq!(peak_envelope(&samples, width).len(), width);
        }
    }

    #[test]
    fn coverage_accounts_for_every_sample() {
        let n = 1003;
        let w = 10;
        let samples = vec![0.25f32; n];
        let peaks = peak_envelope(&samples, w);
        let size = bucket_size(n, w);

        assert_eq!(size, 101);
        assert!(peaks.iter().all(|p| p.samples <= size));
        assert_eq!(peaks[w - 1].samples, n - (w - 1) * size);
        assert_eq!(peaks.iter().map(|p| p.samples).sum::<usize>(), n);
    }

    #[test]
    fn buckets_track_min_and_max() {
        let samples = [0.1, -0.5, 0.9, 0.0, -0.2, 0.3];
        let peaks = peak_envelope(&samples, 2);
        assert_eq!(peaks[0], Peak { min: -0.5, max: 0.9, samples: 3 });
        assert_eq!(peaks[1], Peak { min: -0.2, max: 0.3, samples: 3 });
    }

    #[test]
    fn short_buffers_pad_with_silence() {
        let peaks = peak_envelope(&[0.5, 0.5, 0.5], 8);
        assert_eq!(peaks.len(), 8);
        assert_eq!(peaks.iter().map(|p| p.samples).sum::<usize>(), 3);
        assert_eq!(peaks[7], Peak::SILENT);
    }

    #[test]
    fn zero_buckets_is_empty() {
        assert!(peak_envelope(&[0.1, 0.2], 0).is_empty());
        assert!(peak_envelope(&[], 4).iter().all(|p| *p == Peak::SILENT));
    }
}
