//! Waveform layout and drawing
//!
//! [`plot`] turns decoded audio plus the selected clip into bars and markers in
//! canvas coordinates; [`render`] paints that plot. Neither touches the audio
//! or the range.

use crate::clip::ClipRange;

use super::canvas::{Canvas, Rgba};
use super::decode::DecodedAudio;
use super::peaks::peak_envelope;

/// Colours used to paint a waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformStyle {
    pub background: Rgba,
    pub wave: Rgba,
    pub start_marker: Rgba,
    pub end_marker: Rgba,
    pub marker_width: f32,
}

impl Default for WaveformStyle {
    fn default() -> Self {
        Self {
            background: Rgba::opaque(0xf4, 0xf6, 0xf8),
            wave: Rgba::opaque(0x4a, 0x6f, 0xa5),
            start_marker: Rgba::opaque(0x2e, 0xa0, 0x43),
            end_marker: Rgba::opaque(0xd7, 0x3a, 0x49),
            marker_width: 2.0,
        }
    }
}

/// One 1px-wide column of the envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub top: f32,
    pub height: f32,
    /// Source samples summarised by this bar
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
}

/// A clip boundary at horizontal position `x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub x: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveformPlot {
    pub width: u32,
    pub height: u32,
    pub bars: Vec<Bar>,
    pub start: Marker,
    pub end: Marker,
}

/// Lay out the envelope and clip markers for a `width × height` canvas.
pub fn plot(decoded: &DecodedAudio, range: &ClipRange, width: u32, height: u32) -> WaveformPlot {
    let h = height as f32;
    let bars = peak_envelope(decoded.samples(), width as usize)
        .into_iter()
        .enumerate()
        .map(|(i, peak)| {
            let bottom = (1.0 + peak.max) * h / 2.0;
            // A flat bucket at full scale would otherwise start below the canvas
            let top = ((1.0 + peak.min) * h / 2.0).min((h - 1.0).max(0.0));
            Bar {
                x: i as f32,
                top,
                // Flat buckets still get a visible line
                height: (bottom - top).max(1.0),
                samples: peak.samples,
            }
        })
        .collect();

    let duration = decoded.duration_secs();
    let marker_x = |seconds: f64| -> f32 {
        if duration > 0.0 {
            ((seconds / duration) * width as f64) as f32
        } else {
            0.0
        }
    };

    WaveformPlot {
        width,
        height,
        bars,
        start: Marker {
            kind: MarkerKind::Start,
            x: marker_x(range.start),
        },
        end: Marker {
            kind: MarkerKind::End,
            x: marker_x(range.end),
        },
    }
}

/// Paint the waveform and both markers onto `canvas`, replacing its contents.
pub fn render<C: Canvas + ?Sized>(
    decoded: &DecodedAudio,
    range: &ClipRange,
    canvas: &mut C,
    style: &WaveformStyle,
) -> WaveformPlot {
    let plot = plot(decoded, range, canvas.width(), canvas.height());

    canvas.clear(style.background);
    for bar in &plot.bars {
        canvas.fill_rect(bar.x, bar.top, 1.0, bar.height, style.wave);
    }

    let (start_x, end_x) = marker_columns(&plot, style.marker_width);
    let h = plot.height as f32;
    canvas.fill_rect(start_x, 0.0, style.marker_width, h, style.start_marker);
    canvas.fill_rect(end_x, 0.0, style.marker_width, h, style.end_marker);

    plot
}

/// Left edges of the start and end marker strokes.
///
/// Both stay inside the canvas, and the end stroke sits right of the start
/// stroke, so a zero-width clip still shows both colours side by side.
fn marker_columns(plot: &WaveformPlot, marker_width: f32) -> (f32, f32) {
    let max_x = (plot.width as f32 - marker_width).max(0.0);
    let mut start = plot.start.x.clamp(0.0, max_x);
    let mut end = plot.end.x.clamp(0.0, max_x);

    if end < start + marker_width {
        if start + marker_width <= max_x {
            end = start + marker_width;
        } else {
            end = max_x;
            start = (max_x - marker_width).max(0.0);
        }
    }
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::canvas::PixmapCanvas;

    fn ramp(n: usize, sample_rate: u32) -> DecodedAudio {
        let samples = (0..n)
            .map(|i| (i as f32 / n as f32) * 2.0 - 1.0)
            .collect();
        DecodedAudio::from_samples(samples, sample_rate, 1).unwrap()
    }

    #[test]
    fn one_bar_per_column() {
        let audio = ramp(10_007, 1_000);
        let plot = plot(&audio, &ClipRange::full(audio.duration_secs()), 300, 80);
        assert_eq!(plot.bars.len(), 300);
        assert_eq!(plot.bars.iter().map(|b| b.samples).sum::<usize>(), 10_007);
    }

    #[test]
    fn silent_bars_are_at_least_one_pixel() {
        let audio = DecodedAudio::from_samples(vec![0.0; 400], 100, 1).unwrap();
        let plot = plot(&audio, &ClipRange::full(4.0), 40, 100);
        for bar in &plot.bars {
            assert_eq!(bar.top, 50.0);
            assert_eq!(bar.height, 1.0);
        }
    }

    #[test]
    fn flat_bucket_at_full_scale_stays_on_canvas() {
        let audio = DecodedAudio::from_samples(vec![1.0; 400], 100, 1).unwrap();
        let style = WaveformStyle::default();
        let mut canvas = PixmapCanvas::new(40, 20).unwrap();
        let plot = render(&audio, &ClipRange { start: 0.0, end: 0.5 }, &mut canvas, &style);

        assert_eq!(plot.bars[20].top, 19.0);
        assert_eq!(plot.bars[20].height, 1.0);
        assert_eq!(canvas.pixel(20, 19), Some(style.wave));
    }

    #[test]
    fn bar_spans_min_to_max() {
        let audio = DecodedAudio::from_samples(vec![-1.0, 1.0], 2, 1).unwrap();
        let plot = plot(&audio, &ClipRange::full(1.0), 1, 100);
        assert_eq!(plot.bars[0].top, 0.0);
        assert_eq!(plot.bars[0].height, 100.0);
    }

    #[test]
    fn markers_follow_range() {
        let audio = ramp(10_000, 1_000); // 10 seconds
        let range = ClipRange { start: 2.5, end: 5.0 };
        let plot = plot(&audio, &range, 200, 50);
        assert_eq!(plot.start.x, 50.0);
        assert_eq!(plot.end.x, 100.0);
        assert_eq!(plot.start.kind, MarkerKind::Start);
        assert_eq!(plot.end.kind, MarkerKind::End);
    }

    #[test]
    fn render_is_pixel_identical_when_repeated() {
        let audio = ramp(5_000, 500);
        let range = ClipRange { start: 1.0, end: 7.5 };
        let style = WaveformStyle::default();

        let mut first = PixmapCanvas::new(120, 40).unwrap();
        let mut second = PixmapCanvas::new(120, 40).unwrap();
        render(&audio, &range, &mut first, &style);
        render(&audio, &range, &mut second, &style);
        assert_eq!(first.pixels(), second.pixels());

        // Drawing again over an existing frame gives the same frame
        render(&audio, &range, &mut first, &style);
        assert_eq!(first.pixels(), second.pixels());
    }

    #[test]
    fn zero_width_clip_shows_both_markers() {
        let audio = DecodedAudio::from_samples(vec![0.0; 100], 10, 1).unwrap();
        let style = WaveformStyle::default();

        // Middle of the canvas: end stroke sits just right of the start stroke
        let mut canvas = PixmapCanvas::new(50, 20).unwrap();
        render(&audio, &ClipRange { start: 5.0, end: 5.0 }, &mut canvas, &style);
        assert_eq!(canvas.pixel(25, 0), Some(style.start_marker));
        assert_eq!(canvas.pixel(26, 0), Some(style.start_marker));
        assert_eq!(canvas.pixel(27, 0), Some(style.end_marker));

        // At the right edge the start stroke moves left instead
        let mut canvas = PixmapCanvas::new(50, 20).unwrap();
        render(&audio, &ClipRange { start: 10.0, end: 10.0 }, &mut canvas, &style);
        assert_eq!(canvas.pixel(46, 0), Some(style.start_marker));
        assert_eq!(canvas.pixel(49, 0), Some(style.end_marker));
    }

    #[test]
    fn end_marker_at_full_width_is_visible() {
        let audio = DecodedAudio::from_samples(vec![0.0; 100], 10, 1).unwrap();
        let style = WaveformStyle::default();
        let mut canvas = PixmapCanvas::new(50, 20).unwrap();
        let plot = render(&audio, &ClipRange::full(10.0), &mut canvas, &style);

        assert_eq!(plot.end.x, 50.0);
        assert_eq!(canvas.pixel(49, 0), Some(style.end_marker));
        assert_eq!(canvas.pixel(0, 0), Some(style.start_marker));
    }
}
