//! Waveform decoding and visualization
//!
//! Source files are decoded with symphonia, summarised as a per-column
//! min/max envelope and painted with the clip markers on top.

pub mod canvas;
mod decode;
mod peaks;
mod render;

pub use canvas::{Canvas, PixmapCanvas, Rgba};
pub use decode::{decode, decode_cancellable, DecodeError, DecodedAudio};
pub use peaks::{bucket_size, peak_envelope, Peak};
pub use render::{plot, render, Bar, Marker, MarkerKind, WaveformPlot, WaveformStyle};
