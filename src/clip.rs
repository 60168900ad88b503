//! Clip range selection
//!
//! A [`ClipSelector`] keeps a `[start, end]` window inside the decoded audio's
//! duration. Edits are clamped rather than rejected so the range is valid after
//! every mutation; a zero-width range is only refused when the clip is
//! committed.

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// A window into an audio buffer, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipRange {
    pub start: f64,
    pub end: f64,
}

impl ClipRange {
    pub const EMPTY: ClipRange = ClipRange {
        start: 0.0,
        end: 0.0,
    };

    /// The whole buffer, `[0, duration]`.
    pub fn full(duration: f64) -> Self {
        Self {
            start: 0.0,
            end: sanitize_duration(duration),
        }
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Label text shown next to each slider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClipLabels {
    pub start: String,
    pub end: String,
}

/// Format seconds the way the clip labels show them.
pub fn seconds_label(value: f64) -> String {
    format!("{:.2} seconds", value)
}

fn sanitize_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    }
}

/// Range selector bound to one buffer's duration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSelector {
    duration: f64,
    range: ClipRange,
}

impl ClipSelector {
    /// Selector over `[0, duration]`, initially selecting everything.
    pub fn new(duration: f64) -> Self {
        let duration = sanitize_duration(duration);
        Self {
            duration,
            range: ClipRange::full(duration),
        }
    }

    /// Selector with no buffer behind it: bounds and range are `[0, 0]`.
    pub fn empty() -> Self {
        Self {
            duration: 0.0,
            range: ClipRange::EMPTY,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn range(&self) -> ClipRange {
        self.range
    }

    pub fn has_audio(&self) -> bool {
        self.duration > 0.0
    }

    fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return 0.0;
        }
        value.clamp(0.0, self.duration)
    }

    /// Move the start. If it passes the end, the end follows it.
    pub fn set_start(&mut self, value: f64) -> ClipRange {
        let start = self.clamp(value);
        self.range.start = start;
        if self.range.end < start {
            self.range.end = start;
        }
        self.range
    }

    /// Move the end. If it falls before the start, it snaps up to the start.
    pub fn set_end(&mut self, value: f64) -> ClipRange {
        let end = self.clamp(value);
        self.range.end = end.max(self.range.start);
        self.range
    }

    /// Replace both bounds, e.g. when reopening a stored clip.
    pub fn select(&mut self, start: f64, end: f64) -> ClipRange {
        self.set_start(start);
        self.set_end(end)
    }

    pub fn labels(&self) -> ClipLabels {
        ClipLabels {
            start: seconds_label(self.range.start),
            end: seconds_label(self.range.end),
        }
    }

    /// The range as it may be saved: audio present and strictly positive width.
    pub fn commit(&self) -> Result<ClipRange, ValidationError> {
        if !self.has_audio() {
            return Err(ValidationError::MissingSelection);
        }
        if self.range.end <= self.range.start {
            return Err(ValidationError::ZeroWidthClip);
        }
        Ok(self.range)
    }
}

impl Default for ClipSelector {
    fn default() -> Self {
        Self::empty()
    }
}
