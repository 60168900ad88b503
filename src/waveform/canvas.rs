//! Drawing surfaces for the waveform
//!
//! The renderer only needs solid rectangles, so [`Canvas`] is deliberately
//! small. [`PixmapCanvas`] backs it with a tiny-skia pixmap, which can also be
//! exported as PNG.

use std::path::Path;

use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

/// RGBA colour, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self(r, g, b, 255)
    }
}

pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn clear(&mut self, color: Rgba);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba);
}

/// Raster canvas backed by a tiny-skia [`Pixmap`].
#[derive(Debug, Clone, PartialEq)]
pub struct PixmapCanvas {
    pixmap: Pixmap,
}

impl PixmapCanvas {
    /// Returns `None` for a zero-sized canvas.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Pixmap::new(width, height).map(|pixmap| Self { pixmap })
    }

    /// Premultiplied RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Colour of one pixel, or `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        self.pixmap.pixel(x, y).map(|p| {
            let c = p.demultiply();
            Rgba(c.red(), c.green(), c.blue(), c.alpha())
        })
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, String> {
        self.pixmap.encode_png().map_err(|e| e.to_string())
    }

    pub fn save_png(&self, path: &Path) -> Result<(), String> {
        self.pixmap
            .save_png(path)
            .map_err(|e| format!("Failed to write {:?}: {}", path, e))
    }
}

impl Canvas for PixmapCanvas {
    fn width(&self) -> u32 {
        self.pixmap.width()
    }

    fn height(&self) -> u32 {
        self.pixmap.height()
    }

    fn clear(&mut self, color: Rgba) {
        self.pixmap
            .fill(Color::from_rgba8(color.0, color.1, color.2, color.3));
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba) {
        let Some(rect) = Rect::from_xywh(x, y, w, h) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.0, color.1, color.2, color.3);
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_canvas_is_refused() {
        assert!(PixmapCanvas::new(0, 10).is_none());
    }

    #[test]
    fn fill_rect_paints_covered_pixels() {
        let mut canvas = PixmapCanvas::new(4, 4).unwrap();
        canvas.clear(Rgba::opaque(0, 0, 0));
        canvas.fill_rect(1.0, 1.0, 1.0, 2.0, Rgba::opaque(255, 0, 0));

        assert_eq!(canvas.pixel(1, 1), Some(Rgba::opaque(255, 0, 0)));
        assert_eq!(canvas.pixel(1, 2), Some(Rgba::opaque(255, 0, 0)));
        assert_eq!(canvas.pixel(0, 0), Some(Rgba::opaque(0, 0, 0)));
        assert_eq!(canvas.pixel(2, 1), Some(Rgba::opaque(0, 0, 0)));
    }

    #[test]
    fn png_export_has_signature() {
        let canvas = PixmapCanvas::new(2, 2).unwrap();
        let png = canvas.encode_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
