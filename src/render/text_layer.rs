//! Text selection overlay layout
//!
//! The rasterizer reports text runs in unrotated page points. The overlay
//! places them in the coordinate space of the rotated, zoomed page so it
//! covers the raster output exactly at CSS size.

use serde::Serialize;

use super::types::{Rect, Rotation, Size, TextGeometry};

/// A positioned run of selectable text
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextSpan {
    pub text: String,
    /// Bounds in CSS pixels of the rotated page
    pub rect: Rect,
}

/// Selectable text layer for one rendered page
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TextOverlay {
    /// Overlay size in CSS pixels; equals the page's on-screen size
    pub size: Size,
    pub spans: Vec<TextSpan>,
}

impl TextOverlay {
    /// Lay out extracted geometry at `zoom_ratio`, rotated clockwise by `rotation`.
    #[must_use]
    pub fn layout(geometry: &TextGeometry, zoom_ratio: f32, rotation: Rotation) -> Self {
        let scaled = geometry.page_size.scaled(zoom_ratio);
        let size = if rotation.swaps_axes() {
            scaled.transposed()
        } else {
            scaled
        };

        let spans = geometry
            .runs
            .iter()
            .filter(|run| !run.text.trim().is_empty())
            .map(|run| {
                let r = run.bbox;
                let (ax, ay) = rotate_point(r.x0 * zoom_ratio, r.y0 * zoom_ratio, scaled, rotation);
                let (bx, by) = rotate_point(r.x1 * zoom_ratio, r.y1 * zoom_ratio, scaled, rotation);
                TextSpan {
                    text: run.text.clone(),
                    rect: Rect::new(ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)),
                }
            })
            .collect();

        Self { size, spans }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Concatenated text of all spans, one per line
    #[must_use]
    pub fn text(&self) -> String {
        self.spans
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn rotate_point(x: f32, y: f32, page: Size, rotation: Rotation) -> (f32, f32) {
    match rotation {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => (page.height - y, x),
        Rotation::Deg180 => (page.width - x, page.height - y),
        Rotation::Deg270 => (y, page.width - x),
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::TextRun;
    use super::*;

    fn geometry() -> TextGeometry {
        TextGeometry {
            page_size: Size::new(100.0, 200.0),
            runs: vec![
                TextRun {
                    text: "Hello".into(),
                    bbox: Rect::new(10.0, 20.0, 50.0, 30.0),
                },
                TextRun {
                    text: "   ".into(),
                    bbox: Rect::new(0.0, 0.0, 5.0, 5.0),
                },
            ],
        }
    }

    #[test]
    fn unrotated_layout_scales_boxes() {
        let overlay = TextOverlay::layout(&geometry(), 2.0, Rotation::Deg0);
        assert_eq!(overlay.size, Size::new(200.0, 400.0));
        assert_eq!(overlay.spans.len(), 1);
        assert_eq!(overlay.spans[0].rect, Rect::new(20.0, 40.0, 100.0, 60.0));
    }

    #[test]
    fn quarter_turn_swaps_overlay_size() {
        let overlay = TextOverlay::layout(&geometry(), 1.0, Rotation::Deg90);
        assert_eq!(overlay.size, Size::new(200.0, 100.0));
        // x' = H - y, y' = x
        assert_eq!(overlay.spans[0].rect, Rect::new(170.0, 10.0, 180.0, 50.0));
    }

    #[test]
    fn half_turn_mirrors_both_axes() {
        let overlay = TextOverlay::layout(&geometry(), 1.0, Rotation::Deg180);
        assert_eq!(overlay.size, Size::new(100.0, 200.0));
        assert_eq!(overlay.spans[0].rect, Rect::new(50.0, 170.0, 90.0, 180.0));
    }

    #[test]
    fn three_quarter_turn() {
        let overlay = TextOverlay::layout(&geometry(), 1.0, Rotation::Deg270);
        assert_eq!(overlay.size, Size::new(200.0, 100.0));
        // x' = y, y' = W - x
        assert_eq!(overlay.spans[0].rect, Rect::new(20.0, 50.0, 30.0, 90.0));
    }

    #[test]
    fn spans_stay_inside_overlay_for_every_rotation() {
        for rotation in [
            Rotation::Deg0,
            Rotation::Deg90,
            Rotation::Deg180,
            Rotation::Deg270,
        ] {
            let overlay = TextOverlay::layout(&geometry(), 1.5, rotation);
            for span in &overlay.spans {
                assert!(span.rect.x0 >= 0.0 && span.rect.x1 <= overlay.size.width);
                assert!(span.rect.y0 >= 0.0 && span.rect.y1 <= overlay.size.height);
            }
        }
    }
}
