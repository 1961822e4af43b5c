// THEORY:
// The `Renderer` paints the per-frame overlay on top of the full-resolution
// frame that the pipeline has already copied onto the output surface. It is a
// pure function of (selected blobs, surface size, configuration snapshot), plus
// an optional label font that is loaded once.
//
// Draw order, back to front:
// 1. connector curve through all blobs in id order (needs at least two)
// 2. each blob's rectangle outline
// 3. its fill, if the fill mode is set and the id passes the fill ratio
// 4. its label
//
// Labels need glyphs. Without a font the label step is skipped and a single
// warning is logged; the rest of the overlay is unaffected.

use crate::config::{EffectConfig, FillMode};
use crate::core_modules::blob::Blob;
use crate::core_modules::canvas::{Blend, OverlayCanvas};
use crate::core_modules::overlay::{
    BlobRect, Point, RECT_STROKE_WIDTH, connector_path, connector_style, label_origin,
    label_text, resolution_scale, should_fill,
};
use crate::error::{EffectError, Result};
use ab_glyph::FontArc;
use image::RgbaImage;
use std::path::Path;
use tracing::warn;

/// Alpha used by the lighten fill.
const LIGHTEN_ALPHA: f64 = 0.5;

/// What one `render` call actually drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub connector_drawn: bool,
    pub rectangles: usize,
    pub filled: usize,
    pub labels: usize,
}

/// Loads a TrueType/OpenType font for labels.
pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    FontArc::try_from_vec(bytes)
        .map_err(|e| EffectError::Font(format!("{}: {e}", path.display())))
}

#[derive(Default)]
pub struct Renderer {
    font: Option<FontArc>,
    warned_missing_font: bool,
    path_points: Vec<Point>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontArc) -> Self {
        Self {
            font: Some(font),
            ..Self::default()
        }
    }

    /// Draws the overlay for `blobs` (already selected, in id order).
    pub fn render(&mut self, surface: &mut RgbaImage, blobs: &[Blob], config: &EffectConfig) -> RenderSummary {
        let mut summary = RenderSummary::default();
        let (frame_width, frame_height) = surface.dimensions();
        if frame_width == 0 || frame_height == 0 {
            return summary;
        }

        let scale = resolution_scale(frame_width);
        let color = config.color.to_rgba();
        let mut canvas = OverlayCanvas::new(surface);

        // --- 1. Connector curve ---
        if config.show_lines {
            if let Some(path) = connector_path(blobs, config.line_smoothness) {
                path.flatten_into(&mut self.path_points);
                let style = connector_style(scale, config.line_dash_style);
                canvas.stroke_polyline(&self.path_points, &style, color);
                summary.connector_drawn = true;
            }
        }

        let labels_wanted = config.show_numbers && !blobs.is_empty();
        if labels_wanted && self.font.is_none() && !self.warned_missing_font {
            warn!("Labels are enabled but no font is loaded; skipping labels");
            self.warned_missing_font = true;
        }

        for blob in blobs {
            // --- 2. Rectangle ---
            let rect = BlobRect::for_blob(blob, config);
            canvas.stroke_rect(rect.bounds(), RECT_STROKE_WIDTH * scale, color);
            summary.rectangles += 1;

            // --- 3. Fill ---
            if should_fill(blob.id, config.fill_mode, config.fill_ratio) {
                let blend = match config.fill_mode {
                    FillMode::Solid => Some(Blend::Solid),
                    FillMode::Difference => Some(Blend::Difference),
                    FillMode::Lighten => Some(Blend::Lighten { alpha: LIGHTEN_ALPHA }),
                    FillMode::None | FillMode::Multiply => None,
                };
                if let Some(blend) = blend {
                    canvas.fill_rect(rect.bounds(), color, blend);
                    summary.filled += 1;
                }
            }

            // --- 4. Label ---
            if config.show_numbers {
                if let Some(font) = &self.font {
                    let text = label_text(blob.id, &rect, frame_width, frame_height, config.label_type);
                    canvas.draw_text(&text, label_origin(&rect, scale), config.number_size, font, color);
                    summary.labels += 1;
                }
            }
        }

        summary
    }
}
