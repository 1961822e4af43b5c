// THEORY:
// `OverlayCanvas` is the raster target of the renderer: a thin wrapper around
// the full-resolution RGBA surface that knows how to draw the handful of
// primitives the effect uses.
//
// - thick strokes, optionally dashed, along a flattened polyline
// - hollow rectangles with a given stroke width
// - rectangle fills with three compositing rules (solid, difference, lighten
//   at partial alpha)
// - text labels from an `ab_glyph` font
//
// Basic shapes go through `imageproc`'s drawing routines. Compositing fills
// are written per pixel because `imageproc` only paints opaque colors.
// Everything is clipped to the surface; drawing off-screen is a no-op, never
// an error.

use crate::core_modules::overlay::{Point, StrokeStyle};
use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_polygon_mut,
    draw_text_mut,
};
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect;

/// Compositing rule for a rectangle fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Blend {
    /// Opaque paint.
    Solid,
    /// `|dst - src|` per channel.
    Difference,
    /// `max(dst, src)` mixed over `dst` with the given alpha.
    Lighten { alpha: f64 },
}

pub struct OverlayCanvas<'a> {
    surface: &'a mut RgbaImage,
}

impl<'a> OverlayCanvas<'a> {
    pub fn new(surface: &'a mut RgbaImage) -> Self {
        Self { surface }
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Clamps a half-open float span to `[0, limit)` pixel indices.
    fn span(lo: f64, hi: f64, limit: u32) -> Option<(u32, u32)> {
        let start = lo.round().max(0.0);
        let end = hi.round().min(limit as f64);
        if end > start {
            Some((start as u32, end as u32))
        } else {
            None
        }
    }

    /// Paints `[x0, x1) x [y0, y1)` with an opaque color.
    fn fill_area(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgba<u8>) {
        let (Some((sx, ex)), Some((sy, ey))) = (
            Self::span(x0, x1, self.width()),
            Self::span(y0, y1, self.height()),
        ) else {
            return;
        };
        let rect = Rect::at(sx as i32, sy as i32).of_size(ex - sx, ey - sy);
        draw_filled_rect_mut(self.surface, rect, color);
    }

    /// Strokes the outline of `(min_x, min_y, max_x, max_y)` with the stroke
    /// centered on the edges.
    pub fn stroke_rect(&mut self, bounds: (f64, f64, f64, f64), width: f64, color: Rgba<u8>) {
        let (min_x, min_y, max_x, max_y) = bounds;
        let half = width / 2.0;
        let (ox0, oy0, ox1, oy1) = (min_x - half, min_y - half, max_x + half, max_y + half);
        let (ix0, iy0, ix1, iy1) = (min_x + half, min_y + half, max_x - half, max_y - half);

        if ix1.round() <= ix0.round() || iy1.round() <= iy0.round() {
            // Stroke swallows the interior.
            self.fill_area(ox0, oy0, ox1, oy1, color);
            return;
        }

        self.fill_area(ox0, oy0, ox1, iy0, color);
        self.fill_area(ox0, iy1, ox1, oy1, color);
        self.fill_area(ox0, iy0, ix0, iy1, color);
        self.fill_area(ix1, iy0, ox1, iy1, color);
    }

    /// Fills `(min_x, min_y, max_x, max_y)` with `color` under `blend`.
    pub fn fill_rect(&mut self, bounds: (f64, f64, f64, f64), color: Rgba<u8>, blend: Blend) {
        let (min_x, min_y, max_x, max_y) = bounds;
        if blend == Blend::Solid {
            self.fill_area(min_x, min_y, max_x, max_y, color);
            return;
        }

        let (Some((sx, ex)), Some((sy, ey))) = (
            Self::span(min_x, max_x, self.width()),
            Self::span(min_y, max_y, self.height()),
        ) else {
            return;
        };

        for y in sy..ey {
            for x in sx..ex {
                let dst = self.surface.get_pixel_mut(x, y);
                for c in 0..3 {
                    dst.0[c] = blend_channel(dst.0[c], color.0[c], blend);
                }
            }
        }
    }

    /// Strokes a polyline with `style`. Dashes run continuously across
    /// vertices. Joins are round, dash ends are flat.
    pub fn stroke_polyline(&mut self, points: &[Point], style: &StrokeStyle, color: Rgba<u8>) {
        if points.len() < 2 || style.width <= 0.0 {
            return;
        }

        let pattern = style.dash.filter(|[on, off]| *on > 0.0 && *off > 0.0);
        let Some([on, off]) = pattern else {
            for pair in points.windows(2) {
                self.stroke_segment(pair[0], pair[1], style.width, color);
            }
            for point in points {
                self.stamp_join(*point, style.width, color);
            }
            return;
        };

        let mut drawing = true;
        let mut remaining = on;
        let last_segment = points.len() - 2;
        for (index, pair) in points.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            let length = a.distance(&b);
            let mut t = 0.0;
            while t < length {
                let step = remaining.min(length - t);
                if drawing {
                    let from = Point::new(a.x + (b.x - a.x) * t / length, a.y + (b.y - a.y) * t / length);
                    let to_t = t + step;
                    let to = Point::new(a.x + (b.x - a.x) * to_t / length, a.y + (b.y - a.y) * to_t / length);
                    self.stroke_segment(from, to, style.width, color);
                }
                t += step;
                remaining -= step;
                if remaining <= 0.0 {
                    drawing = !drawing;
                    remaining = if drawing { on } else { off };
                }
            }
            // A dash bending around a vertex gets a round join there.
            if drawing && remaining < on && index < last_segment {
                self.stamp_join(b, style.width, color);
            }
        }
    }

    /// Thin strokes become single-pixel lines; thicker ones are filled quads
    /// that end flat at `from` and `to`.
    fn stroke_segment(&mut self, from: Point, to: Point, width: f64, color: Rgba<u8>) {
        let half = width / 2.0;
        if half < 1.0 {
            draw_line_segment_mut(
                self.surface,
                (from.x as f32, from.y as f32),
                (to.x as f32, to.y as f32),
                color,
            );
            return;
        }

        let length = from.distance(&to);
        if length == 0.0 {
            return;
        }
        let nx = -(to.y - from.y) / length * half;
        let ny = (to.x - from.x) / length * half;
        let corner = |p: Point, side: f64| {
            PixelPoint::new((p.x + side * nx).round() as i32, (p.y + side * ny).round() as i32)
        };
        // Opposite corners at `from` are `width` apart, so the quad is never closed.
        let quad = [corner(from, 1.0), corner(to, 1.0), corner(to, -1.0), corner(from, -1.0)];
        draw_polygon_mut(self.surface, &quad, color);
    }

    fn stamp_join(&mut self, at: Point, width: f64, color: Rgba<u8>) {
        let half = width / 2.0;
        if half < 1.0 {
            return;
        }
        let center = (at.x.round() as i32, at.y.round() as i32);
        draw_filled_circle_mut(self.surface, center, (half.round() as i32).max(1), color);
    }

    /// Draws `text` with its top-left corner at `origin`.
    pub fn draw_text(&mut self, text: &str, origin: Point, px_size: f32, font: &FontArc, color: Rgba<u8>) {
        draw_text_mut(
            self.surface,
            color,
            origin.x.round() as i32,
            origin.y.round() as i32,
            PxScale::from(px_size),
            font,
            text,
        );
    }
}

#[inline]
fn blend_channel(dst: u8, src: u8, blend: Blend) -> u8 {
    match blend {
        Blend::Solid => src,
        Blend::Difference => dst.abs_diff(src),
        Blend::Lighten { alpha } => {
            let lighter = dst.max(src) as f64;
            let d = dst as f64;
            (d + (lighter - d) * alpha).round().clamp(0.0, 255.0) as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn surface(w: u32, h: u32, fill: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(w, h, fill)
    }

    #[test]
    fn blend_rules() {
        assert_eq!(blend_channel(200, 50, Blend::Difference), 150);
        assert_eq!(blend_channel(50, 200, Blend::Difference), 150);
        assert_eq!(blend_channel(100, 200, Blend::Lighten { alpha: 0.5 }), 150);
        assert_eq!(blend_channel(200, 100, Blend::Lighten { alpha: 0.5 }), 200);
        assert_eq!(blend_channel(12, 99, Blend::Solid), 99);
    }

    #[test]
    fn solid_fill_covers_exact_area() {
        let mut img = surface(10, 10, BLACK);
        OverlayCanvas::new(&mut img).fill_rect((2.0, 3.0, 5.0, 6.0), WHITE, Blend::Solid);
        for y in 0..10 {
            for x in 0..10 {
                let inside = (2..5).contains(&x) && (3..6).contains(&y);
                assert_eq!(*img.get_pixel(x, y) == WHITE, inside, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn difference_fill_inverts_white_background() {
        let mut img = surface(4, 4, WHITE);
        OverlayCanvas::new(&mut img).fill_rect((0.0, 0.0, 2.0, 2.0), WHITE, Blend::Difference);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(3, 3).0, [255, 255, 255, 255]);
    }

    #[test]
    fn fill_is_clipped_to_surface() {
        let mut img = surface(4, 4, BLACK);
        let mut canvas = OverlayCanvas::new(&mut img);
        canvas.fill_rect((-10.0, -10.0, 2.0, 2.0), BLACK, Blend::Difference);
        canvas.fill_rect((100.0, 100.0, 120.0, 120.0), WHITE, Blend::Solid);
        canvas.fill_rect((-10.0, -10.0, 1.0, 1.0), WHITE, Blend::Solid);
        assert_eq!(*img.get_pixel(0, 0), WHITE);
        assert_eq!(*img.get_pixel(1, 1), BLACK);
    }

    #[test]
    fn stroke_rect_leaves_interior() {
        let mut img = surface(20, 20, BLACK);
        OverlayCanvas::new(&mut img).stroke_rect((4.0, 4.0, 16.0, 16.0), 2.0, WHITE);
        // Edge band
        assert_eq!(*img.get_pixel(3, 10), WHITE);
        assert_eq!(*img.get_pixel(4, 10), WHITE);
        assert_eq!(*img.get_pixel(10, 3), WHITE);
        assert_eq!(*img.get_pixel(15, 15), WHITE);
        // Interior and exterior untouched
        assert_eq!(*img.get_pixel(10, 10), BLACK);
        assert_eq!(*img.get_pixel(1, 1), BLACK);
        assert_eq!(*img.get_pixel(18, 18), BLACK);
    }

    #[test]
    fn stroke_rect_smaller_than_stroke_is_filled() {
        let mut img = surface(10, 10, BLACK);
        OverlayCanvas::new(&mut img).stroke_rect((4.0, 4.0, 5.0, 5.0), 4.0, WHITE);
        assert_eq!(*img.get_pixel(4, 4), WHITE);
        assert_eq!(*img.get_pixel(2, 2), WHITE);
    }

    #[test]
    fn solid_polyline_connects_points() {
        let mut img = surface(40, 10, BLACK);
        let style = StrokeStyle { width: 4.0, dash: None };
        let points = [Point::new(5.0, 5.0), Point::new(35.0, 5.0)];
        OverlayCanvas::new(&mut img).stroke_polyline(&points, &style, WHITE);
        for x in 5..=35 {
            assert_eq!(*img.get_pixel(x, 5), WHITE, "gap at x={x}");
        }
        assert_eq!(*img.get_pixel(20, 0), BLACK);
    }

    #[test]
    fn dashed_polyline_leaves_gaps() {
        let mut img = surface(60, 10, BLACK);
        let style = StrokeStyle { width: 1.0, dash: Some([5.0, 10.0]) };
        let points = [Point::new(0.0, 5.0), Point::new(59.0, 5.0)];
        OverlayCanvas::new(&mut img).stroke_polyline(&points, &style, WHITE);
        assert_eq!(*img.get_pixel(2, 5), WHITE);
        assert_eq!(*img.get_pixel(10, 5), BLACK);
        assert_eq!(*img.get_pixel(17, 5), WHITE);
        assert_eq!(*img.get_pixel(25, 5), BLACK);
    }

    #[test]
    fn thick_dashes_end_flat() {
        let mut img = surface(60, 20, BLACK);
        let style = StrokeStyle { width: 6.0, dash: Some([5.0, 10.0]) };
        let points = [Point::new(0.0, 10.0), Point::new(59.0, 10.0)];
        OverlayCanvas::new(&mut img).stroke_polyline(&points, &style, WHITE);
        // Dashes cover [0, 5] and [15, 20]; nothing spills into the gap.
        assert_eq!(*img.get_pixel(2, 10), WHITE);
        assert_eq!(*img.get_pixel(2, 8), WHITE);
        assert_eq!(*img.get_pixel(8, 10), BLACK);
        assert_eq!(*img.get_pixel(12, 10), BLACK);
        assert_eq!(*img.get_pixel(17, 10), WHITE);
        assert_eq!(*img.get_pixel(2, 3), BLACK);
    }

    #[test]
    fn dash_across_vertex_gets_round_join() {
        let mut img = surface(40, 40, BLACK);
        let style = StrokeStyle { width: 6.0, dash: Some([20.0, 5.0]) };
        let points = [Point::new(10.0, 30.0), Point::new(20.0, 30.0), Point::new(20.0, 10.0)];
        OverlayCanvas::new(&mut img).stroke_polyline(&points, &style, WHITE);
        // Outer corner of the bend is only covered by the join disc.
        assert_eq!(*img.get_pixel(21, 32), WHITE);
        assert_eq!(*img.get_pixel(20, 25), WHITE);
    }

    #[test]
    fn degenerate_polyline_is_ignored() {
        let mut img = surface(5, 5, BLACK);
        let style = StrokeStyle { width: 2.0, dash: Some([0.0, 0.0]) };
        let mut canvas = OverlayCanvas::new(&mut img);
        canvas.stroke_polyline(&[Point::new(1.0, 1.0)], &style, WHITE);
        canvas.stroke_polyline(&[Point::new(2.0, 2.0), Point::new(2.0, 2.0)], &style, WHITE);
        assert_eq!(*img.get_pixel(0, 0), BLACK);
    }
}
