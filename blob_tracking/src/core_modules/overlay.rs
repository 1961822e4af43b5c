// THEORY:
// The `overlay` module decides *what* gets drawn for a frame without touching a
// single pixel. Every function here is a pure function of the selected blobs,
// the frame size and the configuration snapshot, which keeps the visual rules
// (jitter, fill selection, label text, connector shape) testable on their own.
//
// Key rules:
// 1.  **Resolution Scale**: stroke widths, dash lengths and label padding are
//     authored for a 1280px wide frame and scaled by `max(0.4, width / 1280)`.
// 2.  **Deterministic Jitter**: rectangle sizes wobble by `sin(id * k)` with two
//     fixed constants. The same id always gets the same size for a given
//     configuration, in every frame and every run. There is no RNG state.
// 3.  **Deterministic Fill Selection**: a blob is filled when
//     `(id * 137.5) mod 100 < fill_ratio`. Ratio 0 fills nothing, 100 fills all.
// 4.  **Connector Curve**: a closed path through the blobs in id order. With
//     smoothness `k > 0` each edge becomes a cubic whose control points follow
//     the Catmull-Rom tangent of the cyclic neighbors, scaled by `k`.

use crate::config::{DashStyle, EffectConfig, FillMode, LabelType};
use crate::core_modules::blob::Blob;

/// Frame width the stroke and padding constants are authored for.
pub const REFERENCE_WIDTH: f64 = 1280.0;
pub const MIN_RESOLUTION_SCALE: f64 = 0.4;
pub const CONNECTOR_WIDTH: f64 = 2.0;
pub const RECT_STROKE_WIDTH: f64 = 3.0;
pub const LABEL_PADDING: f64 = 6.0;
pub const DASH_ON: f64 = 5.0;
pub const DASH_OFF: f64 = 10.0;
pub const LABEL_DECIMALS: u32 = 3;

const JITTER_W: f64 = 1234.567;
const JITTER_H: f64 = 8910.111;
const FILL_STEP: f64 = 137.5;

/// A point in full-resolution frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    fn lerp(&self, other: &Point, t: f64) -> Point {
        Point::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }
}

impl From<&Blob> for Point {
    fn from(blob: &Blob) -> Self {
        Point::new(blob.x, blob.y)
    }
}

pub fn resolution_scale(frame_width: u32) -> f64 {
    (frame_width as f64 / REFERENCE_WIDTH).max(MIN_RESOLUTION_SCALE)
}

/// `(sin(id * 1234.567), sin(id * 8910.111))`, both in `[-1, 1]`.
pub fn jitter(id: usize) -> (f64, f64) {
    let id = id as f64;
    ((id * JITTER_W).sin(), (id * JITTER_H).sin())
}

/// Rectangle extent for a blob id. May be negative for randomness above 100%.
pub fn rect_size(id: usize, blob_size: f64, size_randomness: f64) -> (f64, f64) {
    let (jw, jh) = jitter(id);
    let amount = size_randomness / 100.0;
    (blob_size * (1.0 + jw * amount), blob_size * (1.0 + jh * amount))
}

/// A rectangle centered on a blob, in the signed form the size rule produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobRect {
    pub center: Point,
    pub width: f64,
    pub height: f64,
}

impl BlobRect {
    pub fn for_blob(blob: &Blob, config: &EffectConfig) -> Self {
        let (width, height) = rect_size(blob.id, config.blob_size, config.size_randomness);
        Self {
            center: Point::from(blob),
            width,
            height,
        }
    }

    /// `center.x - width / 2`; lies right of center when `width` is negative.
    pub fn left(&self) -> f64 {
        self.center.x - self.width / 2.0
    }

    pub fn top(&self) -> f64 {
        self.center.y - self.height / 2.0
    }

    pub fn bottom(&self) -> f64 {
        self.center.y + self.height / 2.0
    }

    /// `(min_x, min_y, max_x, max_y)` with negative extents flipped.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let hw = self.width.abs() / 2.0;
        let hh = self.height.abs() / 2.0;
        (
            self.center.x - hw,
            self.center.y - hh,
            self.center.x + hw,
            self.center.y + hh,
        )
    }
}

/// Whether the blob with `id` receives the configured fill. `Multiply` is
/// accepted in configs but has no paint rule, so it fills nothing.
pub fn should_fill(id: usize, fill_mode: FillMode, fill_ratio: f64) -> bool {
    !matches!(fill_mode, FillMode::None | FillMode::Multiply)
        && (id as f64 * FILL_STEP) % 100.0 < fill_ratio
}

/// Label text: `ID:<id>` or the rectangle size relative to the frame.
pub fn label_text(
    id: usize,
    rect: &BlobRect,
    frame_width: u32,
    frame_height: u32,
    label_type: LabelType,
) -> String {
    match label_type {
        LabelType::Id => format!("ID:{id}"),
        LabelType::Size => {
            let rel_w = rect.width / frame_width as f64;
            let rel_h = rect.height / frame_height as f64;
            format!(
                "x={}, y={}",
                to_fixed(rel_w, LABEL_DECIMALS),
                to_fixed(rel_h, LABEL_DECIMALS)
            )
        }
    }
}

/// Fixed-point text for `value` with `digits` decimals. Exact halves round
/// away from zero; `{:.N}` alone would round them to even.
pub fn to_fixed(value: f64, digits: u32) -> String {
    let width = digits as usize;
    // Normalizes -0.0 so it prints without a sign.
    let value = if value == 0.0 { 0.0 } else { value };
    // A binary float is an exact half at `digits` decimals only when it is an
    // odd multiple of 2^-(digits + 1).
    let scaled = value.abs() * 2f64.powi(digits as i32 + 1);
    if !scaled.is_finite() || scaled.fract() != 0.0 || scaled % 2.0 != 1.0 {
        return format!("{value:.width$}");
    }
    let odd = scaled as u128;
    let units = (odd * 5u128.pow(digits) + 1) / 2;
    let sign = if value < 0.0 { "-" } else { "" };
    if digits == 0 {
        return format!("{sign}{units}");
    }
    let unit = 10u128.pow(digits);
    format!("{sign}{}.{:0width$}", units / unit, units % unit)
}

/// Top-left anchor of the label: bottom-left of the rectangle plus padding.
pub fn label_origin(rect: &BlobRect, scale: f64) -> Point {
    Point::new(rect.left(), rect.bottom() + LABEL_PADDING * scale)
}

/// Stroke parameters for the connector curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub width: f64,
    /// `[on, off]` lengths, `None` for a solid line.
    pub dash: Option<[f64; 2]>,
}

pub fn connector_style(scale: f64, dash_style: DashStyle) -> StrokeStyle {
    StrokeStyle {
        width: CONNECTOR_WIDTH * scale,
        dash: match dash_style {
            DashStyle::Solid => None,
            DashStyle::Dashed => Some([DASH_ON * scale, DASH_OFF * scale]),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    Line(Point),
    Cubic { c1: Point, c2: Point, to: Point },
}

/// A closed path starting at `start`; the last segment ends back at `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorPath {
    pub start: Point,
    pub segments: Vec<PathSegment>,
}

/// Builds the connector through `blobs` in order. `None` for fewer than two.
pub fn connector_path(blobs: &[Blob], line_smoothness: f64) -> Option<ConnectorPath> {
    let n = blobs.len();
    if n < 2 {
        return None;
    }
    let at = |i: usize| Point::from(&blobs[i % n]);
    let start = at(0);

    let segments = if line_smoothness > 0.0 {
        let k = line_smoothness / 100.0;
        (0..n)
            .map(|i| {
                let p0 = at(i + n - 1);
                let p1 = at(i);
                let p2 = at(i + 1);
                let p3 = at(i + 2);
                PathSegment::Cubic {
                    c1: Point::new(p1.x + (p2.x - p0.x) / 6.0 * k, p1.y + (p2.y - p0.y) / 6.0 * k),
                    c2: Point::new(p2.x - (p3.x - p1.x) / 6.0 * k, p2.y - (p3.y - p1.y) / 6.0 * k),
                    to: p2,
                }
            })
            .collect()
    } else {
        (1..=n).map(|i| PathSegment::Line(at(i))).collect()
    };

    Some(ConnectorPath { start, segments })
}

impl ConnectorPath {
    /// Flattens the path into a polyline. Cubics are split in proportion to
    /// the length of their control polygon.
    pub fn flatten_into(&self, points: &mut Vec<Point>) {
        points.clear();
        points.push(self.start);
        let mut current = self.start;
        for segment in &self.segments {
            match *segment {
                PathSegment::Line(to) => {
                    points.push(to);
                    current = to;
                }
                PathSegment::Cubic { c1, c2, to } => {
                    let hull = current.distance(&c1) + c1.distance(&c2) + c2.distance(&to);
                    let steps = ((hull / 4.0).ceil() as usize).clamp(4, 64);
                    for step in 1..steps {
                        points.push(cubic_point(current, c1, c2, to, step as f64 / steps as f64));
                    }
                    points.push(to);
                    current = to;
                }
            }
        }
    }
}

/// De Casteljau evaluation of a cubic Bezier at `t`.
fn cubic_point(p0: Point, c1: Point, c2: Point, p3: Point, t: f64) -> Point {
    let a = p0.lerp(&c1, t);
    let b = c1.lerp(&c2, t);
    let c = c2.lerp(&p3, t);
    let d = a.lerp(&b, t);
    let e = b.lerp(&c, t);
    d.lerp(&e, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_at(id: usize, x: f64, y: f64) -> Blob {
        Blob { x, y, id, size: 10 }
    }

    #[test]
    fn resolution_scale_has_floor() {
        assert_eq!(resolution_scale(1280), 1.0);
        assert_eq!(resolution_scale(2560), 2.0);
        assert_eq!(resolution_scale(320), 0.4);
        assert_eq!(resolution_scale(100), 0.4);
    }

    #[test]
    fn jitter_is_pure_function_of_id() {
        assert_eq!(jitter(0), (0.0, 0.0));
        assert_eq!(jitter(3), jitter(3));
        assert_eq!(jitter(1).0, (1234.567f64).sin());
        assert_eq!(jitter(1).1, (8910.111f64).sin());
    }

    #[test]
    fn rect_size_without_randomness_is_base() {
        for id in 0..10 {
            assert_eq!(rect_size(id, 40.0, 0.0), (40.0, 40.0));
        }
    }

    #[test]
    fn rect_size_is_reproducible() {
        let a = rect_size(4, 40.0, 200.0);
        let b = rect_size(4, 40.0, 200.0);
        assert_eq!(a, b);
        let (jw, jh) = jitter(4);
        assert_eq!(a, (40.0 * (1.0 + jw * 2.0), 40.0 * (1.0 + jh * 2.0)));
    }

    #[test]
    fn fill_ratio_bounds() {
        for id in 0..50 {
            assert!(!should_fill(id, FillMode::Solid, 0.0));
            assert!(should_fill(id, FillMode::Difference, 100.0));
            assert!(!should_fill(id, FillMode::None, 100.0));
            assert!(!should_fill(id, FillMode::Multiply, 100.0));
        }
    }

    #[test]
    fn fill_selection_follows_score() {
        // Scores: id0 -> 0, id1 -> 37.5, id2 -> 75, id3 -> 12.5
        assert!(should_fill(0, FillMode::Solid, 10.0));
        assert!(!should_fill(1, FillMode::Solid, 37.5));
        assert!(should_fill(1, FillMode::Solid, 37.6));
        assert!(!should_fill(2, FillMode::Solid, 50.0));
        assert!(should_fill(3, FillMode::Solid, 13.0));
    }

    #[test]
    fn label_text_formats() {
        let rect = BlobRect {
            center: Point::new(100.0, 100.0),
            width: 64.0,
            height: 36.0,
        };
        assert_eq!(label_text(7, &rect, 1280, 720, LabelType::Id), "ID:7");
        assert_eq!(
            label_text(7, &rect, 1280, 720, LabelType::Size),
            "x=0.050, y=0.050"
        );
    }

    #[test]
    fn size_label_rounds_halves_up() {
        let rect = BlobRect {
            center: Point::new(320.0, 320.0),
            width: 40.0,
            height: 40.0,
        };
        assert_eq!(
            label_text(0, &rect, 640, 640, LabelType::Size),
            "x=0.063, y=0.063"
        );
    }

    #[test]
    fn to_fixed_matches_half_up_rounding() {
        assert_eq!(to_fixed(0.0625, 3), "0.063");
        assert_eq!(to_fixed(-0.0625, 3), "-0.063");
        assert_eq!(to_fixed(0.1875, 3), "0.188");
        assert_eq!(to_fixed(1.5, 3), "1.500");
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(0.125, 2), "0.13");
        // Not exact halves in binary, so the nearest value wins.
        assert_eq!(to_fixed(1.0005, 3), "1.000");
        assert_eq!(to_fixed(0.0005, 3), "0.001");
        assert_eq!(to_fixed(0.05, 3), "0.050");
        assert_eq!(to_fixed(-0.0, 3), "0.000");
        assert_eq!(to_fixed(f64::NAN, 3), "NaN");
    }

    #[test]
    fn label_text_keeps_sign_of_negative_extent() {
        let rect = BlobRect {
            center: Point::new(0.0, 0.0),
            width: -128.0,
            height: 72.0,
        };
        assert_eq!(
            label_text(0, &rect, 1280, 720, LabelType::Size),
            "x=-0.100, y=0.100"
        );
    }

    #[test]
    fn label_origin_is_below_bottom_left() {
        let rect = BlobRect {
            center: Point::new(100.0, 50.0),
            width: 40.0,
            height: 20.0,
        };
        assert_eq!(label_origin(&rect, 1.0), Point::new(80.0, 66.0));
        assert_eq!(label_origin(&rect, 0.5), Point::new(80.0, 63.0));
    }

    #[test]
    fn bounds_normalize_negative_extent() {
        let rect = BlobRect {
            center: Point::new(50.0, 50.0),
            width: -20.0,
            height: 10.0,
        };
        assert_eq!(rect.bounds(), (40.0, 45.0, 60.0, 55.0));
        assert_eq!(rect.left(), 60.0);
    }

    #[test]
    fn connector_needs_two_blobs() {
        assert!(connector_path(&[], 0.0).is_none());
        assert!(connector_path(&[blob_at(0, 1.0, 1.0)], 50.0).is_none());
    }

    #[test]
    fn straight_connector_is_closed_polygon() {
        let blobs = [blob_at(0, 0.0, 0.0), blob_at(1, 10.0, 0.0), blob_at(2, 10.0, 10.0)];
        let path = connector_path(&blobs, 0.0).unwrap();
        assert_eq!(path.start, Point::new(0.0, 0.0));
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Line(Point::new(10.0, 0.0)),
                PathSegment::Line(Point::new(10.0, 10.0)),
                PathSegment::Line(Point::new(0.0, 0.0)),
            ]
        );
    }

    #[test]
    fn smooth_connector_uses_cyclic_tangents() {
        let blobs = [
            blob_at(0, 0.0, 0.0),
            blob_at(1, 60.0, 0.0),
            blob_at(2, 60.0, 60.0),
            blob_at(3, 0.0, 60.0),
        ];
        let path = connector_path(&blobs, 100.0).unwrap();
        assert_eq!(path.segments.len(), 4);
        match path.segments[0] {
            PathSegment::Cubic { c1, c2, to } => {
                // p0 = (0,60), p1 = (0,0), p2 = (60,0), p3 = (60,60)
                assert_eq!(c1, Point::new(10.0, -10.0));
                assert_eq!(c2, Point::new(50.0, -10.0));
                assert_eq!(to, Point::new(60.0, 0.0));
            }
            other => panic!("expected cubic, got {other:?}"),
        }
        match path.segments[3] {
            PathSegment::Cubic { to, .. } => assert_eq!(to, Point::new(0.0, 0.0)),
            other => panic!("expected cubic, got {other:?}"),
        }
    }

    #[test]
    fn half_smoothness_halves_tangents() {
        let blobs = [
            blob_at(0, 0.0, 0.0),
            blob_at(1, 60.0, 0.0),
            blob_at(2, 60.0, 60.0),
            blob_at(3, 0.0, 60.0),
        ];
        let path = connector_path(&blobs, 50.0).unwrap();
        match path.segments[0] {
            PathSegment::Cubic { c1, .. } => assert_eq!(c1, Point::new(5.0, -5.0)),
            other => panic!("expected cubic, got {other:?}"),
        }
    }

    #[test]
    fn flatten_ends_where_it_starts() {
        let blobs = [blob_at(0, 0.0, 0.0), blob_at(1, 100.0, 0.0), blob_at(2, 50.0, 80.0)];
        let mut points = Vec::new();
        for smoothness in [0.0, 35.0, 100.0] {
            connector_path(&blobs, smoothness).unwrap().flatten_into(&mut points);
            let first = points[0];
            let last = *points.last().unwrap();
            assert!(first.distance(&last) < 1e-9);
            assert!(points.len() >= 4);
        }
    }

    #[test]
    fn connector_style_scales_dash() {
        let solid = connector_style(1.0, DashStyle::Solid);
        assert_eq!(solid.width, 2.0);
        assert!(solid.dash.is_none());
        let dashed = connector_style(0.5, DashStyle::Dashed);
        assert_eq!(dashed.width, 1.0);
        assert_eq!(dashed.dash, Some([2.5, 5.0]));
    }
}
