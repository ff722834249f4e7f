// ============================================================================
// PAINT — square brush strokes with spray
// ============================================================================

use crate::canvas::{EditContext, EditResult, Layer, StrokeState};

fn hash_u32(mut x: u32) -> u32 {
    x = x.wrapping_mul(0x9E3779B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EBCA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2AE35);
    x ^= x >> 16;
    x
}

/// Deterministic 0..1 value for a cell and stamp.
fn hash_f32(x: u32, y: u32, seed: u32) -> f32 {
    let h = hash_u32(
        x.wrapping_mul(374761393)
            .wrapping_add(y.wrapping_mul(668265263))
            .wrapping_add(seed),
    );
    (h & 0x00FFFFFF) as f32 / 16777216.0
}

/// Integer points from `a` to `b` inclusive (Bresenham).
///
/// Callers clip the segment first; the result holds one entry per step.
pub fn line_points(a: (i64, i64), b: (i64, i64)) -> Vec<(i64, i64)> {
    let (mut x, mut y) = a;
    let dx = (b.0 - a.0).abs();
    let dy = -(b.1 - a.1).abs();
    let sx = if a.0 < b.0 { 1 } else { -1 };
    let sy = if a.1 < b.1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut out = Vec::with_capacity((dx - dy + 1) as usize);
    loop {
        out.push((x, y));
        if (x, y) == b {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    out
}

/// Clip segment `a..b` to the rectangle `min..=max` (Liang-Barsky).
/// Returns `None` when no part of the segment lies inside.
fn clip_segment(
    a: (i64, i64),
    b: (i64, i64),
    min: (i64, i64),
    max: (i64, i64),
) -> Option<((i64, i64), (i64, i64))> {
    let (x0, y0) = (a.0 as f64, a.1 as f64);
    let (dx, dy) = (b.0 as f64 - x0, b.1 as f64 - y0);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    let edges = [
        (-dx, x0 - min.0 as f64),
        (dx, max.0 as f64 - x0),
        (-dy, y0 - min.1 as f64),
        (dy, max.1 as f64 - y0),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| {
        (
            ((x0 + t * dx).round() as i64).clamp(min.0, max.0),
            ((y0 + t * dy).round() as i64).clamp(min.1, max.1),
        )
    };
    Some((at(t0), at(t1)))
}

/// Paint at `(x, y)`, continuing the open stroke if there is one.
///
/// The first call of a stroke opens an undo frame; every later call
/// interpolates from the previous point so fast pointer movement leaves no
/// gaps.  Points far off the canvas paint nothing.  Returns the number of
/// cells changed by this call.
pub fn paint(layer: &mut Layer, ctx: &EditContext<'_>, x: i64, y: i64) -> EditResult {
    let _guard = layer.write_lock().try_acquire()?;

    let settings = ctx.settings;
    let width = settings.line_width.max(1) as i64;
    let half = width / 2;
    // Any brush centered outside this rectangle misses the canvas.
    let min = (-width, -width);
    let max = (layer.cols as i64 + width, layer.rows as i64 + width);

    let (points, mut stamp) = match layer.stroke {
        Some(s) => {
            let pts = match clip_segment(s.last, (x, y), min, max) {
                Some((a, b)) => {
                    let mut pts = line_points(a, b);
                    // The previous sample was already painted.
                    if a == s.last {
                        pts.remove(0);
                    }
                    pts
                }
                None => Vec::new(),
            };
            (pts, s.stamp)
        }
        None => {
            layer.history.begin_frame();
            let inside = x >= min.0 && x <= max.0 && y >= min.1 && y <= max.1;
            (if inside { vec![(x, y)] } else { Vec::new() }, 0)
        }
    };

    let spray = settings.spray_probability < 1.0;
    let mut changed = 0;

    for (px, py) in points {
        stamp = stamp.wrapping_add(1);
        for by in 0..width {
            for bx in 0..width {
                let cx = px - half + bx;
                let cy = py - half + by;
                let Some(idx) = layer.index(cx, cy) else { continue };
                if !ctx.mask.is_selected(idx) {
                    continue;
                }
                if spray && hash_f32(cx as u32, cy as u32, stamp) >= settings.spray_probability {
                    continue;
                }
                if layer.put_recorded(idx, settings.color, settings.preserve_transparency) {
                    changed += 1;
                }
            }
        }
    }

    layer.stroke = Some(StrokeState {
        last: (x, y),
        stamp,
    });
    Ok(changed)
}

/// Close the open stroke.  Returns the number of records in its frame.
pub fn end_stroke(layer: &mut Layer) -> usize {
    match layer.stroke.take() {
        Some(_) => layer.history.open_frame_len(),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::SelectionMask;
    use crate::components::colors::Color;
    use crate::settings::EditorSettings;
    use crate::viewport::ZoomPan;

    const RED: Color = Color::rgba(255, 0, 0, 255);

    fn run(layer: &mut Layer, settings: &EditorSettings, pts: &[(i64, i64)]) -> usize {
        let mask = SelectionMask::new(layer.cols, layer.rows);
        let view = ZoomPan::default();
        let ctx = EditContext {
            mask: &mask,
            settings,
            view: &view,
        };
        let n = pts
            .iter()
            .map(|&(x, y)| paint(layer, &ctx, x, y).unwrap())
            .sum();
        end_stroke(layer);
        n
    }

    #[test]
    fn bresenham_includes_both_ends() {
        assert_eq!(line_points((0, 0), (3, 1)), vec![(0, 0), (1, 0), (2, 1), (3, 1)]);
        assert_eq!(line_points((2, 2), (2, 2)), vec![(2, 2)]);
        assert_eq!(line_points((0, 3), (0, 0)).len(), 4);
    }

    #[test]
    fn stroke_interpolates_and_is_one_frame() {
        let mut layer = Layer::new("t", 8, 8, 10);
        let settings = EditorSettings {
            color: RED,
            ..EditorSettings::default()
        };
        assert_eq!(run(&mut layer, &settings, &[(0, 0), (5, 0)]), 6);
        assert_eq!(layer.history.undo_count(), 1);
        assert!((0..6).all(|x| layer.get(x, 0) == Some(RED)));
        layer.undo().unwrap();
        assert!(layer.buffer.iter().all(|c| *c == Color::TRANSPARENT));
    }

    #[test]
    fn wide_brush_is_clipped_to_canvas() {
        let mut layer = Layer::new("t", 4, 4, 10);
        let mut settings = EditorSettings {
            color: RED,
            ..EditorSettings::default()
        };
        settings.set_line_width(3);
        assert_eq!(run(&mut layer, &settings, &[(0, 0)]), 4);
    }

    #[test]
    fn far_off_canvas_samples_are_clipped() {
        let settings = EditorSettings {
            color: RED,
            ..EditorSettings::default()
        };
        let mut layer = Layer::new("t", 4, 2, 10);
        assert_eq!(run(&mut layer, &settings, &[(-1_000_000_000_000, 0)]), 0);
        assert_eq!(
            run(&mut layer, &settings, &[(-1_000_000_000_000, 0), (1_000_000_000_000, 0)]),
            4
        );
        assert!((0..4).all(|x| layer.get(x, 0) == Some(RED)));
        assert!((0..4).all(|x| layer.get(x, 1) == Some(Color::TRANSPARENT)));

        let mut diag = Layer::new("d", 4, 4, 10);
        let far = 1_000_000_000_000;
        assert_eq!(run(&mut diag, &settings, &[(-far, -far), (far, far)]), 4);
        assert!((0..4).all(|i| diag.get(i, i) == Some(RED)));
    }

    #[test]
    fn clipped_segment_stays_inside_padding() {
        let clipped = clip_segment((-50, 1), (50, 1), (-2, -2), (6, 6));
        assert_eq!(clipped, Some(((-2, 1), (6, 1))));
        assert_eq!(clip_segment((-50, -50), (-40, -50), (-2, -2), (6, 6)), None);
        assert_eq!(clip_segment((1, 1), (3, 2), (-2, -2), (6, 6)), Some(((1, 1), (3, 2))));
    }

    #[test]
    fn spray_is_deterministic_and_partial() {
        let settings = EditorSettings {
            color: RED,
            line_width: 8,
            spray_probability: 0.5,
            ..EditorSettings::default()
        };
        let mut a = Layer::new("a", 8, 8, 10);
        let mut b = Layer::new("b", 8, 8, 10);
        let na = run(&mut a, &settings, &[(4, 4)]);
        let nb = run(&mut b, &settings, &[(4, 4)]);
        assert_eq!(a.buffer, b.buffer);
        assert_eq!(na, nb);
        assert!(na > 0 && na < 64);
    }
}
