// ============================================================================
// PIXEL-GROUP TRANSFORM — extract, drag, rotate and commit floating pixels
// ============================================================================

use std::collections::HashMap;

use crate::canvas::{EditContext, EditResult, FloatingSelection, Layer, NoOp, PixelQuad};
use crate::components::colors::Color;
use crate::viewport::ZoomPan;

/// Sub-samples per quad edge in the anti-aliased commit.
pub const SUPERSAMPLE: usize = 10;
/// Samples that make up full coverage of one destination cell.
pub const FULL_COVERAGE: u32 = (SUPERSAMPLE * SUPERSAMPLE) as u32;

type Mat3 = [[f64; 3]; 3];

fn mat_mul(a: Mat3, b: Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

fn translation(tx: f64, ty: f64) -> Mat3 {
    [[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]]
}

fn rotation(theta: f64) -> Mat3 {
    let (s, c) = theta.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

#[inline]
fn apply(m: &Mat3, (x, y): (f64, f64)) -> (f64, f64) {
    (
        m[0][0] * x + m[0][1] * y + m[0][2],
        m[1][0] * x + m[1][1] * y + m[1][2],
    )
}

// ---------------------------------------------------------------------------
//  Extraction
// ---------------------------------------------------------------------------

/// Lift the 8-connected group under `(x, y)` into a floating selection.
///
/// With `same_color_only` the group is every masked cell of the seed's color,
/// otherwise every masked non-transparent cell.  Lifted cells are cleared to
/// transparent in one undo frame.  A floating selection already present is
/// committed first.
pub fn extract_auto(layer: &mut Layer, ctx: &EditContext<'_>, x: i64, y: i64) -> EditResult {
    let _guard = layer.write_lock().try_acquire()?;
    let seed = layer.index(x, y).ok_or(NoOp::OutOfBounds)?;
    drop_floating(layer, ctx);

    let seed_color = layer.buffer[seed];
    let same_color_only = ctx.settings.same_color_only;
    let takes = |c: Color| {
        if same_color_only { c == seed_color } else { c.a() > 0 }
    };

    let cols = layer.cols as usize;
    let rows = layer.rows as usize;
    let mut taken = Vec::new();
    if ctx.mask.is_selected(seed) && takes(seed_color) {
        let mut visited = vec![false; cols * rows];
        let mut stack = vec![seed];
        visited[seed] = true;
        while let Some(idx) = stack.pop() {
            taken.push(idx);
            let (cx, cy) = ((idx % cols) as i64, (idx / cols) as i64);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let Some(n) = layer.index(cx + dx, cy + dy) else { continue };
                    if !visited[n] && ctx.mask.is_selected(n) && takes(layer.buffer[n]) {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
    }
    lift(layer, taken)
}

/// Lift every masked non-transparent cell into a floating selection.
pub fn extract_masked(layer: &mut Layer, ctx: &EditContext<'_>) -> EditResult {
    let _guard = layer.write_lock().try_acquire()?;
    drop_floating(layer, ctx);
    let taken: Vec<usize> = (0..layer.buffer.len())
        .filter(|&i| ctx.mask.is_selected(i) && layer.buffer[i].a() > 0)
        .collect();
    lift(layer, taken)
}

fn drop_floating(layer: &mut Layer, ctx: &EditContext<'_>) {
    if layer.floating.is_some() {
        let result = commit_locked(layer, ctx);
        crate::log_info!("Committed previous floating selection ({:?})", result);
    }
}

fn lift(layer: &mut Layer, mut taken: Vec<usize>) -> EditResult {
    if taken.is_empty() {
        return Err(NoOp::NothingToExtract);
    }
    taken.sort_unstable();
    layer.stroke = None;
    layer.history.begin_frame();
    let cols = layer.cols as usize;
    let mut quads = Vec::with_capacity(taken.len());
    for idx in taken {
        let color = layer.buffer[idx];
        quads.push(PixelQuad::unit((idx % cols) as i32, (idx / cols) as i32, color));
        layer.write_recorded(idx, Color::TRANSPARENT);
    }
    let n = quads.len();
    layer.floating = Some(FloatingSelection {
        anchor: (0.0, 0.0),
        quads,
    });
    Ok(n)
}

// ---------------------------------------------------------------------------
//  Drag / rotate
// ---------------------------------------------------------------------------

/// Move the floating selection by a view-space delta.
pub fn drag(layer: &mut Layer, view: &ZoomPan, dvx: f64, dvy: f64) -> EditResult {
    let floating = layer.floating.as_mut().ok_or(NoOp::NoFloatingSelection)?;
    let (dx, dy) = view.delta_to_document(dvx, dvy);
    floating.anchor.0 += dx;
    floating.anchor.1 += dy;
    Ok(floating.len())
}

/// Rotate the floating selection by `theta` radians about a document-space
/// `center` (default: center of its bounding box).
///
/// Without anti-aliasing the transformed corners snap to whole cells.
pub fn rotate(
    layer: &mut Layer,
    ctx: &EditContext<'_>,
    theta: f64,
    center: Option<(f64, f64)>,
) -> EditResult {
    let floating = layer.floating.as_mut().ok_or(NoOp::NoFloatingSelection)?;
    let Some((cx, cy)) = center.or_else(|| floating.center()) else {
        return Err(NoOp::NoFloatingSelection);
    };
    // Quad corners are anchor-relative.
    let (lx, ly) = (cx - floating.anchor.0, cy - floating.anchor.1);
    let m = mat_mul(
        mat_mul(translation(lx, ly), rotation(theta)),
        translation(-lx, -ly),
    );
    let snap = !ctx.settings.anti_aliased;
    for quad in &mut floating.quads {
        for corner in &mut quad.corners {
            let (x, y) = apply(&m, *corner);
            *corner = if snap { (x.round(), y.round()) } else { (x, y) };
        }
    }
    Ok(floating.len())
}

// ---------------------------------------------------------------------------
//  Commit
// ---------------------------------------------------------------------------

/// Drop the floating selection onto the layer as one undo frame.
pub fn commit(layer: &mut Layer, ctx: &EditContext<'_>) -> EditResult {
    let _guard = layer.write_lock().try_acquire()?;
    commit_locked(layer, ctx)
}

pub(crate) fn commit_locked(layer: &mut Layer, ctx: &EditContext<'_>) -> EditResult {
    let floating = layer.floating.take().ok_or(NoOp::NoFloatingSelection)?;
    layer.stroke = None;
    layer.history.begin_frame();

    let blend = ctx.settings.preserve_transparency;
    let outside = ctx.settings.drop_outside_selection;
    let mut changed = 0;

    if ctx.settings.anti_aliased {
        let mut cells: Vec<(usize, Coverage)> =
            accumulate_coverage(&floating, layer.cols, layer.rows)
                .into_iter()
                .collect();
        cells.sort_unstable_by_key(|(i, _)| *i);
        for (idx, cov) in cells {
            if (ctx.mask.is_selected(idx) || outside)
                && layer.put_recorded(idx, cov.color(), blend)
            {
                changed += 1;
            }
        }
    } else {
        for ((x, y), color) in floating.aliased_cells() {
            let Some(idx) = layer.index(x, y) else { continue };
            if (ctx.mask.is_selected(idx) || outside) && layer.put_recorded(idx, color, blend) {
                changed += 1;
            }
        }
    }
    Ok(changed)
}

/// Supersampled contribution to one destination cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Coverage {
    pub samples: u32,
    sum_r: u32,
    sum_g: u32,
    sum_b: u32,
    sum_a: u32,
}

impl Coverage {
    /// Accumulated weight in 0..=1.
    pub fn weight(&self) -> f64 {
        self.samples as f64 / FULL_COVERAGE as f64
    }

    fn add(&mut self, c: Color) -> bool {
        if self.samples >= FULL_COVERAGE {
            return false;
        }
        self.samples += 1;
        self.sum_r += c.r() as u32;
        self.sum_g += c.g() as u32;
        self.sum_b += c.b() as u32;
        self.sum_a += c.a() as u32;
        true
    }

    /// Weight-normalized RGB with alpha scaled by coverage.
    pub fn color(&self) -> Color {
        if self.samples == 0 {
            return Color::TRANSPARENT;
        }
        let n = self.samples as f64;
        let avg = |s: u32| (s as f64 / n).round().min(255.0) as u8;
        let a = (self.sum_a as f64 / FULL_COVERAGE as f64).round().min(255.0) as u8;
        Color::rgba(avg(self.sum_r), avg(self.sum_g), avg(self.sum_b), a)
    }
}

/// Sample every quad on a 10×10 grid and accumulate per destination cell.
/// Samples outside the layer are dropped; saturated cells ignore further
/// samples.
pub fn accumulate_coverage(
    floating: &FloatingSelection,
    cols: u32,
    rows: u32,
) -> HashMap<usize, Coverage> {
    let mut acc: HashMap<usize, Coverage> = HashMap::new();
    let (ax, ay) = floating.anchor;
    let step = 1.0 / SUPERSAMPLE as f64;
    for quad in &floating.quads {
        for j in 0..SUPERSAMPLE {
            let v = (j as f64 + 0.5) * step;
            for i in 0..SUPERSAMPLE {
                let u = (i as f64 + 0.5) * step;
                let (sx, sy) = quad.sample(u, v);
                let (x, y) = ((sx + ax).floor(), (sy + ay).floor());
                if x < 0.0 || y < 0.0 || x >= cols as f64 || y >= rows as f64 {
                    continue;
                }
                let idx = x as usize + y as usize * cols as usize;
                acc.entry(idx).or_default().add(quad.color);
            }
        }
    }
    acc
}
