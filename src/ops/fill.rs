use std::collections::VecDeque;

use crate::canvas::{EditContext, EditResult, Layer, NoOp, SelectionMask};
use crate::components::colors::Color;

// ============================================================================
// FLOOD FILL
// ============================================================================

/// Order in which the fill frontier is expanded.  Both visit the same cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillStrategy {
    /// Depth-first, `Vec` stack.
    Stack,
    /// Breadth-first, `VecDeque` queue.  Grows as a visible ring.
    Queue,
}

impl FillStrategy {
    pub fn from_slow_flag(slow_fill: bool) -> Self {
        if slow_fill { FillStrategy::Queue } else { FillStrategy::Stack }
    }
}

trait Frontier {
    fn put(&mut self, index: usize);
    fn take(&mut self) -> Option<usize>;
}

impl Frontier for Vec<usize> {
    fn put(&mut self, index: usize) {
        self.push(index);
    }
    fn take(&mut self) -> Option<usize> {
        self.pop()
    }
}

impl Frontier for VecDeque<usize> {
    fn put(&mut self, index: usize) {
        self.push_back(index);
    }
    fn take(&mut self) -> Option<usize> {
        self.pop_front()
    }
}

/// Borrowed grid the search runs over.
struct FillGrid<'a> {
    buffer: &'a [Color],
    mask: &'a SelectionMask,
    cols: usize,
    rows: usize,
    seed_color: Color,
    ignore_alpha_zero: bool,
}

impl FillGrid<'_> {
    #[inline]
    fn accepts(&self, index: usize) -> bool {
        if !self.mask.is_selected(index) {
            return false;
        }
        let c = self.buffer[index];
        c == self.seed_color || (self.ignore_alpha_zero && c.a() == 0)
    }

    /// Visit the 4-connected region reachable from `seed`, in the frontier's
    /// order.
    fn search<F: Frontier>(&self, mut frontier: F, seed: usize) -> Vec<usize> {
        let mut visited = vec![false; self.cols * self.rows];
        let mut order = Vec::new();
        if !self.accepts(seed) {
            return order;
        }
        visited[seed] = true;
        frontier.put(seed);

        while let Some(idx) = frontier.take() {
            order.push(idx);
            let x = idx % self.cols;
            let y = idx / self.cols;

            let mut try_push = |n: usize| {
                if !visited[n] && self.accepts(n) {
                    visited[n] = true;
                    frontier.put(n);
                }
            };
            if x > 0 {
                try_push(idx - 1);
            }
            if x + 1 < self.cols {
                try_push(idx + 1);
            }
            if y > 0 {
                try_push(idx - self.cols);
            }
            if y + 1 < self.rows {
                try_push(idx + self.cols);
            }
        }
        order
    }
}

/// Cells a fill seeded at `(x, y)` would reach, in visit order.
pub fn fill_region(
    layer: &Layer,
    mask: &SelectionMask,
    x: i64,
    y: i64,
    ignore_alpha_zero: bool,
    strategy: FillStrategy,
) -> Option<Vec<usize>> {
    let seed = layer.index(x, y)?;
    let grid = FillGrid {
        buffer: &layer.buffer,
        mask,
        cols: layer.cols as usize,
        rows: layer.rows as usize,
        seed_color: layer.buffer[seed],
        ignore_alpha_zero,
    };
    Some(match strategy {
        FillStrategy::Stack => grid.search(Vec::with_capacity(4096), seed),
        FillStrategy::Queue => grid.search(VecDeque::with_capacity(4096), seed),
    })
}

/// Fill the region under `(x, y)` with the current color as one undo frame.
///
/// Returns the number of recorded changes; cells already holding the color
/// are part of the region but are not recorded.
pub fn flood_fill(layer: &mut Layer, ctx: &EditContext<'_>, x: i64, y: i64) -> EditResult {
    let _guard = layer.write_lock().try_acquire()?;
    let strategy = FillStrategy::from_slow_flag(ctx.settings.slow_fill);
    let region = fill_region(layer, ctx.mask, x, y, ctx.settings.ignore_alpha_zero, strategy)
        .ok_or(NoOp::OutOfBounds)?;

    let target = ctx.settings.color;
    layer.stroke = None;
    layer.history.begin_frame();
    let mut changed = 0;
    for idx in region {
        if layer.write_recorded(idx, target) {
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::EditorSettings;
    use crate::viewport::ZoomPan;

    const RED: Color = Color::rgba(255, 0, 0, 255);
    const WALL: Color = Color::rgba(0, 0, 0, 255);

    fn walled_layer() -> Layer {
        // 5x5 with a vertical wall at x = 2, open at y = 4.
        let mut layer = Layer::new("t", 5, 5, 10);
        for y in 0..4 {
            let i = layer.index(2, y).unwrap();
            layer.buffer[i] = WALL;
        }
        layer
    }

    #[test]
    fn strategies_visit_the_same_cells() {
        let layer = walled_layer();
        let mask = SelectionMask::new(5, 5);
        let mut a = fill_region(&layer, &mask, 0, 0, false, FillStrategy::Stack).unwrap();
        let mut b = fill_region(&layer, &mask, 0, 0, false, FillStrategy::Queue).unwrap();
        assert_eq!(a.len(), 21);
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }

    #[test]
    fn fill_is_stopped_by_the_mask() {
        let layer = Layer::new("t", 4, 1, 10);
        let mut mask = SelectionMask::new(4, 1);
        mask.set(2, false);
        let region = fill_region(&layer, &mask, 0, 0, false, FillStrategy::Stack).unwrap();
        assert_eq!(region.len(), 2);
    }

    #[test]
    fn ignore_alpha_zero_spreads_into_any_transparent_cell() {
        let mut layer = Layer::new("t", 3, 1, 10);
        layer.buffer[0] = RED;
        layer.buffer[1] = Color::rgba(10, 20, 30, 0);
        let mask = SelectionMask::new(3, 1);
        let strict = fill_region(&layer, &mask, 0, 0, false, FillStrategy::Stack).unwrap();
        assert_eq!(strict.len(), 1);
        let loose = fill_region(&layer, &mask, 0, 0, true, FillStrategy::Stack).unwrap();
        assert_eq!(loose.len(), 3);
    }

    #[test]
    fn flood_fill_records_one_frame() {
        let mut layer = walled_layer();
        let mask = SelectionMask::new(5, 5);
        let settings = EditorSettings {
            color: RED,
            ..EditorSettings::default()
        };
        let view = ZoomPan::default();
        let ctx = EditContext {
            mask: &mask,
            settings: &settings,
            view: &view,
        };
        assert_eq!(flood_fill(&mut layer, &ctx, 4, 0), Ok(21));
        assert_eq!(layer.history.undo_count(), 1);
        // Second fill on the now-red region changes nothing.
        assert_eq!(flood_fill(&mut layer, &ctx, 4, 0), Ok(0));
        assert_eq!(flood_fill(&mut layer, &ctx, 9, 0), Err(NoOp::OutOfBounds));
    }
}
