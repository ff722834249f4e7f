// ============================================================================
// SELECTION MASK RASTERIZER — rectangle (sync) and polygon (worker pool)
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::canvas::{Document, SelectionMask};

/// Minimum worker count of the polygon pool.
const MIN_WORKERS: usize = 4;

/// Shape the current mask was built from, kept for the overlay.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionShape {
    Rect { x0: f64, y0: f64, x1: f64, y1: f64 },
    Polygon(Vec<(f64, f64)>),
}

/// Tolerance for a point lying on a polygon edge.
const EDGE_EPSILON: f64 = 1e-9;

fn on_segment(px: f64, py: f64, (ax, ay): (f64, f64), (bx, by): (f64, f64)) -> bool {
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    cross.abs() <= EDGE_EPSILON
        && px >= ax.min(bx) - EDGE_EPSILON
        && px <= ax.max(bx) + EDGE_EPSILON
        && py >= ay.min(by) - EDGE_EPSILON
        && py <= ay.max(by) + EDGE_EPSILON
}

/// Edge-crossing parity test.  Points on an edge count as inside, matching
/// the inclusive bounds of rectangle selections.
pub fn point_in_polygon(px: f64, py: f64, points: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let mut j = points.len().wrapping_sub(1);
    for (i, &(xi, yi)) in points.iter().enumerate() {
        let (xj, yj) = points[j];
        if on_segment(px, py, (xi, yi), (xj, yj)) {
            return true;
        }
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Cell-center-in-polygon flags for `start..end` of a `cols`-wide grid.
fn rasterize_range(points: &[(f64, f64)], cols: usize, start: usize, end: usize) -> Vec<bool> {
    (start..end)
        .map(|i| {
            let cx = (i % cols) as f64 + 0.5;
            let cy = (i / cols) as f64 + 0.5;
            point_in_polygon(cx, cy, points)
        })
        .collect()
}

struct ChunkResult {
    generation: u64,
    start: usize,
    bits: Vec<bool>,
}

#[derive(Debug)]
struct PolygonRequest {
    generation: u64,
    points: Arc<[(f64, f64)]>,
}

/// Builds the document's selection mask.
///
/// Polygon masks are split into one contiguous index range per worker and
/// computed on a dedicated rayon pool; chunk results come back over a
/// channel and are applied by [`MaskRasterizer::poll`] or
/// [`MaskRasterizer::wait`] once the whole batch has arrived.  At most one
/// batch is in flight: a request made meanwhile is queued (latest wins).
/// Every request bumps the generation, and a batch that finishes under an
/// older generation is thrown away.
pub struct MaskRasterizer {
    pool: Option<ThreadPool>,
    workers: usize,
    tx: Sender<ChunkResult>,
    rx: Receiver<ChunkResult>,
    generation: u64,
    in_flight: usize,
    received: Vec<ChunkResult>,
    queued: Option<PolygonRequest>,
    discarded: usize,
}

impl MaskRasterizer {
    /// `workers == 0` picks `available_parallelism`.  Never fewer than four.
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_WORKERS)
                .max(MIN_WORKERS)
        } else {
            workers.max(MIN_WORKERS)
        };
        let pool = match ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("spritefe-mask-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                crate::log_err!("Mask pool unavailable, using the global pool: {}", e);
                None
            }
        };
        let (tx, rx) = mpsc::channel();
        Self {
            pool,
            workers,
            tx,
            rx,
            generation: 0,
            in_flight: 0,
            received: Vec::new(),
            queued: None,
            discarded: 0,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A batch is running or waiting to run.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0 || self.queued.is_some()
    }

    /// Completed batches dropped because a newer request superseded them.
    pub fn discarded_batches(&self) -> usize {
        self.discarded
    }

    /// Synchronous rectangle mask: a cell is selected when its center lies in
    /// the rectangle spanned by the two corners (inclusive, any order).
    pub fn select_rect(&mut self, mask: &mut SelectionMask, a: (f64, f64), b: (f64, f64)) {
        self.supersede();
        let (x0, x1) = (a.0.min(b.0), a.0.max(b.0));
        let (y0, y1) = (a.1.min(b.1), a.1.max(b.1));
        let (cols, rows) = mask.dimensions();
        for y in 0..rows {
            let cy = y as f64 + 0.5;
            for x in 0..cols {
                let cx = x as f64 + 0.5;
                let inside = cx >= x0 && cx <= x1 && cy >= y0 && cy <= y1;
                mask.set((x + y * cols) as usize, inside);
            }
        }
    }

    /// Select everything and forget pending polygon work.
    pub fn reset(&mut self, mask: &mut SelectionMask) {
        self.supersede();
        mask.reset();
    }

    /// Start (or queue) a polygon mask.  Fewer than three vertices select
    /// everything.
    pub fn request_polygon(&mut self, mask: &mut SelectionMask, points: &[(f64, f64)]) {
        if points.len() < 3 {
            self.reset(mask);
            return;
        }
        self.supersede();
        let request = PolygonRequest {
            generation: self.generation,
            points: points.into(),
        };
        if self.in_flight > 0 {
            self.queued = Some(request);
        } else {
            self.dispatch(request, mask.dimensions());
        }
    }

    fn supersede(&mut self) {
        self.generation += 1;
        self.queued = None;
    }

    fn dispatch(&mut self, request: PolygonRequest, (cols, rows): (u32, u32)) {
        let total = cols as usize * rows as usize;
        if total == 0 {
            return;
        }
        let chunk = total.div_ceil(self.workers);
        let cols = cols as usize;
        let mut start = 0;
        while start < total {
            let end = (start + chunk).min(total);
            let tx = self.tx.clone();
            let points = Arc::clone(&request.points);
            let generation = request.generation;
            let job = move || {
                let bits = rasterize_range(&points, cols, start, end);
                let _ = tx.send(ChunkResult {
                    generation,
                    start,
                    bits,
                });
            };
            match &self.pool {
                Some(pool) => pool.spawn(job),
                None => rayon::spawn(job),
            }
            self.in_flight += 1;
            start = end;
        }
    }

    /// Apply any finished batch without blocking.  Returns `true` when the
    /// mask changed.
    pub fn poll(&mut self, mask: &mut SelectionMask) -> bool {
        let mut changed = false;
        while self.in_flight > 0 {
            match self.rx.try_recv() {
                Ok(chunk) => changed |= self.receive(chunk, mask),
                Err(_) => break,
            }
        }
        changed
    }

    /// Block until no batch is running or queued.
    pub fn wait(&mut self, mask: &mut SelectionMask) -> bool {
        let mut changed = false;
        while self.in_flight > 0 {
            match self.rx.recv() {
                Ok(chunk) => changed |= self.receive(chunk, mask),
                Err(_) => break,
            }
        }
        changed
    }

    fn receive(&mut self, chunk: ChunkResult, mask: &mut SelectionMask) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.received.push(chunk);
        if self.in_flight > 0 {
            return false;
        }

        let mut chunks = std::mem::take(&mut self.received);
        let current = chunks.iter().all(|c| c.generation == self.generation);
        if current {
            chunks.sort_unstable_by_key(|c| c.start);
            for c in &chunks {
                mask.write_range(c.start, &c.bits);
            }
        } else {
            self.discarded += 1;
            crate::log_warn!("Discarded stale selection mask batch");
        }

        if let Some(next) = self.queued.take() {
            self.dispatch(next, mask.dimensions());
        }
        current
    }
}

// ---------------------------------------------------------------------------
//  Document-level selection commands
// ---------------------------------------------------------------------------

pub fn select_rect(doc: &mut Document, a: (f64, f64), b: (f64, f64)) {
    doc.rasterizer.select_rect(&mut doc.mask, a, b);
    doc.selection_shape = Some(SelectionShape::Rect {
        x0: a.0.min(b.0),
        y0: a.1.min(b.1),
        x1: a.0.max(b.0),
        y1: a.1.max(b.1),
    });
}

pub fn select_polygon(doc: &mut Document, points: &[(f64, f64)]) {
    doc.rasterizer.request_polygon(&mut doc.mask, points);
    doc.selection_shape = (points.len() >= 3).then(|| SelectionShape::Polygon(points.to_vec()));
}

pub fn clear_selection(doc: &mut Document) {
    doc.rasterizer.reset(&mut doc.mask);
    doc.selection_shape = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<(f64, f64)> {
        vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
    }

    #[test]
    fn rect_and_equal_polygon_agree() {
        let mut rect = SelectionMask::new(9, 7);
        let mut poly = SelectionMask::new(9, 7);
        // 63 cells over 4 workers leaves a short final chunk.
        let mut r = MaskRasterizer::new(4);
        r.select_rect(&mut rect, (6.0, 5.0), (2.0, 1.0));
        r.request_polygon(&mut poly, &square(2.0, 1.0, 6.0, 5.0));
        assert!(r.wait(&mut poly));
        assert_eq!(rect, poly);
        assert_eq!(rect.selected_count(), 16);
    }

    #[test]
    fn cell_centers_on_the_border_are_selected_by_both_shapes() {
        let mut rect = SelectionMask::new(4, 4);
        let mut poly = SelectionMask::new(4, 4);
        let mut r = MaskRasterizer::new(4);
        r.select_rect(&mut rect, (0.5, 0.5), (2.5, 2.5));
        r.request_polygon(&mut poly, &square(0.5, 0.5, 2.5, 2.5));
        r.wait(&mut poly);
        assert_eq!(rect.selected_count(), 9);
        assert_eq!(rect, poly);

        // Same for a triangle whose hypotenuse runs through cell centers.
        assert!(point_in_polygon(1.5, 1.5, &[(0.5, 0.5), (2.5, 2.5), (0.5, 2.5)]));
        assert!(!point_in_polygon(2.5, 1.5, &[(0.5, 0.5), (2.5, 2.5), (0.5, 2.5)]));
    }

    #[test]
    fn worker_count_never_drops_below_minimum() {
        assert_eq!(MaskRasterizer::new(1).workers(), MIN_WORKERS);
        assert_eq!(MaskRasterizer::new(6).workers(), 6);
        assert!(MaskRasterizer::new(0).workers() >= MIN_WORKERS);
    }

    #[test]
    fn chunking_covers_every_cell() {
        // 5 workers over 23 cells leaves a short final chunk.
        let mut mask = SelectionMask::new(23, 1);
        let mut r = MaskRasterizer::new(5);
        r.request_polygon(&mut mask, &square(-1.0, -1.0, 30.0, 2.0));
        r.wait(&mut mask);
        assert!(mask.is_full());
        r.request_polygon(&mut mask, &square(10.0, -1.0, 12.0, 2.0));
        r.wait(&mut mask);
        assert_eq!(mask.selected_count(), 2);
        assert!(mask.get(10, 0) && mask.get(11, 0));
    }

    #[test]
    fn too_few_points_select_everything() {
        let mut mask = SelectionMask::new(4, 4);
        let mut r = MaskRasterizer::new(4);
        r.select_rect(&mut mask, (0.0, 0.0), (1.0, 1.0));
        r.request_polygon(&mut mask, &[(0.0, 0.0), (3.0, 3.0)]);
        assert!(mask.is_full());
        assert!(!r.is_busy());
    }

    #[test]
    fn newer_request_wins_over_in_flight_batch() {
        let mut mask = SelectionMask::new(16, 16);
        let mut r = MaskRasterizer::new(4);
        r.request_polygon(&mut mask, &square(0.0, 0.0, 8.0, 8.0));
        r.request_polygon(&mut mask, &square(8.0, 8.0, 16.0, 16.0));
        r.wait(&mut mask);
        assert!(!r.is_busy());
        assert_eq!(r.discarded_batches(), 1);
        assert!(!mask.get(0, 0));
        assert!(mask.get(15, 15));
    }

    #[test]
    fn rect_selection_discards_pending_polygon() {
        let mut mask = SelectionMask::new(16, 16);
        let mut r = MaskRasterizer::new(4);
        r.request_polygon(&mut mask, &square(0.0, 0.0, 16.0, 16.0));
        r.select_rect(&mut mask, (0.0, 0.0), (1.0, 1.0));
        r.wait(&mut mask);
        assert_eq!(mask.selected_count(), 1);
        assert_eq!(r.discarded_batches(), 1);
    }

    #[test]
    fn concave_polygon_uses_parity() {
        // "U" shape: the notch at x = 2..3, y = 0..2 stays unselected.
        let u = vec![
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 2.0),
            (3.0, 2.0),
            (3.0, 0.0),
            (5.0, 0.0),
            (5.0, 3.0),
            (0.0, 3.0),
        ];
        let mut mask = SelectionMask::new(5, 3);
        let mut r = MaskRasterizer::new(4);
        r.request_polygon(&mut mask, &u);
        r.wait(&mut mask);
        assert!(!mask.get(2, 0));
        assert!(!mask.get(2, 1));
        assert!(mask.get(2, 2));
        assert_eq!(mask.selected_count(), 13);
    }
}
