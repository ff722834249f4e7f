use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::components::colors::{Color, blend_over, blend_with_opacity};
use crate::components::history::{Direction, History, PacedReplay};
use crate::ops::selection::{MaskRasterizer, SelectionShape};
use crate::settings::{EditorSettings, EngineConfig};
use crate::viewport::ZoomPan;

/// Largest accepted canvas edge, in cells.
pub const MAX_CANVAS_DIM: u32 = 4096;

// ============================================================================
// NO-OP CONDITIONS
// ============================================================================

/// Why a mutating operation did nothing.
///
/// These are not failures: callers log them and carry on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoOp {
    /// The layer's write-lock is held by another operation.
    Busy,
    NothingToUndo,
    NothingToRedo,
    OutOfBounds,
    NoFloatingSelection,
    NothingToExtract,
    EmptyClipboard,
    LastLayer,
    NoSuchLayer,
}

impl std::fmt::Display for NoOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NoOp::Busy => "layer is busy",
            NoOp::NothingToUndo => "nothing to undo",
            NoOp::NothingToRedo => "nothing to redo",
            NoOp::OutOfBounds => "outside the canvas",
            NoOp::NoFloatingSelection => "no floating selection",
            NoOp::NothingToExtract => "nothing to extract",
            NoOp::EmptyClipboard => "clipboard is empty",
            NoOp::LastLayer => "cannot delete the last layer",
            NoOp::NoSuchLayer => "no such layer",
        };
        f.write_str(s)
    }
}

/// Number of changed cells, or the reason nothing happened.
pub type EditResult = Result<usize, NoOp>;

/// Log a skipped operation.  Busy layers are worth a warning, the rest are
/// ordinary user actions with nothing to do.
pub fn note_skipped(op: &str, result: &EditResult) {
    match result {
        Err(NoOp::Busy) => {
            crate::log_warn!("{}: skipped, layer is busy", op);
        }
        Err(reason) => {
            crate::log_info!("{}: skipped, {}", op, reason);
        }
        Ok(_) => {}
    }
}

// ============================================================================
// WRITE LOCK — single writer per layer
// ============================================================================

/// Single-writer flag of a layer.
///
/// `try_acquire` either hands out a guard or reports [`NoOp::Busy`]; the
/// guard releases the lock when dropped, so every exit path of an operation
/// unlocks.  The guard owns a handle to the flag rather than borrowing the
/// layer, leaving the layer free to be mutated while it is held.
#[derive(Debug, Default)]
pub struct WriteLock {
    held: Arc<AtomicBool>,
}

impl WriteLock {
    pub fn try_acquire(&self) -> Result<WriteGuard, NoOp> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| WriteGuard {
                held: Arc::clone(&self.held),
            })
            .map_err(|_| NoOp::Busy)
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct WriteGuard {
    held: Arc<AtomicBool>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

// ============================================================================
// SELECTION MASK
// ============================================================================

/// One flag per cell, `true` = editable.  A full mask means "no selection".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionMask {
    cols: u32,
    rows: u32,
    bits: Vec<bool>,
}

impl SelectionMask {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self {
            cols,
            rows,
            bits: vec![true; cols as usize * rows as usize],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    #[inline]
    pub fn is_selected(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.cols && y < self.rows && self.bits[(x + y * self.cols) as usize]
    }

    pub fn set(&mut self, index: usize, value: bool) {
        if let Some(b) = self.bits.get_mut(index) {
            *b = value;
        }
    }

    /// Select everything again.
    pub fn reset(&mut self) {
        self.bits.fill(true);
    }

    /// Resize to new document dimensions.  The selection is cleared.
    pub fn resize(&mut self, cols: u32, rows: u32) {
        self.cols = cols;
        self.rows = rows;
        self.bits.clear();
        self.bits.resize(cols as usize * rows as usize, true);
    }

    /// Overwrite `bits[start..start + values.len()]`, clipped to the mask.
    pub fn write_range(&mut self, start: usize, values: &[bool]) {
        if start >= self.bits.len() {
            return;
        }
        let end = (start + values.len()).min(self.bits.len());
        self.bits[start..end].copy_from_slice(&values[..end - start]);
    }

    pub fn is_full(&self) -> bool {
        self.bits.iter().all(|b| *b)
    }

    pub fn selected_count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }
}

// ============================================================================
// FLOATING SELECTION — lifted pixels being dragged / rotated
// ============================================================================

/// One lifted source cell: its four corners and its color.
///
/// Corners are stored in the order `(x,y), (x+1,y), (x,y+1), (x+1,y+1)` and
/// are transformed independently, so a rotated cell becomes an arbitrary
/// parallelogram that the anti-aliased commit can supersample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelQuad {
    pub corners: [(f64, f64); 4],
    pub color: Color,
}

impl PixelQuad {
    pub fn unit(x: i32, y: i32, color: Color) -> Self {
        let (x, y) = (x as f64, y as f64);
        Self {
            corners: [(x, y), (x + 1.0, y), (x, y + 1.0), (x + 1.0, y + 1.0)],
            color,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        let (sx, sy) = self
            .corners
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        (sx / 4.0, sy / 4.0)
    }

    /// Bilinear point inside the quad, `u` along the first edge and `v` along
    /// the second, both in 0..=1.
    #[inline]
    pub fn sample(&self, u: f64, v: f64) -> (f64, f64) {
        let [c0, c1, c2, c3] = self.corners;
        let w0 = (1.0 - u) * (1.0 - v);
        let w1 = u * (1.0 - v);
        let w2 = (1.0 - u) * v;
        let w3 = u * v;
        (
            c0.0 * w0 + c1.0 * w1 + c2.0 * w2 + c3.0 * w3,
            c0.1 * w0 + c1.1 * w1 + c2.1 * w2 + c3.1 * w3,
        )
    }
}

/// Pixels lifted off a layer.  Quad corners are relative to `anchor`, which
/// starts at (0, 0) and accumulates drag movement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatingSelection {
    pub anchor: (f64, f64),
    pub quads: Vec<PixelQuad>,
}

impl FloatingSelection {
    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    /// Document-space bounding box `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut iter = self.quads.iter().flat_map(|q| q.corners.iter());
        let first = iter.next()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.0, first.1, first.0, first.1);
        for &(x, y) in iter {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        let (ax, ay) = self.anchor;
        Some((x0 + ax, y0 + ay, x1 + ax, y1 + ay))
    }

    /// Document-space center of the bounding box.
    pub fn center(&self) -> Option<(f64, f64)> {
        self.bounds()
            .map(|(x0, y0, x1, y1)| ((x0 + x1) / 2.0, (y0 + y1) / 2.0))
    }

    /// Cell each quad lands on without resampling: the one containing the
    /// quad's anchor-shifted center.
    pub fn aliased_cells(&self) -> impl Iterator<Item = ((i64, i64), Color)> + '_ {
        let (ax, ay) = self.anchor;
        self.quads.iter().map(move |q| {
            let (cx, cy) = q.center();
            (((cx + ax).floor() as i64, (cy + ay).floor() as i64), q.color)
        })
    }
}

// ============================================================================
// LAYER — one pixel grid
// ============================================================================

/// Per-stroke paint state kept between successive paint commands.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StrokeState {
    pub last: (i64, i64),
    pub stamp: u32,
}

pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub cols: u32,
    pub rows: u32,
    /// `cols * rows` cells, index `x + y * cols`.
    pub buffer: Vec<Color>,
    /// Display size in device pixels.
    pub bounds: (f64, f64),
    /// Display-space origin.
    pub offset: (f64, f64),
    pub floating: Option<FloatingSelection>,
    pub history: History,
    lock: WriteLock,
    pub(crate) stroke: Option<StrokeState>,
}

impl Layer {
    /// Blank (fully transparent) layer.
    pub fn new(name: impl Into<String>, cols: u32, rows: u32, history_capacity: usize) -> Self {
        Self {
            name: name.into(),
            visible: true,
            opacity: 1.0,
            cols,
            rows,
            buffer: vec![Color::TRANSPARENT; cols as usize * rows as usize],
            bounds: (cols as f64, rows as f64),
            offset: (0.0, 0.0),
            floating: None,
            history: History::new(history_capacity),
            lock: WriteLock::default(),
            stroke: None,
        }
    }

    pub fn from_pixels(
        name: impl Into<String>,
        cols: u32,
        rows: u32,
        pixels: Vec<Color>,
        history_capacity: usize,
    ) -> Self {
        let mut layer = Self::new(name, cols, rows, history_capacity);
        if pixels.len() == layer.buffer.len() {
            layer.buffer = pixels;
        } else {
            crate::log_warn!(
                "Layer::from_pixels: got {} pixels for {}x{}, leaving layer blank",
                pixels.len(),
                cols,
                rows
            );
        }
        layer
    }

    pub fn write_lock(&self) -> &WriteLock {
        &self.lock
    }

    #[inline]
    pub fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x >= 0 && y >= 0 && x < self.cols as i64 && y < self.rows as i64 {
            Some((x + y * self.cols as i64) as usize)
        } else {
            None
        }
    }

    pub fn get(&self, x: i64, y: i64) -> Option<Color> {
        self.index(x, y).map(|i| self.buffer[i])
    }

    /// Write `color` at `index`, recording the prior color.  Unchanged cells
    /// are neither written nor recorded.
    #[inline]
    pub fn write_recorded(&mut self, index: usize, color: Color) -> bool {
        let prior = self.buffer[index];
        if prior == color {
            return false;
        }
        self.history.record(index, prior);
        self.buffer[index] = color;
        true
    }

    /// Either copy `color` onto the cell or composite it over the current
    /// value, recording the change.
    pub fn put_recorded(&mut self, index: usize, color: Color, blend: bool) -> bool {
        let next = if blend {
            let mut dst = self.buffer[index];
            blend_over(&mut dst, color);
            dst
        } else {
            color
        };
        self.write_recorded(index, next)
    }

    pub fn undo(&mut self) -> EditResult {
        let _guard = self.lock.try_acquire()?;
        // Undoing under a floating selection would duplicate its pixels.
        self.floating = None;
        self.stroke = None;
        self.history.undo(&mut self.buffer).ok_or(NoOp::NothingToUndo)
    }

    pub fn redo(&mut self) -> EditResult {
        let _guard = self.lock.try_acquire()?;
        self.floating = None;
        self.stroke = None;
        self.history.redo(&mut self.buffer).ok_or(NoOp::NothingToRedo)
    }

    /// Start a paced undo/redo.  The returned guard keeps the layer locked
    /// until the replay is handed back through [`Layer::finish_paced`].
    pub fn begin_paced(&mut self, direction: Direction) -> Result<(PacedReplay, WriteGuard), NoOp> {
        let guard = self.lock.try_acquire()?;
        let replay = self.history.begin_paced(direction).ok_or(match direction {
            Direction::Undo => NoOp::NothingToUndo,
            Direction::Redo => NoOp::NothingToRedo,
        })?;
        self.floating = None;
        self.stroke = None;
        Ok((replay, guard))
    }

    /// Advance a paced replay by one batch.  Returns `true` when finished.
    pub fn step_paced(&mut self, replay: &mut PacedReplay) -> bool {
        replay.step(&mut self.buffer)
    }

    pub fn finish_paced(&mut self, replay: PacedReplay, guard: WriteGuard) -> usize {
        let n = self.history.finish_paced(replay, &mut self.buffer);
        drop(guard);
        n
    }

    /// Keep the top-left content, crop or pad with transparency.  History is
    /// cleared since its indices refer to the old layout.
    pub fn resize(&mut self, cols: u32, rows: u32) {
        let mut next = vec![Color::TRANSPARENT; cols as usize * rows as usize];
        let copy_w = self.cols.min(cols) as usize;
        for y in 0..self.rows.min(rows) as usize {
            let src = y * self.cols as usize;
            let dst = y * cols as usize;
            next[dst..dst + copy_w].copy_from_slice(&self.buffer[src..src + copy_w]);
        }
        self.buffer = next;
        self.cols = cols;
        self.rows = rows;
        self.floating = None;
        self.stroke = None;
        self.history.clear();
    }

    /// Copy of the pixels and display properties with a fresh history and lock.
    pub fn duplicate(&self, name: impl Into<String>) -> Layer {
        let mut layer = Layer::from_pixels(
            name,
            self.cols,
            self.rows,
            self.buffer.clone(),
            self.history.capacity(),
        );
        layer.visible = self.visible;
        layer.opacity = self.opacity;
        layer
    }

    /// Buffer with the floating selection stamped on top (aliased placement).
    pub fn with_floating(&self) -> Cow<'_, [Color]> {
        let Some(floating) = self.floating.as_ref().filter(|f| !f.is_empty()) else {
            return Cow::Borrowed(&self.buffer);
        };
        let mut out = self.buffer.clone();
        for ((x, y), color) in floating.aliased_cells() {
            if let Some(i) = self.index(x, y) {
                blend_over(&mut out[i], color);
            }
        }
        Cow::Owned(out)
    }
}

// ============================================================================
// EDIT CONTEXT
// ============================================================================

/// Document-wide state handed to every layer operation.
#[derive(Clone, Copy)]
pub struct EditContext<'a> {
    pub mask: &'a SelectionMask,
    pub settings: &'a EditorSettings,
    pub view: &'a ZoomPan,
}

// ============================================================================
// DOCUMENT — layer stack with shared mask, settings and view
// ============================================================================

/// What the presentation layer draws on top of the pixels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overlay {
    pub selection: Option<SelectionShape>,
    /// Document-space bounding box of the active floating selection.
    pub floating_bounds: Option<(f64, f64, f64, f64)>,
    /// Number of lifted cells in the floating selection.
    pub floating_cells: usize,
}

pub struct Document {
    pub cols: u32,
    pub rows: u32,
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
    pub mask: SelectionMask,
    pub settings: EditorSettings,
    pub view: ZoomPan,
    pub rasterizer: MaskRasterizer,
    pub clipboard: Option<FloatingSelection>,
    /// Shape behind the current mask, for the overlay.
    pub selection_shape: Option<SelectionShape>,
    history_capacity: usize,
    layer_counter: usize,
}

impl Document {
    /// Blank document with one transparent layer.
    pub fn new(cols: u32, rows: u32) -> Self {
        Self::with_config(cols, rows, &EngineConfig::default())
    }

    pub fn with_config(cols: u32, rows: u32, config: &EngineConfig) -> Self {
        let cols = cols.clamp(1, MAX_CANVAS_DIM);
        let rows = rows.clamp(1, MAX_CANVAS_DIM);
        let history_capacity = config.history_capacity;
        Self {
            cols,
            rows,
            layers: vec![Layer::new("Layer 1", cols, rows, history_capacity)],
            active_layer_index: 0,
            mask: SelectionMask::new(cols, rows),
            settings: config.editor_settings(),
            view: ZoomPan::new(cols as f64, rows as f64, cols, rows),
            rasterizer: MaskRasterizer::new(config.mask_workers),
            clipboard: None,
            selection_shape: None,
            history_capacity,
            layer_counter: 1,
        }
    }

    /// Document holding `pixels` as its only layer.
    pub fn from_pixels(cols: u32, rows: u32, pixels: Vec<Color>, config: &EngineConfig) -> Self {
        let mut doc = Self::with_config(cols, rows, config);
        let (cols, rows) = (doc.cols, doc.rows);
        doc.layers[0] = Layer::from_pixels("Layer 1", cols, rows, pixels, doc.history_capacity);
        doc
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn set_history_capacity(&mut self, capacity: usize) {
        self.history_capacity = capacity.max(1);
        for layer in &mut self.layers {
            layer.history.set_capacity(self.history_capacity);
        }
    }

    pub(crate) fn next_layer_name(&mut self) -> String {
        self.layer_counter += 1;
        format!("Layer {}", self.layer_counter)
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active_layer_index]
    }

    pub fn active_layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.active_layer_index]
    }

    /// Active layer together with the shared state operations read.
    pub fn active_mut(&mut self) -> (&mut Layer, EditContext<'_>) {
        let Document {
            layers,
            active_layer_index,
            mask,
            settings,
            view,
            ..
        } = self;
        (
            &mut layers[*active_layer_index],
            EditContext {
                mask,
                settings,
                view,
            },
        )
    }

    /// Update view size, recompute the zoomed origin and mirror it into
    /// every layer's display bounds / offset.
    pub fn sync_view(&mut self, view_w: f64, view_h: f64) {
        self.view.layout(view_w, view_h, self.cols, self.rows);
        let bounds = self.view.zoomed_size();
        let offset = (self.view.zoomed_x, self.view.zoomed_y);
        for layer in &mut self.layers {
            layer.bounds = bounds;
            layer.offset = offset;
        }
    }

    /// Apply finished polygon-mask work, if any.  Returns `true` when the
    /// mask changed.
    pub fn poll_mask(&mut self) -> bool {
        self.rasterizer.poll(&mut self.mask)
    }

    /// Block until no polygon-mask batch is pending.
    pub fn wait_mask(&mut self) -> bool {
        self.rasterizer.wait(&mut self.mask)
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Composite visible layers bottom-to-top with their opacity.  The active
    /// layer's floating selection is drawn over that layer.
    pub fn render(&self) -> Vec<Color> {
        let w = self.cols as usize;
        let sources: Vec<(Cow<'_, [Color]>, f32)> = self
            .layers
            .iter()
            .filter(|l| l.visible && l.opacity > 0.0)
            .map(|l| (l.with_floating(), l.opacity))
            .collect();

        let mut out = vec![Color::TRANSPARENT; w * self.rows as usize];
        out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            let start = y * w;
            for (pixels, opacity) in &sources {
                let src = &pixels[start..start + w];
                for (dst, &s) in row.iter_mut().zip(src) {
                    blend_with_opacity(dst, s, *opacity);
                }
            }
        });
        out
    }

    /// [`Document::render`] as RGBA bytes.
    pub fn render_rgba(&self) -> Vec<u8> {
        self.render().iter().flat_map(|c| c.to_array()).collect()
    }

    pub fn overlay(&self) -> Overlay {
        let floating = self.active_layer().floating.as_ref();
        Overlay {
            selection: self.selection_shape.clone(),
            floating_bounds: floating.and_then(FloatingSelection::bounds),
            floating_cells: floating.map_or(0, FloatingSelection::len),
        }
    }
}
