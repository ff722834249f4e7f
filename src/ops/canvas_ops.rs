// ============================================================================
// CANVAS-LEVEL OPERATIONS — resize, layer stack, clipboard
// ============================================================================

use crate::canvas::{Document, EditResult, Layer, MAX_CANVAS_DIM, NoOp};
use crate::ops::transform::commit_locked;

/// Resize every layer, keeping the top-left content.
///
/// The mask is reset to all-true, floating selections are dropped and every
/// history is cleared, since recorded indices refer to the old layout.
pub fn resize(doc: &mut Document, cols: u32, rows: u32) -> EditResult {
    if cols == 0 || rows == 0 || cols > MAX_CANVAS_DIM || rows > MAX_CANVAS_DIM {
        return Err(NoOp::OutOfBounds);
    }
    // Every layer must be free before any of them changes.
    let _guards = doc
        .layers
        .iter()
        .map(|l| l.write_lock().try_acquire())
        .collect::<Result<Vec<_>, _>>()?;

    for layer in &mut doc.layers {
        layer.resize(cols, rows);
    }
    doc.cols = cols;
    doc.rows = rows;
    doc.mask.resize(cols, rows);
    doc.rasterizer.reset(&mut doc.mask);
    doc.selection_shape = None;
    let (vw, vh) = doc.view.view_size();
    doc.sync_view(vw, vh);
    crate::log_info!("Resized canvas to {}x{}", cols, rows);
    Ok(cols as usize * rows as usize)
}

/// Add a new transparent layer above the active layer and select it.
pub fn add_layer(doc: &mut Document) -> usize {
    let idx = (doc.active_layer_index + 1).min(doc.layers.len());
    let name = doc.next_layer_name();
    let mut layer = Layer::new(name, doc.cols, doc.rows, doc.history_capacity());
    layer.bounds = doc.view.zoomed_size();
    layer.offset = (doc.view.zoomed_x, doc.view.zoomed_y);
    doc.layers.insert(idx, layer);
    doc.active_layer_index = idx;
    idx
}

/// Delete the active layer (must keep at least one layer).  Its history goes
/// with it.
pub fn delete_layer(doc: &mut Document) -> EditResult {
    if doc.layers.len() <= 1 {
        return Err(NoOp::LastLayer);
    }
    let idx = doc.active_layer_index;
    let _guard = doc.layers[idx].write_lock().try_acquire()?;
    let removed = doc.layers.remove(idx);
    if doc.active_layer_index >= doc.layers.len() {
        doc.active_layer_index = doc.layers.len() - 1;
    }
    Ok(removed.buffer.len())
}

/// Duplicate the active layer above itself.
pub fn duplicate_layer(doc: &mut Document) -> usize {
    let idx = doc.active_layer_index;
    let src = &doc.layers[idx];
    let mut dup = src.duplicate(format!("{} Copy", src.name));
    dup.bounds = src.bounds;
    dup.offset = src.offset;
    doc.layers.insert(idx + 1, dup);
    doc.active_layer_index = idx + 1;
    idx + 1
}

/// Move the layer at `from` to position `to`.  The active layer follows the
/// moved layer if it was the one moved.
pub fn move_layer(doc: &mut Document, from: usize, to: usize) -> EditResult {
    let len = doc.layers.len();
    if from >= len || to >= len {
        return Err(NoOp::NoSuchLayer);
    }
    if from == to {
        return Ok(0);
    }
    let active = doc.active_layer_index;
    let layer = doc.layers.remove(from);
    doc.layers.insert(to, layer);
    doc.active_layer_index = if active == from {
        to
    } else if from < active && active <= to {
        active - 1
    } else if to <= active && active < from {
        active + 1
    } else {
        active
    };
    Ok(1)
}

pub fn select_layer(doc: &mut Document, idx: usize) -> EditResult {
    if idx >= doc.layers.len() {
        return Err(NoOp::NoSuchLayer);
    }
    doc.active_layer_index = idx;
    Ok(0)
}

pub fn set_layer_visibility(doc: &mut Document, idx: usize, visible: bool) -> EditResult {
    let layer = doc.layers.get_mut(idx).ok_or(NoOp::NoSuchLayer)?;
    layer.visible = visible;
    Ok(0)
}

pub fn set_layer_opacity(doc: &mut Document, idx: usize, opacity: f32) -> EditResult {
    let layer = doc.layers.get_mut(idx).ok_or(NoOp::NoSuchLayer)?;
    layer.opacity = if opacity.is_finite() { opacity.clamp(0.0, 1.0) } else { 1.0 };
    Ok(0)
}

pub fn rename_layer(doc: &mut Document, idx: usize, name: &str) -> EditResult {
    let layer = doc.layers.get_mut(idx).ok_or(NoOp::NoSuchLayer)?;
    layer.name = name.to_string();
    Ok(0)
}

// ---------------------------------------------------------------------------
//  Clipboard
// ---------------------------------------------------------------------------

/// Store a copy of the active floating selection.
pub fn copy(doc: &mut Document) -> EditResult {
    let floating = doc
        .active_layer()
        .floating
        .clone()
        .ok_or(NoOp::NoFloatingSelection)?;
    let n = floating.len();
    doc.clipboard = Some(floating);
    Ok(n)
}

/// Commit the current floating selection (if any) and float a copy of the
/// clipboard in its place.
pub fn paste(doc: &mut Document) -> EditResult {
    let clip = doc.clipboard.clone().ok_or(NoOp::EmptyClipboard)?;
    let (layer, ctx) = doc.active_mut();
    let _guard = layer.write_lock().try_acquire()?;
    if layer.floating.is_some() {
        let result = commit_locked(layer, &ctx);
        crate::log_info!("Paste committed previous floating selection ({:?})", result);
    }
    let n = clip.len();
    layer.floating = Some(clip);
    Ok(n)
}
