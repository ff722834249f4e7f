// ============================================================================
// ZOOM / PAN — view-space <-> document-space mapping
// ============================================================================

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 100.0;

/// Affine mapping between view pixels and document cells.
///
/// `zoomed_x/zoomed_y` is the view-space position of document origin (0, 0).
/// It is derived from the view size, the document size, the zoom factors and
/// the pan offsets by [`ZoomPan::layout`]: the zoomed document is centered in
/// the view, then shifted by the pan offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomPan {
    pub zoom_x: f64,
    pub zoom_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub zoomed_x: f64,
    pub zoomed_y: f64,
    view_w: f64,
    view_h: f64,
    doc_w: f64,
    doc_h: f64,
}

impl Default for ZoomPan {
    fn default() -> Self {
        Self {
            zoom_x: 1.0,
            zoom_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            zoomed_x: 0.0,
            zoomed_y: 0.0,
            view_w: 0.0,
            view_h: 0.0,
            doc_w: 0.0,
            doc_h: 0.0,
        }
    }
}

impl ZoomPan {
    pub fn new(view_w: f64, view_h: f64, doc_w: u32, doc_h: u32) -> Self {
        let mut zp = Self::default();
        zp.layout(view_w, view_h, doc_w, doc_h);
        zp
    }

    /// Update view and document sizes and recompute the zoomed origin.
    pub fn layout(&mut self, view_w: f64, view_h: f64, doc_w: u32, doc_h: u32) {
        self.view_w = view_w;
        self.view_h = view_h;
        self.doc_w = doc_w as f64;
        self.doc_h = doc_h as f64;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.zoomed_x = self.offset_x + (self.view_w - self.doc_w * self.zoom_x) / 2.0;
        self.zoomed_y = self.offset_y + (self.view_h - self.doc_h * self.zoom_y) / 2.0;
    }

    /// View-space point -> document-space point (fractional cells).
    pub fn to_document(&self, vx: f64, vy: f64) -> (f64, f64) {
        ((vx - self.zoomed_x) / self.zoom_x, (vy - self.zoomed_y) / self.zoom_y)
    }

    /// Document-space point -> view-space point.
    pub fn to_view(&self, dx: f64, dy: f64) -> (f64, f64) {
        (dx * self.zoom_x + self.zoomed_x, dy * self.zoom_y + self.zoomed_y)
    }

    /// View-space movement -> document-space movement.
    pub fn delta_to_document(&self, dvx: f64, dvy: f64) -> (f64, f64) {
        (dvx / self.zoom_x, dvy / self.zoom_y)
    }

    /// Cell under a view-space point, if it lies inside the document.
    pub fn cell_at(&self, vx: f64, vy: f64) -> Option<(u32, u32)> {
        let (x, y) = self.to_document(vx, vy);
        if x >= 0.0 && y >= 0.0 && x < self.doc_w && y < self.doc_h {
            Some((x as u32, y as u32))
        } else {
            None
        }
    }

    pub fn view_size(&self) -> (f64, f64) {
        (self.view_w, self.view_h)
    }

    /// Display size of the zoomed document in view pixels.
    pub fn zoomed_size(&self) -> (f64, f64) {
        (self.doc_w * self.zoom_x, self.doc_h * self.zoom_y)
    }

    pub fn set_zoom(&mut self, zoom_x: f64, zoom_y: f64) {
        self.zoom_x = zoom_x.clamp(MIN_ZOOM, MAX_ZOOM);
        self.zoom_y = zoom_y.clamp(MIN_ZOOM, MAX_ZOOM);
        self.recompute();
    }

    /// Zoom both axes by `factor` keeping the document point under the
    /// view-space `anchor` fixed (e.g. the pointer).
    pub fn zoom_around(&mut self, factor: f64, anchor_x: f64, anchor_y: f64) {
        let (doc_x, doc_y) = self.to_document(anchor_x, anchor_y);
        self.zoom_x = (self.zoom_x * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.zoom_y = (self.zoom_y * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.recompute();
        // Shift the pan so doc point lands back under the anchor.
        let (vx, vy) = self.to_view(doc_x, doc_y);
        self.pan_by(anchor_x - vx, anchor_y - vy);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
        self.recompute();
    }

    pub fn reset(&mut self) {
        self.zoom_x = 1.0;
        self.zoom_y = 1.0;
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.recompute();
    }

    /// Largest uniform zoom that fits the whole document in the view.
    pub fn fit(&mut self) {
        if self.doc_w <= 0.0 || self.doc_h <= 0.0 || self.view_w <= 0.0 || self.view_h <= 0.0 {
            return;
        }
        let z = (self.view_w / self.doc_w).min(self.view_h / self.doc_h);
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.set_zoom(z, z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn centered_document_maps_origin() {
        let zp = ZoomPan::new(200.0, 100.0, 50, 50);
        assert_eq!((zp.zoomed_x, zp.zoomed_y), (75.0, 25.0));
        assert!(close(zp.to_document(75.0, 25.0), (0.0, 0.0)));
        assert_eq!(zp.cell_at(76.0, 26.0), Some((1, 1)));
        assert_eq!(zp.cell_at(10.0, 10.0), None);
    }

    #[test]
    fn mapping_is_invertible() {
        let mut zp = ZoomPan::new(640.0, 480.0, 32, 16);
        zp.set_zoom(8.0, 4.0);
        zp.pan_by(13.0, -7.5);
        let v = zp.to_view(3.25, 9.5);
        assert!(close(zp.to_document(v.0, v.1), (3.25, 9.5)));
    }

    #[test]
    fn zoom_around_keeps_anchor_fixed() {
        let mut zp = ZoomPan::new(400.0, 400.0, 40, 40);
        let before = zp.to_document(123.0, 321.0);
        zp.zoom_around(3.0, 123.0, 321.0);
        assert!(close(zp.to_document(123.0, 321.0), before));
        assert_eq!(zp.zoom_x, 3.0);
    }

    #[test]
    fn deltas_scale_by_zoom() {
        let mut zp = ZoomPan::new(100.0, 100.0, 10, 10);
        zp.set_zoom(4.0, 2.0);
        assert_eq!(zp.delta_to_document(8.0, 8.0), (2.0, 4.0));
    }

    #[test]
    fn fit_uses_smaller_axis() {
        let mut zp = ZoomPan::new(300.0, 100.0, 10, 10);
        zp.fit();
        assert_eq!(zp.zoom_x, 10.0);
        assert_eq!(zp.zoomed_size(), (100.0, 100.0));
    }
}
