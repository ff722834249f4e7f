pub mod canvas_ops;
pub mod fill;
pub mod paint;
pub mod selection;
pub mod transform;
