//! Vision model wrappers and file management

pub mod depth;
pub mod detector;
pub mod manager;

pub use depth::{DepthEngine, DepthMap};
pub use detector::{class_name, format_label, Detection, DetectionEngine, COCO_CLASSES};
pub use manager::ModelManager;
