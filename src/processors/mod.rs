//! Image processing stages.
//!
//! - [`segmentation`]: background removal built on [`grabcut`]
//! - [`enhancement`]: grayscale conversion and size bounding
//! - [`normalization`]: classifier input tensors

pub mod enhancement;
pub mod grabcut;
pub mod normalization;
pub mod segmentation;
pub mod types;

pub use enhancement::Enhancer;
pub use grabcut::{CutRect, GrabCutInit, MaskLabel, SegmentationMask, grab_cut};
pub use normalization::NormalizeImage;
pub use segmentation::{MaskSource, SegmentationGeometry, SegmentationOutcome, Segmenter};
pub use types::{ChannelOrder, Resample};
