//! Utility functions for the pipeline.
//!
//! Image loading and geometry helpers, plus logging setup.

pub mod image;

pub use self::image::{
    ALLOWED_EXTENSIONS, center_crop_window, decode_image, fit_and_crop, has_allowed_extension,
    resize_shorter_side, shorter_side_dims, thumbnail_dims,
};

/// Initializes the tracing subscriber for logging.
///
/// Log levels are read from `RUST_LOG`. Call once at program start.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
