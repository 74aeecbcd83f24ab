//! Background removal by two-pass graph-cut segmentation.
//!
//! The first pass is rectangle-initialized from the background margin; the second
//! pass draws a thick probable-background border along that margin and refines the
//! first pass's mask. A failed pass never fails the stage: the refinement falls
//! back to the first pass's snapshot, and a failed first pass falls back to the
//! rectangle hints.

use crate::core::config::{ParallelPolicy, SegmentationConfig};
use crate::core::errors::SegmentationError;
use crate::processors::grabcut::{CutRect, GrabCutInit, MaskLabel, SegmentationMask, grab_cut};
use crate::utils::resize_shorter_side;
use image::RgbImage;
use image::imageops::FilterType;
use serde::Serialize;
use std::time::Instant;

/// Which mask the composite was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mask", rename_all = "snake_case")]
pub enum MaskSource {
    /// Both passes succeeded.
    Refined,
    /// The refinement pass failed; the first pass's mask was used.
    InitialPass {
        #[serde(serialize_with = "display")]
        refine_error: SegmentationError,
    },
    /// The first pass failed; the rectangle hints were used as the mask.
    Hints {
        #[serde(serialize_with = "display")]
        init_error: SegmentationError,
    },
}

fn display<S: serde::Serializer>(err: &SegmentationError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(err)
}

impl MaskSource {
    /// Whether a fallback was taken.
    pub fn recovered(&self) -> bool {
        !matches!(self, MaskSource::Refined)
    }
}

/// Result of the segmentation stage.
#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    /// Working-resolution image with non-foreground pixels set to the sentinel.
    pub image: RgbImage,
    /// The mask the composite was built from.
    pub mask: SegmentationMask,
    /// How the mask was obtained.
    pub source: MaskSource,
}

/// Hint rectangles derived from the working image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationGeometry {
    /// Background margin in pixels, horizontally.
    pub margin_x: u32,
    /// Background margin in pixels, vertically.
    pub margin_y: u32,
    /// Cut boundary: the image inset by the background margin.
    pub background: CutRect,
    /// Centered region marked as certain foreground.
    pub foreground: CutRect,
}

impl SegmentationGeometry {
    pub fn new(width: u32, height: u32, bg_margin: f32, fg_fraction: f32) -> Self {
        let inset = |dim: u32, frac: f32| (dim as f64 * frac as f64).round() as u32;
        let margin_x = inset(width, bg_margin);
        let margin_y = inset(height, bg_margin);
        let fg_frac = (1.0 - fg_fraction) / 2.0;
        let fg_x = inset(width, fg_frac);
        let fg_y = inset(height, fg_frac);
        Self {
            margin_x,
            margin_y,
            background: CutRect::new(
                margin_x,
                margin_y,
                width.saturating_sub(2 * margin_x),
                height.saturating_sub(2 * margin_y),
            ),
            foreground: CutRect::new(
                fg_x,
                fg_y,
                width.saturating_sub(2 * fg_x),
                height.saturating_sub(2 * fg_y),
            ),
        }
    }
}

/// The segmentation stage.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmentationConfig,
    policy: ParallelPolicy,
}

impl Segmenter {
    pub fn new(config: SegmentationConfig, policy: ParallelPolicy) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Isolates the printed object in `img`.
    pub fn segment(&self, img: &RgbImage) -> SegmentationOutcome {
        let start = Instant::now();
        let cfg = &self.config;
        let working = resize_shorter_side(img, cfg.resize_to, FilterType::from(cfg.resample));
        let (width, height) = working.dimensions();
        let geometry = SegmentationGeometry::new(width, height, cfg.bg_margin, cfg.fg_fraction);

        let mut hints = SegmentationMask::new(width, height, MaskLabel::Background);
        hints.fill_rect(geometry.foreground, MaskLabel::Foreground);

        let mut mask = hints.clone();
        let source = match grab_cut(
            &working,
            &mut mask,
            GrabCutInit::Rect(geometry.background),
            cfg.init_iterations,
            &self.policy,
        ) {
            Err(init_error) => {
                tracing::warn!(error = %init_error, "initial graph-cut pass failed, using hint mask");
                mask = hints;
                MaskSource::Hints { init_error }
            }
            Ok(()) => {
                let snapshot = mask.clone();
                let thickness = geometry.margin_x.saturating_mul(cfg.border_scale).max(1);
                mask.stroke_rect(geometry.background, thickness, MaskLabel::ProbableBackground);
                match grab_cut(
                    &working,
                    &mut mask,
                    GrabCutInit::Mask,
                    cfg.refine_iterations,
                    &self.policy,
                ) {
                    Ok(()) => MaskSource::Refined,
                    Err(refine_error) => {
                        tracing::warn!(
                            error = %refine_error,
                            "refinement pass failed, using initial pass mask"
                        );
                        mask = snapshot;
                        MaskSource::InitialPass { refine_error }
                    }
                }
            }
        };

        let image = mask.composite(&working, cfg.sentinel);
        tracing::debug!(
            width,
            height,
            foreground = mask.foreground_count(),
            recovered = source.recovered(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "segmentation done"
        );
        SegmentationOutcome {
            image,
            mask,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// A warm-colored object centered on a cool, slightly textured backdrop.
    fn print_photo(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let dx = x as f32 - width as f32 / 2.0;
            let dy = y as f32 - height as f32 / 2.0;
            let r = (dx * dx + dy * dy).sqrt();
            if r < width.min(height) as f32 * 0.25 {
                Rgb([220, 140 + ((x + y) % 9) as u8, 40])
            } else {
                let t = ((x * 7 + y * 3) % 13) as u8;
                Rgb([30 + t, 60 + t, 120 + t])
            }
        })
    }

    fn small(config: SegmentationConfig) -> Segmenter {
        Segmenter::new(
            SegmentationConfig {
                resize_to: 48,
                ..config
            },
            ParallelPolicy::default(),
        )
    }

    #[test]
    fn test_output_matches_working_size() {
        let outcome = small(SegmentationConfig::default()).segment(&print_photo(96, 64));
        assert_eq!(outcome.image.dimensions(), (72, 48));
        assert_eq!(outcome.mask.dimensions(), (72, 48));
    }

    #[test]
    fn test_no_resize_keeps_dimensions() {
        let segmenter = Segmenter::new(
            SegmentationConfig {
                resize_to: 0,
                ..Default::default()
            },
            ParallelPolicy::default(),
        );
        let outcome = segmenter.segment(&print_photo(40, 30));
        assert_eq!(outcome.image.dimensions(), (40, 30));
    }

    #[test]
    fn test_object_kept_and_background_painted() {
        let outcome = small(SegmentationConfig::default()).segment(&print_photo(48, 48));
        assert_eq!(outcome.source, MaskSource::Refined);
        let center = outcome.image.get_pixel(24, 24);
        assert_eq!(center[0], 220);
        assert_eq!(outcome.image.get_pixel(0, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_failed_refinement_falls_back_to_initial_pass() {
        // The border is wide enough to cover the whole image, leaving the
        // refinement pass without foreground samples.
        let outcome = small(SegmentationConfig {
            bg_margin: 0.45,
            ..Default::default()
        })
        .segment(&print_photo(48, 48));

        assert!(matches!(
            outcome.source,
            MaskSource::InitialPass {
                refine_error: SegmentationError::EmptySamples { side: "foreground" }
            }
        ));
        assert!(outcome.source.recovered());
        assert!(outcome.mask.foreground_count() > 0);
        assert_eq!(outcome.image.dimensions(), (48, 48));
    }

    #[test]
    fn test_failed_initial_pass_falls_back_to_hints() {
        // A 0.5 margin leaves an empty cut rectangle.
        let outcome = small(SegmentationConfig {
            bg_margin: 0.5,
            ..Default::default()
        })
        .segment(&print_photo(48, 48));

        assert!(matches!(
            outcome.source,
            MaskSource::Hints {
                init_error: SegmentationError::DegenerateRect { .. }
            }
        ));
        let geometry = SegmentationGeometry::new(48, 48, 0.5, 0.4);
        let fg = geometry.foreground;
        assert_eq!(
            outcome.mask.foreground_count(),
            (fg.width * fg.height) as usize
        );
    }

    #[test]
    fn test_geometry() {
        let g = SegmentationGeometry::new(500, 300, 0.07, 0.4);
        assert_eq!((g.margin_x, g.margin_y), (35, 21));
        assert_eq!(g.background, CutRect::new(35, 21, 430, 258));
        assert_eq!(g.foreground, CutRect::new(150, 90, 200, 120));
    }

    #[test]
    fn test_mask_source_serializes_reason() {
        let source = MaskSource::InitialPass {
            refine_error: SegmentationError::EmptySamples { side: "foreground" },
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["mask"], "initial_pass");
        assert_eq!(json["refine_error"], "no foreground samples in mask");
    }
}
