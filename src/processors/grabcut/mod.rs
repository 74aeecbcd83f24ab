//! Iterative graph-cut foreground extraction (GrabCut).
//!
//! Each iteration assigns pixels to mixture components, refits the foreground
//! and background color models, builds an 8-connected graph and relabels every
//! probable pixel by its side of the minimum cut. Definite labels are never
//! changed.

mod gmm;
mod mask;
mod maxflow;

pub use mask::{CutRect, MaskLabel, SegmentationMask};

use crate::core::config::ParallelPolicy;
use crate::core::errors::SegmentationError;
use gmm::{Color, Gmm, kmeans};
use image::RgbImage;
use maxflow::FlowGraph;
use rayon::prelude::*;

const GAMMA: f64 = 50.0;
const LAMBDA: f64 = 9.0 * GAMMA;

/// How the mask is initialized before the first iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabCutInit {
    /// Everything outside the rectangle becomes definite background and
    /// everything inside becomes probable foreground. Pixels already marked as
    /// definite foreground keep that label.
    Rect(CutRect),
    /// The mask is used as given.
    Mask,
}

/// Smoothness weights to the left, upper-left, upper and upper-right neighbors.
struct NeighborWeights {
    left: Vec<f64>,
    upleft: Vec<f64>,
    up: Vec<f64>,
    upright: Vec<f64>,
}

struct Models {
    background: Gmm,
    foreground: Gmm,
}

fn dist2(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn beta(colors: &[Color], width: usize, height: usize) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for y in 0..height {
        for x in 0..width {
            let c = &colors[y * width + x];
            if x > 0 {
                sum += dist2(c, &colors[y * width + x - 1]);
                count += 1;
            }
            if x > 0 && y > 0 {
                sum += dist2(c, &colors[(y - 1) * width + x - 1]);
                count += 1;
            }
            if y > 0 {
                sum += dist2(c, &colors[(y - 1) * width + x]);
                count += 1;
            }
            if y > 0 && x + 1 < width {
                sum += dist2(c, &colors[(y - 1) * width + x + 1]);
                count += 1;
            }
        }
    }
    if sum <= f64::EPSILON || count == 0 {
        0.0
    } else {
        1.0 / (2.0 * sum / count as f64)
    }
}

fn neighbor_weights(colors: &[Color], width: usize, height: usize, beta: f64) -> NeighborWeights {
    let n = width * height;
    let diagonal = GAMMA / std::f64::consts::SQRT_2;
    let mut weights = NeighborWeights {
        left: vec![0.0; n],
        upleft: vec![0.0; n],
        up: vec![0.0; n],
        upright: vec![0.0; n],
    };
    for y in 0..height {
        for x in 0..width {
            let p = y * width + x;
            let c = &colors[p];
            if x > 0 {
                weights.left[p] = GAMMA * (-beta * dist2(c, &colors[p - 1])).exp();
            }
            if x > 0 && y > 0 {
                weights.upleft[p] = diagonal * (-beta * dist2(c, &colors[p - width - 1])).exp();
            }
            if y > 0 {
                weights.up[p] = GAMMA * (-beta * dist2(c, &colors[p - width])).exp();
            }
            if y > 0 && x + 1 < width {
                weights.upright[p] = diagonal * (-beta * dist2(c, &colors[p - width + 1])).exp();
            }
        }
    }
    weights
}

fn split_samples(colors: &[Color], labels: &[MaskLabel]) -> (Vec<Color>, Vec<Color>) {
    let mut background = Vec::new();
    let mut foreground = Vec::new();
    for (color, label) in colors.iter().zip(labels) {
        if label.is_foreground() {
            foreground.push(*color);
        } else {
            background.push(*color);
        }
    }
    (background, foreground)
}

fn fit_side(
    samples: &[Color],
    assignments: &[usize],
    side: &'static str,
) -> Result<Gmm, SegmentationError> {
    Gmm::fit(samples, assignments).ok_or(SegmentationError::EmptySamples { side })
}

/// Runs GrabCut on `img`, updating `mask` in place.
///
/// On error the mask is left in an unspecified intermediate state; callers that
/// need the previous labels must keep their own copy.
pub fn grab_cut(
    img: &RgbImage,
    mask: &mut SegmentationMask,
    init: GrabCutInit,
    iterations: usize,
    policy: &ParallelPolicy,
) -> Result<(), SegmentationError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(SegmentationError::EmptyImage);
    }
    if mask.dimensions() != (width, height) {
        return Err(SegmentationError::SizeMismatch {
            mask_width: mask.width(),
            mask_height: mask.height(),
            image_width: width,
            image_height: height,
        });
    }

    if let GrabCutInit::Rect(rect) = init {
        if !rect.fits(width, height) {
            return Err(SegmentationError::DegenerateRect {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                image_width: width,
                image_height: height,
            });
        }
        for y in 0..height {
            for x in 0..width {
                if mask.get(x, y) == MaskLabel::Foreground {
                    continue;
                }
                let label = if rect.contains(x, y) {
                    MaskLabel::ProbableForeground
                } else {
                    MaskLabel::Background
                };
                mask.set(x, y, label);
            }
        }
    }

    let (w, h) = (width as usize, height as usize);
    let parallel = policy.should_parallelize(w * h);
    let colors: Vec<Color> = img
        .pixels()
        .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
        .collect();
    let mut labels: Vec<MaskLabel> = mask.iter().collect();

    // Initial color models from k-means clusters of each side.
    let (bg_samples, fg_samples) = split_samples(&colors, &labels);
    if bg_samples.is_empty() {
        return Err(SegmentationError::EmptySamples { side: "background" });
    }
    if fg_samples.is_empty() {
        return Err(SegmentationError::EmptySamples { side: "foreground" });
    }
    let mut models = Models {
        background: fit_side(&bg_samples, &kmeans(&bg_samples, parallel), "background")?,
        foreground: fit_side(&fg_samples, &kmeans(&fg_samples, parallel), "foreground")?,
    };

    let beta = beta(&colors, w, h);
    let weights = neighbor_weights(&colors, w, h, beta);
    tracing::trace!(width, height, beta, iterations, "grabcut start");

    for _ in 0..iterations {
        models = refit_models(&models, &colors, &labels, parallel)?;
        let source_side = min_cut(&models, &colors, &labels, &weights, w, h, parallel);
        for (label, &fg) in labels.iter_mut().zip(&source_side) {
            if label.is_probable() {
                *label = if fg {
                    MaskLabel::ProbableForeground
                } else {
                    MaskLabel::ProbableBackground
                };
            }
        }
    }

    for (i, label) in labels.into_iter().enumerate() {
        mask.set((i % w) as u32, (i / w) as u32, label);
    }
    Ok(())
}

fn refit_models(
    models: &Models,
    colors: &[Color],
    labels: &[MaskLabel],
    parallel: bool,
) -> Result<Models, SegmentationError> {
    let assign = |(color, label): (&Color, &MaskLabel)| {
        if label.is_foreground() {
            models.foreground.which_component(color)
        } else {
            models.background.which_component(color)
        }
    };
    let components: Vec<usize> = if parallel {
        colors.par_iter().zip(labels.par_iter()).map(assign).collect()
    } else {
        colors.iter().zip(labels.iter()).map(assign).collect()
    };

    let mut bg = (Vec::new(), Vec::new());
    let mut fg = (Vec::new(), Vec::new());
    for ((color, label), ci) in colors.iter().zip(labels).zip(components) {
        let side = if label.is_foreground() { &mut fg } else { &mut bg };
        side.0.push(*color);
        side.1.push(ci);
    }
    Ok(Models {
        background: fit_side(&bg.0, &bg.1, "background")?,
        foreground: fit_side(&fg.0, &fg.1, "foreground")?,
    })
}

fn terminal_weights(models: &Models, color: &Color, label: MaskLabel) -> (f64, f64) {
    match label {
        MaskLabel::Background => (0.0, LAMBDA),
        MaskLabel::Foreground => (LAMBDA, 0.0),
        _ => {
            let bg = models.background.probability(color).max(f64::MIN_POSITIVE);
            let fg = models.foreground.probability(color).max(f64::MIN_POSITIVE);
            (-bg.ln(), -fg.ln())
        }
    }
}

/// Builds the graph for the current models and returns, per pixel, whether it
/// lies on the source (foreground) side of the minimum cut.
fn min_cut(
    models: &Models,
    colors: &[Color],
    labels: &[MaskLabel],
    weights: &NeighborWeights,
    w: usize,
    h: usize,
    parallel: bool,
) -> Vec<bool> {
    let n = w * h;
    let source = n;
    let sink = n + 1;

    let terminal = |(color, &label): (&Color, &MaskLabel)| terminal_weights(models, color, label);
    let terminals: Vec<(f64, f64)> = if parallel {
        colors.par_iter().zip(labels.par_iter()).map(terminal).collect()
    } else {
        colors.iter().zip(labels.iter()).map(terminal).collect()
    };

    let mut graph = FlowGraph::new(n + 2, n * 5);
    for y in 0..h {
        for x in 0..w {
            let p = y * w + x;
            let (from_source, to_sink) = terminals[p];
            let shared = from_source.min(to_sink);
            if from_source - shared > 0.0 {
                graph.add_edge(source, p, from_source - shared, 0.0);
            }
            if to_sink - shared > 0.0 {
                graph.add_edge(p, sink, to_sink - shared, 0.0);
            }
            if x > 0 {
                let wt = weights.left[p];
                graph.add_edge(p, p - 1, wt, wt);
            }
            if x > 0 && y > 0 {
                let wt = weights.upleft[p];
                graph.add_edge(p, p - w - 1, wt, wt);
            }
            if y > 0 {
                let wt = weights.up[p];
                graph.add_edge(p, p - w, wt, wt);
            }
            if y > 0 && x + 1 < w {
                let wt = weights.upright[p];
                graph.add_edge(p, p - w + 1, wt, wt);
            }
        }
    }

    let flow = graph.max_flow(source, sink);
    tracing::trace!(flow, "min cut solved");
    let mut side = graph.source_side(source);
    side.truncate(n);
    side
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// A red square on a noisy gray background.
    fn scene(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let inside = (size / 4..size * 3 / 4).contains(&x) && (size / 4..size * 3 / 4).contains(&y);
            if inside {
                Rgb([200 + ((x + y) % 7) as u8, 20, 30])
            } else {
                let g = 90 + ((x * 3 + y * 5) % 11) as u8;
                Rgb([g, g, g])
            }
        })
    }

    #[test]
    fn test_separates_object_from_background() {
        let img = scene(32);
        let mut mask = SegmentationMask::new(32, 32, MaskLabel::Background);
        grab_cut(
            &img,
            &mut mask,
            GrabCutInit::Rect(CutRect::new(4, 4, 24, 24)),
            3,
            &ParallelPolicy::default(),
        )
        .unwrap();

        assert!(mask.get(16, 16).is_foreground());
        assert!(!mask.get(5, 5).is_foreground());
        assert_eq!(mask.get(0, 0), MaskLabel::Background);
    }

    #[test]
    fn test_parallel_path_matches_sequential() {
        let img = scene(24);
        let rect = GrabCutInit::Rect(CutRect::new(3, 3, 18, 18));
        let mut seq = SegmentationMask::new(24, 24, MaskLabel::Background);
        let mut par = seq.clone();
        grab_cut(&img, &mut seq, rect, 2, &ParallelPolicy::new().with_pixel_threshold(usize::MAX))
            .unwrap();
        grab_cut(&img, &mut par, rect, 2, &ParallelPolicy::new().with_pixel_threshold(0)).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_definite_labels_survive() {
        let img = scene(20);
        let mut mask = SegmentationMask::new(20, 20, MaskLabel::Background);
        mask.set(1, 1, MaskLabel::Foreground);
        grab_cut(
            &img,
            &mut mask,
            GrabCutInit::Rect(CutRect::new(3, 3, 14, 14)),
            2,
            &ParallelPolicy::default(),
        )
        .unwrap();
        assert_eq!(mask.get(1, 1), MaskLabel::Foreground);
        assert_eq!(mask.get(0, 0), MaskLabel::Background);
    }

    #[test]
    fn test_failure_modes() {
        let img = scene(10);
        let policy = ParallelPolicy::default();

        let mut mask = SegmentationMask::new(10, 10, MaskLabel::Background);
        let err = grab_cut(&img, &mut mask, GrabCutInit::Rect(CutRect::new(5, 5, 0, 3)), 1, &policy)
            .unwrap_err();
        assert!(matches!(err, SegmentationError::DegenerateRect { .. }));

        let mut mask = SegmentationMask::new(10, 10, MaskLabel::ProbableBackground);
        let err = grab_cut(&img, &mut mask, GrabCutInit::Mask, 1, &policy).unwrap_err();
        assert_eq!(err, SegmentationError::EmptySamples { side: "foreground" });

        let mut mask = SegmentationMask::new(9, 10, MaskLabel::Background);
        let err = grab_cut(&img, &mut mask, GrabCutInit::Mask, 1, &policy).unwrap_err();
        assert!(matches!(err, SegmentationError::SizeMismatch { .. }));

        let mut mask = SegmentationMask::new(0, 0, MaskLabel::Background);
        let err = grab_cut(&RgbImage::new(0, 0), &mut mask, GrabCutInit::Mask, 1, &policy)
            .unwrap_err();
        assert_eq!(err, SegmentationError::EmptyImage);
    }
}
