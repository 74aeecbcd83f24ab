//! Full-covariance Gaussian mixture color model.

use rayon::prelude::*;

/// Components per mixture.
pub const COMPONENTS: usize = 5;
const KMEANS_ITERATIONS: usize = 10;
const VARIANCE_FLOOR: f64 = 0.01;

pub type Color = [f64; 3];
type Mat3 = [[f64; 3]; 3];

fn dist2(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn det3(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse3(m: &Mat3, det: f64) -> Mat3 {
    let d = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * d,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * d,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * d,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * d,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * d,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * d,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * d,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * d,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * d,
        ],
    ]
}

/// A mixture of [`COMPONENTS`] Gaussians over RGB colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Gmm {
    weights: [f64; COMPONENTS],
    means: [Color; COMPONENTS],
    inverse: [Mat3; COMPONENTS],
    det: [f64; COMPONENTS],
}

impl Gmm {
    /// Fits the mixture to `samples`, where `assignments[i]` is the component of
    /// `samples[i]`. Returns `None` when there are no samples.
    pub fn fit(samples: &[Color], assignments: &[usize]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sums = [[0.0; 3]; COMPONENTS];
        let mut prods = [[[0.0; 3]; 3]; COMPONENTS];
        let mut counts = [0usize; COMPONENTS];
        for (color, &ci) in samples.iter().zip(assignments) {
            for i in 0..3 {
                sums[ci][i] += color[i];
                for j in 0..3 {
                    prods[ci][i][j] += color[i] * color[j];
                }
            }
            counts[ci] += 1;
        }

        let total = samples.len() as f64;
        let mut gmm = Gmm {
            weights: [0.0; COMPONENTS],
            means: [[0.0; 3]; COMPONENTS],
            inverse: [[[0.0; 3]; 3]; COMPONENTS],
            det: [0.0; COMPONENTS],
        };
        for ci in 0..COMPONENTS {
            let n = counts[ci] as f64;
            if counts[ci] == 0 {
                continue;
            }
            gmm.weights[ci] = n / total;
            let mean = [sums[ci][0] / n, sums[ci][1] / n, sums[ci][2] / n];
            let mut cov = [[0.0; 3]; 3];
            for i in 0..3 {
                for j in 0..3 {
                    cov[i][j] = prods[ci][i][j] / n - mean[i] * mean[j];
                }
            }
            let mut det = det3(&cov);
            if det <= f64::EPSILON {
                // Singular covariance (e.g. a flat color region).
                for (i, row) in cov.iter_mut().enumerate() {
                    row[i] += VARIANCE_FLOOR;
                }
                det = det3(&cov);
            }
            gmm.means[ci] = mean;
            gmm.det[ci] = det;
            gmm.inverse[ci] = inverse3(&cov, det);
        }
        Some(gmm)
    }

    /// Unweighted density of component `ci` at `color`, without the constant
    /// normalization factor.
    pub fn component_density(&self, ci: usize, color: &Color) -> f64 {
        if self.weights[ci] <= 0.0 {
            return 0.0;
        }
        let d = [
            color[0] - self.means[ci][0],
            color[1] - self.means[ci][1],
            color[2] - self.means[ci][2],
        ];
        let inv = &self.inverse[ci];
        let mut mult = 0.0;
        for i in 0..3 {
            mult += d[i] * (inv[i][0] * d[0] + inv[i][1] * d[1] + inv[i][2] * d[2]);
        }
        (-0.5 * mult).exp() / self.det[ci].sqrt()
    }

    /// Mixture likelihood of `color`.
    pub fn probability(&self, color: &Color) -> f64 {
        (0..COMPONENTS)
            .map(|ci| self.weights[ci] * self.component_density(ci, color))
            .sum()
    }

    /// The component with the highest density at `color`.
    pub fn which_component(&self, color: &Color) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;
        for ci in 0..COMPONENTS {
            let density = self.component_density(ci, color);
            if density > best_density {
                best = ci;
                best_density = density;
            }
        }
        best
    }
}

/// Deterministic k-means over colors.
///
/// Centers start at evenly spaced sample indices; returns the cluster index of
/// every sample. At most `min(COMPONENTS, samples.len())` clusters are used.
pub fn kmeans(samples: &[Color], parallel: bool) -> Vec<usize> {
    let n = samples.len();
    let k = COMPONENTS.min(n);
    if k == 0 {
        return Vec::new();
    }
    let mut centers: Vec<Color> = (0..k).map(|i| samples[i * n / k]).collect();
    let mut labels = vec![0usize; n];

    let nearest = |color: &Color, centers: &[Color]| -> usize {
        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for (ci, center) in centers.iter().enumerate() {
            let d = dist2(color, center);
            if d < best_d {
                best = ci;
                best_d = d;
            }
        }
        best
    };

    for _ in 0..KMEANS_ITERATIONS {
        if parallel {
            labels
                .par_iter_mut()
                .zip(samples.par_iter())
                .for_each(|(label, color)| *label = nearest(color, &centers));
        } else {
            for (label, color) in labels.iter_mut().zip(samples) {
                *label = nearest(color, &centers);
            }
        }

        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0usize; k];
        for (color, &ci) in samples.iter().zip(&labels) {
            for c in 0..3 {
                sums[ci][c] += color[c];
            }
            counts[ci] += 1;
        }
        for ci in 0..k {
            // Empty clusters keep their previous center.
            if counts[ci] > 0 {
                let n = counts[ci] as f64;
                centers[ci] = [sums[ci][0] / n, sums[ci][1] / n, sums[ci][2] / n];
            }
        }
    }
    labels
}
