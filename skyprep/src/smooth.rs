//! Whole-image smoothing filters.
//!
//! Unlike the mask-aware repair in [`crate::gapfill`], these treat every cell
//! as valid; they back the plain "smooth this image" operation viewers offer
//! next to bad-pixel correction. Edges are handled by reflection.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Smoothing filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothKind {
    /// Normalized box filter of the given width.
    Boxcar(usize),
    /// Gaussian filter with the given sigma, truncated at four sigmas.
    Gaussian(f64),
    /// Median filter of the given width.
    Median(usize),
}

/// Smooth an image. Degenerate parameters (width below 2, non-positive
/// sigma) return an unchanged copy.
pub fn smooth(image: ArrayView2<'_, f64>, kind: SmoothKind) -> Array2<f64> {
    match kind {
        SmoothKind::Boxcar(width) => {
            if width < 2 {
                return image.to_owned();
            }
            let weights = vec![1.0 / width as f64; width];
            separable_convolve(image, &weights)
        }
        SmoothKind::Gaussian(sigma) => {
            if sigma <= 0.0 {
                return image.to_owned();
            }
            separable_convolve(image, &gaussian_kernel(sigma))
        }
        SmoothKind::Median(width) => {
            if width < 2 {
                return image.to_owned();
            }
            median_filter(image, width)
        }
    }
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma).ceil() as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| {
            let x = i as f64;
            (-0.5 * x * x / (sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= total;
    }
    kernel
}

/// Reflected index for out-of-range taps: `(d c b a | a b c d | d c b a)`.
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let period = 2 * n;
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - 1 - i;
    }
    i as usize
}

/// Convolve rows then columns with a 1-D kernel.
fn separable_convolve(image: ArrayView2<'_, f64>, weights: &[f64]) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let offset = (weights.len() / 2) as isize;

    let mut pass1 = Array2::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut sum = 0.0;
            for (k, &w) in weights.iter().enumerate() {
                let cc = reflect(c as isize + k as isize - offset, cols);
                sum += w * image[[r, cc]];
            }
            pass1[[r, c]] = sum;
        }
    }

    let mut out = Array2::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut sum = 0.0;
            for (k, &w) in weights.iter().enumerate() {
                let rr = reflect(r as isize + k as isize - offset, rows);
                sum += w * pass1[[rr, c]];
            }
            out[[r, c]] = sum;
        }
    }
    out
}

fn median_filter(image: ArrayView2<'_, f64>, width: usize) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let offset = (width / 2) as isize;
    let mut window = Vec::with_capacity(width * width);
    let mut out = Array2::zeros((rows, cols));

    for r in 0..rows {
        for c in 0..cols {
            window.clear();
            for dr in 0..width {
                for dc in 0..width {
                    let rr = reflect(r as isize + dr as isize - offset, rows);
                    let cc = reflect(c as isize + dc as isize - offset, cols);
                    window.push(image[[rr, cc]]);
                }
            }
            window.sort_by(f64::total_cmp);
            let n = window.len();
            out[[r, c]] = if n % 2 == 1 {
                window[n / 2]
            } else {
                0.5 * (window[n / 2 - 1] + window[n / 2])
            };
        }
    }
    out
}
