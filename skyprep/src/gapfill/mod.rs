//! Gap filling: replace flagged or missing pixel values from valid neighbors.
//!
//! Two interchangeable strategies with different cost/quality tradeoffs:
//!
//! - [`fill_by_interpolation`]: scattered-data interpolation for small,
//!   localized invalid regions (single bad pixels, small disk selections).
//!   Mutates the image in place at the invalid positions.
//! - [`fill_by_smoothing`]: mask-aware local box smoothing for large or
//!   diffuse flagged regions ahead of aggressive downsampling. Returns a new
//!   array; callers compose the repair with [`compose_repair`].

mod delaunay;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use delaunay::Triangulation;

/// Errors for gap-filling operations.
#[derive(Error, Debug)]
pub enum GapFillError {
    #[error("{0:?} is not a valid fill method (expected nearest, linear, or cubic)")]
    InvalidMethod(String),
    #[error("basis mask selects no cells to interpolate from")]
    EmptyBasis,
    #[error("mask shape {actual:?} does not match image shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("kernel width {kernel_width} exceeds image dimensions {rows}x{cols}")]
    KernelTooLarge {
        kernel_width: usize,
        rows: usize,
        cols: usize,
    },
    #[error("kernel width must be an odd integer of at least 3, got {kernel_width}")]
    BadKernelWidth { kernel_width: usize },
}

/// Scattered-data interpolation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMethod {
    /// Value of the nearest basis sample.
    Nearest,
    /// Barycentric interpolation on a triangulation of the basis samples.
    Linear,
    /// C1 cubic interpolation with estimated vertex gradients.
    Cubic,
}

impl FromStr for FillMethod {
    type Err = GapFillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" => Ok(Self::Linear),
            "cubic" => Ok(Self::Cubic),
            other => Err(GapFillError::InvalidMethod(other.to_string())),
        }
    }
}

impl fmt::Display for FillMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::Cubic => "cubic",
        };
        f.write_str(name)
    }
}

/// Repair invalid cells by 2-D scattered-data interpolation, in place.
///
/// Cells where `basis_mask` is true are the known samples; cells where
/// `invalid_mask` is true are solved for and overwritten in `image`. Under
/// `Linear` and `Cubic`, cells outside the convex hull of the basis points
/// come back as NaN; that is a documented edge case for the caller to check,
/// not an error.
pub fn fill_by_interpolation(
    mut image: ArrayViewMut2<'_, f64>,
    invalid_mask: ArrayView2<'_, bool>,
    basis_mask: ArrayView2<'_, bool>,
    method: FillMethod,
) -> Result<(), GapFillError> {
    let shape = image.dim();
    check_shape(shape, invalid_mask.dim())?;
    check_shape(shape, basis_mask.dim())?;

    let mut points: Vec<(f64, f64)> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    for ((r, c), &is_basis) in basis_mask.indexed_iter() {
        if is_basis {
            points.push((c as f64, r as f64));
            values.push(image[[r, c]]);
        }
    }
    if points.is_empty() {
        return Err(GapFillError::EmptyBasis);
    }

    let targets: Vec<(usize, usize)> = invalid_mask
        .indexed_iter()
        .filter(|&(_, &bad)| bad)
        .map(|(idx, _)| idx)
        .collect();
    if targets.is_empty() {
        return Ok(());
    }
    let queries: Vec<(f64, f64)> = targets.iter().map(|&(r, c)| (c as f64, r as f64)).collect();

    let filled = match method {
        FillMethod::Nearest => nearest_values(&points, &values, &queries),
        FillMethod::Linear => linear_values(&points, &values, &queries),
        FillMethod::Cubic => cubic_values(&points, &values, &queries),
    };

    for (&(r, c), v) in targets.iter().zip(filled) {
        image[[r, c]] = v;
    }
    Ok(())
}

/// Smooth an image with a normalized box kernel that skips invalid cells.
///
/// Each output cell averages the valid neighbors its kernel window covers;
/// the normalization adapts per cell to however many valid neighbors that is.
/// Cells whose whole window is invalid come back as NaN. Only the positions
/// originally marked invalid are meant to be taken from the result; compose
/// with [`compose_repair`].
pub fn fill_by_smoothing(
    image: ArrayView2<'_, f64>,
    invalid_mask: ArrayView2<'_, bool>,
    kernel_width: usize,
) -> Result<Array2<f64>, GapFillError> {
    let (rows, cols) = image.dim();
    check_shape((rows, cols), invalid_mask.dim())?;
    if kernel_width < 3 || kernel_width % 2 == 0 {
        return Err(GapFillError::BadKernelWidth { kernel_width });
    }
    if kernel_width > rows || kernel_width > cols {
        return Err(GapFillError::KernelTooLarge {
            kernel_width,
            rows,
            cols,
        });
    }

    let half = (kernel_width / 2) as isize;
    let mut out = Array2::zeros((rows, cols));

    for r in 0..rows {
        for c in 0..cols {
            let mut sum = 0.0;
            let mut count = 0usize;
            for dr in -half..=half {
                for dc in -half..=half {
                    let rr = r as isize + dr;
                    let cc = c as isize + dc;
                    if rr < 0 || rr >= rows as isize || cc < 0 || cc >= cols as isize {
                        continue;
                    }
                    let (rr, cc) = (rr as usize, cc as usize);
                    if invalid_mask[[rr, cc]] {
                        continue;
                    }
                    sum += image[[rr, cc]];
                    count += 1;
                }
            }
            out[[r, c]] = if count > 0 {
                sum / count as f64
            } else {
                f64::NAN
            };
        }
    }

    Ok(out)
}

/// Compose a repaired image: smoothed values at invalid positions, original
/// values everywhere else.
pub fn compose_repair(
    original: ArrayView2<'_, f64>,
    smoothed: ArrayView2<'_, f64>,
    invalid_mask: ArrayView2<'_, bool>,
) -> Result<Array2<f64>, GapFillError> {
    let shape = original.dim();
    check_shape(shape, smoothed.dim())?;
    check_shape(shape, invalid_mask.dim())?;

    let mut out = original.to_owned();
    for ((r, c), &bad) in invalid_mask.indexed_iter() {
        if bad {
            out[[r, c]] = smoothed[[r, c]];
        }
    }
    Ok(out)
}

fn check_shape(
    expected: (usize, usize),
    actual: (usize, usize),
) -> Result<(), GapFillError> {
    if expected == actual {
        Ok(())
    } else {
        Err(GapFillError::ShapeMismatch { expected, actual })
    }
}

/// Nearest basis value per query, ties broken by basis scan order.
fn nearest_values(points: &[(f64, f64)], values: &[f64], queries: &[(f64, f64)]) -> Vec<f64> {
    queries
        .iter()
        .map(|&(qx, qy)| {
            let mut best = 0;
            let mut best_d2 = f64::INFINITY;
            for (i, &(px, py)) in points.iter().enumerate() {
                let d2 = (px - qx) * (px - qx) + (py - qy) * (py - qy);
                if d2 < best_d2 {
                    best_d2 = d2;
                    best = i;
                }
            }
            values[best]
        })
        .collect()
}

fn linear_values(points: &[(f64, f64)], values: &[f64], queries: &[(f64, f64)]) -> Vec<f64> {
    let tri = Triangulation::build(points);
    queries
        .iter()
        .map(|&(qx, qy)| match tri.locate(qx, qy) {
            Some((ti, bary)) => {
                let [i, j, k] = tri.triangles()[ti];
                bary[0] * values[i] + bary[1] * values[j] + bary[2] * values[k]
            }
            None => f64::NAN,
        })
        .collect()
}

fn cubic_values(points: &[(f64, f64)], values: &[f64], queries: &[(f64, f64)]) -> Vec<f64> {
    let tri = Triangulation::build(points);
    let gradients = estimate_gradients(&tri, values);
    queries
        .iter()
        .map(|&(qx, qy)| match tri.locate(qx, qy) {
            Some((ti, bary)) => cubic_triangle_value(&tri, ti, bary, values, &gradients),
            None => f64::NAN,
        })
        .collect()
}

/// Per-vertex gradient estimates from a distance-weighted least-squares fit
/// over edge-connected neighbors. Exact for linear data, which gives the
/// cubic interpolant linear precision.
fn estimate_gradients(tri: &Triangulation, values: &[f64]) -> Vec<[f64; 2]> {
    let n = tri.num_points();
    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for t in tri.triangles() {
        for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
            if !neighbors[a].contains(&b) {
                neighbors[a].push(b);
            }
            if !neighbors[b].contains(&a) {
                neighbors[b].push(a);
            }
        }
    }

    let mut gradients = vec![[0.0, 0.0]; n];
    for v in 0..n {
        let (vx, vy) = tri.point(v);
        let mut a11 = 0.0;
        let mut a12 = 0.0;
        let mut a22 = 0.0;
        let mut b1 = 0.0;
        let mut b2 = 0.0;
        for &nb in &neighbors[v] {
            let (nx, ny) = tri.point(nb);
            let dx = nx - vx;
            let dy = ny - vy;
            let d2 = dx * dx + dy * dy;
            if d2 == 0.0 {
                continue;
            }
            let w = 1.0 / d2;
            let df = values[nb] - values[v];
            a11 += w * dx * dx;
            a12 += w * dx * dy;
            a22 += w * dy * dy;
            b1 += w * df * dx;
            b2 += w * df * dy;
        }
        let det = a11 * a22 - a12 * a12;
        if det.abs() > 1e-12 {
            gradients[v] = [(a22 * b1 - a12 * b2) / det, (a11 * b2 - a12 * b1) / det];
        }
    }
    gradients
}

/// Evaluate a cubic Bezier triangle built from vertex values and gradients.
/// The interior control point is chosen for quadratic precision.
fn cubic_triangle_value(
    tri: &Triangulation,
    ti: usize,
    bary: [f64; 3],
    values: &[f64],
    gradients: &[[f64; 2]],
) -> f64 {
    let idx = tri.triangles()[ti];
    let p: Vec<(f64, f64)> = idx.iter().map(|&i| tri.point(i)).collect();
    let f: Vec<f64> = idx.iter().map(|&i| values[i]).collect();
    let g: Vec<[f64; 2]> = idx.iter().map(|&i| gradients[i]).collect();

    // Edge control point leaving vertex `a` toward vertex `b`.
    let edge = |a: usize, b: usize| -> f64 {
        f[a] + (g[a][0] * (p[b].0 - p[a].0) + g[a][1] * (p[b].1 - p[a].1)) / 3.0
    };
    let b210 = edge(0, 1);
    let b201 = edge(0, 2);
    let b120 = edge(1, 0);
    let b021 = edge(1, 2);
    let b102 = edge(2, 0);
    let b012 = edge(2, 1);

    let e = (b210 + b201 + b120 + b021 + b102 + b012) / 6.0;
    let v_avg = (f[0] + f[1] + f[2]) / 3.0;
    let b111 = e + (e - v_avg) / 2.0;

    let [u, v, w] = bary;
    f[0] * u * u * u
        + f[1] * v * v * v
        + f[2] * w * w * w
        + 3.0 * (b210 * u * u * v
            + b201 * u * u * w
            + b120 * u * v * v
            + b021 * v * v * w
            + b102 * u * w * w
            + b012 * v * w * w)
        + 6.0 * b111 * u * v * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;
    use rstest::rstest;

    /// The classic single-bad-pixel fixture: a 3x3 ramp with a hole in the
    /// middle and the eight neighbors as interpolation basis.
    fn bad_center_fixture() -> (Array2<f64>, Array2<bool>, Array2<bool>) {
        let image = arr2(&[[1.0, 2.0, 3.0], [4.0, 0.0, 6.0], [7.0, 8.0, 9.0]]);
        let basis = arr2(&[
            [true, true, true],
            [true, false, true],
            [true, true, true],
        ]);
        let invalid = basis.mapv(|b| !b);
        (image, invalid, basis)
    }

    #[rstest]
    #[case(FillMethod::Nearest, 2.0, 1e-12)]
    #[case(FillMethod::Linear, 5.0, 1e-9)]
    #[case(FillMethod::Cubic, 5.0, 1e-6)]
    fn test_bad_center_fill(
        #[case] method: FillMethod,
        #[case] expected: f64,
        #[case] tol: f64,
    ) {
        let (mut image, invalid, basis) = bad_center_fixture();
        let before = image.clone();
        fill_by_interpolation(image.view_mut(), invalid.view(), basis.view(), method).unwrap();

        assert_relative_eq!(image[[1, 1]], expected, epsilon = tol);
        // Basis cells are untouched.
        for ((r, c), &is_basis) in basis.indexed_iter() {
            if is_basis {
                assert_eq!(image[[r, c]], before[[r, c]]);
            }
        }
    }

    #[test]
    fn test_nearest_introduces_no_new_values() {
        let mut image = arr2(&[
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 0.0, 0.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
        ]);
        let invalid = arr2(&[
            [false, false, false, false],
            [false, true, true, false],
            [false, false, false, false],
        ]);
        let basis = invalid.mapv(|b| !b);
        let basis_values: Vec<f64> = image
            .indexed_iter()
            .filter(|&((r, c), _)| basis[[r, c]])
            .map(|(_, &v)| v)
            .collect();

        fill_by_interpolation(
            image.view_mut(),
            invalid.view(),
            basis.view(),
            FillMethod::Nearest,
        )
        .unwrap();

        for ((r, c), &v) in image.indexed_iter() {
            if invalid[[r, c]] {
                assert!(basis_values.contains(&v), "{v} is not a basis value");
            }
        }
    }

    #[test]
    fn test_linear_nan_outside_hull() {
        // Basis confined to the left two columns, hole on the far right.
        let mut image = Array2::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as f64);
        let mut basis = Array2::from_elem((4, 6), false);
        basis.slice_mut(ndarray::s![.., 0..2]).fill(true);
        let mut invalid = Array2::from_elem((4, 6), false);
        invalid[[2, 5]] = true;

        fill_by_interpolation(
            image.view_mut(),
            invalid.view(),
            basis.view(),
            FillMethod::Linear,
        )
        .unwrap();
        assert!(image[[2, 5]].is_nan());
    }

    #[test]
    fn test_interpolation_errors() {
        let (mut image, invalid, basis) = bad_center_fixture();

        let empty_basis = Array2::from_elem((3, 3), false);
        assert!(matches!(
            fill_by_interpolation(
                image.view_mut(),
                invalid.view(),
                empty_basis.view(),
                FillMethod::Linear,
            ),
            Err(GapFillError::EmptyBasis)
        ));

        let wrong = Array2::from_elem((2, 3), false);
        assert!(matches!(
            fill_by_interpolation(
                image.view_mut(),
                wrong.view(),
                basis.view(),
                FillMethod::Linear,
            ),
            Err(GapFillError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_fill_method_parsing() {
        assert_eq!("cubic".parse::<FillMethod>().unwrap(), FillMethod::Cubic);
        assert!(matches!(
            "spline".parse::<FillMethod>(),
            Err(GapFillError::InvalidMethod(_))
        ));
        assert_eq!(FillMethod::Nearest.to_string(), "nearest");
    }

    #[test]
    fn test_smoothing_excludes_invalid_cells() {
        let image = arr2(&[
            [1.0, 1.0, 1.0],
            [1.0, 100.0, 1.0],
            [1.0, 1.0, 1.0],
        ]);
        let mut invalid = Array2::from_elem((3, 3), false);
        invalid[[1, 1]] = true;

        let smoothed = fill_by_smoothing(image.view(), invalid.view(), 3).unwrap();
        // The flagged value never contributes, so the center is the average
        // of its eight valid neighbors.
        assert_relative_eq!(smoothed[[1, 1]], 1.0);
        // A corner window covers 4 cells, one of them invalid.
        assert_relative_eq!(smoothed[[0, 0]], 1.0);
    }

    #[test]
    fn test_smoothing_compose_keeps_valid_cells() {
        let mut image = Array2::from_shape_fn((5, 5), |(r, c)| (r * 5 + c) as f64);
        image[[2, 2]] = 999.0;
        let mut invalid = Array2::from_elem((5, 5), false);
        invalid[[2, 2]] = true;
        invalid[[0, 4]] = true;

        let smoothed = fill_by_smoothing(image.view(), invalid.view(), 3).unwrap();
        let repaired = compose_repair(image.view(), smoothed.view(), invalid.view()).unwrap();

        for ((r, c), &bad) in invalid.indexed_iter() {
            if bad {
                assert!(repaired[[r, c]].is_finite());
                assert_ne!(repaired[[r, c]], image[[r, c]]);
            } else {
                assert_eq!(repaired[[r, c]], image[[r, c]]);
            }
        }
    }

    #[test]
    fn test_smoothing_unreachable_region_is_nan() {
        let image = Array2::from_elem((5, 5), 7.0);
        let invalid = Array2::from_elem((5, 5), true);
        let smoothed = fill_by_smoothing(image.view(), invalid.view(), 3).unwrap();
        assert!(smoothed.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_smoothing_kernel_validation() {
        let image = Array2::from_elem((4, 4), 1.0);
        let invalid = Array2::from_elem((4, 4), false);

        assert!(matches!(
            fill_by_smoothing(image.view(), invalid.view(), 5),
            Err(GapFillError::KernelTooLarge { kernel_width: 5, .. })
        ));
        assert!(matches!(
            fill_by_smoothing(image.view(), invalid.view(), 4),
            Err(GapFillError::BadKernelWidth { kernel_width: 4 })
        ));
        assert!(matches!(
            fill_by_smoothing(image.view(), invalid.view(), 1),
            Err(GapFillError::BadKernelWidth { kernel_width: 1 })
        ));
    }
}
