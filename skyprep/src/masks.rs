//! Boolean region masks: the disk and annulus selections viewers use to pick
//! repair targets and interpolation bases, plus border handling for
//! quality-aware resampling.

use ndarray::Array2;

/// Mask of cells within `radius` of the center `(cy, cx)`, inclusive.
pub fn disk_mask(shape: (usize, usize), cy: f64, cx: f64, radius: f64) -> Array2<bool> {
    let r2 = radius * radius;
    Array2::from_shape_fn(shape, |(r, c)| {
        let dy = r as f64 - cy;
        let dx = c as f64 - cx;
        dy * dy + dx * dx <= r2
    })
}

/// Mask of cells whose center distance `d` from `(cy, cx)` satisfies
/// `r_in <= d <= r_out`.
pub fn annulus_mask(
    shape: (usize, usize),
    cy: f64,
    cx: f64,
    r_in: f64,
    r_out: f64,
) -> Array2<bool> {
    Array2::from_shape_fn(shape, |(r, c)| {
        let dy = r as f64 - cy;
        let dx = c as f64 - cx;
        let d = (dy * dy + dx * dx).sqrt();
        d >= r_in && d <= r_out
    })
}

/// Clear every mark within `width` cells of each edge.
///
/// Border pixels are typically reference/non-science rows and columns;
/// excluding them keeps edge flags from dragging smoothing artifacts into a
/// repair.
pub fn clear_border(mask: &mut Array2<bool>, width: usize) {
    if width == 0 {
        return;
    }
    let (rows, cols) = mask.dim();
    for ((r, c), cell) in mask.indexed_iter_mut() {
        if r < width || c < width || r >= rows.saturating_sub(width) || c >= cols.saturating_sub(width) {
            *cell = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_mask() {
        let mask = disk_mask((5, 5), 2.0, 2.0, 1.0);
        // Center plus the four axis-aligned neighbors.
        assert_eq!(mask.iter().filter(|&&m| m).count(), 5);
        assert!(mask[[2, 2]]);
        assert!(mask[[1, 2]]);
        assert!(!mask[[1, 1]]);
    }

    #[test]
    fn test_annulus_mask_excludes_interior() {
        let mask = annulus_mask((7, 7), 3.0, 3.0, 1.5, 3.0);
        assert!(!mask[[3, 3]]);
        assert!(!mask[[3, 4]]); // d = 1 < r_in
        assert!(mask[[3, 1]]); // d = 2
        assert!(mask[[0, 3]]); // d = 3
        assert!(!mask[[0, 0]]); // d > 4
    }

    #[test]
    fn test_clear_border() {
        let mut mask = Array2::from_elem((5, 6), true);
        clear_border(&mut mask, 1);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 3 * 4);
        assert!(!mask[[0, 0]]);
        assert!(!mask[[4, 5]]);
        assert!(mask[[1, 1]]);

        // A border wider than the array clears everything.
        let mut small = Array2::from_elem((3, 3), true);
        clear_border(&mut small, 2);
        assert!(small.iter().all(|&m| !m));
    }
}
