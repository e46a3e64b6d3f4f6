//! Minimal incremental Delaunay triangulation for scattered-data
//! interpolation.
//!
//! Bowyer-Watson insertion with a synthetic super-triangle. Cocircular point
//! sets (ubiquitous on pixel grids) are resolved deterministically by treating
//! on-circle points as outside the circumcircle.

use std::collections::HashMap;

const EPS: f64 = 1e-9;

/// A triangulation over a fixed set of scattered points.
#[derive(Debug, Clone)]
pub(crate) struct Triangulation {
    points: Vec<(f64, f64)>,
    triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    /// Triangulate a point set. Collinear-only inputs produce an empty
    /// triangle list (a degenerate hull), which callers treat as
    /// "everything is outside".
    pub fn build(points: &[(f64, f64)]) -> Self {
        let n = points.len();
        if n < 3 {
            return Self {
                points: points.to_vec(),
                triangles: Vec::new(),
            };
        }

        let mut pts = points.to_vec();

        // Super-triangle comfortably enclosing the bounding box.
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in points {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        let cx = 0.5 * (min_x + max_x);
        let cy = 0.5 * (min_y + max_y);
        let span = (max_x - min_x).max(max_y - min_y).max(1.0);
        pts.push((cx - 20.0 * span, cy - 10.0 * span));
        pts.push((cx + 20.0 * span, cy - 10.0 * span));
        pts.push((cx, cy + 20.0 * span));

        let mut triangles: Vec<[usize; 3]> = vec![oriented(&pts, [n, n + 1, n + 2])];

        for p in 0..n {
            let target = pts[p];
            let mut bad: Vec<usize> = triangles
                .iter()
                .enumerate()
                .filter(|(_, &tri)| in_circumcircle(&pts, tri, target))
                .map(|(i, _)| i)
                .collect();

            // Degenerate fallback: the point sits exactly on shared edges and
            // no circumcircle strictly contains it. Split its host triangle.
            if bad.is_empty() {
                if let Some(host) = triangles
                    .iter()
                    .position(|&tri| barycentric(&pts, tri, target.0, target.1).is_some())
                {
                    bad.push(host);
                } else {
                    continue;
                }
            }

            // Boundary of the cavity: edges that belong to exactly one bad
            // triangle.
            let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
            for &ti in &bad {
                for edge in tri_edges(triangles[ti]) {
                    *edge_count.entry(sorted(edge)).or_insert(0) += 1;
                }
            }
            let mut boundary: Vec<(usize, usize)> = Vec::new();
            for &ti in &bad {
                for edge in tri_edges(triangles[ti]) {
                    if edge_count[&sorted(edge)] == 1 {
                        boundary.push(edge);
                    }
                }
            }

            let bad_set: std::collections::HashSet<usize> = bad.into_iter().collect();
            let mut next: Vec<[usize; 3]> = triangles
                .iter()
                .enumerate()
                .filter(|(i, _)| !bad_set.contains(i))
                .map(|(_, &t)| t)
                .collect();
            for (a, b) in boundary {
                next.push(oriented(&pts, [p, a, b]));
            }
            triangles = next;
        }

        triangles.retain(|t| t.iter().all(|&i| i < n));

        Self {
            points: points.to_vec(),
            triangles,
        }
    }

    pub fn point(&self, idx: usize) -> (f64, f64) {
        self.points[idx]
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Find the triangle containing a query point and its barycentric
    /// coordinates. Returns `None` outside the convex hull.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, [f64; 3])> {
        for (ti, &tri) in self.triangles.iter().enumerate() {
            if let Some(bary) = barycentric(&self.points, tri, x, y) {
                return Some((ti, bary));
            }
        }
        None
    }
}

fn sorted(edge: (usize, usize)) -> (usize, usize) {
    if edge.0 <= edge.1 {
        edge
    } else {
        (edge.1, edge.0)
    }
}

fn tri_edges(t: [usize; 3]) -> [(usize, usize); 3] {
    [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])]
}

fn signed_area(pts: &[(f64, f64)], t: [usize; 3]) -> f64 {
    let (ax, ay) = pts[t[0]];
    let (bx, by) = pts[t[1]];
    let (cx, cy) = pts[t[2]];
    0.5 * ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay))
}

/// Re-order a triangle counter-clockwise so the in-circle test has a fixed
/// sign convention.
fn oriented(pts: &[(f64, f64)], mut t: [usize; 3]) -> [usize; 3] {
    if signed_area(pts, t) < 0.0 {
        t.swap(1, 2);
    }
    t
}

/// Strict in-circumcircle test for a CCW triangle. On-circle points count as
/// outside, which keeps cocircular grid configurations deterministic.
fn in_circumcircle(pts: &[(f64, f64)], t: [usize; 3], p: (f64, f64)) -> bool {
    let (ax, ay) = pts[t[0]];
    let (bx, by) = pts[t[1]];
    let (cx, cy) = pts[t[2]];
    let (px, py) = p;

    let adx = ax - px;
    let ady = ay - py;
    let bdx = bx - px;
    let bdy = by - py;
    let cdx = cx - px;
    let cdy = cy - py;

    let det = (adx * adx + ady * ady) * (bdx * cdy - cdx * bdy)
        - (bdx * bdx + bdy * bdy) * (adx * cdy - cdx * ady)
        + (cdx * cdx + cdy * cdy) * (adx * bdy - bdx * ady);

    det > EPS
}

/// Barycentric coordinates of `(x, y)` in a triangle, or `None` when the
/// point lies outside (within a small tolerance) or the triangle is
/// degenerate.
pub(crate) fn barycentric(
    pts: &[(f64, f64)],
    t: [usize; 3],
    x: f64,
    y: f64,
) -> Option<[f64; 3]> {
    let (x0, y0) = pts[t[0]];
    let (x1, y1) = pts[t[1]];
    let (x2, y2) = pts[t[2]];

    let denom = (y1 - y2) * (x0 - x2) + (x2 - x1) * (y0 - y2);
    if denom.abs() < 1e-12 {
        return None;
    }
    let w0 = ((y1 - y2) * (x - x2) + (x2 - x1) * (y - y2)) / denom;
    let w1 = ((y2 - y0) * (x - x2) + (x0 - x2) * (y - y2)) / denom;
    let w2 = 1.0 - w0 - w1;

    if w0 >= -EPS && w1 >= -EPS && w2 >= -EPS {
        Some([w0, w1, w2])
    } else {
        None
    }
}
