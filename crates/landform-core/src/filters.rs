//! Raster filtering and field utilities: separable box blur, grid shifts,
//! percentiles, normalization, distance transforms, connected components.
//!
//! Everything here is deterministic and order-stable; the hot pipeline loops
//! (flow routing, priority flood) index into these outputs directly.

use crate::grid::Grid;

/// Canonical D8 neighbor order. The index of each entry is the encoded
/// `flow_dir` value, so the order itself is part of the external contract.
pub const DIRECTIONS_8: [(i32, i32); 8] = [
    (-1, 0),
    (1, 0),
    (0, 1),
    (0, -1),
    (-1, 1),
    (-1, -1),
    (1, 1),
    (1, -1),
];

pub const SQRT_2: f32 = std::f32::consts::SQRT_2;

/// Step length in cells for a D8 direction index.
#[inline]
pub fn step_length(dir_idx: i8) -> f32 {
    if dir_idx < 0 {
        0.0
    } else if dir_idx >= 4 {
        SQRT_2
    } else {
        1.0
    }
}

// ── Box blur ──────────────────────────────────────────────────────────────────

/// Approximate Gaussian blur using repeated separable box blur passes.
/// Edge-replicated padding; running-sum window per axis.
pub fn box_blur(field: &Grid<f32>, radius: usize, passes: usize) -> Grid<f32> {
    if radius == 0 {
        return field.clone();
    }
    let mut result = field.clone();
    for _ in 0..passes.max(1) {
        result = blur_axis_x(&result, radius);
        result = blur_axis_y(&result, radius);
    }
    result
}

fn blur_axis_x(field: &Grid<f32>, radius: usize) -> Grid<f32> {
    let (w, h) = (field.width(), field.height());
    let kernel = 2 * radius + 1;
    let mut out = Grid::zeros(w, h);
    let mut csum = vec![0.0f32; w + 2 * radius + 1];
    for y in 0..h {
        let mut acc = 0.0f32;
        csum[0] = 0.0;
        for i in 0..w + 2 * radius {
            let x = i.saturating_sub(radius).min(w - 1);
            acc += field.get(y, x);
            csum[i + 1] = acc;
        }
        for x in 0..w {
            out.set(y, x, (csum[x + kernel] - csum[x]) / kernel as f32);
        }
    }
    out
}

fn blur_axis_y(field: &Grid<f32>, radius: usize) -> Grid<f32> {
    let (w, h) = (field.width(), field.height());
    let kernel = 2 * radius + 1;
    let mut out = Grid::zeros(w, h);
    let mut csum = vec![0.0f32; h + 2 * radius + 1];
    for x in 0..w {
        let mut acc = 0.0f32;
        csum[0] = 0.0;
        for i in 0..h + 2 * radius {
            let y = i.saturating_sub(radius).min(h - 1);
            acc += field.get(y, x);
            csum[i + 1] = acc;
        }
        for y in 0..h {
            out.set(y, x, (csum[y + kernel] - csum[y]) / kernel as f32);
        }
    }
    out
}

// ── Shifts ────────────────────────────────────────────────────────────────────

/// Shift a boolean mask by `(dy, dx)`: `out[y][x] = mask[y − dy][x − dx]`
/// where in bounds, false elsewhere.
pub fn shift_bool(mask: &Grid<bool>, dy: i32, dx: i32) -> Grid<bool> {
    let (w, h) = (mask.width(), mask.height());
    let mut out = Grid::filled(w, h, false);
    for y in 0..h {
        let sy = y as i64 - dy as i64;
        if sy < 0 || sy >= h as i64 {
            continue;
        }
        for x in 0..w {
            let sx = x as i64 - dx as i64;
            if sx < 0 || sx >= w as i64 {
                continue;
            }
            out.set(y, x, mask.get(sy as usize, sx as usize));
        }
    }
    out
}

/// 5-point Laplacian; out-of-bounds neighbors read as the field mean.
pub fn laplacian(field: &Grid<f32>) -> Grid<f32> {
    let (w, h) = (field.width(), field.height());
    let mean = if field.is_empty() {
        0.0
    } else {
        field.data().iter().sum::<f32>() / field.len() as f32
    };
    let mut out = Grid::zeros(w, h);
    for y in 0..h {
        for x in 0..w {
            let c = field.get(y, x);
            let up = if y > 0 { field.get(y - 1, x) } else { mean };
            let down = if y + 1 < h { field.get(y + 1, x) } else { mean };
            let left = if x > 0 { field.get(y, x - 1) } else { mean };
            let right = if x + 1 < w { field.get(y, x + 1) } else { mean };
            out.set(y, x, up + down + left + right - 4.0 * c);
        }
    }
    out
}

// ── Percentiles & normalization ───────────────────────────────────────────────

/// Percentile with linear interpolation between order statistics.
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_unstable_by(f32::total_cmp);
    percentile_sorted(&sorted, q)
}

/// Percentile over an already-sorted slice.
pub fn percentile_sorted(sorted: &[f32], q: f32) -> f32 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let pos = (q as f64 / 100.0) * (n - 1) as f64;
    let lo = pos.floor().clamp(0.0, (n - 1) as f64) as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = (pos - lo as f64) as f32;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Quantile in [0,1]; `quantile(v, q) == percentile(v, 100·q)`.
pub fn quantile(values: &[f32], q: f32) -> f32 {
    percentile(values, q * 100.0)
}

/// Min/max rescale to [0,1]; all-zero output when the field max is ≈ 0.
pub fn normalize01(field: &Grid<f32>) -> Grid<f32> {
    let vmax = field.max_value();
    if vmax <= 1e-8 {
        return Grid::zeros(field.width(), field.height());
    }
    let vmin = field.min_value();
    let scale = (vmax - vmin).max(1e-8);
    field.map(|v| ((v - vmin) / scale).clamp(0.0, 1.0))
}

/// Robust rescale to [0,1] between the `lo_pct`/`hi_pct` percentiles.
pub fn normalize01_robust(field: &Grid<f32>, lo_pct: f32, hi_pct: f32) -> Grid<f32> {
    let mut sorted: Vec<f32> = field.data().to_vec();
    sorted.sort_unstable_by(f32::total_cmp);
    let lo = percentile_sorted(&sorted, lo_pct);
    let hi = percentile_sorted(&sorted, hi_pct);
    let scale = (hi - lo).max(1e-6);
    field.map(|v| ((v - lo) / scale).clamp(0.0, 1.0))
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (1.0 - t) * a + t * b
}

// ── Distance transforms ───────────────────────────────────────────────────────

/// Exact Euclidean distance (in cells) from every cell to the nearest `true`
/// cell of `mask`. Two-pass Felzenszwalb lower-envelope transform.
pub fn euclidean_distance_to(mask: &Grid<bool>) -> Grid<f32> {
    let (w, h) = (mask.width(), mask.height());
    let inf = 1e20f64;
    let mut f: Vec<f64> = mask.data().iter().map(|&m| if m { 0.0 } else { inf }).collect();

    // Columns first.
    let mut col = vec![0.0f64; h];
    let mut out_col = vec![0.0f64; h];
    for x in 0..w {
        for y in 0..h {
            col[y] = f[y * w + x];
        }
        dt_1d(&col, &mut out_col);
        for y in 0..h {
            f[y * w + x] = out_col[y];
        }
    }

    // Then rows.
    let mut row = vec![0.0f64; w];
    let mut out_row = vec![0.0f64; w];
    let mut result = Grid::zeros(w, h);
    for y in 0..h {
        row.copy_from_slice(&f[y * w..(y + 1) * w]);
        dt_1d(&row, &mut out_row);
        for x in 0..w {
            result.set(y, x, (out_row[x].min(1e18)).sqrt() as f32);
        }
    }
    result
}

/// 1D squared-distance transform (lower envelope of parabolas).
fn dt_1d(f: &[f64], d: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    for q in 1..n {
        let mut s;
        loop {
            let p = v[k];
            s = ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * (q - p) as f64);
            if s <= z[k] {
                if k == 0 {
                    break;
                }
                k -= 1;
            } else {
                break;
            }
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    let mut k = 0usize;
    for q in 0..n {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let dq = q as f64 - p as f64;
        d[q] = dq * dq + f[p];
    }
}

/// Bounded D8 ring-growth distance to `mask` (Chebyshev metric). Cells beyond
/// `max_radius` hold `max_radius + 1`. Matches the bounded BFS tie-breaking
/// the routing stages rely on for short radii.
pub fn ring_distance_to(mask: &Grid<bool>, max_radius: usize) -> Grid<f32> {
    let max_radius = max_radius.max(1);
    let (w, h) = (mask.width(), mask.height());
    let mut dist = Grid::filled(w, h, (max_radius + 1) as f32);
    for i in 0..mask.len() {
        if mask.at(i) {
            dist.put(i, 0.0);
        }
    }

    let mut frontier = mask.clone();
    let mut visited = mask.clone();

    for radius in 1..=max_radius {
        if !frontier.any() {
            break;
        }
        let mut neighbors = frontier.clone();
        for &(dy, dx) in DIRECTIONS_8.iter() {
            let shifted = shift_bool(&frontier, dy, dx);
            for i in 0..neighbors.len() {
                if shifted.at(i) {
                    neighbors.put(i, true);
                }
            }
        }
        let mut any_new = false;
        let mut new_frontier = Grid::filled(w, h, false);
        for i in 0..neighbors.len() {
            if neighbors.at(i) && !visited.at(i) {
                dist.put(i, radius as f32);
                visited.put(i, true);
                new_frontier.put(i, true);
                any_new = true;
            }
        }
        frontier = new_frontier;
        if !any_new {
            break;
        }
    }
    dist
}

// ── Connected components ──────────────────────────────────────────────────────

/// Connected components of a boolean mask in scan order. Each component is a
/// list of flat indices in DFS pop order. `connectivity` is 4 or 8.
pub fn connected_components(mask: &Grid<bool>, connectivity: u8) -> Vec<Vec<usize>> {
    assert!(
        connectivity == 4 || connectivity == 8,
        "connectivity must be 4 or 8"
    );
    let (w, h) = (mask.width(), mask.height());
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();

    for start in 0..mask.len() {
        if !mask.at(start) || visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![start];
        let mut comp = Vec::new();

        while let Some(idx) = stack.pop() {
            comp.push(idx);
            let y = idx / w;
            let x = idx % w;
            for &(dy, dx) in DIRECTIONS_8.iter() {
                if connectivity == 4 && dy != 0 && dx != 0 {
                    continue;
                }
                let ny = y as i64 + dy as i64;
                let nx = x as i64 + dx as i64;
                if ny < 0 || nx < 0 || ny >= h as i64 || nx >= w as i64 {
                    continue;
                }
                let nidx = ny as usize * w + nx as usize;
                if mask.at(nidx) && !visited[nidx] {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            }
        }
        components.push(comp);
    }
    components
}

/// Land cells with at least one D8 ocean neighbor.
pub fn coast_mask(land_mask: &Grid<bool>) -> Grid<bool> {
    let ocean = land_mask.invert();
    let mut near_ocean = Grid::filled(land_mask.width(), land_mask.height(), false);
    for &(dy, dx) in DIRECTIONS_8.iter() {
        let shifted = shift_bool(&ocean, dy, dx);
        for i in 0..near_ocean.len() {
            if shifted.at(i) {
                near_ocean.put(i, true);
            }
        }
    }
    let mut out = Grid::filled(land_mask.width(), land_mask.height(), false);
    for i in 0..out.len() {
        out.put(i, land_mask.at(i) && near_ocean.at(i));
    }
    out
}

/// Discrete straight-line cell path between two cells, inclusive.
/// `max(|Δy|, |Δx|) + 1` evenly spaced samples, rounded to cells.
pub fn line_cells(y0: i64, x0: i64, y1: i64, x1: i64) -> Vec<(usize, usize)> {
    let steps = (y1 - y0).abs().max((x1 - x0).abs()) as usize + 1;
    let mut out = Vec::with_capacity(steps);
    if steps == 1 {
        out.push((y0 as usize, x0 as usize));
        return out;
    }
    for i in 0..steps {
        let t = i as f64 / (steps - 1) as f64;
        let y = (y0 as f64 + (y1 - y0) as f64 * t).round() as i64;
        let x = (x0 as f64 + (x1 - x0) as f64 * t).round() as i64;
        out.push((y as usize, x as usize));
    }
    out
}

/// Sort flat indices ascending by `(key[i], i)`. The index tie-break keeps the
/// traversal order identical across platforms.
pub fn argsort_ascending(keys: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_unstable_by(|&a, &b| keys[a].total_cmp(&keys[b]).then(a.cmp(&b)));
    order
}

/// Sort flat indices descending by key, ascending by index on ties.
pub fn argsort_descending(keys: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_unstable_by(|&a, &b| keys[b].total_cmp(&keys[a]).then(a.cmp(&b)));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_blur_preserves_constant_field() {
        let g = Grid::filled(16, 9, 3.5f32);
        let blurred = box_blur(&g, 3, 3);
        for &v in blurred.data() {
            assert!((v - 3.5).abs() < 1e-4);
        }
    }

    #[test]
    fn box_blur_spreads_impulse() {
        let mut g = Grid::zeros(11, 11);
        g.set(5, 5, 1.0);
        let blurred = box_blur(&g, 1, 1);
        assert!((blurred.get(5, 5) - 1.0 / 9.0).abs() < 1e-5);
        assert!((blurred.get(4, 4) - 1.0 / 9.0).abs() < 1e-5);
        assert!(blurred.get(0, 0).abs() < 1e-6);
    }

    #[test]
    fn percentile_matches_linear_interpolation() {
        use approx::assert_relative_eq;
        let vals = [1.0f32, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&vals, 0.0), 1.0);
        assert_relative_eq!(percentile(&vals, 100.0), 4.0);
        assert_relative_eq!(percentile(&vals, 50.0), 2.5);
    }

    #[test]
    fn euclidean_distance_simple_case() {
        let mut mask = Grid::filled(5, 5, false);
        mask.set(2, 2, true);
        let d = euclidean_distance_to(&mask);
        assert!(d.get(2, 2).abs() < 1e-6);
        assert!((d.get(2, 4) - 2.0).abs() < 1e-5);
        assert!((d.get(0, 0) - (8.0f32).sqrt()).abs() < 1e-5);
    }

    #[test]
    fn components_split_by_gap() {
        let mut mask = Grid::filled(5, 1, false);
        mask.set(0, 0, true);
        mask.set(0, 1, true);
        mask.set(0, 3, true);
        let comps = connected_components(&mask, 8);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].len(), 2);
        assert_eq!(comps[1].len(), 1);
    }

    #[test]
    fn line_cells_endpoints_and_length() {
        let cells = line_cells(0, 0, 3, 7);
        assert_eq!(cells.first(), Some(&(0, 0)));
        assert_eq!(cells.last(), Some(&(3, 7)));
        assert_eq!(cells.len(), 8);
    }

    #[test]
    fn argsort_breaks_ties_by_index() {
        let keys = [2.0f32, 1.0, 2.0, 1.0];
        assert_eq!(argsort_ascending(&keys), vec![1, 3, 0, 2]);
        assert_eq!(argsort_descending(&keys), vec![0, 2, 1, 3]);
    }
}
