//! D8 flow direction, accumulation, and drainage-state analysis.
//!
//! Traversals that feed accumulation and terminal labeling follow a total
//! order: elevation, then flat index. The tie-break keeps results identical
//! across platforms.

use crate::error::GenerateError;
use crate::filters::{argsort_ascending, argsort_descending, normalize01, DIRECTIONS_8};
use crate::grid::Grid;

/// Routing fields plus basin/terminal labels for one surface.
pub struct DrainageState {
    pub flow_dir: Grid<i8>,
    pub flow_accum: Grid<f32>,
    /// Flat index of the sink component seed each sink-bound cell drains to; −1 otherwise.
    pub sink_id_flat: Vec<i32>,
    /// Flat index of the ocean cell each ocean-bound cell exits through; −1 otherwise.
    pub outlet_raw_flat: Vec<i32>,
    /// Grouping key: outlet index for exorheic cells, −(sink+1) for endorheic.
    pub basin_key_flat: Vec<i64>,
    /// Contiguous basin ids 1..N on land, −1 off land.
    pub basin_id_map: Grid<i32>,
    /// Normalized log basin size per cell.
    pub basin_size_map: Grid<f32>,
    pub endorheic_mask: Grid<bool>,
    /// Distinct raw outlet cells, ascending by flat index.
    pub ocean_outlet_points: Vec<(usize, usize)>,
}

/// Destination flat index per cell for a direction raster; −1 where unrouted.
pub fn flow_dest_from_dir(flow_dir: &Grid<i8>) -> Vec<i32> {
    let (w, h) = (flow_dir.width(), flow_dir.height());
    let mut dest = vec![-1i32; w * h];
    for y in 0..h {
        for x in 0..w {
            let d = flow_dir.get(y, x);
            if d < 0 {
                continue;
            }
            let (dy, dx) = DIRECTIONS_8[d as usize];
            if let Some((ny, nx)) = flow_dir.neighbor(y, x, dy, dx) {
                dest[y * w + x] = (ny * w + nx) as i32;
            }
        }
    }
    dest
}

/// D8 direction and accumulation for a surface.
///
/// Each cell drains to the neighbor with the largest positive drop; ocean
/// cells and cells with no downhill neighbor get −1. Accumulation starts at
/// one per cell and is pushed downstream in descending-elevation order.
pub fn compute_flow_d8(
    height: &Grid<f32>,
    ocean_mask: &Grid<bool>,
    with_accumulation: bool,
) -> (Grid<i8>, Grid<f32>) {
    let (w, h) = (height.width(), height.height());
    let mut flow_dir = Grid::filled(w, h, -1i8);
    let mut dest_flat = vec![-1i32; w * h];

    for y in 0..h {
        for x in 0..w {
            if ocean_mask.get(y, x) {
                continue;
            }
            let here = height.get(y, x);
            let mut best_drop = 0.0f32;
            let mut best_dir = -1i8;
            let mut best_dest = -1i32;
            for (dir_idx, &(dy, dx)) in DIRECTIONS_8.iter().enumerate() {
                let Some((ny, nx)) = height.neighbor(y, x, dy, dx) else {
                    continue;
                };
                let drop = here - height.get(ny, nx);
                if drop > best_drop {
                    best_drop = drop;
                    best_dir = dir_idx as i8;
                    best_dest = (ny * w + nx) as i32;
                }
            }
            flow_dir.set(y, x, best_dir);
            dest_flat[y * w + x] = best_dest;
        }
    }

    if !with_accumulation {
        return (flow_dir, Grid::zeros(w, h));
    }

    let order = argsort_descending(height.data());
    let mut accum = vec![1.0f32; w * h];
    for &src in &order {
        let dst = dest_flat[src];
        if dst >= 0 {
            accum[dst as usize] += accum[src];
        }
    }
    (flow_dir, Grid::from_vec(w, h, accum))
}

/// Full drainage analysis of a surface: routing, terminal labels, basin ids.
pub fn analyze_drainage_state(height: &Grid<f32>, land_mask: &Grid<bool>) -> DrainageState {
    let (w, h) = (height.width(), height.height());
    let size = w * h;
    let ocean_mask = land_mask.invert();

    let (flow_dir, mut flow_accum) = compute_flow_d8(height, &ocean_mask, true);
    for i in 0..size {
        if ocean_mask.at(i) {
            flow_accum.put(i, 0.0);
        }
    }

    let dest_flat = flow_dest_from_dir(&flow_dir);
    let mut sink_id_flat = vec![-1i32; size];
    let mut outlet_raw_flat = vec![-1i32; size];

    // Ascending order: every cell's destination is processed before the cell,
    // so terminal labels propagate in one pass.
    let order = argsort_ascending(height.data());
    for &idx in &order {
        if !land_mask.at(idx) {
            continue;
        }
        let dst = dest_flat[idx];
        if dst < 0 {
            sink_id_flat[idx] = idx as i32;
            continue;
        }
        let dst = dst as usize;
        if !land_mask.at(dst) {
            outlet_raw_flat[idx] = dst as i32;
            continue;
        }
        if outlet_raw_flat[dst] >= 0 {
            outlet_raw_flat[idx] = outlet_raw_flat[dst];
        } else {
            sink_id_flat[idx] = if sink_id_flat[dst] >= 0 {
                sink_id_flat[dst]
            } else {
                dst as i32
            };
        }
    }

    let mut basin_key_flat = vec![0i64; size];
    for i in 0..size {
        if !land_mask.at(i) {
            continue;
        }
        basin_key_flat[i] = if outlet_raw_flat[i] >= 0 {
            outlet_raw_flat[i] as i64
        } else {
            -(sink_id_flat[i] as i64 + 1)
        };
    }

    let (basin_id_map, basin_size_map) = basin_ids_from_keys(&basin_key_flat, land_mask);

    let mut endorheic_mask = Grid::filled(w, h, false);
    for i in 0..size {
        endorheic_mask.put(i, sink_id_flat[i] >= 0 && land_mask.at(i));
    }

    let mut raw_outlets: Vec<i32> = (0..size)
        .filter(|&i| land_mask.at(i) && outlet_raw_flat[i] >= 0)
        .map(|i| outlet_raw_flat[i])
        .collect();
    raw_outlets.sort_unstable();
    raw_outlets.dedup();
    let ocean_outlet_points = raw_outlets
        .iter()
        .map(|&f| (f as usize / w, f as usize % w))
        .collect();

    DrainageState {
        flow_dir,
        flow_accum,
        sink_id_flat,
        outlet_raw_flat,
        basin_key_flat,
        basin_id_map,
        basin_size_map,
        endorheic_mask,
        ocean_outlet_points,
    }
}

/// Contiguous 1..N basin ids from grouping keys, plus the normalized log-size
/// raster. Ids follow ascending key order.
pub fn basin_ids_from_keys(
    basin_key_flat: &[i64],
    land_mask: &Grid<bool>,
) -> (Grid<i32>, Grid<f32>) {
    let (w, h) = (land_mask.width(), land_mask.height());
    let mut basin_id_map = Grid::filled(w, h, -1i32);
    let mut basin_size_map = Grid::zeros(w, h);

    let land_idx: Vec<usize> = (0..land_mask.len()).filter(|&i| land_mask.at(i)).collect();
    if land_idx.is_empty() {
        return (basin_id_map, basin_size_map);
    }

    let mut keys: Vec<i64> = land_idx.iter().map(|&i| basin_key_flat[i]).collect();
    keys.sort_unstable();
    keys.dedup();

    let mut counts = vec![0usize; keys.len()];
    for &i in &land_idx {
        let pos = keys.binary_search(&basin_key_flat[i]).unwrap();
        counts[pos] += 1;
        basin_id_map.put(i, pos as i32 + 1);
    }
    for &i in &land_idx {
        let pos = keys.binary_search(&basin_key_flat[i]).unwrap();
        basin_size_map.put(i, (counts[pos] as f32).ln_1p());
    }
    (basin_id_map, normalize01(&basin_size_map))
}

/// Stage-boundary assertions over the routed flow fields.
pub fn validate_flow_fields(
    flow_accum: &Grid<f32>,
    flow_dir: &Grid<i8>,
    land_mask: &Grid<bool>,
) -> Result<(), GenerateError> {
    if !flow_accum.same_shape(flow_dir) || !flow_accum.same_shape(land_mask) {
        return Err(GenerateError::ShapeMismatch("flow fields"));
    }
    if !flow_accum.is_finite() {
        return Err(GenerateError::NonFinite("flow_accum"));
    }
    if flow_accum.min_value() < 0.0 {
        return Err(GenerateError::FlowInvariant(
            "flow_accum has negative values".into(),
        ));
    }

    let mut land_count = 0usize;
    let mut nonzero = 0usize;
    let mut min_land = f32::INFINITY;
    let mut max_flow = 0.0f32;
    let mut sum_flow = 0.0f64;
    for i in 0..flow_accum.len() {
        if !land_mask.at(i) {
            continue;
        }
        let v = flow_accum.at(i);
        land_count += 1;
        if v > 0.0 {
            nonzero += 1;
        }
        min_land = min_land.min(v);
        max_flow = max_flow.max(v);
        sum_flow += v as f64;
    }
    if land_count == 0 {
        return Ok(());
    }
    if min_land < 1.0 - 1e-4 {
        return Err(GenerateError::FlowInvariant(format!(
            "flow_accum has land value below self-contribution: {min_land:.3}"
        )));
    }
    let nonzero_fraction = nonzero as f64 / land_count as f64;
    if nonzero_fraction < 0.98 {
        return Err(GenerateError::FlowInvariant(format!(
            "flow_accum nonzero fraction too low: {nonzero_fraction:.3}"
        )));
    }
    let mean_flow = sum_flow / land_count as f64;
    if mean_flow > 0.0 && (max_flow as f64) <= 10.0 * mean_flow {
        return Err(GenerateError::FlowInvariant(
            "flow_accum lacks expected heavy-tail ratio".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tilted plane draining east toward an ocean column.
    fn tilted_fixture() -> (Grid<f32>, Grid<bool>) {
        let (w, h) = (16usize, 8usize);
        let mut height = Grid::zeros(w, h);
        let mut land = Grid::filled(w, h, true);
        for y in 0..h {
            for x in 0..w {
                height.set(y, x, (w - x) as f32 * 2.0);
            }
            height.set(y, w - 1, -10.0);
            land.set(y, w - 1, false);
        }
        (height, land)
    }

    #[test]
    fn plane_routes_everything_to_ocean() {
        let (height, land) = tilted_fixture();
        let state = analyze_drainage_state(&height, &land);
        for i in 0..land.len() {
            if land.at(i) {
                assert!(state.outlet_raw_flat[i] >= 0, "cell {i} should reach ocean");
                assert_eq!(state.sink_id_flat[i], -1);
            }
        }
        assert!(!state.endorheic_mask.any());
        assert!(!state.ocean_outlet_points.is_empty());
    }

    #[test]
    fn accumulation_grows_downstream() {
        let (height, land) = tilted_fixture();
        let state = analyze_drainage_state(&height, &land);
        // The column next to the ocean collects its entire row.
        for y in 0..8 {
            assert!(state.flow_accum.get(y, 14) >= state.flow_accum.get(y, 2));
        }
    }

    #[test]
    fn bowl_produces_single_endorheic_basin() {
        let (w, h) = (9usize, 9usize);
        let mut height = Grid::zeros(w, h);
        let land = Grid::filled(w, h, true);
        for y in 0..h {
            for x in 0..w {
                let dy = y as f32 - 4.0;
                let dx = x as f32 - 4.0;
                height.set(y, x, 100.0 + dy * dy + dx * dx);
            }
        }
        let state = analyze_drainage_state(&height, &land);
        assert_eq!(state.sink_id_flat[4 * w + 4], (4 * w + 4) as i32);
        for i in 0..height.len() {
            assert_eq!(state.sink_id_flat[i], (4 * w + 4) as i32);
        }
        assert!(state.endorheic_mask.count_true() == w * h);
        // One basin id covering everything.
        assert_eq!(state.basin_id_map.at(0), 1);
        assert_eq!(state.basin_id_map.at(height.len() - 1), 1);
    }

    #[test]
    fn validation_rejects_flat_accumulation() {
        let accum = Grid::filled(8, 8, 1.0f32);
        let dir = Grid::filled(8, 8, -1i8);
        let land = Grid::filled(8, 8, true);
        let err = validate_flow_fields(&accum, &dir, &land).unwrap_err();
        assert!(err.to_string().contains("heavy-tail"));
    }

    #[test]
    fn validation_accepts_heavy_tailed_field() {
        // Cone draining into a single ocean corner: one trunk collects
        // nearly everything, giving the expected heavy tail.
        let (w, h) = (16usize, 16usize);
        let mut height = Grid::zeros(w, h);
        let mut land = Grid::filled(w, h, true);
        for y in 0..h {
            for x in 0..w {
                height.set(y, x, 2.0 * (y + x) as f32);
            }
        }
        height.set(0, 0, -10.0);
        land.set(0, 0, false);
        let state = analyze_drainage_state(&height, &land);
        validate_flow_fields(&state.flow_accum, &state.flow_dir, &land).unwrap();
    }

    #[test]
    fn first_direction_wins_drop_ties() {
        // Symmetric peak: north (dir 0) precedes south (dir 1) in the
        // canonical order, so ties resolve north.
        let mut height = Grid::zeros(3, 3);
        height.set(1, 1, 10.0);
        let ocean = Grid::filled(3, 3, false);
        let (dir, _) = compute_flow_d8(&height, &ocean, false);
        assert_eq!(dir.get(1, 1), 0);
    }
}
