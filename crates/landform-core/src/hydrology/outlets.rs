//! Ocean outlet merging: cluster raw outlet cells on a coarse tile grid,
//! collapse tiny coastal basins into their nearest large neighbor, and
//! compact ids to 1..M.

use std::collections::BTreeMap;

use crate::config::HydrologyConfig;
use crate::grid::Grid;
use crate::hydrology::routing::{basin_ids_from_keys, DrainageState};

/// Centroid of one merged outlet cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct OutletPoint {
    pub y: usize,
    pub x: usize,
    pub merged_id: i32,
}

/// Outputs of [`merge_ocean_outlets`].
pub struct OutletMerge {
    /// Merged outlet id per cell (1..M on exorheic land, 0 elsewhere).
    pub basin_outlet_id: Grid<i32>,
    /// Contiguous basin ids across exorheic and endorheic land.
    pub basin_id_map: Grid<i32>,
    pub basin_size_map: Grid<f32>,
    pub outlet_points: Vec<OutletPoint>,
    pub merged_count: usize,
    /// Largest merged-basin pixel counts, descending, at most ten.
    pub top_10_basin_sizes: Vec<usize>,
}

/// Tile-grid clustering: points sharing a `(y/r, x/r)` quotient share a label.
/// Labels follow the lexicographic order of the quotient pairs.
fn cluster_points_radius(points: &[(usize, usize)], radius: usize) -> Vec<usize> {
    let r = radius.max(1);
    let keys: Vec<(usize, usize)> = points.iter().map(|&(y, x)| (y / r, x / r)).collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    sorted.dedup();
    keys.iter()
        .map(|k| sorted.binary_search(k).expect("key present"))
        .collect()
}

/// Merge raw ocean outlets into consolidated drainage basins.
pub fn merge_ocean_outlets(
    state: &DrainageState,
    land_mask: &Grid<bool>,
    cfg: &HydrologyConfig,
) -> OutletMerge {
    let (w, h) = (land_mask.width(), land_mask.height());
    let size = w * h;

    let raw_outlets = &state.ocean_outlet_points;
    if raw_outlets.is_empty() {
        return OutletMerge {
            basin_outlet_id: Grid::filled(w, h, 0),
            basin_id_map: Grid::filled(w, h, -1),
            basin_size_map: Grid::zeros(w, h),
            outlet_points: Vec::new(),
            merged_count: 0,
            top_10_basin_sizes: Vec::new(),
        };
    }

    let labels = cluster_points_radius(raw_outlets, cfg.hydro_outlet_merge_radius_px);
    let mut raw_to_merged: BTreeMap<i32, i32> = BTreeMap::new();
    for (i, &(y, x)) in raw_outlets.iter().enumerate() {
        raw_to_merged.insert((y * w + x) as i32, labels[i] as i32 + 1);
    }

    let mut outlet_id = vec![0i32; size];
    for i in 0..size {
        if land_mask.at(i) && state.outlet_raw_flat[i] >= 0 {
            outlet_id[i] = raw_to_merged[&state.outlet_raw_flat[i]];
        }
    }

    // Collapse tiny basins into the geometrically nearest large one.
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    let mut center_sum: BTreeMap<i32, (f64, f64)> = BTreeMap::new();
    for (i, &id) in outlet_id.iter().enumerate() {
        if id > 0 {
            *counts.entry(id).or_insert(0) += 1;
            let entry = center_sum.entry(id).or_insert((0.0, 0.0));
            entry.0 += (i / w) as f64;
            entry.1 += (i % w) as f64;
        }
    }
    let min_pixels = cfg.hydro_outlet_min_basin_pixels.max(1);
    let large: Vec<(i32, f64, f64)> = counts
        .iter()
        .filter(|(_, &c)| c >= min_pixels)
        .map(|(&id, &c)| {
            let (sy, sx) = center_sum[&id];
            (id, sy / c as f64, sx / c as f64)
        })
        .collect();
    if !large.is_empty() {
        let mut remap: BTreeMap<i32, i32> = BTreeMap::new();
        for (&id, &count) in &counts {
            if count >= min_pixels {
                remap.insert(id, id);
                continue;
            }
            let (sy, sx) = center_sum[&id];
            let cy = sy / count as f64;
            let cx = sx / count as f64;
            let nearest = large
                .iter()
                .min_by(|a, b| {
                    let da = (a.1 - cy).powi(2) + (a.2 - cx).powi(2);
                    let db = (b.1 - cy).powi(2) + (b.2 - cx).powi(2);
                    da.total_cmp(&db).then(a.0.cmp(&b.0))
                })
                .expect("large basins exist");
            remap.insert(id, nearest.0);
        }
        for id in outlet_id.iter_mut() {
            if *id > 0 {
                *id = remap[id];
            }
        }
    }

    // Compact surviving ids to contiguous 1..M.
    let mut final_ids: Vec<i32> = outlet_id.iter().copied().filter(|&v| v > 0).collect();
    final_ids.sort_unstable();
    final_ids.dedup();
    for id in outlet_id.iter_mut() {
        if *id > 0 {
            *id = final_ids.binary_search(id).expect("id present") as i32 + 1;
        }
    }
    let merged_count = final_ids.len();

    // Basin ids across exorheic (positive keys) and endorheic (negative keys).
    let mut basin_key = vec![0i64; size];
    for i in 0..size {
        if !land_mask.at(i) {
            continue;
        }
        if outlet_id[i] > 0 {
            basin_key[i] = outlet_id[i] as i64;
        } else if state.sink_id_flat[i] >= 0 {
            basin_key[i] = -(state.sink_id_flat[i] as i64 + 1);
        }
    }
    let (basin_id_map, basin_size_map) = basin_ids_from_keys(&basin_key, land_mask);

    // Per-merged-basin centroid points and size ranking.
    let mut merged_counts: BTreeMap<i32, usize> = BTreeMap::new();
    let mut merged_centers: BTreeMap<i32, (f64, f64)> = BTreeMap::new();
    for (i, &id) in outlet_id.iter().enumerate() {
        if id > 0 {
            *merged_counts.entry(id).or_insert(0) += 1;
            let entry = merged_centers.entry(id).or_insert((0.0, 0.0));
            entry.0 += (i / w) as f64;
            entry.1 += (i % w) as f64;
        }
    }
    let outlet_points: Vec<OutletPoint> = merged_counts
        .iter()
        .map(|(&id, &count)| {
            let (sy, sx) = merged_centers[&id];
            OutletPoint {
                y: (sy / count as f64) as usize,
                x: (sx / count as f64) as usize,
                merged_id: id,
            }
        })
        .collect();

    let mut sizes: Vec<usize> = merged_counts.values().copied().collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes.truncate(10);

    let basin_outlet_id = Grid::from_vec(w, h, outlet_id);
    OutletMerge {
        basin_outlet_id,
        basin_id_map,
        basin_size_map,
        outlet_points,
        merged_count,
        top_10_basin_sizes: sizes,
    }
}
