//! Depression conditioning and closed-basin analysis.
//!
//! Priority flood raises land cells in heap order from the coast/edge inward
//! so the routing surface has no internal sinks, with an optional breach that
//! relaxes shallow saddles and an ε-scale micro-perturbation that keeps a
//! strict downstream drop along the flood-parent tree.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::config::HydrologyConfig;
use crate::filters::{
    argsort_ascending, coast_mask, connected_components, line_cells, normalize01, DIRECTIONS_8,
};
use crate::grid::Grid;
use crate::hydrology::routing::flow_dest_from_dir;
use crate::rng::RngStream;

/// Heap key ordered by `(elevation, flat_index)` so the pop order is total.
#[derive(PartialEq)]
struct FloodKey(f32, usize);

impl Eq for FloodKey {}

impl PartialOrd for FloodKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// Deterministic priority-flood depression conditioning for land cells.
pub fn priority_flood_fill(
    height: &Grid<f32>,
    land_mask: &Grid<bool>,
    cfg: &HydrologyConfig,
    rng: RngStream,
) -> Grid<f32> {
    if !land_mask.any() {
        return height.clone();
    }

    let (w, h) = (height.width(), height.height());
    let size = w * h;
    let mut filled = height.clone();
    let original = height.clone();
    let mut visited = vec![false; size];
    let mut parent_flat = vec![-1i64; size];
    let mut pop_order: Vec<usize> = Vec::with_capacity(size);

    // Seeds: coastal land cells plus land on the raster edge; if the mask has
    // neither, fall back to the lowest land cell.
    let coast = coast_mask(land_mask);
    let mut seeds: Vec<usize> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if !land_mask.get(y, x) {
                continue;
            }
            let on_edge = y == 0 || y == h - 1 || x == 0 || x == w - 1;
            if on_edge || coast.get(y, x) {
                seeds.push(y * w + x);
            }
        }
    }
    if seeds.is_empty() {
        let lowest = (0..size)
            .filter(|&i| land_mask.at(i))
            .min_by(|&a, &b| filled.at(a).total_cmp(&filled.at(b)).then(a.cmp(&b)))
            .expect("land mask is non-empty");
        seeds.push(lowest);
    }

    let mut heap: BinaryHeap<Reverse<FloodKey>> = BinaryHeap::new();
    for &idx in &seeds {
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        heap.push(Reverse(FloodKey(filled.at(idx), idx)));
    }

    let eps = cfg.depression_flat_epsilon_m.max(0.0);
    while let Some(Reverse(FloodKey(cur_h, flat))) = heap.pop() {
        pop_order.push(flat);
        let y = flat / w;
        let x = flat % w;
        for &(dy, dx) in DIRECTIONS_8.iter() {
            let Some((ny, nx)) = filled.neighbor(y, x, dy, dx) else {
                continue;
            };
            let nflat = ny * w + nx;
            if visited[nflat] || !land_mask.at(nflat) {
                continue;
            }
            visited[nflat] = true;
            let nval = filled.at(nflat);
            let next_h = if nval <= cur_h {
                let raised = cur_h + eps;
                filled.put(nflat, raised);
                raised
            } else {
                nval
            };
            parent_flat[nflat] = flat as i64;
            heap.push(Reverse(FloodKey(next_h, nflat)));
        }
    }

    // Breach: shallow saddles relax back toward the original surface with a
    // quadratic ramp, never dropping below original + ε.
    if cfg.depression_breach_enabled && cfg.depression_breach_max_saddle_m > 0.0 {
        let max_saddle = cfg.depression_breach_max_saddle_m;
        for i in 0..size {
            if !land_mask.at(i) {
                continue;
            }
            let delta = (filled.at(i) - original.at(i)).max(0.0);
            if delta <= 0.0 || delta > max_saddle {
                continue;
            }
            let ratio = (delta / max_saddle).clamp(0.0, 1.0);
            let mut relaxed = original.at(i) + delta * ratio;
            if eps > 0.0 {
                relaxed = relaxed.max(original.at(i) + eps);
            }
            filled.put(i, relaxed);
        }
    }

    // ε-scale micro-perturbation on raised cells, then a pass down the flood
    // tree restoring the strict parent→child drop.
    let raised: Vec<bool> = (0..size)
        .map(|i| land_mask.at(i) && filled.at(i) > original.at(i) + 1e-9)
        .collect();
    if eps > 0.0 && raised.iter().any(|&r| r) {
        let micro_seed: u64 = rng.fork("epsilon-micro-seed").generator().gen();
        let mut noise_rng = Pcg64::seed_from_u64(micro_seed);
        let epsilon_micro = (eps * 0.48).min(0.02).max(0.0);
        for i in 0..size {
            let draw = noise_rng.gen_range(-1.0f64..1.0) as f32;
            if raised[i] {
                filled.put(i, filled.at(i) + draw * epsilon_micro);
            }
        }

        let min_drop = (eps - 2.0 * epsilon_micro).max(1e-6);
        for &flat in &pop_order {
            if !raised[flat] {
                continue;
            }
            let parent = parent_flat[flat];
            if parent < 0 {
                continue;
            }
            let required = filled.at(parent as usize) + min_drop;
            if filled.at(flat) < required {
                filled.put(flat, required);
            }
        }
    }

    for i in 0..size {
        if land_mask.at(i) {
            filled.put(i, filled.at(i).max(original.at(i)));
        }
    }
    filled
}

// ── Closed-basin analysis ─────────────────────────────────────────────────────

/// One closed depression: its sink seed, spill point, and fill geometry.
#[derive(Debug, Clone)]
pub struct BasinRecord {
    pub basin_id: usize,
    pub seed_y: usize,
    pub seed_x: usize,
    pub spill_y: usize,
    pub spill_x: usize,
    pub spill_elevation: f32,
    pub area_to_spill: usize,
    pub volume_to_spill: f64,
    pub max_depth_to_spill: f32,
    pub flat_indices: Vec<usize>,
}

/// Outputs of [`analyze_depressions`].
pub struct DepressionAnalysis {
    pub basins: Vec<BasinRecord>,
    pub basin_mask: Grid<bool>,
    pub basin_id_map: Grid<i32>,
    pub basin_size_map: Grid<f32>,
}

/// Delineate closed depressions on a surface with unresolved sinks.
///
/// Sink cells are grouped into connected components; every land cell is
/// assigned to the component its flow path terminates in (ascending-elevation
/// label propagation). Each catchment is then flooded up to its lowest
/// exterior saddle to produce a [`BasinRecord`].
pub fn analyze_depressions(
    h_hydro: &Grid<f32>,
    land_mask: &Grid<bool>,
    flow_dir_pre: &Grid<i8>,
    cfg: &HydrologyConfig,
) -> DepressionAnalysis {
    let (w, h) = (h_hydro.width(), h_hydro.height());
    let size = w * h;

    let mut sinks = Grid::filled(w, h, false);
    for i in 0..size {
        sinks.put(i, flow_dir_pre.at(i) < 0 && land_mask.at(i));
    }
    if !sinks.any() {
        return DepressionAnalysis {
            basins: Vec::new(),
            basin_mask: Grid::filled(w, h, false),
            basin_id_map: Grid::filled(w, h, -1),
            basin_size_map: Grid::zeros(w, h),
        };
    }

    let components = connected_components(&sinks, 8);
    let mut sink_component_flat = vec![-1i32; size];
    let mut sink_seed_flat: Vec<usize> = Vec::with_capacity(components.len());
    for (comp_id, comp) in components.iter().enumerate() {
        for &idx in comp {
            sink_component_flat[idx] = comp_id as i32;
        }
        let seed = comp
            .iter()
            .copied()
            .min_by(|&a, &b| h_hydro.at(a).total_cmp(&h_hydro.at(b)).then(a.cmp(&b)))
            .expect("sink component is non-empty");
        sink_seed_flat.push(seed);
    }

    let dest_flat = flow_dest_from_dir(flow_dir_pre);
    let catchment = assign_sink_catchments(h_hydro, land_mask, &sink_component_flat, &dest_flat);

    // Group catchment cells per component id, largest ids capped for cost.
    let mut grouped: Vec<(i32, Vec<usize>)> = group_by_id(&catchment);
    if grouped.len() > 2400 {
        grouped.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));
        grouped.truncate(2400);
        grouped.sort_by_key(|g| g.0);
    }

    let mut basin_mask = Grid::filled(w, h, false);
    let mut basin_id_map = Grid::filled(w, h, -1i32);
    let mut basin_size_map = Grid::zeros(w, h);
    let mut basins: Vec<BasinRecord> = Vec::new();

    for (sink_id, basin_pixels) in &grouped {
        if basin_pixels.len() < 3 {
            continue;
        }
        let seed_flat = sink_seed_flat[*sink_id as usize];
        let Some((spill_y, spill_x, spill_level)) =
            find_basin_spill(h_hydro, &catchment, *sink_id, basin_pixels, seed_flat, cfg)
        else {
            continue;
        };

        let region = flood_region_to_spill(h_hydro, &catchment, *sink_id, seed_flat, spill_level);
        if region.is_empty() {
            continue;
        }

        let mut volume = 0.0f64;
        let mut max_depth = 0.0f32;
        for &idx in &region {
            let depth = (spill_level - h_hydro.at(idx)).max(0.0);
            volume += depth as f64;
            max_depth = max_depth.max(depth);
        }
        let area = region.len();
        if area < 3 || volume < 1e-3 {
            continue;
        }

        let next_id = basins.len();
        for &idx in &region {
            basin_mask.put(idx, true);
            basin_id_map.put(idx, next_id as i32);
            basin_size_map.put(idx, area as f32);
        }
        basins.push(BasinRecord {
            basin_id: next_id,
            seed_y: seed_flat / w,
            seed_x: seed_flat % w,
            spill_y,
            spill_x,
            spill_elevation: spill_level,
            area_to_spill: area,
            volume_to_spill: volume,
            max_depth_to_spill: max_depth,
            flat_indices: region,
        });
    }

    // Fallback for surfaces whose catchments never produced a floodable
    // region: ring-search a local spill around each sink seed.
    if basins.is_empty() {
        let mut occupied = vec![false; size];
        for &seed_flat in sink_seed_flat.iter() {
            let sy = seed_flat / w;
            let sx = seed_flat % w;
            let Some((spill_y, spill_x, spill_level)) = find_local_spill_ring(
                h_hydro,
                sy,
                sx,
                cfg.breach_search_radius_px,
                cfg.breach_slope_bias,
            ) else {
                continue;
            };
            let region = flood_local_region_to_spill(
                h_hydro,
                land_mask,
                sy,
                sx,
                spill_level,
                cfg.breach_search_radius_px,
            );
            if region.len() < 3 {
                continue;
            }
            let overlap =
                region.iter().filter(|&&i| occupied[i]).count() as f64 / region.len() as f64;
            if overlap > 0.4 {
                continue;
            }

            let mut volume = 0.0f64;
            let mut max_depth = 0.0f32;
            for &idx in &region {
                let depth = (spill_level - h_hydro.at(idx)).max(0.0);
                volume += depth as f64;
                max_depth = max_depth.max(depth);
            }
            if volume < 1e-3 {
                continue;
            }

            let next_id = basins.len();
            for &idx in &region {
                occupied[idx] = true;
                basin_mask.put(idx, true);
                basin_id_map.put(idx, next_id as i32);
                basin_size_map.put(idx, region.len() as f32);
            }
            basins.push(BasinRecord {
                basin_id: next_id,
                seed_y: sy,
                seed_x: sx,
                spill_y,
                spill_x,
                spill_elevation: spill_level,
                area_to_spill: region.len(),
                volume_to_spill: volume,
                max_depth_to_spill: max_depth,
                flat_indices: region,
            });
        }
    }

    let basin_size_map = normalize01(&basin_size_map.map(|v| v.ln_1p()));
    DepressionAnalysis {
        basins,
        basin_mask,
        basin_id_map,
        basin_size_map,
    }
}

/// Volume-weighted sigmoid retention roll: bigger depressions are likelier to
/// survive as lakes, scaled by `lake_encouragement`.
pub fn decide_basin_retention(
    basins: &[BasinRecord],
    lake_encouragement: f32,
    rng: RngStream,
) -> Vec<bool> {
    if basins.is_empty() {
        return Vec::new();
    }
    let scores: Vec<f64> = basins
        .iter()
        .map(|b| b.volume_to_spill.max(0.0).ln_1p())
        .collect();
    let mut sorted = scores.clone();
    sorted.sort_by(f64::total_cmp);
    let mu = if sorted.len() % 2 == 1 {
        sorted[sorted.len() / 2]
    } else {
        0.5 * (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2])
    };
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let var = scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / scores.len() as f64;
    let sigma = var.sqrt().max(1e-3);

    let encouragement = lake_encouragement.clamp(0.0, 1.0) as f64;
    let mut gen = rng.generator();
    basins
        .iter()
        .zip(scores.iter())
        .map(|(_, &score)| {
            let logit = (score - mu) / sigma - (1.0 - encouragement) * 0.9;
            let p_keep = encouragement / (1.0 + (-logit).exp());
            let roll: f64 = gen.gen_range(0.0..1.0);
            roll < p_keep
        })
        .collect()
}

/// Apply retention decisions: retained basins level to their spill elevation
/// with a carved outflow; rejected ones get a breach channel toward the spill.
pub fn apply_basin_decisions(
    h_hydro: &Grid<f32>,
    basins: &[BasinRecord],
    retained: &[bool],
    cfg: &HydrologyConfig,
) -> (Grid<f32>, Grid<bool>) {
    let mut h = h_hydro.clone();
    let mut lake_mask = Grid::filled(h_hydro.width(), h_hydro.height(), false);

    for (basin, &keep) in basins.iter().zip(retained.iter()) {
        if keep {
            for &idx in &basin.flat_indices {
                h.put(idx, basin.spill_elevation);
                lake_mask.put(idx, true);
            }
            ensure_lake_outflow(&mut h, basin);
        } else {
            let aggressiveness = (1.0 - cfg.lake_encouragement).clamp(0.0, 1.0);
            carve_breach_channel(
                &mut h,
                basin.seed_y,
                basin.seed_x,
                basin.spill_y,
                basin.spill_x,
                h_hydro.get(basin.seed_y, basin.seed_x),
                basin.spill_elevation,
                aggressiveness,
            );
        }
    }
    (h, lake_mask)
}

// ── Internals ─────────────────────────────────────────────────────────────────

fn assign_sink_catchments(
    height: &Grid<f32>,
    land_mask: &Grid<bool>,
    sink_component_flat: &[i32],
    dest_flat: &[i32],
) -> Vec<i32> {
    let mut basin_flat = sink_component_flat.to_vec();
    let order = argsort_ascending(height.data());
    for &idx in &order {
        if !land_mask.at(idx) || basin_flat[idx] >= 0 {
            continue;
        }
        let dst = dest_flat[idx];
        basin_flat[idx] = if dst < 0 { -1 } else { basin_flat[dst as usize] };
    }
    for i in 0..basin_flat.len() {
        if !land_mask.at(i) {
            basin_flat[i] = -1;
        }
    }
    basin_flat
}

fn group_by_id(ids: &[i32]) -> Vec<(i32, Vec<usize>)> {
    let mut pairs: Vec<(i32, usize)> = ids
        .iter()
        .enumerate()
        .filter(|(_, &id)| id >= 0)
        .map(|(i, &id)| (id, i))
        .collect();
    pairs.sort_unstable();
    let mut out: Vec<(i32, Vec<usize>)> = Vec::new();
    for (id, idx) in pairs {
        match out.last_mut() {
            Some((last_id, members)) if *last_id == id => members.push(idx),
            _ => out.push((id, vec![idx])),
        }
    }
    out
}

/// Lowest-cost exterior saddle of a catchment. Cost trades saddle elevation
/// against distance from the sink seed.
fn find_basin_spill(
    height: &Grid<f32>,
    catchment: &[i32],
    sink_id: i32,
    basin_pixels: &[usize],
    seed_flat: usize,
    cfg: &HydrologyConfig,
) -> Option<(usize, usize, f32)> {
    let w = height.width();
    let seed_y = seed_flat / w;
    let seed_x = seed_flat % w;
    let radius = (cfg.breach_search_radius_px as f32).max(1.0);

    let mut best: Option<(f32, f32, usize, usize)> = None;
    for &(dy, dx) in DIRECTIONS_8.iter() {
        for &inside in basin_pixels {
            let y = inside / w;
            let x = inside % w;
            let Some((ny, nx)) = height.neighbor(y, x, dy, dx) else {
                continue;
            };
            let outside = ny * w + nx;
            if catchment[outside] == sink_id {
                continue;
            }
            let saddle = height.at(inside).max(height.at(outside));
            let dys = y as f32 - seed_y as f32;
            let dxs = x as f32 - seed_x as f32;
            let distance = (dys * dys + dxs * dxs).sqrt();
            let cost = saddle + cfg.breach_slope_bias * (distance / radius).clamp(0.0, 6.0);
            let key = (cost, saddle, inside, outside);
            let better = match &best {
                None => true,
                Some(b) => {
                    (key.0, key.1, key.2, key.3) < (b.0, b.1, b.2, b.3)
                }
            };
            if better {
                best = Some(key);
            }
        }
    }

    let (_, saddle, _, outside) = best?;
    let spill_y = outside / w;
    let spill_x = outside % w;
    let seed_elev = height.at(seed_flat);
    let spill_level = saddle.max(seed_elev + 0.05);
    Some((spill_y, spill_x, spill_level))
}

/// Flood the catchment from its seed up to the spill level.
fn flood_region_to_spill(
    height: &Grid<f32>,
    catchment: &[i32],
    sink_id: i32,
    seed_flat: usize,
    spill_elev: f32,
) -> Vec<usize> {
    let w = height.width();
    let allowed = |idx: usize| catchment[idx] == sink_id && height.at(idx) <= spill_elev + 1e-6;
    if !allowed(seed_flat) {
        return Vec::new();
    }
    let mut visited = vec![false; height.len()];
    let mut stack = vec![seed_flat];
    visited[seed_flat] = true;
    let mut out = Vec::new();
    while let Some(idx) = stack.pop() {
        out.push(idx);
        let y = idx / w;
        let x = idx % w;
        for &(dy, dx) in DIRECTIONS_8.iter() {
            let Some((ny, nx)) = height.neighbor(y, x, dy, dx) else {
                continue;
            };
            let nidx = ny * w + nx;
            if allowed(nidx) && !visited[nidx] {
                visited[nidx] = true;
                stack.push(nidx);
            }
        }
    }
    out
}

/// Cheapest spill candidate on an annulus around `(sy, sx)`.
fn find_local_spill_ring(
    height: &Grid<f32>,
    sy: usize,
    sx: usize,
    radius: usize,
    slope_bias: f32,
) -> Option<(usize, usize, f32)> {
    let (w, h) = (height.width(), height.height());
    let r = radius.max(2);
    let y0 = sy.saturating_sub(r);
    let y1 = (sy + r + 1).min(h);
    let x0 = sx.saturating_sub(r);
    let x1 = (sx + r + 1).min(w);

    let inner = (r as f32 * 0.65).max(2.0);
    let mut best: Option<(f32, usize, usize)> = None;
    for y in y0..y1 {
        for x in x0..x1 {
            let dy = y as f32 - sy as f32;
            let dx = x as f32 - sx as f32;
            let dist = (dy * dy + dx * dx).sqrt();
            if dist < inner || dist > r as f32 {
                continue;
            }
            let cost = height.get(y, x) + slope_bias * (dist / r as f32).clamp(0.0, 1.0);
            let better = match &best {
                None => true,
                Some(b) => (cost, y, x) < (b.0, b.1, b.2),
            };
            if better {
                best = Some((cost, y, x));
            }
        }
    }
    let (_, ty, tx) = best?;
    let spill = height.get(ty, tx).max(height.get(sy, sx) + 0.08);
    Some((ty, tx, spill))
}

fn flood_local_region_to_spill(
    height: &Grid<f32>,
    land_mask: &Grid<bool>,
    sy: usize,
    sx: usize,
    spill_elev: f32,
    radius: usize,
) -> Vec<usize> {
    let (w, h) = (height.width(), height.height());
    let r = radius.max(4);
    let y0 = sy.saturating_sub(r);
    let y1 = (sy + r + 1).min(h);
    let x0 = sx.saturating_sub(r);
    let x1 = (sx + r + 1).min(w);

    let allowed = |y: usize, x: usize| {
        (y0..y1).contains(&y)
            && (x0..x1).contains(&x)
            && land_mask.get(y, x)
            && height.get(y, x) <= spill_elev + 1e-6
    };
    if !allowed(sy, sx) {
        return Vec::new();
    }
    let mut visited = vec![false; height.len()];
    let seed = sy * w + sx;
    let mut stack = vec![seed];
    visited[seed] = true;
    let mut out = Vec::new();
    while let Some(idx) = stack.pop() {
        out.push(idx);
        let y = idx / w;
        let x = idx % w;
        for &(dy, dx) in DIRECTIONS_8.iter() {
            let Some((ny, nx)) = height.neighbor(y, x, dy, dx) else {
                continue;
            };
            let nidx = ny * w + nx;
            if allowed(ny, nx) && !visited[nidx] {
                visited[nidx] = true;
                stack.push(nidx);
            }
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn carve_breach_channel(
    height: &mut Grid<f32>,
    sy: usize,
    sx: usize,
    ty: usize,
    tx: usize,
    sink_elev: f32,
    spill_elev: f32,
    aggressiveness: f32,
) {
    let cells = line_cells(sy as i64, sx as i64, ty as i64, tx as i64);
    let n = cells.len();
    if n < 2 {
        return;
    }
    let end_elev = spill_elev.min(sink_elev - 0.4);
    let carve_depth = 6.0 + 10.0 * aggressiveness.clamp(0.0, 1.0);
    for (i, &(y, x)) in cells.iter().enumerate() {
        let t = i as f32 / (n - 1) as f32;
        let line = (sink_elev - 0.1) * (1.0 - t) + end_elev * t;
        let carve = line - carve_depth;
        if carve < height.get(y, x) {
            height.set(y, x, carve);
        }
    }
}

/// Carve a shallow descending channel from the lake cell nearest the spill
/// out to the spill point so leveled lakes keep an outflow.
fn ensure_lake_outflow(height: &mut Grid<f32>, basin: &BasinRecord) {
    let w = height.width();
    let near = basin
        .flat_indices
        .iter()
        .copied()
        .min_by_key(|&idx| {
            let y = (idx / w) as i64 - basin.spill_y as i64;
            let x = (idx % w) as i64 - basin.spill_x as i64;
            (y * y + x * x, idx as i64)
        })
        .expect("basin has cells");
    let sy = near / w;
    let sx = near % w;

    let cells = line_cells(sy as i64, sx as i64, basin.spill_y as i64, basin.spill_x as i64);
    let n = cells.len();
    if n < 2 {
        return;
    }
    for (i, &(y, x)) in cells.iter().enumerate() {
        let t = i as f32 / (n - 1) as f32;
        let profile = basin.spill_elevation * (1.0 - t) + (basin.spill_elevation - 0.8) * t;
        if profile < height.get(y, x) {
            height.set(y, x, profile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::routing::compute_flow_d8;

    /// Ramp with a one-cell pit in the middle.
    fn pit_fixture() -> (Grid<f32>, Grid<bool>) {
        let (w, h) = (16usize, 8usize);
        let mut height = Grid::zeros(w, h);
        let mut land = Grid::filled(w, h, true);
        for y in 0..h {
            for x in 0..w {
                height.set(y, x, 50.0 + x as f32);
            }
            height.set(y, 0, -5.0);
            land.set(y, 0, false);
        }
        height.set(4, 8, 20.0);
        (height, land)
    }

    fn default_cfg() -> HydrologyConfig {
        HydrologyConfig::default()
    }

    #[test]
    fn flood_fills_pits_to_drainable_level() {
        let (height, land) = pit_fixture();
        let filled = priority_flood_fill(&height, &land, &default_cfg(), RngStream::new(3));
        // Pit rises to at least its lowest neighbor level.
        assert!(filled.get(4, 8) >= 50.0 + 7.0);
        // A filled surface has a downhill route everywhere.
        let ocean = land.invert();
        let (dir, _) = compute_flow_d8(&filled, &ocean, false);
        for y in 0..8 {
            for x in 1..16 {
                assert!(dir.get(y, x) >= 0, "({y},{x}) still a sink after flood");
            }
        }
    }

    #[test]
    fn flood_never_lowers_terrain() {
        let (height, land) = pit_fixture();
        let filled = priority_flood_fill(&height, &land, &default_cfg(), RngStream::new(3));
        for i in 0..height.len() {
            if land.at(i) {
                assert!(filled.at(i) >= height.at(i) - 1e-6);
            }
        }
    }

    #[test]
    fn flood_is_deterministic() {
        let (height, land) = pit_fixture();
        let a = priority_flood_fill(&height, &land, &default_cfg(), RngStream::new(3));
        let b = priority_flood_fill(&height, &land, &default_cfg(), RngStream::new(3));
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn analysis_finds_the_depression() {
        let (w, h) = (24usize, 24usize);
        let mut height = Grid::zeros(w, h);
        let land = Grid::filled(w, h, true);
        for y in 0..h {
            for x in 0..w {
                let dy = y as f32 - 12.0;
                let dx = x as f32 - 12.0;
                let r = (dy * dy + dx * dx).sqrt();
                // Bowl inside a raised rim, draining away beyond the rim.
                let v = if r < 8.0 { 100.0 + r * 5.0 } else { 140.0 - (r - 8.0) * 6.0 };
                height.set(y, x, v);
            }
        }
        let ocean = Grid::filled(w, h, false);
        let (dir, _) = compute_flow_d8(&height, &ocean, false);
        let analysis = analyze_depressions(&height, &land, &dir, &default_cfg());
        assert!(!analysis.basins.is_empty());
        let b = &analysis.basins[0];
        assert!(b.area_to_spill >= 3);
        assert!(b.volume_to_spill > 0.0);
        assert!(b.spill_elevation >= height.get(b.seed_y, b.seed_x));
        assert!(!b.flat_indices.is_empty());
    }

    #[test]
    fn retention_is_deterministic_and_bounded() {
        let basin = BasinRecord {
            basin_id: 0,
            seed_y: 1,
            seed_x: 1,
            spill_y: 2,
            spill_x: 2,
            spill_elevation: 10.0,
            area_to_spill: 40,
            volume_to_spill: 120.0,
            max_depth_to_spill: 4.0,
            flat_indices: vec![0, 1, 2],
        };
        let basins = vec![basin.clone(), BasinRecord { volume_to_spill: 0.01, ..basin }];
        let a = decide_basin_retention(&basins, 0.5, RngStream::new(10).fork("lake-retention"));
        let b = decide_basin_retention(&basins, 0.5, RngStream::new(10).fork("lake-retention"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        // Zero encouragement keeps nothing.
        let none = decide_basin_retention(&basins, 0.0, RngStream::new(10).fork("lake-retention"));
        assert!(none.iter().all(|&k| !k));
    }

    #[test]
    fn retained_basin_levels_to_spill() {
        let mut height = Grid::filled(8, 8, 50.0f32);
        height.set(3, 3, 40.0);
        height.set(3, 4, 41.0);
        let basin = BasinRecord {
            basin_id: 0,
            seed_y: 3,
            seed_x: 3,
            spill_y: 3,
            spill_x: 5,
            spill_elevation: 45.0,
            area_to_spill: 2,
            volume_to_spill: 9.0,
            max_depth_to_spill: 5.0,
            flat_indices: vec![3 * 8 + 3, 3 * 8 + 4],
        };
        let (h, lakes) = apply_basin_decisions(&height, &[basin], &[true], &default_cfg());
        assert_eq!(h.get(3, 3), 45.0);
        assert_eq!(h.get(3, 4), 45.0);
        assert!(lakes.get(3, 3));
    }
}
