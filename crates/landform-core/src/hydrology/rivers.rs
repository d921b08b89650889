//! River extraction and channel conditioning.
//!
//! Channel cells are selected from detrended log-flow ("channelness") with a
//! two-threshold hysteresis: core cells pass the high thresholds, support
//! cells pass the low ones and join only when their downstream cell is
//! already river. Width and incision follow the normalized flow metric.

use crate::config::HydrologyConfig;
use crate::error::GenerateError;
use crate::filters::{
    argsort_ascending, argsort_descending, box_blur, lerp, normalize01, percentile, step_length,
};
use crate::grid::Grid;
use crate::hydrology::routing::flow_dest_from_dir;

/// River rasters produced by [`extract_rivers`].
pub struct RiverExtraction {
    /// Width in pixels; 0 off-channel. Doubles as the river mask.
    pub river_mask: Grid<f32>,
    pub river_width_px: Grid<f32>,
    pub river_incision_map: Grid<f32>,
    pub h_river: Grid<f32>,
}

/// Extract the river network from routed flow.
pub fn extract_rivers(
    h_drain: &Grid<f32>,
    flow_dir: &Grid<i8>,
    flow_accum_raw: &Grid<f32>,
    land_mask: &Grid<bool>,
    cfg: &HydrologyConfig,
) -> RiverExtraction {
    let (w, h) = (h_drain.width(), h_drain.height());
    let freq = cfg.river_frequency.clamp(0.0, 1.0);

    let log_flow = flow_accum_raw.map(|v| v.max(0.0).ln_1p());
    let mut flow_metric = normalize01(&log_flow);
    for i in 0..flow_metric.len() {
        if !land_mask.at(i) {
            flow_metric.put(i, 0.0);
        }
    }

    let land_vals: Vec<f32> = (0..flow_metric.len())
        .filter(|&i| land_mask.at(i))
        .map(|i| flow_metric.at(i))
        .collect();
    if land_vals.is_empty() {
        return RiverExtraction {
            river_mask: Grid::zeros(w, h),
            river_width_px: Grid::zeros(w, h),
            river_incision_map: Grid::zeros(w, h),
            h_river: h_drain.clone(),
        };
    }

    let high_q = (99.1 - 4.0 * freq - 220.0 * cfg.river_accum_threshold_base).clamp(90.0, 99.8);
    let low_q = (high_q - lerp(6.0, 11.0, freq)).max(75.0);
    let t_high = percentile(&land_vals, high_q);
    let t_low = percentile(&land_vals, low_q);

    // Channelness: flow metric minus its local background.
    let local_bg = box_blur(&flow_metric, 2, 1);
    let mut channelness = Grid::zeros(w, h);
    for i in 0..channelness.len() {
        channelness.put(i, (flow_metric.at(i) - local_bg.at(i)).max(0.0));
    }
    let ch_vals: Vec<f32> = (0..channelness.len())
        .filter(|&i| land_mask.at(i))
        .map(|i| channelness.at(i))
        .collect();
    let ch_q = (78.0 - 24.0 * freq).clamp(50.0, 88.0);
    let ch_t = percentile(&ch_vals, ch_q);

    let mut core = Grid::filled(w, h, false);
    let mut support = Grid::filled(w, h, false);
    for i in 0..core.len() {
        if !land_mask.at(i) {
            continue;
        }
        let fm = flow_metric.at(i);
        let ch = channelness.at(i);
        core.put(i, fm >= t_high && ch >= ch_t * 1.08);
        support.put(i, fm >= t_low && ch >= ch_t);
    }
    let connected = flow_connected_support(&core, &support, flow_dir, flow_accum_raw);

    let width_exp = (cfg.river_width_power * 0.9).max(0.25);
    let support_min_width = (cfg.river_max_width_px * 0.09).min(0.55);
    let mut width = Grid::zeros(w, h);
    let mut incision = Grid::zeros(w, h);
    for i in 0..width.len() {
        if !connected.at(i) {
            continue;
        }
        let fm = flow_metric.at(i).clamp(0.0, 1.0);
        let wv = (cfg.river_max_width_px * fm.powf(width_exp)).max(support_min_width);
        width.put(i, wv);
        let width_factor = (wv / cfg.river_max_width_px.max(1e-6)).clamp(0.0, 1.0);
        incision.put(i, cfg.river_max_incision_m * fm * width_factor);
    }
    let incision = box_blur(&incision, 1, 1);

    let mut h_river = h_drain.clone();
    for i in 0..h_river.len() {
        h_river.put(i, h_river.at(i) - incision.at(i));
    }

    RiverExtraction {
        river_mask: width.clone(),
        river_width_px: width,
        river_incision_map: incision,
        h_river,
    }
}

/// Flow-connected closure: walk cells in descending accumulation order and
/// admit a support cell iff its downstream cell is already river.
fn flow_connected_support(
    core: &Grid<bool>,
    support: &Grid<bool>,
    flow_dir: &Grid<i8>,
    flow_accum_raw: &Grid<f32>,
) -> Grid<bool> {
    let mut connected = core.clone();
    if !support.any() {
        return connected;
    }
    let dest_flat = flow_dest_from_dir(flow_dir);
    let order = argsort_descending(flow_accum_raw.data());
    for &src in &order {
        if connected.at(src) || !support.at(src) {
            continue;
        }
        let dst = dest_flat[src];
        if dst >= 0 && connected.at(dst as usize) {
            connected.put(src, true);
        }
    }
    connected
}

/// Walk river cells in ascending accumulation order and push each downstream
/// cell below its source; river cells flowing into a higher lake are dropped
/// from the mask instead.
pub fn enforce_downhill_river_profile(
    height: &Grid<f32>,
    flow_dir: &Grid<i8>,
    flow_accum_raw: &Grid<f32>,
    river_mask: &Grid<f32>,
    lake_mask: &Grid<bool>,
) -> (Grid<f32>, Grid<f32>) {
    let mut mask = river_mask.clone();
    for i in 0..mask.len() {
        if lake_mask.at(i) || flow_dir.at(i) < 0 {
            mask.put(i, 0.0);
        }
    }

    let mut h = height.clone();
    let dest_flat = flow_dest_from_dir(flow_dir);
    let order = argsort_ascending(flow_accum_raw.data());
    let min_drop = 0.01f32;

    for &src in &order {
        if mask.at(src) <= 0.0 {
            continue;
        }
        let dst = dest_flat[src];
        if dst < 0 {
            mask.put(src, 0.0);
            continue;
        }
        let dst = dst as usize;
        if lake_mask.at(dst) {
            if h.at(src) < h.at(dst) - 1e-4 {
                mask.put(src, 0.0);
            }
            continue;
        }
        let target_downstream = h.at(src) - min_drop;
        if h.at(dst) >= target_downstream {
            h.put(dst, target_downstream);
        }
    }

    // Lowering destinations can only break edges whose source is a lake
    // boundary; prune any river cell left pointing uphill.
    for i in 0..mask.len() {
        if mask.at(i) <= 0.0 {
            continue;
        }
        let dst = dest_flat[i];
        if dst >= 0 && h.at(i) - h.at(dst as usize) < -1e-4 {
            mask.put(i, 0.0);
        }
    }

    (mask, h)
}

/// Assert that every river cell's D8-downstream neighbor is at most 1e−4 m
/// above it. Violations are implementation bugs.
pub fn assert_downhill_river_routing(
    h_drain: &Grid<f32>,
    flow_dir: &Grid<i8>,
    river_mask: &Grid<f32>,
) -> Result<(), GenerateError> {
    let dest_flat = flow_dest_from_dir(flow_dir);
    for i in 0..river_mask.len() {
        if river_mask.at(i) <= 0.0 {
            continue;
        }
        let dst = dest_flat[i];
        if dst >= 0 && h_drain.at(i) - h_drain.at(dst as usize) < -1e-4 {
            return Err(GenerateError::UphillRiver);
        }
    }
    Ok(())
}

/// Trunk sinuosity: path length over Euclidean chord for every unbranched
/// trunk segment. Returns `(segment_count, median, p90)`.
pub fn trunk_sinuosity(
    flow_dir: &Grid<i8>,
    flow_accum: &Grid<f32>,
    land_mask: &Grid<bool>,
    min_flow_cells: f32,
) -> (usize, f64, f64) {
    let w = flow_dir.width();
    let size = flow_dir.len();
    let mut trunk = vec![false; size];
    for i in 0..size {
        trunk[i] = land_mask.at(i) && flow_dir.at(i) >= 0 && flow_accum.at(i) >= min_flow_cells;
    }
    if !trunk.iter().any(|&t| t) {
        return (0, 0.0, 0.0);
    }

    let dest_flat = flow_dest_from_dir(flow_dir);
    let mut up_count = vec![0u32; size];
    for i in 0..size {
        if !trunk[i] {
            continue;
        }
        let dst = dest_flat[i];
        if dst >= 0 && trunk[dst as usize] {
            up_count[dst as usize] += 1;
        }
    }

    // Segment heads: trunk cells with a trunk destination whose upstream
    // in-degree is anything but one (sources and post-junction cells).
    let mut sinuosity: Vec<f32> = Vec::new();
    for start in 0..size {
        if !trunk[start] {
            continue;
        }
        let dst = dest_flat[start];
        if dst < 0 || !trunk[dst as usize] || up_count[start] == 1 {
            continue;
        }

        let mut curr = start;
        let mut steps = 0usize;
        let mut path_len = 0.0f32;
        loop {
            let dir_idx = flow_dir.at(curr);
            let nxt = dest_flat[curr];
            if dir_idx < 0 || nxt < 0 || !trunk[nxt as usize] {
                break;
            }
            path_len += step_length(dir_idx);
            steps += 1;
            curr = nxt as usize;
            if up_count[curr] != 1 {
                break;
            }
        }

        if steps < 2 || curr == start {
            continue;
        }
        let (y0, x0) = (start / w, start % w);
        let (y1, x1) = (curr / w, curr % w);
        let dy = y1 as f32 - y0 as f32;
        let dx = x1 as f32 - x0 as f32;
        let euclid = (dy * dy + dx * dx).sqrt();
        if euclid <= 1e-6 {
            continue;
        }
        sinuosity.push(path_len / euclid);
    }

    if sinuosity.is_empty() {
        return (0, 0.0, 0.0);
    }
    let median = percentile(&sinuosity, 50.0) as f64;
    let p90 = percentile(&sinuosity, 90.0) as f64;
    (sinuosity.len(), median, p90)
}

/// Shore falloff: lower land exponentially with distance to the coast.
/// Returns `(coast_mask, distance_to_coast, shaped_height)`.
pub fn apply_shore_falloff(
    height: &Grid<f32>,
    land_mask: &Grid<bool>,
    shelf_radius_px: usize,
    cfg: &HydrologyConfig,
) -> (Grid<bool>, Grid<f32>, Grid<f32>) {
    let coast = crate::filters::coast_mask(land_mask);
    let max_dist = (shelf_radius_px * 4).max(16);
    let dist = crate::filters::ring_distance_to(&coast, max_dist);

    let denom = (shelf_radius_px as f32).max(1.0);
    let mut shaped = height.clone();
    for i in 0..shaped.len() {
        if !land_mask.at(i) {
            continue;
        }
        let t = (dist.at(i) / denom).max(0.0);
        let delta = cfg.shore_falloff_strength_m * (-t.powf(cfg.shore_falloff_power)).exp();
        shaped.put(i, shaped.at(i) - delta);
    }
    (coast, dist, shaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::routing::analyze_drainage_state;

    /// Cone draining to a single ocean corner; one dominant trunk forms.
    fn cone_fixture() -> (Grid<f32>, Grid<bool>) {
        let (w, h) = (48usize, 48usize);
        let mut height = Grid::zeros(w, h);
        let mut land = Grid::filled(w, h, true);
        for y in 0..h {
            for x in 0..w {
                height.set(y, x, 5.0 + 2.0 * (y + x) as f32 + 0.1 * (y as f32 - x as f32).abs());
            }
        }
        height.set(0, 0, -10.0);
        land.set(0, 0, false);
        (height, land)
    }

    #[test]
    fn rivers_form_on_high_accumulation_cells() {
        let (height, land) = cone_fixture();
        let state = analyze_drainage_state(&height, &land);
        let rivers = extract_rivers(
            &height,
            &state.flow_dir,
            &state.flow_accum,
            &land,
            &HydrologyConfig::default(),
        );
        let river_cells = rivers.river_mask.data().iter().filter(|&&v| v > 0.0).count();
        assert!(river_cells > 0, "cone trunk should be detected as river");
        // River width never exceeds the configured maximum.
        assert!(rivers.river_width_px.max_value() <= HydrologyConfig::default().river_max_width_px + 1e-4);
        // Incision only lowers.
        for i in 0..height.len() {
            assert!(rivers.h_river.at(i) <= height.at(i) + 1e-5);
        }
    }

    #[test]
    fn support_cells_require_connected_downstream() {
        let mut core = Grid::filled(5, 1, false);
        let mut support = Grid::filled(5, 1, false);
        // Chain 0 <- 1 <- 2; core at 0; support at 2 only: the gap at 1
        // keeps 2 out of the network.
        core.set(0, 0, true);
        support.set(0, 2, true);
        let mut dir = Grid::filled(5, 1, -1i8);
        dir.set(0, 1, 3);
        dir.set(0, 2, 3);
        let mut accum = Grid::zeros(5, 1);
        accum.set(0, 0, 3.0);
        accum.set(0, 1, 2.0);
        accum.set(0, 2, 1.0);
        let connected = flow_connected_support(&core, &support, &dir, &accum);
        assert!(!connected.get(0, 2));

        // With support at 1 as well, the chain joins.
        support.set(0, 1, true);
        let connected = flow_connected_support(&core, &support, &dir, &accum);
        assert!(connected.get(0, 1));
        assert!(connected.get(0, 2));
    }

    #[test]
    fn enforcement_yields_monotone_river_profiles() {
        let (height, land) = cone_fixture();
        let state = analyze_drainage_state(&height, &land);
        let rivers = extract_rivers(
            &height,
            &state.flow_dir,
            &state.flow_accum,
            &land,
            &HydrologyConfig::default(),
        );
        let lakes = Grid::filled(height.width(), height.height(), false);
        let (mask, fixed) = enforce_downhill_river_profile(
            &rivers.h_river,
            &state.flow_dir,
            &state.flow_accum,
            &rivers.river_mask,
            &lakes,
        );
        assert_downhill_river_routing(&fixed, &state.flow_dir, &mask).unwrap();
    }

    #[test]
    fn enforcement_detects_uphill_edges() {
        let mut height = Grid::zeros(3, 1);
        height.set(0, 0, 5.0);
        height.set(0, 1, 9.0);
        height.set(0, 2, 1.0);
        let mut dir = Grid::filled(3, 1, -1i8);
        dir.set(0, 0, 2); // east, uphill into the bump
        let mask = Grid::filled(3, 1, 1.0f32);
        assert!(assert_downhill_river_routing(&height, &dir, &mask).is_err());
    }

    #[test]
    fn sinuosity_of_straight_trunk_is_one() {
        // Straight west-flowing channel with in-degree 1 everywhere.
        let (w, h) = (16usize, 3usize);
        let mut dir = Grid::filled(w, h, -1i8);
        let mut accum = Grid::zeros(w, h);
        let land = Grid::filled(w, h, true);
        for x in 1..w {
            dir.set(1, x, 3);
            accum.set(1, x, (w - x) as f32 * 100.0);
        }
        accum.set(1, 0, w as f32 * 100.0);
        let (count, median, p90) = trunk_sinuosity(&dir, &accum, &land, 50.0);
        assert!(count >= 1);
        assert!((median - 1.0).abs() < 1e-5);
        assert!((p90 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shore_falloff_lowers_coastal_land_most() {
        let (w, h) = (32usize, 16usize);
        let mut land = Grid::filled(w, h, true);
        for y in 0..h {
            land.set(y, 0, false);
        }
        let height = Grid::filled(w, h, 100.0f32);
        let (coast, dist, shaped) =
            apply_shore_falloff(&height, &land, 6, &HydrologyConfig::default());
        assert!(coast.get(8, 1));
        assert_eq!(dist.get(8, 1), 0.0);
        let coastal_drop = 100.0 - shaped.get(8, 1);
        let inland_drop = 100.0 - shaped.get(8, 30);
        assert!(coastal_drop > inland_drop);
        assert!(coastal_drop > 0.0);
    }
}
