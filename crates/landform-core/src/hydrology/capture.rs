//! Cross-basin capture: connect bounded endorheic basins to nearby exorheic
//! drainage by carving monotone channels toward strictly lower targets.
//!
//! Two bounded iterations; candidates are ranked by `(required_cut, −size)`
//! and only the top `capture_fraction` share is carved per iteration.

use crate::config::HydrologyConfig;
use crate::filters::{line_cells, normalize01};
use crate::grid::Grid;
use crate::hydrology::routing::analyze_drainage_state;

const CAPTURE_ITERATIONS: usize = 2;

/// Capture tuning derived from the lake/capture sliders.
struct CaptureParams {
    capture_strength: f32,
    max_sill: f32,
    max_basin_pixels: usize,
    max_link: usize,
    capture_fraction: f32,
}

fn capture_params(cfg: &HydrologyConfig, land_pixels: usize) -> CaptureParams {
    let lakes = cfg.hydro_lakes.clamp(0.0, 1.0);
    let capture_strength = (cfg.hydro_capture_strength * (1.0 - 0.85 * lakes)).clamp(0.0, 1.0);
    let max_sill = (cfg.hydro_capture_max_sill * (1.0 - 0.75 * lakes)).max(1.0);
    let basin_scale = 1.0 + (1.0 - lakes) * (8.0 + 12.0 * capture_strength);
    let limit_from_cfg =
        ((cfg.hydro_capture_min_basin_pixels as f32 * basin_scale).round() as usize).max(64);
    let limit_from_fraction = ((land_pixels as f32
        * (0.02 + 0.22 * (1.0 - lakes) * capture_strength.max(0.25)))
    .round() as usize)
        .max(64);
    CaptureParams {
        capture_strength,
        max_sill,
        max_basin_pixels: limit_from_cfg.max(limit_from_fraction),
        max_link: cfg.hydro_capture_max_link_length_px.max(16),
        capture_fraction: (capture_strength + (1.0 - lakes) * 0.65).clamp(0.0, 1.0),
    }
}

/// Carve capture channels in place. Returns the reshaped surface and the mask
/// of carved path cells.
pub fn integrate_drainage(
    h_hydro_pre: &Grid<f32>,
    land_mask: &Grid<bool>,
    cfg: &HydrologyConfig,
) -> (Grid<f32>, Grid<bool>) {
    let mut height = h_hydro_pre.clone();
    let mut capture_paths = Grid::filled(height.width(), height.height(), false);

    let params = capture_params(cfg, land_mask.count_true());
    if params.capture_strength <= 0.0 {
        return (height, capture_paths);
    }

    for _ in 0..CAPTURE_ITERATIONS {
        let state = analyze_drainage_state(&height, land_mask);
        let size = height.len();

        // Exorheic cells with their basin-size priority.
        let exo_idx: Vec<usize> = (0..size)
            .filter(|&i| land_mask.at(i) && state.outlet_raw_flat[i] >= 0)
            .collect();
        if exo_idx.is_empty() {
            break;
        }
        let mut outlet_counts: std::collections::BTreeMap<i32, usize> =
            std::collections::BTreeMap::new();
        for &i in &exo_idx {
            *outlet_counts.entry(state.outlet_raw_flat[i]).or_insert(0) += 1;
        }
        let mut priority_grid = Grid::zeros(height.width(), height.height());
        for &i in &exo_idx {
            let count = outlet_counts[&state.outlet_raw_flat[i]];
            priority_grid.put(i, (count as f32).ln_1p());
        }
        let priority_grid = normalize01(&priority_grid);

        // Endorheic basins grouped by sink id.
        let mut groups: Vec<(i32, Vec<usize>)> = Vec::new();
        {
            let mut pairs: Vec<(i32, usize)> = (0..size)
                .filter(|&i| land_mask.at(i) && state.endorheic_mask.at(i))
                .map(|i| (state.sink_id_flat[i], i))
                .collect();
            pairs.sort_unstable();
            for (key, idx) in pairs {
                match groups.last_mut() {
                    Some((k, members)) if *k == key => members.push(idx),
                    _ => groups.push((key, vec![idx])),
                }
            }
        }

        let mut candidates: Vec<(f32, i64, Vec<usize>)> = Vec::new();
        let w = height.width();
        for (_, basin_pixels) in &groups {
            let basin_size = basin_pixels.len();
            if basin_size < 8 || basin_size > params.max_basin_pixels {
                continue;
            }
            let source = pick_basin_sink(&height, basin_pixels);
            let Some((target, required_sill)) = select_capture_target(
                &height,
                source,
                &exo_idx,
                &priority_grid,
                params.max_link,
                params.max_sill,
            ) else {
                continue;
            };

            let path = line_path_flat(source, target, w);
            let required_cut = required_sill.max(estimate_capture_cut(&height, &path));
            if required_cut > params.max_sill {
                continue;
            }
            candidates.push((required_cut, -(basin_size as i64), path));
        }

        if candidates.is_empty() {
            break;
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let keep = ((params.capture_fraction * candidates.len() as f32).ceil() as usize)
            .clamp(1, candidates.len());

        for (_, _, path) in candidates.iter().take(keep) {
            carve_capture_path(&mut height, path, params.max_sill);
            for &idx in path {
                capture_paths.put(idx, true);
            }
        }
    }

    (height, capture_paths)
}

/// Lowest cell of a basin, ties to the lower flat index.
fn pick_basin_sink(height: &Grid<f32>, basin_pixels: &[usize]) -> usize {
    basin_pixels
        .iter()
        .copied()
        .min_by(|&a, &b| height.at(a).total_cmp(&height.at(b)).then(a.cmp(&b)))
        .expect("basin has pixels")
}

/// Pick the cheapest strictly-lower exorheic cell within the link radius.
/// Cost: `sill + 0.02·distance − 0.35·priority`.
fn select_capture_target(
    height: &Grid<f32>,
    src_flat: usize,
    exo_idx: &[usize],
    priority: &Grid<f32>,
    max_link: usize,
    max_sill: f32,
) -> Option<(usize, f32)> {
    let w = height.width();
    let src_y = (src_flat / w) as f32;
    let src_x = (src_flat % w) as f32;
    let src_elev = height.at(src_flat);
    let max_link2 = (max_link * max_link) as f32;

    let mut best: Option<(f32, usize, f32)> = None;
    for &cand in exo_idx {
        let dy = (cand / w) as f32 - src_y;
        let dx = (cand % w) as f32 - src_x;
        let dist2 = dy * dy + dx * dx;
        if dist2 > max_link2 {
            continue;
        }
        let cand_elev = height.at(cand);
        if cand_elev > src_elev - 0.01 {
            continue;
        }
        let sill = (cand_elev - src_elev).max(0.0);
        if sill > max_sill {
            continue;
        }
        let cost = sill + 0.02 * dist2.sqrt() - 0.35 * priority.at(cand);
        let better = match &best {
            None => true,
            Some(b) => (cost, cand) < (b.0, b.1),
        };
        if better {
            best = Some((cost, cand, sill));
        }
    }
    best.map(|(_, cand, sill)| (cand, sill))
}

fn line_path_flat(src_flat: usize, dst_flat: usize, width: usize) -> Vec<usize> {
    if src_flat == dst_flat {
        return vec![src_flat];
    }
    let (y0, x0) = ((src_flat / width) as i64, (src_flat % width) as i64);
    let (y1, x1) = ((dst_flat / width) as i64, (dst_flat % width) as i64);
    line_cells(y0, x0, y1, x1)
        .into_iter()
        .map(|(y, x)| y * width + x)
        .collect()
}

/// Monotone non-increasing carve profile: linear descent from the source to
/// `min(target, source − 0.02)` followed by a running minimum.
fn capture_profile(vals: &[f32]) -> Vec<f32> {
    if vals.len() < 2 {
        return vals.to_vec();
    }
    let start = vals[0];
    let end = *vals.last().expect("non-empty");
    let target_end = if end < start - 0.005 { end } else { start - 0.02 };
    let n = vals.len();
    let mut profile: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f32 / (n - 1) as f32;
            start * (1.0 - t) + target_end * t
        })
        .collect();
    let mut running = f32::INFINITY;
    for (i, p) in profile.iter_mut().enumerate() {
        let carved = vals[i].min(*p);
        running = running.min(carved);
        *p = running;
    }
    profile
}

fn estimate_capture_cut(height: &Grid<f32>, path: &[usize]) -> f32 {
    if path.len() < 2 {
        return 0.0;
    }
    let vals: Vec<f32> = path.iter().map(|&i| height.at(i)).collect();
    let carved = capture_profile(&vals);
    vals.iter()
        .zip(&carved)
        .map(|(v, c)| v - c)
        .fold(0.0f32, f32::max)
}

fn carve_capture_path(height: &mut Grid<f32>, path: &[usize], max_sill: f32) {
    if path.len() < 2 {
        return;
    }
    let vals: Vec<f32> = path.iter().map(|&i| height.at(i)).collect();
    let carved = capture_profile(&vals);
    let max_cut = vals
        .iter()
        .zip(&carved)
        .map(|(v, c)| v - c)
        .fold(0.0f32, f32::max);
    if max_cut > max_sill {
        return;
    }
    for (&idx, &c) in path.iter().zip(&carved) {
        height.put(idx, c);
    }
}
