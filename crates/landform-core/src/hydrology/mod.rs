//! Hydrology core: routing-surface preparation, D8 analysis, cross-basin
//! capture, outlet merging, river extraction, and downhill enforcement.
//!
//! Stage order and the traversal tie-break rules are contractual; see the
//! individual submodules for the inner loops.

pub mod capture;
pub mod depressions;
pub mod meander;
pub mod outlets;
pub mod rivers;
pub mod routing;

pub use depressions::BasinRecord;
pub use outlets::OutletPoint;
pub use routing::DrainageState;

use serde::Serialize;

use crate::config::HydrologyConfig;
use crate::error::GenerateError;
use crate::filters::{box_blur, normalize01, percentile};
use crate::grid::Grid;
use crate::rng::RngStream;
use rand::Rng;

/// Scalar hydrology metrics persisted into `deterministic_meta.json`.
#[derive(Debug, Clone, Serialize)]
pub struct HydrologyMetrics {
    pub river_pixel_count: usize,
    pub lake_pixel_count: usize,
    pub max_flow_accum: f64,
    pub mean_flow_accum: f64,
    pub flow_accum_p50: f64,
    pub flow_accum_p90: f64,
    pub flow_accum_p99: f64,
    pub flow_accum_p999: f64,
    pub flow_cells_ge_10: usize,
    pub flow_cells_ge_100: usize,
    pub flow_cells_ge_1000: usize,
    pub percent_endo_basins: f64,
    pub total_river_length_estimate: f64,
    pub basin_count_total: usize,
    pub basin_count_retained: usize,
    pub lake_area_fraction: f64,
    pub mean_lake_area: f64,
    pub largest_lake_area: usize,
    pub num_ocean_outlets_raw: usize,
    pub num_ocean_outlets_merged: usize,
    pub largest_basin_land_ratio: f64,
    pub top_10_basin_sizes: Vec<usize>,
    pub endorheic_land_ratio: f64,
    pub num_endorheic_basins: usize,
    pub regional_endorheic_count_gt_10000km2: usize,
    pub continental_basin_count_gt_1pct_land: usize,
    pub tiny_endorheic_basin_count_lt_10000km2: usize,
    pub tiny_endorheic_area_ratio_lt_10000km2: f64,
    pub trunk_sinuosity_segment_count: usize,
    pub trunk_sinuosity_median: f64,
    pub trunk_sinuosity_p90: f64,
}

/// Full hydrology output: conditioned surfaces, routing fields, basins,
/// rivers, lakes, and metrics.
pub struct HydrologyResult {
    pub h_hydro_pre: Grid<f32>,
    pub h_hydro: Grid<f32>,
    pub flow_dir: Grid<i8>,
    pub flow_accum_raw: Grid<f32>,
    pub flow_accum_norm: Grid<f32>,
    pub basin_outlet_id: Grid<i32>,
    pub outlet_points: Vec<OutletPoint>,
    pub endorheic_mask: Grid<bool>,
    pub capture_paths_mask: Grid<bool>,
    pub basin_id_map: Grid<i32>,
    pub basin_size_map: Grid<f32>,
    pub lake_size_map: Grid<f32>,
    pub lake_retention_map: Grid<f32>,
    pub lake_mask: Grid<bool>,
    pub h_drain: Grid<f32>,
    pub river_mask: Grid<f32>,
    pub river_width_px: Grid<f32>,
    pub river_incision_map: Grid<f32>,
    pub h_river: Grid<f32>,
    pub erosion_map: Grid<f32>,
    pub deposition_map: Grid<f32>,
    pub h_eroded: Grid<f32>,
    pub h_lake_adjusted: Grid<f32>,
    pub coast_mask: Grid<bool>,
    pub distance_to_coast: Grid<f32>,
    pub h_shore: Grid<f32>,
    pub metrics: HydrologyMetrics,
}

/// Separable box-blur approximation of a Gaussian with the given σ.
pub fn gaussian_smooth(height: &Grid<f32>, sigma_px: f32) -> Grid<f32> {
    let radius = ((sigma_px.max(0.5) * 1.5).round() as usize).max(1);
    box_blur(height, radius, 3)
}

/// Run hydrology integration with basin capture and outlet consolidation.
pub fn run_hydrology(
    h_tectonic: &Grid<f32>,
    land_mask: &Grid<bool>,
    meters_per_pixel: f64,
    hydrology_cfg: &HydrologyConfig,
    shelf_radius_px: usize,
    rng: RngStream,
) -> Result<HydrologyResult, GenerateError> {
    if !h_tectonic.same_shape(land_mask) {
        return Err(GenerateError::ShapeMismatch("h_tectonic vs land_mask"));
    }
    let (w, h) = (h_tectonic.width(), h_tectonic.height());

    // ── Routing surface preparation ──────────────────────────────────────────
    let h_smoothed = gaussian_smooth(h_tectonic, hydrology_cfg.hydro_smooth_sigma_px);
    let routing_noise = {
        let mut gen = rng.fork("routing-noise").generator();
        let mut raw = Grid::zeros(w, h);
        for i in 0..raw.len() {
            raw.put(i, gen.gen_range(-1.0f64..1.0) as f32);
        }
        box_blur(&raw, 4, 3).map(|v| v * 3.0)
    };
    let mut h_routing = Grid::zeros(w, h);
    for i in 0..h_routing.len() {
        h_routing.put(i, h_smoothed.at(i) + routing_noise.at(i));
    }

    let h_routing_filled = if hydrology_cfg.depression_fill_enabled {
        depressions::priority_flood_fill(
            &h_routing,
            land_mask,
            hydrology_cfg,
            rng.fork("depression-epsilon-noise"),
        )
    } else {
        h_routing
    };
    let h_hydro_pre = meander::sculpt_meanders(
        &h_routing_filled,
        land_mask,
        rng.fork("sculpt-meanders"),
        hydrology_cfg.sculpt_droplet_count,
        hydrology_cfg.sculpt_steps,
        hydrology_cfg.sculpt_carve_m,
    );

    // ── Capture & final drainage state ───────────────────────────────────────
    let (h_hydro, capture_paths_mask) =
        capture::integrate_drainage(&h_hydro_pre, land_mask, hydrology_cfg);
    let post_state = routing::analyze_drainage_state(&h_hydro, land_mask);
    routing::validate_flow_fields(&post_state.flow_accum, &post_state.flow_dir, land_mask)?;

    let merge = outlets::merge_ocean_outlets(&post_state, land_mask, hydrology_cfg);

    let flow_accum_raw = post_state.flow_accum.clone();
    let flow_accum_norm = normalize01(&flow_accum_raw.map(|v| v.ln_1p()));

    // ── Rivers & lakes ───────────────────────────────────────────────────────
    let extraction = rivers::extract_rivers(
        &h_hydro,
        &post_state.flow_dir,
        &flow_accum_raw,
        land_mask,
        hydrology_cfg,
    );

    let mut lake_mask = Grid::filled(w, h, false);
    for i in 0..lake_mask.len() {
        lake_mask.put(i, post_state.endorheic_mask.at(i) && land_mask.at(i));
    }
    let mut h_lake_adjusted = h_hydro.clone();
    let leveled = box_blur(&h_lake_adjusted, 1, 1);
    for i in 0..h_lake_adjusted.len() {
        if lake_mask.at(i) {
            h_lake_adjusted.put(i, h_lake_adjusted.at(i).min(leveled.at(i)));
        }
    }
    let (river_mask, h_lake_adjusted) = rivers::enforce_downhill_river_profile(
        &h_lake_adjusted,
        &post_state.flow_dir,
        &flow_accum_raw,
        &extraction.river_mask,
        &lake_mask,
    );
    rivers::assert_downhill_river_routing(&h_lake_adjusted, &post_state.flow_dir, &river_mask)?;

    // Erosional transforms stay minimal: topology is the product here.
    let erosion_map = Grid::zeros(w, h);
    let deposition_map = Grid::zeros(w, h);
    let h_eroded = h_lake_adjusted.clone();
    let h_drain = h_hydro.clone();

    let (coast, distance_to_coast, h_shore) =
        rivers::apply_shore_falloff(&h_lake_adjusted, land_mask, shelf_radius_px, hydrology_cfg);

    // ── Metrics ──────────────────────────────────────────────────────────────
    let land_pixels = land_mask.count_true();
    let river_pixels = river_mask.data().iter().filter(|&&v| v > 0.0).count();
    let lake_pixels = lake_mask.count_true();

    let land_flow: Vec<f32> = (0..flow_accum_raw.len())
        .filter(|&i| land_mask.at(i))
        .map(|i| flow_accum_raw.at(i))
        .collect();
    let max_flow = land_flow.iter().copied().fold(0.0f32, f32::max) as f64;
    let mean_flow = if land_flow.is_empty() {
        0.0
    } else {
        land_flow.iter().map(|&v| v as f64).sum::<f64>() / land_flow.len() as f64
    };

    // Endorheic basin sizes keyed by sink component.
    let mut endo_sizes: std::collections::BTreeMap<i32, usize> = std::collections::BTreeMap::new();
    for i in 0..flow_accum_raw.len() {
        if post_state.endorheic_mask.at(i) && land_mask.at(i) && post_state.sink_id_flat[i] >= 0 {
            *endo_sizes.entry(post_state.sink_id_flat[i]).or_insert(0) += 1;
        }
    }
    let num_endo_basins = endo_sizes.len();
    let endo_land_ratio = post_state
        .endorheic_mask
        .data()
        .iter()
        .zip(land_mask.data())
        .filter(|(&e, &l)| e && l)
        .count() as f64
        / land_pixels.max(1) as f64;

    let cell_area_km2 = meters_per_pixel * meters_per_pixel / 1.0e6;
    let regional_threshold_cells = ((10_000.0 / cell_area_km2.max(1e-6)).ceil() as usize).max(1);
    let mut endo_large_count = 0usize;
    let mut endo_small_count = 0usize;
    let mut tiny_endo_cells = 0usize;
    for &size in endo_sizes.values() {
        if size >= regional_threshold_cells {
            endo_large_count += 1;
        } else {
            endo_small_count += 1;
            tiny_endo_cells += size;
        }
    }
    let (mean_lake_area, largest_lake_area) = if endo_sizes.is_empty() {
        (0.0, 0)
    } else {
        let sum: usize = endo_sizes.values().sum();
        (
            sum as f64 / endo_sizes.len() as f64,
            *endo_sizes.values().max().expect("non-empty"),
        )
    };

    // Exorheic basin sizes from the merged outlet map.
    let mut exo_counts: std::collections::BTreeMap<i32, usize> = std::collections::BTreeMap::new();
    for i in 0..merge.basin_outlet_id.len() {
        if land_mask.at(i) && merge.basin_outlet_id.at(i) > 0 {
            *exo_counts.entry(merge.basin_outlet_id.at(i)).or_insert(0) += 1;
        }
    }
    let largest_basin = exo_counts.values().copied().max().unwrap_or(0);
    let largest_basin_ratio = largest_basin as f64 / land_pixels.max(1) as f64;
    let basin_1pct_threshold = ((land_pixels as f64 * 0.01).ceil() as usize).max(1);
    let continental_basin_count = exo_counts
        .values()
        .filter(|&&c| c >= basin_1pct_threshold)
        .count();

    let mut basin_ids_on_land: Vec<i32> = (0..merge.basin_id_map.len())
        .filter(|&i| land_mask.at(i))
        .map(|i| merge.basin_id_map.at(i))
        .collect();
    basin_ids_on_land.sort_unstable();
    basin_ids_on_land.dedup();
    let basin_count_total = basin_ids_on_land.len();
    let basin_count_retained = num_endo_basins;
    let percent_endo = 100.0 * basin_count_retained as f64 / basin_count_total.max(1) as f64;

    let (sinuosity_count, sinuosity_median, sinuosity_p90) = rivers::trunk_sinuosity(
        &post_state.flow_dir,
        &flow_accum_raw,
        land_mask,
        hydrology_cfg.trunk_sinuosity_min_flow_cells,
    );

    let (p50, p90, p99, p999) = if land_flow.is_empty() {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        (
            percentile(&land_flow, 50.0) as f64,
            percentile(&land_flow, 90.0) as f64,
            percentile(&land_flow, 99.0) as f64,
            percentile(&land_flow, 99.9) as f64,
        )
    };

    let metrics = HydrologyMetrics {
        river_pixel_count: river_pixels,
        lake_pixel_count: lake_pixels,
        max_flow_accum: max_flow,
        mean_flow_accum: mean_flow,
        flow_accum_p50: p50,
        flow_accum_p90: p90,
        flow_accum_p99: p99,
        flow_accum_p999: p999,
        flow_cells_ge_10: land_flow.iter().filter(|&&v| v >= 10.0).count(),
        flow_cells_ge_100: land_flow.iter().filter(|&&v| v >= 100.0).count(),
        flow_cells_ge_1000: land_flow.iter().filter(|&&v| v >= 1000.0).count(),
        percent_endo_basins: percent_endo,
        total_river_length_estimate: river_pixels as f64,
        basin_count_total,
        basin_count_retained,
        lake_area_fraction: lake_pixels as f64 / land_pixels.max(1) as f64,
        mean_lake_area,
        largest_lake_area,
        num_ocean_outlets_raw: post_state.ocean_outlet_points.len(),
        num_ocean_outlets_merged: merge.merged_count,
        largest_basin_land_ratio: largest_basin_ratio,
        top_10_basin_sizes: merge.top_10_basin_sizes.clone(),
        endorheic_land_ratio: endo_land_ratio,
        num_endorheic_basins: num_endo_basins,
        regional_endorheic_count_gt_10000km2: endo_large_count,
        continental_basin_count_gt_1pct_land: continental_basin_count,
        tiny_endorheic_basin_count_lt_10000km2: endo_small_count,
        tiny_endorheic_area_ratio_lt_10000km2: tiny_endo_cells as f64 / land_pixels.max(1) as f64,
        trunk_sinuosity_segment_count: sinuosity_count,
        trunk_sinuosity_median: sinuosity_median,
        trunk_sinuosity_p90: sinuosity_p90,
    };

    let mut lake_size_scaled = Grid::zeros(w, h);
    for i in 0..lake_size_scaled.len() {
        if lake_mask.at(i) {
            lake_size_scaled.put(i, merge.basin_size_map.at(i));
        }
    }
    let lake_size_map = normalize01(&lake_size_scaled);
    let lake_retention_map = lake_mask.map(|v| if v { 1.0f32 } else { 0.0 });

    Ok(HydrologyResult {
        h_hydro_pre,
        h_hydro,
        flow_dir: post_state.flow_dir,
        flow_accum_raw,
        flow_accum_norm,
        basin_outlet_id: merge.basin_outlet_id,
        outlet_points: merge.outlet_points,
        endorheic_mask: post_state.endorheic_mask,
        capture_paths_mask,
        basin_id_map: merge.basin_id_map,
        basin_size_map: merge.basin_size_map,
        lake_size_map,
        lake_retention_map,
        lake_mask,
        h_drain,
        river_mask,
        river_width_px: extraction.river_width_px,
        river_incision_map: extraction.river_incision_map,
        h_river: extraction.h_river,
        erosion_map,
        deposition_map,
        h_eroded,
        h_lake_adjusted,
        coast_mask: coast,
        distance_to_coast,
        h_shore,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeneratorConfig, MaskConfig};
    use crate::heightfield::compose_tectonic;
    use crate::mask::generate_land_mask;
    use crate::seed::parse_seed;
    use crate::tectonics::generate_tectonic_scaffold;

    fn small_run() -> (HydrologyResult, Grid<bool>) {
        let parsed = parse_seed("MistyForge").unwrap();
        // Trimmed droplet population keeps the debug-build runtime sane; the
        // defaults only change how much sculpting happens, not the contracts
        // under test.
        let mut cfg = GeneratorConfig::default();
        cfg.hydrology.sculpt_droplet_count = 2_000;
        cfg.hydrology.sculpt_steps = 60;
        let root = RngStream::new(parsed.seed_hash);
        let mask = generate_land_mask(128, 64, root.fork("mask"), &MaskConfig::default());
        let tect = generate_tectonic_scaffold(
            128,
            64,
            &mask.land_mask,
            root.fork("tectonics"),
            &cfg.tectonics,
        );
        let comp = compose_tectonic(&mask, &tect, 5000.0, &cfg.height, root);
        let hydro = run_hydrology(
            &comp.h_tectonic,
            &mask.land_mask,
            5000.0,
            &cfg.hydrology,
            cfg.tectonics.shelf_radius_px,
            root.fork("hydrology"),
        )
        .unwrap();
        (hydro, mask.land_mask)
    }

    #[test]
    fn hydrology_invariants_hold_on_small_grid() {
        let (r, land) = small_run();
        assert!(r.h_hydro.is_finite());
        assert!(r.h_lake_adjusted.is_finite());
        assert!(r.flow_accum_raw.min_value() >= 0.0);
        assert!(r.flow_accum_norm.max_value() <= 1.0 + 1e-6);
        for &d in r.flow_dir.data() {
            assert!((-1..=7).contains(&(d as i32)));
        }
        for i in 0..land.len() {
            if land.at(i) {
                assert!(r.flow_accum_raw.at(i) >= 1.0);
            }
        }
        let m = &r.metrics;
        assert!(m.basin_count_retained <= m.basin_count_total);
        assert!(m.num_ocean_outlets_merged <= m.num_ocean_outlets_raw);
        assert!(m.max_flow_accum > 10.0 * m.mean_flow_accum);
        assert!((0.0..=1.0).contains(&m.endorheic_land_ratio));
        assert!((0.0..=1.0).contains(&m.lake_area_fraction));
    }

    #[test]
    fn hydrology_is_deterministic() {
        let (a, _) = small_run();
        let (b, _) = small_run();
        assert_eq!(a.flow_dir.data(), b.flow_dir.data());
        assert_eq!(a.flow_accum_raw.data(), b.flow_accum_raw.data());
        assert_eq!(a.river_mask.data(), b.river_mask.data());
        assert_eq!(a.lake_mask.data(), b.lake_mask.data());
        assert_eq!(a.h_lake_adjusted.data(), b.h_lake_adjusted.data());
    }

    #[test]
    fn rivers_flow_downhill_after_enforcement() {
        let (r, _) = small_run();
        rivers::assert_downhill_river_routing(&r.h_lake_adjusted, &r.flow_dir, &r.river_mask)
            .unwrap();
    }
}
