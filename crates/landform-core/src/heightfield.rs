//! Heightfield composition: fold continentality, tectonic fields, and noise
//! into the pre-hydrology elevation, and re-add fine detail after incision
//! without disturbing rivers or lakes.

use crate::config::{HeightConfig, HydrologyConfig};
use crate::filters::{euclidean_distance_to, normalize01_robust};
use crate::grid::Grid;
use crate::hydrology::HydrologyResult;
use crate::mask::LandMaskResult;
use crate::noise::{fbm_noise, warp_field};
use crate::rng::RngStream;
use crate::tectonics::TectonicsResult;

/// Pre-hydrology height plus the detail fields re-applied after incision.
pub struct TectonicComposition {
    pub h_tectonic: Grid<f32>,
    pub continentality: Grid<f32>,
    /// Fine fBm detail, already gain-modulated; re-added post-incision.
    pub detail: Grid<f32>,
    /// Per-cell detail amplitude in meters (craton-damped).
    pub detail_amp: Grid<f32>,
    /// Transform-lineament detail in meters.
    pub tectonic_detail: Grid<f32>,
    /// Distance to active deformation, in pixels (debug surface).
    pub tectonic_distance_px: Grid<f32>,
    /// `exp(−distance/40)` modulation applied to uplift/basin/detail noise.
    pub tectonic_noise_gain: Grid<f32>,
    /// Normalized uplift composite for debug rendering.
    pub uplift_debug: Grid<f32>,
}

/// Compose the pre-hydrology height `h_tectonic`.
pub fn compose_tectonic(
    mask: &LandMaskResult,
    tect: &TectonicsResult,
    meters_per_pixel: f64,
    cfg: &HeightConfig,
    rng: RngStream,
) -> TectonicComposition {
    let potential = &mask.mask_potential;
    let land = &mask.land_mask;
    let (w, h) = (potential.width(), potential.height());
    let threshold = mask.threshold;

    let continentality = potential.map(|p| {
        ((p - threshold) / (1.0 - threshold).max(1e-6)).clamp(0.0, 1.0)
    });

    // Ridged background uplift, domain-warped.
    let uplift_base = fbm_noise(w, h, &mut rng.fork("uplift").generator(), 3, 5);
    let ridged = uplift_base.map(|u| {
        let r = (1.0 - u.abs()).clamp(0.0, 1.0);
        r * r
    });
    let uplift_warp_x = fbm_noise(w, h, &mut rng.fork("uplift-warp-x").generator(), 1, 3);
    let uplift_warp_y = fbm_noise(w, h, &mut rng.fork("uplift-warp-y").generator(), 1, 3);
    let background_uplift = normalize01_robust(
        &warp_field(&ridged, &uplift_warp_x, &uplift_warp_y, cfg.uplift_warp_strength_px),
        1.0,
        99.0,
    );

    // Fine detail is drawn early but re-added after hydrology so channels
    // and lakes stay intact.
    let detail = fbm_noise(w, h, &mut rng.fork("detail").generator(), 10, 4);

    // Plate fabric: two fBm fields projected on per-plate motion.
    let fabric_a = fbm_noise(w, h, &mut rng.fork("tectonic-fabric-a").generator(), 7, 4);
    let fabric_b = fbm_noise(w, h, &mut rng.fork("tectonic-fabric-b").generator(), 7, 4);
    let mut fabric_signal = Grid::zeros(w, h);
    for i in 0..fabric_signal.len() {
        let m = tect.plate_motion[tect.plate_ids.at(i) as usize];
        fabric_signal.put(i, (fabric_a.at(i) * m[0] + fabric_b.at(i) * m[1]).clamp(-1.0, 1.0));
    }
    let fabric_ridge = fabric_signal.map(|s| {
        let r = (1.0 - s.abs()).clamp(0.0, 1.0);
        r * r
    });
    let fabric_lineament = fabric_signal.map(|s| s.abs().clamp(0.0, 1.0));

    let basin = fbm_noise(w, h, &mut rng.fork("basin").generator(), 4, 4);
    let basin_term = basin.map(|b| (0.62 - (b + 1.0) * 0.5).clamp(0.0, 1.0));

    // Noise modulation: full amplitude near active deformation, decaying into
    // quiet plate interiors.
    let (tectonic_distance_px, tectonic_noise_gain) = tectonic_noise_modulation(tect);
    let gained = |g: &Grid<f32>| {
        let mut out = g.clone();
        for i in 0..out.len() {
            out.put(i, out.at(i) * tectonic_noise_gain.at(i));
        }
        out
    };
    let background_uplift = gained(&background_uplift);
    let basin_term = gained(&basin_term);
    let detail = gained(&detail);

    let rift_noise = normalize01_robust(
        &fbm_noise(w, h, &mut rng.fork("rift-noise").generator(), 6, 3),
        1.0,
        99.0,
    );

    let mut h_tectonic = Grid::zeros(w, h);
    let mut uplift_dbg = Grid::zeros(w, h);
    for i in 0..h_tectonic.len() {
        let stress = tect.stress_field.at(i);
        let orogeny = tect.orogeny_field.at(i) * fabric_ridge.at(i) * (0.85 + 0.15 * stress);
        let rift = tect.rift_field.at(i) * (0.45 + 0.55 * rift_noise.at(i));
        let transform = tect.transform_field.at(i) * fabric_lineament.at(i) * (0.7 + 0.3 * stress);
        let collision_damp = 1.0 - cfg.collision_damping * tect.collision_buffer.at(i);

        if land.at(i) {
            let macro_land = (cfg.base_land_lift_m
                + continentality.at(i) * cfg.continentality_height_m
                + background_uplift.at(i) * cfg.ridge_height_m
                + tect.base_crust_field.at(i) * cfg.crust_height_m
                + basin_term.at(i) * cfg.basin_height_m
                + stress * cfg.stress_uplift_m
                + orogeny * cfg.orogeny_strength_m
                + transform * cfg.transform_strength_m
                - rift * cfg.rift_strength_m
                - tect.interior_basin_field.at(i) * cfg.interior_basin_strength_m)
                * collision_damp;
            h_tectonic.put(i, macro_land.clamp(cfg.min_land_height_m, cfg.max_land_height_m));
        } else {
            let ocean_factor =
                ((threshold - potential.at(i)) / threshold.max(1e-6)).clamp(0.0, 1.0);
            let shelf_depth =
                (1.0 - tect.shelf_proximity.at(i)).clamp(0.0, 1.0).powf(cfg.shelf_depth_power);
            let ocean_depth_factor =
                ocean_factor * (1.0 - cfg.ocean_shelf_blend) + shelf_depth * cfg.ocean_shelf_blend;
            let mut depth = -ocean_depth_factor * cfg.ocean_depth_m;
            depth -= tect.rift_field.at(i)
                * (1.0 - tect.shelf_proximity.at(i))
                * (cfg.rift_strength_m * 0.18);
            h_tectonic.put(i, depth.clamp(-cfg.max_ocean_depth_m, 0.0));
        }

        uplift_dbg.put(
            i,
            background_uplift.at(i) * 0.2 + orogeny * 0.65 + stress * 0.15,
        );
    }

    // Coastal dome lift: a faint seaward gradient guaranteeing strict descent
    // toward every coast.
    let ocean_mask = h_tectonic.map(|v| v <= 0.0);
    let distance_to_ocean_px = euclidean_distance_to(&ocean_mask);
    let coastal_gradient = 5.0e-5f32;
    for i in 0..h_tectonic.len() {
        if !ocean_mask.at(i) {
            let lift = distance_to_ocean_px.at(i) * meters_per_pixel as f32 * coastal_gradient;
            h_tectonic.put(i, h_tectonic.at(i) + lift);
        }
    }

    let detail_amp = tect
        .plate_age_map
        .map(|age| cfg.detail_land_m * (1.0 - cfg.craton_detail_reduction * age));
    let mut tectonic_detail = Grid::zeros(w, h);
    for i in 0..tectonic_detail.len() {
        tectonic_detail.put(
            i,
            fabric_signal.at(i) * tect.transform_field.at(i) * cfg.tectonic_detail_m,
        );
    }

    TectonicComposition {
        h_tectonic,
        continentality,
        detail,
        detail_amp,
        tectonic_detail,
        tectonic_distance_px,
        tectonic_noise_gain,
        uplift_debug: normalize01_robust(&uplift_dbg, 1.0, 99.0),
    }
}

/// Distance to active deformation and its exponential noise gain (λ = 40 px).
fn tectonic_noise_modulation(tect: &TectonicsResult) -> (Grid<f32>, Grid<f32>) {
    let (w, h) = (tect.boundary_mask.width(), tect.boundary_mask.height());
    let mut active = Grid::filled(w, h, false);
    for i in 0..active.len() {
        active.put(
            i,
            tect.boundary_mask.at(i)
                || tect.stress_field.at(i) > 0.18
                || tect.orogeny_field.at(i) > 0.10
                || tect.rift_field.at(i) > 0.10
                || tect.transform_field.at(i) > 0.10,
        );
    }
    if !active.any() {
        return (Grid::zeros(w, h), Grid::filled(w, h, 1.0));
    }
    let dist = euclidean_distance_to(&active);
    let gain = dist.map(|d| (-d / 40.0).exp());
    (dist, gain)
}

/// Flow-accumulation detail gate: high-flow cells shed fine detail so valley
/// floors stay smooth.
pub fn flow_detail_gate(
    flow_accum_raw: &Grid<f32>,
    land_mask: &Grid<bool>,
    cfg: &HeightConfig,
) -> Grid<f32> {
    let (w, h) = (flow_accum_raw.width(), flow_accum_raw.height());
    if !land_mask.any() {
        return Grid::filled(w, h, 1.0);
    }
    let land_flow: Vec<f32> = (0..flow_accum_raw.len())
        .filter(|&i| land_mask.at(i))
        .map(|i| flow_accum_raw.at(i).max(0.0))
        .collect();
    let flow_ref = crate::filters::percentile(&land_flow, 99.5)
        .max(cfg.detail_flow_threshold_cells + 1.0);
    let log_min = cfg.detail_flow_threshold_cells.max(0.0).ln_1p();
    let denom = (flow_ref.ln_1p() - log_min).max(1e-6);
    let damp = cfg.detail_flow_damp_strength.clamp(0.0, 1.0);
    let curve = cfg.detail_flow_damp_curve.max(0.2);

    let mut gate = Grid::filled(w, h, 1.0f32);
    for i in 0..gate.len() {
        if !land_mask.at(i) {
            continue;
        }
        let flow_norm =
            ((flow_accum_raw.at(i).max(0.0).ln_1p() - log_min) / denom).clamp(0.0, 1.0);
        gate.put(i, (1.0 - damp * flow_norm.powf(curve)).clamp(0.0, 1.0));
    }
    gate
}

/// Re-add fine detail on land after incision, suppressed on rivers/lakes and
/// damped along high-flow corridors. Returns `(h_final_pre_clamp, damping)`.
pub fn readd_detail(
    h_geomorph: &Grid<f32>,
    land_mask: &Grid<bool>,
    comp: &TectonicComposition,
    hydro: &HydrologyResult,
    height_cfg: &HeightConfig,
    hydrology_cfg: &HydrologyConfig,
) -> (Grid<f32>, Grid<f32>) {
    let flow_gate = flow_detail_gate(&hydro.flow_accum_raw, land_mask, height_cfg);
    let max_width = hydrology_cfg.river_max_width_px.max(1e-6);

    let mut damping = Grid::zeros(h_geomorph.width(), h_geomorph.height());
    let mut h_final = h_geomorph.clone();
    for i in 0..h_final.len() {
        if !land_mask.at(i) {
            continue;
        }
        let river_strength = (hydro.river_mask.at(i) / max_width).clamp(0.0, 1.0);
        let lake = if hydro.lake_mask.at(i) { 1.0 } else { 0.0 };
        let suppress = (river_strength * 0.9 + lake).clamp(0.0, 1.0);
        let damp = (flow_gate.at(i) * (1.0 - suppress)).clamp(0.0, 1.0);
        damping.put(i, damp);
        let readd = (comp.detail.at(i) * comp.detail_amp.at(i) + comp.tectonic_detail.at(i)) * damp;
        h_final.put(i, h_final.at(i) + readd);
    }
    (h_final, damping)
}

/// Final clamp into the contract range; ocean non-positive, land at or above
/// the minimum land height.
pub fn finalize_height(
    h_final_pre: &Grid<f32>,
    land_mask: &Grid<bool>,
    cfg: &HeightConfig,
) -> Grid<f32> {
    let mut out = h_final_pre.map(|v| v.clamp(-cfg.max_ocean_depth_m, cfg.max_land_height_m));
    for i in 0..out.len() {
        if land_mask.at(i) {
            out.put(i, out.at(i).max(cfg.min_land_height_m));
        } else {
            out.put(i, out.at(i).min(0.0));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeneratorConfig, MaskConfig};
    use crate::mask::generate_land_mask;
    use crate::seed::parse_seed;
    use crate::tectonics::generate_tectonic_scaffold;

    fn composition(w: usize, h: usize) -> (TectonicComposition, Grid<bool>, GeneratorConfig) {
        let parsed = parse_seed("MistyForge").unwrap();
        let cfg = GeneratorConfig::default();
        let root = RngStream::new(parsed.seed_hash);
        let mask = generate_land_mask(w, h, root.fork("mask"), &MaskConfig::default());
        let tect =
            generate_tectonic_scaffold(w, h, &mask.land_mask, root.fork("tectonics"), &cfg.tectonics);
        let comp = compose_tectonic(&mask, &tect, 5000.0, &cfg.height, root);
        (comp, mask.land_mask, cfg)
    }

    #[test]
    fn land_is_positive_and_ocean_non_positive() {
        let (comp, land, cfg) = composition(128, 64);
        for i in 0..land.len() {
            if land.at(i) {
                assert!(comp.h_tectonic.at(i) > 0.0, "land cell {i} must sit above sea level");
            } else {
                assert!(comp.h_tectonic.at(i) <= 0.0);
                assert!(comp.h_tectonic.at(i) >= -cfg.height.max_ocean_depth_m);
            }
        }
    }

    #[test]
    fn heights_respect_configured_bounds() {
        let (comp, land, cfg) = composition(128, 64);
        assert!(comp.h_tectonic.is_finite());
        assert!(comp.h_tectonic.min_value() >= -cfg.height.max_ocean_depth_m);
        // Dome lift adds a small amount over the macro clamp; keep a margin.
        assert!(comp.h_tectonic.max_value() <= cfg.height.max_land_height_m + 500.0);
        assert!(land.any());
    }

    #[test]
    fn composition_is_deterministic() {
        let (a, _, _) = composition(96, 48);
        let (b, _, _) = composition(96, 48);
        assert_eq!(a.h_tectonic.data(), b.h_tectonic.data());
        assert_eq!(a.detail.data(), b.detail.data());
    }

    #[test]
    fn noise_gain_decays_away_from_deformation() {
        let (comp, _, _) = composition(96, 48);
        assert!(comp.tectonic_noise_gain.min_value() >= 0.0);
        assert!(comp.tectonic_noise_gain.max_value() <= 1.0 + 1e-5);
    }

    #[test]
    fn finalize_clamps_to_contract_range() {
        let mut pre = Grid::filled(8, 4, 0.0f32);
        pre.set(0, 0, 20_000.0);
        pre.set(0, 1, -20_000.0);
        pre.set(0, 2, -5.0);
        let mut land = Grid::filled(8, 4, false);
        land.set(0, 0, true);
        land.set(0, 2, true);
        let cfg = HeightConfig::default();
        let out = finalize_height(&pre, &land, &cfg);
        assert_eq!(out.get(0, 0), cfg.max_land_height_m);
        assert_eq!(out.get(0, 1), -cfg.max_ocean_depth_m);
        assert_eq!(out.get(0, 2), cfg.min_land_height_m);
    }
}
