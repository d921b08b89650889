//! Hierarchical stream-power incision.
//!
//! One deterministic pass: physical stream power `A^m · S^n` gated to
//! accumulating cells, percentile-normalized, ridge-preserved, blurred into
//! valley envelopes, and capped by a non-inversion guard so incision never
//! reverses a flow edge.

use serde::Serialize;

use crate::config::GeomorphConfig;
use crate::filters::{box_blur, laplacian, percentile, DIRECTIONS_8};
use crate::grid::Grid;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GeomorphMetrics {
    pub max_incision_depth_m: f64,
    pub mean_incision_depth_m: f64,
    pub mean_incision_depth_incised_m: f64,
    pub percent_land_incised: f64,
    pub power_scale_value: f64,
}

pub struct GeomorphResult {
    pub h_geomorph: Grid<f32>,
    pub power_raw: Grid<f32>,
    pub incision_raw: Grid<f32>,
    pub incision_blurred: Grid<f32>,
    pub incision_depth_m: Grid<f32>,
    pub metrics: GeomorphMetrics,
    /// Wall-clock cost of this pass. Reported in `meta.json` only — never in
    /// the deterministic metadata.
    pub incision_seconds: f64,
}

/// Apply one hierarchical incision pass to the hydro-conditioned height.
pub fn apply_hierarchical_incision(
    h_hydro_post: &Grid<f32>,
    flow_accum: &Grid<f32>,
    flow_dir: &Grid<i8>,
    land_mask: &Grid<bool>,
    meters_per_pixel: f64,
    cfg: &GeomorphConfig,
) -> GeomorphResult {
    let t0 = std::time::Instant::now();
    let (w, h) = (h_hydro_post.width(), h_hydro_post.height());
    if !land_mask.any() {
        let zeros = Grid::zeros(w, h);
        return GeomorphResult {
            h_geomorph: h_hydro_post.clone(),
            power_raw: zeros.clone(),
            incision_raw: zeros.clone(),
            incision_blurred: zeros.clone(),
            incision_depth_m: zeros,
            metrics: GeomorphMetrics {
                max_incision_depth_m: 0.0,
                mean_incision_depth_m: 0.0,
                mean_incision_depth_incised_m: 0.0,
                percent_land_incised: 0.0,
                power_scale_value: 0.0,
            },
            incision_seconds: t0.elapsed().as_secs_f64(),
        };
    }

    let accum_land: Vec<f32> = (0..flow_accum.len())
        .filter(|&i| land_mask.at(i))
        .map(|i| flow_accum.at(i).max(0.0))
        .collect();
    let a_scale = percentile(&accum_land, 99.5).max(1.0);

    // Physical slope in meters per meter (central differences).
    let mpp = meters_per_pixel as f32;
    let mut slope_phys = Grid::zeros(w, h);
    for y in 0..h {
        for x in 0..w {
            let xm = x.saturating_sub(1);
            let xp = (x + 1).min(w - 1);
            let ym = y.saturating_sub(1);
            let yp = (y + 1).min(h - 1);
            let gx = (h_hydro_post.get(y, xp) - h_hydro_post.get(y, xm))
                / ((xp - xm).max(1) as f32 * mpp);
            let gy = (h_hydro_post.get(yp, x) - h_hydro_post.get(ym, x))
                / ((yp - ym).max(1) as f32 * mpp);
            slope_phys.set(y, x, (gx * gx + gy * gy).sqrt());
        }
    }

    let mut power_raw = Grid::zeros(w, h);
    if cfg.use_physical_stream_power {
        let cell_area_m2 = mpp * mpp;
        for i in 0..power_raw.len() {
            if !land_mask.at(i) {
                continue;
            }
            let a_norm = (flow_accum.at(i).max(0.0) / a_scale).clamp(0.0, 1.0);
            if a_norm < cfg.a_min {
                continue;
            }
            let area = flow_accum.at(i).max(0.0) * cell_area_m2;
            let p = area.powf(cfg.incision_m) * slope_phys.at(i).max(0.0).powf(cfg.incision_n);
            power_raw.put(i, p);
        }
    } else {
        let slope_land: Vec<f32> = (0..slope_phys.len())
            .filter(|&i| land_mask.at(i))
            .map(|i| slope_phys.at(i))
            .collect();
        let slope_scale = percentile(&slope_land, 99.0).max(1e-6);
        for i in 0..power_raw.len() {
            if !land_mask.at(i) {
                continue;
            }
            let a_norm = (flow_accum.at(i).max(0.0) / a_scale).clamp(0.0, 1.0);
            if a_norm < cfg.a_min {
                continue;
            }
            let s_norm = (slope_phys.at(i) / slope_scale).clamp(0.0, 1.0);
            power_raw.put(i, a_norm.powf(cfg.incision_m) * s_norm.powf(cfg.incision_n));
        }
    }

    let power_land: Vec<f32> = (0..power_raw.len())
        .filter(|&i| land_mask.at(i))
        .map(|i| power_raw.at(i))
        .collect();
    let scale_pct = cfg.power_scale_percentile.clamp(90.0, 100.0);
    let power_scale = percentile(&power_land, scale_pct).max(1e-9);
    let mut incision_raw = power_raw.map(|p| (p / power_scale).clamp(0.0, 1.0));

    // Convex ridge crests keep most of their relief.
    let ridge = laplacian(h_hydro_post);
    let preserve = cfg.ridge_preserve.clamp(0.0, 1.0);
    for i in 0..incision_raw.len() {
        if ridge.at(i) < 0.0 {
            incision_raw.put(i, incision_raw.at(i) * preserve);
        }
        if !land_mask.at(i) {
            incision_raw.put(i, 0.0);
        }
    }

    let blur_radius = ((cfg.valley_blur_sigma_px.max(0.5) * 1.5).round() as usize).max(1);
    let mut incision_blurred = box_blur(&incision_raw, blur_radius, 3);
    for i in 0..incision_blurred.len() {
        if !land_mask.at(i) {
            incision_blurred.put(i, 0.0);
        }
    }

    let depth_scale = cfg.max_depth_m * (cfg.incision_strength * 320.0).clamp(0.0, 1.0);
    let mut incision_depth = incision_blurred.map(|v| (v * depth_scale).min(cfg.max_depth_m));
    for i in 0..incision_depth.len() {
        if !land_mask.at(i) {
            incision_depth.put(i, 0.0);
        }
    }
    let incision_depth = enforce_noninversion(h_hydro_post, &incision_depth, flow_dir, land_mask);

    let mut h_geomorph = h_hydro_post.clone();
    for i in 0..h_geomorph.len() {
        if land_mask.at(i) {
            h_geomorph.put(i, h_geomorph.at(i) - incision_depth.at(i));
        }
    }

    let land_incision: Vec<f32> = (0..incision_depth.len())
        .filter(|&i| land_mask.at(i))
        .map(|i| incision_depth.at(i))
        .collect();
    let incised: Vec<f32> = land_incision.iter().copied().filter(|&v| v > 0.5).collect();
    let mean = |v: &[f32]| {
        if v.is_empty() {
            0.0
        } else {
            v.iter().map(|&x| x as f64).sum::<f64>() / v.len() as f64
        }
    };
    let metrics = GeomorphMetrics {
        max_incision_depth_m: land_incision.iter().copied().fold(0.0f32, f32::max) as f64,
        mean_incision_depth_m: mean(&land_incision),
        mean_incision_depth_incised_m: mean(&incised),
        percent_land_incised: if land_incision.is_empty() {
            0.0
        } else {
            incised.len() as f64 / land_incision.len() as f64
        },
        power_scale_value: power_scale as f64,
    };

    GeomorphResult {
        h_geomorph,
        power_raw,
        incision_raw,
        incision_blurred,
        incision_depth_m: incision_depth,
        metrics,
        incision_seconds: t0.elapsed().as_secs_f64(),
    }
}

/// Cap incision so routed cells stay at or above their downstream neighbor's
/// post-incision height (ε = 1e−3 m).
fn enforce_noninversion(
    base_height: &Grid<f32>,
    incision_depth: &Grid<f32>,
    flow_dir: &Grid<i8>,
    land_mask: &Grid<bool>,
) -> Grid<f32> {
    let mut capped = incision_depth.clone();
    let eps = 1e-3f32;
    for (dir_idx, &(dy, dx)) in DIRECTIONS_8.iter().enumerate() {
        for y in 0..base_height.height() {
            for x in 0..base_height.width() {
                if !land_mask.get(y, x) || flow_dir.get(y, x) != dir_idx as i8 {
                    continue;
                }
                let Some((ny, nx)) = base_height.neighbor(y, x, dy, dx) else {
                    continue;
                };
                let max_allowed = (base_height.get(y, x) - base_height.get(ny, nx)
                    + capped.get(ny, nx)
                    - eps)
                    .max(0.0);
                let current = capped.get(y, x);
                if current > max_allowed {
                    capped.set(y, x, max_allowed);
                }
            }
        }
    }
    for i in 0..capped.len() {
        if !land_mask.at(i) {
            capped.put(i, 0.0);
        }
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::routing::analyze_drainage_state;

    /// V-shaped valley draining to an ocean column on the west edge.
    fn valley_fixture() -> (Grid<f32>, Grid<bool>) {
        let (w, h) = (48usize, 32usize);
        let mut height = Grid::zeros(w, h);
        let mut land = Grid::filled(w, h, true);
        for y in 0..h {
            for x in 0..w {
                let cross = (y as f32 - 16.0).abs() * 18.0;
                height.set(y, x, 40.0 + x as f32 * 6.0 + cross);
            }
            height.set(y, 0, -30.0);
            land.set(y, 0, false);
        }
        (height, land)
    }

    fn run_incision() -> (GeomorphResult, Grid<f32>, Grid<bool>, Grid<i8>) {
        let (height, land) = valley_fixture();
        let state = analyze_drainage_state(&height, &land);
        let result = apply_hierarchical_incision(
            &height,
            &state.flow_accum,
            &state.flow_dir,
            &land,
            1000.0,
            &GeomorphConfig::default(),
        );
        (result, height, land, state.flow_dir)
    }

    #[test]
    fn incision_never_lifts_and_spares_ocean() {
        let (result, height, land, _) = run_incision();
        for i in 0..height.len() {
            if land.at(i) {
                assert!(result.h_geomorph.at(i) <= height.at(i) + 1e-4);
            } else {
                assert_eq!(result.h_geomorph.at(i), height.at(i));
            }
        }
        assert!(result.incision_depth_m.min_value() >= 0.0);
        assert!(result.incision_depth_m.max_value() <= GeomorphConfig::default().max_depth_m + 1e-3);
    }

    #[test]
    fn valley_floor_incises_more_than_ridges() {
        let (result, _, _, _) = run_incision();
        // Trunk row (y = 16) carries the accumulation; compare against the
        // valley shoulder at the same x.
        let floor = result.incision_depth_m.get(16, 24);
        let shoulder = result.incision_depth_m.get(2, 24);
        assert!(
            floor >= shoulder,
            "valley floor ({floor}) should incise at least as much as the shoulder ({shoulder})"
        );
        assert!(result.metrics.max_incision_depth_m >= 0.0);
    }

    #[test]
    fn noninversion_guard_keeps_flow_edges_downhill() {
        let (result, _, land, flow_dir) = run_incision();
        let dest = crate::hydrology::routing::flow_dest_from_dir(&flow_dir);
        for i in 0..land.len() {
            if !land.at(i) || dest[i] < 0 {
                continue;
            }
            let d = dest[i] as usize;
            if !land.at(d) {
                continue;
            }
            assert!(
                result.h_geomorph.at(i) >= result.h_geomorph.at(d) - 1e-3,
                "incision inverted the flow edge {i} -> {d}"
            );
        }
    }

    #[test]
    fn incision_is_deterministic() {
        let (a, _, _, _) = run_incision();
        let (b, _, _, _) = run_incision();
        assert_eq!(a.incision_depth_m.data(), b.incision_depth_m.data());
        assert_eq!(a.metrics.power_scale_value, b.metrics.power_scale_value);
    }
}
