//! Crust thickness, stress, shelf proximity, and interior-basin fields.

use crate::config::TectonicsConfig;
use crate::filters::{box_blur, euclidean_distance_to, normalize01};
use crate::grid::Grid;
use crate::noise::fbm_noise;
use crate::rng::RngStream;

/// Per-plate base crust thickness blended across boundaries.
///
/// Thickness = `clip(0.45 + 0.35·rank + 0.2·age, 0.25, 1)` where rank is the
/// normalized plate-area rank (largest plate → 1).
pub fn crust_field(
    plate_ids: &Grid<i16>,
    plate_count: usize,
    ages: &[f32],
    boundary_mask: &Grid<bool>,
    cfg: &TectonicsConfig,
) -> Grid<f32> {
    let mut areas = vec![0usize; plate_count];
    for &id in plate_ids.data() {
        areas[id as usize] += 1;
    }
    let mut order: Vec<usize> = (0..plate_count).collect();
    order.sort_unstable_by(|&a, &b| areas[a].cmp(&areas[b]).then(a.cmp(&b)));
    let mut rank = vec![0.0f32; plate_count];
    let denom = (plate_count - 1).max(1) as f32;
    for (pos, &plate) in order.iter().enumerate() {
        rank[plate] = pos as f32 / denom;
    }

    let thickness: Vec<f32> = (0..plate_count)
        .map(|p| (0.45 + 0.35 * rank[p] + 0.2 * ages[p]).clamp(0.25, 1.0))
        .collect();

    let base = plate_ids.map(|id| thickness[id as usize]);

    // Near boundaries the per-plate steps blend into each other.
    let sigma = cfg.crust_blend_sigma_px.max(1.0);
    let blurred = box_blur(&base, (sigma * 0.5).round() as usize, 2);
    let dist = euclidean_distance_to(boundary_mask);
    let mut out = Grid::zeros(base.width(), base.height());
    for i in 0..out.len() {
        let wb = (-dist.at(i) / sigma).exp();
        out.put(i, blurred.at(i) * wb + base.at(i) * (1.0 - wb));
    }
    out
}

/// Stress field: per-plate radial decay from the plate's convergent-boundary
/// centroid, damped on old plates by `1 − 0.45·age`.
pub fn stress_field(
    plate_ids: &Grid<i16>,
    plate_count: usize,
    boundary_type: &Grid<i8>,
    sites: &[[f32; 2]],
    ages: &[f32],
    cfg: &TectonicsConfig,
) -> Grid<f32> {
    let (w, h) = (plate_ids.width(), plate_ids.height());

    // Centroid of convergent cells per plate; boundary cells as fallback,
    // then the site itself.
    let mut conv_sum = vec![(0.0f64, 0.0f64, 0usize); plate_count];
    let mut bound_sum = vec![(0.0f64, 0.0f64, 0usize); plate_count];
    for y in 0..h {
        for x in 0..w {
            let plate = plate_ids.get(y, x) as usize;
            match boundary_type.get(y, x) {
                1 => {
                    conv_sum[plate].0 += y as f64;
                    conv_sum[plate].1 += x as f64;
                    conv_sum[plate].2 += 1;
                }
                2 | 3 => {
                    bound_sum[plate].0 += y as f64;
                    bound_sum[plate].1 += x as f64;
                    bound_sum[plate].2 += 1;
                }
                _ => {}
            }
        }
    }
    let centroids: Vec<(f32, f32)> = (0..plate_count)
        .map(|p| {
            if conv_sum[p].2 > 0 {
                (
                    (conv_sum[p].0 / conv_sum[p].2 as f64) as f32,
                    (conv_sum[p].1 / conv_sum[p].2 as f64) as f32,
                )
            } else if bound_sum[p].2 > 0 {
                (
                    (bound_sum[p].0 / bound_sum[p].2 as f64) as f32,
                    (bound_sum[p].1 / bound_sum[p].2 as f64) as f32,
                )
            } else {
                (sites[p][1] * h as f32, sites[p][0] * w as f32)
            }
        })
        .collect();

    let sigma = cfg.stress_sigma_px.max(1.0);
    let mut out = Grid::zeros(w, h);
    for y in 0..h {
        for x in 0..w {
            let plate = plate_ids.get(y, x) as usize;
            let (cy, cx) = centroids[plate];
            let dy = y as f32 - cy;
            let dx = x as f32 - cx;
            let dist = (dy * dy + dx * dx).sqrt();
            let decay = (-dist / sigma).exp();
            out.set(y, x, decay * (1.0 - 0.45 * ages[plate]));
        }
    }
    normalize01(&out)
}

/// Shelf proximity: blurred land occupancy shaped by `shelf_power`. High just
/// inside and along the coast, falling off into open ocean.
pub fn shelf_proximity(land_mask: &Grid<bool>, cfg: &TectonicsConfig) -> Grid<f32> {
    let land = land_mask.map(|v| if v { 1.0f32 } else { 0.0 });
    let blurred = box_blur(&land, cfg.shelf_radius_px.max(1), 2);
    blurred.map(|v| v.clamp(0.0, 1.0).powf(cfg.shelf_power))
}

/// Interior-basin field: low-frequency noise gated to plate interiors.
pub fn interior_basin_field(
    boundary_mask: &Grid<bool>,
    rng: RngStream,
    cfg: &TectonicsConfig,
) -> Grid<f32> {
    let (w, h) = (boundary_mask.width(), boundary_mask.height());
    let mut basin_rng = rng.fork("basin-noise").generator();
    let noise = normalize01(&fbm_noise(w, h, &mut basin_rng, 3, 4));
    let dist = euclidean_distance_to(boundary_mask);
    let reach = cfg.deformation_max_radius_px.max(1) as f32;
    let threshold = cfg.interior_basin_threshold;
    let mut out = Grid::zeros(w, h);
    for i in 0..out.len() {
        let interior = (dist.at(i) / reach).clamp(0.0, 1.0);
        let gated = ((noise.at(i) - threshold) / (1.0 - threshold).max(1e-6)).clamp(0.0, 1.0);
        out.put(i, gated * interior);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_plate_fixture() -> (Grid<i16>, Grid<bool>, Grid<i8>) {
        let (w, h) = (24usize, 16usize);
        let mut ids = Grid::filled(w, h, 0i16);
        let mut boundary = Grid::filled(w, h, false);
        let mut btype = Grid::filled(w, h, 0i8);
        for y in 0..h {
            for x in w / 2..w {
                ids.set(y, x, 1);
            }
            boundary.set(y, w / 2 - 1, true);
            btype.set(y, w / 2 - 1, 1);
        }
        (ids, boundary, btype)
    }

    #[test]
    fn crust_values_stay_in_declared_range() {
        let (ids, boundary, _) = two_plate_fixture();
        let crust = crust_field(&ids, 2, &[0.3, 0.9], &boundary, &TectonicsConfig::default());
        assert!(crust.min_value() >= 0.25 - 1e-5);
        assert!(crust.max_value() <= 1.0 + 1e-5);
    }

    #[test]
    fn older_plate_carries_thicker_crust() {
        let (ids, boundary, _) = two_plate_fixture();
        // Equal areas: rank ties broken by plate index, so age dominates.
        let crust = crust_field(&ids, 2, &[0.0, 1.0], &boundary, &TectonicsConfig::default());
        assert!(crust.get(8, 21) > crust.get(8, 2));
    }

    #[test]
    fn stress_decays_from_convergent_centroid() {
        let (ids, _, btype) = two_plate_fixture();
        let sites = vec![[0.25f32, 0.5], [0.75, 0.5]];
        let stress = stress_field(&ids, 2, &btype, &sites, &[0.2, 0.2], &TectonicsConfig::default());
        // Convergent cells sit at x = 11; stress on plate 0 should fall
        // moving away from them.
        assert!(stress.get(8, 10) > stress.get(8, 0));
    }

    #[test]
    fn shelf_proximity_is_high_on_land() {
        let mut land = Grid::filled(32, 16, false);
        for y in 0..16 {
            for x in 0..12 {
                land.set(y, x, true);
            }
        }
        let shelf = shelf_proximity(&land, &TectonicsConfig::default());
        assert!(shelf.get(8, 4) > shelf.get(8, 30));
    }

    #[test]
    fn interior_basins_avoid_boundaries() {
        let (_, boundary, _) = two_plate_fixture();
        let field = interior_basin_field(&boundary, RngStream::new(8).fork("tectonics"), &TectonicsConfig::default());
        for y in 0..field.height() {
            assert!(field.get(y, 11) < 0.35, "basin field should vanish on the boundary");
        }
    }
}
