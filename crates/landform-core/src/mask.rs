//! Land-mask generation: warped fBm potential, quantile threshold, majority
//! smoothing, and the dominant-continent relaxation loop.

use crate::config::MaskConfig;
use crate::filters::{normalize01_robust, quantile};
use crate::grid::Grid;
use crate::metrics::{connected_components_metrics, ConnectivityMetrics};
use crate::noise::{fbm_noise, warp_field};
use crate::rng::RngStream;

/// Outputs from land mask generation.
#[derive(Debug, Clone)]
pub struct LandMaskResult {
    pub land_mask: Grid<bool>,
    /// Rescaled potential in [0, 1]; reused for continentality and ocean depth.
    pub mask_potential: Grid<f32>,
    pub threshold: f32,
    pub metrics: ConnectivityMetrics,
}

/// Create a dominant-continent mask with optional island fragmentation.
pub fn generate_land_mask(
    width: usize,
    height: usize,
    rng: RngStream,
    cfg: &MaskConfig,
) -> LandMaskResult {
    let mut potential_rng = rng.fork("mask-potential").generator();
    let mut warp_x_rng = rng.fork("mask-warp-x").generator();
    let mut warp_y_rng = rng.fork("mask-warp-y").generator();
    let mut frag_rng = rng.fork("mask-fragment").generator();

    let base = fbm_noise(width, height, &mut potential_rng, 2, cfg.base_octaves);
    let warp_x = fbm_noise(width, height, &mut warp_x_rng, 1, cfg.warp_octaves);
    let warp_y = fbm_noise(width, height, &mut warp_y_rng, 1, cfg.warp_octaves);
    let warped = warp_field(
        &base,
        &warp_x,
        &warp_y,
        cfg.warp_strength_px * (1.0 + cfg.fragmentation),
    );

    let frag = fbm_noise(width, height, &mut frag_rng, 4, 3);

    let mut potential = Grid::zeros(width, height);
    let w_denom = (width - 1).max(1) as f32;
    let h_denom = (height - 1).max(1) as f32;
    for y in 0..height {
        let ny = (y as f32 / h_denom) * 2.0 - 1.0;
        let lat_bias = 1.0 - ny.abs() * 0.35;
        for x in 0..width {
            let nx = (x as f32 / w_denom) * 2.0 - 1.0;
            // Elliptical center bias: the x axis is squeezed so the dominant
            // continent does not hug the east/west raster edges.
            let radius = ((nx * 0.85) * (nx * 0.85) + ny * ny).sqrt();
            let center_bias = (1.0 - radius).clamp(0.0, 1.0);
            let v = warped.get(y, x) * 0.62
                + center_bias * cfg.coast_bias_strength
                + lat_bias * 0.18
                + frag.get(y, x) * cfg.fragmentation * 0.20;
            potential.set(y, x, v);
        }
    }

    let potential = normalize01_robust(&potential, 2.0, 98.0);

    let target_land = (cfg.target_land_fraction + (cfg.fragmentation - 0.2) * 0.20)
        .clamp(cfg.min_land_fraction, cfg.max_land_fraction);

    let mut threshold = quantile(potential.data(), 1.0 - target_land);
    let mut land = smooth_mask(&threshold_mask(&potential, threshold), cfg.smooth_iterations);
    let mut metrics = connected_components_metrics(&land, 8);

    if metrics.largest_land_ratio < cfg.dominant_land_ratio as f64 {
        for attempt in 0..3u32 {
            threshold -= cfg.threshold_relaxation * (attempt + 1) as f32;
            land = smooth_mask(
                &threshold_mask(&potential, threshold),
                cfg.smooth_iterations + 1,
            );
            metrics = connected_components_metrics(&land, 8);
            if metrics.largest_land_ratio >= cfg.dominant_land_ratio as f64 {
                break;
            }
        }
    }

    LandMaskResult {
        land_mask: land,
        mask_potential: potential,
        threshold,
        metrics,
    }
}

fn threshold_mask(potential: &Grid<f32>, threshold: f32) -> Grid<bool> {
    potential.map(|v| v >= threshold)
}

fn smooth_mask(mask: &Grid<bool>, iterations: u32) -> Grid<bool> {
    let mut result = mask.clone();
    for _ in 0..iterations {
        result = majority_filter(&result);
    }
    result
}

/// 3×3 majority vote; out-of-bounds neighbors count as ocean.
fn majority_filter(mask: &Grid<bool>) -> Grid<bool> {
    let (w, h) = (mask.width(), mask.height());
    let mut out = Grid::filled(w, h, false);
    for y in 0..h {
        for x in 0..w {
            let mut count = 0u8;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if let Some((ny, nx)) = mask.neighbor(y, x, dy, dx) {
                        if mask.get(ny, nx) {
                            count += 1;
                        }
                    }
                }
            }
            out.set(y, x, count >= 5);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::parse_seed;

    #[test]
    fn land_fraction_and_dominant_landmass_ratio() {
        let parsed = parse_seed("MistyForge").unwrap();
        let rng = RngStream::new(parsed.seed_hash).fork("mask");
        let result = generate_land_mask(256, 128, rng, &MaskConfig::default());

        assert!(result.metrics.land_fraction >= 0.15);
        assert!(result.metrics.land_fraction <= 0.65);
        assert!(result.metrics.largest_land_ratio >= 0.55);
        assert!(result.metrics.num_components >= 1);
    }

    #[test]
    fn potential_is_normalized() {
        let rng = RngStream::new(99).fork("mask");
        let result = generate_land_mask(96, 64, rng, &MaskConfig::default());
        assert!(result.mask_potential.min_value() >= 0.0);
        assert!(result.mask_potential.max_value() <= 1.0);
    }

    #[test]
    fn mask_is_deterministic() {
        let cfg = MaskConfig::default();
        let a = generate_land_mask(128, 64, RngStream::new(7).fork("mask"), &cfg);
        let b = generate_land_mask(128, 64, RngStream::new(7).fork("mask"), &cfg);
        assert_eq!(a.land_mask.data(), b.land_mask.data());
        assert_eq!(a.threshold, b.threshold);
    }

    #[test]
    fn majority_filter_removes_isolated_pixels() {
        let mut mask = Grid::filled(9, 9, false);
        mask.set(4, 4, true);
        let smoothed = majority_filter(&mask);
        assert_eq!(smoothed.count_true(), 0);
    }
}
