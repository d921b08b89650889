//! Connectivity and coverage metrics for boolean land masks.

use crate::filters::connected_components;
use crate::grid::Grid;
use serde::Serialize;

/// Connected component and coverage summary for a land mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConnectivityMetrics {
    pub num_components: usize,
    pub largest_component_area: usize,
    pub total_land_pixels: usize,
    pub largest_land_ratio: f64,
    pub land_fraction: f64,
}

impl ConnectivityMetrics {
    pub fn empty() -> Self {
        Self {
            num_components: 0,
            largest_component_area: 0,
            total_land_pixels: 0,
            largest_land_ratio: 0.0,
            land_fraction: 0.0,
        }
    }
}

/// Compute connected component statistics for a land mask.
pub fn connected_components_metrics(mask: &Grid<bool>, connectivity: u8) -> ConnectivityMetrics {
    let total_pixels = mask.len();
    let total_land = mask.count_true();
    if total_land == 0 {
        return ConnectivityMetrics::empty();
    }

    let components = connected_components(mask, connectivity);
    let largest = components.iter().map(Vec::len).max().unwrap_or(0);
    ConnectivityMetrics {
        num_components: components.len(),
        largest_component_area: largest,
        total_land_pixels: total_land,
        largest_land_ratio: largest as f64 / total_land as f64,
        land_fraction: total_land as f64 / total_pixels as f64,
    }
}

/// Mean normalized land elevation: `(h − min) / (max − min)` averaged over land.
pub fn hypsometric_integral(height_m: &Grid<f32>, land_mask: &Grid<bool>) -> f64 {
    let mut h_min = f32::INFINITY;
    let mut h_max = f32::NEG_INFINITY;
    let mut count = 0usize;
    for i in 0..height_m.len() {
        if land_mask.at(i) {
            let v = height_m.at(i);
            h_min = h_min.min(v);
            h_max = h_max.max(v);
            count += 1;
        }
    }
    if count == 0 || h_max <= h_min + 1e-6 {
        return 0.0;
    }
    let scale = h_max - h_min;
    let mut sum = 0.0f64;
    for i in 0..height_m.len() {
        if land_mask.at(i) {
            sum += (((height_m.at(i) - h_min) / scale).clamp(0.0, 1.0)) as f64;
        }
    }
    sum / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mask_yields_zero_metrics() {
        let mask = Grid::filled(8, 8, false);
        let m = connected_components_metrics(&mask, 8);
        assert_eq!(m.num_components, 0);
        assert_eq!(m.land_fraction, 0.0);
    }

    #[test]
    fn diagonal_cells_join_under_8_connectivity() {
        let mut mask = Grid::filled(4, 4, false);
        mask.set(0, 0, true);
        mask.set(1, 1, true);
        assert_eq!(connected_components_metrics(&mask, 8).num_components, 1);
        assert_eq!(connected_components_metrics(&mask, 4).num_components, 2);
    }

    #[test]
    fn land_fraction_counts_pixels() {
        let mut mask = Grid::filled(10, 10, false);
        for x in 0..5 {
            mask.set(0, x, true);
        }
        let m = connected_components_metrics(&mask, 8);
        assert_eq!(m.total_land_pixels, 5);
        assert!((m.land_fraction - 0.05).abs() < 1e-12);
        assert!((m.largest_land_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hypsometric_integral_of_linear_ramp_is_half() {
        let mut h = Grid::zeros(16, 1);
        let mask = Grid::filled(16, 1, true);
        for x in 0..16 {
            h.set(0, x, x as f32);
        }
        let hi = hypsometric_integral(&h, &mask);
        assert!((hi - 0.5).abs() < 1e-6);
    }
}
