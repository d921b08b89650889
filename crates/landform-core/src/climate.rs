//! Deterministic climate proxy fields: moisture from water distance plus
//! orographic forcing, temperature from latitude and altitude, and a
//! Whittaker-style biome classification.

use crate::filters::euclidean_distance_to;
use crate::grid::Grid;
use crate::hydrology::gaussian_smooth;

pub const BIOME_WATER: u8 = 0;
pub const BIOME_ICE: u8 = 1;
pub const BIOME_TUNDRA: u8 = 2;
pub const BIOME_BOREAL_FOREST: u8 = 3;
pub const BIOME_TEMPERATE_GRASSLAND: u8 = 4;
pub const BIOME_TEMPERATE_FOREST: u8 = 5;
pub const BIOME_TEMPERATE_RAIN_FOREST: u8 = 6;
pub const BIOME_HOT_DESERT: u8 = 7;
pub const BIOME_SAVANNA: u8 = 8;
pub const BIOME_TROPICAL_SEASONAL_FOREST: u8 = 9;
pub const BIOME_TROPICAL_RAIN_FOREST: u8 = 10;

/// Normalized moisture from ocean/fresh-water proximity and a west-wind
/// orographic modifier.
pub fn compute_moisture_mask(
    height_m: &Grid<f32>,
    lake_mask: &Grid<bool>,
    river_mask: &Grid<f32>,
) -> Grid<f32> {
    let (w, h) = (height_m.width(), height_m.height());
    let ocean = height_m.map(|v| v <= 0.0);
    let mut fresh = Grid::filled(w, h, false);
    for i in 0..fresh.len() {
        fresh.put(i, river_mask.at(i) > 0.0 || lake_mask.at(i));
    }

    let dist_ocean = euclidean_distance_to(&ocean);
    let dist_fresh = if fresh.any() {
        euclidean_distance_to(&fresh)
    } else {
        Grid::filled(w, h, f32::MAX / 4.0)
    };

    let mut moisture = Grid::zeros(w, h);
    for y in 0..h {
        for x in 0..w {
            let ambient = (-dist_ocean.get(y, x) / 150.0)
                .exp()
                .max((-dist_fresh.get(y, x) / 5.0).exp());
            // West wind: windward (east-rising) slopes gain, lee slopes lose.
            let xm = x.saturating_sub(1);
            let xp = (x + 1).min(w - 1);
            let dx = (height_m.get(y, xp) - height_m.get(y, xm)) / (xp - xm).max(1) as f32;
            let orographic = (dx / 50.0).clamp(-0.8, 0.4);
            moisture.set(y, x, ambient + orographic);
        }
    }
    gaussian_smooth(&moisture, 2.0).map(|v| v.clamp(0.0, 1.0))
}

/// Normalized temperature from latitude and altitude penalties.
pub fn compute_temperature_mask(
    height_m: &Grid<f32>,
    land_mask: &Grid<bool>,
    max_land_height_m: f32,
) -> Grid<f32> {
    let (w, h) = (height_m.width(), height_m.height());
    let eq_y = 0.5 * (h as f32 - 1.0);
    let lat_weight = 0.72f32;
    let alt_weight = 0.55f32;

    let mut out = Grid::zeros(w, h);
    for y in 0..h {
        let lat_penalty = (y as f32 - eq_y).abs() / eq_y.max(1e-6);
        for x in 0..w {
            if !land_mask.get(y, x) {
                continue;
            }
            let alt_penalty =
                (height_m.get(y, x).max(0.0) / max_land_height_m.max(1e-6)).clamp(0.0, 1.0);
            let t = 1.0 - (lat_weight * lat_penalty + alt_weight * alt_penalty);
            out.set(y, x, t.clamp(0.0, 1.0));
        }
    }
    out
}

/// Whittaker-inspired discrete biome ids from temperature × moisture.
pub fn classify_biomes(
    temperature: &Grid<f32>,
    moisture: &Grid<f32>,
    land_mask: &Grid<bool>,
) -> Grid<u8> {
    let mut out = Grid::filled(temperature.width(), temperature.height(), BIOME_WATER);
    for i in 0..out.len() {
        if !land_mask.at(i) {
            continue;
        }
        let t = temperature.at(i).clamp(0.0, 1.0);
        let m = moisture.at(i).clamp(0.0, 1.0);
        let biome = if t < 0.10 {
            BIOME_ICE
        } else if t < 0.24 {
            if m < 0.45 {
                BIOME_TUNDRA
            } else {
                BIOME_BOREAL_FOREST
            }
        } else if t < 0.58 {
            if m < 0.22 {
                BIOME_TEMPERATE_GRASSLAND
            } else if m < 0.55 {
                BIOME_TEMPERATE_FOREST
            } else {
                BIOME_TEMPERATE_RAIN_FOREST
            }
        } else if m < 0.16 {
            BIOME_HOT_DESERT
        } else if m < 0.42 {
            BIOME_SAVANNA
        } else if m < 0.70 {
            BIOME_TROPICAL_SEASONAL_FOREST
        } else {
            BIOME_TROPICAL_RAIN_FOREST
        };
        out.put(i, biome);
    }
    out
}
