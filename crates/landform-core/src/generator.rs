//! Pipeline orchestrator: seed-rooted RNG tree in, full raster stack out.
//!
//! Stage order is fixed: land mask → tectonic scaffold → height composition →
//! hydrology → geomorph incision → detail re-addition → final clamp →
//! climate proxies. Each stage owns its outputs and borrows upstream arrays
//! read-only.

use crate::climate::{classify_biomes, compute_moisture_mask, compute_temperature_mask};
use crate::config::GeneratorConfig;
use crate::error::GenerateError;
use crate::geomorph::{apply_hierarchical_incision, GeomorphResult};
use crate::grid::Grid;
use crate::heightfield::{compose_tectonic, finalize_height, readd_detail};
use crate::hydrology::{run_hydrology, HydrologyResult};
use crate::mask::generate_land_mask;
use crate::metrics::{hypsometric_integral, ConnectivityMetrics};
use crate::rng::RngStream;
use crate::tectonics::{generate_tectonic_scaffold, TectonicsResult};

/// Primary and intermediate raster outputs of one generation run.
pub struct GenerationResult {
    /// Final clamped height in meters.
    pub height_m: Grid<f32>,
    pub h_tectonic: Grid<f32>,
    pub h_final_pre_clamp: Grid<f32>,
    pub land_mask: Grid<bool>,
    pub mask_potential: Grid<f32>,
    pub uplift: Grid<f32>,
    pub tectonic_distance_px: Grid<f32>,
    pub tectonic_noise_gain: Grid<f32>,
    pub detail_damping: Grid<f32>,
    pub moisture_mask: Grid<f32>,
    pub temperature_mask: Grid<f32>,
    pub biome_mask: Grid<u8>,
    pub hypsometric_integral_land: f64,
    pub mask_metrics: ConnectivityMetrics,
    pub tectonics: TectonicsResult,
    pub hydrology: HydrologyResult,
    pub geomorph: GeomorphResult,
}

/// Generate a deterministic continent-scale heightfield in meters.
pub fn generate(
    width: usize,
    height: usize,
    meters_per_pixel: f64,
    rng: RngStream,
    config: &GeneratorConfig,
) -> Result<GenerationResult, GenerateError> {
    if width == 0 || height == 0 || meters_per_pixel <= 0.0 {
        return Err(GenerateError::InvalidDimensions);
    }

    let mask = generate_land_mask(width, height, rng.fork("mask"), &config.mask);
    let tectonics = generate_tectonic_scaffold(
        width,
        height,
        &mask.land_mask,
        rng.fork("tectonics"),
        &config.tectonics,
    );

    let comp = compose_tectonic(&mask, &tectonics, meters_per_pixel, &config.height, rng);

    let hydrology = run_hydrology(
        &comp.h_tectonic,
        &mask.land_mask,
        meters_per_pixel,
        &config.hydrology,
        config.tectonics.shelf_radius_px,
        rng.fork("hydrology"),
    )?;

    // Moisture reads the pre-incision surface; the biome pass below reads the
    // final one.
    let moisture = compute_moisture_mask(&comp.h_tectonic, &hydrology.lake_mask, &hydrology.river_mask);

    let geomorph = apply_hierarchical_incision(
        &hydrology.h_hydro,
        &hydrology.flow_accum_raw,
        &hydrology.flow_dir,
        &mask.land_mask,
        meters_per_pixel,
        &config.geomorph,
    );

    let (h_final_pre, detail_damping) = readd_detail(
        &geomorph.h_geomorph,
        &mask.land_mask,
        &comp,
        &hydrology,
        &config.height,
        &config.hydrology,
    );
    let height_m = finalize_height(&h_final_pre, &mask.land_mask, &config.height);
    if !height_m.is_finite() {
        return Err(GenerateError::NonFinite("height_m"));
    }

    let temperature =
        compute_temperature_mask(&height_m, &mask.land_mask, config.height.max_land_height_m);
    let biomes = classify_biomes(&temperature, &moisture, &mask.land_mask);
    let hi = hypsometric_integral(&height_m, &mask.land_mask);

    Ok(GenerationResult {
        height_m,
        h_tectonic: comp.h_tectonic,
        h_final_pre_clamp: h_final_pre,
        land_mask: mask.land_mask,
        mask_potential: mask.mask_potential,
        uplift: comp.uplift_debug,
        tectonic_distance_px: comp.tectonic_distance_px,
        tectonic_noise_gain: comp.tectonic_noise_gain,
        detail_damping,
        moisture_mask: moisture,
        temperature_mask: temperature,
        biome_mask: biomes,
        hypsometric_integral_land: hi,
        mask_metrics: mask.metrics,
        tectonics,
        hydrology,
        geomorph,
    })
}
