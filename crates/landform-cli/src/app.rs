//! CLI argument surface and the generation-run driver.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::info;
use serde_json::json;

use landform_core::config::{DEFAULT_HEIGHT, DEFAULT_MPP, DEFAULT_WIDTH};
use landform_core::{generate, parse_seed, GenerationResult, GeneratorConfig, Grid, RngStream};

use crate::derive;
use crate::io;

#[derive(Parser, Debug, Clone)]
#[command(name = "landform", about = "Deterministic continent-scale terrain generator")]
pub struct Args {
    /// Readable seed in adjective+noun form (e.g. MistyForge).
    #[arg(long)]
    pub seed: String,

    /// Output root directory.
    #[arg(long, default_value = "out")]
    pub out: PathBuf,

    /// Output width in pixels.
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub w: usize,

    /// Output height in pixels.
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub h: usize,

    /// Meters per pixel.
    #[arg(long, default_value_t = DEFAULT_MPP)]
    pub mpp: f64,

    /// Overwrite files in an existing output directory.
    #[arg(long)]
    pub overwrite: bool,

    /// Write metadata JSON files (on by default; see --no-json).
    #[arg(long, overrides_with = "no_json")]
    pub json: bool,

    /// Skip metadata JSON files.
    #[arg(long)]
    pub no_json: bool,

    /// Debug raster tier: 0 primary outputs only, 1 adds hydrology rasters,
    /// 2 adds tectonics/climate rasters.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2), default_value_t = 1)]
    pub debug_tier: u8,
}

impl Args {
    pub fn json_enabled(&self) -> bool {
        self.json || !self.no_json
    }
}

/// CLI failure modes: user errors exit 2, everything else exits 1.
#[derive(Debug)]
pub enum AppError {
    User(String),
    Fatal(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Fatal(err)
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub out_dir: PathBuf,
    pub land_fraction: f64,
    pub largest_land_ratio: f64,
    pub generation_seconds: f64,
}

/// Run one generation with the default configuration.
pub fn run(args: &Args) -> Result<RunSummary, AppError> {
    run_with_config(args, &GeneratorConfig::default())
}

/// Run one generation with an explicit configuration (tests use trimmed
/// droplet populations).
pub fn run_with_config(args: &Args, config: &GeneratorConfig) -> Result<RunSummary, AppError> {
    if args.w == 0 || args.h == 0 || args.mpp <= 0.0 {
        return Err(AppError::User(
            "width, height, and --mpp must be positive".to_string(),
        ));
    }
    let parsed = parse_seed(&args.seed).map_err(|e| AppError::User(e.to_string()))?;

    info!("generating {}x{} for seed {}", args.w, args.h, parsed.canonical);
    let generation_start = Instant::now();
    let result = generate(
        args.w,
        args.h,
        args.mpp,
        RngStream::new(parsed.seed_hash),
        config,
    )
    .map_err(|e| AppError::Fatal(e.into()))?;
    let generation_seconds = generation_start.elapsed().as_secs_f64();
    info!("generation finished in {generation_seconds:.3}s");

    let staging = io::OutputStaging::prepare(&args.out, &parsed.canonical, args.w, args.h, args.overwrite)
        .map_err(|e| {
            if e.to_string().contains("--overwrite") {
                AppError::User(e.to_string())
            } else {
                AppError::Fatal(e)
            }
        })?;

    write_outputs(staging.dir(), args, config, &result)?;

    if args.json_enabled() {
        let deterministic = deterministic_meta(args, config, &parsed.canonical, parsed.seed_hash, &result);
        io::write_json(&staging.dir().join("deterministic_meta.json"), &deterministic)?;

        let mut meta = deterministic;
        let extra = json!({
            "original_seed": parsed.original,
            "generated_at_utc": chrono::Utc::now().to_rfc3339(),
            "generation_seconds": generation_seconds,
            "incision_seconds": result.geomorph.incision_seconds,
            "generator_version": env!("CARGO_PKG_VERSION"),
            "platform_os": std::env::consts::OS,
            "platform_arch": std::env::consts::ARCH,
        });
        merge_objects(&mut meta, extra);
        io::write_json(&staging.dir().join("meta.json"), &meta)?;
    }

    let out_dir = staging.commit()?;
    Ok(RunSummary {
        out_dir,
        land_fraction: result.mask_metrics.land_fraction,
        largest_land_ratio: result.mask_metrics.largest_land_ratio,
        generation_seconds,
    })
}

fn merge_objects(base: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(base_map), serde_json::Value::Object(extra_map)) = (base.as_object_mut(), extra) {
        for (k, v) in extra_map {
            base_map.insert(k, v);
        }
    }
}

fn deterministic_meta(
    args: &Args,
    config: &GeneratorConfig,
    canonical: &str,
    seed_hash: u64,
    result: &GenerationResult,
) -> serde_json::Value {
    json!({
        "canonical_seed": canonical,
        "width": args.w,
        "height": args.h,
        "meters_per_pixel": args.mpp,
        "seed_hash": seed_hash,
        "config": serde_json::to_value(config).expect("config serializes"),
        "metrics": {
            "num_components": result.mask_metrics.num_components,
            "largest_component_area": result.mask_metrics.largest_component_area,
            "total_land_pixels": result.mask_metrics.total_land_pixels,
            "largest_land_ratio": result.mask_metrics.largest_land_ratio,
            "land_fraction": result.mask_metrics.land_fraction,
            "hypsometric_integral_land": result.hypsometric_integral_land,
        },
        "tectonics": {
            "plate_count": result.tectonics.plate_count,
            "boundary_pixels": result.tectonics.boundary_pixels(),
            "mean_lithosphere_thickness_px": result.tectonics.mean_lithosphere_thickness_px,
        },
        "hydrology": serde_json::to_value(&result.hydrology.metrics).expect("metrics serialize"),
        "geomorph": serde_json::to_value(result.geomorph.metrics).expect("metrics serialize"),
    })
}

fn write_outputs(
    dir: &std::path::Path,
    args: &Args,
    config: &GeneratorConfig,
    r: &GenerationResult,
) -> Result<(), AppError> {
    let render = &config.render;
    let shade = derive::hillshade(
        &r.height_m,
        args.mpp,
        render.hillshade_azimuth_deg,
        render.hillshade_altitude_deg,
        render.hillshade_vertical_exaggeration,
    );

    // ── Tier 0: primary artifacts ────────────────────────────────────────────
    io::write_height_npy(&dir.join("height.npy"), &r.height_m)?;
    io::write_png_u16(&dir.join("height_16.png"), &derive::height_preview_u16(&r.height_m, 1.0, 99.0))?;
    io::write_png_u8(&dir.join("hillshade.png"), &shade)?;
    io::write_png_u8(&dir.join("land_mask.png"), &derive::mask_u8(&r.land_mask))?;
    if args.debug_tier < 1 {
        return Ok(());
    }

    // ── Tier 1: hydrology & composition rasters ──────────────────────────────
    let preview = |g: &Grid<f32>| derive::float_preview_u8(g, 1.0, 99.0);
    let full = |g: &Grid<f32>| derive::float_preview_u8(g, 0.0, 100.0);
    let hydro = &r.hydrology;

    io::write_png_u8(&dir.join("debug_mask_potential.png"), &preview(&r.mask_potential))?;
    io::write_png_u8(&dir.join("debug_uplift.png"), &preview(&r.uplift))?;
    io::write_png_u8(&dir.join("debug_h_hydro_pre.png"), &preview(&hydro.h_hydro_pre))?;
    io::write_png_u8(&dir.join("debug_h_hydro_post.png"), &preview(&hydro.h_hydro))?;
    io::write_png_u8(&dir.join("debug_capture_paths.png"), &derive::mask_u8(&hydro.capture_paths_mask))?;
    io::write_png_u8(&dir.join("debug_basin_id.png"), &derive::basin_id_u8(&hydro.basin_id_map))?;
    io::write_png_u8(&dir.join("debug_basin_sizes.png"), &full(&hydro.basin_size_map))?;
    io::write_png_u8(&dir.join("debug_outlets.png"), &outlet_raster(hydro))?;
    io::write_png_u8(&dir.join("debug_endorheic_mask.png"), &derive::mask_u8(&hydro.endorheic_mask))?;
    io::write_png_u8(&dir.join("debug_flow_accum_log.png"), &full(&hydro.flow_accum_norm))?;
    io::write_png_u8(&dir.join("debug_flow_dir.png"), &derive::flow_dir_u8(&hydro.flow_dir))?;
    io::write_png_u8(
        &dir.join("debug_river_mask.png"),
        &hydro.river_mask.map(|v| if v > 0.0 { 255u8 } else { 0 }),
    )?;
    io::write_png_u8(&dir.join("debug_h_geomorph.png"), &preview(&r.geomorph.h_geomorph))?;
    io::write_png_u8(&dir.join("debug_incision.png"), &full(&r.geomorph.incision_depth_m))?;
    io::write_png_u8(
        &dir.join("debug_composite.png"),
        &derive::composite_u8(&shade, &r.land_mask, &hydro.river_mask, &hydro.lake_mask),
    )?;
    if args.debug_tier < 2 {
        return Ok(());
    }

    // ── Tier 2: tectonics & climate rasters ──────────────────────────────────
    let tect = &r.tectonics;
    io::write_png_u8(&dir.join("debug_plates.png"), &derive::plate_ids_u8(&tect.raw_plate_ids, tect.plate_count))?;
    io::write_png_u8(
        &dir.join("debug_warped_plate_ids.png"),
        &derive::plate_ids_u8(&tect.plate_ids, tect.plate_count),
    )?;
    io::write_png_u8(&dir.join("debug_boundary_warp_map.png"), &full(&tect.boundary_warp_magnitude))?;
    io::write_png_u8(&dir.join("debug_boundary_type.png"), &derive::boundary_type_u8(&tect.boundary_type))?;
    io::write_png_u8(&dir.join("debug_convergence.png"), &derive::signed_preview_u8(&tect.convergence_field, 1.0))?;
    io::write_png_u8(&dir.join("debug_orogeny.png"), &full(&tect.orogeny_field))?;
    io::write_png_u8(&dir.join("debug_rift.png"), &full(&tect.rift_field))?;
    io::write_png_u8(&dir.join("debug_transform.png"), &full(&tect.transform_field))?;
    io::write_png_u8(&dir.join("debug_crust.png"), &full(&tect.base_crust_field))?;
    io::write_png_u8(&dir.join("debug_stress.png"), &full(&tect.stress_field))?;
    io::write_png_u8(&dir.join("debug_lake_mask.png"), &derive::mask_u8(&hydro.lake_mask))?;
    io::write_png_u8(&dir.join("debug_lake_sizes.png"), &full(&hydro.lake_size_map))?;
    io::write_png_u8(&dir.join("debug_incision_raw.png"), &full(&r.geomorph.incision_raw))?;
    io::write_png_u8(&dir.join("debug_incision_blurred.png"), &full(&r.geomorph.incision_blurred))?;
    io::write_png_u8(
        &dir.join("debug_power_raw_log.png"),
        &full(&r.geomorph.power_raw.map(|v| v.max(0.0).ln_1p())),
    )?;
    io::write_png_u8(&dir.join("debug_detail_damping.png"), &full(&r.detail_damping))?;
    io::write_png_u8(&dir.join("debug_tectonic_distance.png"), &full(&r.tectonic_distance_px))?;
    io::write_png_u8(&dir.join("debug_moisture.png"), &full(&r.moisture_mask))?;
    io::write_png_u8(&dir.join("debug_temperature.png"), &full(&r.temperature_mask))?;
    io::write_png_rgb(
        &dir.join("debug_biomes.png"),
        r.biome_mask.width(),
        r.biome_mask.height(),
        &derive::biome_rgb(&r.biome_mask),
    )?;
    Ok(())
}

/// Merged outlet centroids as 3×3 white dots.
fn outlet_raster(hydro: &landform_core::hydrology::HydrologyResult) -> Grid<u8> {
    let mut out = Grid::filled(hydro.flow_dir.width(), hydro.flow_dir.height(), 0u8);
    for p in &hydro.outlet_points {
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                if let Some((ny, nx)) = out.neighbor(p.y, p.x, dy, dx) {
                    out.set(ny, nx, 255);
                }
            }
        }
    }
    out
}
