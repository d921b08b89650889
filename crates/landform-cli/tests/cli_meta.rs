//! End-to-end CLI flow: output layout, metadata split, overwrite semantics.

use std::fs;
use std::path::Path;

use landform_cli::{run_with_config, Args};
use landform_core::GeneratorConfig;
use tempfile::TempDir;

fn test_args(out: &Path, overwrite: bool, debug_tier: u8) -> Args {
    Args {
        seed: "MistyForge".to_string(),
        out: out.to_path_buf(),
        w: 96,
        h: 64,
        mpp: 5000.0,
        overwrite,
        json: false,
        no_json: false,
        debug_tier,
    }
}

/// Default config with the droplet population trimmed for test runtime.
fn test_config() -> GeneratorConfig {
    let mut cfg = GeneratorConfig::default();
    cfg.hydrology.sculpt_droplet_count = 2_000;
    cfg.hydrology.sculpt_steps = 60;
    cfg
}

#[test]
fn runtime_fields_only_in_meta_json() {
    let tmp = TempDir::new().unwrap();
    let args = test_args(tmp.path(), true, 1);
    run_with_config(&args, &test_config()).unwrap();

    let base = tmp.path().join("mistyforge").join("96x64");
    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(base.join("meta.json")).unwrap()).unwrap();
    let deterministic: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(base.join("deterministic_meta.json")).unwrap())
            .unwrap();

    assert!(meta["generation_seconds"].as_f64().unwrap() >= 0.0);
    assert!(meta["incision_seconds"].as_f64().unwrap() >= 0.0);
    assert!(meta.get("generated_at_utc").is_some());

    assert!(deterministic.get("generation_seconds").is_none());
    assert!(deterministic.get("incision_seconds").is_none());
    assert!(deterministic.get("generated_at_utc").is_none());

    let metrics = &deterministic["metrics"];
    for key in [
        "num_components",
        "largest_component_area",
        "total_land_pixels",
        "largest_land_ratio",
        "land_fraction",
        "hypsometric_integral_land",
    ] {
        assert!(metrics.get(key).is_some(), "metrics missing {key}");
    }

    let tect = &deterministic["tectonics"];
    for key in ["plate_count", "boundary_pixels", "mean_lithosphere_thickness_px"] {
        assert!(tect.get(key).is_some(), "tectonics missing {key}");
    }

    let hydro = &deterministic["hydrology"];
    for key in [
        "river_pixel_count",
        "lake_pixel_count",
        "max_flow_accum",
        "mean_flow_accum",
        "flow_accum_p50",
        "flow_accum_p90",
        "flow_accum_p99",
        "flow_accum_p999",
        "flow_cells_ge_10",
        "flow_cells_ge_100",
        "flow_cells_ge_1000",
        "basin_count_total",
        "basin_count_retained",
        "lake_area_fraction",
        "mean_lake_area",
        "largest_lake_area",
        "num_ocean_outlets_raw",
        "num_ocean_outlets_merged",
        "largest_basin_land_ratio",
        "top_10_basin_sizes",
        "endorheic_land_ratio",
        "num_endorheic_basins",
        "regional_endorheic_count_gt_10000km2",
        "continental_basin_count_gt_1pct_land",
        "tiny_endorheic_basin_count_lt_10000km2",
        "tiny_endorheic_area_ratio_lt_10000km2",
        "trunk_sinuosity_segment_count",
        "trunk_sinuosity_median",
        "trunk_sinuosity_p90",
    ] {
        assert!(hydro.get(key).is_some(), "hydrology missing {key}");
    }

    let geo = &deterministic["geomorph"];
    for key in [
        "max_incision_depth_m",
        "mean_incision_depth_m",
        "mean_incision_depth_incised_m",
        "percent_land_incised",
        "power_scale_value",
    ] {
        assert!(geo.get(key).is_some(), "geomorph missing {key}");
    }

    // Full config is persisted verbatim.
    let config = &deterministic["config"];
    for group in ["mask", "tectonics", "height", "hydrology", "geomorph", "render"] {
        assert!(config.get(group).is_some(), "config missing {group}");
    }

    for name in [
        "height.npy",
        "height_16.png",
        "hillshade.png",
        "land_mask.png",
        "debug_h_hydro_pre.png",
        "debug_h_hydro_post.png",
        "debug_capture_paths.png",
        "debug_basin_id.png",
        "debug_basin_sizes.png",
        "debug_outlets.png",
        "debug_endorheic_mask.png",
        "debug_flow_accum_log.png",
        "debug_flow_dir.png",
        "debug_river_mask.png",
        "debug_h_geomorph.png",
        "debug_incision.png",
        "debug_composite.png",
    ] {
        assert!(base.join(name).exists(), "missing {name}");
    }

    // Tier-2-only rasters are absent at the default tier.
    for name in [
        "debug_plates.png",
        "debug_lake_mask.png",
        "debug_lake_sizes.png",
        "debug_incision_raw.png",
        "debug_incision_blurred.png",
        "debug_power_raw_log.png",
        "debug_detail_damping.png",
        "debug_tectonic_distance.png",
    ] {
        assert!(!base.join(name).exists(), "unexpected {name}");
    }
}

#[test]
fn overwrite_cleans_stale_outputs() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();

    run_with_config(&test_args(tmp.path(), true, 2), &cfg).unwrap();
    let base = tmp.path().join("mistyforge").join("96x64");
    assert!(base.join("debug_plates.png").exists());

    run_with_config(&test_args(tmp.path(), true, 0), &cfg).unwrap();
    assert!(!base.join("debug_plates.png").exists());
    assert!(base.join("height.npy").exists());
    assert!(!base.join("debug_river_mask.png").exists());
}

#[test]
fn existing_output_requires_overwrite_flag() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    run_with_config(&test_args(tmp.path(), false, 0), &cfg).unwrap();

    let err = run_with_config(&test_args(tmp.path(), false, 0), &cfg).unwrap_err();
    match err {
        landform_cli::AppError::User(message) => assert!(message.contains("--overwrite")),
        other => panic!("expected user error, got {other:?}"),
    }
}

#[test]
fn height_npy_roundtrips_bit_exact() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config();
    run_with_config(&test_args(tmp.path(), true, 0), &cfg).unwrap();

    let base = tmp.path().join("mistyforge").join("96x64");
    let grid = landform_cli::io::read_height_npy(&base.join("height.npy")).unwrap();
    assert_eq!(grid.width(), 96);
    assert_eq!(grid.height(), 64);
    assert!(grid.data().iter().all(|v| v.is_finite()));

    // Same seed, same config: byte-identical file on disk.
    let first = fs::read(base.join("height.npy")).unwrap();
    run_with_config(&test_args(tmp.path(), true, 0), &cfg).unwrap();
    let second = fs::read(base.join("height.npy")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn bad_seed_is_a_user_error_with_examples() {
    let tmp = TempDir::new().unwrap();
    let mut args = test_args(tmp.path(), true, 0);
    args.seed = "misty-forge".to_string();
    let err = run_with_config(&args, &test_config()).unwrap_err();
    match err {
        landform_cli::AppError::User(message) => {
            assert!(message.contains("Examples:"));
            assert!(message.contains("MistyForge"));
        }
        other => panic!("expected user error, got {other:?}"),
    }
}

#[test]
fn no_json_skips_metadata_files() {
    let tmp = TempDir::new().unwrap();
    let mut args = test_args(tmp.path(), true, 0);
    args.no_json = true;
    run_with_config(&args, &test_config()).unwrap();
    let base = tmp.path().join("mistyforge").join("96x64");
    assert!(base.join("height.npy").exists());
    assert!(!base.join("meta.json").exists());
    assert!(!base.join("deterministic_meta.json").exists());
}
