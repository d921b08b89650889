//! Configuration groups for the generation pipeline.
//!
//! Every field is serialized verbatim into `deterministic_meta.json`, so
//! renaming a field (or changing a default) changes the persisted contract.

use serde::{Deserialize, Serialize};

pub const DEFAULT_WIDTH: usize = 2048;
pub const DEFAULT_HEIGHT: usize = 1024;
pub const DEFAULT_MPP: f64 = 5000.0;

/// Land-mask builder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskConfig {
    /// 0–1; pushes toward more, smaller landmasses.
    pub fragmentation: f32,
    pub base_octaves: u32,
    pub warp_octaves: u32,
    pub warp_strength_px: f32,
    pub coast_bias_strength: f32,
    pub target_land_fraction: f32,
    pub min_land_fraction: f32,
    pub max_land_fraction: f32,
    /// Largest connected component must hold at least this share of land.
    pub dominant_land_ratio: f32,
    pub smooth_iterations: u32,
    pub threshold_relaxation: f32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            fragmentation: 0.2,
            base_octaves: 5,
            warp_octaves: 4,
            warp_strength_px: 48.0,
            coast_bias_strength: 0.34,
            target_land_fraction: 0.34,
            min_land_fraction: 0.22,
            max_land_fraction: 0.48,
            dominant_land_ratio: 0.55,
            smooth_iterations: 2,
            threshold_relaxation: 0.015,
        }
    }
}

/// Plate scaffold parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TectonicsConfig {
    pub min_plate_count: u32,
    pub max_plate_count: u32,
    /// Minimum site separation in the unit square.
    pub site_min_distance: f32,
    pub plate_warp_strength_px: f32,
    pub tangent_warp_fraction: f32,
    pub normal_warp_fraction: f32,
    /// Below this inter-plate clearance the high-frequency warp is scaled back.
    pub min_lithosphere_thickness_px: f32,
    pub curvature_limit: f32,
    /// θ for the relative-motion projection onto the boundary normal.
    pub boundary_convergence_threshold: f32,
    pub deformation_max_radius_px: usize,
    pub orogeny_sigma_px: f32,
    pub rift_sigma_px: f32,
    pub transform_sigma_px: f32,
    pub collision_softmax_temperature: f32,
    pub triple_junction_boost: f32,
    pub stress_sigma_px: f32,
    pub crust_blend_sigma_px: f32,
    pub shelf_radius_px: usize,
    pub shelf_power: f32,
    pub interior_basin_threshold: f32,
}

impl Default for TectonicsConfig {
    fn default() -> Self {
        Self {
            min_plate_count: 6,
            max_plate_count: 12,
            site_min_distance: 0.22,
            plate_warp_strength_px: 42.0,
            tangent_warp_fraction: 0.55,
            normal_warp_fraction: 0.30,
            min_lithosphere_thickness_px: 6.0,
            curvature_limit: 0.35,
            boundary_convergence_threshold: 0.35,
            deformation_max_radius_px: 96,
            orogeny_sigma_px: 26.0,
            rift_sigma_px: 18.0,
            transform_sigma_px: 12.0,
            collision_softmax_temperature: 0.45,
            triple_junction_boost: 0.6,
            stress_sigma_px: 40.0,
            crust_blend_sigma_px: 30.0,
            shelf_radius_px: 24,
            shelf_power: 0.7,
            interior_basin_threshold: 0.55,
        }
    }
}

/// Heightfield composition parameters (meters unless stated otherwise).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightConfig {
    pub base_land_lift_m: f32,
    pub continentality_height_m: f32,
    pub ridge_height_m: f32,
    pub crust_height_m: f32,
    pub basin_height_m: f32,
    pub stress_uplift_m: f32,
    pub orogeny_strength_m: f32,
    pub transform_strength_m: f32,
    pub rift_strength_m: f32,
    pub interior_basin_strength_m: f32,
    pub collision_damping: f32,
    pub ocean_depth_m: f32,
    pub max_ocean_depth_m: f32,
    pub max_land_height_m: f32,
    pub min_land_height_m: f32,
    pub shelf_depth_power: f32,
    pub ocean_shelf_blend: f32,
    pub detail_land_m: f32,
    pub tectonic_detail_m: f32,
    pub craton_detail_reduction: f32,
    pub uplift_warp_strength_px: f32,
    pub detail_flow_threshold_cells: f32,
    pub detail_flow_damp_strength: f32,
    pub detail_flow_damp_curve: f32,
}

impl Default for HeightConfig {
    fn default() -> Self {
        Self {
            base_land_lift_m: 80.0,
            continentality_height_m: 420.0,
            ridge_height_m: 520.0,
            crust_height_m: 900.0,
            basin_height_m: 260.0,
            stress_uplift_m: 340.0,
            orogeny_strength_m: 2600.0,
            transform_strength_m: 420.0,
            rift_strength_m: 700.0,
            interior_basin_strength_m: 380.0,
            collision_damping: 0.28,
            ocean_depth_m: 3800.0,
            max_ocean_depth_m: 6000.0,
            max_land_height_m: 8848.0,
            min_land_height_m: 1.0,
            shelf_depth_power: 1.6,
            ocean_shelf_blend: 0.55,
            detail_land_m: 140.0,
            tectonic_detail_m: 90.0,
            craton_detail_reduction: 0.5,
            uplift_warp_strength_px: 36.0,
            detail_flow_threshold_cells: 12.0,
            detail_flow_damp_strength: 0.85,
            detail_flow_damp_curve: 0.8,
        }
    }
}

/// Hydrology parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrologyConfig {
    pub hydro_smooth_sigma_px: f32,
    pub depression_fill_enabled: bool,
    /// ε monotone rise applied while flooding flats.
    pub depression_flat_epsilon_m: f32,
    pub depression_breach_enabled: bool,
    pub depression_breach_max_saddle_m: f32,
    /// Meander-sculpt droplet population. The defaults are part of the
    /// determinism contract; they are tuned, not physical.
    pub sculpt_droplet_count: usize,
    pub sculpt_steps: usize,
    pub sculpt_carve_m: f32,
    /// 0–1; damps capture aggressiveness toward lake preservation.
    pub hydro_lakes: f32,
    pub hydro_capture_strength: f32,
    pub hydro_capture_max_sill: f32,
    pub hydro_capture_min_basin_pixels: usize,
    pub hydro_capture_max_link_length_px: usize,
    pub hydro_outlet_merge_radius_px: usize,
    pub hydro_outlet_min_basin_pixels: usize,
    pub river_frequency: f32,
    pub river_accum_threshold_base: f32,
    pub river_max_width_px: f32,
    pub river_width_power: f32,
    pub river_max_incision_m: f32,
    pub trunk_sinuosity_min_flow_cells: f32,
    pub breach_search_radius_px: usize,
    pub breach_slope_bias: f32,
    pub lake_encouragement: f32,
    pub shore_falloff_strength_m: f32,
    pub shore_falloff_power: f32,
}

impl Default for HydrologyConfig {
    fn default() -> Self {
        Self {
            hydro_smooth_sigma_px: 1.6,
            depression_fill_enabled: true,
            depression_flat_epsilon_m: 0.05,
            depression_breach_enabled: true,
            depression_breach_max_saddle_m: 4.0,
            sculpt_droplet_count: 50_000,
            sculpt_steps: 500,
            sculpt_carve_m: 0.02,
            hydro_lakes: 0.35,
            hydro_capture_strength: 0.55,
            hydro_capture_max_sill: 45.0,
            hydro_capture_min_basin_pixels: 96,
            hydro_capture_max_link_length_px: 64,
            hydro_outlet_merge_radius_px: 24,
            hydro_outlet_min_basin_pixels: 180,
            river_frequency: 0.5,
            river_accum_threshold_base: 0.015,
            river_max_width_px: 6.0,
            river_width_power: 0.85,
            river_max_incision_m: 22.0,
            trunk_sinuosity_min_flow_cells: 300.0,
            breach_search_radius_px: 24,
            breach_slope_bias: 1.5,
            lake_encouragement: 0.35,
            shore_falloff_strength_m: 35.0,
            shore_falloff_power: 1.4,
        }
    }
}

/// Hierarchical stream-power incision parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeomorphConfig {
    /// Minimum normalized accumulation for a cell to receive stream power.
    pub a_min: f32,
    pub incision_m: f32,
    pub incision_n: f32,
    pub use_physical_stream_power: bool,
    pub power_scale_percentile: f32,
    pub ridge_preserve: f32,
    pub valley_blur_sigma_px: f32,
    pub max_depth_m: f32,
    pub incision_strength: f32,
}

impl Default for GeomorphConfig {
    fn default() -> Self {
        Self {
            a_min: 0.004,
            incision_m: 0.5,
            incision_n: 1.0,
            use_physical_stream_power: true,
            power_scale_percentile: 99.9,
            ridge_preserve: 0.35,
            valley_blur_sigma_px: 1.8,
            max_depth_m: 260.0,
            incision_strength: 0.0028,
        }
    }
}

/// Derived raster rendering parameters (consumed by the CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub hillshade_azimuth_deg: f32,
    pub hillshade_altitude_deg: f32,
    pub hillshade_vertical_exaggeration: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            hillshade_azimuth_deg: 315.0,
            hillshade_altitude_deg: 45.0,
            hillshade_vertical_exaggeration: 1.0,
        }
    }
}

/// Primary generation configuration: one group per pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub mask: MaskConfig,
    pub tectonics: TectonicsConfig,
    pub height: HeightConfig,
    pub hydrology: HydrologyConfig,
    pub geomorph: GeomorphConfig,
    pub render: RenderConfig,
}
