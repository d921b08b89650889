//! Plate-proxy tectonic scaffold: Voronoi partition, warped boundaries,
//! boundary classification, deformation envelopes, and crust/stress fields.

pub mod boundaries;
pub mod crust;
pub mod sites;
pub mod warp;

pub use boundaries::BoundaryType;

use crate::config::TectonicsConfig;
use crate::grid::Grid;
use crate::rng::RngStream;
use boundaries::{classify_boundaries, deformation_envelopes};
use crust::{crust_field, interior_basin_field, shelf_proximity, stress_field};
use sites::{sample_plate_ages, sample_plate_count, sample_plate_motion, sample_plate_sites};
use warp::warp_partition;

/// Generated tectonic fields for height composition and debugging.
pub struct TectonicsResult {
    pub plate_count: usize,
    /// Unwarped Voronoi partition (debug surface).
    pub raw_plate_ids: Grid<i16>,
    /// Partition after the coarse warp, before the tangent warp.
    pub warped_plate_ids: Grid<i16>,
    /// Final partition used by every downstream stage.
    pub plate_ids: Grid<i16>,
    pub plate_sites: Vec<[f32; 2]>,
    pub plate_motion: Vec<[f32; 2]>,
    pub plate_ages: Vec<f32>,
    pub plate_age_map: Grid<f32>,
    pub boundary_mask: Grid<bool>,
    /// 0 = none, 1 = convergent, 2 = divergent, 3 = transform.
    pub boundary_type: Grid<i8>,
    pub boundary_warp_magnitude: Grid<f32>,
    pub convergence_field: Grid<f32>,
    pub orogeny_field: Grid<f32>,
    pub rift_field: Grid<f32>,
    pub transform_field: Grid<f32>,
    pub collision_buffer: Grid<f32>,
    pub stress_field: Grid<f32>,
    pub base_crust_field: Grid<f32>,
    pub shelf_proximity: Grid<f32>,
    pub interior_basin_field: Grid<f32>,
    pub lithosphere_thickness_px: Grid<f32>,
    pub mean_lithosphere_thickness_px: f64,
}

impl TectonicsResult {
    pub fn boundary_pixels(&self) -> usize {
        self.boundary_mask.count_true()
    }
}

/// Generate the deterministic plate partition and tectonic intensity fields.
pub fn generate_tectonic_scaffold(
    width: usize,
    height: usize,
    land_mask: &Grid<bool>,
    rng: RngStream,
    cfg: &TectonicsConfig,
) -> TectonicsResult {
    assert!(width > 0 && height > 0, "width and height must be positive");
    assert!(
        land_mask.width() == width && land_mask.height() == height,
        "land_mask shape must match (height, width)"
    );

    let plate_count = sample_plate_count(rng.fork("tectonics_plate_count"), cfg);
    let plate_sites = sample_plate_sites(
        rng.fork("tectonics_plate_sites"),
        plate_count,
        cfg.site_min_distance,
    );
    let plate_motion = sample_plate_motion(rng.fork("tectonics_plate_motion"), plate_count);
    let plate_ages = sample_plate_ages(rng.fork("tectonics_plate_age"), plate_count);

    // Unwarped partition kept as a debug surface.
    let mut raw_plate_ids = Grid::filled(width, height, 0i16);
    for y in 0..height {
        for x in 0..width {
            let ux = (x as f32 + 0.5) / width as f32;
            let uy = (y as f32 + 0.5) / height as f32;
            let mut best = (0usize, f32::INFINITY);
            for (idx, s) in plate_sites.iter().enumerate() {
                let dx = ux - s[0];
                let dy = uy - s[1];
                let d2 = dx * dx + dy * dy;
                if d2 < best.1 {
                    best = (idx, d2);
                }
            }
            raw_plate_ids.set(y, x, best.0 as i16);
        }
    }

    let partition = warp_partition(width, height, &plate_sites, rng, cfg);
    let classification = classify_boundaries(
        &partition.plate_ids,
        &plate_motion,
        cfg.boundary_convergence_threshold,
    );
    let envelopes = deformation_envelopes(
        &classification,
        &partition.plate_ids,
        &partition.curvature,
        rng,
        cfg,
    );

    let base_crust = crust_field(
        &partition.plate_ids,
        plate_count,
        &plate_ages,
        &classification.boundary_mask,
        cfg,
    );
    let stress = stress_field(
        &partition.plate_ids,
        plate_count,
        &classification.boundary_type,
        &plate_sites,
        &plate_ages,
        cfg,
    );
    let shelf = shelf_proximity(land_mask, cfg);
    let interior_basin = interior_basin_field(&classification.boundary_mask, rng, cfg);
    let plate_age_map = partition.plate_ids.map(|id| plate_ages[id as usize]);

    let lith = &partition.lithosphere_thickness_px;
    let mean_lith = lith.data().iter().map(|&v| v as f64).sum::<f64>() / lith.len() as f64;

    TectonicsResult {
        plate_count,
        raw_plate_ids,
        warped_plate_ids: partition.coarse_plate_ids,
        plate_ids: partition.plate_ids,
        plate_sites,
        plate_motion,
        plate_ages,
        plate_age_map,
        boundary_mask: classification.boundary_mask,
        boundary_type: classification.boundary_type,
        boundary_warp_magnitude: partition.warp_magnitude,
        convergence_field: classification.convergence,
        orogeny_field: envelopes.orogeny,
        rift_field: envelopes.rift,
        transform_field: envelopes.transform,
        collision_buffer: envelopes.collision_buffer,
        stress_field: stress,
        base_crust_field: base_crust,
        shelf_proximity: shelf,
        interior_basin_field: interior_basin,
        lithosphere_thickness_px: partition.lithosphere_thickness_px,
        mean_lithosphere_thickness_px: mean_lith,
    }
}
