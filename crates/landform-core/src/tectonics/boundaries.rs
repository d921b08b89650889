//! Boundary classification and deformation envelopes.
//!
//! Boundary cells are classified from the relative plate motion projected on
//! the inter-cell normal: 1 = convergent, 2 = divergent, 3 = transform
//! (0 = interior). These integers are serialized into the boundary raster and
//! must not change. Class envelopes are Gaussian in the Euclidean distance to
//! each class mask and blended through a softmax so overlapping deformation
//! zones hand off smoothly.

use crate::config::TectonicsConfig;
use crate::filters::{box_blur, euclidean_distance_to, normalize01, DIRECTIONS_8};
use crate::grid::Grid;
use crate::noise::fbm_noise;
use crate::rng::RngStream;

/// Boundary class of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryType {
    None,
    Convergent,
    Divergent,
    Transform,
}

impl BoundaryType {
    /// Serialized raster code (part of the external contract).
    pub fn code(self) -> i8 {
        match self {
            BoundaryType::None => 0,
            BoundaryType::Convergent => 1,
            BoundaryType::Divergent => 2,
            BoundaryType::Transform => 3,
        }
    }

    pub fn from_code(code: i8) -> Self {
        match code {
            1 => BoundaryType::Convergent,
            2 => BoundaryType::Divergent,
            3 => BoundaryType::Transform,
            _ => BoundaryType::None,
        }
    }
}

/// Classified boundary rasters.
pub struct BoundaryClassification {
    pub boundary_type: Grid<i8>,
    pub boundary_mask: Grid<bool>,
    /// Signed normal-relative motion, clipped to [−1, 1].
    pub convergence: Grid<f32>,
}

/// Classify boundary cells. Directions are visited in the canonical D8 order
/// and each cell keeps the class of the first direction that claims it.
pub fn classify_boundaries(
    plate_ids: &Grid<i16>,
    motion: &[[f32; 2]],
    threshold: f32,
) -> BoundaryClassification {
    let (w, h) = (plate_ids.width(), plate_ids.height());
    let mut boundary_type = Grid::filled(w, h, 0i8);
    let mut convergence = Grid::zeros(w, h);
    let mut assigned = Grid::filled(w, h, false);

    for &(dy, dx) in DIRECTIONS_8.iter() {
        let norm = ((dy * dy + dx * dx) as f32).sqrt();
        let nx = dx as f32 / norm;
        let ny = dy as f32 / norm;
        for y in 0..h {
            for x in 0..w {
                if assigned.get(y, x) {
                    continue;
                }
                let Some((ny_i, nx_i)) = plate_ids.neighbor(y, x, dy, dx) else {
                    continue;
                };
                let a = plate_ids.get(y, x) as usize;
                let b = plate_ids.get(ny_i, nx_i) as usize;
                if a == b {
                    continue;
                }
                let dvx = motion[b][0] - motion[a][0];
                let dvy = motion[b][1] - motion[a][1];
                let c = dvx * nx + dvy * ny;
                let class = if c < -threshold {
                    BoundaryType::Convergent
                } else if c > threshold {
                    BoundaryType::Divergent
                } else {
                    BoundaryType::Transform
                };
                boundary_type.set(y, x, class.code());
                convergence.set(y, x, (c * 0.5).clamp(-1.0, 1.0));
                assigned.set(y, x, true);
            }
        }
    }

    let boundary_mask = boundary_type.map(|t| t != 0);
    BoundaryClassification {
        boundary_type,
        boundary_mask,
        convergence,
    }
}

/// Softmax-blended deformation envelopes.
pub struct DeformationEnvelopes {
    pub orogeny: Grid<f32>,
    pub rift: Grid<f32>,
    pub transform: Grid<f32>,
    pub collision_buffer: Grid<f32>,
    pub triple_junction: Grid<f32>,
}

/// Build the orogeny/rift/transform envelopes from the classified boundary.
pub fn deformation_envelopes(
    classification: &BoundaryClassification,
    plate_ids: &Grid<i16>,
    curvature: &Grid<f32>,
    rng: RngStream,
    cfg: &TectonicsConfig,
) -> DeformationEnvelopes {
    let (w, h) = (plate_ids.width(), plate_ids.height());
    let boundary_type = &classification.boundary_type;
    let max_radius = cfg.deformation_max_radius_px as f32;

    let mut segment_rng = rng.fork("segment-noise").generator();
    let segment = normalize01(&fbm_noise(w, h, &mut segment_rng, 6, 3));
    let fragment = normalize01(&fbm_noise(w, h, &mut segment_rng, 9, 3));

    let sigmas = [cfg.orogeny_sigma_px, cfg.rift_sigma_px, cfg.transform_sigma_px];
    let mut raw = Vec::with_capacity(3);
    for (class_idx, base_sigma) in sigmas.iter().enumerate() {
        let code = (class_idx + 1) as i8;
        let mask = boundary_type.map(|t| t == code);
        if !mask.any() {
            raw.push(Grid::zeros(w, h));
            continue;
        }

        // σ scales with the mean boundary speed of the class and eases off
        // where the boundary curls hard.
        let mut speed_sum = 0.0f64;
        let mut curv_sum = 0.0f64;
        let mut count = 0usize;
        for i in 0..mask.len() {
            if mask.at(i) {
                speed_sum += (classification.convergence.at(i).abs() * 2.0) as f64;
                curv_sum += curvature.at(i) as f64;
                count += 1;
            }
        }
        let mean_speed = (speed_sum / count as f64) as f32;
        let mean_curv = (curv_sum / count as f64) as f32;
        let curve_ease = (1.0 - 0.5 * mean_curv / cfg.curvature_limit).clamp(0.5, 1.0);
        let sigma = (base_sigma * (0.6 + 0.8 * mean_speed) * curve_ease).max(1.0);

        let dist = euclidean_distance_to(&mask);
        let mut env = Grid::zeros(w, h);
        for i in 0..env.len() {
            let d = dist.at(i);
            if d > max_radius {
                continue;
            }
            let gauss = (-0.5 * (d / sigma) * (d / sigma)).exp();
            let seg = 0.6 + 0.4 * segment.at(i);
            let frag = 0.75 + 0.25 * fragment.at(i);
            env.put(i, gauss * seg * frag);
        }
        raw.push(env);
    }

    // Softmax hand-off between overlapping envelopes.
    let temp = cfg.collision_softmax_temperature.max(1e-3);
    let mut orogeny = Grid::zeros(w, h);
    let mut rift = Grid::zeros(w, h);
    let mut transform = Grid::zeros(w, h);
    let mut buffer = Grid::zeros(w, h);
    for i in 0..orogeny.len() {
        let e = [raw[0].at(i), raw[1].at(i), raw[2].at(i)];
        let exps = [(e[0] / temp).exp(), (e[1] / temp).exp(), (e[2] / temp).exp()];
        let denom = exps[0] + exps[1] + exps[2];
        let soft = [
            e[0] * exps[0] / denom,
            e[1] * exps[1] / denom,
            e[2] * exps[2] / denom,
        ];
        orogeny.put(i, soft[0]);
        rift.put(i, soft[1]);
        transform.put(i, soft[2]);
        buffer.put(i, soft[0] + 0.6 * soft[2]);
    }

    // Triple junctions: ≥3 distinct plates in the 9-cell neighborhood, on a
    // boundary cell. Nearby orogeny gets boosted.
    let mut tj = Grid::zeros(w, h);
    for y in 0..h {
        for x in 0..w {
            if !classification.boundary_mask.get(y, x) {
                continue;
            }
            let mut ids = [-1i16; 9];
            let mut n = 0usize;
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if let Some((ny, nx)) = plate_ids.neighbor(y, x, dy, dx) {
                        let id = plate_ids.get(ny, nx);
                        if !ids[..n].contains(&id) {
                            ids[n] = id;
                            n += 1;
                        }
                    }
                }
            }
            if n >= 3 {
                tj.set(y, x, 1.0);
            }
        }
    }
    let tj_field = normalize01(&box_blur(&tj, 3, 2));

    let mut orogeny_boosted = Grid::zeros(w, h);
    for i in 0..orogeny.len() {
        orogeny_boosted.put(
            i,
            orogeny.at(i) * (1.0 + cfg.triple_junction_boost * tj_field.at(i)),
        );
    }

    DeformationEnvelopes {
        orogeny: normalize01(&orogeny_boosted),
        rift: normalize01(&rift),
        transform: normalize01(&transform),
        collision_buffer: normalize01(&box_blur(&buffer, 6, 2)),
        triple_junction: tj_field,
    }
}
