//! Plate count, site placement, and per-plate motion/age sampling.

use crate::config::TectonicsConfig;
use crate::rng::RngStream;
use rand::Rng;

/// Uniform plate count in `[min_plate_count, max_plate_count]`.
pub fn sample_plate_count(rng: RngStream, cfg: &TectonicsConfig) -> usize {
    let mut gen = rng.generator();
    gen.gen_range(cfg.min_plate_count..=cfg.max_plate_count) as usize
}

/// Poisson-like rejection sampling of plate sites in the unit square.
///
/// The minimum separation decays by 0.88 across up to 8 outer rounds; any
/// remaining slots are filled with unconditional draws so the site count is
/// always exactly `plate_count`.
pub fn sample_plate_sites(rng: RngStream, plate_count: usize, min_distance: f32) -> Vec<[f32; 2]> {
    let mut gen = rng.generator();
    let mut sites: Vec<[f32; 2]> = Vec::with_capacity(plate_count);
    let mut min_dist = min_distance;

    'rounds: for _ in 0..8 {
        for _ in 0..plate_count * 64 {
            let candidate = [gen.gen_range(0.0f64..1.0) as f32, gen.gen_range(0.0f64..1.0) as f32];
            if sites.is_empty() {
                sites.push(candidate);
            } else {
                let nearest = sites
                    .iter()
                    .map(|s| {
                        let dx = candidate[0] - s[0];
                        let dy = candidate[1] - s[1];
                        (dx * dx + dy * dy).sqrt()
                    })
                    .fold(f32::INFINITY, f32::min);
                if nearest >= min_dist {
                    sites.push(candidate);
                }
            }
            if sites.len() >= plate_count {
                break 'rounds;
            }
        }
        if sites.len() >= plate_count {
            break;
        }
        min_dist *= 0.88;
    }

    while sites.len() < plate_count {
        sites.push([gen.gen_range(0.0f64..1.0) as f32, gen.gen_range(0.0f64..1.0) as f32]);
    }
    sites.truncate(plate_count);
    sites
}

/// Unit motion vectors from uniform angles in [0, 2π).
pub fn sample_plate_motion(rng: RngStream, plate_count: usize) -> Vec<[f32; 2]> {
    let mut gen = rng.generator();
    (0..plate_count)
        .map(|_| {
            let angle = gen.gen_range(0.0f64..std::f64::consts::TAU) as f32;
            [angle.cos(), angle.sin()]
        })
        .collect()
}

/// Per-plate crustal age in [0, 1]; 1 is cratonic.
pub fn sample_plate_ages(rng: RngStream, plate_count: usize) -> Vec<f32> {
    let mut gen = rng.generator();
    (0..plate_count).map(|_| gen.gen_range(0.0f64..1.0) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plate_count_respects_bounds() {
        let cfg = TectonicsConfig::default();
        for seed in 0..32 {
            let count = sample_plate_count(RngStream::new(seed).fork("tectonics_plate_count"), &cfg);
            assert!((6..=12).contains(&count), "plate count {count} out of range");
        }
    }

    #[test]
    fn sites_fill_requested_count_and_unit_square() {
        let sites = sample_plate_sites(RngStream::new(17).fork("tectonics_plate_sites"), 10, 0.22);
        assert_eq!(sites.len(), 10);
        for s in &sites {
            assert!((0.0..1.0).contains(&s[0]) && (0.0..1.0).contains(&s[1]));
        }
    }

    #[test]
    fn motions_are_unit_vectors() {
        let motion = sample_plate_motion(RngStream::new(3).fork("tectonics_plate_motion"), 8);
        for m in &motion {
            let norm = (m[0] * m[0] + m[1] * m[1]).sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn sampling_is_deterministic() {
        let a = sample_plate_sites(RngStream::new(9).fork("tectonics_plate_sites"), 7, 0.22);
        let b = sample_plate_sites(RngStream::new(9).fork("tectonics_plate_sites"), 7, 0.22);
        assert_eq!(a, b);
    }
}
