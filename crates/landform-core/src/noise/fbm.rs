//! Fractional Brownian motion over lattice value noise.
//!
//! Octaves at geometric frequencies (lacunarity 2) with amplitude gain 0.5,
//! normalized by the total amplitude. The base lattice follows the raster
//! aspect ratio so features stay isotropic on non-square grids. Octave
//! accumulation is left-to-right in f32; the order is contractual.

use crate::grid::Grid;
use crate::noise::value_noise_2d;
use rand_pcg::Pcg64;

pub const LACUNARITY: f32 = 2.0;
pub const GAIN: f32 = 0.5;

/// fBm value noise in approximately [−1, 1].
pub fn fbm_noise(
    width: usize,
    height: usize,
    rng: &mut Pcg64,
    base_res: usize,
    octaves: u32,
) -> Grid<f32> {
    let mut field = Grid::zeros(width, height);
    let mut amplitude = 1.0f32;
    let mut total_amplitude = 0.0f32;
    let aspect = width as f32 / height.max(1) as f32;

    for octave in 0..octaves {
        let freq = LACUNARITY.powi(octave as i32);
        let res_y = ((base_res as f32 * freq).round() as usize).max(1);
        let res_x = ((res_y as f32 * aspect).round() as usize).max(1);
        let layer = value_noise_2d(width, height, rng, res_x, res_y);
        for i in 0..field.len() {
            field.put(i, field.at(i) + amplitude * layer.at(i));
        }
        total_amplitude += amplitude;
        amplitude *= GAIN;
    }

    if total_amplitude == 0.0 {
        return field;
    }
    field.map(|v| v / total_amplitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::RngStream;

    fn sample(seed: u64, octaves: u32) -> Grid<f32> {
        let mut rng = RngStream::new(seed).fork("detail").generator();
        fbm_noise(96, 48, &mut rng, 2, octaves)
    }

    #[test]
    fn fbm_is_normalized_into_unit_range() {
        let field = sample(42, 5);
        assert!(field.min_value() >= -1.0 - 1e-5);
        assert!(field.max_value() <= 1.0 + 1e-5);
    }

    #[test]
    fn fbm_produces_non_constant_output() {
        let field = sample(42, 5);
        assert!(field.max_value() - field.min_value() > 0.05);
    }

    #[test]
    fn more_octaves_add_high_frequency_content() {
        // Mean absolute one-cell difference grows with octave count.
        let coarse = sample(9, 1);
        let fine = sample(9, 6);
        let roughness = |g: &Grid<f32>| {
            let mut sum = 0.0f32;
            for y in 0..g.height() {
                for x in 1..g.width() {
                    sum += (g.get(y, x) - g.get(y, x - 1)).abs();
                }
            }
            sum / (g.height() * (g.width() - 1)) as f32
        };
        assert!(roughness(&fine) > roughness(&coarse));
    }

    #[test]
    fn different_seeds_differ() {
        let a = sample(1, 4);
        let b = sample(2, 4);
        assert_ne!(a.data(), b.data());
    }
}
