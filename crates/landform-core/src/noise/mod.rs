//! Coherent noise primitives: lattice value noise, fBm octave sums, and
//! domain warping. All draws come from forked [`crate::rng::RngStream`]
//! generators, so every field is pinned to the seed tree.

pub mod fbm;
pub mod warp;

pub use fbm::fbm_noise;
pub use warp::warp_field;

use crate::grid::Grid;
use rand::Rng;
use rand_pcg::Pcg64;

/// Hermite smoothstep `t²(3 − 2t)`.
#[inline]
pub fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Value noise in [−1, 1] from a coarse random lattice.
///
/// A `(res_y+1) × (res_x+1)` grid of uniform [−1, 1] values is drawn in
/// row-major order, then each output pixel blends the four surrounding
/// lattice corners with smoothstepped fractional coordinates.
pub fn value_noise_2d(
    width: usize,
    height: usize,
    rng: &mut Pcg64,
    res_x: usize,
    res_y: usize,
) -> Grid<f32> {
    assert!(width > 0 && height > 0, "width and height must be positive");
    assert!(res_x >= 1 && res_y >= 1, "res_x and res_y must be >= 1");

    let lattice_w = res_x + 1;
    let lattice_h = res_y + 1;
    let mut lattice = Vec::with_capacity(lattice_w * lattice_h);
    for _ in 0..lattice_w * lattice_h {
        lattice.push(rng.gen_range(-1.0f64..1.0) as f32);
    }

    // Endpoint-exclusive sample coordinates across the lattice span.
    let xs: Vec<f32> = (0..width)
        .map(|i| res_x as f32 * i as f32 / width as f32)
        .collect();
    let ys: Vec<f32> = (0..height)
        .map(|i| res_y as f32 * i as f32 / height as f32)
        .collect();

    let mut out = Grid::zeros(width, height);
    for (y, &fy) in ys.iter().enumerate() {
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(res_y);
        let ty = smoothstep(fy - y0 as f32);
        for (x, &fx) in xs.iter().enumerate() {
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(res_x);
            let tx = smoothstep(fx - x0 as f32);

            let g00 = lattice[y0 * lattice_w + x0];
            let g10 = lattice[y0 * lattice_w + x1];
            let g01 = lattice[y1 * lattice_w + x0];
            let g11 = lattice[y1 * lattice_w + x1];

            let top = g00 * (1.0 - tx) + g10 * tx;
            let bottom = g01 * (1.0 - tx) + g11 * tx;
            out.set(y, x, top * (1.0 - ty) + bottom * ty);
        }
    }
    out
}
