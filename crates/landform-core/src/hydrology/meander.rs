//! Deterministic droplet meander sculpt.
//!
//! A fixed population of droplets walks the routing surface, carving a small
//! constant depth along the steepest momentum-aligned downhill neighbor.
//! Every step reads the surface frozen at the start of the step and applies
//! all carves afterwards, so the result does not depend on droplet order.
//! Droplet count, step count, carve depth, and the 0.7/0.3 velocity blend
//! are part of the determinism contract.

use rand::Rng;
use rand_pcg::Pcg64;

use crate::filters::{DIRECTIONS_8, SQRT_2};
use crate::grid::Grid;
use crate::rng::RngStream;

/// Cumulative-weight sampler over a fixed index set.
struct WeightedSampler {
    indices: Vec<usize>,
    cumulative: Vec<f64>,
}

impl WeightedSampler {
    /// Weights are `(elev − min + 1)²` over the candidate cells.
    fn from_elevations(indices: Vec<usize>, height: &Grid<f32>) -> Self {
        let min_elev = indices
            .iter()
            .map(|&i| height.at(i))
            .fold(f32::INFINITY, f32::min);
        let mut cumulative = Vec::with_capacity(indices.len());
        let mut acc = 0.0f64;
        for &i in &indices {
            let base = (height.at(i) - min_elev).max(0.0) as f64 + 1.0;
            acc += base * base;
            cumulative.push(acc);
        }
        Self { indices, cumulative }
    }

    fn draw(&self, rng: &mut Pcg64) -> usize {
        let total = *self.cumulative.last().expect("sampler has candidates");
        let u: f64 = rng.gen_range(0.0..total);
        let pos = self.cumulative.partition_point(|&c| c <= u);
        self.indices[pos.min(self.indices.len() - 1)]
    }
}

/// Carve meanders into `height` with a droplet walk. Returns the sculpted
/// surface; ocean is never modified.
pub fn sculpt_meanders(
    height: &Grid<f32>,
    land_mask: &Grid<bool>,
    rng: RngStream,
    droplet_count: usize,
    steps: usize,
    carve_m: f32,
) -> Grid<f32> {
    if droplet_count == 0 || steps == 0 || carve_m <= 0.0 || !land_mask.any() {
        return height.clone();
    }

    let (w, h) = (height.width(), height.height());
    let mut surface = height.clone();
    let mut gen = rng.generator();

    let land_idx: Vec<usize> = (0..surface.len()).filter(|&i| land_mask.at(i)).collect();
    let spawn = WeightedSampler::from_elevations(land_idx.clone(), &surface);

    // Respawn pool: the top ~30% of land by elevation.
    let mut land_elev: Vec<f32> = land_idx.iter().map(|&i| surface.at(i)).collect();
    land_elev.sort_unstable_by(f32::total_cmp);
    let high_cut = crate::filters::percentile_sorted(&land_elev, 70.0);
    let mut high_idx: Vec<usize> = land_idx
        .iter()
        .copied()
        .filter(|&i| surface.at(i) >= high_cut)
        .collect();
    if high_idx.is_empty() {
        high_idx = land_idx;
    }
    let respawn = WeightedSampler::from_elevations(high_idx, &surface);

    let mut pos: Vec<usize> = (0..droplet_count).map(|_| spawn.draw(&mut gen)).collect();
    let mut vel_y = vec![0.0f32; droplet_count];
    let mut vel_x = vec![0.0f32; droplet_count];

    let dir_len: [f32; 8] = [1.0, 1.0, 1.0, 1.0, SQRT_2, SQRT_2, SQRT_2, SQRT_2];

    let mut moves: Vec<usize> = Vec::with_capacity(droplet_count);
    for _ in 0..steps {
        moves.clear();
        let mut respawns: Vec<usize> = Vec::new();

        for d in 0..droplet_count {
            let idx = pos[d];
            let y = idx / w;
            let x = idx % w;
            let cur_h = surface.at(idx);

            // Downhill drops per direction on the frozen surface.
            let mut drops = [0.0f32; 8];
            let mut dests = [usize::MAX; 8];
            let mut drop_sum = 0.0f32;
            for (k, &(dy, dx)) in DIRECTIONS_8.iter().enumerate() {
                let ny = y as i64 + dy as i64;
                let nx = x as i64 + dx as i64;
                if ny < 0 || nx < 0 || ny >= h as i64 || nx >= w as i64 {
                    continue;
                }
                let nidx = ny as usize * w + nx as usize;
                if !land_mask.at(nidx) {
                    continue;
                }
                let drop = cur_h - surface.at(nidx);
                if drop > 0.0 {
                    drops[k] = drop;
                    dests[k] = nidx;
                    drop_sum += drop;
                }
            }

            // Drop-weighted mean downhill direction feeds the momentum blend.
            let (mut g_y, mut g_x) = (0.0f32, 0.0f32);
            if drop_sum > 0.0 {
                for (k, &(dy, dx)) in DIRECTIONS_8.iter().enumerate() {
                    g_y += drops[k] * dy as f32;
                    g_x += drops[k] * dx as f32;
                }
                g_y /= drop_sum;
                g_x /= drop_sum;
            }
            vel_y[d] = vel_y[d] * 0.7 + g_y * 0.3;
            vel_x[d] = vel_x[d] * 0.7 + g_x * 0.3;

            // Momentum-aligned choice among downhill neighbors.
            let mut best_score = f32::NEG_INFINITY;
            let mut best_k = usize::MAX;
            for (k, &(dy, dx)) in DIRECTIONS_8.iter().enumerate() {
                if dests[k] == usize::MAX || drops[k] <= 0.0 {
                    continue;
                }
                let align = vel_y[d] * dy as f32 / dir_len[k] + vel_x[d] * dx as f32 / dir_len[k];
                if align > best_score {
                    best_score = align;
                    best_k = k;
                }
            }

            let terminal = best_k == usize::MAX || {
                let next = dests[best_k];
                !land_mask.at(next) || surface.at(next) <= 0.0
            };
            if terminal {
                respawns.push(d);
            } else {
                let next = dests[best_k];
                pos[d] = next;
                moves.push(next);
            }
        }

        for &cell in &moves {
            surface.put(cell, surface.at(cell) - carve_m);
        }
        for &d in &respawns {
            pos[d] = respawn.draw(&mut gen);
            vel_y[d] = 0.0;
            vel_x[d] = 0.0;
        }
    }

    surface
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_fixture() -> (Grid<f32>, Grid<bool>) {
        let (w, h) = (48usize, 32usize);
        let mut height = Grid::zeros(w, h);
        let mut land = Grid::filled(w, h, true);
        for y in 0..h {
            for x in 0..w {
                height.set(y, x, 10.0 + x as f32 * 3.0);
            }
            height.set(y, 0, -20.0);
            land.set(y, 0, false);
        }
        (height, land)
    }

    #[test]
    fn sculpt_only_lowers_and_only_on_land() {
        let (height, land) = ramp_fixture();
        let out = sculpt_meanders(&height, &land, RngStream::new(2).fork("sculpt-meanders"), 500, 40, 0.02);
        for i in 0..height.len() {
            if land.at(i) {
                assert!(out.at(i) <= height.at(i) + 1e-6);
            } else {
                assert_eq!(out.at(i), height.at(i));
            }
        }
    }

    #[test]
    fn sculpt_carves_something() {
        let (height, land) = ramp_fixture();
        let out = sculpt_meanders(&height, &land, RngStream::new(2).fork("sculpt-meanders"), 500, 40, 0.02);
        let total: f32 = height
            .data()
            .iter()
            .zip(out.data())
            .map(|(a, b)| a - b)
            .sum();
        assert!(total > 0.0, "droplets must carve a nonzero volume");
    }

    #[test]
    fn sculpt_is_deterministic() {
        let (height, land) = ramp_fixture();
        let a = sculpt_meanders(&height, &land, RngStream::new(5).fork("sculpt-meanders"), 300, 25, 0.02);
        let b = sculpt_meanders(&height, &land, RngStream::new(5).fork("sculpt-meanders"), 300, 25, 0.02);
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn zero_inputs_are_identity() {
        let (height, land) = ramp_fixture();
        let out = sculpt_meanders(&height, &land, RngStream::new(1).fork("sculpt-meanders"), 0, 10, 0.02);
        assert_eq!(out.data(), height.data());
    }
}
