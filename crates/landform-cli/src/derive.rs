//! Derived raster products: hillshade and preview encodings.

use landform_core::Grid;

/// 8-bit grayscale hillshade from a heightfield.
///
/// Gradients are taken at `meters_per_pixel` spacing and scaled by the
/// vertical exaggeration before the standard illumination dot product.
pub fn hillshade(
    height_m: &Grid<f32>,
    meters_per_pixel: f64,
    azimuth_deg: f32,
    altitude_deg: f32,
    vertical_exaggeration: f32,
) -> Grid<u8> {
    assert!(meters_per_pixel > 0.0, "meters_per_pixel must be positive");
    let (w, h) = (height_m.width(), height_m.height());
    let mpp = meters_per_pixel as f32;
    let azimuth = azimuth_deg.to_radians();
    let altitude = altitude_deg.to_radians();

    let mut out = Grid::filled(w, h, 0u8);
    for y in 0..h {
        for x in 0..w {
            let xm = x.saturating_sub(1);
            let xp = (x + 1).min(w - 1);
            let ym = y.saturating_sub(1);
            let yp = (y + 1).min(h - 1);
            let dz_dx = (height_m.get(y, xp) - height_m.get(y, xm)) / ((xp - xm).max(1) as f32 * mpp)
                * vertical_exaggeration;
            let dz_dy = (height_m.get(yp, x) - height_m.get(ym, x)) / ((yp - ym).max(1) as f32 * mpp)
                * vertical_exaggeration;

            let slope = std::f32::consts::FRAC_PI_2 - (dz_dx.hypot(dz_dy)).atan();
            let aspect = (-dz_dx).atan2(dz_dy);
            let shaded = altitude.sin() * slope.sin()
                + altitude.cos() * slope.cos() * (azimuth - aspect).cos();
            out.set(y, x, (shaded.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }
    out
}

/// Percentile-normalized 16-bit preview of a float raster.
pub fn height_preview_u16(height_m: &Grid<f32>, lo_pct: f32, hi_pct: f32) -> Grid<u16> {
    let mut sorted: Vec<f32> = height_m.data().to_vec();
    sorted.sort_unstable_by(f32::total_cmp);
    let lo = landform_core::filters::percentile_sorted(&sorted, lo_pct);
    let hi = landform_core::filters::percentile_sorted(&sorted, hi_pct);
    let scale = (hi - lo).max(1e-6);
    height_m.map(|v| (((v - lo) / scale).clamp(0.0, 1.0) * 65535.0).round() as u16)
}

/// Percentile-normalized 8-bit preview of a float raster.
pub fn float_preview_u8(values: &Grid<f32>, lo_pct: f32, hi_pct: f32) -> Grid<u8> {
    let mut sorted: Vec<f32> = values.data().to_vec();
    sorted.sort_unstable_by(f32::total_cmp);
    let lo = landform_core::filters::percentile_sorted(&sorted, lo_pct);
    let hi = landform_core::filters::percentile_sorted(&sorted, hi_pct);
    let scale = (hi - lo).max(1e-6);
    values.map(|v| (((v - lo) / scale).clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Signed float values in [−clip, clip] mapped to 8-bit with 128 at zero.
pub fn signed_preview_u8(values: &Grid<f32>, clip: f32) -> Grid<u8> {
    let c = clip.max(1e-6);
    values.map(|v| ((((v / c).clamp(-1.0, 1.0)) * 0.5 + 0.5) * 255.0).round() as u8)
}

/// Boolean mask as 0/255 grayscale.
pub fn mask_u8(mask: &Grid<bool>) -> Grid<u8> {
    mask.map(|v| if v { 255u8 } else { 0 })
}

/// Integer plate ids spread across the 8-bit range.
pub fn plate_ids_u8(plate_ids: &Grid<i16>, plate_count: usize) -> Grid<u8> {
    if plate_count <= 1 {
        return plate_ids.map(|_| 0u8);
    }
    let denom = (plate_count - 1) as f32;
    plate_ids.map(|id| (((id as f32 / denom).clamp(0.0, 1.0)) * 255.0).round() as u8)
}

/// Boundary classes 0..3 to fixed grayscale levels.
pub fn boundary_type_u8(boundary_type: &Grid<i8>) -> Grid<u8> {
    const LUT: [u8; 4] = [0, 85, 170, 255];
    boundary_type.map(|t| LUT[t.clamp(0, 3) as usize])
}

/// D8 directions −1..7 to nine distinguishable grayscale levels.
pub fn flow_dir_u8(flow_dir: &Grid<i8>) -> Grid<u8> {
    flow_dir.map(|d| ((d as i32 + 1) * 28).min(255) as u8)
}

/// Basin ids hashed into grayscale so adjacent basins contrast.
pub fn basin_id_u8(basin_id: &Grid<i32>) -> Grid<u8> {
    basin_id.map(|id| {
        if id < 0 {
            0u8
        } else {
            (32 + (id as u32).wrapping_mul(97) % 224) as u8
        }
    })
}

/// Composite overview: hillshade with darkened ocean and bright channels.
pub fn composite_u8(
    shade: &Grid<u8>,
    land_mask: &Grid<bool>,
    river_mask: &Grid<f32>,
    lake_mask: &Grid<bool>,
) -> Grid<u8> {
    let mut out = shade.clone();
    for i in 0..out.len() {
        if !land_mask.at(i) {
            out.put(i, (out.at(i) as u16 * 2 / 5) as u8);
        } else if river_mask.at(i) > 0.0 || lake_mask.at(i) {
            out.put(i, 255);
        }
    }
    out
}

/// Whittaker biome ids to a fixed RGB palette.
pub fn biome_rgb(biome_mask: &Grid<u8>) -> Vec<[u8; 3]> {
    const PALETTE: [[u8; 3]; 11] = [
        [0x1e, 0x48, 0x77], // water
        [0xff, 0xff, 0xff], // ice
        [0x8e, 0x9b, 0xa8], // tundra
        [0x42, 0x59, 0x46], // boreal forest
        [0xc2, 0xc5, 0x8b], // temperate grassland
        [0x5e, 0xa3, 0x45], // temperate forest
        [0x24, 0x7d, 0x52], // temperate rain forest
        [0xd1, 0x82, 0x3e], // hot desert
        [0xdc, 0xb3, 0x52], // savanna
        [0x8b, 0xa8, 0x32], // tropical seasonal forest
        [0x11, 0x40, 0x1f], // tropical rain forest
    ];
    biome_mask
        .data()
        .iter()
        .map(|&b| PALETTE[(b as usize).min(PALETTE.len() - 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize) -> Grid<f32> {
        let mut g = Grid::zeros(w, h);
        for y in 0..h {
            for x in 0..w {
                g.set(y, x, (x * 7 % 31) as f32 * 50.0 + y as f32 * 20.0);
            }
        }
        g
    }

    #[test]
    fn hillshade_is_deterministic_and_bounded() {
        let g = ramp(64, 32);
        let a = hillshade(&g, 5000.0, 315.0, 45.0, 1.0);
        let b = hillshade(&g, 5000.0, 315.0, 45.0, 1.0);
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn vertical_exaggeration_changes_hillshade() {
        let g = ramp(64, 32);
        let base = hillshade(&g, 5000.0, 315.0, 45.0, 1.0);
        let steep = hillshade(&g, 5000.0, 315.0, 45.0, 6.0);
        assert_ne!(base.data(), steep.data());
        let mad: f64 = base
            .data()
            .iter()
            .zip(steep.data())
            .map(|(&a, &b)| (a as f64 - b as f64).abs())
            .sum::<f64>()
            / base.len() as f64;
        assert!(mad > 1.5, "mean absolute difference {mad} too small");
    }

    #[test]
    fn previews_cover_full_range() {
        let g = ramp(32, 32);
        let p16 = height_preview_u16(&g, 1.0, 99.0);
        let p8 = float_preview_u8(&g, 1.0, 99.0);
        assert_eq!(*p16.data().iter().min().unwrap(), 0);
        assert_eq!(*p16.data().iter().max().unwrap(), 65535);
        assert_eq!(*p8.data().iter().max().unwrap(), 255);
    }

    #[test]
    fn signed_preview_centers_zero() {
        let mut g = Grid::zeros(3, 1);
        g.set(0, 0, -1.0);
        g.set(0, 2, 1.0);
        let p = signed_preview_u8(&g, 1.0);
        assert_eq!(p.get(0, 0), 0);
        assert_eq!(p.get(0, 1), 128);
        assert_eq!(p.get(0, 2), 255);
    }

    #[test]
    fn boundary_lut_is_stable() {
        let mut g = Grid::filled(4, 1, 0i8);
        g.set(0, 1, 1);
        g.set(0, 2, 2);
        g.set(0, 3, 3);
        let p = boundary_type_u8(&g);
        assert_eq!(p.data(), &[0, 85, 170, 255]);
    }
}
