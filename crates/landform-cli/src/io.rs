//! Output serialization: staged output directories, NPY/PNG rasters, and
//! metadata JSON.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use landform_core::Grid;

/// A run's output directory, staged so `--overwrite` replaces the previous
/// contents atomically (write into a `.staging-*` sibling, then swap).
#[derive(Debug)]
pub struct OutputStaging {
    final_dir: PathBuf,
    work_dir: PathBuf,
    staged: bool,
}

impl OutputStaging {
    /// Resolve `<out>/<canonical_seed>/<W>x<H>`, staging when overwriting.
    pub fn prepare(
        out_root: &Path,
        canonical_seed: &str,
        width: usize,
        height: usize,
        overwrite: bool,
    ) -> Result<Self> {
        let parent = out_root.join(canonical_seed);
        let final_dir = parent.join(format!("{width}x{height}"));

        let non_empty = final_dir.is_dir()
            && fs::read_dir(&final_dir)
                .with_context(|| format!("reading {}", final_dir.display()))?
                .next()
                .is_some();
        if non_empty && !overwrite {
            bail!(
                "Output directory already exists and is not empty: {}. Use --overwrite to replace files.",
                final_dir.display()
            );
        }

        if non_empty {
            let work_dir = parent.join(format!(".staging-{width}x{height}"));
            if work_dir.exists() {
                fs::remove_dir_all(&work_dir)
                    .with_context(|| format!("clearing stale staging {}", work_dir.display()))?;
            }
            fs::create_dir_all(&work_dir)?;
            Ok(Self {
                final_dir,
                work_dir,
                staged: true,
            })
        } else {
            fs::create_dir_all(&final_dir)?;
            Ok(Self {
                work_dir: final_dir.clone(),
                final_dir,
                staged: false,
            })
        }
    }

    /// Directory to write artifacts into.
    pub fn dir(&self) -> &Path {
        &self.work_dir
    }

    /// Swap staged contents into place. No-op for fresh directories.
    pub fn commit(self) -> Result<PathBuf> {
        if self.staged {
            fs::remove_dir_all(&self.final_dir)
                .with_context(|| format!("removing {}", self.final_dir.display()))?;
            fs::rename(&self.work_dir, &self.final_dir).with_context(|| {
                format!(
                    "renaming {} -> {}",
                    self.work_dir.display(),
                    self.final_dir.display()
                )
            })?;
        }
        Ok(self.final_dir)
    }
}

/// Write a float32 raster as NumPy `.npy` v1.0: little-endian, C-order,
/// no pickle.
pub fn write_height_npy(path: &Path, height_m: &Grid<f32>) -> Result<()> {
    let header_dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        height_m.height(),
        height_m.width()
    );
    // Magic (6) + version (2) + header-length field (2) + header, padded with
    // spaces to a 64-byte multiple and terminated by a newline.
    let unpadded = 10 + header_dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let header = format!("{header_dict}{}\n", " ".repeat(padding));

    let mut file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(b"\x93NUMPY\x01\x00")?;
    file.write_all(&(header.len() as u16).to_le_bytes())?;
    file.write_all(header.as_bytes())?;
    for &v in height_m.data() {
        file.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Read back a `.npy` written by [`write_height_npy`]. Used by tests and the
/// round-trip check; not a general NPY reader.
pub fn read_height_npy(path: &Path) -> Result<Grid<f32>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.len() < 10 || &bytes[..6] != b"\x93NUMPY" {
        bail!("not an NPY file: {}", path.display());
    }
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let header = std::str::from_utf8(&bytes[10..10 + header_len])?;
    let shape_part = header
        .split("'shape': (")
        .nth(1)
        .and_then(|s| s.split(')').next())
        .context("NPY header missing shape")?;
    let dims: Vec<usize> = shape_part
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<_, _>>()?;
    if dims.len() != 2 {
        bail!("expected 2-D NPY, got shape ({shape_part})");
    }
    let (h, w) = (dims[0], dims[1]);
    let data_bytes = &bytes[10 + header_len..];
    if data_bytes.len() != h * w * 4 {
        bail!("NPY payload size mismatch");
    }
    let data: Vec<f32> = data_bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Grid::from_vec(w, h, data))
}

pub fn write_png_u8(path: &Path, raster: &Grid<u8>) -> Result<()> {
    let img = GrayImage::from_raw(
        raster.width() as u32,
        raster.height() as u32,
        raster.data().to_vec(),
    )
    .context("u8 raster buffer mismatch")?;
    img.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn write_png_u16(path: &Path, raster: &Grid<u16>) -> Result<()> {
    let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(
        raster.width() as u32,
        raster.height() as u32,
        raster.data().to_vec(),
    )
    .context("u16 raster buffer mismatch")?;
    img.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn write_png_rgb(path: &Path, width: usize, height: usize, pixels: &[[u8; 3]]) -> Result<()> {
    let flat: Vec<u8> = pixels.iter().flatten().copied().collect();
    let img: RgbImage = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width as u32, height as u32, flat)
        .context("rgb raster buffer mismatch")?;
    img.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Pretty-printed JSON with sorted keys (serde_json maps are ordered).
pub fn write_json(path: &Path, payload: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(payload)?;
    fs::write(path, text + "\n").with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn npy_roundtrip_is_exact() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("height.npy");
        let mut grid = Grid::zeros(7, 5);
        for i in 0..grid.len() {
            grid.put(i, (i as f32).sin() * 1234.5);
        }
        write_height_npy(&path, &grid).unwrap();
        let back = read_height_npy(&path).unwrap();
        assert_eq!(back.width(), 7);
        assert_eq!(back.height(), 5);
        assert_eq!(back.data(), grid.data());
    }

    #[test]
    fn npy_header_is_padded_to_64_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("height.npy");
        write_height_npy(&path, &Grid::zeros(3, 2)).unwrap();
        let bytes = fs::read(&path).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes.len(), 10 + header_len + 3 * 2 * 4);
    }

    #[test]
    fn prepare_refuses_non_empty_without_overwrite() {
        let tmp = TempDir::new().unwrap();
        let staging = OutputStaging::prepare(tmp.path(), "mistyforge", 8, 4, false).unwrap();
        fs::write(staging.dir().join("height.npy"), b"x").unwrap();
        staging.commit().unwrap();

        let err = OutputStaging::prepare(tmp.path(), "mistyforge", 8, 4, false).unwrap_err();
        assert!(err.to_string().contains("--overwrite"));
    }

    #[test]
    fn overwrite_replaces_stale_files() {
        let tmp = TempDir::new().unwrap();
        let first = OutputStaging::prepare(tmp.path(), "mistyforge", 8, 4, false).unwrap();
        fs::write(first.dir().join("stale.png"), b"old").unwrap();
        let final_dir = first.commit().unwrap();
        assert!(final_dir.join("stale.png").exists());

        let second = OutputStaging::prepare(tmp.path(), "mistyforge", 8, 4, true).unwrap();
        fs::write(second.dir().join("fresh.png"), b"new").unwrap();
        let final_dir = second.commit().unwrap();
        assert!(final_dir.join("fresh.png").exists());
        assert!(!final_dir.join("stale.png").exists());
    }
}
