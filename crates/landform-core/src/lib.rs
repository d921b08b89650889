//! Deterministic continent-scale heightfield and hydrology generation.
//!
//! Given `(width, height, meters_per_pixel, seed)`, the pipeline produces a
//! float32 elevation raster plus companion rasters for land/ocean, drainage
//! direction, flow accumulation, rivers, lakes, and basin identity. Two runs
//! with identical inputs are byte-identical: every random draw comes from a
//! labeled fork of one BLAKE2b-seeded PCG64 tree, and every order-sensitive
//! traversal breaks ties on the row-major flat index.

pub mod climate;
pub mod config;
pub mod error;
pub mod filters;
pub mod generator;
pub mod geomorph;
pub mod grid;
pub mod heightfield;
pub mod hydrology;
pub mod mask;
pub mod metrics;
pub mod noise;
pub mod rng;
pub mod seed;
pub mod tectonics;

pub use config::GeneratorConfig;
pub use error::GenerateError;
pub use generator::{generate, GenerationResult};
pub use grid::Grid;
pub use rng::RngStream;
pub use seed::{parse_seed, ParsedSeed, SeedParseError};
