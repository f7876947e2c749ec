//! Elevation tile pipeline: fetch an encoded raster for a tile, decode the
//! terrarium encoding into heights, and pad the grid so it can be meshed.

mod grid;
mod source;
mod terrarium;

pub use grid::{ElevationGrid, GridError};
#[cfg(feature = "http")]
pub use source::HttpTileSource;
pub use source::{
    DEFAULT_URL_TEMPLATE, DirectoryTileSource, ElevationSource, FetchError, MemoryTileSource,
    SyntheticParams, SyntheticTileSource, TILE_PIXELS, expand_template,
};
pub use terrarium::{RawImage, TERRARIUM_OFFSET, decode, decode_terrarium, encode_terrarium};
