//! Feedback images and their per-tile aggregation.

use relief_quadtree::CompactId;
use rustc_hash::FxHashMap;

use crate::codec::{pack_number, unpack_at};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedbackError {
    #[error("{kind} buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// One frame of read-back feedback: three RGBA8 buffers of the same size,
/// row-major, each pixel packed with [`crate::pack_number`].
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackImages {
    width: u32,
    height: u32,
    /// Distance from the viewpoint in local units.
    distance: Vec<u8>,
    /// Compact id of the tile covering the pixel, `0` for background.
    tile_id: Vec<u8>,
    /// Zoom level the pixel requires.
    zoom: Vec<u8>,
}

/// What one pixel of feedback says.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeedbackPixel {
    pub id: CompactId,
    pub required_zoom: u8,
    pub distance: f64,
}

impl FeedbackImages {
    pub fn new(
        width: u32,
        height: u32,
        distance: Vec<u8>,
        tile_id: Vec<u8>,
        zoom: Vec<u8>,
    ) -> Result<Self, FeedbackError> {
        let expected = width as usize * height as usize * 4;
        for (kind, buffer) in [("distance", &distance), ("tile id", &tile_id), ("zoom", &zoom)] {
            if buffer.len() != expected {
                return Err(FeedbackError::SizeMismatch {
                    kind,
                    expected,
                    actual: buffer.len(),
                });
            }
        }
        Ok(Self {
            width,
            height,
            distance,
            tile_id,
            zoom,
        })
    }

    /// Render all three buffers from a per-pixel function; `None` is
    /// background.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut pixel: impl FnMut(u32, u32) -> Option<FeedbackPixel>,
    ) -> Self {
        let len = width as usize * height as usize * 4;
        let mut distance = Vec::with_capacity(len);
        let mut tile_id = Vec::with_capacity(len);
        let mut zoom = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                let (d, id, z) = match pixel(x, y) {
                    Some(p) => (p.distance, f64::from(u32::from(p.id)), f64::from(p.required_zoom)),
                    None => (0.0, 0.0, 0.0),
                };
                distance.extend_from_slice(&pack_number(d));
                tile_id.extend_from_slice(&pack_number(id));
                zoom.extend_from_slice(&pack_number(z));
            }
        }
        Self {
            width,
            height,
            distance,
            tile_id,
            zoom,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Decode pixel `index`; `None` for background.
    pub fn pixel(&self, index: usize) -> Option<FeedbackPixel> {
        let raw = unpack_at(&self.tile_id, index).round();
        let id = CompactId::from_raw(raw as u32)?;
        let required_zoom = unpack_at(&self.zoom, index).round().clamp(0.0, 255.0) as u8;
        Some(FeedbackPixel {
            id,
            required_zoom,
            distance: unpack_at(&self.distance, index),
        })
    }
}

/// Aggregated feedback for one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileSample {
    /// Most demanding zoom over all of the tile's pixels.
    pub required_zoom: u8,
    /// Closest any of the tile's pixels came to the viewpoint.
    pub min_distance: f64,
    pub pixels: u32,
}

/// Fold every pixel into a per-tile summary. Background pixels are skipped.
pub fn read_tile_data(images: &FeedbackImages) -> FxHashMap<CompactId, TileSample> {
    let mut tiles: FxHashMap<CompactId, TileSample> = FxHashMap::default();
    for index in 0..images.pixel_count() {
        let Some(px) = images.pixel(index) else {
            continue;
        };
        tiles
            .entry(px.id)
            .and_modify(|t| {
                t.required_zoom = t.required_zoom.max(px.required_zoom);
                t.min_distance = t.min_distance.min(px.distance);
                t.pixels += 1;
            })
            .or_insert(TileSample {
                required_zoom: px.required_zoom,
                min_distance: px.distance,
                pixels: 1,
            });
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> CompactId {
        CompactId::from_raw(raw).unwrap()
    }

    #[test]
    fn test_sizes_are_checked() {
        let ok = vec![0; 2 * 3 * 4];
        assert!(FeedbackImages::new(2, 3, ok.clone(), ok.clone(), ok.clone()).is_ok());
        assert_eq!(
            FeedbackImages::new(2, 3, ok.clone(), vec![0; 5], ok),
            Err(FeedbackError::SizeMismatch {
                kind: "tile id",
                expected: 24,
                actual: 5
            })
        );
    }

    #[test]
    fn test_most_demanding_pixel_wins() {
        let images = FeedbackImages::from_fn(4, 1, |x, _| {
            Some(FeedbackPixel {
                id: id(9),
                required_zoom: [10, 11, 9, 10][x as usize],
                distance: [5.0, 3.5, 8.0, 4.0][x as usize],
            })
        });
        let tiles = read_tile_data(&images);
        assert_eq!(
            tiles[&id(9)],
            TileSample {
                required_zoom: 11,
                min_distance: 3.5,
                pixels: 4
            }
        );
    }

    #[test]
    fn test_background_is_ignored() {
        let images = FeedbackImages::from_fn(3, 3, |x, y| {
            (x == 1 && y == 1).then(|| FeedbackPixel {
                id: id(300),
                required_zoom: 4,
                distance: 1.0,
            })
        });
        let tiles = read_tile_data(&images);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[&id(300)].pixels, 1);
    }

    #[test]
    fn test_tiles_are_kept_apart() {
        let images = FeedbackImages::from_fn(2, 2, |x, y| {
            Some(FeedbackPixel {
                id: id(1 + x),
                required_zoom: (3 + y) as u8,
                distance: 2.0,
            })
        });
        let tiles = read_tile_data(&images);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[&id(1)].required_zoom, 4);
        assert_eq!(tiles[&id(2)].required_zoom, 4);
        assert_eq!(tiles[&id(2)].pixels, 2);
    }
}
