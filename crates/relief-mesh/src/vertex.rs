//! Interleaved vertex format for GPU upload.

use glam::Vec3;

/// One terrain vertex, 20 bytes.
///
/// Layout:
///   - `[0..12]`  position `[f32; 3]` in the anchored local frame
///   - `[12..16]` elevation `f32` in meters, for colour ramps
///   - `[16..20]` tile_id `u32`, written into the tile-id feedback image
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileVertex {
    pub position: [f32; 3],
    pub elevation: f32,
    pub tile_id: u32,
}

static_assertions::assert_eq_size!(TileVertex, [u8; 20]);

impl TileVertex {
    pub fn new(position: Vec3, elevation: f32, tile_id: u32) -> Self {
        Self {
            position: position.to_array(),
            elevation,
            tile_id,
        }
    }

    /// Zip parallel attribute arrays into interleaved vertices.
    pub fn interleave(positions: &[Vec3], elevations: &[f32], tile_ids: &[u32]) -> Vec<Self> {
        debug_assert_eq!(positions.len(), elevations.len());
        debug_assert_eq!(positions.len(), tile_ids.len());
        positions
            .iter()
            .zip(elevations)
            .zip(tile_ids)
            .map(|((&p, &e), &id)| Self::new(p, e, id))
            .collect()
    }
}
