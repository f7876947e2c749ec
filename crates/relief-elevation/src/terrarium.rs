//! Raw RGBA rasters and the terrarium elevation encoding.
//!
//! A terrarium pixel stores `height + 32768` as 16.8 fixed point: red is the
//! high byte, green the low byte, blue the fraction. Alpha is ignored.

use std::io::Cursor;

use crate::{ElevationGrid, GridError};

/// Offset added to heights so the encoded value is non-negative.
pub const TERRARIUM_OFFSET: f64 = 32768.0;

/// An undecoded tile raster in 8-bit RGBA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl RawImage {
    /// # Panics
    ///
    /// Panics if `rgba` is not `width * height * 4` bytes long.
    #[must_use]
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        assert_eq!(
            rgba.len(),
            (width as usize) * (height as usize) * 4,
            "rgba buffer does not match {width}x{height}"
        );
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Encode a height field as a terrarium raster.
    pub fn from_heights(size: u32, mut height: impl FnMut(u32, u32) -> f64) -> Self {
        let mut rgba = Vec::with_capacity((size as usize) * (size as usize) * 4);
        for y in 0..size {
            for x in 0..size {
                rgba.extend_from_slice(&encode_terrarium(height(x, y)));
            }
        }
        Self::new(size, size, rgba)
    }

    /// RGBA bytes of the pixel at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        [
            self.rgba[i],
            self.rgba[i + 1],
            self.rgba[i + 2],
            self.rgba[i + 3],
        ]
    }

    /// Decode PNG (or JPEG) bytes into an RGBA raster.
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::new(width, height, img.into_raw()))
    }

    /// Encode as PNG bytes.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut out = Cursor::new(Vec::new());
        image::write_buffer_with_format(
            &mut out,
            &self.rgba,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )?;
        Ok(out.into_inner())
    }
}

/// Height in meters encoded by one terrarium pixel.
#[inline]
#[must_use]
pub fn decode_terrarium(r: u8, g: u8, b: u8) -> f64 {
    f64::from(r) * 256.0 + f64::from(g) + f64::from(b) / 256.0 - TERRARIUM_OFFSET
}

/// Terrarium pixel for a height in meters, clamped to the encodable range.
#[must_use]
pub fn encode_terrarium(height: f64) -> [u8; 4] {
    let v = (height + TERRARIUM_OFFSET).clamp(0.0, 65535.0 + 255.0 / 256.0);
    let whole = v.floor();
    let r = (whole / 256.0).floor();
    let g = whole - r * 256.0;
    let b = ((v - whole) * 256.0).floor();
    [r as u8, g as u8, b as u8, 255]
}

/// Decode a square terrarium raster into heights.
pub fn decode(image: &RawImage) -> Result<ElevationGrid, GridError> {
    if image.width != image.height {
        return Err(GridError::NotSquare {
            width: image.width,
            height: image.height,
        });
    }
    let heights = image
        .rgba
        .chunks_exact(4)
        .map(|px| decode_terrarium(px[0], px[1], px[2]) as f32)
        .collect();
    ElevationGrid::from_heights(image.width, heights)
}
