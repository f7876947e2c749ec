//! Fixed-point packing of bounded non-negative numbers into RGBA8 pixels.
//!
//! A value `v` in `[0, 65536)` is stored as four base-256 digits of
//! `v / 65536`, most significant in alpha:
//!
//! `v = a·256 + b + g/256 + r/65536`
//!
//! An all-zero pixel decodes to `0`, which doubles as the background value of
//! the tile id image.

/// Exclusive upper bound of packable values.
pub const PACK_LIMIT: f64 = 65_536.0;

const STEPS: f64 = 65_536.0;

/// Pack `value` into `[r, g, b, a]`. Values are clamped to the packable
/// range and rounded to the nearest `1/65536`.
#[must_use]
pub fn pack_number(value: f64) -> [u8; 4] {
    let fixed = if value.is_nan() {
        0
    } else {
        (value * STEPS).round().clamp(0.0, f64::from(u32::MAX)) as u32
    };
    let [a, b, g, r] = fixed.to_be_bytes();
    [r, g, b, a]
}

/// Inverse of [`pack_number`].
#[must_use]
pub fn unpack_number(rgba: [u8; 4]) -> f64 {
    let [r, g, b, a] = rgba;
    f64::from(u32::from_be_bytes([a, b, g, r])) / STEPS
}

/// Unpack the pixel at `index` of an RGBA8 buffer.
#[inline]
pub(crate) fn unpack_at(buffer: &[u8], index: usize) -> f64 {
    let o = index * 4;
    unpack_number([buffer[o], buffer[o + 1], buffer[o + 2], buffer[o + 3]])
}
