//! Screen-space error: how many meters one pixel spans at a given distance,
//! and the zoom level whose ground sample distance matches it.

use relief_geo::GroundSampleDistance;

/// Viewpoint parameters the feedback renderer uses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewParams {
    /// Vertical field of view in radians.
    pub vertical_fov: f64,
    /// Viewport height in pixels.
    pub viewport_height: u32,
}

impl ViewParams {
    pub fn from_degrees(vertical_fov_degrees: f64, viewport_height: u32) -> Self {
        Self {
            vertical_fov: vertical_fov_degrees.to_radians(),
            viewport_height,
        }
    }

    /// Angle subtended by one pixel row.
    pub fn pixel_angle(&self) -> f64 {
        self.vertical_fov / f64::from(self.viewport_height.max(1))
    }
}

/// Meters covered by one pixel at `distance` local units from the eye.
#[must_use]
pub fn pixel_error(distance: f64, view: &ViewParams, meters_per_unit: f64) -> f64 {
    2.0 * distance * (view.pixel_angle() / 2.0).tan() * meters_per_unit
}

/// Zoom level a surface at `distance` needs so one tile pixel is no larger
/// than one screen pixel.
#[must_use]
pub fn required_zoom(
    distance: f64,
    view: &ViewParams,
    meters_per_unit: f64,
    gsd: &GroundSampleDistance,
) -> u8 {
    gsd.required_zoom(pixel_error(distance, view, meters_per_unit))
}
