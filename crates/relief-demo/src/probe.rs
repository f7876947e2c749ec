//! Software feedback renderer.
//!
//! Rasterizes leaf geometry from a viewpoint into the three feedback buffers
//! a GPU feedback pass would produce: tile id, distance from the eye, and the
//! zoom level each pixel requires.

use glam::{DMat4, DVec3, DVec4};
use relief_geo::GroundSampleDistance;
use relief_lod::{FeedbackImages, FeedbackPixel, ViewParams, required_zoom};
use relief_quadtree::{CompactId, TileTree};

const NEAR: f64 = 1e-4;

/// Viewpoint and resolution of the feedback pass.
#[derive(Clone, Debug)]
pub struct Probe {
    pub eye: DVec3,
    pub target: DVec3,
    pub up: DVec3,
    /// Screen the error is measured against.
    pub view: ViewParams,
    /// Feedback resolution; usually a fraction of the screen.
    pub width: u32,
    pub height: u32,
    pub gsd: GroundSampleDistance,
}

#[derive(Clone, Copy)]
struct Hit {
    id: CompactId,
    distance: f64,
}

impl Probe {
    /// Render feedback for the current leaves of `tree`.
    pub fn render(&self, tree: &TileTree) -> FeedbackImages {
        let meters_per_unit = tree.frame().meters_per_unit();
        let mut hits: Vec<Option<Hit>> = vec![None; self.width as usize * self.height as usize];
        let clip_from_world = self.clip_from_world();

        for key in tree.leaf_nodes() {
            let Some(node) = tree.node(key) else {
                continue;
            };
            let Some(geometry) = node.geometry() else {
                continue;
            };
            let id = node.id();
            for tri in geometry.indices.chunks_exact(3) {
                let corners = [
                    geometry.positions[tri[0] as usize].as_dvec3(),
                    geometry.positions[tri[1] as usize].as_dvec3(),
                    geometry.positions[tri[2] as usize].as_dvec3(),
                ];
                self.raster_triangle(&clip_from_world, corners, id, &mut hits);
            }
        }

        FeedbackImages::from_fn(self.width, self.height, |x, y| {
            let hit = hits[(y * self.width + x) as usize]?;
            Some(FeedbackPixel {
                id: hit.id,
                required_zoom: required_zoom(hit.distance, &self.view, meters_per_unit, &self.gsd),
                distance: hit.distance,
            })
        })
    }

    fn clip_from_world(&self) -> DMat4 {
        let aspect = f64::from(self.width) / f64::from(self.height.max(1));
        let projection = DMat4::perspective_infinite_rh(self.view.vertical_fov, aspect, NEAR);
        projection * DMat4::look_at_rh(self.eye, self.target, self.up)
    }

    fn raster_triangle(
        &self,
        clip_from_world: &DMat4,
        corners: [DVec3; 3],
        id: CompactId,
        hits: &mut [Option<Hit>],
    ) {
        let clip = corners.map(|p| *clip_from_world * DVec4::new(p.x, p.y, p.z, 1.0));
        // No near-plane clipping: triangles crossing behind the eye are dropped.
        if clip.iter().any(|c| c.w <= NEAR) {
            return;
        }
        let (w, h) = (f64::from(self.width), f64::from(self.height));
        let screen = clip.map(|c| {
            let ndc_x = c.x / c.w;
            let ndc_y = c.y / c.w;
            ((ndc_x * 0.5 + 0.5) * w, (0.5 - ndc_y * 0.5) * h)
        });

        let area = edge(screen[0], screen[1], screen[2]);
        if area.abs() < f64::EPSILON {
            return;
        }

        let min_x = screen.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
        let max_x = screen.iter().map(|s| s.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = screen.iter().map(|s| s.1).fold(f64::INFINITY, f64::min);
        let max_y = screen.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);
        if max_x < 0.0 || max_y < 0.0 || min_x >= w || min_y >= h {
            return;
        }
        let x0 = min_x.floor().max(0.0) as u32;
        let x1 = (max_x.ceil().min(w - 1.0)) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let y1 = (max_y.ceil().min(h - 1.0)) as u32;

        let inv_w = clip.map(|c| 1.0 / c.w);
        for py in y0..=y1 {
            for px in x0..=x1 {
                let p = (f64::from(px) + 0.5, f64::from(py) + 0.5);
                let b0 = edge(screen[1], screen[2], p) / area;
                let b1 = edge(screen[2], screen[0], p) / area;
                let b2 = edge(screen[0], screen[1], p) / area;
                if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                    continue;
                }
                // Perspective-correct position.
                let q = b0 * inv_w[0] + b1 * inv_w[1] + b2 * inv_w[2];
                let world = (corners[0] * (b0 * inv_w[0])
                    + corners[1] * (b1 * inv_w[1])
                    + corners[2] * (b2 * inv_w[2]))
                    / q;
                let distance = world.distance(self.eye);

                let slot = &mut hits[(py * self.width + px) as usize];
                if slot.is_none_or(|hit| distance < hit.distance) {
                    *slot = Some(Hit { id, distance });
                }
            }
        }
    }
}

#[inline]
fn edge(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_elevation::{MemoryTileSource, RawImage};
    use relief_geo::{GlobeReference, TileAddress};
    use relief_lod::read_tile_data;
    use relief_quadtree::{NullScene, TileBuilder, TreeConfig};
    use std::sync::Arc;

    const ROOT: TileAddress = TileAddress { x: 102, y: 200, z: 9 };

    fn flat_tree() -> TileTree {
        let source = MemoryTileSource::uniform(RawImage::from_heights(16, |_, _| 0.0));
        let builder = TileBuilder::new(Arc::new(source), 17).unwrap();
        let config = TreeConfig {
            root: ROOT,
            ..TreeConfig::default()
        };
        let frame = GlobeReference::new(ROOT, 1.0);
        let mut tree = TileTree::new(&config, builder, frame, Box::new(NullScene)).unwrap();
        assert_eq!(tree.rebuild_all(), 1);
        tree
    }

    /// Straight down onto the frame origin from `altitude` meters.
    fn overhead(tree: &TileTree, altitude: f64) -> Probe {
        let units = altitude / tree.frame().meters_per_unit();
        Probe {
            eye: DVec3::new(0.0, 0.0, units),
            target: DVec3::ZERO,
            up: DVec3::NEG_X,
            view: ViewParams::from_degrees(75.0, 400),
            width: 64,
            height: 40,
            gsd: GroundSampleDistance::default(),
        }
    }

    fn center(images: &FeedbackImages) -> FeedbackPixel {
        let index = (images.height() / 2 * images.width() + images.width() / 2) as usize;
        images.pixel(index).expect("center pixel covered")
    }

    #[test]
    fn test_center_pixel_sees_tile() {
        let tree = flat_tree();
        let probe = overhead(&tree, 20_000.0);
        let images = probe.render(&tree);

        let root_id = tree.node(tree.root()).unwrap().id();
        let pixel = center(&images);
        assert_eq!(pixel.id, root_id);
        let meters = pixel.distance * tree.frame().meters_per_unit();
        assert!((meters - 20_000.0).abs() < 500.0, "distance {meters} m");
    }

    #[test]
    fn test_nearer_view_requires_deeper_zoom() {
        let tree = flat_tree();
        let far = center(&overhead(&tree, 50_000.0).render(&tree));
        let near = center(&overhead(&tree, 5_000.0).render(&tree));
        assert!(
            near.required_zoom > far.required_zoom,
            "near {} vs far {}",
            near.required_zoom,
            far.required_zoom
        );
    }

    #[test]
    fn test_looking_away_renders_background() {
        let tree = flat_tree();
        let mut probe = overhead(&tree, 20_000.0);
        probe.target = probe.eye * 2.0;
        let images = probe.render(&tree);
        assert!(read_tile_data(&images).is_empty());
        assert!(images.pixel(0).is_none());
    }

    #[test]
    fn test_aggregates_to_single_tile() {
        let tree = flat_tree();
        let images = overhead(&tree, 20_000.0).render(&tree);
        let samples = read_tile_data(&images);
        assert_eq!(samples.len(), 1);
        let root_id = tree.node(tree.root()).unwrap().id();
        assert!(samples[&root_id].pixels > 0);
    }
}
