//! Bounding spheres.

use super::vertex::VertexRecord;
use crate::scene::{ObjectId, SceneSource};
use crate::types::{AxisConversion, BoundingBox, Trs};
use glam::Vec3;

/// A sphere written as `bvCenter` / `bvRadius`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingVolume {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingVolume {
    /// Centroid of the vertex positions and the largest distance from it.
    pub fn from_vertices(vertices: &[VertexRecord]) -> Option<Self> {
        if vertices.is_empty() {
            return None;
        }
        let sum: Vec3 = vertices.iter().map(|v| v.position).sum();
        let center = sum / vertices.len() as f32;
        let radius = vertices
            .iter()
            .map(|v| v.position.distance(center))
            .fold(0.0f32, f32::max);
        Some(Self { center, radius })
    }

    /// Sphere donated by `proxy`'s bounding box, in `owner`'s local space.
    ///
    /// The center is the box centroid carried through the proxy's world
    /// transform and the owner's inverse world transform. The radius is half
    /// the longest world-scaled box dimension.
    pub fn from_proxy(
        scene: &dyn SceneSource,
        proxy: ObjectId,
        owner: ObjectId,
        axis: AxisConversion,
    ) -> Option<Self> {
        let corners = scene.bounding_box_corners(proxy)?;
        let centroid = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;

        let proxy_world = scene.world_transform(proxy);
        let world_center = proxy_world.transform_point3(centroid);
        let local_center = scene
            .world_transform(owner)
            .inverse()
            .transform_point3(world_center);

        let bbox = BoundingBox::from_points(corners.iter().map(|c| c.to_array()))?;
        let extent = Vec3::from(bbox.dimensions()) * Trs::from_matrix(proxy_world).scale;

        Some(Self {
            center: axis.point(local_center),
            radius: extent.max_element() / 2.0,
        })
    }
}
