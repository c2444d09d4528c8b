//! Indexed triangle shapes.
//!
//! A [`Shape`] is the unit handed to the document writer: a deduplicated
//! vertex buffer, a triangle list and one [`Subset`] per material, in
//! triangle order. Shapes come from three builders:
//!
//! - [`extract::extract_mesh`] for a single mesh
//! - [`merge::concatenate`] for merge groups and merged children
//! - [`curve::CurveShape`] for NURBS curves

pub mod bounds;
pub mod curve;
pub mod density;
pub mod extract;
pub mod merge;
pub mod vertex;

pub use bounds::BoundingVolume;
pub use curve::CurveShape;
pub use density::compute_density;
pub use extract::{extract_mesh, ExtractOptions, Placement, SkinBinding};
pub use merge::concatenate;
pub use vertex::{BlendWeights, VertexBuffer, VertexRecord, VertexTag, MAX_UV_SETS};

/// Which per-vertex attributes a shape writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexFlags {
    pub normal: bool,
    pub color: bool,
    pub uvs: [bool; MAX_UV_SETS],
    pub blend_weights: bool,
    /// One bind index per vertex, no weights.
    pub single_blend_weights: bool,
    pub generic: bool,
}

impl VertexFlags {
    /// Union of two flag sets.
    pub fn union(self, other: Self) -> Self {
        Self {
            normal: self.normal || other.normal,
            color: self.color || other.color,
            uvs: std::array::from_fn(|i| self.uvs[i] || other.uvs[i]),
            blend_weights: self.blend_weights || other.blend_weights,
            single_blend_weights: self.single_blend_weights || other.single_blend_weights,
            generic: self.generic || other.generic,
        }
    }
}

/// A contiguous run of triangles sharing one material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subset {
    pub first_vertex: u32,
    pub num_vertices: u32,
    pub first_index: u32,
    pub num_indices: u32,
    pub uv_density: [Option<f32>; MAX_UV_SETS],
    pub material_slot_name: Option<String>,
}

/// An indexed triangle set ready for serialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub name: String,
    pub vertices: Vec<VertexRecord>,
    pub triangles: Vec<[u32; 3]>,
    pub subsets: Vec<Subset>,
    /// Material names, parallel to `subsets`.
    pub materials: Vec<String>,
    pub flags: VertexFlags,
    pub skin_bind_node_ids: Vec<u32>,
    pub bounding_volume: Option<BoundingVolume>,
    pub vertex_compression_range: Option<String>,
    pub mesh_usage: Option<u32>,
    pub is_optimized: Option<bool>,
}

impl Shape {
    /// A shape with no geometry.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn index_count(&self) -> usize {
        self.triangles.len() * 3
    }

    /// Recompute the UV density of every subset from the current buffers.
    pub fn update_densities(&mut self) {
        for subset in &mut self.subsets {
            subset.uv_density = compute_density(
                &self.triangles,
                &self.vertices,
                subset.first_index,
                subset.num_indices,
            );
        }
    }
}

/// `meshUsage` value of a CPU-accessible mesh.
pub const MESH_USAGE_CPU: u32 = 256;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_union() {
        let a = VertexFlags {
            normal: true,
            uvs: [true, false, false, false],
            ..Default::default()
        };
        let b = VertexFlags {
            color: true,
            uvs: [false, true, false, false],
            ..Default::default()
        };
        let u = a.union(b);
        assert!(u.normal && u.color);
        assert_eq!(u.uvs, [true, true, false, false]);
        assert!(!u.blend_weights);
    }

    #[test]
    fn test_empty_shape() {
        let shape = Shape::empty("nothing");
        assert!(shape.is_empty());
        assert_eq!(shape.index_count(), 0);
        test_support::assert_partition(&shape);
    }
}
