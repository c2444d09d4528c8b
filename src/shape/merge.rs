//! Concatenation of several extracted shapes into one.
//!
//! Members are extracted independently, so no vertex is shared across
//! members. Subsets are regrouped by material: for each material in
//! first-seen order, every member's subset for that material is appended
//! in member order and the indices are rebased onto the growing buffer.

use super::vertex::{VertexTag, MAX_UV_SETS};
use super::{Shape, Subset};
use crate::types::Trs;
use glam::Mat4;

/// Divisor of the per-child `generic` marker.
pub const GENERIC_TAG_SCALE: f32 = 32767.0;

/// The `generic` marker of the `index`-th merged child.
pub fn child_tag(index: usize) -> VertexTag {
    VertexTag::Generic(index as f32 / GENERIC_TAG_SCALE)
}

/// Decompose a member's transform relative to the merge root.
pub fn relative_trs(root_world: Mat4, member_world: Mat4) -> Trs {
    Trs::from_matrix(root_world.inverse() * member_world)
}

/// Concatenate member shapes into one shape named `name`.
///
/// The result carries the union of the members' materials and vertex
/// flags. Densities are recomputed on the final subsets.
pub fn concatenate(name: impl Into<String>, parts: &[Shape]) -> Shape {
    let mut materials: Vec<String> = Vec::new();
    let mut slot_names: Vec<Option<String>> = Vec::new();
    for part in parts {
        for (material, subset) in part.materials.iter().zip(&part.subsets) {
            match materials.iter().position(|m| m == material) {
                Some(existing) => {
                    if slot_names[existing].is_none() {
                        slot_names[existing] = subset.material_slot_name.clone();
                    }
                }
                None => {
                    materials.push(material.clone());
                    slot_names.push(subset.material_slot_name.clone());
                }
            }
        }
    }

    let mut shape = Shape::empty(name);
    let mut vertex_base = 0u32;
    let mut index_base = 0u32;

    for (material, slot_name) in materials.iter().zip(slot_names) {
        let mut merged = Subset {
            first_vertex: vertex_base,
            first_index: index_base,
            uv_density: [None; MAX_UV_SETS],
            material_slot_name: slot_name,
            ..Default::default()
        };

        for part in parts {
            let Some(position) = part.materials.iter().position(|m| m == material) else {
                continue;
            };
            let Some(subset) = part.subsets.get(position) else {
                continue;
            };

            let first = subset.first_vertex as usize;
            let count = subset.num_vertices as usize;
            shape
                .vertices
                .extend_from_slice(&part.vertices[first..first + count]);

            let first_tri = subset.first_index as usize / 3;
            let tri_count = subset.num_indices as usize / 3;
            shape.triangles.extend(
                part.triangles[first_tri..first_tri + tri_count]
                    .iter()
                    .map(|tri| tri.map(|i| i - subset.first_vertex + vertex_base)),
            );

            merged.num_vertices += subset.num_vertices;
            merged.num_indices += subset.num_indices;
            vertex_base += subset.num_vertices;
            index_base += subset.num_indices;
        }

        shape.subsets.push(merged);
    }

    shape.materials = materials;
    shape.flags = parts
        .iter()
        .fold(Default::default(), |flags, part| flags.union(part.flags));
    shape.flags.color |= shape.vertices.iter().any(|v| v.color.is_some());
    shape.update_densities();

    tracing::debug!(
        shape = %shape.name,
        members = parts.len(),
        vertices = shape.vertices.len(),
        triangles = shape.triangles.len(),
        "merged shape"
    );
    shape
}
