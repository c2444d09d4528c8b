//! Single-mesh extraction.
//!
//! Walks a triangulated mesh grouped by material, builds one
//! [`VertexRecord`] per loop corner and interns it into a
//! [`VertexBuffer`]. Each material group closes out as one [`Subset`].

use super::vertex::{BlendWeights, VertexBuffer, VertexRecord, VertexTag, MAX_UV_SETS};
use super::{Shape, Subset, VertexFlags};
use crate::error::{ExportError, Result};
use crate::scene::{ColorLayer, MeshData, MeshTriangle, SceneSource, UvLayer};
use crate::types::{AxisConversion, Trs};
use glam::{Mat4, Quat, Vec3};
use std::collections::{BTreeSet, HashMap};

/// Which attributes to pull from the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub normals: bool,
    pub colors: bool,
    pub uvs: bool,
    pub axis: AxisConversion,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            normals: true,
            colors: true,
            uvs: true,
            axis: AxisConversion::default(),
        }
    }
}

/// Where a mesh lands in the target shape's space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Applied to positions.
    pub transform: Mat4,
    /// Applied to normals.
    pub rotation: Quat,
    /// Marker baked into every vertex.
    pub tag: Option<VertexTag>,
}

impl Placement {
    /// The mesh's own local space, untagged.
    pub const IDENTITY: Self = Self {
        transform: Mat4::IDENTITY,
        rotation: Quat::IDENTITY,
        tag: None,
    };

    pub fn from_trs(trs: Trs, tag: Option<VertexTag>) -> Self {
        Self {
            transform: trs.to_matrix(),
            rotation: trs.rotation,
            tag,
        }
    }
}

/// Maps a mesh's vertex groups onto the skin bind list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinBinding {
    /// Bone node ids, written as `skinBindNodeIds`.
    pub node_ids: Vec<u32>,
    /// Vertex group index to position in `node_ids`.
    slots: HashMap<u32, u32>,
}

impl SkinBinding {
    /// Bind each vertex group whose name is a bone, in group order.
    pub fn new(vertex_groups: &[String], bone_nodes: &HashMap<String, u32>) -> Self {
        let mut binding = Self::default();
        for (group, name) in vertex_groups.iter().enumerate() {
            if let Some(&node_id) = bone_nodes.get(name) {
                binding.slots.insert(group as u32, binding.node_ids.len() as u32);
                binding.node_ids.push(node_id);
            }
        }
        binding
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    /// Influences of one vertex as `(bind index, weight)`, unbound groups dropped.
    pub fn influences(&self, weights: &[(u32, f32)]) -> Vec<(u32, f32)> {
        weights
            .iter()
            .filter_map(|&(group, weight)| self.slots.get(&group).map(|&slot| (slot, weight)))
            .collect()
    }

    /// True if at least one vertex of `mesh` has a bound influence.
    pub fn binds_any(&self, mesh: &MeshData) -> bool {
        !self.is_empty() && mesh.weights.iter().any(|w| !self.influences(w).is_empty())
    }
}

/// Sources resolved once per mesh.
struct Layers<'a> {
    normals: bool,
    color: Option<&'a ColorLayer>,
    uvs: &'a [UvLayer],
    skin: Option<&'a SkinBinding>,
}

/// Extract one mesh into a shape named after its data block.
///
/// A mesh without triangles yields an empty shape. Skin weights are only
/// written when `skin` binds at least one influence; otherwise the shape
/// has no blend weights at all.
pub fn extract_mesh(
    mesh: &MeshData,
    scene: &dyn SceneSource,
    options: &ExtractOptions,
    placement: &Placement,
    skin: Option<&SkinBinding>,
) -> Result<Shape> {
    if mesh.triangles.is_empty() {
        tracing::warn!(mesh = %mesh.name, "mesh has no triangles, exporting an empty shape");
        return Ok(Shape::empty(mesh.name.clone()));
    }

    let (materials, groups) = group_by_material(mesh);

    let skin = skin.filter(|s| s.binds_any(mesh));
    if skin.is_none() && !mesh.weights.is_empty() {
        tracing::debug!(mesh = %mesh.name, "no bound influences, blend weights disabled");
    }
    let layers = Layers {
        normals: options.normals,
        color: if options.colors { mesh.render_color_layer() } else { None },
        uvs: if options.uvs {
            &mesh.uv_layers[..mesh.uv_layers.len().min(MAX_UV_SETS)]
        } else {
            &[]
        },
        skin,
    };

    let mut buffer = VertexBuffer::new();
    let mut triangles = Vec::with_capacity(mesh.triangles.len());
    let mut subsets = Vec::with_capacity(groups.len());

    for (material, group) in groups.iter().enumerate() {
        let first_index = (triangles.len() * 3) as u32;
        let mut used = BTreeSet::new();
        for tri in group {
            let mut indices = [0u32; 3];
            for (corner, &mesh_loop) in tri.loops.iter().enumerate() {
                let record = loop_record(mesh, mesh_loop, &layers, options, placement)?;
                indices[corner] = buffer.intern(&record, material as u32);
                used.insert(indices[corner]);
            }
            triangles.push(indices);
        }

        subsets.push(Subset {
            first_vertex: used.first().copied().unwrap_or(0),
            num_vertices: used.len() as u32,
            first_index,
            num_indices: (group.len() * 3) as u32,
            uv_density: [None; MAX_UV_SETS],
            material_slot_name: scene
                .material(materials[material])
                .and_then(|m| m.slot_name.clone()),
        });
    }

    let mut uvs = [false; MAX_UV_SETS];
    uvs[..layers.uvs.len()].fill(true);

    let mut shape = Shape {
        name: mesh.name.clone(),
        vertices: buffer.into_vertices(),
        triangles,
        subsets,
        materials: materials.into_iter().map(str::to_string).collect(),
        flags: VertexFlags {
            normal: layers.normals,
            color: layers.color.is_some(),
            uvs,
            blend_weights: skin.is_some(),
            single_blend_weights: matches!(placement.tag, Some(VertexTag::BindIndex(_))),
            generic: matches!(placement.tag, Some(VertexTag::Generic(_))),
        },
        skin_bind_node_ids: skin.map(|s| s.node_ids.clone()).unwrap_or_default(),
        ..Default::default()
    };
    shape.update_densities();

    tracing::debug!(
        mesh = %mesh.name,
        vertices = shape.vertices.len(),
        triangles = shape.triangles.len(),
        subsets = shape.subsets.len(),
        "extracted mesh"
    );
    Ok(shape)
}

/// Material names in first-seen triangle order, with their triangles.
fn group_by_material(mesh: &MeshData) -> (Vec<&str>, Vec<Vec<&MeshTriangle>>) {
    let mut materials: Vec<&str> = Vec::new();
    let mut groups: Vec<Vec<&MeshTriangle>> = Vec::new();
    for tri in &mesh.triangles {
        let name = mesh.slot_material(tri.material);
        let group = match materials.iter().position(|m| *m == name) {
            Some(group) => group,
            None => {
                materials.push(name);
                groups.push(Vec::new());
                materials.len() - 1
            }
        };
        groups[group].push(tri);
    }
    (materials, groups)
}

fn loop_record(
    mesh: &MeshData,
    index: u32,
    layers: &Layers<'_>,
    options: &ExtractOptions,
    placement: &Placement,
) -> Result<VertexRecord> {
    let i = index as usize;
    let mesh_loop = mesh
        .loops
        .get(i)
        .ok_or_else(|| invalid(mesh, format!("loop {} out of range", index)))?;
    let vertex = mesh_loop.vertex as usize;
    let position = mesh
        .positions
        .get(vertex)
        .ok_or_else(|| invalid(mesh, format!("vertex {} out of range", vertex)))?;

    let axis = options.axis;
    let mut record =
        VertexRecord::new(axis.point(placement.transform.transform_point3(Vec3::from(*position))));
    if layers.normals {
        record.normal = Some(axis.point(placement.rotation * Vec3::from(mesh_loop.normal)));
    }
    if let Some(layer) = layers.color {
        record.color = layer.data.get(i).copied();
    }
    for (set, layer) in layers.uvs.iter().enumerate() {
        record.uvs[set] = layer.data.get(i).copied();
    }
    if let Some(skin) = layers.skin {
        let influences = mesh
            .weights
            .get(vertex)
            .map(|w| skin.influences(w))
            .unwrap_or_default();
        record.blend = Some(BlendWeights::strongest(influences));
    }
    record.tag = placement.tag;
    Ok(record)
}

fn invalid(mesh: &MeshData, detail: String) -> ExportError {
    ExportError::InvalidMesh(mesh.name.clone(), detail)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scene::{MaterialData, MeshTriangle, Scene};
    use crate::shape::test_support::{assert_partition, quad};
    use crate::types::AxisOrientation;

    /// Append `other` to `mesh`, assigning its triangles to `slot`.
    pub fn append(mesh: &mut MeshData, other: &MeshData, slot: usize) {
        let vertex_base = mesh.positions.len() as u32;
        let loop_base = mesh.loops.len() as u32;
        mesh.positions.extend(&other.positions);
        mesh.weights.extend(other.weights.iter().cloned());
        mesh.loops.extend(other.loops.iter().map(|l| crate::scene::MeshLoop {
            vertex: l.vertex + vertex_base,
            normal: l.normal,
        }));
        mesh.triangles.extend(other.triangles.iter().map(|t| MeshTriangle {
            material: slot,
            loops: t.loops.map(|l| l + loop_base),
        }));
        for (layer, extra) in mesh.uv_layers.iter_mut().zip(&other.uv_layers) {
            layer.data.extend(&extra.data);
        }
    }

    fn keep_axes() -> ExtractOptions {
        ExtractOptions {
            axis: AxisConversion::new(AxisOrientation::KeepTransforms),
            ..Default::default()
        }
    }

    #[test]
    fn test_quad_dedups_shared_corners() {
        let scene = Scene::default();
        let mesh = quad([0.0; 3], 0.5);
        let shape = extract_mesh(&mesh, &scene, &keep_axes(), &Placement::IDENTITY, None).unwrap();

        assert_eq!(shape.vertices.len(), 4);
        assert_eq!(shape.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        assert_eq!(shape.materials, vec!["default".to_string()]);
        assert_eq!(shape.subsets.len(), 1);
        assert_eq!(shape.subsets[0].num_vertices, 4);
        assert_eq!(shape.subsets[0].uv_density[0], Some(0.5));
        assert!(shape.flags.normal && shape.flags.uvs[0] && !shape.flags.color);
        assert_partition(&shape);
    }

    #[test]
    fn test_two_materials_first_seen_order() {
        let mut scene = Scene::default();
        scene.materials.push(MaterialData {
            slot_name: Some("body".into()),
            ..MaterialData::named("Paint")
        });

        let mut mesh = quad([0.0; 3], 0.5);
        mesh.materials = vec![Some("Paint".into()), Some("Chrome".into())];
        for tri in &mut mesh.triangles {
            tri.material = 1;
        }
        append(&mut mesh, &quad([2.0, 0.0, 0.0], 0.25), 0);

        let shape = extract_mesh(&mesh, &scene, &keep_axes(), &Placement::IDENTITY, None).unwrap();
        assert_eq!(shape.materials, vec!["Chrome".to_string(), "Paint".to_string()]);
        assert_eq!(shape.vertices.len(), 8);

        let second = &shape.subsets[1];
        assert_eq!(second.first_vertex, 4);
        assert_eq!(second.num_vertices, 4);
        assert_eq!(second.first_index, 6);
        assert_eq!(second.num_indices, 6);
        assert_eq!(second.material_slot_name.as_deref(), Some("body"));
        assert_eq!(shape.subsets[0].uv_density[0], Some(0.5));
        assert_eq!(second.uv_density[0], Some(0.25));
        assert_partition(&shape);
    }

    #[test]
    fn test_clamped_and_degenerate_subsets() {
        let scene = Scene::default();
        // Material A: every triangle at ratio 2.0, clamped to 1.
        let mut mesh = quad([0.0; 3], 2.0);
        mesh.materials = vec![Some("A".into()), Some("B".into())];
        append(&mut mesh, &quad([0.0, 2.0, 0.0], 2.0), 0);

        // Material B: one quad with a collapsed UV edge on its first triangle.
        let mut b = quad([3.0, 0.0, 0.0], 0.5);
        b.uv_layers[0].data[1] = b.uv_layers[0].data[0];
        append(&mut mesh, &b, 1);

        let shape = extract_mesh(&mesh, &scene, &keep_axes(), &Placement::IDENTITY, None).unwrap();
        assert_eq!(shape.subsets[0].uv_density[0], Some(1.0));
        assert_eq!(shape.subsets[1].uv_density[0], Some(0.5));
        assert_partition(&shape);
    }

    #[test]
    fn test_none_slot_becomes_default() {
        let scene = Scene::default();
        let mut mesh = quad([0.0; 3], 1.0);
        mesh.materials = vec![None];
        let shape = extract_mesh(&mesh, &scene, &keep_axes(), &Placement::IDENTITY, None).unwrap();
        assert_eq!(shape.materials, vec!["default".to_string()]);
    }

    #[test]
    fn test_axis_correction_on_positions_and_normals() {
        let scene = Scene::default();
        let mesh = quad([0.0, 0.0, 0.0], 1.0);
        let shape =
            extract_mesh(&mesh, &scene, &ExtractOptions::default(), &Placement::IDENTITY, None)
                .unwrap();
        // Host (1, 1, 0) lands at (1, 0, -1); normal +Z becomes +Y.
        assert_eq!(shape.vertices[2].position, Vec3::new(1.0, 0.0, -1.0));
        assert_eq!(shape.vertices[0].normal, Some(Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_placement_transforms_and_tags() {
        let scene = Scene::default();
        let mesh = quad([0.0; 3], 1.0);
        let placement = Placement::from_trs(
            Trs {
                translation: Vec3::new(10.0, 0.0, 0.0),
                ..Trs::IDENTITY
            },
            Some(VertexTag::Generic(0.5)),
        );
        let shape = extract_mesh(&mesh, &scene, &keep_axes(), &placement, None).unwrap();
        assert_eq!(shape.vertices[0].position, Vec3::new(10.0, 0.0, 0.0));
        assert!(shape.vertices.iter().all(|v| v.tag == Some(VertexTag::Generic(0.5))));
        assert!(shape.flags.generic && !shape.flags.single_blend_weights);
    }

    #[test]
    fn test_skin_weights_bound_through_groups() {
        let scene = Scene::default();
        let mut mesh = quad([0.0; 3], 1.0);
        mesh.weights = vec![
            vec![(0, 1.0)],
            vec![(0, 0.25), (1, 0.75)],
            vec![(2, 1.0)],
            vec![],
        ];
        let groups = vec!["Hip".to_string(), "Knee".to_string(), "Unused".to_string()];
        let bones = HashMap::from([("Hip".to_string(), 7), ("Knee".to_string(), 9)]);
        let skin = SkinBinding::new(&groups, &bones);

        let shape = extract_mesh(&mesh, &scene, &keep_axes(), &Placement::IDENTITY, Some(&skin))
            .unwrap();
        assert!(shape.flags.blend_weights);
        assert_eq!(shape.skin_bind_node_ids, vec![7, 9]);

        let blend = shape.vertices[1].blend.unwrap();
        assert_eq!(blend.indices, [1, 0, 0, 0]);
        assert_eq!(blend.weights, [0.75, 0.25, 0.0, 0.0]);
        // Group 2 has no bone, so vertex 2 has no influences.
        assert_eq!(shape.vertices[2].blend.unwrap().weights, [0.0; 4]);
    }

    #[test]
    fn test_unbound_skin_disables_blend_weights() {
        let scene = Scene::default();
        let mut mesh = quad([0.0; 3], 1.0);
        mesh.weights = vec![vec![(0, 1.0)]; 4];
        let skin = SkinBinding::new(&["Tail".to_string()], &HashMap::new());

        let shape = extract_mesh(&mesh, &scene, &keep_axes(), &Placement::IDENTITY, Some(&skin))
            .unwrap();
        assert!(!shape.flags.blend_weights);
        assert!(shape.skin_bind_node_ids.is_empty());
        assert!(shape.vertices.iter().all(|v| v.blend.is_none()));
    }

    #[test]
    fn test_empty_mesh_gives_empty_shape() {
        let scene = Scene::default();
        let mesh = MeshData {
            name: "nothing".into(),
            ..Default::default()
        };
        let shape = extract_mesh(&mesh, &scene, &keep_axes(), &Placement::IDENTITY, None).unwrap();
        assert!(shape.is_empty());
        assert!(shape.subsets.is_empty());
        assert!(shape.materials.is_empty());
    }

    #[test]
    fn test_out_of_range_loop_is_an_error() {
        let scene = Scene::default();
        let mut mesh = quad([0.0; 3], 1.0);
        mesh.triangles[0].loops[0] = 99;
        let result = extract_mesh(&mesh, &scene, &keep_axes(), &Placement::IDENTITY, None);
        assert!(matches!(result, Err(ExportError::InvalidMesh(_, _))));
    }
}
