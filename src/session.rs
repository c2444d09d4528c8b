//! One export run.
//!
//! [`ExportSession`] owns every piece of per-run state: the mesh evaluation
//! cache and the shape, material and file registries. A session is created
//! for one export and consumed by [`ExportSession::build`], so repeated or
//! concurrent exports never share state.

use crate::config::ExportConfig;
use crate::document::{
    FileEntry, I3dDocument, MaterialEntry, ShapeEntry, ShapeGeometry, UserAttributeEntry,
};
use crate::error::{ExportError, Result};
use crate::graph::{NodeKind, SceneGraph, ShapeRef};
use crate::paths::{resolve_file, FileRef};
use crate::registry::Registry;
use crate::scene::{
    LightType, MaterialData, MeshData, MeshSettings, ObjectId, ObjectKind, SceneSource,
    DEFAULT_MATERIAL,
};
use crate::shape::merge::{child_tag, relative_trs};
use crate::shape::{
    concatenate, extract_mesh, BoundingVolume, CurveShape, Placement, Shape, SkinBinding,
    VertexTag, MESH_USAGE_CPU,
};
use glam::Mat4;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::rc::Rc;

/// Identity of a shape in the shape registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShapeKey {
    /// A mesh data block, shared by all its instances.
    Mesh(String),
    Curve(String),
    /// Merged children of the node with this id.
    MergedChildren(u32),
    /// Merge group by number.
    MergeGroup(u32),
}

/// Members of one merge group, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MergeGroupPlan {
    number: u32,
    members: Vec<usize>,
}

/// Key under which a merge group's root looks up a bounding-volume proxy.
fn merge_group_proxy_key(number: u32) -> String {
    format!("MERGEGROUP_{}", number)
}

/// State of a single export run.
pub struct ExportSession<'a> {
    scene: &'a dyn SceneSource,
    config: ExportConfig,
    output_dir: Option<PathBuf>,
    mesh_cache: HashMap<(ObjectId, bool), Rc<MeshData>>,
    shapes: Registry<ShapeKey>,
    materials: Registry<String>,
    files: Registry<FileRef>,
}

impl<'a> ExportSession<'a> {
    pub fn new(scene: &'a dyn SceneSource, config: ExportConfig) -> Self {
        Self {
            scene,
            config,
            output_dir: None,
            mesh_cache: HashMap::new(),
            shapes: Registry::new(),
            materials: Registry::new(),
            files: Registry::new(),
        }
    }

    /// Directory the document is written to, used for relative file paths.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Build the complete document.
    pub fn build(mut self, name: &str) -> Result<I3dDocument> {
        tracing::info!(document = %name, "building i3d document");

        let mut graph = SceneGraph::build(self.scene, &self.config);
        let proxies = self.collect_proxies(&mut graph);
        if self.config.export_shapes {
            mark_merged_children(&mut graph);
        }
        self.register_ies_files(&mut graph);
        let groups = if self.config.export_merge_groups {
            collect_merge_groups(&graph)
        } else {
            Vec::new()
        };

        let shapes = self.generate_shapes(&mut graph, &groups, &proxies)?;
        let materials = self.material_entries();
        let user_attributes = if self.config.export_user_attributes {
            user_attribute_entries(&graph)
        } else {
            Vec::new()
        };
        let files: Vec<FileEntry> = self
            .files
            .iter()
            .map(|(id, file)| FileEntry {
                id,
                file: file.clone(),
            })
            .collect();

        tracing::info!(
            shapes = shapes.len(),
            materials = materials.len(),
            files = files.len(),
            "document built"
        );

        Ok(I3dDocument {
            name: name.to_string(),
            program: self.config.program_name.clone(),
            version: self.config.program_version.clone(),
            files,
            materials,
            shapes,
            scene: graph,
            user_attributes,
        })
    }

    /// Evaluated mesh of an object, cached for the rest of the run.
    pub fn evaluated_mesh(&mut self, id: ObjectId) -> Result<Rc<MeshData>> {
        let key = (id, self.config.apply_modifiers);
        if let Some(mesh) = self.mesh_cache.get(&key) {
            tracing::debug!(object = id.0, "mesh cache hit");
            return Ok(Rc::clone(mesh));
        }
        let mesh = self
            .scene
            .evaluated_mesh(id, self.config.apply_modifiers)
            .ok_or_else(|| ExportError::MissingMesh(self.object_name(id)))?;
        let mesh = Rc::new(mesh);
        self.mesh_cache.insert(key, Rc::clone(&mesh));
        Ok(mesh)
    }

    fn object_name(&self, id: ObjectId) -> String {
        self.scene
            .object(id)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| format!("#{}", id.0))
    }

    fn register_file(&mut self, path: &str) -> u32 {
        let file = resolve_file(path, self.output_dir.as_deref(), &self.config);
        self.files.assign(file)
    }

    /// Id of an already registered file.
    fn file_id(&mut self, path: &Option<String>) -> Option<u32> {
        path.as_deref().map(|p| self.register_file(p))
    }

    /// Map each bounding-volume target to its proxy object.
    ///
    /// Proxies never become shapes. A proxy without children only donates
    /// its box and is pruned from the written scene.
    fn collect_proxies(&mut self, graph: &mut SceneGraph) -> HashMap<String, ObjectId> {
        let mut proxies = HashMap::new();
        let mut pruned = Vec::new();
        for index in graph.preorder() {
            let node = &mut graph.nodes[index];
            let (Some(target), Some(object)) = (node.settings.bounding_volume.clone(), node.object())
            else {
                continue;
            };
            proxies.entry(target).or_insert(object);
            node.kind = NodeKind::TransformGroup;
            if node.children.is_empty() {
                pruned.push(index);
            }
        }
        for index in pruned {
            tracing::debug!(node = %graph.nodes[index].name, "pruning bounding volume proxy");
            graph.prune(index);
        }
        proxies
    }

    /// IES profiles are registered first, in traversal order.
    fn register_ies_files(&mut self, graph: &mut SceneGraph) {
        for index in graph.preorder() {
            let path = match &graph.nodes[index].kind {
                NodeKind::Light(light) if light.light_type == LightType::Spot => {
                    light.ies_profile_file.clone()
                }
                _ => None,
            };
            if let Some(path) = path {
                graph.nodes[index].ies_file_id = Some(self.register_file(&path));
            }
        }
    }

    fn generate_shapes(
        &mut self,
        graph: &mut SceneGraph,
        groups: &[MergeGroupPlan],
        proxies: &HashMap<String, ObjectId>,
    ) -> Result<Vec<ShapeEntry>> {
        let mut entries: Vec<ShapeEntry> = Vec::new();

        for index in graph.preorder() {
            let node = &graph.nodes[index];
            let merged_children = !node.write_children;
            let group = groups.iter().find(|g| g.members.contains(&index));
            let key = match &node.kind {
                _ if merged_children => Some(ShapeKey::MergedChildren(node.node_id)),
                NodeKind::Mesh(_) => match group {
                    Some(group) if group.members[0] == index => {
                        Some(ShapeKey::MergeGroup(group.number))
                    }
                    Some(_) => None,
                    None => node.object().and_then(|id| self.mesh_key(id)),
                },
                NodeKind::NurbsCurve => node.object().and_then(|id| self.curve_key(id)),
                _ => None,
            };
            // Other group members only keep their transform.
            if group.is_some_and(|g| g.members[0] != index) {
                graph.nodes[index].kind = NodeKind::TransformGroup;
            }
            let Some(key) = key else {
                continue;
            };

            let shape_id = match self.shapes.id(&key) {
                Some(id) => id,
                None => {
                    let geometry = self.build_shape(graph, index, &key, groups, proxies)?;
                    let id = self.shapes.assign(key);
                    if let ShapeGeometry::Triangles(shape) = &geometry {
                        for material in &shape.materials {
                            self.materials.assign(material.clone());
                        }
                    }
                    entries.push(ShapeEntry { id, geometry });
                    id
                }
            };

            let shape_ref = entries
                .iter()
                .find(|e| e.id == shape_id)
                .map(|entry| self.shape_ref(entry, merged_children))
                .unwrap_or_default();
            let node = &mut graph.nodes[index];
            if merged_children && !matches!(node.kind, NodeKind::Mesh(_)) {
                node.kind = NodeKind::Mesh(MeshSettings::default());
            }
            node.shape = Some(shape_ref);
        }

        Ok(entries)
    }

    fn mesh_key(&self, id: ObjectId) -> Option<ShapeKey> {
        match &self.scene.object(id)?.kind {
            ObjectKind::Mesh {
                mesh,
                evaluated_mesh,
                ..
            } => {
                let name = match evaluated_mesh {
                    Some(evaluated) if self.config.apply_modifiers => evaluated,
                    _ => mesh,
                };
                Some(ShapeKey::Mesh(name.clone()))
            }
            _ => None,
        }
    }

    fn curve_key(&self, id: ObjectId) -> Option<ShapeKey> {
        match &self.scene.object(id)?.kind {
            ObjectKind::Curve { curve } => Some(ShapeKey::Curve(curve.clone())),
            _ => None,
        }
    }

    fn shape_ref(&self, entry: &ShapeEntry, merged_children: bool) -> ShapeRef {
        let ShapeGeometry::Triangles(shape) = &entry.geometry else {
            return ShapeRef {
                shape_id: entry.id,
                ..Default::default()
            };
        };
        let mut material_ids: Vec<u32> = shape
            .materials
            .iter()
            .filter_map(|m| self.materials.id(m))
            .collect();
        if merged_children {
            let first = material_ids.first().copied();
            material_ids = first
                .map(|id| vec![id; shape.subsets.len().max(1)])
                .unwrap_or_default();
        }
        ShapeRef {
            shape_id: entry.id,
            material_ids,
            skin_bind_node_ids: shape.skin_bind_node_ids.clone(),
        }
    }

    fn build_shape(
        &mut self,
        graph: &SceneGraph,
        index: usize,
        key: &ShapeKey,
        groups: &[MergeGroupPlan],
        proxies: &HashMap<String, ObjectId>,
    ) -> Result<ShapeGeometry> {
        let shape = match key {
            ShapeKey::Curve(name) => {
                let curve = self
                    .scene
                    .curve(name)
                    .ok_or_else(|| ExportError::MissingMesh(name.clone()))?;
                return Ok(ShapeGeometry::Curve(CurveShape::from_curve(
                    curve,
                    self.config.axis(),
                )));
            }
            ShapeKey::Mesh(_) => self.mesh_shape(graph, index, proxies)?,
            ShapeKey::MergedChildren(_) => self.merged_children_shape(graph, index, proxies)?,
            ShapeKey::MergeGroup(number) => {
                match groups.iter().find(|g| g.number == *number) {
                    Some(group) => self.merge_group_shape(graph, group, proxies)?,
                    None => Shape::empty(format!("mergeGroupShape{}", number)),
                }
            }
        };
        Ok(ShapeGeometry::Triangles(shape))
    }

    fn mesh_shape(
        &mut self,
        graph: &SceneGraph,
        index: usize,
        proxies: &HashMap<String, ObjectId>,
    ) -> Result<Shape> {
        let node = graph.node(index);
        let Some(object) = node.object() else {
            return Ok(Shape::empty(node.name.clone()));
        };
        let settings = mesh_settings(&node.kind);
        let mesh = self.evaluated_mesh(object)?;
        let skin = self.skin_binding(graph, &settings);

        let mut shape = extract_mesh(
            &mesh,
            self.scene,
            &self.config.extract_options(),
            &Placement::IDENTITY,
            skin.as_ref(),
        )?;
        apply_mesh_settings(&mut shape, &settings);
        shape.bounding_volume = self.bounding_volume(&[node.name.clone()], object, &shape, proxies);
        Ok(shape)
    }

    /// Merge every mesh child of a node into one shape.
    ///
    /// Children are tagged `i / 32767` by their sorted position, including
    /// positions of children that are not meshes.
    fn merged_children_shape(
        &mut self,
        graph: &SceneGraph,
        index: usize,
        proxies: &HashMap<String, ObjectId>,
    ) -> Result<Shape> {
        let node = graph.node(index);
        let name = format!("MergedChildren{}", node.node_id);
        let Some(object) = node.object() else {
            return Ok(Shape::empty(name));
        };
        let freeze = node.settings.merge_children.unwrap_or_default();
        let node_world = self.scene.world_transform(object);
        let root_world = if freeze.any_frozen() {
            node_world
        } else {
            Mat4::IDENTITY
        };
        let members: Vec<(usize, ObjectId)> = node
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, &child)| graph.node(child).object().map(|id| (i, id)))
            .collect();

        let options = self.config.extract_options();
        let mut parts = Vec::with_capacity(members.len());
        for &(position, child) in &members {
            let Some(mesh) = self.member_mesh(child)? else {
                continue;
            };
            let trs = relative_trs(root_world, self.scene.world_transform(child)).select(
                freeze.freeze_translation,
                freeze.freeze_rotation,
                freeze.freeze_scale,
            );
            let placement = Placement::from_trs(trs, Some(child_tag(position)));
            parts.push(extract_mesh(&mesh, self.scene, &options, &placement, None)?);
        }
        tracing::debug!(node = %node.name, members = parts.len(), "merging children");

        let mut shape = concatenate(name, &parts);
        let first = shape
            .materials
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_MATERIAL.to_string());
        shape.materials = vec![first];
        shape.flags.generic = true;
        shape.is_optimized = Some(false);
        apply_mesh_settings(&mut shape, &mesh_settings(&node.kind));

        shape.bounding_volume = match proxies.get(&node.name) {
            Some(&proxy) => {
                BoundingVolume::from_proxy(self.scene, proxy, object, self.config.axis())
            }
            None => {
                // Second pass with every transform applied relative to the node.
                let mut placed = Vec::with_capacity(members.len());
                for &(_, child) in &members {
                    let Some(mesh) = self.member_mesh(child)? else {
                        continue;
                    };
                    let trs = relative_trs(node_world, self.scene.world_transform(child));
                    let placement = Placement::from_trs(trs, Some(child_tag(0)));
                    placed.push(extract_mesh(&mesh, self.scene, &options, &placement, None)?);
                }
                BoundingVolume::from_vertices(&concatenate(String::new(), &placed).vertices)
            }
        };
        Ok(shape)
    }

    /// Merge a group's members into the root's local space.
    ///
    /// Members are visited root first, then in graph order. A member's
    /// position in that order is both its `BindIndex` vertex tag and its
    /// slot in `skinBindNodeIds`.
    fn merge_group_shape(
        &mut self,
        graph: &SceneGraph,
        group: &MergeGroupPlan,
        proxies: &HashMap<String, ObjectId>,
    ) -> Result<Shape> {
        let name = format!("mergeGroupShape{}", group.number);
        let root = graph.node(group.members[0]);
        let Some(root_object) = root.object() else {
            return Ok(Shape::empty(name));
        };
        let root_world = self.scene.world_transform(root_object);
        let options = self.config.extract_options();

        let mut parts = Vec::with_capacity(group.members.len());
        let mut bind_ids = Vec::with_capacity(group.members.len());
        for (position, &member) in group.members.iter().enumerate() {
            let node = graph.node(member);
            let Some(object) = node.object() else {
                continue;
            };
            let mesh = self
                .member_mesh(object)?
                .ok_or_else(|| ExportError::MissingMesh(node.name.clone()))?;
            let trs = relative_trs(root_world, self.scene.world_transform(object));
            let placement = Placement::from_trs(trs, Some(VertexTag::BindIndex(position as u32)));
            parts.push(extract_mesh(&mesh, self.scene, &options, &placement, None)?);
            bind_ids.push(node.node_id);
        }
        tracing::debug!(group = group.number, members = ?bind_ids, "merging group");

        let mut shape = concatenate(name, &parts);
        shape.flags.single_blend_weights = true;
        shape.skin_bind_node_ids = bind_ids;
        apply_mesh_settings(&mut shape, &mesh_settings(&root.kind));
        shape.bounding_volume = self.bounding_volume(
            &[root.name.clone(), merge_group_proxy_key(group.number)],
            root_object,
            &shape,
            proxies,
        );
        Ok(shape)
    }

    /// Mesh of a merge member, `None` for non-mesh objects.
    fn member_mesh(&mut self, id: ObjectId) -> Result<Option<Rc<MeshData>>> {
        let Some(object) = self.scene.object(id) else {
            return Err(ExportError::MissingObject(format!("#{}", id.0)));
        };
        let Some(settings) = object.mesh_settings() else {
            return Ok(None);
        };
        if settings.armature.is_some() {
            return Err(ExportError::Configuration(format!(
                "Cannot have armature and merge shapes within the same Object ({})",
                object.name
            )));
        }
        self.evaluated_mesh(id).map(Some)
    }

    fn skin_binding(&self, graph: &SceneGraph, settings: &MeshSettings) -> Option<SkinBinding> {
        if !self.config.export_skin_weights {
            return None;
        }
        let armature_name = settings.armature.as_deref()?;
        let Some(armature) = self.scene.find(armature_name) else {
            tracing::warn!(armature = %armature_name, "armature not found, skipping skin weights");
            return None;
        };
        let Some(bones) = graph.bone_nodes(armature) else {
            tracing::warn!(armature = %armature_name, "armature has no exported bones");
            return None;
        };
        let binding = SkinBinding::new(&settings.vertex_groups, bones);
        if binding.is_empty() {
            tracing::warn!(armature = %armature_name, "no vertex group matches a bone");
        }
        Some(binding)
    }

    /// Proxy override under the first matching key, else the default sphere
    /// when enabled.
    fn bounding_volume(
        &self,
        keys: &[String],
        owner: ObjectId,
        shape: &Shape,
        proxies: &HashMap<String, ObjectId>,
    ) -> Option<BoundingVolume> {
        for key in keys {
            if let Some(&proxy) = proxies.get(key) {
                match BoundingVolume::from_proxy(self.scene, proxy, owner, self.config.axis()) {
                    Some(bv) => return Some(bv),
                    None => {
                        tracing::warn!(target_node = %key, "bounding volume proxy has no box")
                    }
                }
            }
        }
        if self.config.compute_bounding_volumes {
            BoundingVolume::from_vertices(&shape.vertices)
        } else {
            None
        }
    }

    /// Resolve every registered material and register its files.
    fn material_entries(&mut self) -> Vec<MaterialEntry> {
        let names: Vec<(u32, String)> = self
            .materials
            .iter()
            .map(|(id, name)| (id, name.clone()))
            .collect();

        let mut resolved = Vec::with_capacity(names.len());
        for (id, name) in &names {
            let material = match self.scene.material(name) {
                Some(material) => material.clone(),
                None => {
                    if name != DEFAULT_MATERIAL {
                        tracing::warn!(material = %name, "material not found, writing defaults");
                    }
                    MaterialData::named(name.clone())
                }
            };
            for path in material.files() {
                self.register_file(path);
            }
            resolved.push((*id, material));
        }

        resolved
            .into_iter()
            .map(|(id, material)| MaterialEntry {
                id,
                texture: self.file_id(&material.texture),
                gloss_map: self.file_id(&material.gloss_map),
                normal_map: self.file_id(&material.normal_map),
                emissive_map: self.file_id(&material.emissive_map),
                custom_shader: self.file_id(&material.custom_shader),
                custom_maps: material
                    .custom_maps
                    .iter()
                    .map(|m| (m.name.clone(), self.register_file(&m.value)))
                    .collect(),
                material,
            })
            .collect()
    }
}

fn mesh_settings(kind: &NodeKind) -> MeshSettings {
    match kind {
        NodeKind::Mesh(settings) => settings.clone(),
        _ => MeshSettings::default(),
    }
}

fn apply_mesh_settings(shape: &mut Shape, settings: &MeshSettings) {
    shape.mesh_usage = settings
        .cpu_mesh
        .map(|cpu| if cpu { MESH_USAGE_CPU } else { 0 });
    shape.vertex_compression_range = settings.vertex_compression_range.clone();
}

/// Nodes whose children are merged into one shape stop writing them.
fn mark_merged_children(graph: &mut SceneGraph) {
    for node in &mut graph.nodes {
        if node.settings.merge_children.is_some() && !node.children.is_empty() {
            node.write_children = false;
        }
    }
}

/// Group mesh nodes by merge group number, root first.
///
/// The first member is the root unless a member is flagged as root, in
/// which case the last flagged member wins.
fn collect_merge_groups(graph: &SceneGraph) -> Vec<MergeGroupPlan> {
    let mut groups: BTreeMap<u32, (Vec<usize>, Option<usize>)> = BTreeMap::new();
    for index in graph.preorder() {
        let node = &graph.nodes[index];
        let NodeKind::Mesh(settings) = &node.kind else {
            continue;
        };
        if !node.write_children {
            continue;
        }
        let Some(membership) = settings.merge_group.filter(|g| g.number != 0) else {
            continue;
        };
        let (members, root) = groups.entry(membership.number).or_default();
        if membership.root {
            *root = Some(members.len());
        }
        members.push(index);
    }

    groups
        .into_iter()
        .map(|(number, (mut members, root))| {
            let root = members.remove(root.unwrap_or(0));
            members.insert(0, root);
            MergeGroupPlan { number, members }
        })
        .collect()
}

fn user_attribute_entries(graph: &SceneGraph) -> Vec<UserAttributeEntry> {
    graph
        .preorder()
        .into_iter()
        .map(|index| graph.node(index))
        .filter(|node| !node.settings.user_attributes.is_empty())
        .map(|node| UserAttributeEntry {
            node_id: node.node_id,
            attributes: node.settings.user_attributes.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        Bone, LightSettings, MergeChildrenSettings, MergeGroupSettings, NodeSettings, Scene,
        SceneObject,
    };
    use crate::shape::test_support::quad;
    use crate::types::AxisOrientation;
    use glam::Vec3;

    fn mesh_object(name: &str, mesh: &str, settings: MeshSettings) -> SceneObject {
        SceneObject::new(
            name,
            ObjectKind::Mesh {
                mesh: mesh.into(),
                evaluated_mesh: None,
                settings,
            },
        )
    }

    fn named_quad(name: &str) -> MeshData {
        MeshData {
            name: name.into(),
            ..quad([0.0; 3], 0.5)
        }
    }

    fn grouped(number: u32, root: bool) -> MeshSettings {
        MeshSettings {
            merge_group: Some(MergeGroupSettings { number, root }),
            ..Default::default()
        }
    }

    fn build(scene: &Scene) -> Result<I3dDocument> {
        ExportSession::new(scene, ExportConfig::default()).build("test")
    }

    fn node_by_name<'d>(doc: &'d I3dDocument, name: &str) -> &'d crate::graph::ExportNode {
        doc.scene.nodes.iter().find(|n| n.name == name).unwrap()
    }

    #[test]
    fn test_instances_share_one_shape() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Plank"));
        scene.add_object(mesh_object("a", "Plank", MeshSettings::default()));
        scene.add_object(mesh_object("b", "Plank", MeshSettings::default()));

        let doc = build(&scene).unwrap();
        assert_eq!(doc.shapes.len(), 1);
        assert_eq!(node_by_name(&doc, "a").shape.as_ref().unwrap().shape_id, 1);
        assert_eq!(node_by_name(&doc, "b").shape.as_ref().unwrap().shape_id, 1);
        assert_eq!(doc.materials.len(), 1);
        assert_eq!(doc.materials[0].material.name, "default");
        assert_eq!(
            node_by_name(&doc, "a").shape.as_ref().unwrap().material_ids,
            vec![1]
        );
    }

    #[test]
    fn test_merge_group_root_override() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Part"));
        scene.add_object(mesh_object("A", "Part", grouped(1, false)));
        scene.add_object(
            mesh_object("B", "Part", grouped(1, true))
                .with_transform(Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0))),
        );
        scene.add_object(mesh_object("C", "Part", grouped(1, false)));

        let doc = build(&scene).unwrap();
        let (a, b, c) = (
            node_by_name(&doc, "A"),
            node_by_name(&doc, "B"),
            node_by_name(&doc, "C"),
        );
        let shape_ref = b.shape.as_ref().unwrap();
        assert_eq!(shape_ref.skin_bind_node_ids, vec![b.node_id, a.node_id, c.node_id]);
        assert_eq!(a.kind, NodeKind::TransformGroup);
        assert_eq!(c.kind, NodeKind::TransformGroup);
        assert!(a.shape.is_none());

        let shape = doc.triangle_shape("mergeGroupShape1").unwrap();
        assert!(shape.flags.single_blend_weights);
        assert_eq!(shape.vertices.len(), 12);
        // The root's own vertices come first and carry bind index 0.
        assert_eq!(shape.vertices[0].tag, Some(VertexTag::BindIndex(0)));
        // A sits 2 units left of the root, then axis correction.
        assert_eq!(shape.vertices[4].position, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(shape.vertices[4].tag, Some(VertexTag::BindIndex(1)));
    }

    #[test]
    fn test_mirrored_merge_member_keeps_handedness() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Part"));
        scene.add_object(mesh_object("A", "Part", grouped(1, true)));
        scene.add_object(
            mesh_object("B", "Part", grouped(1, false))
                .with_transform(Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0))),
        );

        let config = ExportConfig::default().with_axis_orientation(AxisOrientation::KeepTransforms);
        let doc = ExportSession::new(&scene, config).build("test").unwrap();
        let shape = doc.triangle_shape("mergeGroupShape1").unwrap();
        let mirrored: Vec<Vec3> = shape
            .vertices
            .iter()
            .filter(|v| v.tag == Some(VertexTag::BindIndex(1)))
            .map(|v| v.position)
            .collect();
        assert_eq!(mirrored.len(), 4);
        for expected in [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ] {
            assert!(
                mirrored.iter().any(|p| p.abs_diff_eq(expected, 1e-5)),
                "missing {:?} in {:?}",
                expected,
                mirrored
            );
        }
    }

    #[test]
    fn test_merge_children_tags_and_hidden_children() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Leaf"));
        scene.add_object(SceneObject::new("Tree", ObjectKind::Empty).with_settings(NodeSettings {
            merge_children: Some(MergeChildrenSettings::default()),
            ..Default::default()
        }));
        scene.add_object(mesh_object("c0", "Leaf", MeshSettings::default()).with_parent("Tree"));
        scene.add_object(SceneObject::new("c1", ObjectKind::Empty).with_parent("Tree"));
        scene.add_object(mesh_object("c2", "Leaf", MeshSettings::default()).with_parent("Tree"));

        let doc = build(&scene).unwrap();
        let order: Vec<&str> = doc
            .scene
            .preorder()
            .into_iter()
            .map(|i| doc.scene.node(i).name.as_str())
            .collect();
        assert_eq!(order, vec!["Tree"]);

        let tree = node_by_name(&doc, "Tree");
        assert!(matches!(tree.kind, NodeKind::Mesh(_)));
        let shape = doc.triangle_shape("MergedChildren1").unwrap();
        assert!(shape.flags.generic);
        assert_eq!(shape.is_optimized, Some(false));
        assert_eq!(shape.vertices.len(), 8);
        assert_eq!(shape.vertices[0].tag, Some(VertexTag::Generic(0.0)));
        let last = shape.vertices[7].tag;
        assert_eq!(last, Some(VertexTag::Generic(crate::types::quantize(2.0 / 32767.0))));
        assert_eq!(shape.materials, vec!["default".to_string()]);
        assert_eq!(tree.shape.as_ref().unwrap().material_ids, vec![1]);
        assert!(shape.bounding_volume.is_some());
    }

    #[test]
    fn test_merge_children_without_freeze_ignores_child_transform() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Leaf"));
        scene.add_object(SceneObject::new("Tree", ObjectKind::Empty).with_settings(NodeSettings {
            merge_children: Some(MergeChildrenSettings::default()),
            ..Default::default()
        }));
        scene.add_object(
            mesh_object("c0", "Leaf", MeshSettings::default())
                .with_parent("Tree")
                .with_transform(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0))),
        );

        let doc = build(&scene).unwrap();
        let shape = doc.triangle_shape("MergedChildren1").unwrap();
        assert_eq!(shape.vertices[0].position, Vec3::ZERO);

        // The bounding volume pass applies the full transform.
        let bv = shape.bounding_volume.unwrap();
        assert!(bv.center.abs_diff_eq(Vec3::new(5.5, 0.0, -0.5), 1e-5));
    }

    #[test]
    fn test_armature_on_merge_member_is_rejected() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Part"));
        let settings = MeshSettings {
            armature: Some("Rig".into()),
            ..grouped(3, false)
        };
        scene.add_object(mesh_object("A", "Part", settings));

        let err = build(&scene).unwrap_err();
        assert!(matches!(err, ExportError::Configuration(_)));
        assert!(err.to_string().contains("Cannot have armature and merge shapes"));
    }

    #[test]
    fn test_proxy_donates_volume_and_is_pruned() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Body"));
        scene.add_mesh(MeshData {
            name: "Box".into(),
            positions: vec![[-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]],
            ..Default::default()
        });
        scene.add_object(mesh_object("Car", "Body", MeshSettings::default()));
        scene.add_object(
            mesh_object("CarBV", "Box", MeshSettings::default())
                .with_parent("Car")
                .with_settings(NodeSettings {
                    bounding_volume: Some("Car".into()),
                    ..Default::default()
                }),
        );

        let doc = build(&scene).unwrap();
        assert_eq!(doc.shapes.len(), 1);
        assert!(doc.scene.preorder().iter().all(|&i| doc.scene.node(i).name != "CarBV"));
        let bv = doc.triangle_shape("Body").unwrap().bounding_volume.unwrap();
        assert!((bv.radius - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_skin_binding_uses_bone_node_ids() {
        let mut scene = Scene::default();
        let mut mesh = named_quad("Skin");
        mesh.weights = vec![vec![(0, 1.0)]; 4];
        scene.add_mesh(mesh);
        scene.add_object(SceneObject::new(
            "Rig",
            ObjectKind::Armature {
                bones: vec![Bone {
                    name: "Root".into(),
                    parent: None,
                    matrix_local: Mat4::IDENTITY,
                }],
            },
        ));
        scene.add_object(mesh_object(
            "Body",
            "Skin",
            MeshSettings {
                armature: Some("Rig".into()),
                vertex_groups: vec!["Root".into()],
                ..Default::default()
            },
        ));

        let doc = build(&scene).unwrap();
        // Body (1), Rig (2), Root bone (3).
        let body = node_by_name(&doc, "Body");
        assert_eq!(body.shape.as_ref().unwrap().skin_bind_node_ids, vec![3]);
        assert!(doc.triangle_shape("Skin").unwrap().flags.blend_weights);
    }

    #[test]
    fn test_ies_files_register_before_material_files() {
        let mut scene = Scene::default();
        let mut mesh = named_quad("Lamp");
        mesh.materials = vec![Some("Glass".into())];
        scene.add_mesh(mesh);
        scene.materials.push(MaterialData {
            texture: Some("$data/glass.png".into()),
            ..MaterialData::named("Glass")
        });
        scene.add_object(mesh_object("A", "Lamp", MeshSettings::default()));
        scene.add_object(SceneObject::new(
            "Spot",
            ObjectKind::Light(LightSettings {
                light_type: LightType::Spot,
                color: [1.0; 3],
                range: None,
                spot_size: Some(0.5),
                spot_blend: Some(0.1),
                cast_shadow_map: false,
                ies_profile_file: Some("$data/lamp.ies".into()),
            }),
        ));

        let doc = build(&scene).unwrap();
        let names: Vec<&str> = doc.files.iter().map(|f| f.file.filename.as_str()).collect();
        assert_eq!(names, vec!["$data/lamp.ies", "$data/glass.png"]);
        assert_eq!(node_by_name(&doc, "Spot").ies_file_id, Some(1));
        assert_eq!(doc.materials[0].texture, Some(2));
    }

    #[test]
    fn test_missing_mesh_is_an_error() {
        let mut scene = Scene::default();
        scene.add_object(mesh_object("Ghost", "Nowhere", MeshSettings::default()));
        assert!(matches!(build(&scene), Err(ExportError::MissingMesh(_))));
    }

    #[test]
    fn test_mesh_cache_returns_shared_data() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Plank"));
        let id = scene.add_object(mesh_object("a", "Plank", MeshSettings::default()));
        let mut session = ExportSession::new(&scene, ExportConfig::default());
        let first = session.evaluated_mesh(id).unwrap();
        let second = session.evaluated_mesh(id).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_merge_groups_disabled_exports_plain_meshes() {
        let mut scene = Scene::default();
        scene.add_mesh(named_quad("Part"));
        scene.add_object(mesh_object("A", "Part", grouped(1, false)));
        scene.add_object(mesh_object("B", "Part", grouped(1, false)));
        let config = ExportConfig {
            export_merge_groups: false,
            ..Default::default()
        };
        let doc = ExportSession::new(&scene, config).build("test").unwrap();
        assert_eq!(doc.shapes.len(), 1);
        assert!(doc.triangle_shape("Part").is_some());
    }
}
