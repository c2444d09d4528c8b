//! Export scene graph.
//!
//! Built once per export by a depth-first walk of the host scene. Children
//! are sorted by name with objects before bones, and node ids are handed out
//! in pre-order starting at 1. Every node carries its axis-corrected local
//! transform and a closed [`NodeKind`] that decides which scene element it
//! becomes.

use crate::config::ExportConfig;
use crate::scene::{
    Bone, CameraSettings, LightSettings, MeshSettings, NodeSettings, ObjectId, ObjectKind,
    SceneSource,
};
use crate::types::AxisConversion;
use glam::Mat4;
use std::collections::HashMap;

/// What a node is written as.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    TransformGroup,
    Light(LightSettings),
    Camera(CameraSettings),
    Mesh(MeshSettings),
    NurbsCurve,
}

/// Where a node came from in the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSource {
    Object(ObjectId),
    Bone { armature: ObjectId },
}

/// Shape reference of a `<Shape>` node, filled in during shape generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeRef {
    pub shape_id: u32,
    pub material_ids: Vec<u32>,
    pub skin_bind_node_ids: Vec<u32>,
}

/// One node of the export graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportNode {
    pub node_id: u32,
    pub name: String,
    pub source: NodeSource,
    /// Axis-corrected local transform.
    pub transform: Mat4,
    pub visible: bool,
    pub kind: NodeKind,
    pub settings: NodeSettings,
    pub shape: Option<ShapeRef>,
    pub ies_file_id: Option<u32>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// False when the children are baked into this node's merged shape.
    pub write_children: bool,
}

impl ExportNode {
    pub fn object(&self) -> Option<ObjectId> {
        match self.source {
            NodeSource::Object(id) => Some(id),
            NodeSource::Bone { .. } => None,
        }
    }
}

/// Arena of export nodes with ordered roots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneGraph {
    pub nodes: Vec<ExportNode>,
    pub roots: Vec<usize>,
    bone_nodes: HashMap<ObjectId, HashMap<String, u32>>,
}

impl SceneGraph {
    /// Walk the host scene and build the export graph.
    pub fn build(scene: &dyn SceneSource, config: &ExportConfig) -> Self {
        let mut builder = GraphBuilder {
            scene,
            config,
            axis: config.axis(),
            graph: SceneGraph::default(),
        };
        for root in sorted_by_name(scene, scene.roots()) {
            let index = builder.visit_object(root, None, false);
            builder.graph.roots.push(index);
        }
        builder.graph
    }

    pub fn node(&self, index: usize) -> &ExportNode {
        &self.nodes[index]
    }

    /// Bone name to node id for one armature.
    pub fn bone_nodes(&self, armature: ObjectId) -> Option<&HashMap<String, u32>> {
        self.bone_nodes.get(&armature)
    }

    /// Written nodes in depth-first pre-order.
    pub fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            order.push(index);
            let node = &self.nodes[index];
            if node.write_children {
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    /// Detach a node from the written tree. Its id is not reused.
    pub fn prune(&mut self, index: usize) {
        match self.nodes[index].parent {
            Some(parent) => self.nodes[parent].children.retain(|&c| c != index),
            None => self.roots.retain(|&r| r != index),
        }
    }
}

struct GraphBuilder<'a> {
    scene: &'a dyn SceneSource,
    config: &'a ExportConfig,
    axis: AxisConversion,
    graph: SceneGraph,
}

impl GraphBuilder<'_> {
    fn push(&mut self, mut node: ExportNode) -> usize {
        node.node_id = self.graph.nodes.len() as u32 + 1;
        self.graph.nodes.push(node);
        self.graph.nodes.len() - 1
    }

    fn visit_object(&mut self, id: ObjectId, parent: Option<usize>, parent_oriented: bool) -> usize {
        let scene = self.scene;
        let Some(object) = scene.object(id) else {
            // Ids come from the scene itself, so this only guards a broken source.
            return self.push(placeholder(id, parent));
        };
        let oriented = object.is_oriented();
        let transform =
            self.axis
                .node_matrix(scene.local_transform(id), oriented, parent_oriented);

        let index = self.push(ExportNode {
            node_id: 0,
            name: object.name.clone(),
            source: NodeSource::Object(id),
            transform,
            visible: object.visible,
            kind: self.node_kind(&object.kind),
            settings: object.settings.clone(),
            shape: None,
            ies_file_id: None,
            parent,
            children: Vec::new(),
            write_children: true,
        });

        for child in sorted_by_name(scene, scene.children(id)) {
            let child_index = self.visit_object(child, Some(index), oriented);
            self.graph.nodes[index].children.push(child_index);
        }

        if let ObjectKind::Armature { bones } = &object.kind {
            let mut roots: Vec<&Bone> = bones
                .iter()
                .filter(|b| {
                    b.parent
                        .as_deref()
                        .map_or(true, |p| !bones.iter().any(|o| o.name == p))
                })
                .collect();
            roots.sort_by(|a, b| a.name.cmp(&b.name));
            for bone in roots {
                let child_index = self.visit_bone(id, bones, bone, index);
                self.graph.nodes[index].children.push(child_index);
            }
        }
        index
    }

    fn visit_bone(&mut self, armature: ObjectId, bones: &[Bone], bone: &Bone, parent: usize) -> usize {
        let index = self.push(ExportNode {
            node_id: 0,
            name: bone.name.clone(),
            source: NodeSource::Bone { armature },
            transform: self.axis.node_matrix(bone.matrix_local, false, false),
            visible: true,
            kind: NodeKind::TransformGroup,
            settings: NodeSettings::default(),
            shape: None,
            ies_file_id: None,
            parent: Some(parent),
            children: Vec::new(),
            write_children: true,
        });
        let node_id = self.graph.nodes[index].node_id;
        self.graph
            .bone_nodes
            .entry(armature)
            .or_default()
            .insert(bone.name.clone(), node_id);

        let mut children: Vec<&Bone> = bones
            .iter()
            .filter(|b| b.parent.as_deref() == Some(bone.name.as_str()))
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        for child in children {
            let child_index = self.visit_bone(armature, bones, child, index);
            self.graph.nodes[index].children.push(child_index);
        }
        index
    }

    /// Kinds disabled by the config fall back to transform groups.
    fn node_kind(&self, kind: &ObjectKind) -> NodeKind {
        let config = self.config;
        match kind {
            ObjectKind::Mesh { settings, .. } if config.export_shapes => {
                NodeKind::Mesh(settings.clone())
            }
            ObjectKind::Curve { .. } if config.export_shapes && config.export_nurbs_curves => {
                NodeKind::NurbsCurve
            }
            ObjectKind::Light(light) if config.export_lights => NodeKind::Light(light.clone()),
            ObjectKind::Camera(camera) if config.export_cameras => NodeKind::Camera(camera.clone()),
            _ => NodeKind::TransformGroup,
        }
    }
}

fn placeholder(id: ObjectId, parent: Option<usize>) -> ExportNode {
    ExportNode {
        node_id: 0,
        name: String::new(),
        source: NodeSource::Object(id),
        transform: Mat4::IDENTITY,
        visible: true,
        kind: NodeKind::TransformGroup,
        settings: NodeSettings::default(),
        shape: None,
        ies_file_id: None,
        parent,
        children: Vec::new(),
        write_children: true,
    }
}

fn sorted_by_name(scene: &dyn SceneSource, mut ids: Vec<ObjectId>) -> Vec<ObjectId> {
    ids.sort_by(|a, b| {
        let name = |id: &ObjectId| scene.object(*id).map(|o| o.name.as_str()).unwrap_or("");
        name(a).cmp(name(b))
    });
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LightType, Scene, SceneObject};
    use glam::Vec3;

    fn light() -> ObjectKind {
        ObjectKind::Light(LightSettings {
            light_type: LightType::Point,
            color: [1.0; 3],
            range: None,
            spot_size: None,
            spot_blend: None,
            cast_shadow_map: false,
            ies_profile_file: None,
        })
    }

    #[test]
    fn test_preorder_ids_sorted_by_name() {
        let mut scene = Scene::default();
        scene.add_object(SceneObject::new("b", ObjectKind::Empty));
        scene.add_object(SceneObject::new("a", ObjectKind::Empty));
        scene.add_object(SceneObject::new("a2", ObjectKind::Empty).with_parent("a"));
        scene.add_object(SceneObject::new("a1", ObjectKind::Empty).with_parent("a"));

        let graph = SceneGraph::build(&scene, &ExportConfig::default());
        let names: Vec<(&str, u32)> = graph
            .preorder()
            .into_iter()
            .map(|i| (graph.node(i).name.as_str(), graph.node(i).node_id))
            .collect();
        assert_eq!(names, vec![("a", 1), ("a1", 2), ("a2", 3), ("b", 4)]);
    }

    #[test]
    fn test_bones_follow_objects() {
        let mut scene = Scene::default();
        scene.add_object(SceneObject::new(
            "Rig",
            ObjectKind::Armature {
                bones: vec![
                    Bone {
                        name: "Spine".into(),
                        parent: None,
                        matrix_local: Mat4::IDENTITY,
                    },
                    Bone {
                        name: "Head".into(),
                        parent: Some("Spine".into()),
                        matrix_local: Mat4::IDENTITY,
                    },
                ],
            },
        ));
        scene.add_object(SceneObject::new("Zed", ObjectKind::Empty).with_parent("Rig"));

        let graph = SceneGraph::build(&scene, &ExportConfig::default());
        let names: Vec<&str> = graph
            .preorder()
            .into_iter()
            .map(|i| graph.node(i).name.as_str())
            .collect();
        assert_eq!(names, vec!["Rig", "Zed", "Spine", "Head"]);

        let bones = graph.bone_nodes(ObjectId(0)).unwrap();
        assert_eq!(bones["Spine"], 3);
        assert_eq!(bones["Head"], 4);
    }

    #[test]
    fn test_disabled_kinds_become_transform_groups() {
        let mut scene = Scene::default();
        scene.add_object(SceneObject::new("Lamp", light()));
        let config = ExportConfig {
            export_lights: false,
            ..Default::default()
        };
        let graph = SceneGraph::build(&scene, &config);
        assert_eq!(graph.node(0).kind, NodeKind::TransformGroup);

        let graph = SceneGraph::build(&scene, &ExportConfig::default());
        assert!(matches!(graph.node(0).kind, NodeKind::Light(_)));
    }

    #[test]
    fn test_child_of_light_is_compensated() {
        let mut scene = Scene::default();
        scene.add_object(SceneObject::new("Lamp", light()));
        scene.add_object(
            SceneObject::new("Child", ObjectKind::Empty)
                .with_parent("Lamp")
                .with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0))),
        );
        let graph = SceneGraph::build(&scene, &ExportConfig::default());
        let child = graph.node(1);
        // Baked (0, 2, 0), then rotated back out of the light's extra correction.
        assert!(child
            .transform
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));
    }

    #[test]
    fn test_prune_keeps_id_gaps() {
        let mut scene = Scene::default();
        scene.add_object(SceneObject::new("a", ObjectKind::Empty));
        scene.add_object(SceneObject::new("b", ObjectKind::Empty));
        scene.add_object(SceneObject::new("c", ObjectKind::Empty));
        let mut graph = SceneGraph::build(&scene, &ExportConfig::default());
        graph.prune(1);
        let ids: Vec<u32> = graph.preorder().into_iter().map(|i| graph.node(i).node_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
