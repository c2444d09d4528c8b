//! Host scene snapshot.
//!
//! The exporter never talks to an authoring tool directly. It reads a
//! [`SceneSource`], a narrow query interface over objects, meshes, curves
//! and materials. [`Scene`] is the in-memory implementation, deserializable
//! from JSON so any host can hand over a snapshot.

pub mod settings;

pub use settings::{
    BodyType, CameraSettings, JointSettings, LightSettings, LightType, MergeChildrenSettings,
    MergeGroupSettings, MeshSettings, NodeSettings, ObjectDataSettings, PhysicsSettings,
    UserAttribute,
};

use crate::error::Result;
use crate::types::BoundingBox;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::Path;

/// Index of an object within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

/// Query interface over the host scene.
pub trait SceneSource {
    /// Objects without a parent.
    fn roots(&self) -> Vec<ObjectId>;

    /// Direct children of an object.
    fn children(&self, id: ObjectId) -> Vec<ObjectId>;

    /// Look up an object.
    fn object(&self, id: ObjectId) -> Option<&SceneObject>;

    /// Find an object by name.
    fn find(&self, name: &str) -> Option<ObjectId>;

    /// Transform relative to the parent.
    fn local_transform(&self, id: ObjectId) -> Mat4 {
        self.object(id).map(|o| o.matrix_local).unwrap_or(Mat4::IDENTITY)
    }

    /// Transform relative to the scene origin.
    fn world_transform(&self, id: ObjectId) -> Mat4;

    /// The triangulated mesh of a mesh object, with or without modifiers.
    fn evaluated_mesh(&self, id: ObjectId, apply_modifiers: bool) -> Option<MeshData>;

    /// The 8 local-space corners of an object's bounding box.
    fn bounding_box_corners(&self, id: ObjectId) -> Option<[Vec3; 8]>;

    fn material(&self, name: &str) -> Option<&MaterialData>;

    fn curve(&self, name: &str) -> Option<&CurveData>;
}

/// One object in the host scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Column-major local transform.
    #[serde(default)]
    pub matrix_local: Mat4,
    #[serde(default = "visible")]
    pub visible: bool,
    pub kind: ObjectKind,
    #[serde(default)]
    pub settings: NodeSettings,
}

fn visible() -> bool {
    true
}

impl SceneObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            parent: None,
            matrix_local: Mat4::IDENTITY,
            visible: true,
            kind,
            settings: NodeSettings::default(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_transform(mut self, matrix: Mat4) -> Self {
        self.matrix_local = matrix;
        self
    }

    pub fn with_settings(mut self, settings: NodeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Mesh settings, if this is a mesh object.
    pub fn mesh_settings(&self) -> Option<&MeshSettings> {
        match &self.kind {
            ObjectKind::Mesh { settings, .. } => Some(settings),
            _ => None,
        }
    }

    /// Lights and cameras carry an extra axis correction.
    pub fn is_oriented(&self) -> bool {
        matches!(self.kind, ObjectKind::Light(_) | ObjectKind::Camera(_))
    }
}

/// What an object is. Each variant carries its own typed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectKind {
    Empty,
    Mesh {
        mesh: String,
        /// Mesh data with modifiers applied, used when modifiers are applied.
        #[serde(default)]
        evaluated_mesh: Option<String>,
        #[serde(default)]
        settings: MeshSettings,
    },
    Curve {
        curve: String,
    },
    Light(LightSettings),
    Camera(CameraSettings),
    Armature {
        #[serde(default)]
        bones: Vec<Bone>,
    },
}

/// A bone of an armature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Transform relative to the parent bone, or to the armature for roots.
    #[serde(default)]
    pub matrix_local: Mat4,
}

/// A triangulated mesh with per-loop attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex `(vertex group index, weight)` influences.
    pub weights: Vec<Vec<(u32, f32)>>,
    pub loops: Vec<MeshLoop>,
    pub triangles: Vec<MeshTriangle>,
    /// Per-loop UV layers.
    pub uv_layers: Vec<UvLayer>,
    /// Per-loop sRGB color layers.
    pub color_layers: Vec<ColorLayer>,
    /// Index of the color layer used for rendering.
    pub render_color: Option<usize>,
    /// Material slots, `None` for an empty slot.
    pub materials: Vec<Option<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshLoop {
    pub vertex: u32,
    #[serde(default)]
    pub normal: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshTriangle {
    #[serde(default)]
    pub material: usize,
    pub loops: [u32; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UvLayer {
    #[serde(default)]
    pub name: String,
    pub data: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorLayer {
    #[serde(default)]
    pub name: String,
    pub data: Vec<[f32; 4]>,
}

impl MeshData {
    /// The color layer designated for rendering, if any.
    pub fn render_color_layer(&self) -> Option<&ColorLayer> {
        match self.render_color {
            Some(index) => self.color_layers.get(index),
            None => self.color_layers.first(),
        }
    }

    /// Material name of a slot index. Empty or missing slots are `"default"`.
    pub fn slot_material(&self, slot: usize) -> &str {
        match self.materials.get(slot) {
            Some(Some(name)) => name.as_str(),
            _ => DEFAULT_MATERIAL,
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.positions.iter().copied())
    }
}

/// Name of the implicit material of unassigned geometry.
pub const DEFAULT_MATERIAL: &str = "default";

/// Curve data. Only the first spline is exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveData {
    pub name: String,
    #[serde(default = "cubic")]
    pub degree: u32,
    #[serde(default)]
    pub cyclic: bool,
    #[serde(default)]
    pub points: Vec<[f32; 3]>,
}

fn cubic() -> u32 {
    3
}

/// A named string value (custom parameters and custom maps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: String,
}

/// Material properties as exposed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialData {
    pub name: String,
    pub diffuse_color: [f32; 3],
    pub roughness: f32,
    pub specular_intensity: f32,
    pub metallic: f32,
    pub emissive_color: Option<[f32; 4]>,
    pub alpha_blending: bool,
    /// Written on every subset using this material.
    pub slot_name: Option<String>,
    pub texture: Option<String>,
    pub gloss_map: Option<String>,
    pub normal_map: Option<String>,
    pub bump_depth: Option<f32>,
    pub emissive_map: Option<String>,
    pub custom_shader: Option<String>,
    pub custom_shader_variation: Option<String>,
    pub custom_parameters: Vec<NamedValue>,
    /// Custom texture slots, `value` is the file path.
    pub custom_maps: Vec<NamedValue>,
    pub shading_rate: Option<String>,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: DEFAULT_MATERIAL.to_string(),
            diffuse_color: [0.8, 0.8, 0.8],
            roughness: 0.5,
            specular_intensity: 0.5,
            metallic: 0.0,
            emissive_color: None,
            alpha_blending: false,
            slot_name: None,
            texture: None,
            gloss_map: None,
            normal_map: None,
            bump_depth: None,
            emissive_map: None,
            custom_shader: None,
            custom_shader_variation: None,
            custom_parameters: Vec::new(),
            custom_maps: Vec::new(),
            shading_rate: None,
        }
    }
}

impl MaterialData {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Every file this material references, in registration order.
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = [
            &self.texture,
            &self.gloss_map,
            &self.normal_map,
            &self.emissive_map,
            &self.custom_shader,
        ]
        .into_iter()
        .filter_map(|f| f.as_deref())
        .collect();
        files.extend(self.custom_maps.iter().map(|m| m.value.as_str()));
        files
    }
}

/// An in-memory scene snapshot.
///
/// Name and hierarchy lookups go through an index built on first use.
/// [`Scene::add_object`] drops it; call [`Scene::reindex`] after editing
/// `objects` directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// Document name written on the root element.
    pub name: String,
    pub objects: Vec<SceneObject>,
    pub meshes: Vec<MeshData>,
    pub curves: Vec<CurveData>,
    pub materials: Vec<MaterialData>,
    #[serde(skip)]
    index: IndexCache,
}

/// Name and parent/child lookup tables over `Scene::objects`.
#[derive(Debug, Default)]
struct SceneIndex {
    /// First object with each name.
    by_name: HashMap<String, ObjectId>,
    parents: Vec<Option<ObjectId>>,
    children: HashMap<ObjectId, Vec<ObjectId>>,
    roots: Vec<ObjectId>,
}

impl SceneIndex {
    fn build(objects: &[SceneObject]) -> Self {
        let mut index = Self::default();
        for (i, object) in objects.iter().enumerate() {
            index.by_name.entry(object.name.clone()).or_insert(ObjectId(i));
        }
        for (i, object) in objects.iter().enumerate() {
            let id = ObjectId(i);
            let parent = object
                .parent
                .as_deref()
                .and_then(|name| index.by_name.get(name).copied());
            match parent {
                Some(parent) => index.children.entry(parent).or_default().push(id),
                None => index.roots.push(id),
            }
            index.parents.push(parent);
        }
        index
    }
}

/// Lazily built [`SceneIndex`]. Clones start empty and never affect
/// equality.
#[derive(Debug, Default)]
struct IndexCache(OnceCell<SceneIndex>);

impl Clone for IndexCache {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl PartialEq for IndexCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a scene description from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a scene description from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn add_object(&mut self, object: SceneObject) -> ObjectId {
        self.objects.push(object);
        self.reindex();
        ObjectId(self.objects.len() - 1)
    }

    /// Drop the lookup index so the next query rebuilds it.
    pub fn reindex(&mut self) {
        self.index.0.take();
    }

    fn index(&self) -> &SceneIndex {
        self.index.0.get_or_init(|| SceneIndex::build(&self.objects))
    }

    pub fn add_mesh(&mut self, mesh: MeshData) {
        self.meshes.push(mesh);
    }

    pub fn mesh(&self, name: &str) -> Option<&MeshData> {
        self.meshes.iter().find(|m| m.name == name)
    }

    fn parent_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.index().parents.get(id.0).copied().flatten()
    }
}

impl SceneSource for Scene {
    fn roots(&self) -> Vec<ObjectId> {
        self.index().roots.clone()
    }

    fn children(&self, id: ObjectId) -> Vec<ObjectId> {
        self.index().children.get(&id).cloned().unwrap_or_default()
    }

    fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.0)
    }

    fn find(&self, name: &str) -> Option<ObjectId> {
        self.index().by_name.get(name).copied()
    }

    fn world_transform(&self, id: ObjectId) -> Mat4 {
        let mut matrix = self.local_transform(id);
        let mut current = id;
        // Bounded walk, a malformed parent cycle must not hang the export.
        for _ in 0..self.objects.len() {
            match self.parent_of(current) {
                Some(parent) => {
                    matrix = self.local_transform(parent) * matrix;
                    current = parent;
                }
                None => break,
            }
        }
        matrix
    }

    fn evaluated_mesh(&self, id: ObjectId, apply_modifiers: bool) -> Option<MeshData> {
        match &self.object(id)?.kind {
            ObjectKind::Mesh {
                mesh,
                evaluated_mesh,
                ..
            } => {
                let name = match evaluated_mesh {
                    Some(evaluated) if apply_modifiers => evaluated,
                    _ => mesh,
                };
                self.mesh(name).cloned()
            }
            _ => None,
        }
    }

    fn bounding_box_corners(&self, id: ObjectId) -> Option<[Vec3; 8]> {
        match &self.object(id)?.kind {
            ObjectKind::Mesh { mesh, .. } => Some(self.mesh(mesh)?.bounding_box()?.corners()),
            _ => None,
        }
    }

    fn material(&self, name: &str) -> Option<&MaterialData> {
        self.materials.iter().find(|m| m.name == name)
    }

    fn curve(&self, name: &str) -> Option<&CurveData> {
        self.curves.iter().find(|c| c.name == name)
    }
}
