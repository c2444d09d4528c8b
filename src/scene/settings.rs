//! Typed per-node export settings.
//!
//! Each node kind carries its own settings struct, resolved once when the
//! scene is loaded. Absent optional fields are simply not written.

use serde::{Deserialize, Serialize};

/// Settings shared by every node kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Distance beyond which the node is culled.
    pub clip_distance: Option<f32>,
    /// Render object mask.
    pub object_mask: Option<u32>,
    /// Donate this node's bounding box to the named node (or
    /// `MERGEGROUP_{n}` for the root of merge group `n`).
    pub bounding_volume: Option<String>,
    /// Merge all direct children of this node into one shape.
    pub merge_children: Option<MergeChildrenSettings>,
    /// Physics joint parameters, written on transform groups.
    pub joint: Option<JointSettings>,
    /// Write the children's transforms into an object-data texture.
    pub object_data: Option<ObjectDataSettings>,
    /// Free-form attributes written to the `UserAttributes` section.
    pub user_attributes: Vec<UserAttribute>,
}

/// Freeze flags for merge-children. A set flag keeps that component of each
/// child's transform relative to the merge root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeChildrenSettings {
    pub freeze_translation: bool,
    pub freeze_rotation: bool,
    pub freeze_scale: bool,
}

impl MergeChildrenSettings {
    /// With no flag set the children keep their own local space.
    pub fn any_frozen(&self) -> bool {
        self.freeze_translation || self.freeze_rotation || self.freeze_scale
    }
}

/// Membership in a numbered merge group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroupSettings {
    /// Group number, 0 means no group.
    pub number: u32,
    /// Explicitly make this member the group root.
    #[serde(default)]
    pub root: bool,
}

/// Mesh-node settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Keep the mesh CPU-accessible (`meshUsage`).
    pub cpu_mesh: Option<bool>,
    /// Passed through verbatim as `vertexCompressionRange`.
    pub vertex_compression_range: Option<String>,
    pub merge_group: Option<MergeGroupSettings>,
    /// Name of the armature object deforming this mesh.
    pub armature: Option<String>,
    /// Vertex group names, indexed by the group indices in the mesh weights.
    pub vertex_groups: Vec<String>,
    pub physics: Option<PhysicsSettings>,
    pub collision: Option<bool>,
    pub collision_filter_mask: Option<u32>,
    pub collision_filter_group: Option<u32>,
    pub casts_shadows: Option<bool>,
    pub receive_shadows: Option<bool>,
    pub non_renderable: Option<bool>,
    pub double_sided: Option<bool>,
    pub decal_layer: Option<u32>,
}

impl MeshSettings {
    /// The merge group number, if the mesh belongs to one.
    pub fn merge_group_number(&self) -> Option<u32> {
        self.merge_group.filter(|g| g.number != 0).map(|g| g.number)
    }
}

/// Rigid body type. Static wins over dynamic, dynamic over kinematic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    Static,
    Dynamic,
    Kinematic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSettings {
    pub body: BodyType,
    #[serde(default)]
    pub compound: bool,
    #[serde(default)]
    pub compound_child: bool,
    #[serde(default)]
    pub restitution: Option<f32>,
    #[serde(default)]
    pub static_friction: Option<f32>,
    #[serde(default)]
    pub dynamic_friction: Option<f32>,
    #[serde(default)]
    pub linear_damping: Option<f32>,
    #[serde(default)]
    pub angular_damping: Option<f32>,
    #[serde(default)]
    pub density: Option<f32>,
}

/// Joint parameters. Their presence marks the node as a joint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointSettings {
    pub projection: Option<bool>,
    pub x_axis_drive: Option<bool>,
    pub y_axis_drive: Option<bool>,
    pub z_axis_drive: Option<bool>,
    pub drive_pos: Option<bool>,
    pub breakable_joint: Option<bool>,
    pub proj_distance: Option<f32>,
    pub proj_angle: Option<f32>,
    pub drive_force_limit: Option<f32>,
    pub drive_spring: Option<f32>,
    pub drive_damping: Option<f32>,
    pub joint_break_force: Option<f32>,
    pub joint_break_torque: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

impl LightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightType::Directional => "directional",
            LightType::Point => "point",
            LightType::Spot => "spot",
        }
    }
}

/// Light data as exposed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSettings {
    pub light_type: LightType,
    #[serde(default = "white")]
    pub color: [f32; 3],
    /// Cutoff distance.
    #[serde(default)]
    pub range: Option<f32>,
    /// Spot cone size in radians.
    #[serde(default)]
    pub spot_size: Option<f32>,
    /// Spot edge blend in `[0, 1]`.
    #[serde(default)]
    pub spot_blend: Option<f32>,
    #[serde(default)]
    pub cast_shadow_map: bool,
    /// IES profile, only written for spot lights.
    #[serde(default)]
    pub ies_profile_file: Option<String>,
}

fn white() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// Camera data as exposed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Lens value written as `fov`.
    pub lens: f32,
    pub clip_start: f32,
    pub clip_end: f32,
    #[serde(default)]
    pub orthographic: bool,
    #[serde(default)]
    pub ortho_scale: Option<f32>,
}

/// Object-data texture settings for a node whose children are the entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDataSettings {
    /// Output texture path, `.dds` is appended if missing.
    pub file: String,
    #[serde(default)]
    pub hierarchical: bool,
    #[serde(default)]
    pub hide_first_and_last: bool,
    #[serde(default = "enabled")]
    pub position: bool,
    #[serde(default = "enabled")]
    pub orientation: bool,
    #[serde(default)]
    pub scale: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}
