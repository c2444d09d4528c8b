//! The assembled document handed to the writer.

use crate::graph::SceneGraph;
use crate::paths::FileRef;
use crate::scene::{MaterialData, UserAttribute};
use crate::shape::{CurveShape, Shape};

/// A registered file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub id: u32,
    pub file: FileRef,
}

/// A registered material with its file references resolved to ids.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialEntry {
    pub id: u32,
    pub material: MaterialData,
    pub texture: Option<u32>,
    pub gloss_map: Option<u32>,
    pub normal_map: Option<u32>,
    pub emissive_map: Option<u32>,
    pub custom_shader: Option<u32>,
    /// Custom map name and file id.
    pub custom_maps: Vec<(String, u32)>,
}

/// Geometry of one shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeGeometry {
    Triangles(Shape),
    Curve(CurveShape),
}

impl ShapeGeometry {
    pub fn name(&self) -> &str {
        match self {
            ShapeGeometry::Triangles(shape) => &shape.name,
            ShapeGeometry::Curve(curve) => &curve.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeEntry {
    pub id: u32,
    pub geometry: ShapeGeometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserAttributeEntry {
    pub node_id: u32,
    pub attributes: Vec<UserAttribute>,
}

/// Everything needed to write one I3D file.
#[derive(Debug, Clone, PartialEq)]
pub struct I3dDocument {
    pub name: String,
    pub program: String,
    pub version: String,
    pub files: Vec<FileEntry>,
    pub materials: Vec<MaterialEntry>,
    pub shapes: Vec<ShapeEntry>,
    pub scene: SceneGraph,
    pub user_attributes: Vec<UserAttributeEntry>,
}

impl I3dDocument {
    pub fn shape(&self, id: u32) -> Option<&ShapeEntry> {
        self.shapes.iter().find(|s| s.id == id)
    }

    /// Find a triangle shape by name.
    pub fn triangle_shape(&self, name: &str) -> Option<&Shape> {
        self.shapes.iter().find_map(|entry| match &entry.geometry {
            ShapeGeometry::Triangles(shape) if shape.name == name => Some(shape),
            _ => None,
        })
    }
}
