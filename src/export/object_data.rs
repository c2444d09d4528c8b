//! Object-data textures: child transforms packed into a DDS array.
//!
//! A node's children (flat mode) or grandchildren (hierarchical mode) are
//! sampled as texels. Each pose contributes one array slice per enabled
//! channel, where a texel holds a position, an orientation quaternion or a
//! scale.

use crate::error::{ExportError, Result};
use crate::export::dds::DdsTexture;
use crate::scene::{ObjectDataSettings, ObjectId, SceneSource};
use crate::types::{AxisConversion, Trs};
use glam::Quat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The sampled transform of one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectDataEntry {
    /// xyz plus a visibility flag in w.
    pub position: [f32; 4],
    /// Quaternion in xyzw order.
    pub orientation: [f32; 4],
    /// xyz plus 1.
    pub scale: [f32; 4],
}

/// Poses of rows of entries, padded to a rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDataTexture {
    pub width: u32,
    pub height: u32,
    /// `poses[pose][row][column]`
    pub poses: Vec<Vec<Vec<ObjectDataEntry>>>,
    pub position: bool,
    pub orientation: bool,
    pub scale: bool,
}

struct Sampler<'a> {
    scene: &'a dyn SceneSource,
    axis: AxisConversion,
    hide_first_and_last: bool,
    /// Last emitted quaternion, kept across the whole texture.
    previous: Option<Quat>,
}

impl Sampler<'_> {
    fn row(&mut self, parent: ObjectId) -> Vec<ObjectDataEntry> {
        let children = sorted_children(self.scene, parent);
        let count = children.len();
        children
            .into_iter()
            .enumerate()
            .map(|(i, child)| {
                let mut entry = self.entry(child, parent);
                if self.hide_first_and_last && (i == 0 || i + 1 == count) {
                    entry.position[3] = 0.0;
                }
                entry
            })
            .collect()
    }

    fn entry(&mut self, id: ObjectId, parent: ObjectId) -> ObjectDataEntry {
        let oriented = |id| self.scene.object(id).is_some_and(|o| o.is_oriented());
        let local = self.axis.node_matrix(
            self.scene.local_transform(id),
            oriented(id),
            oriented(parent),
        );
        let trs = Trs::from_matrix(local);

        let mut rotation = trs.rotation;
        if let Some(previous) = self.previous {
            if rotation.dot(previous) < 0.0 {
                rotation = -rotation;
            }
        }
        self.previous = Some(rotation);

        let t = trs.translation;
        let s = trs.scale;
        ObjectDataEntry {
            position: [t.x, t.y, t.z, 1.0],
            orientation: [rotation.x, rotation.y, rotation.z, rotation.w].map(round6),
            scale: [s.x, s.y, s.z, 1.0],
        }
    }
}

fn round6(value: f32) -> f32 {
    ((value as f64 * 1e6).round() / 1e6) as f32
}

fn sorted_children(scene: &dyn SceneSource, id: ObjectId) -> Vec<ObjectId> {
    let mut children: Vec<(String, ObjectId)> = scene
        .children(id)
        .into_iter()
        .filter_map(|c| scene.object(c).map(|o| (o.name.clone(), c)))
        .collect();
    children.sort();
    children.into_iter().map(|(_, c)| c).collect()
}

fn object_name(scene: &dyn SceneSource, id: ObjectId) -> String {
    scene
        .object(id)
        .map(|o| o.name.clone())
        .unwrap_or_else(|| format!("#{}", id.0))
}

impl ObjectDataTexture {
    /// Sample the hierarchy below `node`.
    pub fn build(
        scene: &dyn SceneSource,
        node: ObjectId,
        settings: &ObjectDataSettings,
        axis: AxisConversion,
    ) -> Result<Self> {
        let mut sampler = Sampler {
            scene,
            axis,
            hide_first_and_last: settings.hide_first_and_last,
            previous: None,
        };
        let name = object_name(scene, node);

        let mut poses = if settings.hierarchical {
            let pose_ids = sorted_children(scene, node);
            if pose_ids.is_empty() {
                return Err(ExportError::ObjectData(format!("'{}' has no poses", name)));
            }
            let mut poses = Vec::with_capacity(pose_ids.len());
            for pose in pose_ids {
                let row_ids = sorted_children(scene, pose);
                if row_ids.is_empty() {
                    return Err(ExportError::ObjectData(format!(
                        "pose '{}' has no rows",
                        object_name(scene, pose)
                    )));
                }
                let mut rows = Vec::with_capacity(row_ids.len());
                for row in row_ids {
                    let entries = sampler.row(row);
                    if entries.is_empty() {
                        return Err(ExportError::ObjectData(format!(
                            "row '{}' has no columns",
                            object_name(scene, row)
                        )));
                    }
                    rows.push(entries);
                }
                poses.push(rows);
            }
            poses
        } else {
            let row = sampler.row(node);
            if row.is_empty() {
                return Err(ExportError::ObjectData(format!("'{}' has no children", name)));
            }
            vec![vec![row]]
        };

        let height = poses[0].len();
        if let Some(pose) = poses.iter().position(|p| p.len() != height) {
            return Err(ExportError::ObjectData(format!(
                "pose {} of '{}' has {} rows, expected {}",
                pose,
                name,
                poses[pose].len(),
                height
            )));
        }

        let width = poses
            .iter()
            .flatten()
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        for row in poses.iter_mut().flatten() {
            if let Some(&last) = row.last() {
                row.resize(width, last);
            }
        }

        debug!(node = %name, poses = poses.len(), width, height, "sampled object data");

        Ok(Self {
            width: width as u32,
            height: height as u32,
            poses,
            position: settings.position,
            orientation: settings.orientation,
            scale: settings.scale,
        })
    }

    fn channels(&self) -> Vec<fn(&ObjectDataEntry) -> [f32; 4]> {
        let mut channels: Vec<fn(&ObjectDataEntry) -> [f32; 4]> = Vec::new();
        if self.position {
            channels.push(|e| e.position);
        }
        if self.orientation {
            channels.push(|e| e.orientation);
        }
        if self.scale {
            channels.push(|e| e.scale);
        }
        channels
    }

    /// One slice per pose per enabled channel.
    pub fn array_size(&self) -> u32 {
        (self.poses.len() * self.channels().len()) as u32
    }

    pub fn to_texture(&self) -> DdsTexture {
        let channels = self.channels();
        let mut texture = DdsTexture::new(self.width, self.height, self.array_size());
        for pose in &self.poses {
            for channel in &channels {
                for row in pose.iter().rev() {
                    texture.texels.extend(row.iter().map(channel));
                }
            }
        }
        texture
    }

    pub fn to_dds(&self) -> Result<Vec<u8>> {
        self.to_texture().encode()
    }

    /// Write the texture and return the path written.
    pub fn write(&self, file: &str, output_dir: Option<&Path>) -> Result<PathBuf> {
        let path = output_path(file, output_dir);
        std::fs::write(&path, self.to_dds()?)?;
        Ok(path)
    }
}

/// Where an object-data texture goes. `.dds` is appended when missing and a
/// relative name is placed next to the document.
pub fn output_path(file: &str, output_dir: Option<&Path>) -> PathBuf {
    let mut name = file.to_string();
    if !name.to_ascii_lowercase().ends_with(".dds") {
        name.push_str(".dds");
    }
    let path = PathBuf::from(name);
    match output_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::dds::DATA_OFFSET;
    use crate::scene::{ObjectKind, Scene, SceneObject};
    use crate::types::AxisOrientation;
    use glam::{Mat4, Vec3};
    use half::f16;

    fn settings() -> ObjectDataSettings {
        ObjectDataSettings {
            file: "array".into(),
            hierarchical: false,
            hide_first_and_last: false,
            position: true,
            orientation: true,
            scale: false,
        }
    }

    fn keep() -> AxisConversion {
        AxisConversion::new(AxisOrientation::KeepTransforms)
    }

    fn empty(name: &str, parent: &str, x: f32) -> SceneObject {
        SceneObject::new(name, ObjectKind::Empty)
            .with_parent(parent)
            .with_transform(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)))
    }

    fn flat_scene() -> (Scene, ObjectId) {
        let mut scene = Scene::new("data");
        let root = scene.add_object(SceneObject::new("root", ObjectKind::Empty));
        // Inserted out of order; entries follow name order.
        scene.add_object(empty("c", "root", 3.0));
        scene.add_object(empty("a", "root", 1.0));
        scene.add_object(empty("b", "root", 2.0));
        (scene, root)
    }

    #[test]
    fn test_flat_row_sorted_by_name() {
        let (scene, root) = flat_scene();
        let tex = ObjectDataTexture::build(&scene, root, &settings(), keep()).unwrap();
        assert_eq!((tex.width, tex.height), (3, 1));
        let xs: Vec<f32> = tex.poses[0][0].iter().map(|e| e.position[0]).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
        assert_eq!(tex.array_size(), 2);
    }

    #[test]
    fn test_hide_first_and_last() {
        let (scene, root) = flat_scene();
        let s = ObjectDataSettings {
            hide_first_and_last: true,
            ..settings()
        };
        let tex = ObjectDataTexture::build(&scene, root, &s, keep()).unwrap();
        let w: Vec<f32> = tex.poses[0][0].iter().map(|e| e.position[3]).collect();
        assert_eq!(w, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_baked_positions() {
        let mut scene = Scene::new("data");
        let root = scene.add_object(SceneObject::new("root", ObjectKind::Empty));
        scene.add_object(
            SceneObject::new("a", ObjectKind::Empty)
                .with_parent("root")
                .with_transform(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))),
        );
        let axis = AxisConversion::new(AxisOrientation::BakeTransforms);
        let tex = ObjectDataTexture::build(&scene, root, &settings(), axis).unwrap();
        let p = tex.poses[0][0][0].position;
        assert!((p[0] - 1.0).abs() < 1e-5);
        assert!((p[1] - 3.0).abs() < 1e-5);
        assert!((p[2] + 2.0).abs() < 1e-5);
    }

    fn hierarchical_scene(second_pose_rows: usize) -> (Scene, ObjectId) {
        let mut scene = Scene::new("data");
        let root = scene.add_object(SceneObject::new("root", ObjectKind::Empty));
        for (pose, rows) in [("pose0", 2), ("pose1", second_pose_rows)] {
            scene.add_object(SceneObject::new(pose, ObjectKind::Empty).with_parent("root"));
            for y in 0..rows {
                let row = format!("{}_y{}", pose, y);
                scene.add_object(SceneObject::new(row.clone(), ObjectKind::Empty).with_parent(pose));
                // Row 0 is short.
                let columns = if y == 0 { 1 } else { 3 };
                for x in 0..columns {
                    scene.add_object(empty(&format!("{}_x{}", row, x), &row, x as f32));
                }
            }
        }
        (scene, root)
    }

    #[test]
    fn test_hierarchical_padding() {
        let (scene, root) = hierarchical_scene(2);
        let s = ObjectDataSettings {
            hierarchical: true,
            scale: true,
            ..settings()
        };
        let tex = ObjectDataTexture::build(&scene, root, &s, keep()).unwrap();
        assert_eq!((tex.width, tex.height), (3, 2));
        assert_eq!(tex.poses.len(), 2);
        assert_eq!(tex.array_size(), 6);
        let short = &tex.poses[0][0];
        assert_eq!(short.len(), 3);
        assert_eq!(short[2], short[0]);
        assert_eq!(tex.to_texture().texels.len(), 3 * 2 * 6);
    }

    #[test]
    fn test_hierarchical_row_count_mismatch() {
        let (scene, root) = hierarchical_scene(1);
        let s = ObjectDataSettings {
            hierarchical: true,
            ..settings()
        };
        let err = ObjectDataTexture::build(&scene, root, &s, keep()).unwrap_err();
        assert!(matches!(err, ExportError::ObjectData(_)));
    }

    #[test]
    fn test_hierarchical_without_poses() {
        let mut scene = Scene::new("data");
        let root = scene.add_object(SceneObject::new("root", ObjectKind::Empty));
        let s = ObjectDataSettings {
            hierarchical: true,
            ..settings()
        };
        assert!(ObjectDataTexture::build(&scene, root, &s, keep()).is_err());
    }

    #[test]
    fn test_empty_pose_rejected() {
        let mut scene = Scene::new("data");
        let root = scene.add_object(SceneObject::new("root", ObjectKind::Empty));
        scene.add_object(SceneObject::new("pose", ObjectKind::Empty).with_parent("root"));
        let s = ObjectDataSettings {
            hierarchical: true,
            ..settings()
        };
        let err = ObjectDataTexture::build(&scene, root, &s, keep()).unwrap_err();
        assert!(err.to_string().contains("no rows"));
    }

    #[test]
    fn test_quaternion_sign_follows_previous() {
        let mut scene = Scene::new("data");
        let root = scene.add_object(SceneObject::new("root", ObjectKind::Empty));
        // 350 degrees about Z decomposes with w < 0 or w > 0 depending on
        // the solver; either way it must end up in the first one's hemisphere.
        for (name, angle) in [("a", 10.0f32), ("b", 350.0)] {
            scene.add_object(
                SceneObject::new(name, ObjectKind::Empty)
                    .with_parent("root")
                    .with_transform(Mat4::from_rotation_z(angle.to_radians())),
            );
        }
        let tex = ObjectDataTexture::build(&scene, root, &settings(), keep()).unwrap();
        let q0 = Quat::from_array(tex.poses[0][0][0].orientation);
        let q1 = Quat::from_array(tex.poses[0][0][1].orientation);
        assert!(q0.dot(q1) >= 0.0);
    }

    #[test]
    fn test_orientation_rounded() {
        let mut scene = Scene::new("data");
        let root = scene.add_object(SceneObject::new("root", ObjectKind::Empty));
        scene.add_object(
            SceneObject::new("a", ObjectKind::Empty)
                .with_parent("root")
                .with_transform(Mat4::from_rotation_x(0.123_456_789)),
        );
        let tex = ObjectDataTexture::build(&scene, root, &settings(), keep()).unwrap();
        for value in tex.poses[0][0][0].orientation {
            let scaled = value as f64 * 1e6;
            assert!((scaled - scaled.round()).abs() < 0.05);
        }
    }

    #[test]
    fn test_dds_rows_written_last_first() {
        let mut scene = Scene::new("data");
        let root = scene.add_object(SceneObject::new("root", ObjectKind::Empty));
        scene.add_object(SceneObject::new("pose", ObjectKind::Empty).with_parent("root"));
        for (row, x) in [("r0", 1.0), ("r1", 2.0)] {
            scene.add_object(SceneObject::new(row, ObjectKind::Empty).with_parent("pose"));
            scene.add_object(empty(&format!("{}c", row), row, x));
        }
        let s = ObjectDataSettings {
            hierarchical: true,
            orientation: false,
            ..settings()
        };
        let tex = ObjectDataTexture::build(&scene, root, &s, keep()).unwrap();
        let bytes = tex.to_dds().unwrap();
        let first_x = f16::from_le_bytes([bytes[DATA_OFFSET], bytes[DATA_OFFSET + 1]]).to_f32();
        assert_eq!(first_x, 2.0);
    }

    #[test]
    fn test_write_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (scene, root) = flat_scene();
        let tex = ObjectDataTexture::build(&scene, root, &settings(), keep()).unwrap();
        let path = tex.write("textures_array", Some(dir.path())).unwrap();
        assert_eq!(path, dir.path().join("textures_array.dds"));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"DDS ");
        assert_eq!(output_path("a.DDS", None), PathBuf::from("a.DDS"));
    }
}
