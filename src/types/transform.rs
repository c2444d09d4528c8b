//! Axis conventions and transform decomposition.

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// How host transforms are mapped into the Y-up I3D frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisOrientation {
    /// Rebake Z-up host data into Y-up: `(x, y, z) -> (x, z, -y)`.
    #[default]
    BakeTransforms,
    /// Write host transforms untouched.
    KeepTransforms,
}

/// Rotation of -90 degrees about X, which maps Z-up onto Y-up.
const TO_Y_UP: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, -1.0, 0.0),
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

/// Rotation of +90 degrees about X, the inverse of [`TO_Y_UP`].
const FROM_Y_UP: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 1.0, 0.0),
    Vec4::new(0.0, -1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

/// Axis remap `(x, y, z) -> (x, z, -y)`.
pub fn bake_point(p: Vec3) -> Vec3 {
    Vec3::new(p.x, p.z, -p.y)
}

/// Change of basis of a full transform into the Y-up frame.
pub fn bake_matrix(m: Mat4) -> Mat4 {
    TO_Y_UP * m * FROM_Y_UP
}

/// The single coordinate correction used by every export path.
///
/// Positions, normals, bounding volume centers, curve points and node
/// transforms all pass through the same instance so the correction cannot
/// drift between the main path and the merge or bounding-volume paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisConversion {
    orientation: AxisOrientation,
}

impl AxisConversion {
    pub fn new(orientation: AxisOrientation) -> Self {
        Self { orientation }
    }

    pub fn is_baked(&self) -> bool {
        self.orientation == AxisOrientation::BakeTransforms
    }

    /// Correct a point or direction.
    pub fn point(&self, p: Vec3) -> Vec3 {
        if self.is_baked() {
            bake_point(p)
        } else {
            p
        }
    }

    /// Correct a node's local transform.
    ///
    /// Lights and cameras look down their local -Z in the host but down -Z of
    /// a Y-up frame in I3D, so they get an extra -90 degrees about X, and
    /// their children get the inverse to stay in place.
    pub fn node_matrix(&self, local: Mat4, is_oriented: bool, parent_oriented: bool) -> Mat4 {
        if !self.is_baked() {
            return local;
        }
        let mut m = bake_matrix(local);
        if is_oriented {
            m *= TO_Y_UP;
        }
        if parent_oriented {
            m = FROM_Y_UP * m;
        }
        m
    }
}

/// A transform split into translation, rotation and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trs {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Trs {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Decompose an affine matrix.
    ///
    /// A mirrored basis (negative determinant) comes back with a negative
    /// X scale and a proper rotation. A collapsed axis keeps the identity
    /// rotation.
    pub fn from_matrix(m: Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        let rotation = if rotation.is_finite() {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Recompose as `T * R * S`.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Replace each component not selected with identity.
    pub fn select(&self, translation: bool, rotation: bool, scale: bool) -> Self {
        Self {
            translation: if translation { self.translation } else { Vec3::ZERO },
            rotation: if rotation { self.rotation } else { Quat::IDENTITY },
            scale: if scale { self.scale } else { Vec3::ONE },
        }
    }

    /// Euler angles in degrees for an XYZ rotation order (`Rz * Ry * Rx`).
    pub fn euler_degrees(&self) -> Vec3 {
        let r = Mat3::from_quat(self.rotation);
        // Row/column access: r.col(c)[row]
        let r20 = r.x_axis.z;
        let sin_y = (-r20).clamp(-1.0, 1.0);
        let cos_y = (1.0 - sin_y * sin_y).sqrt();

        let (x, y, z) = if cos_y > 1e-6 {
            (
                r.y_axis.z.atan2(r.z_axis.z),
                sin_y.asin(),
                r.x_axis.y.atan2(r.x_axis.x),
            )
        } else {
            // Gimbal lock, fold the whole roll into Z.
            (0.0, sin_y.asin(), (-r.y_axis.x).atan2(r.y_axis.y))
        };

        Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
    }
}
