//! NURBS curve shapes.

use crate::scene::CurveData;
use crate::types::AxisConversion;
use glam::Vec3;

/// A curve written as `<NurbsCurve>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveShape {
    pub name: String,
    pub degree: u32,
    pub closed: bool,
    pub points: Vec<Vec3>,
}

impl CurveShape {
    pub fn from_curve(curve: &CurveData, axis: AxisConversion) -> Self {
        Self {
            name: curve.name.clone(),
            degree: curve.degree,
            closed: curve.cyclic,
            points: curve
                .points
                .iter()
                .map(|p| axis.point(Vec3::from(*p)))
                .collect(),
        }
    }

    pub fn form(&self) -> &'static str {
        if self.closed {
            "closed"
        } else {
            "open"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AxisOrientation;

    #[test]
    fn test_curve_points_are_corrected() {
        let curve = CurveData {
            name: "rail".into(),
            degree: 3,
            cyclic: true,
            points: vec![[1.0, 2.0, 3.0]],
        };
        let shape = CurveShape::from_curve(&curve, AxisConversion::new(AxisOrientation::BakeTransforms));
        assert_eq!(shape.points, vec![Vec3::new(1.0, 3.0, -2.0)]);
        assert_eq!(shape.form(), "closed");

        let kept = CurveShape::from_curve(&curve, AxisConversion::new(AxisOrientation::KeepTransforms));
        assert_eq!(kept.points, vec![Vec3::new(1.0, 2.0, 3.0)]);
    }
}
