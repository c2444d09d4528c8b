//! Per-subset UV density.
//!
//! Estimates texture texels per world unit for a run of triangles, one value
//! per UV set. Each triangle contributes the mean of its three edge ratios
//! `|duv| / |dp|`. Degenerate triangles and densities too small to matter
//! are dropped, and the survivors are reduced to a robust lower bound:
//! `max(min, max(mean - stddev, 0.75 * mean))`.

use super::vertex::{VertexRecord, MAX_UV_SETS};

/// Densities below `1 / 2^(log2(4096) - log2(64))` are meaningless.
pub const MIN_USEFUL_DENSITY: f64 = 1.0 / 64.0;

/// Upper clamp of a single triangle's density.
const MAX_DENSITY: f64 = 1.0;

/// Welford's online mean and variance, plus the observed minimum.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::MAX,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    fn density(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let robust = (self.mean - self.variance().sqrt()).max(0.75 * self.mean);
        Some(self.min.max(robust))
    }
}

/// Compute the density of every UV set for triangles fully inside
/// `[first_index, first_index + num_indices)`.
///
/// A UV set with no surviving triangle yields `None`.
pub fn compute_density(
    triangles: &[[u32; 3]],
    vertices: &[VertexRecord],
    first_index: u32,
    num_indices: u32,
) -> [Option<f32>; MAX_UV_SETS] {
    let start = first_index as usize;
    let end = start + num_indices as usize;
    let in_range = triangles
        .iter()
        .enumerate()
        .filter(|(t, _)| t * 3 >= start && t * 3 + 3 <= end)
        .map(|(_, tri)| tri);

    let mut accumulators = [Accumulator::new(); MAX_UV_SETS];
    for tri in in_range {
        let Some(corners) = corners(tri, vertices) else {
            continue;
        };
        for (set, acc) in accumulators.iter_mut().enumerate() {
            if let Some(density) = triangle_density(&corners, set) {
                acc.push(density);
            }
        }
    }

    accumulators.map(|acc| acc.density().map(|d| d as f32))
}

fn corners<'a>(tri: &[u32; 3], vertices: &'a [VertexRecord]) -> Option<[&'a VertexRecord; 3]> {
    Some([
        vertices.get(tri[0] as usize)?,
        vertices.get(tri[1] as usize)?,
        vertices.get(tri[2] as usize)?,
    ])
}

/// Density of one triangle for one UV set, `None` if it contributes nothing.
fn triangle_density(corners: &[&VertexRecord; 3], set: usize) -> Option<f64> {
    let mut sum = 0.0;
    for (a, b) in [(0, 1), (1, 2), (2, 0)] {
        let (va, vb) = (corners[a], corners[b]);
        let (uva, uvb) = (va.uvs[set]?, vb.uvs[set]?);

        let dp = (va.position - vb.position).as_dvec3().length_squared();
        let du = uva[0] as f64 - uvb[0] as f64;
        let dv = uva[1] as f64 - uvb[1] as f64;
        let duv = du * du + dv * dv;
        if dp == 0.0 || duv == 0.0 {
            return None;
        }
        sum += (duv / dp).sqrt();
    }

    let density = (sum / 3.0).min(MAX_DENSITY);
    (density >= MIN_USEFUL_DENSITY).then_some(density)
}
