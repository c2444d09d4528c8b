//! Vertex records and the deduplicating vertex buffer.

use crate::types::quantize;
use glam::Vec3;
use std::collections::HashMap;

/// Number of UV sets a vertex can carry.
pub const MAX_UV_SETS: usize = 4;

/// Number of bone influences per vertex.
pub const MAX_INFLUENCES: usize = 4;

/// Per-member identity marker baked into merged vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VertexTag {
    /// Fractional child marker written as `g` (merge children).
    Generic(f32),
    /// Member bind index written as `bi` (merge groups).
    BindIndex(u32),
}

/// Four bone weights and the matching indices into the skin bind list.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlendWeights {
    pub weights: [f32; MAX_INFLUENCES],
    pub indices: [u32; MAX_INFLUENCES],
}

impl BlendWeights {
    /// Keep the strongest influences, zero-padded to four slots.
    ///
    /// `influences` are `(bind index, weight)` pairs. Ties keep their input
    /// order.
    pub fn strongest(mut influences: Vec<(u32, f32)>) -> Self {
        influences.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut blend = Self::default();
        for (slot, (index, weight)) in influences.into_iter().take(MAX_INFLUENCES).enumerate() {
            blend.indices[slot] = index;
            blend.weights[slot] = weight;
        }
        blend
    }
}

/// Attribute bundle of one exported vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexRecord {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub color: Option<[f32; 4]>,
    pub uvs: [Option<[f32; 2]>; MAX_UV_SETS],
    pub blend: Option<BlendWeights>,
    pub tag: Option<VertexTag>,
}

impl VertexRecord {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            normal: None,
            color: None,
            uvs: [None; MAX_UV_SETS],
            blend: None,
            tag: None,
        }
    }

    /// Round every float to the precision it is written with.
    pub fn quantized(&self) -> Self {
        let q3 = |v: Vec3| Vec3::new(quantize(v.x), quantize(v.y), quantize(v.z));
        Self {
            position: q3(self.position),
            normal: self.normal.map(q3),
            color: self.color.map(|c| c.map(quantize)),
            uvs: self.uvs.map(|uv| uv.map(|t| t.map(quantize))),
            blend: self.blend.map(|b| BlendWeights {
                weights: b.weights.map(quantize),
                indices: b.indices,
            }),
            tag: self.tag.map(|t| match t {
                VertexTag::Generic(g) => VertexTag::Generic(quantize(g)),
                other => other,
            }),
        }
    }

    /// Build the dedup key of an already quantized record.
    fn key(&self, material: u32) -> VertexKey {
        let mut key = KeyBuilder::new(material);
        key.put(2, &self.position.to_array(), 0);
        if let Some(n) = self.normal {
            key.put(5, &n.to_array(), 1);
        }
        if let Some(c) = self.color {
            key.put(8, &c, 2);
        }
        for (set, uv) in self.uvs.iter().enumerate() {
            if let Some(uv) = uv {
                key.put(12 + set * 2, uv, 3 + set as u32);
            }
        }
        if let Some(b) = self.blend {
            key.put(20, &b.weights, 7);
            key.words[24..28].copy_from_slice(&b.indices);
        }
        match self.tag {
            Some(VertexTag::Generic(g)) => key.put(28, &[g], 8),
            Some(VertexTag::BindIndex(i)) => {
                key.words[1] |= 1 << 9;
                key.words[28] = i;
            }
            None => {}
        }
        VertexKey(key.words)
    }
}

struct KeyBuilder {
    words: [u32; KEY_WORDS],
}

impl KeyBuilder {
    fn new(material: u32) -> Self {
        let mut words = [0u32; KEY_WORDS];
        words[0] = material;
        Self { words }
    }

    /// Store float bits at `slot` and mark attribute `bit` present.
    fn put(&mut self, slot: usize, values: &[f32], bit: u32) {
        self.words[1] |= 1 << bit;
        for (i, v) in values.iter().enumerate() {
            self.words[slot + i] = v.to_bits();
        }
    }
}

/// material, mask, position 3, normal 3, color 4, uv 8, weights 4, indices 4, tag 1
const KEY_WORDS: usize = 29;

/// Bit-exact identity of a quantized record within one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VertexKey([u32; KEY_WORDS]);

/// Ordered vertex buffer with first-occurrence indices.
#[derive(Debug, Default)]
pub struct VertexBuffer {
    vertices: Vec<VertexRecord>,
    index: HashMap<VertexKey, u32>,
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `record`, appending it on first sight.
    ///
    /// The record is quantized before lookup, so records that print the
    /// same share a slot. Records of different materials never do.
    pub fn intern(&mut self, record: &VertexRecord, material: u32) -> u32 {
        let record = record.quantized();
        let key = record.key(material);
        if let Some(&index) = self.index.get(&key) {
            return index;
        }
        let index = self.vertices.len() as u32;
        self.vertices.push(record);
        self.index.insert(key, index);
        index
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[VertexRecord] {
        &self.vertices
    }

    pub fn into_vertices(self) -> Vec<VertexRecord> {
        self.vertices
    }
}
