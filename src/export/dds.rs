//! DX10 DDS writer for half-float RGBA texture arrays.
//!
//! Only the layout the engine reads for object-data textures is supported:
//! `R16G16B16A16_FLOAT`, one mip level, a 2D texture with an arbitrary
//! number of array slices. Headers come from `ddsfile`.

use crate::error::{ExportError, Result};
use ddsfile::{
    AlphaMode, Caps, Caps2, D3D10ResourceDimension, Dds, DxgiFormat, HeaderFlags, NewDxgiParams,
};
use half::f16;

/// Tag in `reserved1[0]` marking a GIANTS-written file.
pub const GIANTS_TAG: u32 = 0x288A_E8D9;
/// Value in `reserved1[2]` that lets the engine load the data unconverted.
const ALLOW_RAW: u32 = 2;

/// Size of the magic plus both headers.
pub const DATA_OFFSET: usize = 4 + 124 + 20;

/// A half-float RGBA texture array.
#[derive(Debug, Clone, PartialEq)]
pub struct DdsTexture {
    pub width: u32,
    pub height: u32,
    pub array_size: u32,
    /// Texels in slice, row, column order.
    pub texels: Vec<[f32; 4]>,
}

impl DdsTexture {
    pub fn new(width: u32, height: u32, array_size: u32) -> Self {
        Self {
            width,
            height,
            array_size,
            texels: Vec::with_capacity((width * height * array_size) as usize),
        }
    }

    /// Encode the full file.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.width == 0 || self.height == 0 || self.array_size == 0 {
            return Err(ExportError::ObjectData(format!(
                "texture has no data ({}x{}, {} arrays)",
                self.width, self.height, self.array_size
            )));
        }
        let expected = self.width as usize * self.height as usize * self.array_size as usize;
        if self.texels.len() != expected {
            return Err(ExportError::ObjectData(format!(
                "expected {} texels, got {}",
                expected,
                self.texels.len()
            )));
        }

        let mut dds = self.container()?;
        dds.data = Vec::with_capacity(expected * 8);
        for texel in &self.texels {
            for value in texel {
                dds.data.extend_from_slice(&f16::from_f32(*value).to_le_bytes());
            }
        }

        let mut out = Vec::with_capacity(DATA_OFFSET + dds.data.len());
        dds.write(&mut out)
            .map_err(|e| ExportError::Dds(e.to_string()))?;
        Ok(out)
    }

    /// Header pair for the texture, without data.
    ///
    /// The engine expects a plain header: no pitch or depth, a single mip
    /// level, `TEXTURE` caps only, and the GIANTS tag in `reserved1`.
    fn container(&self) -> Result<Dds> {
        let mut dds = Dds::new_dxgi(NewDxgiParams {
            height: self.height,
            width: self.width,
            depth: None,
            format: DxgiFormat::R16G16B16A16_Float,
            mipmap_levels: Some(1),
            array_layers: Some(self.array_size),
            caps2: None,
            is_cubemap: false,
            resource_dimension: D3D10ResourceDimension::Texture2D,
            alpha_mode: AlphaMode::Unknown,
        })
        .map_err(|e| ExportError::Dds(e.to_string()))?;

        let header = &mut dds.header;
        header.flags = HeaderFlags::CAPS
            | HeaderFlags::HEIGHT
            | HeaderFlags::WIDTH
            | HeaderFlags::PIXELFORMAT
            | HeaderFlags::MIPMAPCOUNT;
        header.pitch = None;
        header.linear_size = None;
        header.depth = None;
        header.mip_map_count = Some(1);
        header.caps = Caps::TEXTURE;
        header.caps2 = Caps2::empty();
        header.reserved1 = [0; 11];
        header.reserved1[0] = GIANTS_TAG;
        header.reserved1[2] = ALLOW_RAW;
        Ok(dds)
    }
}
