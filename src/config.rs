//! Export configuration.

use crate::error::Result;
use crate::shape::ExtractOptions;
use crate::types::{AxisConversion, AxisOrientation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Program name written into `<Export program=...>`.
pub const DEFAULT_PROGRAM_NAME: &str = "Blender Exporter (Community)";

/// Configuration for one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub export_normals: bool,
    pub export_colors: bool,
    pub export_uvs: bool,
    pub export_skin_weights: bool,
    pub export_merge_groups: bool,
    pub axis_orientation: AxisOrientation,
    /// Use modifier-evaluated mesh data when the host provides it.
    pub apply_modifiers: bool,
    pub export_lights: bool,
    pub export_cameras: bool,
    pub export_shapes: bool,
    pub export_nurbs_curves: bool,
    pub export_user_attributes: bool,
    /// Write file paths relative to the output directory.
    pub relative_paths: bool,
    /// Game installation directory, for `$`-prefixed paths and the optimizer.
    pub game_path: Option<PathBuf>,
    pub game_relative_paths: bool,
    /// Compute `bvCenter`/`bvRadius` for shapes without a proxy.
    pub compute_bounding_volumes: bool,
    /// Run the binary optimizer after writing the document.
    pub export_binary_files: bool,
    pub optimizer_path: Option<PathBuf>,
    pub program_name: String,
    pub program_version: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_normals: true,
            export_colors: true,
            export_uvs: true,
            export_skin_weights: true,
            export_merge_groups: true,
            axis_orientation: AxisOrientation::BakeTransforms,
            apply_modifiers: true,
            export_lights: true,
            export_cameras: true,
            export_shapes: true,
            export_nurbs_curves: true,
            export_user_attributes: true,
            relative_paths: true,
            game_path: None,
            game_relative_paths: false,
            compute_bounding_volumes: false,
            export_binary_files: false,
            optimizer_path: None,
            program_name: DEFAULT_PROGRAM_NAME.to_string(),
            program_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ExportConfig {
    /// Parse a config from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn with_axis_orientation(mut self, orientation: AxisOrientation) -> Self {
        self.axis_orientation = orientation;
        self
    }

    pub fn with_game_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.game_path = Some(path.into());
        self
    }

    pub fn with_bounding_volumes(mut self, enabled: bool) -> Self {
        self.compute_bounding_volumes = enabled;
        self
    }

    pub fn with_optimizer(mut self, path: impl Into<PathBuf>) -> Self {
        self.optimizer_path = Some(path.into());
        self.export_binary_files = true;
        self
    }

    pub fn axis(&self) -> AxisConversion {
        AxisConversion::new(self.axis_orientation)
    }

    /// Attribute selection for mesh extraction.
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            normals: self.export_normals,
            colors: self.export_colors,
            uvs: self.export_uvs,
            axis: self.axis(),
        }
    }
}
