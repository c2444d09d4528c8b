//! Writers for the I3D document and its auxiliary files.
//!
//! [`I3dExporter`] ties the steps together: build the document, write the
//! XML, write object-data textures, then optionally run the binary
//! optimizer on the written file.

pub mod dds;
pub mod i3d;
pub mod object_data;
pub mod optimizer;
pub mod xml;

pub use i3d::{document_element, write_document, write_document_to_file};
pub use object_data::{ObjectDataEntry, ObjectDataTexture};

use crate::config::ExportConfig;
use crate::document::I3dDocument;
use crate::error::{ExportError, Result};
use crate::scene::SceneSource;
use crate::session::ExportSession;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Summary of a file export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub nodes: usize,
    pub shapes: usize,
    pub materials: usize,
    pub files: usize,
    /// Object-data textures written next to the document.
    pub object_data: Vec<PathBuf>,
    /// Last line printed by the binary optimizer, when it ran.
    pub optimizer_output: Option<String>,
}

/// Exports a scene to I3D.
pub struct I3dExporter {
    config: ExportConfig,
}

impl Default for I3dExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl I3dExporter {
    /// Create an exporter with default settings.
    pub fn new() -> Self {
        Self::with_config(ExportConfig::default())
    }

    pub fn with_config(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Build the document without writing anything.
    pub fn build_document(
        &self,
        scene: &dyn SceneSource,
        name: &str,
        output_dir: Option<&Path>,
    ) -> Result<I3dDocument> {
        let mut session = ExportSession::new(scene, self.config.clone());
        if let Some(dir) = output_dir {
            session = session.with_output_dir(dir);
        }
        session.build(name)
    }

    /// Build the document and return its XML text.
    pub fn export_string(&self, scene: &dyn SceneSource, name: &str) -> Result<String> {
        let doc = self.build_document(scene, name, None)?;
        write_document(&doc)
    }

    /// Export to `path`, writing object-data textures next to it.
    ///
    /// The XML is written before the optimizer runs, so an optimizer
    /// failure leaves a valid unoptimized document behind.
    pub fn export_to_file(&self, scene: &dyn SceneSource, path: &Path) -> Result<ExportReport> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output_dir = path.parent().filter(|p| !p.as_os_str().is_empty());

        let doc = self.build_document(scene, &name, output_dir)?;
        write_document_to_file(&doc, path)?;

        let mut report = ExportReport {
            path: path.to_path_buf(),
            nodes: doc.scene.preorder().len(),
            shapes: doc.shapes.len(),
            materials: doc.materials.len(),
            files: doc.files.len(),
            ..Default::default()
        };

        report.object_data = self.write_object_data(scene, &doc, output_dir)?;

        if self.config.export_binary_files {
            report.optimizer_output = Some(self.optimize(path)?);
        }

        info!(
            path = %path.display(),
            shapes = report.shapes,
            materials = report.materials,
            files = report.files,
            "export finished"
        );
        Ok(report)
    }

    fn write_object_data(
        &self,
        scene: &dyn SceneSource,
        doc: &I3dDocument,
        output_dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for node in doc.scene.preorder().into_iter().map(|i| doc.scene.node(i)) {
            let (Some(settings), Some(id)) = (&node.settings.object_data, node.object()) else {
                continue;
            };
            let texture = ObjectDataTexture::build(scene, id, settings, self.config.axis())?;
            let path = texture.write(&settings.file, output_dir)?;
            info!(node = %node.name, path = %path.display(), "wrote object data texture");
            written.push(path);
        }
        Ok(written)
    }

    fn optimize(&self, path: &Path) -> Result<String> {
        let Some(optimizer) = &self.config.optimizer_path else {
            return Err(ExportError::Optimizer(
                "binary export requested but no optimizer is configured".to_string(),
            ));
        };
        optimizer::run(optimizer, path, self.config.game_path.as_deref()).inspect_err(|e| {
            warn!(path = %path.display(), "{}; the unoptimized document was kept", e);
        })
    }
}
