//! # I3D Exporter
//!
//! A Rust library for exporting 3D scene snapshots to the GIANTS I3D format.
//!
//! ## Overview
//!
//! This library takes a host scene (objects, meshes, curves, materials) as
//! input and produces an I3D XML document with deduplicated vertex buffers,
//! merge-group and merged-children shapes, bounding volumes and material
//! and file tables. Object-data textures are written as DX10 DDS files.
//!
//! ## Quick Start
//!
//! ```ignore
//! use i3d_exporter::{ExportConfig, I3dExporter, Scene};
//!
//! // Load a scene snapshot
//! let scene = Scene::load("scene.json")?;
//!
//! // Export with default settings
//! let exporter = I3dExporter::with_config(ExportConfig::default());
//! let report = exporter.export_to_file(&scene, "vehicle.i3d".as_ref())?;
//! println!("{} shapes", report.shapes);
//! ```
//!
//! ## Library Integration
//!
//! Hosts that keep their own scene representation implement the
//! [`SceneSource`] trait instead of building a [`Scene`]:
//!
//! ```ignore
//! use i3d_exporter::{I3dExporter, SceneSource};
//!
//! let xml = I3dExporter::new().export_string(&my_host_scene, "vehicle")?;
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod graph;
pub mod paths;
pub mod registry;
pub mod scene;
pub mod session;
pub mod shape;
pub mod types;

// Re-export main types for convenience
pub use config::ExportConfig;
pub use document::{I3dDocument, ShapeGeometry};
pub use error::{ExportError, Result};
pub use export::{ExportReport, I3dExporter, ObjectDataTexture};
pub use scene::{ObjectDataSettings, ObjectId, Scene, SceneObject, SceneSource};
pub use session::ExportSession;
pub use shape::Shape;
pub use types::{AxisConversion, AxisOrientation};

#[cfg(feature = "wasm")]
pub mod wasm;
