//! WASM bindings for i3d-exporter.
//!
//! Scenes and settings cross the boundary as JSON text.

use crate::export::ObjectDataTexture;
use crate::scene::{ObjectDataSettings, Scene, SceneSource};
use crate::{ExportConfig, ExportError, I3dExporter};
use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn init() {
    // Set up better panic messages in the browser console
    console_error_panic_hook::set_once();
}

fn js_error(e: ExportError) -> JsError {
    JsError::new(&e.to_string())
}

fn load_config(config_json: Option<String>) -> Result<ExportConfig, ExportError> {
    match config_json {
        Some(json) => ExportConfig::from_json(&json),
        None => Ok(ExportConfig::default()),
    }
}

/// Export a JSON scene snapshot and return the I3D XML text.
#[wasm_bindgen]
pub fn export_i3d(scene_json: &str, config_json: Option<String>) -> Result<String, JsError> {
    let scene = Scene::from_json(scene_json).map_err(js_error)?;
    let config = load_config(config_json).map_err(js_error)?;
    let name = scene.name.clone();
    I3dExporter::with_config(config)
        .export_string(&scene, &name)
        .map_err(js_error)
}

/// Build the object-data texture of `node` and return the DDS file bytes.
#[wasm_bindgen]
pub fn export_object_data(
    scene_json: &str,
    node: &str,
    settings_json: &str,
    config_json: Option<String>,
) -> Result<js_sys::Uint8Array, JsError> {
    let scene = Scene::from_json(scene_json).map_err(js_error)?;
    let config = load_config(config_json).map_err(js_error)?;
    let settings: ObjectDataSettings = serde_json::from_str(settings_json)
        .map_err(|e| js_error(ExportError::Json(e)))?;
    let id = scene
        .find(node)
        .ok_or_else(|| js_error(ExportError::MissingObject(node.to_string())))?;

    let bytes = ObjectDataTexture::build(&scene, id, &settings, config.axis())
        .and_then(|texture| texture.to_dds())
        .map_err(js_error)?;
    Ok(js_sys::Uint8Array::from(bytes.as_slice()))
}
