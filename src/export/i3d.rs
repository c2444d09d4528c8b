//! I3D document writer.
//!
//! Turns an [`I3dDocument`] into the XML element tree and serializes it.
//! The whole document is built in memory; nothing touches the disk until
//! serialization has succeeded.

use super::xml::{self, Element, ElementExt};
use crate::document::{FileEntry, I3dDocument, MaterialEntry, ShapeEntry, ShapeGeometry};
use crate::error::Result;
use crate::graph::{ExportNode, NodeKind, SceneGraph, ShapeRef};
use crate::scene::{
    BodyType, CameraSettings, JointSettings, LightSettings, LightType, MeshSettings,
};
use crate::shape::{CurveShape, Shape, VertexRecord, VertexTag, MAX_UV_SETS};
use crate::types::{format_f32, join_g, Trs};
use std::path::Path;

/// Format version written on the root element.
pub const I3D_VERSION: &str = "1.6";
const SCHEMA_LOCATION: &str = "http://i3d.giants.ch/schema/i3d-1.6.xsd";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Range written for lights without a cutoff distance.
const DEFAULT_LIGHT_RANGE: f32 = 100.0;

/// Build the element tree of a document.
pub fn document_element(doc: &I3dDocument) -> Element {
    let mut root = Element::new("i3D")
        .attr("name", &doc.name)
        .attr("version", I3D_VERSION)
        .attr("xsi:noNamespaceSchemaLocation", SCHEMA_LOCATION)
        .attr("xmlns:xsi", XSI_NAMESPACE);

    root.push(
        Element::new("Asset").child(
            Element::new("Export")
                .attr("program", &doc.program)
                .attr("version", &doc.version),
        ),
    );

    push_section(&mut root, "Files", doc.files.iter().map(file_element));
    push_section(&mut root, "Materials", doc.materials.iter().map(material_element));
    push_section(&mut root, "Shapes", doc.shapes.iter().map(shape_element));
    push_section(
        &mut root,
        "Scene",
        doc.scene
            .roots
            .iter()
            .map(|&index| node_element(&doc.scene, index)),
    );
    push_section(
        &mut root,
        "UserAttributes",
        doc.user_attributes.iter().map(|entry| {
            let mut element = Element::new("UserAttribute").attr("nodeId", entry.node_id);
            for attribute in &entry.attributes {
                element.push(
                    Element::new("Attribute")
                        .attr("name", &attribute.name)
                        .attr("type", &attribute.kind)
                        .attr("value", &attribute.value),
                );
            }
            element
        }),
    );
    root
}

/// Serialize a document to XML text.
pub fn write_document(doc: &I3dDocument) -> Result<String> {
    xml::to_string(&document_element(doc))
}

/// Serialize a document and write it as ISO-8859-1.
pub fn write_document_to_file<P: AsRef<Path>>(doc: &I3dDocument, path: P) -> Result<()> {
    let text = write_document(doc)?;
    std::fs::write(path.as_ref(), xml::encode_latin1(&text))?;
    tracing::info!(path = %path.as_ref().display(), bytes = text.len(), "wrote i3d document");
    Ok(())
}

/// Sections are only written when they have content.
fn push_section(root: &mut Element, name: &str, children: impl Iterator<Item = Element>) {
    let mut section = Element::new(name);
    section.extend_children(children);
    if !section.children.is_empty() {
        root.push(section);
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn file_element(entry: &FileEntry) -> Element {
    Element::new("File")
        .attr("fileId", entry.id)
        .attr("relativePath", bool_str(entry.file.relative))
        .attr("filename", &entry.file.filename)
}

fn material_element(entry: &MaterialEntry) -> Element {
    let m = &entry.material;
    let mut element = Element::new("Material")
        .attr("materialId", entry.id)
        .attr("name", &m.name);

    if m.diffuse_color != [0.0; 3] {
        element.set("diffuseColor", format!("{} 1", join_g(&m.diffuse_color)));
    }
    element.set(
        "specularColor",
        join_g(&[1.0 - m.roughness, m.specular_intensity, m.metallic]),
    );
    element.set_opt("emissiveColor", m.emissive_color.map(|c| join_g(&c)));
    element.flag("alphaBlending", m.alpha_blending);

    let maps = [
        ("Texture", entry.texture),
        ("Glossmap", entry.gloss_map),
        ("Normalmap", entry.normal_map),
        ("Emissivemap", entry.emissive_map),
    ];
    for (name, file_id) in maps {
        let Some(file_id) = file_id else {
            continue;
        };
        let mut map = Element::new(name).attr("fileId", file_id);
        if name == "Normalmap" {
            map.set_opt("bumpDepth", m.bump_depth.map(format_f32));
        }
        element.push(map);
    }

    element.set_opt("customShaderVariation", m.custom_shader_variation.as_deref());
    for parameter in &m.custom_parameters {
        element.push(
            Element::new("CustomParameter")
                .attr("name", &parameter.name)
                .attr("value", &parameter.value),
        );
    }
    element.set_opt("customShaderId", entry.custom_shader);
    for (name, file_id) in &entry.custom_maps {
        element.push(
            Element::new("Custommap")
                .attr("name", name)
                .attr("fileId", file_id),
        );
    }
    element.set_opt("shadingRate", m.shading_rate.as_deref());
    element
}

fn shape_element(entry: &ShapeEntry) -> Element {
    match &entry.geometry {
        ShapeGeometry::Triangles(shape) => triangle_set_element(entry.id, shape),
        ShapeGeometry::Curve(curve) => curve_element(entry.id, curve),
    }
}

fn curve_element(id: u32, curve: &CurveShape) -> Element {
    let mut element = Element::new("NurbsCurve")
        .attr("shapeId", id)
        .attr("name", &curve.name)
        .attr("degree", curve.degree)
        .attr("form", curve.form());
    for point in &curve.points {
        element.push(Element::new("cv").attr("c", join_g(&point.to_array())));
    }
    element
}

fn triangle_set_element(id: u32, shape: &Shape) -> Element {
    let mut element = Element::new("IndexedTriangleSet")
        .attr("name", &shape.name)
        .attr("shapeId", id);
    element.set_opt("meshUsage", shape.mesh_usage);
    if let Some(bv) = &shape.bounding_volume {
        element.set("bvCenter", join_g(&bv.center.to_array()));
        element.set("bvRadius", format_f32(bv.radius));
    }
    element.set_opt("vertexCompressionRange", shape.vertex_compression_range.as_deref());
    element.set_opt("isOptimized", shape.is_optimized.map(bool_str));

    let flags = &shape.flags;
    let mut vertices = Element::new("Vertices").attr("count", shape.vertices.len());
    if flags.normal {
        vertices.set("normal", "true");
        vertices.set("tangent", "true");
    }
    for set in 0..MAX_UV_SETS {
        vertices.flag(format!("uv{}", set), flags.uvs[set]);
    }
    vertices.flag("color", flags.color);
    vertices.flag("blendweights", flags.blend_weights);
    vertices.flag("singleblendweights", flags.single_blend_weights);
    vertices.flag("generic", flags.generic);
    vertices.extend_children(shape.vertices.iter().map(|v| vertex_element(v, shape)));
    element.push(vertices);

    let mut triangles = Element::new("Triangles").attr("count", shape.triangles.len());
    triangles.extend_children(shape.triangles.iter().map(|[a, b, c]| {
        Element::new("t").attr("vi", format!("{} {} {}", a, b, c))
    }));
    element.push(triangles);

    let mut subsets = Element::new("Subsets").attr("count", shape.subsets.len());
    for subset in &shape.subsets {
        let mut s = Element::new("Subset")
            .attr("firstVertex", subset.first_vertex)
            .attr("numVertices", subset.num_vertices)
            .attr("firstIndex", subset.first_index)
            .attr("numIndices", subset.num_indices);
        for set in 0..MAX_UV_SETS {
            if flags.uvs[set] {
                s.set_opt(
                    format!("uvDensity{}", set),
                    subset.uv_density[set].map(format_f32),
                );
            }
        }
        if let Some(slot) = subset.material_slot_name.as_deref().filter(|s| !s.is_empty()) {
            s.set("materialSlotName", slot);
        }
        subsets.push(s);
    }
    element.push(subsets);
    element
}

fn vertex_element(vertex: &VertexRecord, shape: &Shape) -> Element {
    let flags = &shape.flags;
    let mut v = Element::new("v").attr("p", join_g(&vertex.position.to_array()));
    if flags.normal {
        let normal = vertex.normal.unwrap_or_default();
        v.set("n", join_g(&normal.to_array()));
    }
    if flags.color {
        // Merged members without a color layer print white.
        v.set(
            "c",
            vertex
                .color
                .map(|c| join_g(&c))
                .unwrap_or_else(|| "1 1 1 1".to_string()),
        );
    }
    for set in 0..MAX_UV_SETS {
        if flags.uvs[set] {
            let uv = vertex.uvs[set].unwrap_or([0.0, 0.0]);
            v.set(format!("t{}", set), join_g(&uv));
        }
    }
    if flags.blend_weights {
        let blend = vertex.blend.unwrap_or_default();
        v.set("bw", join_g(&blend.weights));
        v.set(
            "bi",
            blend
                .indices
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    match vertex.tag {
        Some(VertexTag::BindIndex(index)) if flags.single_blend_weights && !flags.blend_weights => {
            v.set("bi", index)
        }
        Some(VertexTag::Generic(g)) if flags.generic => v.set("g", format_f32(g)),
        _ => {}
    }
    v
}

fn node_element(graph: &SceneGraph, index: usize) -> Element {
    let node = graph.node(index);
    let mut element = match &node.kind {
        NodeKind::TransformGroup => transform_group_element(node),
        NodeKind::Light(light) => light_element(node, light),
        NodeKind::Camera(camera) => camera_element(node, camera),
        NodeKind::Mesh(settings) => match &node.shape {
            Some(shape) => mesh_shape_element(node, settings, shape),
            None => transform_group_element(node),
        },
        NodeKind::NurbsCurve => match &node.shape {
            Some(shape) => {
                let mut element = common_element("Shape", node);
                element.set("shapeId", shape.shape_id);
                element
            }
            None => transform_group_element(node),
        },
    };
    if node.write_children {
        element.extend_children(
            node.children
                .iter()
                .map(|&child| node_element(graph, child)),
        );
    }
    element
}

fn common_element(name: &str, node: &ExportNode) -> Element {
    let trs = Trs::from_matrix(node.transform);
    let mut element = Element::new(name)
        .attr("name", &node.name)
        .attr("nodeId", node.node_id)
        .attr("translation", join_g(&trs.translation.to_array()))
        .attr("rotation", join_g(&trs.euler_degrees().to_array()))
        .attr("scale", join_g(&trs.scale.to_array()));
    if !node.visible {
        element.set("visibility", "false");
    }
    element.set_opt("clipDistance", node.settings.clip_distance.map(format_f32));
    element.set_opt("objectMask", node.settings.object_mask);
    element
}

fn transform_group_element(node: &ExportNode) -> Element {
    let mut element = common_element("TransformGroup", node);
    if let Some(joint) = &node.settings.joint {
        write_joint(&mut element, joint);
    }
    element
}

fn write_joint(element: &mut Element, joint: &JointSettings) {
    element.set("joint", "true");
    let flags = [
        ("projection", joint.projection),
        ("xAxisDrive", joint.x_axis_drive),
        ("yAxisDrive", joint.y_axis_drive),
        ("zAxisDrive", joint.z_axis_drive),
        ("drivePos", joint.drive_pos),
        ("breakableJoint", joint.breakable_joint),
    ];
    for (name, value) in flags {
        element.set_opt(name, value.map(bool_str));
    }
    let values = [
        ("projDistance", joint.proj_distance),
        ("projAngle", joint.proj_angle),
        ("driveForceLimit", joint.drive_force_limit),
        ("driveSpring", joint.drive_spring),
        ("driveDamping", joint.drive_damping),
        ("jointBreakForce", joint.joint_break_force),
        ("jointBreakTorque", joint.joint_break_torque),
    ];
    for (name, value) in values {
        element.set_opt(name, value.map(format_f32));
    }
}

fn light_element(node: &ExportNode, light: &LightSettings) -> Element {
    let mut element = common_element("Light", node);
    element.set("type", light.light_type.as_str());
    element.set("color", join_g(&light.color));
    element.set("emitDiffuse", "true");
    element.set("emitSpecular", "true");
    element.set(
        "range",
        format!("{:.2}", light.range.unwrap_or(DEFAULT_LIGHT_RANGE)),
    );
    element.set("castShadowMap", bool_str(light.cast_shadow_map));
    if light.light_type == LightType::Spot {
        element.set_opt(
            "coneAngle",
            light.spot_size.map(|size| format_f32(size.to_degrees())),
        );
        element.set_opt(
            "dropOff",
            light.spot_blend.map(|blend| format!("{:.3}", 5.0 * blend)),
        );
        element.set_opt("iesProfileFileId", node.ies_file_id);
    }
    element
}

fn camera_element(node: &ExportNode, camera: &CameraSettings) -> Element {
    let mut element = common_element("Camera", node);
    element.set("fov", format!("{:.3}", camera.lens));
    element.set("nearClip", format_f32(camera.clip_start));
    element.set("farClip", format_f32(camera.clip_end));
    if camera.orthographic {
        element.set("orthographic", "true");
        element.set_opt("orthographicHeight", camera.ortho_scale.map(format_f32));
    }
    element
}

fn mesh_shape_element(node: &ExportNode, settings: &MeshSettings, shape: &ShapeRef) -> Element {
    let mut element = common_element("Shape", node);
    element.set("shapeId", shape.shape_id);

    if let Some(physics) = &settings.physics {
        element.flag("static", physics.body == BodyType::Static);
        element.flag("dynamic", physics.body == BodyType::Dynamic);
        element.flag("kinematic", physics.body == BodyType::Kinematic);
        element.flag("compound", physics.compound);
        element.flag("compoundChild", physics.compound_child && !physics.compound);
        let values = [
            ("restitution", physics.restitution),
            ("staticFriction", physics.static_friction),
            ("dynamicFriction", physics.dynamic_friction),
            ("linearDamping", physics.linear_damping),
            ("angularDamping", physics.angular_damping),
            ("density", physics.density),
        ];
        for (name, value) in values {
            element.set_opt(name, value.map(format_f32));
        }
    }

    let flags = [
        ("collision", settings.collision),
        ("nonRenderable", settings.non_renderable),
        ("castsShadows", settings.casts_shadows),
        ("receiveShadows", settings.receive_shadows),
        ("doubleSided", settings.double_sided),
    ];
    for (name, value) in flags {
        element.set_opt(name, value.map(bool_str));
    }
    element.set_opt("decalLayer", settings.decal_layer);
    element.set_opt(
        "collisionFilterMask",
        settings.collision_filter_mask.map(|m| format!("{:#x}", m)),
    );
    element.set_opt(
        "collisionFilterGroup",
        settings.collision_filter_group.map(|g| format!("{:#x}", g)),
    );

    if !shape.material_ids.is_empty() {
        element.set("materialIds", join_ids(&shape.material_ids));
    }
    if !shape.skin_bind_node_ids.is_empty() {
        element.set("skinBindNodeIds", join_ids(&shape.skin_bind_node_ids));
    }
    element
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter().map(u32::to_string).collect::<Vec<_>>().join(" ")
}
