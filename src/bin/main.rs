//! I3D exporter CLI
//!
//! Export JSON scene snapshots to GIANTS I3D files.

use clap::{Parser, Subcommand};
use i3d_exporter::{
    AxisOrientation, ExportConfig, I3dExporter, ObjectDataSettings, ObjectDataTexture, Scene,
    SceneSource, ShapeGeometry,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "i3d-exporter")]
#[command(author, version, about = "Export scene snapshots to the GIANTS I3D format", long_about = None)]
struct Cli {
    /// Log per-shape details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene to an .i3d file
    Export {
        /// Scene snapshot (JSON)
        #[arg(short, long)]
        scene: PathBuf,

        /// Output .i3d path
        #[arg(short, long)]
        output: PathBuf,

        /// Export settings (JSON), flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write host transforms without the Y-up correction
        #[arg(long)]
        keep_axes: bool,

        #[arg(long)]
        no_normals: bool,

        #[arg(long)]
        no_colors: bool,

        #[arg(long)]
        no_uvs: bool,

        /// Skip skin weights
        #[arg(long)]
        no_skin: bool,

        #[arg(long)]
        no_merge_groups: bool,

        /// Run the binary optimizer after writing
        #[arg(long)]
        binary: bool,
    },

    /// Write the object-data texture of one node
    ObjectData {
        /// Scene snapshot (JSON)
        #[arg(short, long)]
        scene: PathBuf,

        /// Node whose children are sampled
        #[arg(short, long)]
        node: String,

        /// Output .dds path
        #[arg(short, long)]
        output: PathBuf,

        /// Sample pose/row/column grandchildren instead of children
        #[arg(long)]
        hierarchical: bool,

        /// Mark the first and last entry of each row as hidden
        #[arg(long)]
        hide_first_and_last: bool,

        /// Also write a scale array
        #[arg(long)]
        scale: bool,

        #[arg(long)]
        keep_axes: bool,
    },

    /// Show what an export of a scene would contain
    Info {
        /// Scene snapshot (JSON)
        #[arg(short, long)]
        scene: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Export {
            scene,
            output,
            config,
            keep_axes,
            no_normals,
            no_colors,
            no_uvs,
            no_skin,
            no_merge_groups,
            binary,
        } => {
            let mut config = match config {
                Some(path) => ExportConfig::load(path)?,
                None => ExportConfig::default(),
            };
            if keep_axes {
                config = config.with_axis_orientation(AxisOrientation::KeepTransforms);
            }
            config.export_normals &= !no_normals;
            config.export_colors &= !no_colors;
            config.export_uvs &= !no_uvs;
            config.export_skin_weights &= !no_skin;
            config.export_merge_groups &= !no_merge_groups;
            config.export_binary_files |= binary;

            let scene = Scene::load(&scene)?;
            let report = I3dExporter::with_config(config).export_to_file(&scene, &output)?;

            println!("Exported {}", report.path.display());
            println!(
                "  {} nodes, {} shapes, {} materials, {} files",
                report.nodes, report.shapes, report.materials, report.files
            );
            for path in &report.object_data {
                println!("  Object data: {}", path.display());
            }
            if let Some(line) = &report.optimizer_output {
                println!("  Optimizer: {}", line);
            }
        }
        Commands::ObjectData {
            scene,
            node,
            output,
            hierarchical,
            hide_first_and_last,
            scale,
            keep_axes,
        } => {
            let scene = Scene::load(&scene)?;
            let id = scene
                .find(&node)
                .ok_or_else(|| i3d_exporter::ExportError::MissingObject(node.clone()))?;
            let settings = ObjectDataSettings {
                file: output.to_string_lossy().into_owned(),
                hierarchical,
                hide_first_and_last,
                position: true,
                orientation: true,
                scale,
            };
            let orientation = if keep_axes {
                AxisOrientation::KeepTransforms
            } else {
                AxisOrientation::BakeTransforms
            };
            let config = ExportConfig::default().with_axis_orientation(orientation);

            let texture = ObjectDataTexture::build(&scene, id, &settings, config.axis())?;
            let path = texture.write(&settings.file, None)?;
            println!(
                "Wrote {} ({}x{}, {} arrays)",
                path.display(),
                texture.width,
                texture.height,
                texture.array_size()
            );
        }
        Commands::Info { scene } => {
            let name = scene
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let scene = Scene::load(&scene)?;
            let doc = I3dExporter::new().build_document(&scene, &name, None)?;

            println!("Scene: {}", doc.name);
            println!("  Nodes: {}", doc.scene.preorder().len());
            println!("  Materials: {}", doc.materials.len());
            println!("  Files: {}", doc.files.len());
            println!("  Shapes: {}", doc.shapes.len());
            for entry in &doc.shapes {
                match &entry.geometry {
                    ShapeGeometry::Triangles(shape) => println!(
                        "    [{}] {}: {} vertices, {} triangles, {} subsets",
                        entry.id,
                        shape.name,
                        shape.vertices.len(),
                        shape.triangles.len(),
                        shape.subsets.len()
                    ),
                    ShapeGeometry::Curve(curve) => println!(
                        "    [{}] {}: curve, {} points",
                        entry.id,
                        curve.name,
                        curve.points.len()
                    ),
                }
            }
        }
    }

    Ok(())
}
