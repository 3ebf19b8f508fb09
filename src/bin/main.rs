//! isofield CLI
//!
//! Query a JSON scene with the Mapper, extract its isosurface to OBJ and
//! report what the scene and the GPU provide.

#![allow(clippy::needless_pass_by_value)]

#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use glam::{IVec3, Vec3};
#[cfg(feature = "cli")]
use isofield::prelude::*;
#[cfg(feature = "cli")]
use isofield::types::NodeKind;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "isofield")]
#[command(version = isofield::VERSION)]
#[command(about = "Signed distance field queries and isosurface extraction", long_about = None)]
struct Cli {
    /// Log filter, e.g. `info` or `isofield=debug`
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Signed distance and colour at a point
    Distance {
        /// Scene file (a demo scene when omitted)
        #[arg(short, long)]
        scene: Option<PathBuf>,
        /// Query point as x,y,z
        #[arg(value_parser = parse_vec3, allow_hyphen_values = true)]
        point: Vec3,
    },

    /// Sphere-trace a ray through the field
    Raymarch {
        /// Scene file (a demo scene when omitted)
        #[arg(short, long)]
        scene: Option<PathBuf>,
        /// Ray origin as x,y,z
        #[arg(value_parser = parse_vec3, allow_hyphen_values = true)]
        origin: Vec3,
        /// Ray direction as x,y,z
        #[arg(value_parser = parse_vec3, allow_hyphen_values = true)]
        direction: Vec3,
        /// Trace length limit
        #[arg(long)]
        max_distance: Option<f32>,
    },

    /// Extract the isosurface to an OBJ file
    Extract {
        /// Scene file (a demo scene when omitted)
        #[arg(short, long)]
        scene: Option<PathBuf>,
        /// Output OBJ file
        #[arg(short, long, default_value = "isosurface.obj")]
        output: PathBuf,
        /// Samples per side, overriding the scene
        #[arg(short, long)]
        resolution: Option<u32>,
        /// Cell size, overriding the scene
        #[arg(short, long)]
        cell_size: Option<f32>,
        /// Use dual contouring instead of surface nets
        #[arg(long)]
        dual_contouring: bool,
        /// Extract an n×n×n grid of chunks around the origin
        #[arg(long)]
        chunks: Option<u32>,
        /// Run the compute pipeline on the GPU, falling back to the CPU
        #[arg(long)]
        gpu: bool,
    },

    /// Describe a scene and the available GPU
    Info {
        /// Scene file (a demo scene when omitted)
        scene: Option<PathBuf>,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let result = match cli.command {
        Commands::Distance { scene, point } => cmd_distance(scene, point),
        Commands::Raymarch {
            scene,
            origin,
            direction,
            max_distance,
        } => cmd_raymarch(scene, origin, direction, max_distance),
        Commands::Extract {
            scene,
            output,
            resolution,
            cell_size,
            dual_contouring,
            chunks,
            gpu,
        } => cmd_extract(scene, output, resolution, cell_size, dual_contouring, chunks, gpu),
        Commands::Info { scene } => cmd_info(scene),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI not enabled. Build with --features cli");
    std::process::exit(1);
}

#[cfg(feature = "cli")]
fn init_tracing(filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[cfg(feature = "cli")]
fn parse_vec3(s: &str) -> std::result::Result<Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{p}': {e}")))
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got '{s}'")),
    }
}

#[cfg(feature = "cli")]
fn demo_scene() -> SceneDescription {
    let json = r#"{
        "extractor": { "voxel": { "samples_per_side": 48, "cell_size": 0.08 } },
        "nodes": [
            { "kind": { "primitive": { "Sphere": { "radius": 1.2 } } },
              "material": { "colour": [0.9, 0.4, 0.2] } },
            { "kind": { "primitive": { "Torus": { "major_radius": 1.2, "minor_radius": 0.25 } } },
              "smoothing": 0.2, "rotation_degrees": [90.0, 0.0, 0.0],
              "material": { "colour": [0.2, 0.5, 0.9] } },
            { "kind": { "primitive": { "Cuboid": { "half_extents": [0.45, 0.45, 2.0], "roundness": 0.05 } } },
              "combine": "Subtract", "smoothing": 0.1 }
        ]
    }"#;
    SceneDescription::from_json(json).unwrap_or_default()
}

#[cfg(feature = "cli")]
fn load_scene(path: Option<PathBuf>) -> Result<SceneDescription> {
    match path {
        Some(path) => SceneDescription::load(path),
        None => Ok(demo_scene()),
    }
}

/// Register every node of a scene with a new group and run one tick.
///
/// The handles are returned because dropping them removes the nodes.
#[cfg(feature = "cli")]
fn build_group(store: &FieldStore, scene: &SceneDescription) -> Result<(Group, Vec<NodeHandle>)> {
    let nodes = scene.build_nodes()?;
    let mut group = store.create_group(scene.group);
    let handles: Vec<NodeHandle> = nodes.into_iter().map(NodeHandle::new).collect();
    for handle in &handles {
        group.register(handle);
    }
    Ok((group, handles))
}

#[cfg(feature = "cli")]
fn cmd_distance(scene: Option<PathBuf>, point: Vec3) -> Result<()> {
    let scene = load_scene(scene)?;
    let store = FieldStore::new();
    let (mut group, _nodes) = build_group(&store, &scene)?;
    group.per_tick_update();

    let mapper = group.mapper();
    let colour = mapper.colour(point);
    println!("distance: {}", mapper.distance(point));
    println!("normal:   {:?}", mapper.normal(point).to_array());
    println!("colour:   {:?}", colour.to_array());
    println!("nearest:  {:?}", mapper.nearest_surface_point(point).to_array());
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_raymarch(scene: Option<PathBuf>, origin: Vec3, direction: Vec3, max_distance: Option<f32>) -> Result<()> {
    let scene = load_scene(scene)?;
    let store = FieldStore::new();
    let (mut group, _nodes) = build_group(&store, &scene)?;
    group.per_tick_update();

    let mapper = group.mapper();
    let hit = match max_distance {
        Some(limit) => mapper.raymarch_with_limit(origin, direction, limit),
        None => mapper.raymarch(origin, direction),
    };
    match hit {
        Some(hit) => {
            println!("hit:      {:?}", hit.point.to_array());
            println!("normal:   {:?}", hit.normal.to_array());
            println!("distance: {}", hit.distance);
            println!("steps:    {}", hit.steps);
        }
        None => println!("miss"),
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_extract(
    scene: Option<PathBuf>,
    output: PathBuf,
    resolution: Option<u32>,
    cell_size: Option<f32>,
    dual_contouring: bool,
    chunks: Option<u32>,
    gpu: bool,
) -> Result<()> {
    let scene = load_scene(scene)?;
    let mut settings = scene.extractor;
    if let Some(n) = resolution {
        settings.voxel.samples_per_side = n;
    }
    if let Some(size) = cell_size {
        settings.voxel.cell_size = size;
    }
    if dual_contouring {
        settings.algorithm.extraction_type = ExtractionType::DualContouring;
    }
    settings.main.output_mode = OutputMode::Mesh;
    settings.main.is_asynchronous = false;
    settings.validate()?;

    let start = std::time::Instant::now();
    let (mesh, counts) = match chunks {
        Some(n) => extract_chunks(&scene, settings, n)?,
        None => extract_group(&scene, settings, gpu)?,
    };
    let elapsed = start.elapsed();

    export_obj(&mesh, &output, &ObjConfig::default())?;
    println!(
        "{} vertices ({} intermediate), {} triangles in {:.2?} -> {}",
        counts.vertices,
        counts.intermediate,
        counts.triangles,
        elapsed,
        output.display()
    );
    Ok(())
}

#[cfg(feature = "cli")]
fn extract_group(
    scene: &SceneDescription,
    settings: ExtractorSettings,
    gpu: bool,
) -> Result<(ExtractedMesh, ExtractionCounts)> {
    let context = if gpu {
        match GpuContext::new() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::warn!(error = %e, "no gpu, extracting on the cpu");
                None
            }
        }
    } else {
        None
    };

    let store = match &context {
        Some(ctx) => FieldStore::with_gpu(Arc::clone(ctx)),
        None => FieldStore::new(),
    };
    let extractor = Arc::new(Mutex::new(match context {
        Some(ctx) => IsosurfaceExtractor::with_gpu(ctx, settings, MeshSlot::default()),
        None => IsosurfaceExtractor::new(settings, MeshSlot::default()),
    }));

    let (mut group, _nodes) = build_group(&store, scene)?;
    group.add_consumer(extractor.clone());
    group.per_tick_update();

    let mut extractor = extractor.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    extractor.drain();
    let counts = extractor.last_counts().unwrap_or_default();
    let mesh = extractor.sink_mut().take().unwrap_or_default();
    Ok((mesh, counts))
}

#[cfg(feature = "cli")]
fn extract_chunks(
    scene: &SceneDescription,
    settings: ExtractorSettings,
    n: u32,
) -> Result<(ExtractedMesh, ExtractionCounts)> {
    let store = FieldStore::new();
    let (mut group, _nodes) = build_group(&store, scene)?;
    group.per_tick_update();

    let mut grid = ChunkGrid::new(settings);
    let half = n as i32 / 2;
    for z in 0..n as i32 {
        for y in 0..n as i32 {
            for x in 0..n as i32 {
                grid.add(IVec3::new(x, y, z) - IVec3::splat(half))?;
            }
        }
    }
    let counts = grid.extract_all(&group.mapper().snapshot());
    Ok((grid.merged_mesh(), counts))
}

#[cfg(feature = "cli")]
fn cmd_info(scene: Option<PathBuf>) -> Result<()> {
    let scene = load_scene(scene)?;
    let nodes = scene.build_nodes()?;

    let (mut primitives, mut meshes, mut operations, mut textures) = (0, 0, 0, 0);
    for node in &nodes {
        match node.kind {
            NodeKind::Primitive(_) => primitives += 1,
            NodeKind::Mesh(_) => meshes += 1,
            NodeKind::Operation(_) => operations += 1,
            NodeKind::Texture(_) => textures += 1,
        }
    }

    let voxel = scene.extractor.voxel;
    println!("isofield {}", isofield::VERSION);
    println!("nodes:       {} total", nodes.len());
    println!("  primitive: {primitives}");
    println!("  mesh:      {meshes} ({} embedded assets)", scene.meshes.len());
    println!("  operation: {operations}");
    println!("  texture:   {textures}");
    println!(
        "extraction:  {:?}, {}³ samples, cell {} (volume {:?})",
        scene.extractor.algorithm.extraction_type,
        voxel.samples_per_side,
        voxel.cell_size,
        voxel.volume_size().to_array()
    );
    match GpuContext::new() {
        Ok(ctx) => println!("gpu:         {}", ctx.adapter_name()),
        Err(e) => println!("gpu:         unavailable ({e})"),
    }
    Ok(())
}
