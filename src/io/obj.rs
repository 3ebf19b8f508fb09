//! Wavefront OBJ export of extracted meshes
//!
//! Vertex colours are written with the common `v x y z r g b` extension
//! understood by Blender and MeshLab.

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::extract::ExtractedMesh;

/// OBJ export configuration
#[derive(Debug, Clone)]
pub struct ObjConfig {
    /// Export normals (vn)
    pub export_normals: bool,
    /// Append vertex colours to `v` lines
    pub export_colours: bool,
    /// Object name written after `o`
    pub object_name: Option<String>,
}

impl Default for ObjConfig {
    fn default() -> Self {
        ObjConfig {
            export_normals: true,
            export_colours: true,
            object_name: None,
        }
    }
}

/// Export a mesh to a Wavefront OBJ file
pub fn export_obj(mesh: &ExtractedMesh, path: impl AsRef<Path>, config: &ObjConfig) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("isosurface");
    let config = ObjConfig {
        object_name: config.object_name.clone().or_else(|| Some(stem.to_string())),
        ..config.clone()
    };
    write_obj(&mut w, mesh, &config)?;
    w.flush()?;

    tracing::info!(
        path = %path.display(),
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "obj exported"
    );
    Ok(())
}

/// Write a mesh as OBJ text into any writer
pub fn write_obj(w: &mut impl Write, mesh: &ExtractedMesh, config: &ObjConfig) -> Result<()> {
    writeln!(w, "# isofield OBJ export")?;
    writeln!(w, "# Vertices: {}", mesh.vertex_count())?;
    writeln!(w, "# Triangles: {}", mesh.triangle_count())?;
    writeln!(w, "o {}", config.object_name.as_deref().unwrap_or("isosurface"))?;

    let colours = config.export_colours && mesh.colours.len() == mesh.positions.len();
    for (i, p) in mesh.positions.iter().enumerate() {
        if colours {
            let c = mesh.colours[i];
            writeln!(w, "v {} {} {} {} {} {}", p.x, p.y, p.z, c.x, c.y, c.z)?;
        } else {
            writeln!(w, "v {} {} {}", p.x, p.y, p.z)?;
        }
    }

    let normals = config.export_normals && mesh.normals.len() == mesh.positions.len();
    if normals {
        for n in &mesh.normals {
            writeln!(w, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }

    for tri in mesh.indices.chunks_exact(3) {
        // OBJ is 1-indexed
        let (a, b, c) = (tri[0] + 1, tri[1] + 1, tri[2] + 1);
        if normals {
            writeln!(w, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(w, "f {a} {b} {c}")?;
        }
    }
    Ok(())
}
