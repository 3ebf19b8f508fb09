//! Grid of aligned extraction chunks
//!
//! Every chunk samples the same resolution and is offset by one chunk width
//! (`cell_count * cell_size`), so neighbouring chunks share their boundary
//! samples and the meshes line up without seams.

use std::collections::{HashMap, HashSet};

use glam::{IVec3, Mat4, Vec3};
use rayon::prelude::*;

use super::{cpu, ExtractedMesh, ExtractionCounts, ExtractorSettings, MeshSink, MeshSlot};
use crate::error::{FieldError, Result};
use crate::mapper::MapperSnapshot;

/// The 26 offsets of a coordinate's full neighbourhood
pub const NEIGHBOUR_OFFSETS: [IVec3; 26] = {
    let mut offsets = [IVec3::ZERO; 26];
    let mut i = 0;
    let mut z = -1;
    while z <= 1 {
        let mut y = -1;
        while y <= 1 {
            let mut x = -1;
            while x <= 1 {
                if x != 0 || y != 0 || z != 0 {
                    offsets[i] = IVec3::new(x, y, z);
                    i += 1;
                }
                x += 1;
            }
            y += 1;
        }
        z += 1;
    }
    offsets
};

/// The 6 face-adjacent offsets
pub const AXIS_NEIGHBOUR_OFFSETS: [IVec3; 6] = [
    IVec3::new(0, 0, -1),
    IVec3::new(0, -1, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, 0, 1),
];

/// One occupied cell of the grid
#[derive(Debug)]
pub struct Chunk {
    coordinate: IVec3,
    settings: ExtractorSettings,
    slot: MeshSlot,
    counts: Option<ExtractionCounts>,
}

impl Chunk {
    /// Integer grid coordinate
    pub fn coordinate(&self) -> IVec3 {
        self.coordinate
    }

    /// Extractor settings with the chunk's grid transform
    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Centre of the chunk in field space
    pub fn centre(&self) -> Vec3 {
        self.settings.grid_transform.transform_point3(Vec3::ZERO)
    }

    /// Radius of the sphere enclosing the chunk
    pub fn radius(&self) -> f32 {
        self.settings.voxel.extents().length()
    }

    /// Last extracted mesh, if it had any triangles
    pub fn mesh(&self) -> Option<&ExtractedMesh> {
        self.slot.mesh().filter(|_| self.slot.is_enabled())
    }

    /// Counts of the last extraction
    pub fn counts(&self) -> Option<ExtractionCounts> {
        self.counts
    }

    fn extract(&mut self, snapshot: &MapperSnapshot) {
        // the chunk cannot contain surface when its centre is further away
        // than its enclosing sphere
        if snapshot.distance(self.centre()).abs() > self.radius() {
            self.counts = Some(ExtractionCounts::default());
            self.slot.set_enabled(false);
            return;
        }
        let (mesh, counts) = cpu::extract_mesh(snapshot, &self.settings);
        self.counts = Some(counts);
        if mesh.is_empty() {
            self.slot.set_enabled(false);
        } else {
            self.slot.install(&mesh);
            self.slot.set_enabled(true);
        }
    }
}

/// A 3D grid of aligned extraction chunks keyed by integer coordinate
#[derive(Debug)]
pub struct ChunkGrid {
    settings: ExtractorSettings,
    transform: Mat4,
    chunks: Vec<Chunk>,
    index: HashMap<IVec3, usize>,
    unoccupied: Vec<IVec3>,
    unoccupied_axis: Vec<IVec3>,
}

impl ChunkGrid {
    /// Empty grid whose chunks use `settings`; its grid transform places the
    /// whole grid
    pub fn new(settings: ExtractorSettings) -> Self {
        let mut grid = ChunkGrid {
            transform: settings.grid_transform,
            settings,
            chunks: Vec::new(),
            index: HashMap::new(),
            unoccupied: Vec::new(),
            unoccupied_axis: Vec::new(),
        };
        grid.rebuild_unoccupied();
        grid
    }

    /// Shared chunk settings
    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Replace the shared settings; every chunk is re-placed
    pub fn set_settings(&mut self, settings: ExtractorSettings) -> Result<()> {
        settings.validate()?;
        self.transform = settings.grid_transform;
        self.settings = settings;
        for i in 0..self.chunks.len() {
            self.chunks[i].settings = self.chunk_settings(self.chunks[i].coordinate);
        }
        Ok(())
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the grid has no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks in insertion order
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Coordinates of every chunk, in insertion order
    pub fn occupied_coordinates(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.chunks.iter().map(|c| c.coordinate)
    }

    /// Chunk-local position of a coordinate
    pub fn coordinate_to_local_position(&self, coordinate: IVec3) -> Vec3 {
        coordinate.as_vec3() * self.settings.voxel.offset_distance()
    }

    /// Field-space position of a coordinate, through the grid transform
    pub fn coordinate_to_position(&self, coordinate: IVec3) -> Vec3 {
        self.transform.transform_point3(self.coordinate_to_local_position(coordinate))
    }

    /// Whether a chunk sits at `coordinate`
    pub fn is_occupied(&self, coordinate: IVec3) -> bool {
        self.index.contains_key(&coordinate)
    }

    /// Chunk at `coordinate`
    pub fn get(&self, coordinate: IVec3) -> Option<&Chunk> {
        self.index.get(&coordinate).map(|&i| &self.chunks[i])
    }

    fn chunk_settings(&self, coordinate: IVec3) -> ExtractorSettings {
        let mut settings = self.settings;
        settings.grid_transform = self.transform * Mat4::from_translation(self.coordinate_to_local_position(coordinate));
        settings
    }

    /// Add a chunk at an empty coordinate
    pub fn add(&mut self, coordinate: IVec3) -> Result<&Chunk> {
        if self.is_occupied(coordinate) {
            tracing::error!(%coordinate, "chunk grid already has a chunk there");
            return Err(FieldError::ChunkOccupied(coordinate));
        }
        let chunk = Chunk {
            coordinate,
            settings: self.chunk_settings(coordinate),
            slot: MeshSlot::default(),
            counts: None,
        };
        self.chunks.push(chunk);
        let i = self.chunks.len() - 1;
        self.index.insert(coordinate, i);
        self.rebuild_unoccupied();
        tracing::debug!(%coordinate, chunks = self.chunks.len(), "chunk added");
        Ok(&self.chunks[i])
    }

    /// Remove the chunk at `coordinate`; false when there was none
    pub fn remove(&mut self, coordinate: IVec3) -> bool {
        let Some(i) = self.index.remove(&coordinate) else {
            return false;
        };
        self.chunks.remove(i);
        for (j, chunk) in self.chunks.iter().enumerate().skip(i) {
            self.index.insert(chunk.coordinate, j);
        }
        self.rebuild_unoccupied();
        tracing::debug!(%coordinate, chunks = self.chunks.len(), "chunk removed");
        true
    }

    /// Remove every chunk
    pub fn remove_all(&mut self) {
        self.chunks.clear();
        self.index.clear();
        self.rebuild_unoccupied();
    }

    // === Neighbourhoods ===

    /// All 26 coordinates around `coordinate`
    pub fn neighbour_coordinates(coordinate: IVec3) -> impl Iterator<Item = IVec3> {
        NEIGHBOUR_OFFSETS.into_iter().map(move |o| coordinate + o)
    }

    /// The 6 face-adjacent coordinates of `coordinate`
    pub fn axis_neighbour_coordinates(coordinate: IVec3) -> impl Iterator<Item = IVec3> {
        AXIS_NEIGHBOUR_OFFSETS.into_iter().map(move |o| coordinate + o)
    }

    /// Occupied chunks among the 26 neighbours
    pub fn neighbours(&self, coordinate: IVec3) -> impl Iterator<Item = &Chunk> + '_ {
        Self::neighbour_coordinates(coordinate).filter_map(move |c| self.get(c))
    }

    /// Occupied chunks among the 6 face neighbours
    pub fn axis_neighbours(&self, coordinate: IVec3) -> impl Iterator<Item = &Chunk> + '_ {
        Self::axis_neighbour_coordinates(coordinate).filter_map(move |c| self.get(c))
    }

    /// Empty coordinates among the 26 neighbours
    pub fn unoccupied_neighbour_coordinates(&self, coordinate: IVec3) -> impl Iterator<Item = IVec3> + '_ {
        Self::neighbour_coordinates(coordinate).filter(move |c| !self.is_occupied(*c))
    }

    /// Empty coordinates among the 6 face neighbours
    pub fn unoccupied_axis_neighbour_coordinates(&self, coordinate: IVec3) -> impl Iterator<Item = IVec3> + '_ {
        Self::axis_neighbour_coordinates(coordinate).filter(move |c| !self.is_occupied(*c))
    }

    /// Every empty coordinate adjacent to an occupied one; the origin alone
    /// while the grid is empty
    pub fn unoccupied(&self) -> &[IVec3] {
        &self.unoccupied
    }

    /// Every empty coordinate face-adjacent to an occupied one; the origin
    /// alone while the grid is empty
    pub fn unoccupied_axis(&self) -> &[IVec3] {
        &self.unoccupied_axis
    }

    fn rebuild_unoccupied(&mut self) {
        self.unoccupied = self.collect_unoccupied(&NEIGHBOUR_OFFSETS);
        self.unoccupied_axis = self.collect_unoccupied(&AXIS_NEIGHBOUR_OFFSETS);
    }

    fn collect_unoccupied(&self, offsets: &[IVec3]) -> Vec<IVec3> {
        if self.chunks.is_empty() {
            return vec![IVec3::ZERO];
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for chunk in &self.chunks {
            for &offset in offsets {
                let c = chunk.coordinate + offset;
                if !self.is_occupied(c) && seen.insert(c) {
                    out.push(c);
                }
            }
        }
        out
    }

    // === Extraction ===

    /// Extract every chunk from `snapshot` on the CPU.
    ///
    /// Returns the summed counts.
    pub fn extract_all(&mut self, snapshot: &MapperSnapshot) -> ExtractionCounts {
        let _span = tracing::debug_span!("extract_chunks", chunks = self.chunks.len()).entered();
        self.chunks.par_iter_mut().for_each(|chunk| chunk.extract(snapshot));
        self.chunks
            .iter()
            .filter_map(Chunk::counts)
            .fold(ExtractionCounts::default(), |acc, c| ExtractionCounts {
                vertices: acc.vertices + c.vertices,
                triangles: acc.triangles + c.triangles,
                intermediate: acc.intermediate + c.intermediate,
            })
    }

    /// Every chunk mesh merged into one, in insertion order
    pub fn merged_mesh(&self) -> ExtractedMesh {
        let mut merged = ExtractedMesh::default();
        for mesh in self.chunks.iter().filter_map(Chunk::mesh) {
            let base = merged.positions.len() as u32;
            merged.positions.extend_from_slice(&mesh.positions);
            merged.normals.extend_from_slice(&mesh.normals);
            merged.colours.extend_from_slice(&mesh.colours);
            merged.indices.extend(mesh.indices.iter().map(|i| i + base));
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::VoxelSettings;
    use crate::mapper::MapperConfig;
    use crate::types::{FieldNode, GpuSettingsRecord};
    use std::sync::Arc;

    fn settings() -> ExtractorSettings {
        let mut s = ExtractorSettings::default();
        s.voxel = VoxelSettings {
            samples_per_side: 9,
            cell_size: 0.25,
        };
        s
    }

    fn sphere_snapshot(radius: f32) -> MapperSnapshot {
        let (node, material) = FieldNode::sphere(radius).to_records(&Mat4::IDENTITY, None).unwrap();
        MapperSnapshot::from_records(
            1,
            &[node],
            &[material],
            Arc::new(Vec::new()),
            GpuSettingsRecord {
                normal_smoothing: 0.015,
                thickness_max_distance: 0.0,
                thickness_falloff: 0.0,
                _pad: 0.0,
            },
            MapperConfig::default(),
        )
    }

    #[test]
    fn test_offsets() {
        assert_eq!(NEIGHBOUR_OFFSETS.len(), 26);
        let unique: HashSet<_> = NEIGHBOUR_OFFSETS.iter().collect();
        assert_eq!(unique.len(), 26);
        assert!(!NEIGHBOUR_OFFSETS.contains(&IVec3::ZERO));
        assert!(AXIS_NEIGHBOUR_OFFSETS.iter().all(|o| NEIGHBOUR_OFFSETS.contains(o)));
        assert!(AXIS_NEIGHBOUR_OFFSETS.iter().all(|o| o.abs().element_sum() == 1));
    }

    #[test]
    fn test_empty_grid_reports_origin() {
        let grid = ChunkGrid::new(settings());
        assert_eq!(grid.unoccupied(), &[IVec3::ZERO]);
        assert_eq!(grid.unoccupied_axis(), &[IVec3::ZERO]);
    }

    #[test]
    fn test_add_and_remove() {
        let mut grid = ChunkGrid::new(settings());
        assert!(grid.add(IVec3::ZERO).is_ok());
        assert!(matches!(grid.add(IVec3::ZERO), Err(FieldError::ChunkOccupied(_))));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.unoccupied().len(), 26);
        assert_eq!(grid.unoccupied_axis().len(), 6);

        grid.add(IVec3::X).unwrap();
        assert_eq!(grid.axis_neighbours(IVec3::ZERO).count(), 1);
        assert_eq!(grid.unoccupied_axis_neighbour_coordinates(IVec3::ZERO).count(), 5);
        // five free faces on each chunk
        assert_eq!(grid.unoccupied_axis().len(), 10);

        assert!(grid.remove(IVec3::ZERO));
        assert!(!grid.remove(IVec3::ZERO));
        assert_eq!(grid.get(IVec3::X).unwrap().coordinate(), IVec3::X);

        grid.remove_all();
        assert!(grid.is_empty());
        assert_eq!(grid.unoccupied(), &[IVec3::ZERO]);
    }

    #[test]
    fn test_coordinate_positions() {
        let mut s = settings();
        s.grid_transform = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0));
        let grid = ChunkGrid::new(s);
        // 8 cells of 0.25
        assert_eq!(grid.coordinate_to_local_position(IVec3::new(1, -2, 0)), Vec3::new(2.0, -4.0, 0.0));
        assert_eq!(grid.coordinate_to_position(IVec3::new(1, 0, 0)), Vec3::new(2.0, 10.0, 0.0));
    }

    #[test]
    fn test_extract_all_skips_far_chunks() {
        let mut grid = ChunkGrid::new(settings());
        grid.add(IVec3::ZERO).unwrap();
        grid.add(IVec3::new(5, 0, 0)).unwrap();
        let counts = grid.extract_all(&sphere_snapshot(0.6));

        assert!(counts.triangles > 0);
        assert!(grid.get(IVec3::ZERO).unwrap().mesh().is_some());
        let far = grid.get(IVec3::new(5, 0, 0)).unwrap();
        assert!(far.mesh().is_none());
        assert_eq!(far.counts().unwrap().triangles, 0);
    }

    #[test]
    fn test_adjacent_chunks_share_the_surface() {
        let mut grid = ChunkGrid::new(settings());
        for x in -1..=1 {
            grid.add(IVec3::new(x, 0, 0)).unwrap();
        }
        // radius 1.2 crosses the centre chunk's interior samples and the first
        // interior edges of both side chunks (half width 1.0)
        let total = grid.extract_all(&sphere_snapshot(1.2));
        for chunk in grid.chunks() {
            let counts = chunk.counts().unwrap();
            assert!(counts.triangles > 0, "chunk {} has no triangles", chunk.coordinate());
            assert!(chunk.mesh().is_some());
        }
        let left = grid.get(IVec3::NEG_X).unwrap().counts().unwrap();
        let right = grid.get(IVec3::X).unwrap().counts().unwrap();
        assert_eq!(left.triangles, right.triangles);

        let merged = grid.merged_mesh();
        assert_eq!(merged.triangle_count(), total.triangles as usize);
        assert!(merged.indices.iter().all(|&i| (i as usize) < merged.vertex_count()));
    }
}
