//! Isosurface extraction
//!
//! [`IsosurfaceExtractor`] is a [`FieldConsumer`] that turns a group's field
//! into a triangle mesh every time the field (or one of its own settings)
//! changes. With a GPU context the work runs in the compute pipeline of
//! [`pipeline`]; without one the CPU reference extractor in [`cpu`] runs the
//! same stages over the published Mapper snapshot.
//!
//! # Features
//! - **Mesh and procedural output**: host readback into a [`MeshSink`], or
//!   vertex/index/indirect-args buffers left on the GPU for a direct draw
//! - **Synchronous or polled readback**: asynchronous requests are advanced
//!   once per tick; a request made while one is in flight is dropped
//! - **Lazy initialisation**: pipelines are compiled on first use and buffers
//!   are sized to the grid, reallocated only when the resolution changes
//! - **Stale but stable**: a failed readback is logged and the previous mesh
//!   stays installed
//! - **Chunked extraction**: [`ChunkGrid`] tiles space with aligned chunks

mod chunks;
pub mod cpu;
mod mesh;
pub mod pipeline;
mod settings;

pub use chunks::{Chunk, ChunkGrid, AXIS_NEIGHBOUR_OFFSETS, NEIGHBOUR_OFFSETS};
pub use cpu::extract_mesh;
pub use mesh::{ExtractedMesh, ExtractionCounts, GpuOutputVertex, MeshSink, MeshSlot};
pub use settings::{
    AlgorithmSettings, EdgeIntersection, ExtractionType, ExtractorSettings, MainSettings, OutputMode,
    VoxelSettings,
};

use std::sync::Arc;

use glam::Mat4;

use crate::error::Result;
use crate::gpu::{BufferHandle, FieldBindings, GpuContext, PendingRead, ReadState};
use crate::group::{FieldConsumer, FieldFrame};
use crate::mapper::MapperSnapshot;
use pipeline::{counts_from_counters, ExtractionBuffers, ExtractionPipeline, MeshRead, COUNTER_LEN};

/// Readback progress of the asynchronous path
#[derive(Debug, Default)]
enum ReadbackState {
    #[default]
    Idle,
    Counts(PendingRead),
    Mesh(MeshRead),
}

impl ReadbackState {
    fn is_idle(&self) -> bool {
        matches!(self, ReadbackState::Idle)
    }
}

/// GPU buffers of the procedural output mode
#[derive(Debug, Clone, Copy)]
pub struct ProceduralBuffers<'a> {
    /// Interleaved [`GpuOutputVertex`] buffer
    pub vertices: &'a wgpu::Buffer,
    /// `u32` index buffer
    pub indices: &'a wgpu::Buffer,
    /// `draw_indexed_indirect` arguments
    pub draw_args: &'a wgpu::Buffer,
}

/// Field consumer that extracts an isosurface mesh
#[derive(Debug)]
pub struct IsosurfaceExtractor<S: MeshSink = MeshSlot> {
    settings: ExtractorSettings,
    gpu: Option<Arc<GpuContext>>,
    sink: S,
    field: FieldBindings,
    pipeline: Option<ExtractionPipeline>,
    buffers: Option<ExtractionBuffers>,
    readback: ReadbackState,
    snapshot: Option<Arc<MapperSnapshot>>,
    initialized: bool,
    gpu_failed: bool,
    non_empty: bool,
    settings_dirty: bool,
    last_counts: Option<ExtractionCounts>,
    extractions: u64,
    dropped_requests: u64,
}

impl<S: MeshSink> IsosurfaceExtractor<S> {
    /// CPU-only extractor
    pub fn new(settings: ExtractorSettings, sink: S) -> Self {
        IsosurfaceExtractor {
            settings,
            gpu: None,
            sink,
            field: FieldBindings::default(),
            pipeline: None,
            buffers: None,
            readback: ReadbackState::Idle,
            snapshot: None,
            initialized: false,
            gpu_failed: false,
            non_empty: false,
            settings_dirty: false,
            last_counts: None,
            extractions: 0,
            dropped_requests: 0,
        }
    }

    /// Extractor running on `gpu`, falling back to the CPU if the pipeline
    /// cannot be built
    pub fn with_gpu(gpu: Arc<GpuContext>, settings: ExtractorSettings, sink: S) -> Self {
        IsosurfaceExtractor {
            gpu: Some(gpu),
            ..Self::new(settings, sink)
        }
    }

    // === Settings ===

    /// Current settings
    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Replace every setting; invalid settings are rejected
    pub fn set_settings(&mut self, settings: ExtractorSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        self.settings_dirty = true;
        Ok(())
    }

    /// Output mode and scheduling
    pub fn set_main_settings(&mut self, main: MainSettings) {
        self.settings.main = main;
        self.settings_dirty = true;
    }

    /// Grid resolution; buffers are reallocated on the next extraction
    pub fn set_voxel_settings(&mut self, voxel: VoxelSettings) -> Result<()> {
        voxel.validate()?;
        self.settings.voxel = voxel;
        self.settings_dirty = true;
        Ok(())
    }

    /// Algorithm parameters
    pub fn set_algorithm_settings(&mut self, algorithm: AlgorithmSettings) -> Result<()> {
        algorithm.validate()?;
        self.settings.algorithm = algorithm;
        self.settings_dirty = true;
        Ok(())
    }

    /// Placement of the sampling grid
    pub fn set_grid_transform(&mut self, transform: Mat4) {
        self.settings.grid_transform = transform;
        self.settings_dirty = true;
    }

    /// World to output-mesh transform
    pub fn set_mesh_transform(&mut self, transform: Mat4) {
        self.settings.mesh_transform = transform;
        self.settings_dirty = true;
    }

    // === State ===

    /// The mesh sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable mesh sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Whether a frame has been seen and the extractor can run
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the GPU pipeline is in use
    pub fn uses_gpu(&self) -> bool {
        self.gpu.is_some() && !self.gpu_failed
    }

    /// Whether an asynchronous readback is in flight
    pub fn is_busy(&self) -> bool {
        !self.readback.is_idle()
    }

    /// Counts of the last completed extraction
    pub fn last_counts(&self) -> Option<ExtractionCounts> {
        self.last_counts
    }

    /// Completed extractions
    pub fn extraction_count(&self) -> u64 {
        self.extractions
    }

    /// Asynchronous requests dropped because one was in flight
    pub fn dropped_requests(&self) -> u64 {
        self.dropped_requests
    }

    /// Output buffers for a procedural draw, once the GPU path has run
    pub fn procedural_buffers(&self) -> Option<ProceduralBuffers<'_>> {
        if self.settings.main.output_mode != OutputMode::Procedural {
            return None;
        }
        let buffers = self.buffers.as_ref()?;
        Some(ProceduralBuffers {
            vertices: buffers.vertices(),
            indices: buffers.indices(),
            draw_args: buffers.draw_args(),
        })
    }

    // === Extraction ===

    /// Extract now from the last seen frame.
    ///
    /// Returns false without doing anything before the first frame, while
    /// the field is empty, or when an asynchronous request is dropped.
    pub fn request_extraction(&mut self) -> bool {
        if !self.initialized || !self.non_empty {
            return false;
        }
        let Some(snapshot) = self.snapshot.clone() else {
            return false;
        };
        self.settings_dirty = false;

        let _span = tracing::debug_span!(
            "extraction",
            gpu = self.uses_gpu(),
            samples = self.settings.voxel.samples_per_side
        )
        .entered();
        if self.uses_gpu() {
            self.extract_gpu()
        } else {
            self.extract_cpu(&snapshot);
            true
        }
    }

    fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        if let Some(gpu) = self.gpu.clone() {
            match ExtractionPipeline::new(&gpu) {
                Ok(pipeline) => self.pipeline = Some(pipeline),
                Err(e) => {
                    tracing::warn!(error = %e, "isosurface pipeline unavailable, using cpu extraction");
                    self.gpu_failed = true;
                }
            }
        }
        self.initialized = true;
        tracing::debug!(gpu = self.uses_gpu(), "isosurface extractor initialised");
    }

    fn extract_cpu(&mut self, snapshot: &MapperSnapshot) {
        let (mesh, counts) = cpu::extract_mesh(snapshot, &self.settings);
        self.deliver(Some(mesh), counts);
    }

    fn extract_gpu(&mut self) -> bool {
        let asynchronous = self.settings.main.is_asynchronous;
        if asynchronous && !self.readback.is_idle() {
            self.dropped_requests += 1;
            tracing::debug!("extraction request dropped, readback in flight");
            return false;
        }
        let (Some(gpu), Some(pipeline)) = (self.gpu.clone(), self.pipeline.as_ref()) else {
            return false;
        };

        let n = self.settings.voxel.samples_per_side;
        if self.buffers.as_ref().map(ExtractionBuffers::points_per_side) != Some(n) {
            self.buffers = Some(ExtractionBuffers::new(&gpu, pipeline, n));
        }
        let sentinel = self.snapshot.as_ref().map_or(crate::mapper::EMPTY_FIELD_DISTANCE, |s| s.config().sentinel);
        let Some(field) = self.field.bind_group(&gpu, pipeline.field_layout(), sentinel) else {
            tracing::debug!("field buffers not published yet");
            return false;
        };
        let Some(buffers) = self.buffers.as_ref() else {
            return false;
        };
        buffers.dispatch(&gpu, pipeline, field, &self.settings);

        if self.settings.main.output_mode == OutputMode::Procedural {
            self.extractions += 1;
            self.sink.set_enabled(true);
            return true;
        }

        let counts_read = buffers.read_counts(&gpu);
        if asynchronous {
            self.readback = ReadbackState::Counts(counts_read);
            return true;
        }

        let result = counts_read
            .wait::<u32>(gpu.device(), COUNTER_LEN)
            .map(|c| counts_from_counters(&c))
            .and_then(|counts| match buffers.read_mesh(&gpu, counts) {
                Some(read) => read.wait(gpu.device()).map(|mesh| (Some(mesh), counts)),
                None => Ok((None, counts)),
            });
        match result {
            Ok((mesh, counts)) => {
                self.deliver(mesh, counts);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "mesh readback failed, keeping previous mesh");
                false
            }
        }
    }

    /// Advance an asynchronous readback by one step
    fn advance_readback(&mut self) {
        let Some(gpu) = self.gpu.clone() else {
            return;
        };
        gpu.device().poll(wgpu::Maintain::Poll);

        match std::mem::take(&mut self.readback) {
            ReadbackState::Idle => {}
            ReadbackState::Counts(mut read) => match read.poll::<u32>(COUNTER_LEN) {
                ReadState::Pending => self.readback = ReadbackState::Counts(read),
                ReadState::Ready(counters) => {
                    let counts = counts_from_counters(&counters);
                    match self.buffers.as_ref().and_then(|b| b.read_mesh(&gpu, counts)) {
                        Some(mesh_read) => self.readback = ReadbackState::Mesh(mesh_read),
                        None => self.deliver(None, counts),
                    }
                }
                ReadState::Failed(e) => {
                    tracing::warn!(error = %e, "count readback failed, keeping previous mesh");
                }
            },
            ReadbackState::Mesh(mut read) => match read.poll() {
                Ok(Some(mesh)) => self.deliver(Some(mesh), read.counts),
                Ok(None) => self.readback = ReadbackState::Mesh(read),
                Err(e) => tracing::warn!(error = %e, "mesh readback failed, keeping previous mesh"),
            },
        }
    }

    /// Hand a finished extraction to the sink; an empty result disables it
    fn deliver(&mut self, mesh: Option<ExtractedMesh>, counts: ExtractionCounts) {
        self.extractions += 1;
        self.last_counts = Some(counts);
        match mesh {
            Some(mesh) if !mesh.is_empty() => {
                self.sink.install(&mesh);
                self.sink.set_enabled(true);
            }
            _ => self.sink.set_enabled(false),
        }
        tracing::debug!(
            vertices = counts.total_vertices(),
            triangles = counts.triangles,
            "isosurface extracted"
        );
    }

    /// Block until an asynchronous readback in flight has been delivered
    pub fn drain(&mut self) {
        while !self.readback.is_idle() {
            if let Some(gpu) = &self.gpu {
                gpu.wait_idle();
            }
            self.advance_readback();
        }
    }
}

impl<S: MeshSink> FieldConsumer for IsosurfaceExtractor<S> {
    fn on_field_became_empty(&mut self) {
        self.non_empty = false;
        self.sink.set_enabled(false);
    }

    fn on_field_became_non_empty(&mut self) {
        self.non_empty = true;
    }

    fn on_node_or_material_buffer_changed(&mut self, nodes: &BufferHandle, materials: &BufferHandle, count: usize) {
        self.field.set_nodes(nodes, materials, count);
    }

    fn on_settings_buffer_changed(&mut self, settings: &BufferHandle) {
        self.field.set_settings(settings);
    }

    fn on_mesh_samples_changed(&mut self, samples: Option<&BufferHandle>, _uvs: Option<&BufferHandle>) {
        self.field.set_samples(samples);
    }

    fn run_per_tick_update(&mut self, frame: &FieldFrame) {
        self.snapshot = Some(Arc::clone(&frame.snapshot));
        self.initialize();
        if self.settings.main.auto_update {
            self.request_extraction();
        }
    }

    fn poll(&mut self, frame: &FieldFrame) {
        if !self.readback.is_idle() {
            self.advance_readback();
        }
        if self.settings_dirty && self.initialized && self.non_empty {
            self.snapshot = Some(Arc::clone(&frame.snapshot));
            self.request_extraction();
        }
    }

    fn release(&mut self) {
        self.drain();
        self.buffers = None;
        self.pipeline = None;
        self.field.clear();
        self.snapshot = None;
        self.initialized = false;
        tracing::debug!("isosurface extractor released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupSettings;
    use crate::store::FieldStore;
    use crate::types::{FieldNode, NodeHandle};
    use std::sync::Mutex;

    fn small_settings() -> ExtractorSettings {
        let mut s = ExtractorSettings::default();
        s.voxel.samples_per_side = 12;
        s.voxel.cell_size = 0.25;
        s
    }

    #[test]
    fn test_requests_before_first_frame_are_noops() {
        let mut ex = IsosurfaceExtractor::new(small_settings(), MeshSlot::default());
        ex.on_field_became_non_empty();
        assert!(!ex.request_extraction());
        assert!(!ex.is_initialized());
        assert_eq!(ex.extraction_count(), 0);
    }

    #[test]
    fn test_cpu_extraction_through_group() {
        let store = FieldStore::new();
        let mut group = store.create_group(GroupSettings::default());
        let ex = Arc::new(Mutex::new(IsosurfaceExtractor::new(small_settings(), MeshSlot::default())));
        group.add_consumer(ex.clone());

        let sphere = NodeHandle::new(FieldNode::sphere(1.0));
        group.register(&sphere);
        group.per_tick_update();

        let ex = ex.lock().unwrap();
        assert!(ex.is_initialized());
        assert!(!ex.uses_gpu());
        assert_eq!(ex.extraction_count(), 1);
        assert!(ex.sink().is_enabled());
        let mesh = ex.sink().mesh().unwrap();
        assert!(mesh.triangle_count() > 0);
        assert_eq!(ex.last_counts().unwrap().triangles as usize, mesh.triangle_count());
    }

    #[test]
    fn test_idle_tick_does_not_extract() {
        let store = FieldStore::new();
        let mut group = store.create_group(GroupSettings::default());
        let ex = Arc::new(Mutex::new(IsosurfaceExtractor::new(small_settings(), MeshSlot::default())));
        group.add_consumer(ex.clone());
        let sphere = NodeHandle::new(FieldNode::sphere(1.0));
        group.register(&sphere);
        group.per_tick_update();
        group.per_tick_update();
        assert_eq!(ex.lock().unwrap().extraction_count(), 1);

        sphere.edit(|n| n.transform = Mat4::from_translation(glam::Vec3::X * 0.5));
        group.per_tick_update();
        assert_eq!(ex.lock().unwrap().extraction_count(), 2);
    }

    #[test]
    fn test_settings_change_reextracts_on_poll() {
        let store = FieldStore::new();
        let mut group = store.create_group(GroupSettings::default());
        let ex = Arc::new(Mutex::new(IsosurfaceExtractor::new(small_settings(), MeshSlot::default())));
        group.add_consumer(ex.clone());
        let sphere = NodeHandle::new(FieldNode::sphere(1.0));
        group.register(&sphere);
        group.per_tick_update();

        let before = ex.lock().unwrap().last_counts().unwrap();
        {
            let mut guard = ex.lock().unwrap();
            let mut voxel = guard.settings().voxel;
            voxel.samples_per_side = 20;
            voxel.cell_size = 0.15;
            guard.set_voxel_settings(voxel).unwrap();
        }
        group.per_tick_update();
        let guard = ex.lock().unwrap();
        assert_eq!(guard.extraction_count(), 2);
        assert!(guard.last_counts().unwrap().vertices > before.vertices);
    }

    #[test]
    fn test_empty_field_disables_sink() {
        let store = FieldStore::new();
        let mut group = store.create_group(GroupSettings::default());
        let ex = Arc::new(Mutex::new(IsosurfaceExtractor::new(small_settings(), MeshSlot::default())));
        group.add_consumer(ex.clone());
        let sphere = NodeHandle::new(FieldNode::sphere(1.0));
        group.register(&sphere);
        group.per_tick_update();
        assert!(ex.lock().unwrap().sink().is_enabled());

        group.deregister(&sphere);
        group.per_tick_update();
        let guard = ex.lock().unwrap();
        assert!(!guard.sink().is_enabled());
        // previous mesh stays installed, only hidden
        assert!(guard.sink().mesh().is_some());
    }

    #[test]
    fn test_sphere_outside_grid_gives_empty_result() {
        let store = FieldStore::new();
        let mut group = store.create_group(GroupSettings::default());
        let ex = Arc::new(Mutex::new(IsosurfaceExtractor::new(small_settings(), MeshSlot::default())));
        group.add_consumer(ex.clone());
        let far = NodeHandle::new(FieldNode::sphere(0.5).translate(50.0, 0.0, 0.0));
        group.register(&far);
        group.per_tick_update();
        let guard = ex.lock().unwrap();
        assert_eq!(guard.last_counts().unwrap().triangles, 0);
        assert!(!guard.sink().is_enabled());
        assert!(guard.sink().mesh().is_none());
    }

    #[test]
    fn test_manual_mode_waits_for_request() {
        let mut settings = small_settings();
        settings.main.auto_update = false;
        let store = FieldStore::new();
        let mut group = store.create_group(GroupSettings::default());
        let ex = Arc::new(Mutex::new(IsosurfaceExtractor::new(settings, MeshSlot::default())));
        group.add_consumer(ex.clone());
        let sphere = NodeHandle::new(FieldNode::sphere(1.0));
        group.register(&sphere);
        group.per_tick_update();
        assert_eq!(ex.lock().unwrap().extraction_count(), 0);
        assert!(ex.lock().unwrap().request_extraction());
        assert_eq!(ex.lock().unwrap().extraction_count(), 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut ex = IsosurfaceExtractor::new(small_settings(), MeshSlot::default());
        let mut voxel = VoxelSettings::default();
        voxel.samples_per_side = 1;
        assert!(ex.set_voxel_settings(voxel).is_err());
        assert_eq!(ex.settings().voxel.samples_per_side, 12);
    }

    #[test]
    fn test_release_resets_initialisation() {
        let store = FieldStore::new();
        let mut group = store.create_group(GroupSettings::default());
        let ex = Arc::new(Mutex::new(IsosurfaceExtractor::new(small_settings(), MeshSlot::default())));
        group.add_consumer(ex.clone());
        let sphere = NodeHandle::new(FieldNode::sphere(1.0));
        group.register(&sphere);
        group.per_tick_update();
        group.release();
        let guard = ex.lock().unwrap();
        assert!(!guard.is_initialized());
        assert!(!guard.is_busy());
    }
}
