//! Mesh sample store and field store
//!
//! Mesh-reference nodes can point at large voxel grids, and many nodes (in
//! many groups) can share one asset. The `MeshSampleStore` keeps exactly one
//! copy of every referenced asset's samples in a concatenated array, with a
//! reference count per asset and an asset-to-offset map.
//!
//! # Features
//! - **Dedup**: an asset's samples are uploaded once, however many nodes use it
//! - **Lazy rebuild**: the concatenated arrays are rebuilt only when the set
//!   of referenced assets changes
//! - **Explicit ownership**: the store lives in a [`FieldStore`] and is passed
//!   to groups by handle (`Arc<RwLock<..>>`), so readers wait for a rebuild
//!   in progress instead of observing half-built arrays

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::asset::{MeshAsset, MeshAssetId};
use crate::gpu::{BufferHandle, GpuContext, StructuredBuffer};
use crate::group::{Group, GroupSettings};
use crate::types::MeshOffsets;

#[derive(Debug)]
struct StoreEntry {
    asset: Arc<MeshAsset>,
    ref_count: usize,
}

/// Outcome of [`MeshSampleStore::rebuild`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreRebuild {
    /// The arrays were rebuilt
    pub rebuilt: bool,
    /// The GPU sample or UV buffer was reallocated
    pub buffers_changed: bool,
}

/// Reference-counted cache of mesh voxel samples
#[derive(Debug)]
pub struct MeshSampleStore {
    entries: HashMap<MeshAssetId, StoreEntry>,
    /// First-seen order, which is also the concatenation order
    order: Vec<MeshAssetId>,
    offsets: HashMap<MeshAssetId, MeshOffsets>,
    samples: Arc<Vec<f32>>,
    packed_uvs: Arc<Vec<f32>>,
    dirty: bool,
    generation: u64,
    gpu: Option<Arc<GpuContext>>,
    sample_buffer: StructuredBuffer<f32>,
    uv_buffer: StructuredBuffer<f32>,
}

impl MeshSampleStore {
    /// Empty store, optionally mirrored on a GPU
    pub fn new(gpu: Option<Arc<GpuContext>>) -> Self {
        MeshSampleStore {
            entries: HashMap::new(),
            order: Vec::new(),
            offsets: HashMap::new(),
            samples: Arc::new(Vec::new()),
            packed_uvs: Arc::new(Vec::new()),
            dirty: true,
            generation: 0,
            gpu,
            sample_buffer: StructuredBuffer::storage("mesh samples"),
            uv_buffer: StructuredBuffer::storage("mesh packed uvs"),
        }
    }

    /// Add a reference to `asset`.
    ///
    /// Returns true when the asset was not referenced before, which marks the
    /// store dirty.
    pub fn acquire(&mut self, asset: &Arc<MeshAsset>) -> bool {
        let id = asset.id();
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.ref_count += 1;
            return false;
        }
        self.entries.insert(
            id,
            StoreEntry {
                asset: Arc::clone(asset),
                ref_count: 1,
            },
        );
        self.order.push(id);
        self.dirty = true;
        tracing::debug!(asset = asset.name(), "mesh asset added to sample store");
        true
    }

    /// Drop a reference. Returns true when the last reference went away and
    /// the asset was evicted.
    pub fn release(&mut self, id: MeshAssetId) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return false;
        }
        if let Some(entry) = self.entries.remove(&id) {
            tracing::debug!(asset = entry.asset.name(), "mesh asset evicted from sample store");
        }
        self.order.retain(|&other| other != id);
        self.offsets.remove(&id);
        self.dirty = true;
        true
    }

    /// Rebuild the concatenated arrays if the asset set changed.
    pub fn rebuild(&mut self) -> StoreRebuild {
        if !self.dirty {
            return StoreRebuild::default();
        }
        let _span = tracing::debug_span!("sample_store_rebuild", assets = self.order.len()).entered();

        let mut samples = Vec::new();
        let mut uvs = Vec::new();
        self.offsets.clear();

        for id in &self.order {
            let Some(entry) = self.entries.get(id) else {
                continue;
            };
            let asset = &entry.asset;
            let sample_start = samples.len() as i32;
            samples.extend_from_slice(asset.samples());

            let uv_start = match asset.packed_uvs() {
                Some(packed) => {
                    let start = uvs.len() as i32;
                    uvs.extend_from_slice(packed);
                    start
                }
                None => -1,
            };
            self.offsets.insert(
                *id,
                MeshOffsets {
                    sample_start,
                    uv_start,
                },
            );
        }

        let gpu = self.gpu.as_deref();
        let mut buffers_changed = self.sample_buffer.ensure_len(gpu, samples.len());
        buffers_changed |= self.uv_buffer.ensure_len(gpu, uvs.len());
        self.sample_buffer.upload(gpu, &samples);
        self.uv_buffer.upload(gpu, &uvs);

        self.samples = Arc::new(samples);
        self.packed_uvs = Arc::new(uvs);
        self.generation += 1;
        self.dirty = false;

        tracing::debug!(
            samples = self.samples.len(),
            uvs = self.packed_uvs.len(),
            generation = self.generation,
            "sample store rebuilt"
        );

        StoreRebuild {
            rebuilt: true,
            buffers_changed,
        }
    }

    /// Offsets of `id` in the concatenated arrays (valid after a rebuild)
    pub fn offsets(&self, id: MeshAssetId) -> Option<MeshOffsets> {
        self.offsets.get(&id).copied()
    }

    /// Current reference count of `id` (0 when absent)
    pub fn ref_count(&self, id: MeshAssetId) -> usize {
        self.entries.get(&id).map_or(0, |e| e.ref_count)
    }

    /// Whether `id` is referenced
    pub fn contains(&self, id: MeshAssetId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of distinct assets
    pub fn asset_count(&self) -> usize {
        self.entries.len()
    }

    /// Whether the asset set changed since the last rebuild
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped on every rebuild
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Concatenated samples (shared snapshot)
    pub fn samples(&self) -> Arc<Vec<f32>> {
        Arc::clone(&self.samples)
    }

    /// Concatenated packed UVs (shared snapshot)
    pub fn packed_uvs(&self) -> Arc<Vec<f32>> {
        Arc::clone(&self.packed_uvs)
    }

    /// GPU sample buffer, once built
    pub fn sample_buffer(&self) -> Option<&BufferHandle> {
        self.sample_buffer.handle()
    }

    /// GPU UV buffer, once built
    pub fn uv_buffer(&self) -> Option<&BufferHandle> {
        self.uv_buffer.handle()
    }

    /// Drop every entry and buffer
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.offsets.clear();
        self.samples = Arc::new(Vec::new());
        self.packed_uvs = Arc::new(Vec::new());
        self.sample_buffer.release();
        self.uv_buffer.release();
        self.dirty = true;
    }
}

/// Shared handle to a sample store
pub type StoreHandle = Arc<RwLock<MeshSampleStore>>;

/// Read-lock a store, recovering from poisoning
pub fn read_store(store: &StoreHandle) -> RwLockReadGuard<'_, MeshSampleStore> {
    store.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-lock a store, recovering from poisoning
pub fn write_store(store: &StoreHandle) -> RwLockWriteGuard<'_, MeshSampleStore> {
    store.write().unwrap_or_else(PoisonError::into_inner)
}

/// Top-level owner of the shared mesh sample store and GPU context
///
/// Groups created from the same `FieldStore` share mesh samples.
#[derive(Debug)]
pub struct FieldStore {
    store: StoreHandle,
    gpu: Option<Arc<GpuContext>>,
    next_group_id: AtomicU64,
}

impl FieldStore {
    /// CPU-only field store (Mapper queries and CPU extraction)
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Field store mirrored on `gpu`
    pub fn with_gpu(gpu: Arc<GpuContext>) -> Self {
        Self::build(Some(gpu))
    }

    fn build(gpu: Option<Arc<GpuContext>>) -> Self {
        FieldStore {
            store: Arc::new(RwLock::new(MeshSampleStore::new(gpu.clone()))),
            gpu,
            next_group_id: AtomicU64::new(1),
        }
    }

    /// Handle to the sample store
    pub fn store(&self) -> StoreHandle {
        Arc::clone(&self.store)
    }

    /// GPU context, if any
    pub fn gpu(&self) -> Option<&Arc<GpuContext>> {
        self.gpu.as_ref()
    }

    /// Create a group bound to this store
    pub fn create_group(&self, settings: GroupSettings) -> Group {
        let id = self.next_group_id.fetch_add(1, Ordering::Relaxed);
        Group::new(id, self.store(), self.gpu.clone(), settings)
    }

    /// Wait for outstanding GPU work, then drop every store entry.
    ///
    /// Groups and extractors should be released first.
    pub fn shutdown(&self) {
        if let Some(gpu) = &self.gpu {
            gpu.wait_idle();
        }
        write_store(&self.store).clear();
    }
}

impl Default for FieldStore {
    fn default() -> Self {
        Self::new()
    }
}
