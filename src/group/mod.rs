//! Field aggregator
//!
//! A `Group` owns the ordered list of registered nodes, flattens them into
//! node/material records once per tick when something changed, keeps the GPU
//! buffers holding those records, publishes Mapper snapshots and drives its
//! consumers (isosurface extractors, raymarch renderers).
//!
//! # Features
//! - **Lazy rebuild**: records are rebuilt only when a node edit, order
//!   change, registration, store change, transform or settings change was
//!   seen; a tick without changes touches nothing
//! - **Stable buffers**: buffers are reallocated only when the record count
//!   changes, and consumers are told about new handles exactly then
//! - **Shared mesh samples**: mesh-backed nodes hold one store reference
//!   each, released on deregistration or when the node is destroyed

mod consumer;
mod settings;

pub use consumer::{ConsumerHandle, FieldConsumer, FieldFrame};
pub use settings::{GroupSettings, DEFAULT_NORMAL_SMOOTHING};

use std::sync::Arc;

use glam::Mat4;

use crate::asset::MeshAssetId;
use crate::gpu::{GpuContext, StructuredBuffer};
use crate::mapper::{Mapper, MapperSnapshot};
use crate::store::{read_store, write_store, StoreHandle};
use crate::types::{GpuMaterialRecord, GpuNodeRecord, GpuSettingsRecord, NodeHandle, NodeKind, WeakNode};

use consumer::lock_consumer;

#[derive(Debug)]
struct GroupEntry {
    node: WeakNode,
    /// Asset this node holds a store reference to
    asset: Option<MeshAssetId>,
    /// Registration sequence, breaks order ties
    seq: u64,
    order: i32,
}

/// What a tick did, mostly for tests and tracing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records were rebuilt and a new snapshot published
    pub rebuilt: bool,
    /// Node or material buffer was reallocated
    pub reallocated: bool,
    /// Destroyed nodes dropped this tick
    pub pruned: usize,
}

/// Ordered collection of field nodes with GPU buffers and consumers
pub struct Group {
    id: u64,
    store: StoreHandle,
    gpu: Option<Arc<GpuContext>>,
    settings: GroupSettings,
    /// Local-to-world placement of the whole field
    transform: Mat4,
    entries: Vec<GroupEntry>,
    next_seq: u64,

    data_dirty: bool,
    order_dirty: bool,
    transform_dirty: bool,
    settings_dirty: bool,
    force_update: bool,
    store_generation: u64,

    node_buffer: StructuredBuffer<GpuNodeRecord>,
    material_buffer: StructuredBuffer<GpuMaterialRecord>,
    settings_buffer: StructuredBuffer<GpuSettingsRecord>,
    node_count: usize,
    version: u64,
    mapper: Mapper,
    consumers: Vec<ConsumerHandle>,
    released: bool,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("id", &self.id)
            .field("nodes", &self.entries.len())
            .field("node_count", &self.node_count)
            .field("version", &self.version)
            .field("consumers", &self.consumers.len())
            .finish()
    }
}

impl Group {
    pub(crate) fn new(id: u64, store: StoreHandle, gpu: Option<Arc<GpuContext>>, settings: GroupSettings) -> Self {
        Group {
            id,
            store,
            gpu,
            settings,
            transform: Mat4::IDENTITY,
            entries: Vec::new(),
            next_seq: 0,
            data_dirty: true,
            order_dirty: false,
            transform_dirty: false,
            settings_dirty: true,
            force_update: false,
            store_generation: 0,
            node_buffer: StructuredBuffer::storage("field nodes"),
            material_buffer: StructuredBuffer::storage("field materials"),
            settings_buffer: StructuredBuffer::new(
                "field settings",
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::STORAGE,
            ),
            node_count: 0,
            version: 0,
            mapper: Mapper::new(settings.mapper),
            consumers: Vec::new(),
            released: false,
        }
    }

    /// Group id, unique within its field store
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle to the shared sample store
    pub fn store(&self) -> StoreHandle {
        Arc::clone(&self.store)
    }

    /// Query handle; clones see every future snapshot
    pub fn mapper(&self) -> Mapper {
        self.mapper.clone()
    }

    /// GPU context, if the store has one
    pub fn gpu(&self) -> Option<&Arc<GpuContext>> {
        self.gpu.as_ref()
    }

    /// Current settings
    pub fn settings(&self) -> &GroupSettings {
        &self.settings
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no node is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records in the last rebuild
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Rebuild counter
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether `node` is registered here
    pub fn contains(&self, node: &NodeHandle) -> bool {
        self.entries.iter().any(|e| e.node.id() == node.id())
    }

    /// Node record buffer
    pub fn node_buffer(&self) -> &StructuredBuffer<GpuNodeRecord> {
        &self.node_buffer
    }

    /// Material record buffer
    pub fn material_buffer(&self) -> &StructuredBuffer<GpuMaterialRecord> {
        &self.material_buffer
    }

    /// Settings buffer
    pub fn settings_buffer(&self) -> &StructuredBuffer<GpuSettingsRecord> {
        &self.settings_buffer
    }

    /// Add a node.
    ///
    /// Returns false when the node is already registered, belongs to another
    /// group, or is a mesh reference whose asset is not loaded (skipped
    /// without error).
    pub fn register(&mut self, node: &NodeHandle) -> bool {
        if self.released || self.contains(node) {
            return false;
        }

        let (asset, order) = {
            let n = node.read();
            if n.is_unloaded_mesh() {
                tracing::debug!(node = node.id().raw(), "mesh node without asset skipped");
                return false;
            }
            let asset = match &n.kind {
                NodeKind::Mesh(mesh) => mesh.asset().cloned(),
                _ => None,
            };
            (asset, n.order)
        };

        if !node.claim(self.id) {
            tracing::warn!(node = node.id().raw(), owner = ?node.owner(), "node already owned by another group");
            return false;
        }

        let asset_id = asset.as_ref().map(|a| {
            write_store(&self.store).acquire(a);
            a.id()
        });

        let was_empty = self.entries.is_empty();
        self.entries.push(GroupEntry {
            node: node.downgrade(),
            asset: asset_id,
            seq: self.next_seq,
            order,
        });
        self.next_seq += 1;
        self.data_dirty = true;
        self.order_dirty = true;

        tracing::trace!(group = self.id, node = node.id().raw(), "node registered");
        if was_empty {
            self.notify(|c| c.on_field_became_non_empty());
        }
        true
    }

    /// Remove a node. Returns false when it was not registered here.
    pub fn deregister(&mut self, node: &NodeHandle) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.node.id() == node.id()) else {
            return false;
        };
        let entry = self.entries.remove(index);
        if let Some(asset) = entry.asset {
            write_store(&self.store).release(asset);
        }
        node.release_claim(self.id);
        self.data_dirty = true;

        tracing::trace!(group = self.id, node = node.id().raw(), "node deregistered");
        if self.entries.is_empty() {
            self.notify(|c| c.on_field_became_empty());
        }
        true
    }

    /// Replace the settings; uploaded on the next tick
    pub fn set_settings(&mut self, settings: GroupSettings) {
        if settings != self.settings {
            if settings.mapper != self.settings.mapper {
                self.mapper.set_config(settings.mapper);
            }
            self.settings = settings;
            self.settings_dirty = true;
        }
    }

    /// Place the whole field in the world
    pub fn set_transform(&mut self, transform: Mat4) {
        if transform != self.transform {
            self.transform = transform;
            self.transform_dirty = true;
        }
    }

    /// Current placement
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// Rebuild and run consumers on the next tick even without changes
    pub fn force_update(&mut self) {
        self.force_update = true;
    }

    /// Attach a consumer and bring it up to date with the current buffers
    pub fn add_consumer(&mut self, consumer: ConsumerHandle) {
        {
            let mut c = lock_consumer(&consumer);
            if let Some(settings) = self.settings_buffer.handle() {
                c.on_settings_buffer_changed(settings);
            }
            if let (Some(nodes), Some(materials)) = (self.node_buffer.handle(), self.material_buffer.handle()) {
                c.on_node_or_material_buffer_changed(nodes, materials, self.node_count);
            }
            {
                let store = read_store(&self.store);
                if store.sample_buffer().is_some() {
                    c.on_mesh_samples_changed(store.sample_buffer(), store.uv_buffer());
                }
            }
            if self.entries.is_empty() {
                c.on_field_became_empty();
            } else {
                c.on_field_became_non_empty();
            }
        }
        self.consumers.push(consumer);
        self.force_update = true;
    }

    /// Detach a consumer without releasing it
    pub fn remove_consumer(&mut self, consumer: &ConsumerHandle) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|c| !Arc::ptr_eq(c, consumer));
        self.consumers.len() != before
    }

    /// Number of attached consumers
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    fn notify(&self, mut f: impl FnMut(&mut dyn FieldConsumer)) {
        for consumer in &self.consumers {
            f(&mut *lock_consumer(consumer));
        }
    }

    fn frame(&self) -> FieldFrame {
        FieldFrame {
            version: self.version,
            node_count: self.node_count,
            snapshot: self.mapper.snapshot(),
        }
    }

    /// Drop entries whose node was destroyed, releasing their store references
    fn prune(&mut self) -> usize {
        let before = self.entries.len();
        let store = &self.store;
        self.entries.retain(|entry| {
            if entry.node.upgrade().is_some() {
                return true;
            }
            if let Some(asset) = entry.asset {
                write_store(store).release(asset);
            }
            false
        });
        before - self.entries.len()
    }

    /// Collect node edits; follow mesh nodes whose asset was swapped
    fn collect_node_changes(&mut self) {
        for entry in &mut self.entries {
            let Some(node) = entry.node.upgrade() else {
                continue;
            };
            if node.take_order_dirty() {
                self.order_dirty = true;
            }
            if !node.take_dirty() {
                continue;
            }
            self.data_dirty = true;

            let n = node.read();
            entry.order = n.order;
            let current = match &n.kind {
                NodeKind::Mesh(mesh) => mesh.asset().cloned(),
                _ => None,
            };
            if current.as_ref().map(|a| a.id()) != entry.asset {
                let mut store = write_store(&self.store);
                if let Some(old) = entry.asset.take() {
                    store.release(old);
                }
                if let Some(asset) = &current {
                    store.acquire(asset);
                    entry.asset = Some(asset.id());
                }
            }
        }
    }

    /// Per-tick dirty pass.
    ///
    /// Prunes destroyed nodes, re-sorts on order changes, rebuilds and
    /// uploads records when anything changed, publishes a Mapper snapshot
    /// and runs the consumers.
    pub fn per_tick_update(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.released {
            return report;
        }
        let _span = tracing::debug_span!("per_tick_update", group = self.id).entered();

        let was_empty = self.entries.is_empty();
        report.pruned = self.prune();
        if report.pruned > 0 {
            tracing::debug!(pruned = report.pruned, "destroyed nodes pruned");
            self.data_dirty = true;
            if !was_empty && self.entries.is_empty() {
                self.notify(|c| c.on_field_became_empty());
            }
        }

        self.collect_node_changes();

        if self.order_dirty {
            self.entries.sort_by_key(|e| (e.order, e.seq));
            self.order_dirty = false;
            self.data_dirty = true;
        }

        self.sync_store();

        let gpu = self.gpu.clone();
        let gpu = gpu.as_deref();

        if self.settings_dirty {
            if self.settings_buffer.ensure_len(gpu, 1) {
                if let Some(handle) = self.settings_buffer.handle() {
                    let handle = handle.clone();
                    self.notify(|c| c.on_settings_buffer_changed(&handle));
                }
            }
            self.settings_buffer.upload(gpu, &[self.settings.to_record()]);
        }

        let changed = self.data_dirty || self.transform_dirty || self.settings_dirty || self.force_update;
        if changed {
            report.reallocated = self.rebuild(gpu);
            report.rebuilt = true;
            self.data_dirty = false;
            self.transform_dirty = false;
            self.settings_dirty = false;
            self.force_update = false;
        }

        let frame = self.frame();
        if changed && !self.entries.is_empty() {
            self.notify(|c| c.run_per_tick_update(&frame));
        }
        self.notify(|c| c.poll(&frame));

        report
    }

    /// Rebuild the shared store when needed and notice rebuilds made by
    /// other groups
    fn sync_store(&mut self) {
        let mut store = write_store(&self.store);
        store.rebuild();
        if store.generation() == self.store_generation {
            return;
        }
        self.store_generation = store.generation();
        self.data_dirty = true;

        let samples = store.sample_buffer().cloned();
        let uvs = store.uv_buffer().cloned();
        drop(store);

        self.notify(|c| c.on_mesh_samples_changed(samples.as_ref(), uvs.as_ref()));
    }

    /// Flatten nodes, upload, publish. Returns whether buffers were reallocated.
    fn rebuild(&mut self, gpu: Option<&GpuContext>) -> bool {
        let world_to_field = self.transform.inverse();
        let mut nodes = Vec::with_capacity(self.entries.len());
        let mut materials = Vec::with_capacity(self.entries.len());

        let (samples, offsets): (_, Vec<_>) = {
            let store = read_store(&self.store);
            let offsets = self
                .entries
                .iter()
                .map(|e| e.asset.and_then(|id| store.offsets(id)))
                .collect();
            (store.samples(), offsets)
        };

        for (entry, offsets) in self.entries.iter().zip(offsets) {
            let Some(node) = entry.node.upgrade() else {
                continue;
            };
            let node = node.read();
            if let Some((record, material)) = node.to_records(&world_to_field, offsets) {
                nodes.push(record);
                materials.push(material);
            }
        }

        let count = nodes.len();
        let mut reallocated = self.node_buffer.ensure_len(gpu, count);
        reallocated |= self.material_buffer.ensure_len(gpu, count);
        self.node_buffer.upload(gpu, &nodes);
        self.material_buffer.upload(gpu, &materials);

        let count_changed = count != self.node_count;
        self.node_count = count;
        self.version += 1;

        self.mapper.publish(MapperSnapshot::from_records(
            self.version,
            &nodes,
            &materials,
            samples,
            self.settings.to_record(),
            self.settings.mapper,
        ));

        tracing::debug!(
            group = self.id,
            nodes = count,
            version = self.version,
            reallocated,
            "field records rebuilt"
        );

        if reallocated || count_changed {
            if let (Some(n), Some(m)) = (self.node_buffer.handle(), self.material_buffer.handle()) {
                let (n, m) = (n.clone(), m.clone());
                self.notify(|c| c.on_node_or_material_buffer_changed(&n, &m, count));
            }
        }
        reallocated
    }

    /// Release every node, buffer and consumer. Consumers drain their
    /// outstanding work first. Further calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        for consumer in self.consumers.drain(..) {
            lock_consumer(&consumer).release();
        }

        {
            let mut store = write_store(&self.store);
            for entry in self.entries.drain(..) {
                if let Some(asset) = entry.asset {
                    store.release(asset);
                }
                if let Some(node) = entry.node.upgrade() {
                    node.release_claim(self.id);
                }
            }
        }

        self.node_buffer.release();
        self.material_buffer.release();
        self.settings_buffer.release();
        self.mapper.publish(MapperSnapshot::empty(self.settings.mapper));
        tracing::debug!(group = self.id, "group released");
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        self.release();
    }
}
