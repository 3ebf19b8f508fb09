use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::gpu::BufferHandle;
use crate::mapper::MapperSnapshot;

/// State of the field handed to consumers each tick
#[derive(Debug, Clone)]
pub struct FieldFrame {
    /// Rebuild counter of the group
    pub version: u64,
    /// Number of node records
    pub node_count: usize,
    /// Snapshot published with this version
    pub snapshot: Arc<MapperSnapshot>,
}

/// Component driven by a [`Group`](super::Group)
///
/// Buffer handles are pushed to the consumer whenever their identity
/// changes; the consumer keeps them until the next notification.
pub trait FieldConsumer: Send {
    /// Last node went away
    fn on_field_became_empty(&mut self);

    /// First node arrived
    fn on_field_became_non_empty(&mut self);

    /// Node or material buffer was reallocated, or the node count changed
    fn on_node_or_material_buffer_changed(&mut self, nodes: &BufferHandle, materials: &BufferHandle, count: usize);

    /// Settings buffer was created
    fn on_settings_buffer_changed(&mut self, settings: &BufferHandle);

    /// Shared mesh sample or UV arrays were rebuilt
    fn on_mesh_samples_changed(&mut self, _samples: Option<&BufferHandle>, _uvs: Option<&BufferHandle>) {}

    /// The field changed this tick and is not empty
    fn run_per_tick_update(&mut self, frame: &FieldFrame);

    /// Called every tick, changed or not. Drives asynchronous work.
    fn poll(&mut self, _frame: &FieldFrame) {}

    /// Drain outstanding work and drop GPU resources
    fn release(&mut self) {}
}

/// Shared consumer handle
pub type ConsumerHandle = Arc<Mutex<dyn FieldConsumer>>;

pub(crate) fn lock_consumer(consumer: &ConsumerHandle) -> MutexGuard<'_, dyn FieldConsumer + 'static> {
    consumer.lock().unwrap_or_else(PoisonError::into_inner)
}
