//! Typed structured buffers
//!
//! A `StructuredBuffer<T>` keeps a host shadow of its contents next to an
//! optional wgpu buffer. The buffer keeps its identity until the element count
//! changes, so consumers only rebind when `ensure_len` reports a reallocation.
//! Without a GPU context only the shadow exists, which keeps group lifecycle
//! logic usable (and testable) on GPU-less hosts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;

use super::GpuContext;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Cheap, cloneable reference to a buffer allocation handed to consumers
#[derive(Debug, Clone)]
pub struct BufferHandle {
    id: BufferId,
    len: usize,
    stride: usize,
    buffer: Option<Arc<wgpu::Buffer>>,
}

impl BufferHandle {
    /// Allocation identity
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Element capacity (at least 1)
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the allocation holds no elements; false for handles a
    /// `StructuredBuffer` hands out, which hold at least one
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of one element in bytes
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Total size in bytes
    #[inline]
    pub fn byte_size(&self) -> u64 {
        (self.len * self.stride) as u64
    }

    /// GPU buffer, when the owner has a device
    #[inline]
    pub fn gpu(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_deref()
    }
}

impl PartialEq for BufferHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Structured buffer of `T` with a host shadow
#[derive(Debug)]
pub struct StructuredBuffer<T: Pod> {
    label: &'static str,
    usage: wgpu::BufferUsages,
    handle: Option<BufferHandle>,
    host: Vec<T>,
}

impl<T: Pod> StructuredBuffer<T> {
    /// Unallocated buffer
    pub fn new(label: &'static str, usage: wgpu::BufferUsages) -> Self {
        StructuredBuffer {
            label,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            handle: None,
            host: Vec::new(),
        }
    }

    /// Storage buffer readable by compute and fragment shaders
    pub fn storage(label: &'static str) -> Self {
        Self::new(label, wgpu::BufferUsages::STORAGE)
    }

    /// Make sure the buffer holds `max(1, count)` elements.
    ///
    /// Returns true when a new allocation (with a new identity) was made.
    /// The host shadow is zeroed on reallocation.
    pub fn ensure_len(&mut self, gpu: Option<&GpuContext>, count: usize) -> bool {
        let len = count.max(1);
        if self.handle.as_ref().is_some_and(|h| h.len == len) {
            return false;
        }

        self.release();
        let stride = std::mem::size_of::<T>();
        let buffer = gpu.map(|ctx| {
            Arc::new(ctx.device().create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: (len * stride) as u64,
                usage: self.usage,
                mapped_at_creation: false,
            }))
        });
        self.host = vec![T::zeroed(); len];
        self.handle = Some(BufferHandle {
            id: BufferId::next(),
            len,
            stride,
            buffer,
        });
        tracing::debug!(label = self.label, len, "structured buffer allocated");
        true
    }

    /// Copy `data` into the shadow and the GPU buffer.
    ///
    /// Call `ensure_len` first; extra capacity is zero-filled and data beyond
    /// the capacity is dropped.
    pub fn upload(&mut self, gpu: Option<&GpuContext>, data: &[T]) {
        let Some(handle) = &self.handle else {
            return;
        };
        let n = data.len().min(handle.len);
        self.host[..n].copy_from_slice(&data[..n]);
        self.host[n..].fill(T::zeroed());

        if let (Some(ctx), Some(buffer)) = (gpu, handle.buffer.as_deref()) {
            ctx.queue().write_buffer(buffer, 0, bytemuck::cast_slice(&self.host));
        }
    }

    /// Current handle, once allocated
    pub fn handle(&self) -> Option<&BufferHandle> {
        self.handle.as_ref()
    }

    /// Host shadow
    pub fn host_data(&self) -> &[T] {
        &self.host
    }

    /// Host shadow as bytes
    pub fn host_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.host)
    }

    /// Drop the allocation. Consumers holding a handle keep the wgpu buffer
    /// alive until they let go of it.
    pub fn release(&mut self) {
        self.handle = None;
        self.host.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_at_least_one_element() {
        let mut b = StructuredBuffer::<u32>::storage("test");
        assert!(b.handle().is_none());
        assert!(b.ensure_len(None, 0));
        assert_eq!(b.handle().unwrap().len(), 1);
        assert!(!b.handle().unwrap().is_empty());
        assert_eq!(b.host_data(), &[0]);
    }

    #[test]
    fn test_identity_stable_until_count_changes() {
        let mut b = StructuredBuffer::<f32>::storage("test");
        b.ensure_len(None, 4);
        let id = b.handle().unwrap().id();
        assert!(!b.ensure_len(None, 4));
        assert_eq!(b.handle().unwrap().id(), id);
        assert!(b.ensure_len(None, 3));
        assert_ne!(b.handle().unwrap().id(), id);
    }

    #[test]
    fn test_shrink_reallocates() {
        let mut b = StructuredBuffer::<f32>::storage("test");
        b.ensure_len(None, 8);
        assert!(b.ensure_len(None, 2));
        assert_eq!(b.handle().unwrap().byte_size(), 8);
    }

    #[test]
    fn test_upload_pads_with_zeroes() {
        let mut b = StructuredBuffer::<u32>::storage("test");
        b.ensure_len(None, 4);
        b.upload(None, &[1, 2, 3, 4]);
        b.upload(None, &[9]);
        assert_eq!(b.host_data(), &[9, 0, 0, 0]);
        assert_eq!(b.host_bytes().len(), 16);
    }

    #[test]
    fn test_upload_before_allocation_is_noop() {
        let mut b = StructuredBuffer::<u32>::storage("test");
        b.upload(None, &[1, 2]);
        assert!(b.host_data().is_empty());
    }
}
