//! Staging buffer readback
//!
//! A `PendingRead` starts mapping a staging buffer and is then either polled
//! once per tick (asynchronous retrieval) or waited on (synchronous paths).

use bytemuck::Pod;
use futures_channel::oneshot;

use crate::error::{FieldError, Result};

type MapResult = std::result::Result<(), wgpu::BufferAsyncError>;

fn copy_out<T: Pod>(staging: &wgpu::Buffer, count: usize) -> Vec<T> {
    let mapped = staging.slice(..).get_mapped_range();
    let data: &[T] = bytemuck::cast_slice(&mapped);
    let result = data[..count.min(data.len())].to_vec();
    drop(mapped);
    result
}

/// Progress of a poll-based read
#[derive(Debug)]
pub enum ReadState<T> {
    /// Map still in flight
    Pending,
    /// Data copied out and buffer unmapped
    Ready(Vec<T>),
    /// Map failed or the device dropped the request
    Failed(FieldError),
}

/// A staging buffer map in flight
#[derive(Debug)]
pub struct PendingRead {
    staging: wgpu::Buffer,
    receiver: oneshot::Receiver<MapResult>,
}

impl PendingRead {
    /// Start mapping `staging` for reading
    pub fn begin(staging: wgpu::Buffer) -> Self {
        let (sender, receiver) = oneshot::channel();
        staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        PendingRead { staging, receiver }
    }

    /// Check for completion without blocking; `device.poll` must have been
    /// called (with `Maintain::Poll`) for callbacks to fire.
    pub fn poll<T: Pod>(&mut self, count: usize) -> ReadState<T> {
        match self.receiver.try_recv() {
            Ok(None) => ReadState::Pending,
            Ok(Some(Ok(()))) => {
                let data = copy_out(&self.staging, count);
                self.staging.unmap();
                ReadState::Ready(data)
            }
            Ok(Some(Err(e))) => ReadState::Failed(FieldError::BufferMapping(format!("Map error: {e:?}"))),
            Err(e) => ReadState::Failed(FieldError::BufferMapping(format!("Channel error: {e}"))),
        }
    }

    /// Block until the map resolves, then read
    pub fn wait<T: Pod>(mut self, device: &wgpu::Device, count: usize) -> Result<Vec<T>> {
        device.poll(wgpu::Maintain::Wait);
        match self.poll(count) {
            ReadState::Ready(data) => Ok(data),
            ReadState::Failed(e) => Err(e),
            ReadState::Pending => Err(FieldError::BufferMapping(String::from(
                "map still pending after device wait",
            ))),
        }
    }
}
