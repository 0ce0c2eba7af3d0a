//! Device abstraction consumed by the render graph
//!
//! The graph never talks to a GPU API directly. It allocates handles through
//! [`crate::storage::Storage`] and asks a [`Device`] to materialize them, and it
//! replays compiled passes against a [`CommandRecorder`].

use crate::backend::types::*;
use crate::render_graph::barrier::Barrier;
use thiserror::Error;

/// Device error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create render pass: {0}")]
    RenderPassCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Unknown device handle: {0}")]
    UnknownHandle(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Handle to a GPU texture or texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a render pass object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPassHandle(pub(crate) u64);

/// Handle to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a graphics or compute pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineHandle(pub(crate) u64);

impl TextureHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl BufferHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl RenderPassHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl FramebufferHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl PipelineHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// The subset of a graphics device the render graph needs.
///
/// Handles are allocated by the caller and passed in; a device only has to
/// associate its native object with the handle it is given.
pub trait Device {
    fn create_texture(
        &mut self,
        handle: TextureHandle,
        descriptor: &TextureDescriptor,
    ) -> DeviceResult<()>;

    fn create_texture_view(
        &mut self,
        handle: TextureHandle,
        descriptor: &TextureViewDescriptor,
    ) -> DeviceResult<()>;

    /// Replace the native texture behind `handle`, keeping the handle valid.
    fn recreate_texture(
        &mut self,
        handle: TextureHandle,
        descriptor: &TextureDescriptor,
    ) -> DeviceResult<()>;

    fn destroy_texture(&mut self, handle: TextureHandle);

    fn texture_descriptor(&self, handle: TextureHandle) -> Option<TextureDescriptor>;

    fn create_buffer(&mut self, handle: BufferHandle, descriptor: &BufferDescriptor)
        -> DeviceResult<()>;

    fn destroy_buffer(&mut self, handle: BufferHandle);

    fn create_render_pass(
        &mut self,
        handle: RenderPassHandle,
        descriptor: &RenderPassDescriptor,
    ) -> DeviceResult<()>;

    fn destroy_render_pass(&mut self, handle: RenderPassHandle);

    fn create_framebuffer(
        &mut self,
        handle: FramebufferHandle,
        descriptor: &FramebufferDescriptor,
    ) -> DeviceResult<()>;

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle);

    fn create_pipeline(
        &mut self,
        handle: PipelineHandle,
        descriptor: &PipelineDescriptor,
    ) -> DeviceResult<()>;

    fn destroy_pipeline(&mut self, handle: PipelineHandle);

    fn has_pipeline(&self, handle: PipelineHandle) -> bool;

    /// Update one slot of the bindless descriptor table.
    fn write_bindless(&mut self, write: &BindlessWrite);

    /// Current extent of the primary render output (usually the swapchain).
    fn output_extent(&self) -> Extent2d;
}

/// Command recording target a compiled graph is replayed against
pub trait CommandRecorder {
    fn pipeline_barrier(&mut self, barrier: &Barrier);

    fn begin_render_pass(&mut self, begin: &RenderPassBegin<'_>);

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_scissor(&mut self, scissor: Rect2d);

    fn end_render_pass(&mut self);

    fn bind_pipeline(&mut self, pipeline: PipelineHandle);

    fn draw(&mut self, vertex_count: u32, instance_count: u32);

    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}
