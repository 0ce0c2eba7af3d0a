//! Render pass definitions for the render graph

use std::fmt;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{GraphError, GraphResult};
use crate::render_graph::barrier::{AttachmentOps, Barrier};
use crate::render_graph::resource::ResourceId;
use crate::render_graph::sync::{buffer_write_state, AttachmentKind, PassKind};

/// Callback recording a pass's commands: `(recorder, frame_index)`
pub type PassExecutor = Box<dyn Fn(&mut dyn CommandRecorder, usize)>;

/// A texture written by a pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureWrite {
    pub texture: ResourceId,
    pub attachment: AttachmentKind,
    pub clear: ClearValue,
}

/// A buffer read or written by a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAccess {
    pub buffer: ResourceId,
    pub usage: BufferUsage,
}

/// Size of the area a graphics pass renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PassDimensions {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub sample_count: u32,
}

impl PassDimensions {
    pub fn extent(&self) -> Extent2d {
        Extent2d::new(self.width, self.height)
    }
}

/// A named unit of GPU work with declared resource accesses
pub struct Pass {
    name: String,
    kind: PassKind,

    texture_writes: Vec<TextureWrite>,
    texture_reads: Vec<ResourceId>,
    buffer_writes: Vec<BufferAccess>,
    buffer_reads: Vec<BufferAccess>,

    executor: Option<PassExecutor>,
    pipelines: Vec<PipelineHandle>,

    pub(crate) render_pass: Option<RenderPassHandle>,
    pub(crate) framebuffer: Option<FramebufferHandle>,
    pub(crate) dimensions: PassDimensions,
    pub(crate) clear_values: Vec<ClearValue>,
    pub(crate) attachment_ops: Vec<AttachmentOps>,
    pub(crate) pre_barrier: Barrier,
    pub(crate) post_barrier: Barrier,
    pub(crate) build_count: u32,
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("texture_writes", &self.texture_writes)
            .field("texture_reads", &self.texture_reads)
            .field("buffer_writes", &self.buffer_writes)
            .field("buffer_reads", &self.buffer_reads)
            .field("has_executor", &self.executor.is_some())
            .field("pipelines", &self.pipelines)
            .field("render_pass", &self.render_pass)
            .field("framebuffer", &self.framebuffer)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl Pass {
    pub(crate) fn new(name: &str, kind: PassKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            texture_writes: Vec::new(),
            texture_reads: Vec::new(),
            buffer_writes: Vec::new(),
            buffer_reads: Vec::new(),
            executor: None,
            pipelines: Vec::new(),
            render_pass: None,
            framebuffer: None,
            dimensions: PassDimensions::default(),
            clear_values: Vec::new(),
            attachment_ops: Vec::new(),
            pre_barrier: Barrier::default(),
            post_barrier: Barrier::default(),
            build_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    /// Declare a texture this pass writes, as an attachment for graphics passes.
    pub fn write(
        &mut self,
        texture: ResourceId,
        attachment: AttachmentKind,
        clear: ClearValue,
    ) -> &mut Self {
        self.texture_writes.push(TextureWrite {
            texture,
            attachment,
            clear,
        });
        self
    }

    /// Declare a texture this pass samples.
    pub fn read(&mut self, texture: ResourceId) -> &mut Self {
        self.texture_reads.push(texture);
        self
    }

    /// Declare a buffer this pass writes. Only `UNIFORM` or `STORAGE` are accepted.
    pub fn write_buffer(&mut self, buffer: ResourceId, usage: BufferUsage) -> GraphResult<&mut Self> {
        if buffer_write_state(self.kind, usage).is_none() {
            log::error!(
                "Pass '{}' declared a {:?} write; buffers are only written as uniform or storage",
                self.name,
                usage
            );
            return Err(GraphError::InvalidBufferWrite {
                pass: self.name.clone(),
                usage,
            });
        }
        self.buffer_writes.push(BufferAccess { buffer, usage });
        Ok(self)
    }

    /// Declare a buffer this pass reads with one or more usages.
    pub fn read_buffer(&mut self, buffer: ResourceId, usage: BufferUsage) -> &mut Self {
        self.buffer_reads.push(BufferAccess { buffer, usage });
        self
    }

    pub fn set_executor<F>(&mut self, executor: F) -> &mut Self
    where
        F: Fn(&mut dyn CommandRecorder, usize) + 'static,
    {
        self.executor = Some(Box::new(executor));
        self
    }

    /// Attach a pipeline this pass (re)creates whenever it is built.
    pub fn add_pipeline(&mut self, pipeline: PipelineHandle) -> &mut Self {
        if !self.pipelines.contains(&pipeline) {
            self.pipelines.push(pipeline);
        }
        self
    }

    /// Run the executor, if any.
    pub fn execute(&self, recorder: &mut dyn CommandRecorder, frame_index: usize) {
        if let Some(executor) = &self.executor {
            executor(recorder, frame_index);
        }
    }

    /// A pass that touches no resource does no observable work.
    pub fn is_lonely(&self) -> bool {
        self.texture_writes.is_empty()
            && self.texture_reads.is_empty()
            && self.buffer_writes.is_empty()
            && self.buffer_reads.is_empty()
    }

    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.texture_reads.contains(&resource)
            || self.buffer_reads.iter().any(|a| a.buffer == resource)
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.texture_writes.iter().any(|w| w.texture == resource)
            || self.buffer_writes.iter().any(|a| a.buffer == resource)
    }

    /// Every resource this pass reads, textures first.
    pub fn read_resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.texture_reads
            .iter()
            .copied()
            .chain(self.buffer_reads.iter().map(|a| a.buffer))
    }

    /// Every resource this pass writes, textures first.
    pub fn written_resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.texture_writes
            .iter()
            .map(|w| w.texture)
            .chain(self.buffer_writes.iter().map(|a| a.buffer))
    }

    pub fn texture_writes(&self) -> &[TextureWrite] {
        &self.texture_writes
    }

    pub fn texture_reads(&self) -> &[ResourceId] {
        &self.texture_reads
    }

    pub fn buffer_writes(&self) -> &[BufferAccess] {
        &self.buffer_writes
    }

    pub fn buffer_reads(&self) -> &[BufferAccess] {
        &self.buffer_reads
    }

    pub fn pipelines(&self) -> &[PipelineHandle] {
        &self.pipelines
    }

    pub fn render_pass(&self) -> Option<RenderPassHandle> {
        self.render_pass
    }

    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    pub fn dimensions(&self) -> PassDimensions {
        self.dimensions
    }

    pub fn pre_barrier(&self) -> &Barrier {
        &self.pre_barrier
    }

    pub fn post_barrier(&self) -> &Barrier {
        &self.post_barrier
    }

    /// Load/store ops per entry of [`Pass::texture_writes`], set by barrier synthesis.
    pub fn attachment_ops(&self) -> &[AttachmentOps] {
        &self.attachment_ops
    }

    /// How many times GPU objects were (re)built for this pass.
    pub fn build_count(&self) -> u32 {
        self.build_count
    }
}
