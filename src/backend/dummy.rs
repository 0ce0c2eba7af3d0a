//! Dummy device for tests and headless use
//!
//! Keeps every object description in memory and counts how often each handle
//! was created or recreated, so callers can check that a rebuild did (or did
//! not) touch the device.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::barrier::Barrier;

/// Any object a [`DummyDevice`] can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceObject {
    Texture(TextureHandle),
    Buffer(BufferHandle),
    RenderPass(RenderPassHandle),
    Framebuffer(FramebufferHandle),
    Pipeline(PipelineHandle),
}

/// In-memory device implementation
#[derive(Debug)]
pub struct DummyDevice {
    output_extent: Extent2d,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    /// Base texture of every live view
    views: HashMap<TextureHandle, TextureHandle>,
    buffers: HashMap<BufferHandle, BufferDescriptor>,
    render_passes: HashMap<RenderPassHandle, RenderPassDescriptor>,
    framebuffers: HashMap<FramebufferHandle, FramebufferDescriptor>,
    pipelines: HashMap<PipelineHandle, PipelineDescriptor>,
    bindless: HashMap<(BindlessSet, u32), BindlessResource>,
    touches: HashMap<DeviceObject, u32>,
    fail_texture_creation: bool,
    fail_buffer_creation: bool,
    fail_render_pass_creation: bool,
    /// Bytes all live buffers may occupy together
    buffer_budget: Option<u64>,
    lost: bool,
}

impl DummyDevice {
    pub fn new(output_extent: Extent2d) -> Self {
        log::trace!("Created dummy device with output {:?}", output_extent);
        Self {
            output_extent,
            textures: HashMap::new(),
            views: HashMap::new(),
            buffers: HashMap::new(),
            render_passes: HashMap::new(),
            framebuffers: HashMap::new(),
            pipelines: HashMap::new(),
            bindless: HashMap::new(),
            touches: HashMap::new(),
            fail_texture_creation: false,
            fail_buffer_creation: false,
            fail_render_pass_creation: false,
            buffer_budget: None,
            lost: false,
        }
    }

    fn touch(&mut self, object: DeviceObject) {
        *self.touches.entry(object).or_insert(0) += 1;
    }

    fn check_alive(&self) -> DeviceResult<()> {
        if self.lost {
            Err(DeviceError::DeviceLost)
        } else {
            Ok(())
        }
    }

    /// Simulate a window resize.
    pub fn set_output_extent(&mut self, extent: Extent2d) {
        self.output_extent = extent;
    }

    /// Make every following texture or view creation fail.
    pub fn set_fail_texture_creation(&mut self, fail: bool) {
        self.fail_texture_creation = fail;
    }

    pub fn set_fail_buffer_creation(&mut self, fail: bool) {
        self.fail_buffer_creation = fail;
    }

    pub fn set_fail_render_pass_creation(&mut self, fail: bool) {
        self.fail_render_pass_creation = fail;
    }

    /// Limit the total size of live buffers; `None` removes the limit.
    pub fn set_buffer_budget(&mut self, bytes: Option<u64>) {
        self.buffer_budget = bytes;
    }

    /// Every following create or recreate call fails with `DeviceLost`.
    pub fn lose_device(&mut self) {
        log::warn!("dummy: device lost");
        self.lost = true;
    }

    /// How many times `object` was created or recreated.
    pub fn touch_count(&self, object: DeviceObject) -> u32 {
        self.touches.get(&object).copied().unwrap_or(0)
    }

    /// Sum of all create and recreate calls so far.
    pub fn total_touches(&self) -> u32 {
        self.touches.values().sum()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_render_pass_count(&self) -> usize {
        self.render_passes.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn view_base(&self, view: TextureHandle) -> Option<TextureHandle> {
        self.views.get(&view).copied()
    }

    pub fn render_pass_descriptor(&self, handle: RenderPassHandle) -> Option<&RenderPassDescriptor> {
        self.render_passes.get(&handle)
    }

    pub fn framebuffer_descriptor(&self, handle: FramebufferHandle) -> Option<&FramebufferDescriptor> {
        self.framebuffers.get(&handle)
    }

    pub fn pipeline_descriptor(&self, handle: PipelineHandle) -> Option<&PipelineDescriptor> {
        self.pipelines.get(&handle)
    }

    pub fn bindless_entry(&self, set: BindlessSet, slot: u32) -> Option<BindlessResource> {
        self.bindless.get(&(set, slot)).copied()
    }
}

impl Device for DummyDevice {
    fn create_texture(
        &mut self,
        handle: TextureHandle,
        descriptor: &TextureDescriptor,
    ) -> DeviceResult<()> {
        self.check_alive()?;
        if self.fail_texture_creation {
            return Err(DeviceError::TextureCreationFailed(format!(
                "{:?} rejected by dummy device",
                descriptor.label
            )));
        }
        log::trace!("dummy: create texture {:?} {:?}", handle, descriptor.label);
        self.textures.insert(handle, descriptor.clone());
        self.touch(DeviceObject::Texture(handle));
        Ok(())
    }

    fn create_texture_view(
        &mut self,
        handle: TextureHandle,
        descriptor: &TextureViewDescriptor,
    ) -> DeviceResult<()> {
        self.check_alive()?;
        if self.fail_texture_creation {
            return Err(DeviceError::TextureCreationFailed(format!(
                "{:?} rejected by dummy device",
                descriptor.label
            )));
        }
        if !self.textures.contains_key(&descriptor.base) {
            return Err(DeviceError::UnknownHandle(format!(
                "view base {:?}",
                descriptor.base
            )));
        }
        log::trace!("dummy: create view {:?} of {:?}", handle, descriptor.base);
        self.textures.insert(handle, descriptor.as_texture());
        self.views.insert(handle, descriptor.base);
        self.touch(DeviceObject::Texture(handle));
        Ok(())
    }

    fn recreate_texture(
        &mut self,
        handle: TextureHandle,
        descriptor: &TextureDescriptor,
    ) -> DeviceResult<()> {
        self.check_alive()?;
        let Some(texture) = self.textures.get_mut(&handle) else {
            return Err(DeviceError::UnknownHandle(format!("{:?}", handle)));
        };
        log::trace!(
            "dummy: recreate texture {:?} at {}x{}",
            handle,
            descriptor.width,
            descriptor.height
        );
        *texture = descriptor.clone();
        self.touch(DeviceObject::Texture(handle));
        Ok(())
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        log::trace!("dummy: destroy texture {:?}", handle);
        self.textures.remove(&handle);
        self.views.remove(&handle);
    }

    fn texture_descriptor(&self, handle: TextureHandle) -> Option<TextureDescriptor> {
        self.textures.get(&handle).cloned()
    }

    fn create_buffer(
        &mut self,
        handle: BufferHandle,
        descriptor: &BufferDescriptor,
    ) -> DeviceResult<()> {
        self.check_alive()?;
        if self.fail_buffer_creation {
            return Err(DeviceError::BufferCreationFailed(format!(
                "{:?} rejected by dummy device",
                descriptor.label
            )));
        }
        if let Some(budget) = self.buffer_budget {
            let used: u64 = self.buffers.values().map(|b| b.size).sum();
            if used + descriptor.size > budget {
                return Err(DeviceError::OutOfMemory);
            }
        }
        log::trace!("dummy: create buffer {:?} ({} bytes)", handle, descriptor.size);
        self.buffers.insert(handle, descriptor.clone());
        self.touch(DeviceObject::Buffer(handle));
        Ok(())
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        log::trace!("dummy: destroy buffer {:?}", handle);
        self.buffers.remove(&handle);
    }

    fn create_render_pass(
        &mut self,
        handle: RenderPassHandle,
        descriptor: &RenderPassDescriptor,
    ) -> DeviceResult<()> {
        self.check_alive()?;
        if self.fail_render_pass_creation {
            return Err(DeviceError::RenderPassCreationFailed(format!(
                "{:?} rejected by dummy device",
                descriptor.label
            )));
        }
        log::trace!("dummy: create render pass {:?} {:?}", handle, descriptor.label);
        self.render_passes.insert(handle, descriptor.clone());
        self.touch(DeviceObject::RenderPass(handle));
        Ok(())
    }

    fn destroy_render_pass(&mut self, handle: RenderPassHandle) {
        log::trace!("dummy: destroy render pass {:?}", handle);
        self.render_passes.remove(&handle);
    }

    fn create_framebuffer(
        &mut self,
        handle: FramebufferHandle,
        descriptor: &FramebufferDescriptor,
    ) -> DeviceResult<()> {
        self.check_alive()?;
        if !self.render_passes.contains_key(&descriptor.render_pass) {
            return Err(DeviceError::FramebufferCreationFailed(format!(
                "render pass {:?} does not exist",
                descriptor.render_pass
            )));
        }
        if let Some(missing) = descriptor
            .attachments
            .iter()
            .find(|attachment| !self.textures.contains_key(attachment))
        {
            return Err(DeviceError::FramebufferCreationFailed(format!(
                "attachment {:?} does not exist",
                missing
            )));
        }
        log::trace!("dummy: create framebuffer {:?} {:?}", handle, descriptor.label);
        self.framebuffers.insert(handle, descriptor.clone());
        self.touch(DeviceObject::Framebuffer(handle));
        Ok(())
    }

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        log::trace!("dummy: destroy framebuffer {:?}", handle);
        self.framebuffers.remove(&handle);
    }

    fn create_pipeline(
        &mut self,
        handle: PipelineHandle,
        descriptor: &PipelineDescriptor,
    ) -> DeviceResult<()> {
        self.check_alive()?;
        if let PipelineDescriptor::Graphics(graphics) = descriptor {
            let Some(render_pass) = graphics.render_pass else {
                return Err(DeviceError::PipelineCreationFailed(format!(
                    "graphics pipeline {:?} has no render pass",
                    graphics.label
                )));
            };
            if !self.render_passes.contains_key(&render_pass) {
                return Err(DeviceError::PipelineCreationFailed(format!(
                    "render pass {:?} does not exist",
                    render_pass
                )));
            }
        }
        log::trace!("dummy: create pipeline {:?} {:?}", handle, descriptor.label());
        self.pipelines.insert(handle, descriptor.clone());
        self.touch(DeviceObject::Pipeline(handle));
        Ok(())
    }

    fn destroy_pipeline(&mut self, handle: PipelineHandle) {
        log::trace!("dummy: destroy pipeline {:?}", handle);
        self.pipelines.remove(&handle);
    }

    fn has_pipeline(&self, handle: PipelineHandle) -> bool {
        self.pipelines.contains_key(&handle)
    }

    fn write_bindless(&mut self, write: &BindlessWrite) {
        log::trace!(
            "dummy: bindless {:?}[{}] = {:?}",
            write.set,
            write.slot,
            write.resource
        );
        match write.resource {
            Some(resource) => {
                self.bindless.insert((write.set, write.slot), resource);
            }
            None => {
                self.bindless.remove(&(write.set, write.slot));
            }
        }
    }

    fn output_extent(&self) -> Extent2d {
        self.output_extent
    }
}

/// A command captured by [`CommandLog`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    PipelineBarrier(Barrier),
    BeginRenderPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2d,
        clear_values: Vec<ClearValue>,
    },
    SetViewport(Viewport),
    SetScissor(Rect2d),
    EndRenderPass,
    BindPipeline(PipelineHandle),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

/// Command recorder that keeps every call in order
#[derive(Debug, Default)]
pub struct CommandLog {
    commands: Vec<RecordedCommand>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn barrier_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCommand::PipelineBarrier(_)))
    }

    pub fn render_pass_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCommand::BeginRenderPass { .. }))
    }

    pub fn draw_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCommand::Draw { .. }))
    }

    pub fn dispatch_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCommand::Dispatch { .. }))
    }

    fn count(&self, predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }
}

impl CommandRecorder for CommandLog {
    fn pipeline_barrier(&mut self, barrier: &Barrier) {
        self.commands
            .push(RecordedCommand::PipelineBarrier(barrier.clone()));
    }

    fn begin_render_pass(&mut self, begin: &RenderPassBegin<'_>) {
        self.commands.push(RecordedCommand::BeginRenderPass {
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            extent: begin.extent,
            clear_values: begin.clear_values.to_vec(),
        });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(RecordedCommand::SetViewport(viewport));
    }

    fn set_scissor(&mut self, scissor: Rect2d) {
        self.commands.push(RecordedCommand::SetScissor(scissor));
    }

    fn end_render_pass(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(RecordedCommand::BindPipeline(pipeline));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.commands.push(RecordedCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(RecordedCommand::Dispatch { x, y, z });
    }
}
