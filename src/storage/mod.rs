//! Storage adapter between the render graph and a [`Device`]
//!
//! Owns the device, hands out handles and keeps the bindless table in sync
//! with the textures and buffers it creates.

pub mod bindless;

pub use bindless::*;

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{GraphError, GraphResult};
use crate::StorageConfig;

/// Handle allocator and object registry wrapped around a device
pub struct Storage<D: Device> {
    device: D,
    config: StorageConfig,

    next_texture: u64,
    next_buffer: u64,
    next_render_pass: u64,
    next_framebuffer: u64,
    next_pipeline: u64,

    /// Usage of every texture this storage created
    textures: HashMap<TextureHandle, TextureUsage>,
    buffers: HashMap<BufferHandle, BufferUsage>,
    pipelines: HashMap<PipelineHandle, PipelineDescriptor>,
    bindless: BindlessTable,
}

impl<D: Device> Storage<D> {
    pub fn new(device: D) -> Self {
        Self::with_config(device, StorageConfig::default())
    }

    pub fn with_config(device: D, config: StorageConfig) -> Self {
        Self {
            bindless: BindlessTable::new(&config.bindless),
            device,
            config,
            next_texture: 1,
            next_buffer: 1,
            next_render_pass: 1,
            next_framebuffer: 1,
            next_pipeline: 1,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn bindless(&self) -> &BindlessTable {
        &self.bindless
    }

    fn write_bindless(&mut self, writes: &[BindlessWrite]) {
        for write in writes {
            self.device.write_bindless(write);
        }
    }

    fn bind_texture(&mut self, handle: TextureHandle, usage: TextureUsage) -> GraphResult<()> {
        match self.bindless.bind_texture(handle, usage) {
            Ok(writes) => {
                self.write_bindless(&writes);
                self.textures.insert(handle, usage);
                Ok(())
            }
            Err(err) => {
                self.device.destroy_texture(handle);
                Err(err)
            }
        }
    }

    pub fn create_texture(&mut self, descriptor: &TextureDescriptor) -> GraphResult<TextureHandle> {
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;

        self.device
            .create_texture(handle, descriptor)
            .inspect_err(|err| log::error!("Texture {:?} creation failed: {}", descriptor.label, err))?;
        self.bind_texture(handle, descriptor.usage)?;
        log::trace!(
            "Created texture {:?} ({:?}, {}x{})",
            handle,
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        Ok(handle)
    }

    pub fn create_texture_view(
        &mut self,
        descriptor: &TextureViewDescriptor,
    ) -> GraphResult<TextureHandle> {
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;

        self.device
            .create_texture_view(handle, descriptor)
            .inspect_err(|err| log::error!("View {:?} creation failed: {}", descriptor.label, err))?;
        self.bind_texture(handle, descriptor.usage)?;
        log::trace!("Created texture view {:?} of {:?}", handle, descriptor.base);
        Ok(handle)
    }

    fn check_texture(&self, handle: TextureHandle) -> GraphResult<()> {
        if self.textures.contains_key(&handle) {
            return Ok(());
        }
        log::warn!("Asked to resize texture {:?} which this storage does not own", handle);
        Err(DeviceError::UnknownHandle(format!("{:?}", handle)).into())
    }

    /// Recreate a texture in place with a new description. Its handle and
    /// bindless slots stay the same.
    pub fn resize_texture(
        &mut self,
        handle: TextureHandle,
        descriptor: &TextureDescriptor,
    ) -> GraphResult<()> {
        self.check_texture(handle)?;
        self.device
            .recreate_texture(handle, descriptor)
            .inspect_err(|err| log::error!("Texture {:?} resize failed: {}", handle, err))?;
        let writes = self.bindless.rebind_texture(handle);
        self.write_bindless(&writes);
        log::trace!(
            "Resized texture {:?} to {}x{}",
            handle,
            descriptor.width,
            descriptor.height
        );
        Ok(())
    }

    /// Recreate a view after its base changed.
    pub fn recreate_texture_view(
        &mut self,
        handle: TextureHandle,
        descriptor: &TextureViewDescriptor,
    ) -> GraphResult<()> {
        self.check_texture(handle)?;
        self.device.destroy_texture(handle);
        self.device
            .create_texture_view(handle, descriptor)
            .inspect_err(|err| log::error!("View {:?} recreation failed: {}", handle, err))?;
        let writes = self.bindless.rebind_texture(handle);
        self.write_bindless(&writes);
        log::trace!("Recreated texture view {:?} of {:?}", handle, descriptor.base);
        Ok(())
    }

    pub fn destroy_texture(&mut self, handle: TextureHandle) {
        let writes = self.bindless.unbind_texture(handle);
        self.write_bindless(&writes);
        self.textures.remove(&handle);
        self.device.destroy_texture(handle);
        log::trace!("Destroyed texture {:?}", handle);
    }

    pub fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> GraphResult<BufferHandle> {
        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;

        self.device
            .create_buffer(handle, descriptor)
            .inspect_err(|err| log::error!("Buffer {:?} creation failed: {}", descriptor.label, err))?;
        match self.bindless.bind_buffer(handle, descriptor.usage) {
            Ok(write) => {
                if let Some(write) = write {
                    self.device.write_bindless(&write);
                }
            }
            Err(err) => {
                self.device.destroy_buffer(handle);
                return Err(err);
            }
        }
        self.buffers.insert(handle, descriptor.usage);
        log::trace!(
            "Created buffer {:?} ({:?}, {} bytes)",
            handle,
            descriptor.label,
            descriptor.size
        );
        Ok(handle)
    }

    pub fn destroy_buffer(&mut self, handle: BufferHandle) {
        if let Some(write) = self.bindless.unbind_buffer(handle) {
            self.device.write_bindless(&write);
        }
        self.buffers.remove(&handle);
        self.device.destroy_buffer(handle);
        log::trace!("Destroyed buffer {:?}", handle);
    }

    pub fn create_render_pass(
        &mut self,
        descriptor: &RenderPassDescriptor,
    ) -> GraphResult<RenderPassHandle> {
        let handle = RenderPassHandle(self.next_render_pass);
        self.next_render_pass += 1;
        self.device
            .create_render_pass(handle, descriptor)
            .inspect_err(|err| log::error!("Render pass {:?} creation failed: {}", descriptor.label, err))?;
        log::trace!(
            "Created render pass {:?} ({:?}, {} attachments)",
            handle,
            descriptor.label,
            descriptor.attachment_count()
        );
        Ok(handle)
    }

    pub fn destroy_render_pass(&mut self, handle: RenderPassHandle) {
        self.device.destroy_render_pass(handle);
        log::trace!("Destroyed render pass {:?}", handle);
    }

    pub fn create_framebuffer(
        &mut self,
        descriptor: &FramebufferDescriptor,
    ) -> GraphResult<FramebufferHandle> {
        let handle = FramebufferHandle(self.next_framebuffer);
        self.next_framebuffer += 1;
        self.device
            .create_framebuffer(handle, descriptor)
            .inspect_err(|err| log::error!("Framebuffer {:?} creation failed: {}", descriptor.label, err))?;
        log::trace!(
            "Created framebuffer {:?} ({}x{}x{})",
            handle,
            descriptor.width,
            descriptor.height,
            descriptor.layers
        );
        Ok(handle)
    }

    pub fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        self.device.destroy_framebuffer(handle);
        log::trace!("Destroyed framebuffer {:?}", handle);
    }

    /// Register a pipeline description; the device object is created when a
    /// pass using it is built.
    pub fn register_pipeline(&mut self, descriptor: PipelineDescriptor) -> PipelineHandle {
        let handle = PipelineHandle(self.next_pipeline);
        self.next_pipeline += 1;
        log::trace!("Registered pipeline {:?} ({:?})", handle, descriptor.label());
        self.pipelines.insert(handle, descriptor);
        handle
    }

    pub fn pipeline_descriptor(&self, handle: PipelineHandle) -> Option<&PipelineDescriptor> {
        self.pipelines.get(&handle)
    }

    /// (Re)create a registered pipeline. Graphics pipelines are bound to the
    /// given render pass and sample count.
    pub fn build_pipeline(
        &mut self,
        handle: PipelineHandle,
        render_pass: Option<RenderPassHandle>,
        sample_count: u32,
    ) -> GraphResult<()> {
        let Some(registered) = self.pipelines.get(&handle) else {
            log::error!("Pipeline {:?} was never registered", handle);
            return Err(GraphError::UnknownPipeline(handle));
        };
        let mut descriptor = registered.clone();
        if let PipelineDescriptor::Graphics(graphics) = &mut descriptor {
            graphics.render_pass = render_pass;
            graphics.sample_count = sample_count;
        }

        if self.device.has_pipeline(handle) {
            self.device.destroy_pipeline(handle);
        }
        self.device
            .create_pipeline(handle, &descriptor)
            .inspect_err(|err| log::error!("Pipeline {:?} creation failed: {}", descriptor.label(), err))?;
        log::trace!("Built pipeline {:?} ({:?})", handle, descriptor.label());
        Ok(())
    }

    /// Destroy the device object of a pipeline. The registration is kept.
    pub fn destroy_pipeline(&mut self, handle: PipelineHandle) {
        if self.device.has_pipeline(handle) {
            self.device.destroy_pipeline(handle);
            log::trace!("Destroyed pipeline {:?}", handle);
        }
    }

    pub fn bindless_texture_slot(&self, texture: TextureHandle, set: BindlessSet) -> Option<u32> {
        self.bindless.texture_slot(texture, set)
    }

    pub fn bindless_buffer_slot(&self, buffer: BufferHandle) -> Option<u32> {
        self.bindless.buffer_slot(buffer)
    }
}
