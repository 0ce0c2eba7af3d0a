//! Barrier synthesis
//!
//! Walks passes in compiled order while tracking the last known state of each
//! resource. A write hands the resource off in its post-barrier; a read
//! transitions into shader-read state in its pre-barrier and back in its
//! post-barrier, so the next writer finds the layout it left behind.

use std::collections::{HashMap, HashSet};

use crate::backend::traits::{BufferHandle, TextureHandle};
use crate::backend::types::{LoadOp, StoreOp};
use crate::render_graph::pass::Pass;
use crate::render_graph::resource::{ResourceId, ResourceRegistry};
use crate::render_graph::sync::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureTransition {
    pub resource: ResourceId,
    pub texture: Option<TextureHandle>,
    pub src: TextureState,
    pub dst: TextureState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTransition {
    pub resource: ResourceId,
    pub buffer: Option<BufferHandle>,
    pub src: BufferState,
    pub dst: BufferState,
}

/// One pipeline barrier: aggregated stage/access masks plus per-resource transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barrier {
    pub src_stage: PipelineStages,
    pub dst_stage: PipelineStages,
    pub src_access: Access,
    pub dst_access: Access,
    pub textures: Vec<TextureTransition>,
    pub buffers: Vec<BufferTransition>,
}

impl Default for Barrier {
    fn default() -> Self {
        Self {
            src_stage: PipelineStages::empty(),
            dst_stage: PipelineStages::empty(),
            src_access: Access::empty(),
            dst_access: Access::empty(),
            textures: Vec::new(),
            buffers: Vec::new(),
        }
    }
}

impl Barrier {
    /// A barrier is only issued when it carries at least one transition.
    pub fn is_enabled(&self) -> bool {
        !self.textures.is_empty() || !self.buffers.is_empty()
    }

    pub fn push_texture(&mut self, transition: TextureTransition) {
        self.src_stage |= transition.src.stage;
        self.dst_stage |= transition.dst.stage;
        self.src_access |= transition.src.access;
        self.dst_access |= transition.dst.access;
        self.textures.push(transition);
    }

    pub fn push_buffer(&mut self, transition: BufferTransition) {
        self.src_stage |= transition.src.stage;
        self.dst_stage |= transition.dst.stage;
        self.src_access |= transition.src.access;
        self.dst_access |= transition.dst.access;
        self.buffers.push(transition);
    }

    pub fn texture_transition(&self, resource: ResourceId) -> Option<&TextureTransition> {
        self.textures.iter().find(|t| t.resource == resource)
    }

    pub fn buffer_transition(&self, resource: ResourceId) -> Option<&BufferTransition> {
        self.buffers.iter().find(|t| t.resource == resource)
    }
}

/// Load and store operation of one written attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentOps {
    pub load: LoadOp,
    pub store: StoreOp,
}

/// Tracks resource states across a compiled pass list
pub(crate) struct BarrierBuilder<'a> {
    registry: &'a ResourceRegistry,
    textures: HashMap<ResourceId, TextureState>,
    buffers: HashMap<ResourceId, BufferState>,
    written: HashSet<ResourceId>,
}

impl<'a> BarrierBuilder<'a> {
    pub fn new(registry: &'a ResourceRegistry) -> Self {
        Self {
            registry,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            written: HashSet::new(),
        }
    }

    fn texture_transition(
        &self,
        resource: ResourceId,
        src: TextureState,
        dst: TextureState,
    ) -> TextureTransition {
        TextureTransition {
            resource,
            texture: self.registry.texture(resource),
            src,
            dst,
        }
    }

    fn buffer_transition(
        &self,
        resource: ResourceId,
        src: BufferState,
        dst: BufferState,
    ) -> BufferTransition {
        BufferTransition {
            resource,
            buffer: self.registry.buffer(resource),
            src,
            dst,
        }
    }

    /// Compute barriers and attachment ops for the next pass in execution order.
    pub fn process(&mut self, pass: &mut Pass) {
        let kind = pass.kind();
        let mut pre = Barrier::default();
        let mut post = Barrier::default();

        for &texture in pass.texture_reads() {
            let root = self.registry.root(texture);
            if pass
                .texture_writes()
                .iter()
                .any(|w| self.registry.root(w.texture) == root)
            {
                log::warn!(
                    "Pass '{}' reads and writes '{}' in the same pass",
                    pass.name(),
                    self.registry.name(texture)
                );
            }
            let current = self.textures.get(&root).copied().unwrap_or_default();
            let required = texture_read_state(kind);
            pre.push_texture(self.texture_transition(texture, current, required));
            post.push_texture(self.texture_transition(texture, required, current));
        }

        for read in pass.buffer_reads() {
            let current = self.buffers.get(&read.buffer).copied().unwrap_or_default();
            let required = buffer_read_state(kind, read.usage);
            pre.push_buffer(self.buffer_transition(read.buffer, current, required));
            post.push_buffer(self.buffer_transition(read.buffer, required, current));
        }

        let mut ops = Vec::with_capacity(pass.texture_writes().len());
        for write in pass.texture_writes() {
            let root = self.registry.root(write.texture);
            let current = self.textures.get(&root).copied().unwrap_or_default();
            let required = texture_write_state(kind, write.attachment);
            post.push_texture(self.texture_transition(write.texture, current, required));
            self.textures.insert(root, required);

            let load = if self.written.insert(root) {
                LoadOp::Clear
            } else {
                LoadOp::Load
            };
            ops.push(AttachmentOps {
                load,
                store: StoreOp::Store,
            });
        }

        for write in pass.buffer_writes() {
            let Some(required) = buffer_write_state(kind, write.usage) else {
                unreachable!("buffer write usage is validated when declared");
            };
            let current = self.buffers.get(&write.buffer).copied().unwrap_or_default();
            post.push_buffer(self.buffer_transition(write.buffer, current, required));
            self.buffers.insert(write.buffer, required);
        }

        pass.pre_barrier = pre;
        pass.post_barrier = post;
        pass.attachment_ops = ops;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{BufferDescriptor, BufferUsage, ClearValue, TextureDescriptor};

    fn registry_with(textures: usize, buffers: usize) -> ResourceRegistry {
        let mut registry = ResourceRegistry::new();
        for _ in 0..textures {
            registry.declare(TextureDescriptor::default());
        }
        for _ in 0..buffers {
            registry.declare_buffer(BufferDescriptor::default());
        }
        registry
    }

    #[test]
    fn test_write_read_write_round_trip() {
        let registry = registry_with(1, 0);
        let texture = ResourceId(0);
        let mut first = Pass::new("first", PassKind::Graphics);
        first.write(texture, AttachmentKind::Color, ClearValue::BLACK);
        let mut reader = Pass::new("reader", PassKind::Graphics);
        reader.read(texture);
        let mut second = Pass::new("second", PassKind::Graphics);
        second.write(texture, AttachmentKind::Color, ClearValue::BLACK);

        let mut builder = BarrierBuilder::new(&registry);
        builder.process(&mut first);
        builder.process(&mut reader);
        builder.process(&mut second);

        let produced = first.post_barrier().texture_transition(texture).unwrap().dst;
        assert_eq!(produced.layout, ImageLayout::ColorAttachmentOptimal);

        let consume = reader.pre_barrier().texture_transition(texture).unwrap();
        assert_eq!(consume.src, produced);
        assert_eq!(consume.dst, texture_read_state(PassKind::Graphics));

        let restore = reader.post_barrier().texture_transition(texture).unwrap();
        assert_eq!(restore.src, consume.dst);
        assert_eq!(restore.dst, produced);

        let rewrite = second.post_barrier().texture_transition(texture).unwrap();
        assert_eq!(rewrite.src, produced);
        assert!(!first.pre_barrier().is_enabled());
    }

    #[test]
    fn test_first_write_clears_later_writes_load() {
        let registry = registry_with(2, 0);
        let mut a = Pass::new("a", PassKind::Graphics);
        a.write(ResourceId(0), AttachmentKind::Color, ClearValue::BLACK);
        let mut b = Pass::new("b", PassKind::Graphics);
        b.write(ResourceId(0), AttachmentKind::Color, ClearValue::BLACK)
            .write(ResourceId(1), AttachmentKind::Depth, ClearValue::DEPTH_ONE);

        let mut builder = BarrierBuilder::new(&registry);
        builder.process(&mut a);
        builder.process(&mut b);

        assert_eq!(a.attachment_ops()[0].load, LoadOp::Clear);
        assert_eq!(b.attachment_ops()[0].load, LoadOp::Load);
        assert_eq!(b.attachment_ops()[1].load, LoadOp::Clear);
        assert!(b
            .attachment_ops()
            .iter()
            .all(|ops| ops.store == StoreOp::Store));
    }

    #[test]
    fn test_first_write_starts_from_undefined() {
        let registry = registry_with(1, 0);
        let mut pass = Pass::new("clear", PassKind::Compute);
        pass.write(ResourceId(0), AttachmentKind::Storage, ClearValue::default());

        BarrierBuilder::new(&registry).process(&mut pass);
        let transition = pass.post_barrier().texture_transition(ResourceId(0)).unwrap();
        assert_eq!(transition.src, TextureState::UNDEFINED);
        assert_eq!(transition.dst.layout, ImageLayout::General);
        assert_eq!(pass.post_barrier().src_stage, PipelineStages::TOP_OF_PIPE);
        assert_eq!(pass.post_barrier().dst_stage, PipelineStages::COMPUTE_SHADER);
    }

    #[test]
    fn test_buffer_read_uses_combined_usage() {
        let registry = registry_with(0, 1);
        let buffer = ResourceId(0);
        let mut producer = Pass::new("cull", PassKind::Compute);
        producer.write_buffer(buffer, BufferUsage::STORAGE).unwrap();
        let mut consumer = Pass::new("draw", PassKind::Graphics);
        consumer.read_buffer(buffer, BufferUsage::INDIRECT | BufferUsage::VERTEX);

        let mut builder = BarrierBuilder::new(&registry);
        builder.process(&mut producer);
        builder.process(&mut consumer);

        let written = producer.post_barrier().buffer_transition(buffer).unwrap().dst;
        assert_eq!(written.access, Access::SHADER_WRITE);

        let read = consumer.pre_barrier().buffer_transition(buffer).unwrap();
        assert_eq!(read.src, written);
        assert_eq!(
            read.dst.stage,
            PipelineStages::DRAW_INDIRECT | PipelineStages::VERTEX_INPUT
        );
        assert_eq!(
            consumer.pre_barrier().dst_access,
            Access::INDIRECT_COMMAND_READ | Access::VERTEX_ATTRIBUTE_READ
        );
    }

    #[test]
    fn test_view_read_sees_base_write() {
        let mut registry = registry_with(1, 0);
        let base = ResourceId(0);
        let mip = registry.declare_view(base, 0..1, 0..1);
        let mut writer = Pass::new("downsample", PassKind::Compute);
        writer.write(base, AttachmentKind::Storage, ClearValue::default());
        let mut reader = Pass::new("bloom", PassKind::Graphics);
        reader.read(mip);
        let mut accumulate = Pass::new("accumulate", PassKind::Graphics);
        accumulate.write(mip, AttachmentKind::Color, ClearValue::BLACK);

        let mut builder = BarrierBuilder::new(&registry);
        builder.process(&mut writer);
        builder.process(&mut reader);
        builder.process(&mut accumulate);

        let consume = reader.pre_barrier().texture_transition(mip).unwrap();
        assert_eq!(consume.src.layout, ImageLayout::General);
        assert!(reader.pre_barrier().texture_transition(base).is_none());
        assert_eq!(
            accumulate.post_barrier().texture_transition(mip).unwrap().src.layout,
            ImageLayout::General
        );
        assert_eq!(accumulate.attachment_ops()[0].load, LoadOp::Load);
    }

    #[test]
    fn test_empty_barriers_are_disabled() {
        let registry = registry_with(1, 0);
        let mut pass = Pass::new("writer", PassKind::Graphics);
        pass.write(ResourceId(0), AttachmentKind::Color, ClearValue::BLACK);

        BarrierBuilder::new(&registry).process(&mut pass);
        assert!(!pass.pre_barrier().is_enabled());
        assert!(pass.post_barrier().is_enabled());
        assert_eq!(pass.post_barrier().textures.len(), 1);
    }
}
