//! Synchronization requirements of pass accesses
//!
//! Pure lookup functions mapping how a pass touches a resource to the
//! pipeline stage, access mask and image layout that access requires. Barrier
//! synthesis only ever transitions between states produced here.

use bitflags::bitflags;

use crate::backend::types::BufferUsage;

/// Kind of work a pass records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Graphics,
    Compute,
}

/// How a pass writes a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Color,
    Depth,
    Resolve,
    /// Shader storage write, not bound to the render pass
    Storage,
}

bitflags! {
    /// Pipeline stages that produce or consume a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
    }
}

bitflags! {
    /// Memory access types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const COLOR_ATTACHMENT_WRITE = 1 << 5;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 6;
    }
}

/// Memory layout a texture must be in for an access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents undefined; valid only as a transition source.
    #[default]
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    ShaderReadOnlyOptimal,
}

/// Stage, access and layout a texture is used with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureState {
    pub stage: PipelineStages,
    pub access: Access,
    pub layout: ImageLayout,
}

impl TextureState {
    /// State of a texture nothing has touched yet.
    pub const UNDEFINED: Self = Self {
        stage: PipelineStages::TOP_OF_PIPE,
        access: Access::empty(),
        layout: ImageLayout::Undefined,
    };

    pub const fn new(stage: PipelineStages, access: Access, layout: ImageLayout) -> Self {
        Self {
            stage,
            access,
            layout,
        }
    }
}

impl Default for TextureState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Stage and access a buffer is used with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferState {
    pub stage: PipelineStages,
    pub access: Access,
}

impl BufferState {
    pub const UNDEFINED: Self = Self {
        stage: PipelineStages::TOP_OF_PIPE,
        access: Access::empty(),
    };

    pub const fn new(stage: PipelineStages, access: Access) -> Self {
        Self { stage, access }
    }
}

impl Default for BufferState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Stage a pass of this kind samples textures in.
fn texture_shader_stage(kind: PassKind) -> PipelineStages {
    match kind {
        PassKind::Graphics => PipelineStages::FRAGMENT_SHADER,
        PassKind::Compute => PipelineStages::COMPUTE_SHADER,
    }
}

/// Stages a pass of this kind accesses uniform and storage buffers in.
fn buffer_shader_stage(kind: PassKind) -> PipelineStages {
    match kind {
        PassKind::Graphics => PipelineStages::VERTEX_SHADER | PipelineStages::FRAGMENT_SHADER,
        PassKind::Compute => PipelineStages::COMPUTE_SHADER,
    }
}

/// Required state for a pass writing a texture.
pub fn texture_write_state(kind: PassKind, attachment: AttachmentKind) -> TextureState {
    match (kind, attachment) {
        (PassKind::Compute, _) => TextureState::new(
            PipelineStages::COMPUTE_SHADER,
            Access::SHADER_WRITE,
            ImageLayout::General,
        ),
        (PassKind::Graphics, AttachmentKind::Color | AttachmentKind::Resolve) => {
            TextureState::new(
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                Access::COLOR_ATTACHMENT_WRITE,
                ImageLayout::ColorAttachmentOptimal,
            )
        }
        (PassKind::Graphics, AttachmentKind::Depth) => TextureState::new(
            PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS,
            Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ImageLayout::DepthStencilAttachmentOptimal,
        ),
        (PassKind::Graphics, AttachmentKind::Storage) => TextureState::new(
            PipelineStages::FRAGMENT_SHADER,
            Access::SHADER_WRITE,
            ImageLayout::General,
        ),
    }
}

/// Required state for a pass sampling a texture.
pub fn texture_read_state(kind: PassKind) -> TextureState {
    TextureState::new(
        texture_shader_stage(kind),
        Access::SHADER_READ,
        ImageLayout::ShaderReadOnlyOptimal,
    )
}

/// Required state for a pass writing a buffer.
///
/// Returns `None` unless `usage` is exactly `UNIFORM` or `STORAGE`.
pub fn buffer_write_state(kind: PassKind, usage: BufferUsage) -> Option<BufferState> {
    if usage == BufferUsage::UNIFORM || usage == BufferUsage::STORAGE {
        Some(BufferState::new(
            buffer_shader_stage(kind),
            Access::SHADER_WRITE,
        ))
    } else {
        None
    }
}

/// Required state for a pass reading a buffer with every usage in `usages`.
pub fn buffer_read_state(kind: PassKind, usages: BufferUsage) -> BufferState {
    let mut state = BufferState::new(PipelineStages::empty(), Access::empty());

    for usage in usages.iter() {
        let (stage, access) = if usage == BufferUsage::VERTEX {
            (PipelineStages::VERTEX_INPUT, Access::VERTEX_ATTRIBUTE_READ)
        } else if usage == BufferUsage::INDEX {
            (PipelineStages::VERTEX_INPUT, Access::INDEX_READ)
        } else if usage == BufferUsage::INDIRECT {
            (PipelineStages::DRAW_INDIRECT, Access::INDIRECT_COMMAND_READ)
        } else {
            (buffer_shader_stage(kind), Access::SHADER_READ)
        };
        state.stage |= stage;
        state.access |= access;
    }

    state
}

#[cfg(feature = "vulkan")]
mod vk_mapping {
    use super::*;
    use ash::vk;

    impl PipelineStages {
        pub fn to_vk(self) -> vk::PipelineStageFlags {
            const TABLE: [(PipelineStages, vk::PipelineStageFlags); 9] = [
                (PipelineStages::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
                (PipelineStages::DRAW_INDIRECT, vk::PipelineStageFlags::DRAW_INDIRECT),
                (PipelineStages::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
                (PipelineStages::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
                (PipelineStages::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
                (
                    PipelineStages::EARLY_FRAGMENT_TESTS,
                    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                ),
                (
                    PipelineStages::LATE_FRAGMENT_TESTS,
                    vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                ),
                (
                    PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                ),
                (PipelineStages::COMPUTE_SHADER, vk::PipelineStageFlags::COMPUTE_SHADER),
            ];
            TABLE
                .iter()
                .filter(|(ours, _)| self.contains(*ours))
                .fold(vk::PipelineStageFlags::empty(), |acc, (_, vk)| acc | *vk)
        }
    }

    impl Access {
        pub fn to_vk(self) -> vk::AccessFlags {
            const TABLE: [(Access, vk::AccessFlags); 7] = [
                (Access::INDIRECT_COMMAND_READ, vk::AccessFlags::INDIRECT_COMMAND_READ),
                (Access::INDEX_READ, vk::AccessFlags::INDEX_READ),
                (Access::VERTEX_ATTRIBUTE_READ, vk::AccessFlags::VERTEX_ATTRIBUTE_READ),
                (Access::SHADER_READ, vk::AccessFlags::SHADER_READ),
                (Access::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
                (Access::COLOR_ATTACHMENT_WRITE, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
                (
                    Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
            ];
            TABLE
                .iter()
                .filter(|(ours, _)| self.contains(*ours))
                .fold(vk::AccessFlags::empty(), |acc, (_, vk)| acc | *vk)
        }
    }

    impl ImageLayout {
        pub fn to_vk(self) -> vk::ImageLayout {
            match self {
                ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
                ImageLayout::General => vk::ImageLayout::GENERAL,
                ImageLayout::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ImageLayout::DepthStencilAttachmentOptimal => {
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                }
                ImageLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }
        }
    }
}
