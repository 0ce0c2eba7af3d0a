//! Descriptor types shared between the graph and device implementations

use bitflags::bitflags;

use crate::backend::traits::{BufferHandle, FramebufferHandle, RenderPassHandle, TextureHandle};
use crate::render_graph::sync::ImageLayout;

/// Width and height of a 2D surface in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth24PlusStencil8,
    R32Float,
    Rg32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture can be used as a storage texture.
        const STORAGE_BINDING = 1 << 3;
        /// Texture can be used as a render attachment.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Usage flags for buffers.
    ///
    /// On a pass read several usages may be combined; a pass may only write
    /// a buffer as `UNIFORM` or `STORAGE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be used as an indirect buffer.
        const INDIRECT = 1 << 4;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            layers: 1,
            mip_levels: 1,
            sample_count: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        }
    }
}

impl TextureDescriptor {
    pub fn extent(&self) -> Extent2d {
        Extent2d::new(self.width, self.height)
    }
}

/// A view onto a mip/layer range of an already created texture
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    pub label: Option<String>,
    pub base: TextureHandle,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub base_mip: u32,
    pub mip_levels: u32,
    pub base_layer: u32,
    pub layers: u32,
    /// Extent of `base_mip`
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
}

impl TextureViewDescriptor {
    /// The same view expressed as a plain texture description.
    pub fn as_texture(&self) -> TextureDescriptor {
        TextureDescriptor {
            label: self.label.clone(),
            width: self.width,
            height: self.height,
            layers: self.layers,
            mip_levels: self.mip_levels,
            sample_count: self.sample_count,
            format: self.format,
            usage: self.usage,
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// What happens to an attachment's contents when a render pass begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Clear,
    Load,
}

/// What happens to an attachment's contents when a render pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    Discard,
}

#[cfg(feature = "vulkan")]
impl LoadOp {
    pub fn to_vk(self) -> ash::vk::AttachmentLoadOp {
        match self {
            LoadOp::Clear => ash::vk::AttachmentLoadOp::CLEAR,
            LoadOp::Load => ash::vk::AttachmentLoadOp::LOAD,
        }
    }
}

#[cfg(feature = "vulkan")]
impl StoreOp {
    pub fn to_vk(self) -> ash::vk::AttachmentStoreOp {
        match self {
            StoreOp::Store => ash::vk::AttachmentStoreOp::STORE,
            StoreOp::Discard => ash::vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

/// Clear value supplied when a pass writes an attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    pub const BLACK: Self = ClearValue::Color([0.0, 0.0, 0.0, 1.0]);
    pub const TRANSPARENT: Self = ClearValue::Color([0.0; 4]);
    pub const DEPTH_ONE: Self = ClearValue::DepthStencil {
        depth: 1.0,
        stencil: 0,
    };
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::TRANSPARENT
    }
}

/// One attachment slot of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    pub format: TextureFormat,
    pub sample_count: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

/// Render pass descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<AttachmentDescription>,
    pub depth_attachment: Option<AttachmentDescription>,
    pub resolve_attachment: Option<AttachmentDescription>,
}

impl RenderPassDescriptor {
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len()
            + usize::from(self.depth_attachment.is_some())
            + usize::from(self.resolve_attachment.is_some())
    }
}

/// Framebuffer descriptor
///
/// `attachments` follow the render pass order: colors, then depth, then resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub render_pass: RenderPassHandle,
    pub attachments: Vec<TextureHandle>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

/// Graphics pipeline descriptor
///
/// `render_pass` and `sample_count` are filled in by the graph when the
/// owning pass is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GraphicsPipelineDescriptor {
    pub label: Option<String>,
    pub vertex_shader: String,
    pub fragment_shader: Option<String>,
    pub depth_write: bool,
    pub render_pass: Option<RenderPassHandle>,
    pub sample_count: u32,
}

/// Compute pipeline descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ComputePipelineDescriptor {
    pub label: Option<String>,
    pub shader: String,
    pub entry_point: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineDescriptor {
    Graphics(GraphicsPipelineDescriptor),
    Compute(ComputePipelineDescriptor),
}

impl PipelineDescriptor {
    pub fn label(&self) -> Option<&str> {
        match self {
            PipelineDescriptor::Graphics(desc) => desc.label.as_deref(),
            PipelineDescriptor::Compute(desc) => desc.label.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_extent(extent: Extent2d) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect2d {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2d {
    pub fn from_extent(extent: Extent2d) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Arguments for beginning a render pass on a command recorder
#[derive(Debug, Clone, Copy)]
pub struct RenderPassBegin<'a> {
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    pub extent: Extent2d,
    pub clear_values: &'a [ClearValue],
}

/// The three tables of the bindless descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindlessSet {
    SampledTextures,
    StorageTextures,
    StorageBuffers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindlessResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

/// A single slot update of the bindless table; `resource: None` unbinds the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindlessWrite {
    pub set: BindlessSet,
    pub slot: u32,
    pub resource: Option<BindlessResource>,
}
