//! Virtual resources for the render graph
//!
//! Passes refer to textures and buffers through [`ResourceId`]s handed out by
//! the [`ResourceRegistry`]. Real device objects only exist after the registry
//! is built against a [`Storage`].

use std::fmt;
use std::ops::Range;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::GraphResult;
use crate::storage::Storage;

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Describes texture dimensions that can be relative to the output extent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Absolute size in pixels
    Absolute { width: u32, height: u32 },
    /// Relative to the output extent (1.0 = full size)
    Relative { width_scale: f32, height_scale: f32 },
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::Relative {
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl TextureSize {
    pub fn resolve(&self, output: Extent2d) -> Extent2d {
        match self {
            TextureSize::Absolute { width, height } => Extent2d::new(*width, *height),
            TextureSize::Relative {
                width_scale,
                height_scale,
            } => Extent2d::new(
                (((output.width as f32) * width_scale) as u32).max(1),
                (((output.height as f32) * height_scale) as u32).max(1),
            ),
        }
    }
}

pub type SizeFn = Box<dyn Fn(Extent2d) -> TextureDescriptor>;
pub type ReadyCallback = Box<dyn FnMut(RealResource)>;

/// How a virtual resource gets its real counterpart
pub enum ResourceDescription {
    Texture(TextureDescriptor),
    /// Recomputed from the output extent on every (re)build
    SizedTexture(SizeFn),
    View {
        base: ResourceId,
        mips: Range<u32>,
        layers: Range<u32>,
    },
    Buffer(BufferDescriptor),
    ImportedTexture {
        handle: TextureHandle,
        /// Swapchain-backed: sized by the output, resized by its owner
        follows_output: bool,
    },
    ImportedBuffer(BufferHandle),
}

impl fmt::Debug for ResourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture(desc) => f.debug_tuple("Texture").field(desc).finish(),
            Self::SizedTexture(_) => f.write_str("SizedTexture(..)"),
            Self::View { base, mips, layers } => f
                .debug_struct("View")
                .field("base", base)
                .field("mips", mips)
                .field("layers", layers)
                .finish(),
            Self::Buffer(desc) => f.debug_tuple("Buffer").field(desc).finish(),
            Self::ImportedTexture {
                handle,
                follows_output,
            } => f
                .debug_struct("ImportedTexture")
                .field("handle", handle)
                .field("follows_output", follows_output)
                .finish(),
            Self::ImportedBuffer(handle) => f.debug_tuple("ImportedBuffer").field(handle).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Buffer,
}

/// A realized device object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    /// Created by the graph, destroyed with it
    Transient(RealResource),
    /// Owned by the caller; never created, resized or destroyed by the graph
    Imported(RealResource),
}

impl ResourceState {
    pub fn real(&self) -> Option<RealResource> {
        match self {
            ResourceState::Uninitialized => None,
            ResourceState::Transient(real) | ResourceState::Imported(real) => Some(*real),
        }
    }
}

/// Virtual resource in the render graph
pub struct VirtualResource {
    pub name: String,
    pub description: ResourceDescription,
    pub state: ResourceState,
    ready_callbacks: Vec<ReadyCallback>,
}

impl fmt::Debug for VirtualResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualResource")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("state", &self.state)
            .field("ready_callbacks", &self.ready_callbacks.len())
            .finish()
    }
}

impl VirtualResource {
    pub fn kind(&self) -> ResourceKind {
        match self.description {
            ResourceDescription::Buffer(_) | ResourceDescription::ImportedBuffer(_) => {
                ResourceKind::Buffer
            }
            _ => ResourceKind::Texture,
        }
    }
}

/// Arena of virtual resources addressed by [`ResourceId`]
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<VirtualResource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: String, description: ResourceDescription) -> ResourceId {
        let id = ResourceId(self.resources.len() as u32);
        let state = match description {
            ResourceDescription::ImportedTexture { handle, .. } => {
                ResourceState::Imported(RealResource::Texture(handle))
            }
            ResourceDescription::ImportedBuffer(handle) => {
                ResourceState::Imported(RealResource::Buffer(handle))
            }
            _ => ResourceState::Uninitialized,
        };
        self.resources.push(VirtualResource {
            name,
            description,
            state,
            ready_callbacks: Vec::new(),
        });
        id
    }

    fn default_name(&self, prefix: &str) -> String {
        format!("{prefix}#{}", self.resources.len())
    }

    /// Declare a texture with a fixed description.
    pub fn declare(&mut self, descriptor: TextureDescriptor) -> ResourceId {
        let name = descriptor
            .label
            .clone()
            .unwrap_or_else(|| self.default_name("texture"));
        self.push(name, ResourceDescription::Texture(descriptor))
    }

    /// Declare a texture whose description is derived from the output extent.
    pub fn declare_sized<F>(&mut self, name: &str, size_fn: F) -> ResourceId
    where
        F: Fn(Extent2d) -> TextureDescriptor + 'static,
    {
        self.push(
            name.to_string(),
            ResourceDescription::SizedTexture(Box::new(size_fn)),
        )
    }

    /// Declare a texture using `descriptor` for everything but its size.
    pub fn declare_relative(&mut self, descriptor: TextureDescriptor, size: TextureSize) -> ResourceId {
        let name = descriptor
            .label
            .clone()
            .unwrap_or_else(|| self.default_name("texture"));
        self.declare_sized(&name, move |output| {
            let extent = size.resolve(output);
            TextureDescriptor {
                width: extent.width,
                height: extent.height,
                ..descriptor.clone()
            }
        })
    }

    /// Declare a view onto a mip/layer range of `base`.
    pub fn declare_view(
        &mut self,
        base: ResourceId,
        mips: Range<u32>,
        layers: Range<u32>,
    ) -> ResourceId {
        let base_resource = self.get(base);
        assert_eq!(
            base_resource.kind(),
            ResourceKind::Texture,
            "view base '{}' is not a texture",
            base_resource.name
        );
        assert!(
            !mips.is_empty() && !layers.is_empty(),
            "view of '{}' has an empty mip or layer range",
            base_resource.name
        );
        let name = format!(
            "{}[mip {}..{}, layer {}..{}]",
            base_resource.name, mips.start, mips.end, layers.start, layers.end
        );
        self.push(name, ResourceDescription::View { base, mips, layers })
    }

    pub fn declare_buffer(&mut self, descriptor: BufferDescriptor) -> ResourceId {
        let name = descriptor
            .label
            .clone()
            .unwrap_or_else(|| self.default_name("buffer"));
        self.push(name, ResourceDescription::Buffer(descriptor))
    }

    pub fn import_texture(&mut self, handle: TextureHandle) -> ResourceId {
        let name = format!("imported-texture-{}", handle.raw());
        self.push(
            name,
            ResourceDescription::ImportedTexture {
                handle,
                follows_output: false,
            },
        )
    }

    /// Import the texture backing the primary output.
    pub fn import_swapchain(&mut self, handle: TextureHandle) -> ResourceId {
        self.push(
            "swapchain".to_string(),
            ResourceDescription::ImportedTexture {
                handle,
                follows_output: true,
            },
        )
    }

    pub fn import_buffer(&mut self, handle: BufferHandle) -> ResourceId {
        let name = format!("imported-buffer-{}", handle.raw());
        self.push(name, ResourceDescription::ImportedBuffer(handle))
    }

    /// Register a callback invoked with the real handle once per full rebuild.
    pub fn on_ready<F>(&mut self, id: ResourceId, callback: F)
    where
        F: FnMut(RealResource) + 'static,
    {
        self.get_mut(id).ready_callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        id.index() < self.resources.len()
    }

    pub fn get(&self, id: ResourceId) -> &VirtualResource {
        match self.resources.get(id.index()) {
            Some(resource) => resource,
            None => panic!("unknown render graph resource {:?}", id),
        }
    }

    fn get_mut(&mut self, id: ResourceId) -> &mut VirtualResource {
        match self.resources.get_mut(id.index()) {
            Some(resource) => resource,
            None => panic!("unknown render graph resource {:?}", id),
        }
    }

    pub fn name(&self, id: ResourceId) -> &str {
        &self.get(id).name
    }

    pub fn kind(&self, id: ResourceId) -> ResourceKind {
        self.get(id).kind()
    }

    pub fn state(&self, id: ResourceId) -> ResourceState {
        self.get(id).state
    }

    pub fn is_imported(&self, id: ResourceId) -> bool {
        matches!(
            self.get(id).description,
            ResourceDescription::ImportedTexture { .. } | ResourceDescription::ImportedBuffer(_)
        )
    }

    /// The resource a view ultimately aliases; `id` itself for anything else.
    pub fn root(&self, id: ResourceId) -> ResourceId {
        match &self.get(id).description {
            ResourceDescription::View { base, .. } => self.root(*base),
            _ => id,
        }
    }

    /// Whether the size of `id` depends on the output extent.
    pub fn is_extent_relative(&self, id: ResourceId) -> bool {
        match &self.get(id).description {
            ResourceDescription::SizedTexture(_) => true,
            ResourceDescription::ImportedTexture { follows_output, .. } => *follows_output,
            ResourceDescription::View { base, .. } => self.is_extent_relative(*base),
            _ => false,
        }
    }

    pub fn texture(&self, id: ResourceId) -> Option<TextureHandle> {
        match self.get(id).state.real() {
            Some(RealResource::Texture(handle)) => Some(handle),
            _ => None,
        }
    }

    pub fn buffer(&self, id: ResourceId) -> Option<BufferHandle> {
        match self.get(id).state.real() {
            Some(RealResource::Buffer(handle)) => Some(handle),
            _ => None,
        }
    }

    /// The description `id` has (or would have) at the given output extent.
    pub fn texture_descriptor<D: Device>(
        &self,
        id: ResourceId,
        extent: Extent2d,
        device: &D,
    ) -> Option<TextureDescriptor> {
        match &self.get(id).description {
            ResourceDescription::Texture(desc) => Some(desc.clone()),
            ResourceDescription::SizedTexture(size_fn) => Some(size_fn(extent)),
            ResourceDescription::View { base, mips, layers } => {
                let base_desc = self.texture_descriptor(*base, extent, device)?;
                Some(TextureDescriptor {
                    label: Some(self.name(id).to_string()),
                    width: (base_desc.width >> mips.start).max(1),
                    height: (base_desc.height >> mips.start).max(1),
                    layers: layers.end - layers.start,
                    mip_levels: mips.end - mips.start,
                    ..base_desc
                })
            }
            ResourceDescription::ImportedTexture { handle, .. } => {
                device.texture_descriptor(*handle)
            }
            ResourceDescription::Buffer(_) | ResourceDescription::ImportedBuffer(_) => None,
        }
    }

    fn view_descriptor<D: Device>(
        &self,
        id: ResourceId,
        extent: Extent2d,
        device: &D,
    ) -> Option<TextureViewDescriptor> {
        let ResourceDescription::View { base, mips, layers } = &self.get(id).description else {
            return None;
        };
        let Some(base_handle) = self.texture(*base) else {
            panic!(
                "view '{}' built before its base '{}'",
                self.name(id),
                self.name(*base)
            );
        };
        let desc = self.texture_descriptor(id, extent, device)?;
        Some(TextureViewDescriptor {
            label: desc.label,
            base: base_handle,
            format: desc.format,
            usage: desc.usage,
            base_mip: mips.start,
            mip_levels: desc.mip_levels,
            base_layer: layers.start,
            layers: desc.layers,
            width: desc.width,
            height: desc.height,
            sample_count: desc.sample_count,
        })
    }

    /// Create a real object for every uninitialized resource.
    pub fn build<D: Device>(&mut self, storage: &mut Storage<D>, extent: Extent2d) -> GraphResult<()> {
        for index in 0..self.resources.len() {
            let id = ResourceId(index as u32);
            if self.resources[index].state != ResourceState::Uninitialized {
                continue;
            }

            let real = match &self.resources[index].description {
                ResourceDescription::Texture(desc) => {
                    RealResource::Texture(storage.create_texture(desc)?)
                }
                ResourceDescription::SizedTexture(size_fn) => {
                    RealResource::Texture(storage.create_texture(&size_fn(extent))?)
                }
                ResourceDescription::View { .. } => {
                    let Some(view) = self.view_descriptor(id, extent, storage.device()) else {
                        return Err(DeviceError::UnknownHandle(format!(
                            "no description for the base of view '{}'",
                            self.name(id)
                        ))
                        .into());
                    };
                    RealResource::Texture(storage.create_texture_view(&view)?)
                }
                ResourceDescription::Buffer(desc) => {
                    RealResource::Buffer(storage.create_buffer(desc)?)
                }
                ResourceDescription::ImportedTexture { .. }
                | ResourceDescription::ImportedBuffer(_) => continue,
            };

            log::trace!("Built resource '{}' as {:?}", self.resources[index].name, real);
            self.resources[index].state = ResourceState::Transient(real);
        }

        Ok(())
    }

    /// Recreate every graph-owned texture whose size follows the output extent.
    ///
    /// Returns the number of recreated textures.
    pub fn resize<D: Device>(
        &mut self,
        storage: &mut Storage<D>,
        extent: Extent2d,
    ) -> GraphResult<usize> {
        let mut resized = 0;

        for index in 0..self.resources.len() {
            let id = ResourceId(index as u32);
            let ResourceState::Transient(RealResource::Texture(handle)) =
                self.resources[index].state
            else {
                continue;
            };
            if !self.is_extent_relative(id) {
                continue;
            }

            match &self.resources[index].description {
                ResourceDescription::SizedTexture(size_fn) => {
                    storage.resize_texture(handle, &size_fn(extent))?;
                }
                ResourceDescription::View { .. } => {
                    let Some(view) = self.view_descriptor(id, extent, storage.device()) else {
                        continue;
                    };
                    storage.recreate_texture_view(handle, &view)?;
                }
                _ => continue,
            }
            resized += 1;
        }

        log::debug!("Resized {} extent-relative resources to {:?}", resized, extent);
        Ok(resized)
    }

    /// Invoke every readiness callback with its resource's real handle.
    pub fn notify_ready(&mut self) {
        for resource in &mut self.resources {
            let Some(real) = resource.state.real() else {
                continue;
            };
            for callback in &mut resource.ready_callbacks {
                callback(real);
            }
        }
    }

    /// Destroy every graph-owned object and return resources to `Uninitialized`.
    pub fn release<D: Device>(&mut self, storage: &mut Storage<D>) {
        // views sit after their bases
        for resource in self.resources.iter_mut().rev() {
            match resource.state {
                ResourceState::Transient(RealResource::Texture(handle)) => {
                    storage.destroy_texture(handle)
                }
                ResourceState::Transient(RealResource::Buffer(handle)) => {
                    storage.destroy_buffer(handle)
                }
                _ => continue,
            }
            resource.state = ResourceState::Uninitialized;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &VirtualResource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(index, resource)| (ResourceId(index as u32), resource))
    }
}
