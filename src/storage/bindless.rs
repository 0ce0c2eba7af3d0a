//! Bindless descriptor table bookkeeping
//!
//! Tracks which slot of which set every bindable texture and buffer lives in.
//! The table only produces [`BindlessWrite`]s; the storage adapter forwards
//! them to the device.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::backend::traits::{BufferHandle, TextureHandle};
use crate::backend::types::*;
use crate::error::{GraphError, GraphResult};
use crate::BindlessConfig;

/// Slot allocator for one bindless set
struct SlotAllocator {
    set: BindlessSet,
    /// Freed slots; pushed at the front, reused from the back
    free: VecDeque<u32>,
    /// Slots below this index have been handed out at least once
    head: u32,
    max: u32,
}

impl fmt::Debug for SlotAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAllocator")
            .field("set", &self.set)
            .field("free", &self.free.len())
            .field("head", &self.head)
            .field("max", &self.max)
            .finish()
    }
}

impl SlotAllocator {
    fn new(set: BindlessSet, max: u32) -> Self {
        Self {
            set,
            free: VecDeque::with_capacity(16),
            head: 0,
            max,
        }
    }

    fn allocate(&mut self) -> Option<u32> {
        if let Some(slot) = self.free.pop_back() {
            log::trace!("Reusing bindless slot {} of {:?}", slot, self.set);
            return Some(slot);
        }
        if self.head >= self.max {
            return None;
        }
        let slot = self.head;
        self.head += 1;
        log::trace!("Allocated bindless slot {} of {:?}", slot, self.set);
        Some(slot)
    }

    fn free(&mut self, slot: u32) {
        debug_assert!(slot < self.head, "freeing a slot that was never allocated");
        self.free.push_front(slot);
    }

    fn in_use(&self) -> usize {
        self.head as usize - self.free.len()
    }
}

/// Slots held by one texture
#[derive(Debug, Clone, Copy, Default)]
struct TextureSlots {
    sampled: Option<u32>,
    storage: Option<u32>,
}

/// The three bindless sets and the slots every bound resource occupies
#[derive(Debug)]
pub struct BindlessTable {
    sampled_textures: SlotAllocator,
    storage_textures: SlotAllocator,
    storage_buffers: SlotAllocator,
    textures: HashMap<TextureHandle, TextureSlots>,
    buffers: HashMap<BufferHandle, u32>,
}

impl BindlessTable {
    pub fn new(config: &BindlessConfig) -> Self {
        Self {
            sampled_textures: SlotAllocator::new(
                BindlessSet::SampledTextures,
                config.max_sampled_textures,
            ),
            storage_textures: SlotAllocator::new(
                BindlessSet::StorageTextures,
                config.max_storage_textures,
            ),
            storage_buffers: SlotAllocator::new(
                BindlessSet::StorageBuffers,
                config.max_storage_buffers,
            ),
            textures: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    fn allocator(&mut self, set: BindlessSet) -> &mut SlotAllocator {
        match set {
            BindlessSet::SampledTextures => &mut self.sampled_textures,
            BindlessSet::StorageTextures => &mut self.storage_textures,
            BindlessSet::StorageBuffers => &mut self.storage_buffers,
        }
    }

    fn allocate(&mut self, set: BindlessSet) -> GraphResult<u32> {
        match self.allocator(set).allocate() {
            Some(slot) => Ok(slot),
            None => {
                log::error!("Bindless set {:?} is full", set);
                Err(GraphError::BindlessExhausted(set))
            }
        }
    }

    /// Give `texture` a slot in every set its usage makes it visible in.
    ///
    /// Either all slots are allocated or none are.
    pub fn bind_texture(
        &mut self,
        texture: TextureHandle,
        usage: TextureUsage,
    ) -> GraphResult<Vec<BindlessWrite>> {
        let mut slots = TextureSlots::default();
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            slots.sampled = Some(self.allocate(BindlessSet::SampledTextures)?);
        }
        if usage.contains(TextureUsage::STORAGE_BINDING) {
            match self.allocate(BindlessSet::StorageTextures) {
                Ok(slot) => slots.storage = Some(slot),
                Err(err) => {
                    if let Some(sampled) = slots.sampled {
                        self.sampled_textures.free(sampled);
                    }
                    return Err(err);
                }
            }
        }
        if slots.sampled.is_none() && slots.storage.is_none() {
            return Ok(Vec::new());
        }

        self.textures.insert(texture, slots);
        Ok(texture_writes(slots, Some(BindlessResource::Texture(texture))))
    }

    /// Writes that point the slots of `texture` at it again, e.g. after a resize.
    pub fn rebind_texture(&self, texture: TextureHandle) -> Vec<BindlessWrite> {
        match self.textures.get(&texture) {
            Some(&slots) => texture_writes(slots, Some(BindlessResource::Texture(texture))),
            None => Vec::new(),
        }
    }

    /// Release the slots of `texture`, returning the writes that clear them.
    pub fn unbind_texture(&mut self, texture: TextureHandle) -> Vec<BindlessWrite> {
        let Some(slots) = self.textures.remove(&texture) else {
            return Vec::new();
        };
        if let Some(slot) = slots.sampled {
            self.sampled_textures.free(slot);
        }
        if let Some(slot) = slots.storage {
            self.storage_textures.free(slot);
        }
        texture_writes(slots, None)
    }

    pub fn bind_buffer(
        &mut self,
        buffer: BufferHandle,
        usage: BufferUsage,
    ) -> GraphResult<Option<BindlessWrite>> {
        if !usage.contains(BufferUsage::STORAGE) {
            return Ok(None);
        }
        let slot = self.allocate(BindlessSet::StorageBuffers)?;
        self.buffers.insert(buffer, slot);
        Ok(Some(BindlessWrite {
            set: BindlessSet::StorageBuffers,
            slot,
            resource: Some(BindlessResource::Buffer(buffer)),
        }))
    }

    pub fn unbind_buffer(&mut self, buffer: BufferHandle) -> Option<BindlessWrite> {
        let slot = self.buffers.remove(&buffer)?;
        self.storage_buffers.free(slot);
        Some(BindlessWrite {
            set: BindlessSet::StorageBuffers,
            slot,
            resource: None,
        })
    }

    pub fn texture_slot(&self, texture: TextureHandle, set: BindlessSet) -> Option<u32> {
        let slots = self.textures.get(&texture)?;
        match set {
            BindlessSet::SampledTextures => slots.sampled,
            BindlessSet::StorageTextures => slots.storage,
            BindlessSet::StorageBuffers => None,
        }
    }

    pub fn buffer_slot(&self, buffer: BufferHandle) -> Option<u32> {
        self.buffers.get(&buffer).copied()
    }

    /// Number of occupied slots in `set`.
    pub fn in_use(&self, set: BindlessSet) -> usize {
        match set {
            BindlessSet::SampledTextures => self.sampled_textures.in_use(),
            BindlessSet::StorageTextures => self.storage_textures.in_use(),
            BindlessSet::StorageBuffers => self.storage_buffers.in_use(),
        }
    }
}

fn texture_writes(slots: TextureSlots, resource: Option<BindlessResource>) -> Vec<BindlessWrite> {
    let sampled = slots.sampled.map(|slot| BindlessWrite {
        set: BindlessSet::SampledTextures,
        slot,
        resource,
    });
    let storage = slots.storage.map(|slot| BindlessWrite {
        set: BindlessSet::StorageTextures,
        slot,
        resource,
    });
    sampled.into_iter().chain(storage).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_table() -> BindlessTable {
        BindlessTable::new(&BindlessConfig {
            max_sampled_textures: 3,
            max_storage_textures: 1,
            max_storage_buffers: 2,
        })
    }

    #[test]
    fn test_slots_are_handed_out_in_order() {
        let mut table = small_table();
        for raw in 0..3 {
            let writes = table
                .bind_texture(TextureHandle(raw), TextureUsage::TEXTURE_BINDING)
                .unwrap();
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].slot, raw as u32);
        }
        assert_eq!(
            table.bind_texture(TextureHandle(9), TextureUsage::TEXTURE_BINDING),
            Err(GraphError::BindlessExhausted(BindlessSet::SampledTextures))
        );
    }

    #[test]
    fn test_freed_slots_are_reused_oldest_first() {
        let mut table = small_table();
        for raw in 0..3 {
            table
                .bind_texture(TextureHandle(raw), TextureUsage::TEXTURE_BINDING)
                .unwrap();
        }
        table.unbind_texture(TextureHandle(2));
        table.unbind_texture(TextureHandle(0));

        let first = table
            .bind_texture(TextureHandle(10), TextureUsage::TEXTURE_BINDING)
            .unwrap();
        let second = table
            .bind_texture(TextureHandle(11), TextureUsage::TEXTURE_BINDING)
            .unwrap();
        assert_eq!(first[0].slot, 2);
        assert_eq!(second[0].slot, 0);
        assert_eq!(table.in_use(BindlessSet::SampledTextures), 3);
    }

    #[test]
    fn test_texture_in_both_sets_is_all_or_nothing() {
        let mut table = small_table();
        let usage = TextureUsage::TEXTURE_BINDING | TextureUsage::STORAGE_BINDING;
        let writes = table.bind_texture(TextureHandle(1), usage).unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(table.texture_slot(TextureHandle(1), BindlessSet::StorageTextures), Some(0));

        assert!(table.bind_texture(TextureHandle(2), usage).is_err());
        assert_eq!(table.in_use(BindlessSet::SampledTextures), 1);
        assert_eq!(table.texture_slot(TextureHandle(2), BindlessSet::SampledTextures), None);
    }

    #[test]
    fn test_unbound_usage_gets_no_slot() {
        let mut table = small_table();
        let writes = table
            .bind_texture(TextureHandle(1), TextureUsage::RENDER_ATTACHMENT)
            .unwrap();
        assert!(writes.is_empty());
        assert!(table.unbind_texture(TextureHandle(1)).is_empty());
        assert_eq!(table.bind_buffer(BufferHandle(1), BufferUsage::VERTEX), Ok(None));
    }

    #[test]
    fn test_buffer_unbind_clears_slot() {
        let mut table = small_table();
        let write = table
            .bind_buffer(BufferHandle(4), BufferUsage::STORAGE | BufferUsage::INDIRECT)
            .unwrap()
            .unwrap();
        assert_eq!(write.resource, Some(BindlessResource::Buffer(BufferHandle(4))));
        assert_eq!(table.buffer_slot(BufferHandle(4)), Some(0));

        let cleared = table.unbind_buffer(BufferHandle(4)).unwrap();
        assert_eq!(cleared.slot, 0);
        assert_eq!(cleared.resource, None);
        assert_eq!(table.buffer_slot(BufferHandle(4)), None);
    }

    #[test]
    fn test_rebind_keeps_slots() {
        let mut table = small_table();
        let bound = table
            .bind_texture(TextureHandle(3), TextureUsage::TEXTURE_BINDING)
            .unwrap();
        assert_eq!(table.rebind_texture(TextureHandle(3)), bound);
        assert!(table.rebind_texture(TextureHandle(4)).is_empty());
    }
}
