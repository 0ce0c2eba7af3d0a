//! Render graph definition and compilation

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{GraphError, GraphResult};
use crate::render_graph::barrier::BarrierBuilder;
use crate::render_graph::builder;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::render_graph::sync::{AttachmentKind, PassKind};
use crate::storage::Storage;
use crate::GraphConfig;

/// Passes in a valid execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledGraph {
    /// Indices into the graph's pass list, in execution order
    pub pass_order: Vec<usize>,
    /// Indices of passes dropped for touching no resource
    pub pruned: Vec<usize>,
}

impl CompiledGraph {
    /// Position of a pass in the execution order.
    pub fn position(&self, pass_index: usize) -> Option<usize> {
        self.pass_order.iter().position(|&p| p == pass_index)
    }
}

/// What the next `build()` has to redo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dirty {
    Clean,
    /// Only the output extent changed: rebuild extent-relative passes
    Extent,
    /// Passes or resources were declared: rebuild everything
    Structure,
}

/// The main render graph structure
pub struct Graph {
    pub(crate) config: GraphConfig,
    pub(crate) registry: ResourceRegistry,
    pub(crate) passes: Vec<Pass>,
    /// Passes removed by `clear_passes` whose GPU objects are still alive.
    /// Until the redeclared frame compiles, `compiled` indexes into these.
    retired: Vec<Pass>,
    pub(crate) compiled: Option<CompiledGraph>,
    structure_dirty: bool,
    output_extent: Option<Extent2d>,
    built_extent: Option<Extent2d>,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            output_extent: config.initial_extent,
            config,
            registry: ResourceRegistry::new(),
            passes: Vec::new(),
            retired: Vec::new(),
            compiled: None,
            structure_dirty: true,
            built_extent: None,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn add_pass(&mut self, name: &str, kind: PassKind) -> &mut Pass {
        self.structure_dirty = true;
        let index = self.passes.len();
        self.passes.push(Pass::new(name, kind));
        &mut self.passes[index]
    }

    pub fn add_graphics_pass(&mut self, name: &str) -> &mut Pass {
        self.add_pass(name, PassKind::Graphics)
    }

    pub fn add_compute_pass(&mut self, name: &str) -> &mut Pass {
        self.add_pass(name, PassKind::Compute)
    }

    pub fn pass(&self, name: &str) -> Option<&Pass> {
        self.passes.iter().find(|p| p.name() == name)
    }

    /// Mutable access to a declared pass; marks the structure dirty if found.
    pub fn pass_mut(&mut self, name: &str) -> Option<&mut Pass> {
        let pass = self.passes.iter_mut().find(|p| p.name() == name)?;
        self.structure_dirty = true;
        Some(pass)
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Drop every declared pass so the frame can be redeclared.
    ///
    /// The dropped passes keep executing until the next successful `build()`,
    /// which destroys their GPU objects.
    pub fn clear_passes(&mut self) {
        if self.retired.is_empty() {
            self.retired = std::mem::take(&mut self.passes);
        } else {
            // Already cleared since the last build: these were never compiled
            self.passes.clear();
        }
        self.structure_dirty = true;
    }

    /// The passes the current compiled order refers to.
    pub(crate) fn built_passes(&self) -> &[Pass] {
        if self.retired.is_empty() {
            &self.passes
        } else {
            &self.retired
        }
    }

    pub fn declare(&mut self, descriptor: TextureDescriptor) -> ResourceId {
        self.structure_dirty = true;
        self.registry.declare(descriptor)
    }

    pub fn declare_sized<F>(&mut self, name: &str, size_fn: F) -> ResourceId
    where
        F: Fn(Extent2d) -> TextureDescriptor + 'static,
    {
        self.structure_dirty = true;
        self.registry.declare_sized(name, size_fn)
    }

    pub fn declare_relative(&mut self, descriptor: TextureDescriptor, size: TextureSize) -> ResourceId {
        self.structure_dirty = true;
        self.registry.declare_relative(descriptor, size)
    }

    pub fn declare_view(&mut self, base: ResourceId, mips: Range<u32>, layers: Range<u32>) -> ResourceId {
        self.structure_dirty = true;
        self.registry.declare_view(base, mips, layers)
    }

    pub fn declare_buffer(&mut self, descriptor: BufferDescriptor) -> ResourceId {
        self.structure_dirty = true;
        self.registry.declare_buffer(descriptor)
    }

    pub fn import_texture(&mut self, handle: TextureHandle) -> ResourceId {
        self.structure_dirty = true;
        self.registry.import_texture(handle)
    }

    pub fn import_swapchain(&mut self, handle: TextureHandle) -> ResourceId {
        self.structure_dirty = true;
        self.registry.import_swapchain(handle)
    }

    pub fn import_buffer(&mut self, handle: BufferHandle) -> ResourceId {
        self.structure_dirty = true;
        self.registry.import_buffer(handle)
    }

    pub fn on_resource_ready<F>(&mut self, resource: ResourceId, callback: F)
    where
        F: FnMut(RealResource) + 'static,
    {
        self.registry.on_ready(resource, callback);
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Set the extent ratio-sized resources are resolved against.
    pub fn set_output_extent(&mut self, extent: Extent2d) {
        if self.output_extent != Some(extent) {
            log::debug!("Render graph output extent set to {:?}", extent);
            self.output_extent = Some(extent);
        }
    }

    pub fn output_extent(&self) -> Option<Extent2d> {
        self.output_extent
    }

    pub fn dirty(&self) -> Dirty {
        if self.structure_dirty {
            Dirty::Structure
        } else if self.built_extent.is_some() && self.built_extent != self.output_extent {
            Dirty::Extent
        } else {
            Dirty::Clean
        }
    }

    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    /// Indices of the compiled passes in execution order.
    pub fn compiled_order(&self) -> &[usize] {
        self.compiled
            .as_ref()
            .map(|c| c.pass_order.as_slice())
            .unwrap_or_default()
    }

    /// Names of the compiled passes in execution order.
    pub fn compiled_pass_names(&self) -> Vec<&str> {
        self.compiled
            .as_ref()
            .map(|c| {
                let passes = self.built_passes();
                c.pass_order.iter().map(|&i| passes[i].name()).collect()
            })
            .unwrap_or_default()
    }

    pub fn pruned_pass_names(&self) -> Vec<&str> {
        self.compiled
            .as_ref()
            .map(|c| {
                let passes = self.built_passes();
                c.pruned.iter().map(|&i| passes[i].name()).collect()
            })
            .unwrap_or_default()
    }

    /// Validate the declarations and compute an execution order.
    ///
    /// # Panics
    ///
    /// If a pass reads a resource nothing writes and that was not imported,
    /// if a texture is accessed as a buffer (or the reverse), or if the
    /// declarations form a cycle.
    pub fn compile(&self) -> GraphResult<CompiledGraph> {
        let mut names = HashSet::new();
        for pass in &self.passes {
            if !names.insert(pass.name()) {
                log::error!(
                    "Render graph has more than one pass named '{}'; keeping the previous build",
                    pass.name()
                );
                return Err(GraphError::DuplicatePassName(pass.name().to_string()));
            }
        }

        let mut alive = Vec::with_capacity(self.passes.len());
        let mut pruned = Vec::new();
        for (index, pass) in self.passes.iter().enumerate() {
            if pass.is_lonely() {
                log::debug!("Pruning pass '{}': it reads and writes nothing", pass.name());
                pruned.push(index);
            } else {
                self.check_resource_kinds(pass);
                alive.push(index);
            }
        }

        // Views are tracked through the resource they alias
        let mut writers: HashMap<ResourceId, Vec<usize>> = HashMap::new();
        let mut readers: HashMap<ResourceId, Vec<usize>> = HashMap::new();
        for &index in &alive {
            let pass = &self.passes[index];
            for resource in pass.written_resources() {
                writers
                    .entry(self.registry.root(resource))
                    .or_default()
                    .push(index);
            }
            for resource in pass.read_resources() {
                readers
                    .entry(self.registry.root(resource))
                    .or_default()
                    .push(index);
            }
        }

        for &index in &alive {
            let pass = &self.passes[index];
            for resource in pass.read_resources() {
                let root = self.registry.root(resource);
                if !writers.contains_key(&root) && !self.registry.is_imported(root) {
                    panic!(
                        "pass '{}' reads '{}' but no pass writes it and it was not imported",
                        pass.name(),
                        self.registry.name(resource)
                    );
                }
            }
        }

        // dependents[w] = passes that must run after w, in declaration order
        let mut dependents = vec![Vec::new(); self.passes.len()];
        for (resource, resource_writers) in &writers {
            let Some(resource_readers) = readers.get(resource) else {
                continue;
            };
            for &writer in resource_writers {
                for &reader in resource_readers {
                    if reader != writer {
                        dependents[writer].push(reader);
                    }
                }
            }
        }
        for list in &mut dependents {
            list.sort_unstable();
            list.dedup();
        }

        let pass_order = self.topological_order(&alive, &dependents);
        Ok(CompiledGraph { pass_order, pruned })
    }

    fn check_resource_kinds(&self, pass: &Pass) {
        let textures = pass
            .texture_reads()
            .iter()
            .copied()
            .chain(pass.texture_writes().iter().map(|w| w.texture));
        for resource in textures {
            assert_eq!(
                self.registry.kind(resource),
                ResourceKind::Texture,
                "pass '{}' uses buffer '{}' as a texture",
                pass.name(),
                self.registry.name(resource)
            );
        }
        let buffers = pass
            .buffer_reads()
            .iter()
            .chain(pass.buffer_writes())
            .map(|a| a.buffer);
        for resource in buffers {
            assert_eq!(
                self.registry.kind(resource),
                ResourceKind::Buffer,
                "pass '{}' uses texture '{}' as a buffer",
                pass.name(),
                self.registry.name(resource)
            );
        }
    }

    /// Depth-first post-order from each root in reverse declaration order,
    /// reversed. Independent passes keep their declaration order.
    fn topological_order(&self, alive: &[usize], dependents: &[Vec<usize>]) -> Vec<usize> {
        let mut visited = vec![false; self.passes.len()];
        let mut on_stack = vec![false; self.passes.len()];
        let mut order = Vec::with_capacity(alive.len());

        for &root in alive.iter().rev() {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            on_stack[root] = true;
            // (pass, dependents left to visit)
            let mut stack = vec![(root, dependents[root].len())];

            while let Some(&(node, remaining)) = stack.last() {
                if remaining == 0 {
                    on_stack[node] = false;
                    order.push(node);
                    stack.pop();
                    continue;
                }
                let top = stack.len() - 1;
                stack[top].1 -= 1;

                let next = dependents[node][remaining - 1];
                if on_stack[next] {
                    panic!(
                        "render graph has a cycle through passes '{}' and '{}'",
                        self.passes[node].name(),
                        self.passes[next].name()
                    );
                }
                if !visited[next] {
                    visited[next] = true;
                    on_stack[next] = true;
                    stack.push((next, dependents[next].len()));
                }
            }
        }

        order.reverse();
        order
    }

    /// Bring GPU objects in line with the declarations.
    ///
    /// Returns immediately when nothing changed. A duplicate pass name
    /// aborts the build and keeps the previous compiled state; device errors
    /// are returned as they occur.
    pub fn build<D: Device>(&mut self, storage: &mut Storage<D>) -> GraphResult<()> {
        let extent = match self.output_extent {
            Some(extent) => extent,
            None => {
                let extent = storage.device().output_extent();
                self.output_extent = Some(extent);
                extent
            }
        };

        match self.dirty() {
            Dirty::Clean => Ok(()),
            Dirty::Extent => self.rebuild_for_extent(storage, extent),
            Dirty::Structure => self.rebuild(storage, extent),
        }
    }

    fn rebuild<D: Device>(&mut self, storage: &mut Storage<D>, extent: Extent2d) -> GraphResult<()> {
        let compiled = self.compile()?;
        if !self.retired.is_empty() {
            self.compiled = None;
            self.destroy_retired(storage);
        }

        if self.built_extent.is_some_and(|built| built != extent) {
            self.registry.resize(storage, extent)?;
        }
        self.registry.build(storage, extent)?;

        let mut barriers = BarrierBuilder::new(&self.registry);
        for &index in &compiled.pass_order {
            barriers.process(&mut self.passes[index]);
        }

        for &index in &compiled.pass_order {
            builder::build_pass(&mut self.passes[index], &self.registry, storage, extent)?;
        }

        self.registry.notify_ready();
        self.built_extent = Some(extent);
        self.structure_dirty = false;
        log::info!(
            "Render graph built: {} passes, {} pruned, output {}x{}",
            compiled.pass_order.len(),
            compiled.pruned.len(),
            extent.width,
            extent.height
        );
        self.compiled = Some(compiled);

        if self.config.log_execution_plan {
            self.print_execution_plan();
        }
        Ok(())
    }

    fn rebuild_for_extent<D: Device>(
        &mut self,
        storage: &mut Storage<D>,
        extent: Extent2d,
    ) -> GraphResult<()> {
        self.registry.resize(storage, extent)?;

        let mut rebuilt = 0;
        if let Some(compiled) = &self.compiled {
            for &index in &compiled.pass_order {
                if !owns_extent_relative_attachment(&self.passes[index], &self.registry) {
                    continue;
                }
                builder::build_pass(&mut self.passes[index], &self.registry, storage, extent)?;
                rebuilt += 1;
            }
        }

        self.built_extent = Some(extent);
        log::debug!(
            "Output extent changed to {}x{}: rebuilt {} passes",
            extent.width,
            extent.height,
            rebuilt
        );
        Ok(())
    }

    fn destroy_retired<D: Device>(&mut self, storage: &mut Storage<D>) {
        let live: HashSet<PipelineHandle> = self
            .passes
            .iter()
            .flat_map(|p| p.pipelines().iter().copied())
            .collect();

        for mut pass in self.retired.drain(..) {
            builder::release_pass(&mut pass, storage);
            for pipeline in pass.pipelines() {
                if !live.contains(pipeline) {
                    storage.destroy_pipeline(*pipeline);
                }
            }
        }
    }

    /// Destroy every GPU object the graph created. Imported resources are untouched.
    pub fn cleanup<D: Device>(&mut self, storage: &mut Storage<D>) {
        let mut pipelines = HashSet::new();
        for pass in self.passes.iter_mut().chain(self.retired.iter_mut()) {
            builder::release_pass(pass, storage);
            pipelines.extend(pass.pipelines().iter().copied());
        }
        for pipeline in pipelines {
            storage.destroy_pipeline(pipeline);
        }
        self.retired.clear();
        self.registry.release(storage);

        self.compiled = None;
        self.built_extent = None;
        self.structure_dirty = true;
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an output-extent change invalidates this pass's framebuffer.
///
/// A graphics pass without attachments is sized to the output extent.
fn owns_extent_relative_attachment(pass: &Pass, registry: &ResourceRegistry) -> bool {
    if pass.kind() != PassKind::Graphics {
        return false;
    }
    let mut attachments = pass
        .texture_writes()
        .iter()
        .filter(|write| write.attachment != AttachmentKind::Storage)
        .peekable();
    attachments.peek().is_none()
        || attachments.any(|write| registry.is_extent_relative(write.texture))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;

    fn texture(graph: &mut Graph, label: &str) -> ResourceId {
        graph.declare(TextureDescriptor {
            label: Some(label.to_string()),
            width: 64,
            height: 64,
            ..Default::default()
        })
    }

    fn color(graph: &mut Graph, pass: &str, target: ResourceId) {
        graph.add_graphics_pass(pass).write(
            target,
            AttachmentKind::Color,
            ClearValue::BLACK,
        );
    }

    #[test]
    fn test_compile_chain() {
        let mut graph = Graph::new();
        let a = texture(&mut graph, "a");
        let b = texture(&mut graph, "b");
        graph.add_graphics_pass("post").read(b);
        graph
            .add_graphics_pass("shade")
            .read(a)
            .write(b, AttachmentKind::Color, ClearValue::BLACK);
        color(&mut graph, "gbuffer", a);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order, vec![2, 1, 0]);
    }

    #[test]
    fn test_independent_passes_keep_declaration_order() {
        let mut graph = Graph::new();
        for name in ["one", "two", "three"] {
            let target = texture(&mut graph, name);
            color(&mut graph, name, target);
        }
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order, vec![0, 1, 2]);
    }

    #[test]
    fn test_compile_diamond_dependency() {
        let mut graph = Graph::new();
        let depth = texture(&mut graph, "depth");
        let ao = texture(&mut graph, "ao");
        let shadow = texture(&mut graph, "shadow");
        let lit = texture(&mut graph, "lit");
        graph.add_graphics_pass("prepass").write(
            depth,
            AttachmentKind::Depth,
            ClearValue::DEPTH_ONE,
        );
        graph
            .add_compute_pass("ssao")
            .read(depth)
            .write(ao, AttachmentKind::Storage, ClearValue::default());
        graph
            .add_graphics_pass("shadows")
            .read(depth)
            .write(shadow, AttachmentKind::Color, ClearValue::BLACK);
        graph
            .add_graphics_pass("lighting")
            .read(ao)
            .read(shadow)
            .write(lit, AttachmentKind::Color, ClearValue::BLACK);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_lonely_passes_are_pruned() {
        let mut graph = Graph::new();
        graph.add_graphics_pass("idle");
        let target = texture(&mut graph, "target");
        color(&mut graph, "draw", target);
        graph.add_compute_pass("also-idle");

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order, vec![1]);
        assert_eq!(compiled.pruned, vec![0, 2]);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut graph = Graph::new();
        let target = texture(&mut graph, "target");
        color(&mut graph, "draw", target);
        color(&mut graph, "draw", target);
        assert_eq!(
            graph.compile(),
            Err(GraphError::DuplicatePassName("draw".to_string()))
        );
    }

    #[test]
    fn test_imported_read_needs_no_writer() {
        let mut graph = Graph::new();
        let history = graph.import_texture(TextureHandle::from_raw(9));
        let target = texture(&mut graph, "target");
        graph
            .add_graphics_pass("taa")
            .read(history)
            .write(target, AttachmentKind::Color, ClearValue::BLACK);
        assert_eq!(graph.compile().unwrap().pass_order, vec![0]);
    }

    #[test]
    #[should_panic(expected = "no pass writes it")]
    fn test_read_without_writer_panics() {
        let mut graph = Graph::new();
        let orphan = texture(&mut graph, "orphan");
        graph.add_graphics_pass("sample").read(orphan);
        let _ = graph.compile();
    }

    #[test]
    #[should_panic(expected = "uses texture")]
    fn test_texture_used_as_buffer_panics() {
        let mut graph = Graph::new();
        let target = texture(&mut graph, "target");
        graph
            .add_compute_pass("bad")
            .read_buffer(target, BufferUsage::STORAGE);
        let _ = graph.compile();
    }

    #[test]
    #[should_panic(expected = "cycle")]
    fn test_cycle_panics() {
        let mut graph = Graph::new();
        let x = texture(&mut graph, "x");
        let y = texture(&mut graph, "y");
        graph
            .add_graphics_pass("left")
            .read(y)
            .write(x, AttachmentKind::Color, ClearValue::BLACK);
        graph
            .add_graphics_pass("right")
            .read(x)
            .write(y, AttachmentKind::Color, ClearValue::BLACK);
        let _ = graph.compile();
    }

    #[test]
    fn test_dirty_tracking() {
        let mut storage = Storage::new(DummyDevice::new(Extent2d::new(320, 240)));
        let mut graph = Graph::new();
        assert_eq!(graph.dirty(), Dirty::Structure);

        let target = texture(&mut graph, "target");
        color(&mut graph, "draw", target);
        graph.build(&mut storage).unwrap();
        assert_eq!(graph.dirty(), Dirty::Clean);
        assert_eq!(graph.output_extent(), Some(Extent2d::new(320, 240)));

        graph.set_output_extent(Extent2d::new(640, 480));
        assert_eq!(graph.dirty(), Dirty::Extent);
        graph.build(&mut storage).unwrap();
        assert_eq!(graph.dirty(), Dirty::Clean);

        assert!(graph.pass_mut("missing").is_none());
        assert_eq!(graph.dirty(), Dirty::Clean);

        let _ = graph.pass_mut("draw");
        assert_eq!(graph.dirty(), Dirty::Structure);
    }

    #[test]
    fn test_view_read_orders_after_base_writer() {
        let mut graph = Graph::new();
        let base = texture(&mut graph, "base");
        let view = graph.declare_view(base, 0..1, 0..1);
        let out = texture(&mut graph, "out");
        graph
            .add_graphics_pass("r")
            .read(view)
            .write(out, AttachmentKind::Color, ClearValue::BLACK);
        color(&mut graph, "w", base);

        assert_eq!(graph.compile().unwrap().pass_order, vec![1, 0]);
    }

    #[test]
    fn test_passes_without_attachments_follow_output_extent() {
        let mut graph = Graph::new();
        let target = texture(&mut graph, "target");
        let scratch = graph.declare_buffer(BufferDescriptor {
            label: Some("scratch".into()),
            size: 64,
            usage: BufferUsage::STORAGE,
        });
        graph
            .add_graphics_pass("raster")
            .write_buffer(scratch, BufferUsage::STORAGE)
            .unwrap();
        graph
            .add_compute_pass("compute")
            .write_buffer(scratch, BufferUsage::STORAGE)
            .unwrap();
        color(&mut graph, "fixed", target);
        graph.add_graphics_pass("storage-only").write(
            target,
            AttachmentKind::Storage,
            ClearValue::default(),
        );

        let owns = |name: &str| {
            owns_extent_relative_attachment(graph.pass(name).unwrap(), graph.registry())
        };
        assert!(owns("raster"));
        assert!(owns("storage-only"));
        assert!(!owns("compute"));
        assert!(!owns("fixed"));
    }

    #[test]
    fn test_clear_passes_destroys_old_render_targets() {
        let mut storage = Storage::new(DummyDevice::new(Extent2d::new(64, 64)));
        let mut graph = Graph::new();
        let target = texture(&mut graph, "target");
        color(&mut graph, "draw", target);
        graph.build(&mut storage).unwrap();
        assert_eq!(storage.device().live_render_pass_count(), 1);

        graph.clear_passes();
        color(&mut graph, "redraw", target);
        graph.build(&mut storage).unwrap();
        assert_eq!(graph.compiled_pass_names(), vec!["redraw"]);
        assert_eq!(storage.device().live_render_pass_count(), 1);
        assert_eq!(storage.device().live_framebuffer_count(), 1);
    }
}
