//! Render graph executor

use crate::backend::traits::CommandRecorder;
use crate::backend::types::{Rect2d, RenderPassBegin, Viewport};
use crate::render_graph::barrier::Barrier;
use crate::render_graph::graph::{Dirty, Graph};
use crate::render_graph::pass::Pass;
use crate::render_graph::sync::PassKind;

impl Graph {
    /// Record every compiled pass into `recorder`, in execution order.
    ///
    /// Executes whatever was last built successfully; declarations made
    /// since then take effect on the next `build()`.
    ///
    /// # Panics
    ///
    /// If a graphics pass has no render pass or framebuffer, i.e. the graph
    /// was compiled but never built.
    pub fn execute(&self, recorder: &mut dyn CommandRecorder, frame_index: usize) {
        let Some(compiled) = &self.compiled else {
            log::warn!("Render graph executed before it was built; nothing recorded");
            return;
        };
        if self.dirty() != Dirty::Clean {
            log::debug!(
                "Executing frame {} with stale render graph ({:?})",
                frame_index,
                self.dirty()
            );
        }

        let passes = self.built_passes();
        for &index in &compiled.pass_order {
            execute_pass(&passes[index], recorder, frame_index);
        }
    }

    /// Log the compiled order with each pass's accesses and barriers.
    pub fn print_execution_plan(&self) {
        let Some(compiled) = &self.compiled else {
            log::debug!("Render graph has no execution plan yet");
            return;
        };

        let order = self.compiled_pass_names().join(" -> ");
        log::debug!("Render graph execution plan: [{}]", order);
        if !compiled.pruned.is_empty() {
            log::debug!("  pruned: [{}]", self.pruned_pass_names().join(", "));
        }

        let registry = self.registry();
        let passes = self.built_passes();
        for (position, &index) in compiled.pass_order.iter().enumerate() {
            let pass = &passes[index];
            log::debug!(
                "[{}/{}] {:?} pass '{}'",
                position + 1,
                compiled.pass_order.len(),
                pass.kind(),
                pass.name()
            );

            for &texture in pass.texture_reads() {
                log::debug!("    reads texture '{}'", registry.name(texture));
            }
            for read in pass.buffer_reads() {
                log::debug!(
                    "    reads buffer '{}' as {:?}",
                    registry.name(read.buffer),
                    read.usage
                );
            }
            for (slot, write) in pass.texture_writes().iter().enumerate() {
                let load = pass
                    .attachment_ops()
                    .get(slot)
                    .map(|ops| format!("{:?}", ops.load))
                    .unwrap_or_else(|| "-".to_string());
                log::debug!(
                    "    writes texture '{}' as {:?} (load {})",
                    registry.name(write.texture),
                    write.attachment,
                    load
                );
            }
            for write in pass.buffer_writes() {
                log::debug!(
                    "    writes buffer '{}' as {:?}",
                    registry.name(write.buffer),
                    write.usage
                );
            }

            log_barrier("pre", pass.pre_barrier(), self);
            log_barrier("post", pass.post_barrier(), self);
        }
    }
}

fn log_barrier(label: &str, barrier: &Barrier, graph: &Graph) {
    if !barrier.is_enabled() {
        return;
    }
    log::debug!(
        "    {}-barrier {:?} -> {:?}",
        label,
        barrier.src_stage,
        barrier.dst_stage
    );
    for transition in &barrier.textures {
        log::debug!(
            "      '{}': {:?} -> {:?}",
            graph.registry().name(transition.resource),
            transition.src.layout,
            transition.dst.layout
        );
    }
    for transition in &barrier.buffers {
        log::debug!(
            "      '{}': {:?} -> {:?}",
            graph.registry().name(transition.resource),
            transition.src.access,
            transition.dst.access
        );
    }
}

fn execute_pass(pass: &Pass, recorder: &mut dyn CommandRecorder, frame_index: usize) {
    if pass.pre_barrier().is_enabled() {
        recorder.pipeline_barrier(pass.pre_barrier());
    }

    match pass.kind() {
        PassKind::Graphics => {
            let (Some(render_pass), Some(framebuffer)) = (pass.render_pass(), pass.framebuffer())
            else {
                panic!(
                    "graphics pass '{}' has no render pass or framebuffer; build the graph before executing it",
                    pass.name()
                );
            };
            let extent = pass.dimensions().extent();
            recorder.begin_render_pass(&RenderPassBegin {
                render_pass,
                framebuffer,
                extent,
                clear_values: &pass.clear_values,
            });
            recorder.set_viewport(Viewport::from_extent(extent));
            recorder.set_scissor(Rect2d::from_extent(extent));
            pass.execute(recorder, frame_index);
            recorder.end_render_pass();
        }
        PassKind::Compute => pass.execute(recorder, frame_index),
    }

    if pass.post_barrier().is_enabled() {
        recorder.pipeline_barrier(pass.post_barrier());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{CommandLog, DummyDevice, RecordedCommand};
    use crate::backend::types::*;
    use crate::render_graph::sync::AttachmentKind;
    use crate::storage::Storage;

    fn build_two_pass_graph() -> (Graph, Storage<DummyDevice>) {
        let mut storage = Storage::new(DummyDevice::new(Extent2d::new(200, 100)));
        let mut graph = Graph::new();
        let field = graph.declare(TextureDescriptor {
            label: Some("field".into()),
            width: 32,
            height: 32,
            usage: TextureUsage::STORAGE_BINDING | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        });
        let swapchain = storage
            .create_texture(&TextureDescriptor {
                label: Some("backbuffer".into()),
                width: 200,
                height: 100,
                ..Default::default()
            })
            .unwrap();
        let output = graph.import_swapchain(swapchain);

        graph
            .add_compute_pass("simulate")
            .write(field, AttachmentKind::Storage, ClearValue::default())
            .set_executor(|recorder, frame| recorder.dispatch(frame as u32, 1, 1));
        graph
            .add_graphics_pass("present")
            .read(field)
            .write(output, AttachmentKind::Color, ClearValue::BLACK)
            .set_executor(|recorder, _| recorder.draw(3, 1));

        graph.build(&mut storage).unwrap();
        (graph, storage)
    }

    #[test]
    fn test_execute_records_passes_in_order() {
        let (graph, _storage) = build_two_pass_graph();
        let mut log = CommandLog::new();
        graph.execute(&mut log, 4);

        let present = graph.pass("present").unwrap();
        let expected_begin = RecordedCommand::BeginRenderPass {
            render_pass: present.render_pass().unwrap(),
            framebuffer: present.framebuffer().unwrap(),
            extent: Extent2d::new(200, 100),
            clear_values: vec![ClearValue::BLACK],
        };
        let simulate = graph.pass("simulate").unwrap();
        assert_eq!(
            log.commands(),
            &[
                RecordedCommand::Dispatch { x: 4, y: 1, z: 1 },
                RecordedCommand::PipelineBarrier(simulate.post_barrier().clone()),
                RecordedCommand::PipelineBarrier(present.pre_barrier().clone()),
                expected_begin,
                RecordedCommand::SetViewport(Viewport::from_extent(Extent2d::new(200, 100))),
                RecordedCommand::SetScissor(Rect2d::from_extent(Extent2d::new(200, 100))),
                RecordedCommand::Draw {
                    vertex_count: 3,
                    instance_count: 1
                },
                RecordedCommand::EndRenderPass,
                RecordedCommand::PipelineBarrier(present.post_barrier().clone()),
            ]
        );
    }

    #[test]
    fn test_execute_before_build_records_nothing() {
        let mut graph = Graph::new();
        let target = graph.declare(TextureDescriptor::default());
        graph
            .add_graphics_pass("draw")
            .write(target, AttachmentKind::Color, ClearValue::BLACK);

        let mut log = CommandLog::new();
        graph.execute(&mut log, 0);
        assert!(log.commands().is_empty());
    }

    #[test]
    fn test_execute_keeps_last_good_build() {
        let (mut graph, mut storage) = build_two_pass_graph();
        let field = graph.pass("simulate").unwrap().texture_writes()[0].texture;
        graph.add_compute_pass("simulate").read(field);
        assert!(graph.build(&mut storage).is_err());

        let mut log = CommandLog::new();
        graph.execute(&mut log, 0);
        assert_eq!(log.draw_count(), 1);
        assert_eq!(log.dispatch_count(), 1);
    }

    #[test]
    fn test_print_execution_plan_without_build() {
        let graph = Graph::new();
        graph.print_execution_plan();
    }
}
