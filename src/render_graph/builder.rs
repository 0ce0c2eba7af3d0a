//! GPU object construction for compiled passes

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::GraphResult;
use crate::render_graph::pass::{Pass, PassDimensions};
use crate::render_graph::resource::ResourceRegistry;
use crate::render_graph::sync::{texture_write_state, AttachmentKind, ImageLayout, PassKind};
use crate::storage::Storage;

/// (Re)create the render pass, framebuffer and pipelines of one pass.
///
/// Barrier synthesis must have run first: attachment load ops come from it.
pub(crate) fn build_pass<D: Device>(
    pass: &mut Pass,
    registry: &ResourceRegistry,
    storage: &mut Storage<D>,
    extent: Extent2d,
) -> GraphResult<()> {
    if pass.kind() == PassKind::Graphics {
        build_render_targets(pass, registry, storage, extent)?;
    }

    let sample_count = pass.dimensions.sample_count.max(1);
    for &pipeline in pass.pipelines() {
        storage.build_pipeline(pipeline, pass.render_pass, sample_count)?;
    }

    pass.build_count += 1;
    log::trace!(
        "Built pass '{}' ({:?}, {}x{}x{}, {} samples)",
        pass.name(),
        pass.kind(),
        pass.dimensions.width,
        pass.dimensions.height,
        pass.dimensions.layers,
        pass.dimensions.sample_count
    );
    Ok(())
}

fn build_render_targets<D: Device>(
    pass: &mut Pass,
    registry: &ResourceRegistry,
    storage: &mut Storage<D>,
    extent: Extent2d,
) -> GraphResult<()> {
    release_pass(pass, storage);

    let mut descriptor = RenderPassDescriptor {
        label: Some(pass.name().to_string()),
        ..Default::default()
    };
    let mut colors = Vec::new();
    let mut depth = None;
    let mut resolve = None;
    let mut dimensions = PassDimensions::default();

    for (write, ops) in pass.texture_writes().iter().zip(pass.attachment_ops()) {
        if write.attachment == AttachmentKind::Storage {
            continue;
        }
        let Some(texture) = registry.texture_descriptor(write.texture, extent, storage.device())
        else {
            return Err(DeviceError::UnknownHandle(format!(
                "no description for attachment '{}' of pass '{}'",
                registry.name(write.texture),
                pass.name()
            ))
            .into());
        };
        let Some(handle) = registry.texture(write.texture) else {
            panic!(
                "attachment '{}' of pass '{}' has no real texture after build",
                registry.name(write.texture),
                pass.name()
            );
        };

        let layout = texture_write_state(PassKind::Graphics, write.attachment).layout;
        let attachment = AttachmentDescription {
            format: texture.format,
            sample_count: texture.sample_count,
            load_op: ops.load,
            store_op: ops.store,
            initial_layout: if ops.load == LoadOp::Clear {
                ImageLayout::Undefined
            } else {
                layout
            },
            final_layout: layout,
        };

        dimensions.width = dimensions.width.max(texture.width);
        dimensions.height = dimensions.height.max(texture.height);
        dimensions.layers = dimensions.layers.max(texture.layers);
        dimensions.sample_count = dimensions.sample_count.max(texture.sample_count);

        match write.attachment {
            AttachmentKind::Color => {
                descriptor.color_attachments.push(attachment);
                colors.push((handle, write.clear));
            }
            AttachmentKind::Depth => {
                assert!(
                    depth.is_none(),
                    "pass '{}' declares more than one depth attachment",
                    pass.name()
                );
                descriptor.depth_attachment = Some(attachment);
                depth = Some((handle, write.clear));
            }
            AttachmentKind::Resolve => {
                assert!(
                    resolve.is_none(),
                    "pass '{}' declares more than one resolve attachment",
                    pass.name()
                );
                descriptor.resolve_attachment = Some(attachment);
                resolve = Some((handle, write.clear));
            }
            AttachmentKind::Storage => {}
        }
    }

    if descriptor.attachment_count() == 0 {
        dimensions = PassDimensions {
            width: extent.width,
            height: extent.height,
            layers: 1,
            sample_count: 1,
        };
    }

    let (attachments, clear_values): (Vec<_>, Vec<_>) =
        colors.into_iter().chain(depth).chain(resolve).unzip();

    let render_pass = storage.create_render_pass(&descriptor)?;
    let framebuffer = storage.create_framebuffer(&FramebufferDescriptor {
        label: Some(pass.name().to_string()),
        render_pass,
        attachments,
        width: dimensions.width,
        height: dimensions.height,
        layers: dimensions.layers,
    })?;

    pass.render_pass = Some(render_pass);
    pass.framebuffer = Some(framebuffer);
    pass.dimensions = dimensions;
    pass.clear_values = clear_values;
    Ok(())
}

/// Destroy the render pass and framebuffer of a pass, if it has them.
pub(crate) fn release_pass<D: Device>(pass: &mut Pass, storage: &mut Storage<D>) {
    if let Some(framebuffer) = pass.framebuffer.take() {
        storage.destroy_framebuffer(framebuffer);
    }
    if let Some(render_pass) = pass.render_pass.take() {
        storage.destroy_render_pass(render_pass);
    }
}
