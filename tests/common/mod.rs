//! Shared helpers for the render graph integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use framegraph::*;

pub const OUTPUT: Extent2d = Extent2d::new(1280, 720);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn new_storage(extent: Extent2d) -> Storage<DummyDevice> {
    Storage::new(DummyDevice::new(extent))
}

pub fn fixed_texture(label: &str, width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor {
        label: Some(label.to_string()),
        width,
        height,
        ..Default::default()
    }
}

pub fn relative_texture(graph: &mut Graph, label: &str) -> ResourceId {
    graph.declare_relative(
        TextureDescriptor {
            label: Some(label.to_string()),
            format: TextureFormat::Rgba16Float,
            ..Default::default()
        },
        TextureSize::default(),
    )
}

pub fn storage_buffer(graph: &mut Graph, label: &str) -> ResourceId {
    graph.declare_buffer(BufferDescriptor {
        label: Some(label.to_string()),
        size: 4096,
        usage: BufferUsage::STORAGE | BufferUsage::UNIFORM | BufferUsage::VERTEX,
    })
}

/// Create the caller-owned texture a swapchain import points at.
pub fn create_backbuffer(storage: &mut Storage<DummyDevice>, extent: Extent2d) -> TextureHandle {
    storage
        .create_texture(&TextureDescriptor {
            label: Some("backbuffer".into()),
            width: extent.width,
            height: extent.height,
            format: TextureFormat::Bgra8UnormSrgb,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        })
        .expect("backbuffer creation")
}

/// The eight pass frame used throughout the tests.
///
/// ```text
/// A -tex0-> D -tex1-> B -tex2-> C -tex3-> E -buf1-> F -tex4-> G -> swapchain
///   -tex0-> H ------------buf0-> C -tex3---------------------> G
/// ```
///
/// `tex3` and `tex4` follow the output extent; everything else is fixed size.
pub struct Frame {
    pub graph: Graph,
    pub storage: Storage<DummyDevice>,
    pub resources: HashMap<&'static str, ResourceId>,
    pub backbuffer: TextureHandle,
    pub present_pipeline: PipelineHandle,
    pub cull_pipeline: PipelineHandle,
}

impl Frame {
    pub fn resource(&self, name: &str) -> ResourceId {
        self.resources[name]
    }

    pub fn pass(&self, name: &str) -> &Pass {
        self.graph.pass(name).expect("pass exists")
    }

    pub fn position(&self, name: &str) -> usize {
        self.graph
            .compiled_pass_names()
            .iter()
            .position(|&n| n == name)
            .expect("pass was compiled")
    }

    /// Resize the caller-owned backbuffer and the graph output together.
    pub fn resize(&mut self, extent: Extent2d) {
        self.storage.device_mut().set_output_extent(extent);
        self.storage
            .resize_texture(
                self.backbuffer,
                &TextureDescriptor {
                    label: Some("backbuffer".into()),
                    width: extent.width,
                    height: extent.height,
                    format: TextureFormat::Bgra8UnormSrgb,
                    usage: TextureUsage::RENDER_ATTACHMENT,
                    ..Default::default()
                },
            )
            .expect("backbuffer resize");
        self.graph.set_output_extent(extent);
    }
}

pub fn declare_frame() -> Frame {
    let mut storage = new_storage(OUTPUT);
    let mut graph = Graph::new();

    let tex0 = graph.declare(fixed_texture("tex0", 512, 512));
    let tex1 = graph.declare(fixed_texture("tex1", 512, 512));
    let tex2 = graph.declare(fixed_texture("tex2", 256, 256));
    let tex3 = relative_texture(&mut graph, "tex3");
    let tex4 = relative_texture(&mut graph, "tex4");
    let buf0 = storage_buffer(&mut graph, "buf0");
    let buf1 = storage_buffer(&mut graph, "buf1");
    let backbuffer = create_backbuffer(&mut storage, OUTPUT);
    let swapchain = graph.import_swapchain(backbuffer);

    let present_pipeline =
        storage.register_pipeline(PipelineDescriptor::Graphics(GraphicsPipelineDescriptor {
            label: Some("present".into()),
            vertex_shader: "fullscreen.vert".into(),
            fragment_shader: Some("present.frag".into()),
            ..Default::default()
        }));
    let cull_pipeline =
        storage.register_pipeline(PipelineDescriptor::Compute(ComputePipelineDescriptor {
            label: Some("cull".into()),
            shader: "cull.comp".into(),
            entry_point: "main".into(),
        }));

    graph
        .add_graphics_pass("A")
        .write(tex0, AttachmentKind::Color, ClearValue::BLACK)
        .set_executor(|recorder, _| recorder.draw(3, 1));
    graph
        .add_graphics_pass("B")
        .read(tex1)
        .write(tex2, AttachmentKind::Color, ClearValue::BLACK)
        .set_executor(|recorder, _| recorder.draw(3, 1));
    graph
        .add_graphics_pass("C")
        .read(tex2)
        .read_buffer(buf0, BufferUsage::UNIFORM)
        .write(tex3, AttachmentKind::Color, ClearValue::TRANSPARENT)
        .set_executor(|recorder, _| recorder.draw(3, 1));
    graph
        .add_graphics_pass("D")
        .read(tex0)
        .write(tex1, AttachmentKind::Color, ClearValue::BLACK)
        .set_executor(|recorder, _| recorder.draw(3, 1));
    graph
        .add_compute_pass("E")
        .read(tex3)
        .write_buffer(buf1, BufferUsage::STORAGE)
        .expect("storage write")
        .set_executor(|recorder, _| recorder.dispatch(8, 8, 1));
    graph
        .add_graphics_pass("F")
        .read_buffer(buf1, BufferUsage::VERTEX)
        .write(tex4, AttachmentKind::Color, ClearValue::BLACK)
        .set_executor(|recorder, _| recorder.draw(64, 1));
    graph
        .add_graphics_pass("G")
        .read(tex4)
        .read(tex3)
        .write(swapchain, AttachmentKind::Color, ClearValue::BLACK)
        .add_pipeline(present_pipeline)
        .set_executor(move |recorder, _| {
            recorder.bind_pipeline(present_pipeline);
            recorder.draw(3, 1);
        });
    graph
        .add_compute_pass("H")
        .read(tex0)
        .write_buffer(buf0, BufferUsage::STORAGE)
        .expect("storage write")
        .add_pipeline(cull_pipeline)
        .set_executor(move |recorder, frame| {
            recorder.bind_pipeline(cull_pipeline);
            recorder.dispatch(frame as u32 + 1, 1, 1);
        });

    let resources = HashMap::from([
        ("tex0", tex0),
        ("tex1", tex1),
        ("tex2", tex2),
        ("tex3", tex3),
        ("tex4", tex4),
        ("buf0", buf0),
        ("buf1", buf1),
        ("swapchain", swapchain),
    ]);

    Frame {
        graph,
        storage,
        resources,
        backbuffer,
        present_pipeline,
        cull_pipeline,
    }
}
