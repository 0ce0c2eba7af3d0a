//! Framegraph - a declarative render graph
//!
//! Passes declare which textures and buffers they read and write. From those
//! declarations the graph:
//! - orders passes so every read happens after the writes it depends on
//! - synthesizes pipeline barriers and attachment load ops between passes
//! - creates render passes, framebuffers and pipelines on an abstract [`Device`]
//! - rebuilds only what an output resize invalidates
//!
//! A frame is recorded by replaying the compiled passes against a
//! [`CommandRecorder`].
//!
//! ```
//! use framegraph::*;
//!
//! let mut storage = Storage::new(DummyDevice::new(Extent2d::new(1280, 720)));
//! let mut graph = Graph::new();
//!
//! let hdr = graph.declare_relative(
//!     TextureDescriptor {
//!         label: Some("hdr".into()),
//!         format: TextureFormat::Rgba16Float,
//!         ..Default::default()
//!     },
//!     TextureSize::default(),
//! );
//! let backbuffer = storage
//!     .create_texture(&TextureDescriptor {
//!         width: 1280,
//!         height: 720,
//!         ..Default::default()
//!     })
//!     .unwrap();
//! let swapchain = graph.import_swapchain(backbuffer);
//!
//! graph
//!     .add_graphics_pass("scene")
//!     .write(hdr, AttachmentKind::Color, ClearValue::BLACK);
//! graph
//!     .add_graphics_pass("tonemap")
//!     .read(hdr)
//!     .write(swapchain, AttachmentKind::Color, ClearValue::BLACK)
//!     .set_executor(|recorder, _frame| recorder.draw(3, 1));
//!
//! graph.build(&mut storage).unwrap();
//! assert_eq!(graph.compiled_pass_names(), vec!["scene", "tonemap"]);
//!
//! let mut commands = CommandLog::new();
//! graph.execute(&mut commands, 0);
//! assert_eq!(commands.draw_count(), 1);
//! ```

pub mod backend;
pub mod error;
pub mod render_graph;
pub mod storage;

pub use backend::*;
pub use error::{GraphError, GraphResult};
pub use render_graph::*;
pub use storage::*;

/// Configuration for a [`Graph`]
#[derive(Debug, Clone, Default)]
pub struct GraphConfig {
    /// Log the compiled order and barriers after every full rebuild
    pub log_execution_plan: bool,
    /// Output extent to build against; queried from the device when `None`
    pub initial_extent: Option<Extent2d>,
}

/// Capacity of each bindless descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindlessConfig {
    pub max_sampled_textures: u32,
    pub max_storage_textures: u32,
    pub max_storage_buffers: u32,
}

impl Default for BindlessConfig {
    fn default() -> Self {
        Self {
            max_sampled_textures: 1024,
            max_storage_textures: 256,
            max_storage_buffers: 1024,
        }
    }
}

/// Configuration for a [`Storage`]
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub bindless: BindlessConfig,
}
