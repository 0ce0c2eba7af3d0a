//! Render Graph System
//!
//! A declarative system for defining render passes as a directed acyclic graph (DAG).
//! Passes declare the textures and buffers they read and write; the graph
//! derives an execution order, synthesizes barriers between passes, and
//! realizes render passes, framebuffers and pipelines on a device. Rebuilds are
//! dirty-tracked: an output extent change only touches extent-relative passes.

pub mod barrier;
pub(crate) mod builder;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;
pub mod sync;

pub use barrier::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
pub use sync::*;
