//! Backend abstraction layer
//!
//! Provides the device and command recording traits the render graph drives,
//! plus a dummy device for tests and headless tooling.

pub mod dummy;
pub mod traits;
pub mod types;

pub use dummy::*;
pub use traits::*;
pub use types::*;
