//! Render graph error types.

use thiserror::Error;

use crate::backend::traits::{DeviceError, PipelineHandle};
use crate::backend::types::{BindlessSet, BufferUsage};

/// Recoverable errors reported by graph declaration and `build()`.
///
/// Structural mistakes in a frame declaration (a read with no writer, a
/// texture used as a buffer) are not represented here: they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate pass name '{0}'")]
    DuplicatePassName(String),
    #[error("pass '{pass}' cannot write a buffer as {usage:?}; only UNIFORM or STORAGE writes are allowed")]
    InvalidBufferWrite { pass: String, usage: BufferUsage },
    #[error("pipeline {0:?} was never registered with the storage")]
    UnknownPipeline(PipelineHandle),
    #[error("bindless set {0:?} has no free slots")]
    BindlessExhausted(BindlessSet),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::DuplicatePassName("gbuffer".to_string());
        assert_eq!(err.to_string(), "duplicate pass name 'gbuffer'");

        let err = GraphError::from(DeviceError::OutOfMemory);
        assert_eq!(err.to_string(), "Out of memory");

        let err = GraphError::BindlessExhausted(BindlessSet::StorageBuffers);
        assert_eq!(err.to_string(), "bindless set StorageBuffers has no free slots");
    }
}
