use thiserror::Error;

pub type HeapResult<T> = Result<T, HeapError>;

/// Heap errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
  #[error("Out of memory: growth provider refused {requested} bytes")]
  OutOfMemory { requested: usize },

  #[error("Non-contiguous growth: expected new span at {expected:#x}, provider returned {actual:#x}")]
  NonContiguousGrowth { expected: usize, actual: usize },

  #[error("Invalid heap address: {address:#x}")]
  InvalidAddress { address: usize },

  #[error("Invalid free: {address:#x} is not a live allocation")]
  InvalidFree { address: usize },

  #[error("Heap corrupted at offset {offset:#x}: {reason}")]
  Corrupted { offset: usize, reason: &'static str },
}
