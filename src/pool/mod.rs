//! Scratch buffer management
//!
//! Reusable message-handle buffers for the receive loop.

mod buffer;

pub use buffer::{HandleBuffer, HandleBufferPool, HandleBufferPoolStats};
