//! Event publisher implementations.

mod memory;

pub use memory::MemoryPublisher;
