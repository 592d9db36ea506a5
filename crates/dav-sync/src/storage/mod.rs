pub mod keys;
pub mod memory;

pub use keys::*;
pub use memory::MemoryStore;
