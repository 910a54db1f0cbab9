pub mod memory;

pub use memory::{InMemoryHost, MemoryWindow};
