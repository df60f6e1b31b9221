//! Virtual memory: address layout (mapper) and runtime cells (store)

pub mod mapper;
pub mod store;

pub use mapper::{MemoryMapper, MemoryMapperBuilder};
pub use store::{MemoryStore, Value};
