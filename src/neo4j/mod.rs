//! Record store: the Neo4j client, the in-memory backend, and their shared trait

pub mod client;
mod impl_record_store;
pub mod memory;
pub mod models;
pub mod traits;

pub use client::Neo4jClient;
pub use memory::MemoryStore;
pub use models::*;
pub use traits::{RecordStore, TaskWrite};
