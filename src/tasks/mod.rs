//! Hierarchical task tree
//!
//! Tasks form one tree per owner, at most five levels deep (levels 0–4).
//! The level is derived from the parent on every write and never supplied by
//! callers; deleting a task removes its whole subtree.

pub mod error;
pub mod manager;
pub mod models;

pub use error::{TaskError, TaskResult};
pub use manager::TaskManager;
pub use models::*;
