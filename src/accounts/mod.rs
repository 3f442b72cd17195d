//! Users and their OAuth connections

pub mod error;
pub mod manager;
pub mod models;

pub use error::{AccountError, AccountResult};
pub use manager::AccountManager;
pub use models::*;
