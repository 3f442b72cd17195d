//! HTTP API over the task tree, accounts and Google sync

pub mod account_handlers;
pub mod cron_handlers;
pub mod handlers;
pub mod query;
pub mod routes;
pub mod sync_handlers;
pub mod task_handlers;
pub mod webhook_handlers;

pub use query::*;
pub use routes::create_router;
