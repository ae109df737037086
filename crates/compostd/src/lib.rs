//! compostd library - exposes modules for testing.

pub mod aggregator;
pub mod backends;
pub mod config;
pub mod context;
pub mod directory;
pub mod dispatcher;
pub mod query;
pub mod results;
pub mod routes;
pub mod server;
pub mod store;
pub mod task;
