pub mod archive;
pub mod codec;
pub mod compact;
pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod reader;
pub mod services;
pub mod store;
pub mod transform;

pub use error::{FeedError, Result};
