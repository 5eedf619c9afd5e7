pub mod blob_store;
pub mod manifest_source;
