mod blob_store;

pub use blob_store::S3BlobStore;
