pub mod manifest;
pub mod s3;
