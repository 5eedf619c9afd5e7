mod client;

pub use client::{MBTA_MANIFEST_URL, ManifestClient};
