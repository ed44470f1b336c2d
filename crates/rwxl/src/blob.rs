//! Component C — the object blob adapter (spec §4.4).

pub mod s3;

pub use s3::{parse_s3_url, S3BlobStore};
