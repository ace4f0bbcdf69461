//! Read-only blob sources (bucket + object key → byte stream).

pub mod fs;
pub mod in_memory;

use std::io::Read;

use thiserror::Error;

pub use fs::FsBlobSource;
pub use in_memory::InMemoryBlobSource;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found: {bucket}/{object}")]
    NotFound { bucket: String, object: String },

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("blob I/O error: {0}")]
    Io(String),
}

/// Streaming access to a named object.
///
/// Callers read incrementally; implementations must not buffer the whole
/// object up front.
pub trait BlobSource: Send + Sync {
    fn open(&self, bucket: &str, object: &str) -> Result<Box<dyn Read + Send>, BlobError>;
}

impl<B> BlobSource for std::sync::Arc<B>
where
    B: BlobSource + ?Sized,
{
    fn open(&self, bucket: &str, object: &str) -> Result<Box<dyn Read + Send>, BlobError> {
        (**self).open(bucket, object)
    }
}
