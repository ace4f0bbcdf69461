use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, PoisonError, RwLock};

use super::{BlobError, BlobSource};

/// In-memory blob source for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBlobSource {
    objects: RwLock<HashMap<(String, String), Arc<[u8]>>>,
}

impl InMemoryBlobSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` under `bucket/object`, replacing any previous object.
    ///
    /// The map holds no multi-step invariants, so a poisoned lock is
    /// recovered rather than dropping the write.
    pub fn insert(&self, bucket: impl Into<String>, object: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let mut map = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        map.insert((bucket.into(), object.into()), Arc::from(bytes.into()));
    }
}

/// Owned reader over a shared buffer.
struct SharedBytes(Arc<[u8]>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl BlobSource for InMemoryBlobSource {
    fn open(&self, bucket: &str, object: &str) -> Result<Box<dyn Read + Send>, BlobError> {
        let map = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let bytes = map
            .get(&(bucket.to_string(), object.to_string()))
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            })?;
        Ok(Box::new(Cursor::new(SharedBytes(bytes))))
    }
}
