use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};

use super::{BlobError, BlobSource};

/// Filesystem-backed blob source: `root/{bucket}/{object}`.
#[derive(Debug, Clone)]
pub struct FsBlobSource {
    root: PathBuf,
}

impl FsBlobSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, object: &str) -> Result<PathBuf, BlobError> {
        let mut path = self.root.clone();
        for part in [bucket, object] {
            let rel = Path::new(part);
            let clean = !part.is_empty()
                && rel
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !clean {
                return Err(BlobError::InvalidKey(format!("{bucket}/{object}")));
            }
            path.push(rel);
        }
        Ok(path)
    }
}

impl BlobSource for FsBlobSource {
    fn open(&self, bucket: &str, object: &str) -> Result<Box<dyn Read + Send>, BlobError> {
        let path = self.resolve(bucket, object)?;
        match File::open(&path) {
            Ok(f) => Ok(Box::new(BufReader::new(f))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            }),
            Err(e) => Err(BlobError::Io(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_objects_under_the_bucket_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bucket").join("nested")).unwrap();
        std::fs::write(dir.path().join("bucket/nested/data.csv"), b"a;b\n").unwrap();

        let source = FsBlobSource::new(dir.path());
        let mut out = String::new();
        source
            .open("bucket", "nested/data.csv")
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "a;b\n");
    }

    #[test]
    fn missing_objects_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsBlobSource::new(dir.path());
        assert!(matches!(
            source.open("bucket", "nope.csv"),
            Err(BlobError::NotFound { .. })
        ));
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let source = FsBlobSource::new("/srv/blobs");
        for (bucket, object) in [("..", "x"), ("b", "../x"), ("b", "/etc/passwd"), ("", "x")] {
            assert!(
                matches!(source.open(bucket, object), Err(BlobError::InvalidKey(_))),
                "{bucket}/{object}"
            );
        }
    }
}
