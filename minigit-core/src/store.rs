//! Content-addressable blob store.
//!
//! Blobs are keyed by the SHA-256 of their bytes, so identical content is
//! stored exactly once no matter how many paths or commits reference it.

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::storage::Storage;
use tracing::trace;

pub struct ContentStore<'a> {
    storage: &'a Storage,
}

impl<'a> ContentStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Stores bytes and returns their digest.
    ///
    /// Writing content that is already present is a no-op, including when
    /// another connection races to write the same bytes.
    pub fn put(&self, content: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::of(content);
        if self.storage.insert_blob(&id, content)? {
            trace!(blob = %id.short(), size = content.len(), "stored new blob");
        }
        Ok(id)
    }

    /// Loads a blob, verifying the bytes still hash to their id.
    pub fn get(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let content = self
            .storage
            .get_blob(id)?
            .ok_or_else(|| Error::BlobNotFound(id.to_string()))?;

        if ObjectId::of(&content) != *id {
            return Err(Error::GraphInconsistency(format!(
                "blob {id} does not match its content digest"
            )));
        }
        Ok(content)
    }

    pub fn contains(&self, id: &ObjectId) -> Result<bool> {
        self.storage.has_blob(id)
    }

    pub fn size(&self, id: &ObjectId) -> Result<u64> {
        self.storage
            .blob_size(id)?
            .ok_or_else(|| Error::BlobNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_put_and_get() {
        let storage = Storage::in_memory().unwrap();
        let store = ContentStore::new(&storage);

        let id = store.put(b"hello world").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"hello world");
        assert!(store.contains(&id).unwrap());
        assert_eq!(store.size(&id).unwrap(), 11);
    }

    #[test]
    fn test_put_is_deduplicated() {
        let storage = Storage::in_memory().unwrap();
        let store = ContentStore::new(&storage);

        let first = store.put(b"same content").unwrap();
        let second = store.put(b"same content").unwrap();
        assert_eq!(first, second);
        assert_eq!(storage.blob_count().unwrap(), 1);
    }

    #[test]
    fn test_get_missing_blob() {
        let storage = Storage::in_memory().unwrap();
        let store = ContentStore::new(&storage);

        let result = store.get(&ObjectId::of(b"never stored"));
        assert!(matches!(result, Err(Error::BlobNotFound(_))));
    }

    #[test]
    fn test_empty_content() {
        let storage = Storage::in_memory().unwrap();
        let store = ContentStore::new(&storage);

        let id = store.put(b"").unwrap();
        assert!(store.get(&id).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_identical_puts() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = Arc::new(dir.path().join("blobs.db"));
        Storage::new(db_path.as_path()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db_path = Arc::clone(&db_path);
                thread::spawn(move || {
                    let storage = Storage::new(db_path.as_path()).unwrap();
                    ContentStore::new(&storage).put(b"shared").unwrap()
                })
            })
            .collect();

        let ids: Vec<ObjectId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));

        let storage = Storage::new(db_path.as_path()).unwrap();
        assert_eq!(storage.blob_count().unwrap(), 1);
    }
}
