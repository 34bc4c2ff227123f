//! Named synthetic payloads for add/readfile round trips. A fixture's
//! content-root key is assigned by the first successful `add` on any
//! node and reused for every later operation, never recomputed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use drover_lib::content::ContentKey;
use rand::RngCore;

use crate::error::HarnessError;

struct Fixture {
    data: Arc<Vec<u8>>,
    root: Option<ContentKey>,
}

#[derive(Default)]
pub struct FixtureStore {
    inner: Mutex<HashMap<String, Fixture>>,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Fixture>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Generate `size` pseudo-random bytes under `name`, replacing any
    /// previous fixture of the same name.
    pub fn create(&self, name: &str, size: usize) -> usize {
        let mut data = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut data);
        self.lock().insert(
            name.to_string(),
            Fixture {
                data: Arc::new(data),
                root: None,
            },
        );
        size
    }

    pub fn data(&self, name: &str) -> Result<Arc<Vec<u8>>, HarnessError> {
        self.lock()
            .get(name)
            .map(|f| f.data.clone())
            .ok_or_else(|| HarnessError::NotFound(format!("no such fixture '{name}'")))
    }

    /// The fixture's root key, if any `add` has assigned one yet.
    pub fn root(&self, name: &str) -> Result<Option<ContentKey>, HarnessError> {
        self.lock()
            .get(name)
            .map(|f| f.root)
            .ok_or_else(|| HarnessError::NotFound(format!("no such fixture '{name}'")))
    }

    /// Record the root key from the first ingest; later ingests keep
    /// the original key so round trips verify across nodes and time.
    pub fn assign_root(&self, name: &str, key: ContentKey) -> Result<ContentKey, HarnessError> {
        let mut fixtures = self.lock();
        let fixture = fixtures
            .get_mut(name)
            .ok_or_else(|| HarnessError::NotFound(format!("no such fixture '{name}'")))?;
        Ok(*fixture.root.get_or_insert(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_generates_the_requested_size() {
        let store = FixtureStore::new();
        assert_eq!(store.create("blob", 4096), 4096);
        assert_eq!(store.data("blob").unwrap().len(), 4096);
    }

    #[test]
    fn unknown_fixture_is_not_found() {
        let store = FixtureStore::new();
        assert!(matches!(
            store.data("missing"),
            Err(HarnessError::NotFound(_))
        ));
        assert!(store.root("missing").is_err());
    }

    #[test]
    fn root_key_sticks_after_first_assignment() {
        let store = FixtureStore::new();
        store.create("blob", 16);
        assert_eq!(store.root("blob").unwrap(), None);

        let first = store.assign_root("blob", [1; 32]).unwrap();
        let second = store.assign_root("blob", [2; 32]).unwrap();

        assert_eq!(first, [1; 32]);
        assert_eq!(second, [1; 32]);
        assert_eq!(store.root("blob").unwrap(), Some([1; 32]));
    }

    #[test]
    fn recreating_a_fixture_clears_its_root() {
        let store = FixtureStore::new();
        store.create("blob", 8);
        store.assign_root("blob", [3; 32]).unwrap();

        store.create("blob", 8);
        assert_eq!(store.root("blob").unwrap(), None);
    }
}
