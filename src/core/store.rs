//! Key-value storage used by every handler.
//!
//! Under Spin the default key-value store backs everything. Natively (the
//! actix server and the tests) an in-process map stands in for it. Documents
//! are stored as JSON, id lists as JSON arrays of strings.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

#[derive(Clone)]
pub struct Store {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Memory(Arc<RwLock<HashMap<String, Vec<u8>>>>),
    #[cfg(target_arch = "wasm32")]
    Spin(std::rc::Rc<spin_sdk::key_value::Store>),
}

impl Store {
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(RwLock::new(HashMap::new()))),
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn open_default() -> anyhow::Result<Self> {
        let store = spin_sdk::key_value::Store::open_default()?;
        Ok(Self {
            backend: Backend::Spin(std::rc::Rc::new(store)),
        })
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.read().get(key).cloned()),
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => Ok(store.get(key)?),
        }
    }

    pub fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        match &self.backend {
            Backend::Memory(map) => {
                map.write().insert(key.to_string(), value.to_vec());
                Ok(())
            }
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => Ok(store.set(key, value)?),
        }
    }

    pub fn delete(&self, key: &str) -> anyhow::Result<()> {
        match &self.backend {
            Backend::Memory(map) => {
                map.write().remove(key);
                Ok(())
            }
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => Ok(store.delete(key)?),
        }
    }

    pub fn exists(&self, key: &str) -> anyhow::Result<bool> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.read().contains_key(key)),
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => Ok(store.exists(key)?),
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    /// Reads an id list, treating a missing key as empty.
    pub fn get_list(&self, key: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.get_json(key)?.unwrap_or_default())
    }
}
