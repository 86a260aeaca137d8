//! Key pool - Round-robin allocation of license keys shared by profiles

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{EngineError, EngineResult};
use super::store::KeyStore;

/// A license key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdKey {
    pub name: String,
    pub classic: String,
    pub expansion: String,
    /// Administratively excluded from rotation
    #[serde(default)]
    pub held: bool,
    /// How many times the realm reported this key as down
    #[serde(default)]
    pub realm_down: u32,
}

impl CdKey {
    pub fn new(
        name: impl Into<String>,
        classic: impl Into<String>,
        expansion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            classic: classic.into(),
            expansion: expansion.into(),
            held: false,
            realm_down: 0,
        }
    }

    pub fn held(mut self) -> Self {
        self.held = true;
        self
    }
}

/// Named, ordered collection of keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyList {
    pub name: String,
    pub keys: Vec<CdKey>,
}

impl KeyList {
    pub fn new(name: impl Into<String>, keys: Vec<CdKey>) -> Self {
        Self {
            name: name.into(),
            keys,
        }
    }
}

/// A key together with its derived in-use flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStatus {
    pub key: CdKey,
    pub in_use: bool,
}

struct ListState {
    list: KeyList,
    cursor: usize,
}

impl ListState {
    /// One full scan from the cursor; advances the cursor past the hit.
    fn next_free(&mut self, excluded: &HashSet<String>) -> Option<CdKey> {
        let len = self.list.keys.len();
        for step in 0..len {
            let idx = (self.cursor + step) % len;
            let key = &self.list.keys[idx];
            if !key.held && !excluded.contains(&key.name) {
                self.cursor = (idx + 1) % len;
                return Some(key.clone());
            }
        }
        None
    }

    fn key_mut(&mut self, key_name: &str) -> EngineResult<&mut CdKey> {
        let list_name = &self.list.name;
        self.list
            .keys
            .iter_mut()
            .find(|k| k.name == key_name)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "unknown key '{}' in list '{}'",
                    key_name, list_name
                ))
            })
    }
}

/// Round-robin allocator over named key lists.
///
/// Every list has its own lock so acquisitions on different lists never
/// contend; the scan and the cursor update happen in one critical section.
pub struct KeyPool {
    store: Arc<dyn KeyStore>,
    lists: RwLock<HashMap<String, Arc<Mutex<ListState>>>>,
}

impl KeyPool {
    /// Load every key list from the store
    pub fn load(store: Arc<dyn KeyStore>) -> EngineResult<Self> {
        let lists = store
            .load_key_lists()?
            .into_iter()
            .map(|list| {
                (
                    list.name.clone(),
                    Arc::new(Mutex::new(ListState { list, cursor: 0 })),
                )
            })
            .collect::<HashMap<_, _>>();
        info!("Loaded {} key list(s)", lists.len());
        Ok(Self {
            store,
            lists: RwLock::new(lists),
        })
    }

    fn state(&self, list: &str) -> EngineResult<Arc<Mutex<ListState>>> {
        self.lists
            .read()
            .map_err(|e| anyhow::anyhow!("Key lists lock poisoned: {}", e))?
            .get(list)
            .cloned()
            .ok_or_else(|| EngineError::Configuration(format!("unknown key list '{}'", list)))
    }

    /// Next eligible key after the cursor, skipping held and excluded keys
    pub fn acquire(&self, list: &str, excluded: &HashSet<String>) -> EngineResult<CdKey> {
        self.acquire_with(list, || excluded.clone(), |_| {})
    }

    /// Like [`acquire`](Self::acquire), but the exclusion set is computed and
    /// the assignment committed while the list lock is held, so two callers
    /// deriving "in use" from the same instances can never pick one key.
    pub fn acquire_with<E, C>(&self, list: &str, excluded: E, commit: C) -> EngineResult<CdKey>
    where
        E: FnOnce() -> HashSet<String>,
        C: FnOnce(&CdKey),
    {
        let state = self.state(list)?;
        let mut state = state
            .lock()
            .map_err(|e| anyhow::anyhow!("Key list lock poisoned: {}", e))?;

        let excluded = excluded();
        match state.next_free(&excluded) {
            Some(key) => {
                commit(&key);
                debug!("Acquired key '{}' from list '{}'", key.name, list);
                Ok(key)
            }
            None => {
                warn!("No available key in list '{}'", list);
                Err(EngineError::ResourceExhausted(list.to_string()))
            }
        }
    }

    /// Exclude a key from rotation and persist the flag
    pub fn hold(&self, list: &str, key: &str) -> EngineResult<()> {
        self.set_held(list, key, true)
    }

    /// Put a held key back into rotation
    pub fn unhold(&self, list: &str, key: &str) -> EngineResult<()> {
        self.set_held(list, key, false)
    }

    fn set_held(&self, list: &str, key: &str, held: bool) -> EngineResult<()> {
        let state = self.state(list)?;
        let mut state = state
            .lock()
            .map_err(|e| anyhow::anyhow!("Key list lock poisoned: {}", e))?;
        state.key_mut(key)?.held = held;
        self.store.save_key_list(&state.list)?;
        info!("Key '{}' in list '{}' held={}", key, list, held);
        Ok(())
    }

    /// Count a realm-down report against a key; returns the new count
    pub fn record_realm_down(&self, list: &str, key: &str) -> EngineResult<u32> {
        let state = self.state(list)?;
        let mut state = state
            .lock()
            .map_err(|e| anyhow::anyhow!("Key list lock poisoned: {}", e))?;
        let entry = state.key_mut(key)?;
        entry.realm_down += 1;
        let count = entry.realm_down;
        self.store.save_key_list(&state.list)?;
        Ok(count)
    }

    /// Add or replace a key list. Replacing keeps the cursor when it still fits.
    pub fn add_list(&self, list: KeyList) -> EngineResult<()> {
        self.store.save_key_list(&list)?;
        let mut lists = self
            .lists
            .write()
            .map_err(|e| anyhow::anyhow!("Key lists lock poisoned: {}", e))?;
        match lists.get(&list.name) {
            Some(existing) => {
                let mut state = existing
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Key list lock poisoned: {}", e))?;
                if state.cursor >= list.keys.len() {
                    state.cursor = 0;
                }
                state.list = list;
            }
            None => {
                lists.insert(
                    list.name.clone(),
                    Arc::new(Mutex::new(ListState { list, cursor: 0 })),
                );
            }
        }
        Ok(())
    }

    pub fn remove_list(&self, name: &str) -> EngineResult<()> {
        self.store.delete_key_list(name)?;
        self.lists
            .write()
            .map_err(|e| anyhow::anyhow!("Key lists lock poisoned: {}", e))?
            .remove(name);
        Ok(())
    }

    pub fn list(&self, name: &str) -> Option<KeyList> {
        let state = self.state(name).ok()?;
        let state = state.lock().ok()?;
        Some(state.list.clone())
    }

    pub fn lists(&self) -> Vec<KeyList> {
        let states: Vec<Arc<Mutex<ListState>>> = self
            .lists
            .read()
            .map(|l| l.values().cloned().collect())
            .unwrap_or_default();
        let mut lists: Vec<KeyList> = states
            .iter()
            .filter_map(|s| s.lock().ok().map(|s| s.list.clone()))
            .collect();
        lists.sort_by(|a, b| a.name.cmp(&b.name));
        lists
    }

    /// Every key of a list with its in-use flag derived from `in_use`
    pub fn list_status(&self, list: &str, in_use: &HashSet<String>) -> EngineResult<Vec<KeyStatus>> {
        let list = self
            .list(list)
            .ok_or_else(|| EngineError::Configuration(format!("unknown key list '{}'", list)))?;
        Ok(list
            .keys
            .into_iter()
            .map(|key| KeyStatus {
                in_use: in_use.contains(&key.name),
                key,
            })
            .collect())
    }
}
