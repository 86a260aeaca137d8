//! Instance registry - Profile name -> instance, process handle -> profile

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use super::error::{EngineError, EngineResult};
use super::instance::ProfileInstance;

/// Owned by the engine; the only place instances are looked up
#[derive(Default)]
pub struct InstanceRegistry {
    instances: RwLock<HashMap<String, Arc<ProfileInstance>>>,
    /// PID of a running game -> profile name, used to route script messages
    handles: DashMap<u32, String>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ProfileInstance>>> {
        self.instances.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ProfileInstance>>> {
        self.instances.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new instance; fails if the name is taken
    pub fn insert(&self, name: &str) -> EngineResult<Arc<ProfileInstance>> {
        let mut instances = self.write();
        if instances.contains_key(name) {
            return Err(EngineError::StateConflict(format!(
                "profile '{}' already exists",
                name
            )));
        }
        let instance = Arc::new(ProfileInstance::new(name));
        instances.insert(name.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<ProfileInstance>> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::unknown_profile(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Drop an instance and every handle that pointed at it
    pub fn remove(&self, name: &str) -> Option<Arc<ProfileInstance>> {
        let removed = self.write().remove(name);
        self.handles.retain(|_, profile| profile != name);
        removed
    }

    /// Re-key an instance and its handles under a new name
    pub fn rename(&self, old: &str, new: &str) -> EngineResult<Arc<ProfileInstance>> {
        let mut instances = self.write();
        if instances.contains_key(new) {
            return Err(EngineError::StateConflict(format!(
                "profile '{}' already exists",
                new
            )));
        }
        let instance = instances
            .remove(old)
            .ok_or_else(|| EngineError::unknown_profile(old))?;
        instance.set_name(new);
        instances.insert(new.to_string(), Arc::clone(&instance));

        for mut entry in self.handles.iter_mut() {
            if entry.value() == old {
                *entry.value_mut() = new.to_string();
            }
        }
        Ok(instance)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn bind_handle(&self, pid: u32, name: &str) {
        self.handles.insert(pid, name.to_string());
    }

    pub fn unbind_handle(&self, pid: u32) {
        self.handles.remove(&pid);
    }

    pub fn profile_for(&self, pid: u32) -> Option<String> {
        self.handles.get(&pid).map(|p| p.value().clone())
    }

    /// Keys held on `list` by active instances other than `except`
    pub fn keys_in_use(&self, list: &str, except: &str) -> HashSet<String> {
        self.read()
            .iter()
            .filter(|(name, _)| name.as_str() != except)
            .filter_map(|(_, instance)| instance.key_in_use_on(list))
            .collect()
    }
}
