//! Persistence seams the engine talks to

use anyhow::Result;

use super::keys::KeyList;
use super::patches::PatchEntry;
use super::profile::Profile;

/// CRUD for profiles, keyed by name
pub trait ProfileStore: Send + Sync {
    fn load_profile(&self, name: &str) -> Result<Option<Profile>>;
    fn load_all_profiles(&self) -> Result<Vec<Profile>>;
    fn save_profile(&self, profile: &Profile) -> Result<()>;
    fn delete_profile(&self, name: &str) -> Result<()>;
    /// Move a profile to a new key. The stored profile's `name` is updated too.
    fn rename_profile(&self, old: &str, new: &str) -> Result<()>;
    /// Append a line to the profile's history log
    fn record_event(&self, name: &str, event: &str, details: Option<&str>) -> Result<()>;
}

/// CRUD for key lists, keyed by list name
pub trait KeyStore: Send + Sync {
    fn load_key_lists(&self) -> Result<Vec<KeyList>>;
    fn save_key_list(&self, list: &KeyList) -> Result<()>;
    fn delete_key_list(&self, name: &str) -> Result<()>;
}

/// Source of patch catalog entries
pub trait PatchStore: Send + Sync {
    fn load_patches(&self) -> Result<Vec<PatchEntry>>;
}
