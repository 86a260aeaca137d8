//! Patch catalog - Byte patches applied to the game before it runs

use serde::{Deserialize, Serialize};

/// One byte payload written at `module base + offset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEntry {
    /// Module file name, e.g. "Game.exe"
    pub module: String,
    /// Game version the offset is valid for
    pub version: String,
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl PatchEntry {
    pub fn new(
        module: impl Into<String>,
        version: impl Into<String>,
        offset: usize,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            module: module.into(),
            version: version.into(),
            offset,
            bytes,
        }
    }
}

/// All known patches, across versions
#[derive(Debug, Clone, Default)]
pub struct PatchCatalog {
    entries: Vec<PatchEntry>,
}

impl PatchCatalog {
    pub fn new(entries: Vec<PatchEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patches for `version`, grouped by module. Order within a module is kept.
    pub fn for_version(&self, version: &str) -> Vec<&PatchEntry> {
        let mut selected: Vec<&PatchEntry> = self
            .entries
            .iter()
            .filter(|e| e.version.eq_ignore_ascii_case(version))
            .collect();
        selected.sort_by(|a, b| a.module.to_lowercase().cmp(&b.module.to_lowercase()));
        selected
    }
}
