//! SQLite database implementation for persistent storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::core::{KeyList, KeyStore, PatchEntry, PatchStore, Profile, ProfileStore, Settings};

/// One line of a profile's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub event: String,
    pub time: String,
    pub details: Option<String>,
}

/// Database wrapper for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and its schema
    pub fn open(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .context(format!("Failed to open database at {:?}", db_path))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        info!("Database opened at {:?}", db_path);
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Private database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.initialize()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            -- Settings table
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Profiles, one JSON document per name
            CREATE TABLE IF NOT EXISTS profiles (
                name TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            -- Key lists, keys stored as a JSON array
            CREATE TABLE IF NOT EXISTS key_lists (
                name TEXT PRIMARY KEY,
                keys TEXT NOT NULL
            );

            -- Patch catalog
            CREATE TABLE IF NOT EXISTS patches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module TEXT NOT NULL,
                version TEXT NOT NULL,
                patch_offset INTEGER NOT NULL,
                bytes BLOB NOT NULL
            );

            -- Profile history
            CREATE TABLE IF NOT EXISTS profile_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile TEXT NOT NULL,
                event_type TEXT NOT NULL,
                event_time TEXT NOT NULL,
                details TEXT
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    // === Settings ===

    /// Load settings from database
    pub fn load_settings(&self) -> Result<Option<Settings>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = 'engine_settings'")?;
        let result: Option<String> = stmt.query_row([], |row| row.get(0)).optional()?;

        match result {
            Some(json) => {
                let mut settings: Settings =
                    serde_json::from_str(&json).context("Failed to deserialize settings")?;
                settings.validate();
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// Save settings to database
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(settings)?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES ('engine_settings', ?1)",
            params![json],
        )?;
        debug!("Settings saved");
        Ok(())
    }

    // === Patches ===

    pub fn add_patch(&self, patch: &PatchEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO patches (module, version, patch_offset, bytes) VALUES (?1, ?2, ?3, ?4)",
            params![patch.module, patch.version, patch.offset as i64, patch.bytes],
        )?;
        Ok(())
    }

    // === History ===

    /// Most recent history entries of a profile, newest first
    pub fn history(&self, name: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_type, event_time, details FROM profile_history
             WHERE profile = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![name, limit as i64], |row| {
            Ok(HistoryEntry {
                event: row.get(0)?,
                time: row.get(1)?,
                details: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// Clean up old history entries
    pub fn cleanup_history(&self, retention_days: u32) -> Result<usize> {
        let conn = self.conn()?;
        let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::days(retention_days as i64);
        let count = conn.execute(
            "DELETE FROM profile_history WHERE event_time < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        debug!("Cleaned up {} old history entries", count);
        Ok(count)
    }
}

impl ProfileStore for Database {
    fn load_profile(&self, name: &str) -> Result<Option<Profile>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT data FROM profiles WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| {
            Profile::from_json(&json).with_context(|| format!("Corrupt profile '{}'", name))
        })
        .transpose()
    }

    fn load_all_profiles(&self) -> Result<Vec<Profile>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, data FROM profiles ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut profiles = Vec::new();
        for row in rows {
            let (name, json) = row?;
            let profile =
                Profile::from_json(&json).with_context(|| format!("Corrupt profile '{}'", name))?;
            profiles.push(profile);
        }
        Ok(profiles)
    }

    fn save_profile(&self, profile: &Profile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO profiles (name, data) VALUES (?1, ?2)",
            params![profile.name, profile.to_json()?],
        )?;
        debug!("Profile '{}' saved", profile.name);
        Ok(())
    }

    fn delete_profile(&self, name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM profiles WHERE name = ?1", params![name])?;
        debug!("Profile '{}' deleted", name);
        Ok(())
    }

    fn rename_profile(&self, old: &str, new: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let json: String = tx
            .query_row(
                "SELECT data FROM profiles WHERE name = ?1",
                params![old],
                |row| row.get(0),
            )
            .optional()?
            .with_context(|| format!("Profile '{}' not found", old))?;

        let taken: Option<i64> = tx
            .query_row("SELECT 1 FROM profiles WHERE name = ?1", params![new], |row| {
                row.get(0)
            })
            .optional()?;
        if taken.is_some() {
            anyhow::bail!("Profile '{}' already exists", new);
        }

        let mut profile = Profile::from_json(&json)?;
        profile.name = new.to_string();
        profile.mark_modified();

        tx.execute("DELETE FROM profiles WHERE name = ?1", params![old])?;
        tx.execute(
            "INSERT INTO profiles (name, data) VALUES (?1, ?2)",
            params![new, profile.to_json()?],
        )?;
        tx.execute(
            "UPDATE profile_history SET profile = ?1 WHERE profile = ?2",
            params![new, old],
        )?;
        tx.commit()?;

        debug!("Profile '{}' renamed to '{}'", old, new);
        Ok(())
    }

    fn record_event(&self, name: &str, event: &str, details: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO profile_history (profile, event_type, event_time, details)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![name, event, Utc::now().to_rfc3339(), details],
        )?;
        Ok(())
    }
}

impl KeyStore for Database {
    fn load_key_lists(&self) -> Result<Vec<KeyList>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, keys FROM key_lists ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut lists = Vec::new();
        for row in rows {
            let (name, json) = row?;
            let keys = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt key list '{}'", name))?;
            lists.push(KeyList { name, keys });
        }
        Ok(lists)
    }

    fn save_key_list(&self, list: &KeyList) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO key_lists (name, keys) VALUES (?1, ?2)",
            params![list.name, serde_json::to_string(&list.keys)?],
        )?;
        debug!("Key list '{}' saved", list.name);
        Ok(())
    }

    fn delete_key_list(&self, name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM key_lists WHERE name = ?1", params![name])?;
        Ok(())
    }
}

impl PatchStore for Database {
    fn load_patches(&self) -> Result<Vec<PatchEntry>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT module, version, patch_offset, bytes FROM patches ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(PatchEntry {
                module: row.get(0)?,
                version: row.get(1)?,
                offset: row.get::<_, i64>(2)? as usize,
                bytes: row.get(3)?,
            })
        })?;

        let mut patches = Vec::new();
        for patch in rows {
            patches.push(patch?);
        }
        Ok(patches)
    }
}
