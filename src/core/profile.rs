//! Profile management - Persisted launch configurations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Account the profile logs in with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub realm: String,
    pub account: String,
    pub password: String,
    pub character: String,
    pub difficulty: String,
}

/// Where the game window is placed on screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlacement {
    pub x: i32,
    pub y: i32,
}

/// Monotonic counters updated by the engine and by script reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub runs: u64,
    pub chickens: u64,
    pub deaths: u64,
    pub crashes: u64,
    pub restarts: u64,
    pub key_runs: u64,
}

/// Counter selector used when a single stat is bumped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Run,
    Chicken,
    Death,
    Crash,
    Restart,
}

impl ProfileStats {
    pub fn increment(&mut self, kind: StatKind) {
        match kind {
            StatKind::Run => {
                self.runs += 1;
                self.key_runs += 1;
            }
            StatKind::Chicken => self.chickens += 1,
            StatKind::Death => self.deaths += 1,
            StatKind::Crash => self.crashes += 1,
            StatKind::Restart => self.restarts += 1,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A saved profile describing one bot instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Unique name, also the registry key
    pub name: String,
    #[serde(default)]
    pub account: Account,
    /// Path to the game executable
    pub game_path: PathBuf,
    /// Game version used to select patches (e.g. "1.14d")
    #[serde(default)]
    pub game_version: String,
    /// Extra command line parameters passed to the game
    #[serde(default)]
    pub launch_parameters: String,
    /// Script the companion module runs
    #[serde(default)]
    pub entry_script: String,
    /// Key list to draw keys from
    #[serde(default)]
    pub key_list: Option<String>,
    /// Schedule this profile follows
    #[serde(default)]
    pub schedule: Option<String>,
    /// Whether an external scheduler may start this profile
    #[serde(default)]
    pub schedule_enabled: bool,
    #[serde(default)]
    pub window: WindowPlacement,
    /// Show the game window on launch
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub stats: ProfileStats,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Profile {
    pub fn new(name: impl Into<String>, game_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            account: Account::default(),
            game_path: game_path.into(),
            game_version: String::new(),
            launch_parameters: String::new(),
            entry_script: String::new(),
            key_list: None,
            schedule: None,
            schedule_enabled: false,
            window: WindowPlacement::default(),
            visible: true,
            stats: ProfileStats::default(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_key_list(mut self, list: impl Into<String>) -> Self {
        self.key_list = Some(list.into());
        self
    }

    pub fn with_game_version(mut self, version: impl Into<String>) -> Self {
        self.game_version = version.into();
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>, enabled: bool) -> Self {
        self.schedule = Some(schedule.into());
        self.schedule_enabled = enabled;
        self
    }

    /// Directory the game lives in, used to resolve module paths
    pub fn game_directory(&self) -> PathBuf {
        self.game_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
    }

    /// Mark profile as modified
    pub fn mark_modified(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Export profile to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Import profile from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
