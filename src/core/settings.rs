//! Engine settings management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// When to resend the handshake while no heartbeat has ever arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HandshakeResend {
    /// Every monitor poll until the first heartbeat
    #[default]
    EveryPoll,
    /// Only on heartbeat checks that count a miss
    OnCheck,
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Monitoring
    /// Liveness poll interval in ms
    pub poll_interval_ms: u32,
    /// Heartbeat staleness check interval in seconds
    pub heartbeat_check_interval_secs: u32,
    /// Age after which a heartbeat counts as missed, in seconds
    pub heartbeat_timeout_secs: u32,
    /// Consecutive misses before the game is killed
    pub max_missed_heartbeats: u32,
    pub handshake_resend: HandshakeResend,

    // Recovery
    /// Automatic restarts after crashes before giving up
    pub max_crash_retries: u32,
    /// Delay before a crashed profile is restarted, in seconds
    pub crash_restart_delay_secs: u32,
    /// Uptime after which a restarted profile's crash count starts over, in seconds
    pub crash_reset_after_secs: u32,
    /// Grace period between close request and kill, in seconds
    pub termination_grace_secs: u32,

    // Launch
    /// Companion scripting module loaded into every game
    pub companion_module: Option<PathBuf>,
    /// Handle passed to games for the message channel
    pub channel_handle: String,

    // Advanced
    /// Custom data directory
    pub data_directory: Option<PathBuf>,
    /// Days of profile history kept
    pub history_retention_days: u32,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            heartbeat_check_interval_secs: 10,
            heartbeat_timeout_secs: 30,
            max_missed_heartbeats: 3,
            handshake_resend: HandshakeResend::EveryPoll,

            max_crash_retries: 5,
            crash_restart_delay_secs: 5,
            crash_reset_after_secs: 600,
            termination_grace_secs: 5,

            companion_module: None,
            channel_handle: String::new(),

            data_directory: None,
            history_retention_days: 30,
            debug_logging: false,
        }
    }
}

/// Timing knobs the engine and monitor read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimings {
    pub poll_interval: Duration,
    pub heartbeat_check_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub max_missed_heartbeats: u32,
    pub handshake_resend: HandshakeResend,
    pub max_crash_retries: u32,
    pub crash_restart_delay: Duration,
    /// Uptime that clears the crash count of an automatically restarted run
    pub crash_reset_after: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Settings::default().timings()
    }
}

impl Settings {
    /// Get the data directory, using default if not set
    pub fn get_data_directory(&self) -> PathBuf {
        self.data_directory.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Herdsman")
        })
    }

    /// Get the database file path
    pub fn get_database_path(&self) -> PathBuf {
        self.get_data_directory().join("herdsman.db")
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.poll_interval_ms = self.poll_interval_ms.max(100);
        self.heartbeat_check_interval_secs = self.heartbeat_check_interval_secs.max(1);
        self.heartbeat_timeout_secs = self.heartbeat_timeout_secs.max(1);
        self.max_missed_heartbeats = self.max_missed_heartbeats.max(1);
        self.termination_grace_secs = self.termination_grace_secs.clamp(1, 60);
        self.crash_reset_after_secs = self.crash_reset_after_secs.max(self.heartbeat_timeout_secs);
        self.history_retention_days = self.history_retention_days.max(1);
    }

    pub fn timings(&self) -> EngineTimings {
        EngineTimings {
            poll_interval: Duration::from_millis(self.poll_interval_ms as u64),
            heartbeat_check_interval: Duration::from_secs(self.heartbeat_check_interval_secs as u64),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs as u64),
            max_missed_heartbeats: self.max_missed_heartbeats,
            handshake_resend: self.handshake_resend,
            max_crash_retries: self.max_crash_retries,
            crash_restart_delay: Duration::from_secs(self.crash_restart_delay_secs as u64),
            crash_reset_after: Duration::from_secs(self.crash_reset_after_secs as u64),
        }
    }
}
