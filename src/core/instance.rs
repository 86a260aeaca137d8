//! Profile instance - Runtime state of one supervised profile

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{EngineError, EngineResult};
use super::supervisor::ChildProcess;

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl InstanceState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
        }
    }

    /// Regular transitions. Forced stops bypass this table.
    pub fn can_transition(&self, to: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Starting)
                | (Running, Starting)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Starting, Stopped)
                | (Running, Stopped)
        )
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Proof that the caller holds the instance's transition lock
pub struct TransitionGuard<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

/// Read-only view of an instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub name: String,
    pub state: InstanceState,
    pub pid: Option<u32>,
    pub key_list: Option<String>,
    pub current_key: Option<String>,
    pub crash_count: u32,
    pub missed_heartbeats: u32,
    pub status_text: String,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

struct InstanceInner {
    state: InstanceState,
    process: Option<Arc<dyn ChildProcess>>,
    key_list: Option<String>,
    current_key: Option<String>,
    crash_count: u32,
    missed_heartbeats: u32,
    last_heartbeat: Option<Instant>,
    started_at: Option<Instant>,
    started_wall: Option<DateTime<Utc>>,
    status_text: String,
    last_error: Option<String>,
    cancel: CancellationToken,
}

/// Runtime state machine for one profile.
///
/// Field access goes through a short std mutex; whole transitions are
/// serialized by an async lock that callers hold across awaits.
pub struct ProfileInstance {
    name: RwLock<String>,
    inner: Mutex<InstanceInner>,
    transitions: tokio::sync::Mutex<()>,
}

impl ProfileInstance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: RwLock::new(name.into()),
            inner: Mutex::new(InstanceInner {
                state: InstanceState::Stopped,
                process: None,
                key_list: None,
                current_key: None,
                crash_count: 0,
                missed_heartbeats: 0,
                last_heartbeat: None,
                started_at: None,
                started_wall: None,
                status_text: String::new(),
                last_error: None,
                cancel: CancellationToken::new(),
            }),
            transitions: tokio::sync::Mutex::new(()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, InstanceInner> {
        // Nothing panics while holding this lock; recover the data if it ever does.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> String {
        self.name
            .read()
            .map(|n| n.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub(crate) fn set_name(&self, name: &str) {
        let mut current = self.name.write().unwrap_or_else(|e| e.into_inner());
        *current = name.to_string();
    }

    /// Serialize a transition on this instance
    pub async fn lock_transitions(&self) -> TransitionGuard<'_> {
        TransitionGuard {
            _guard: self.transitions.lock().await,
        }
    }

    pub fn state(&self) -> InstanceState {
        self.inner().state
    }

    /// Move to `to`, rejecting transitions the state machine does not allow
    pub fn transition(&self, _guard: &TransitionGuard<'_>, to: InstanceState) -> EngineResult<()> {
        let mut inner = self.inner();
        if !inner.state.can_transition(to) {
            return Err(EngineError::StateConflict(format!(
                "'{}' cannot go from {} to {}",
                self.name(),
                inner.state,
                to
            )));
        }
        debug!("Instance '{}': {} -> {}", self.name(), inner.state, to);
        inner.state = to;
        Ok(())
    }

    /// Short-circuit to Stopped from any state, dropping the process handle
    pub fn force_stopped(&self, _guard: &TransitionGuard<'_>, error: Option<String>) {
        let mut inner = self.inner();
        inner.state = InstanceState::Stopped;
        inner.process = None;
        inner.current_key = None;
        inner.missed_heartbeats = 0;
        inner.last_heartbeat = None;
        inner.started_at = None;
        inner.last_error = error;
    }

    /// Record a fresh launch and move to Running
    pub fn mark_running(
        &self,
        guard: &TransitionGuard<'_>,
        process: Arc<dyn ChildProcess>,
        reset_crashes: bool,
    ) -> EngineResult<()> {
        self.transition(guard, InstanceState::Running)?;
        let mut inner = self.inner();
        inner.process = Some(process);
        inner.missed_heartbeats = 0;
        inner.last_heartbeat = None;
        inner.started_at = Some(Instant::now());
        inner.started_wall = Some(Utc::now());
        inner.last_error = None;
        if reset_crashes {
            inner.crash_count = 0;
        }
        Ok(())
    }

    pub fn process(&self) -> Option<Arc<dyn ChildProcess>> {
        self.inner().process.clone()
    }

    pub fn take_process(&self) -> Option<Arc<dyn ChildProcess>> {
        self.inner().process.take()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner().process.as_ref().map(|p| p.pid())
    }

    pub fn key_list(&self) -> Option<String> {
        self.inner().key_list.clone()
    }

    pub fn set_key_list(&self, list: Option<String>) {
        self.inner().key_list = list;
    }

    pub fn current_key(&self) -> Option<String> {
        self.inner().current_key.clone()
    }

    pub fn set_current_key(&self, key: Option<String>) {
        self.inner().current_key = key;
    }

    /// The key this instance holds on `list`, if it is active on that list
    pub fn key_in_use_on(&self, list: &str) -> Option<String> {
        let inner = self.inner();
        if inner.state.is_active() && inner.key_list.as_deref() == Some(list) {
            inner.current_key.clone()
        } else {
            None
        }
    }

    pub fn crash_count(&self) -> u32 {
        self.inner().crash_count
    }

    /// Bump the crash counter if another retry is allowed; returns the new count
    pub fn try_count_crash(&self, max_retries: u32) -> Option<u32> {
        let mut inner = self.inner();
        if inner.crash_count < max_retries {
            inner.crash_count += 1;
            Some(inner.crash_count)
        } else {
            None
        }
    }

    pub fn reset_crash_count(&self) {
        self.inner().crash_count = 0;
    }

    pub fn record_heartbeat(&self) {
        let mut inner = self.inner();
        inner.last_heartbeat = Some(Instant::now());
        inner.missed_heartbeats = 0;
    }

    pub fn has_heartbeat(&self) -> bool {
        self.inner().last_heartbeat.is_some()
    }

    /// Time since the last heartbeat, or since start when none arrived yet
    pub fn heartbeat_age(&self) -> Option<std::time::Duration> {
        let inner = self.inner();
        inner
            .last_heartbeat
            .or(inner.started_at)
            .map(|t| Instant::now().saturating_duration_since(t))
    }

    /// Count a missed heartbeat check; returns the running total
    pub fn miss_heartbeat(&self) -> u32 {
        let mut inner = self.inner();
        inner.missed_heartbeats += 1;
        inner.missed_heartbeats
    }

    pub fn missed_heartbeats(&self) -> u32 {
        self.inner().missed_heartbeats
    }

    pub fn status_text(&self) -> String {
        self.inner().status_text.clone()
    }

    pub fn set_status_text(&self, text: impl Into<String>) {
        self.inner().status_text = text.into();
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner().last_error.clone()
    }

    pub fn set_last_error(&self, error: Option<String>) {
        self.inner().last_error = error;
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.inner().cancel.clone()
    }

    /// Install a fresh token for a new user-initiated run
    pub fn renew_cancel_token(&self) -> CancellationToken {
        let mut inner = self.inner();
        inner.cancel = CancellationToken::new();
        inner.cancel.clone()
    }

    pub fn cancel(&self) {
        self.inner().cancel.cancel();
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        let name = self.name();
        let inner = self.inner();
        InstanceSnapshot {
            name,
            state: inner.state,
            pid: inner.process.as_ref().map(|p| p.pid()),
            key_list: inner.key_list.clone(),
            current_key: inner.current_key.clone(),
            crash_count: inner.crash_count,
            missed_heartbeats: inner.missed_heartbeats,
            status_text: inner.status_text.clone(),
            last_error: inner.last_error.clone(),
            started_at: inner.started_wall,
        }
    }
}
