//! Profile engine - Orchestrates instances, keys, processes and recovery

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{EngineError, EngineResult};
use super::events::{EventSink, MessageChannel, MessageKind, ProfileSnapshot, ScriptMessage, StatusEvent};
use super::instance::{InstanceSnapshot, InstanceState, ProfileInstance, TransitionGuard};
use super::keys::{CdKey, KeyPool, KeyStatus};
use super::profile::{Profile, StatKind, WindowPlacement};
use super::registry::InstanceRegistry;
use super::settings::{EngineTimings, Settings};
use super::store::ProfileStore;
use super::supervisor::ProcessSupervisor;

/// Engine-wide configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub timings: EngineTimings,
}

impl From<&Settings> for EngineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            timings: settings.timings(),
        }
    }
}

/// Collaborators the engine is built from
pub struct EngineParts {
    pub profiles: Arc<dyn ProfileStore>,
    pub keys: Arc<KeyPool>,
    pub supervisor: ProcessSupervisor,
    pub channel: Arc<dyn MessageChannel>,
    pub sink: Arc<dyn EventSink>,
    pub config: EngineConfig,
}

/// Central supervision engine
pub struct ProfileEngine {
    pub(super) registry: InstanceRegistry,
    profiles: Arc<dyn ProfileStore>,
    keys: Arc<KeyPool>,
    pub(super) supervisor: ProcessSupervisor,
    channel: Arc<dyn MessageChannel>,
    sink: Arc<dyn EventSink>,
    pub(super) config: EngineConfig,
    /// Serializes read-modify-write cycles on stored profiles
    profile_writes: Mutex<()>,
}

impl ProfileEngine {
    /// Build the engine with one stopped instance per stored profile
    pub fn new(parts: EngineParts) -> EngineResult<Arc<Self>> {
        let registry = InstanceRegistry::new();
        for profile in parts.profiles.load_all_profiles()? {
            let instance = registry.insert(&profile.name)?;
            instance.set_key_list(profile.key_list.clone());
        }
        if registry.is_empty() {
            warn!("No profiles stored");
        } else {
            info!("Engine initialized with {} profile(s)", registry.len());
        }

        Ok(Arc::new(Self {
            registry,
            profiles: parts.profiles,
            keys: parts.keys,
            supervisor: parts.supervisor,
            channel: parts.channel,
            sink: parts.sink,
            config: parts.config,
            profile_writes: Mutex::new(()),
        }))
    }

    pub fn keys(&self) -> &Arc<KeyPool> {
        &self.keys
    }

    // === Lifecycle ===

    /// Start a stopped profile. Fails with `StateConflict` when it is already
    /// starting or running.
    pub async fn start_profile(self: &Arc<Self>, name: &str) -> EngineResult<()> {
        let instance = self.registry.get(name)?;
        let engine = Arc::clone(self);
        let task_instance = Arc::clone(&instance);
        self.run_isolated(&instance, "start", async move {
            engine.start_instance(&task_instance).await
        })
        .await
        .unwrap_or_else(|| {
            Err(EngineError::ProcessLifecycle(format!(
                "'{}' failed to start: internal fault",
                name
            )))
        })
    }

    async fn start_instance(self: &Arc<Self>, instance: &Arc<ProfileInstance>) -> EngineResult<()> {
        let name = instance.name();
        let guard = instance.lock_transitions().await;

        let state = instance.state();
        if state != InstanceState::Stopped {
            return Err(EngineError::StateConflict(format!(
                "'{}' is {}",
                name,
                state.label().to_lowercase()
            )));
        }
        instance.transition(&guard, InstanceState::Starting)?;
        instance.renew_cancel_token();
        instance.set_last_error(None);
        self.notify(instance, "Starting");

        match self.launch_locked(instance, &guard, true).await {
            Ok(()) => Ok(()),
            Err(e) => {
                instance.force_stopped(&guard, Some(e.to_string()));
                self.record_event(&name, "start_failed", Some(&e.to_string()));
                self.notify(instance, format!("Error: {}", e));
                Err(e)
            }
        }
    }

    /// Launch the game for an instance in `Starting` and move it to `Running`.
    /// On error the state is left untouched for the caller to settle.
    pub(super) async fn launch_locked(
        self: &Arc<Self>,
        instance: &Arc<ProfileInstance>,
        guard: &TransitionGuard<'_>,
        user_start: bool,
    ) -> EngineResult<()> {
        let name = instance.name();
        let profile = self
            .profiles
            .load_profile(&name)?
            .ok_or_else(|| EngineError::unknown_profile(&name))?;
        instance.set_key_list(profile.key_list.clone());

        let key = match profile.key_list {
            Some(ref list) => Some(self.assign_key(instance, list)?),
            None => None,
        };

        let process = match self.supervisor.launch(&profile, key.as_ref()).await {
            Ok(process) => process,
            Err(e) => {
                instance.set_current_key(None);
                return Err(e);
            }
        };

        let pid = process.pid();
        self.registry.bind_handle(pid, &name);
        instance.mark_running(guard, process, user_start)?;
        self.record_event(&name, "started", Some(&format!("pid {}", pid)));
        self.notify(instance, "Running");
        self.send_handshake(pid);
        self.spawn_monitor(Arc::clone(instance));
        Ok(())
    }

    /// Stop a profile gracefully. Stopping a stopped profile is a no-op.
    pub async fn stop_profile(&self, name: &str) -> EngineResult<()> {
        self.stop_instance(name, false).await
    }

    /// Kill a profile without the grace period
    pub async fn force_stop_profile(&self, name: &str) -> EngineResult<()> {
        self.stop_instance(name, true).await
    }

    async fn stop_instance(&self, name: &str, force: bool) -> EngineResult<()> {
        let instance = self.registry.get(name)?;
        // Cancel first so a monitor or pending restart gives up the guard
        instance.cancel();
        let guard = instance.lock_transitions().await;

        if instance.state() == InstanceState::Stopped {
            debug!("'{}' already stopped", name);
            return Ok(());
        }

        if !force {
            instance.transition(&guard, InstanceState::Stopping)?;
            self.notify(&instance, "Stopping");
        }

        if let Some(process) = instance.take_process() {
            self.registry.unbind_handle(process.pid());
            let result = if force {
                self.supervisor.kill(process).await
            } else {
                self.supervisor.terminate(process).await.map(|_| ())
            };
            if let Err(e) = result {
                warn!("Terminating '{}' failed: {}", name, e);
            }
        }

        instance.force_stopped(&guard, None);
        self.record_event(name, "stopped", None);
        self.notify(&instance, "Stopped");
        info!("'{}' stopped", name);
        Ok(())
    }

    /// Stop then start
    pub async fn restart_profile(self: &Arc<Self>, name: &str) -> EngineResult<()> {
        self.stop_profile(name).await?;
        self.start_profile(name).await
    }

    /// Start every profile concurrently; returns each profile's outcome
    pub async fn start_all(self: &Arc<Self>) -> Vec<(String, EngineResult<()>)> {
        let mut set = JoinSet::new();
        for name in self.registry.names() {
            let engine = Arc::clone(self);
            set.spawn(async move {
                let result = engine.start_profile(&name).await;
                (name, result)
            });
        }
        Self::join_all(set).await
    }

    /// Stop every profile concurrently
    pub async fn stop_all(self: &Arc<Self>) -> Vec<(String, EngineResult<()>)> {
        let mut set = JoinSet::new();
        for name in self.registry.names() {
            let engine = Arc::clone(self);
            set.spawn(async move {
                let result = engine.stop_profile(&name).await;
                (name, result)
            });
        }
        Self::join_all(set).await
    }

    async fn join_all(
        mut set: JoinSet<(String, EngineResult<()>)>,
    ) -> Vec<(String, EngineResult<()>)> {
        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Profile task failed: {}", e),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    // === Recovery ===

    /// Clean exit of a running game
    pub(super) async fn handle_exit(&self, instance: &Arc<ProfileInstance>, token: &CancellationToken) {
        let guard = instance.lock_transitions().await;
        if token.is_cancelled() {
            return;
        }
        let name = instance.name();
        if let Some(process) = instance.take_process() {
            self.registry.unbind_handle(process.pid());
        }
        instance.force_stopped(&guard, None);
        self.record_event(&name, "exited", None);
        self.notify(instance, "Stopped");
        info!("'{}' exited cleanly", name);
    }

    /// Crash path: count, release the key, then restart or give up
    pub(super) async fn handle_failure(
        self: &Arc<Self>,
        instance: &Arc<ProfileInstance>,
        token: &CancellationToken,
        reason: String,
    ) {
        let guard = instance.lock_transitions().await;
        if token.is_cancelled() {
            return;
        }
        let name = instance.name();
        if let Some(process) = instance.take_process() {
            self.registry.unbind_handle(process.pid());
        }
        instance.set_current_key(None);
        self.bump_stat(&name, StatKind::Crash);
        self.record_event(&name, "crash", Some(&reason));

        let max = self.config.timings.max_crash_retries;
        match instance.try_count_crash(max) {
            Some(attempt) => {
                if let Err(e) = instance.transition(&guard, InstanceState::Starting) {
                    error!("'{}' cannot restart: {}", name, e);
                    instance.force_stopped(&guard, Some(e.to_string()));
                    self.notify(instance, format!("Error: {}", e));
                    return;
                }
                self.bump_stat(&name, StatKind::Restart);
                warn!("'{}' crashed ({}), restart {}/{}", name, reason, attempt, max);
                self.notify(
                    instance,
                    format!("Crashed ({}), restarting {}/{}", reason, attempt, max),
                );
                drop(guard);
                self.schedule_restart(Arc::clone(instance), token.clone());
            }
            None => {
                let message = format!("Crashed {} times, giving up: {}", max + 1, reason);
                error!("'{}': {}", name, message);
                instance.force_stopped(&guard, Some(message.clone()));
                self.disable_schedule(&name);
                self.record_event(&name, "gave_up", Some(&message));
                self.notify(instance, format!("Error: {}", message));
            }
        }
    }

    /// Relaunch after the crash delay in a fresh task
    fn schedule_restart(self: &Arc<Self>, instance: Arc<ProfileInstance>, token: CancellationToken) {
        let engine = Arc::clone(self);
        let delay = self.config.timings.crash_restart_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let restart = {
                let engine = Arc::clone(&engine);
                let instance = Arc::clone(&instance);
                async move {
                    let guard = instance.lock_transitions().await;
                    if token.is_cancelled() || instance.state() != InstanceState::Starting {
                        return;
                    }
                    if let Err(e) = engine.launch_locked(&instance, &guard, false).await {
                        drop(guard);
                        engine
                            .handle_failure(&instance, &token, format!("restart failed: {}", e))
                            .await;
                    }
                }
            };
            engine.run_isolated(&instance, "restart", restart).await;
        });
    }

    /// Run a task of one profile in its own task. A panic inside it settles
    /// only that profile; `None` means the task did not finish.
    pub(super) async fn run_isolated<T, F>(
        &self,
        instance: &Arc<ProfileInstance>,
        what: &str,
        task: F,
    ) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(task).await {
            Ok(value) => Some(value),
            Err(e) if e.is_panic() => {
                error!("{} task for '{}' panicked", what, instance.name());
                self.recover_from_fault(instance, format!("internal {} fault", what))
                    .await;
                None
            }
            Err(e) => {
                debug!("{} task for '{}' ended early: {}", what, instance.name(), e);
                None
            }
        }
    }

    /// Settle an instance whose task died unexpectedly
    async fn recover_from_fault(&self, instance: &Arc<ProfileInstance>, fault: String) {
        let guard = instance.lock_transitions().await;
        let name = instance.name();
        if let Some(process) = instance.take_process() {
            self.registry.unbind_handle(process.pid());
            if let Err(e) = self.supervisor.kill(process).await {
                warn!("Killing '{}' after {} failed: {}", name, fault, e);
            }
        }
        instance.force_stopped(&guard, Some(fault.clone()));
        self.record_event(&name, "fault", Some(&fault));
        self.notify(instance, format!("Error: {}", fault));
    }

    fn disable_schedule(&self, name: &str) {
        let result = self.update_profile(name, |profile| {
            if profile.schedule_enabled {
                profile.schedule_enabled = false;
                info!("Schedule disabled for '{}' after repeated crashes", profile.name);
            }
        });
        if let Err(e) = result {
            error!("Failed to disable schedule for '{}': {}", name, e);
        }
    }

    // === Keys ===

    /// Pick the next free key for an instance and record it as its current key
    fn assign_key(&self, instance: &ProfileInstance, list: &str) -> EngineResult<CdKey> {
        let name = instance.name();
        let key = self.keys.acquire_with(
            list,
            || self.registry.keys_in_use(list, &name),
            |key| instance.set_current_key(Some(key.name.clone())),
        )?;
        if let Err(e) = self.update_profile(&name, |p| p.stats.key_runs = 0) {
            warn!("Failed to reset key runs for '{}': {}", name, e);
        }
        info!("'{}' uses key '{}' from '{}'", name, key.name, list);
        Ok(key)
    }

    /// Swap the profile's key for the next free one. False without a key list,
    /// without a free key or when the profile is not running.
    pub async fn rotate_key(&self, name: &str) -> bool {
        let instance = match self.registry.get(name) {
            Ok(instance) => instance,
            Err(e) => {
                warn!("Rotate key: {}", e);
                return false;
            }
        };
        let _guard = instance.lock_transitions().await;
        if !instance.state().is_active() {
            warn!("Not rotating key of '{}': {}", name, instance.state());
            return false;
        }
        self.rotate_locked(&instance)
    }

    fn rotate_locked(&self, instance: &ProfileInstance) -> bool {
        let name = instance.name();
        let list = match self.profiles.load_profile(&name) {
            Ok(Some(profile)) => profile.key_list,
            Ok(None) => None,
            Err(e) => {
                warn!("Rotate key for '{}': {}", name, e);
                None
            }
        };
        let Some(list) = list else {
            warn!("'{}' has no key list", name);
            return false;
        };

        instance.set_key_list(Some(list.clone()));
        instance.set_current_key(None);
        match self.assign_key(instance, &list) {
            Ok(key) => {
                if let Some(pid) = instance.pid() {
                    let payload = format!("{}|{}", key.classic, key.expansion);
                    if let Err(e) = self.channel.send_message(pid, MessageKind::SetKey, &payload) {
                        warn!("Failed to send new key to '{}': {}", name, e);
                    }
                }
                self.notify(instance, format!("Key rotated to {}", key.name));
                true
            }
            Err(e) => {
                warn!("Rotate key for '{}' failed: {}", name, e);
                self.notify(instance, format!("Error: {}", e));
                false
            }
        }
    }

    /// Every key of a list, flagged when an active profile holds it
    pub fn key_status(&self, list: &str) -> EngineResult<Vec<KeyStatus>> {
        self.keys
            .list_status(list, &self.registry.keys_in_use(list, ""))
    }

    /// Give up the current key without touching the process
    pub fn release_key(&self, name: &str) -> EngineResult<()> {
        let instance = self.registry.get(name)?;
        if let Some(key) = instance.current_key() {
            instance.set_current_key(None);
            info!("'{}' released key '{}'", name, key);
        }
        Ok(())
    }

    /// Hold the profile's current key (persisted) and move to another one
    async fn hold_and_rotate(&self, name: &str, reason: &str) {
        let Ok(instance) = self.registry.get(name) else {
            return;
        };
        let _guard = instance.lock_transitions().await;
        if let (Some(list), Some(key)) = (instance.key_list(), instance.current_key()) {
            match self.keys.hold(&list, &key) {
                Ok(()) => warn!("Key '{}' held for '{}': {}", key, name, reason),
                Err(e) => error!("Failed to hold key '{}': {}", key, e),
            }
        }
        self.rotate_locked(&instance);
    }

    async fn realm_down(&self, name: &str) {
        let Ok(instance) = self.registry.get(name) else {
            return;
        };
        let _guard = instance.lock_transitions().await;
        if let (Some(list), Some(key)) = (instance.key_list(), instance.current_key()) {
            match self.keys.record_realm_down(&list, &key) {
                Ok(count) => warn!("Realm down on key '{}' ({} time(s))", key, count),
                Err(e) => error!("Failed to record realm down for '{}': {}", key, e),
            }
        }
        self.rotate_locked(&instance);
    }

    // === Profiles ===

    /// Register and persist a new profile
    pub fn add_profile(&self, profile: Profile) -> EngineResult<()> {
        let instance = self.registry.insert(&profile.name)?;
        instance.set_key_list(profile.key_list.clone());
        if let Err(e) = self.profiles.save_profile(&profile) {
            self.registry.remove(&profile.name);
            return Err(e.into());
        }
        info!("Added profile '{}'", profile.name);
        self.notify(&instance, "");
        Ok(())
    }

    /// Replace a profile's stored configuration, keeping its counters
    pub fn update_profile_config(&self, profile: Profile) -> EngineResult<()> {
        let instance = self.registry.get(&profile.name)?;
        let _lock = self.profile_writes.lock().unwrap_or_else(|e| e.into_inner());
        let mut profile = profile;
        if let Some(stored) = self.profiles.load_profile(&profile.name)? {
            profile.stats = stored.stats;
            profile.created_at = stored.created_at;
        }
        profile.mark_modified();
        self.profiles.save_profile(&profile)?;
        if !instance.state().is_active() {
            instance.set_key_list(profile.key_list.clone());
        }
        Ok(())
    }

    /// Rename a profile, re-keying the instance and its process handle
    pub fn rename_profile(&self, old: &str, new: &str) -> EngineResult<()> {
        if new.trim().is_empty() {
            return Err(EngineError::Configuration("profile name is empty".into()));
        }
        self.registry.get(old)?;
        if self.registry.contains(new) {
            return Err(EngineError::StateConflict(format!(
                "profile '{}' already exists",
                new
            )));
        }
        {
            let _lock = self.profile_writes.lock().unwrap_or_else(|e| e.into_inner());
            self.profiles.rename_profile(old, new)?;
        }
        let instance = self.registry.rename(old, new)?;
        info!("Renamed profile '{}' to '{}'", old, new);
        self.notify(&instance, instance.status_text());
        Ok(())
    }

    /// Stop, forget and delete a profile
    pub async fn remove_profile(&self, name: &str) -> EngineResult<()> {
        self.force_stop_profile(name).await?;
        if let Some(instance) = self.registry.remove(name) {
            instance.cancel();
        }
        self.profiles.delete_profile(name)?;
        info!("Removed profile '{}'", name);
        Ok(())
    }

    /// Zero the profile's counters and broadcast a fresh snapshot
    pub fn reset_stats(&self, name: &str) -> EngineResult<()> {
        self.registry.get(name)?;
        self.update_profile(name, |p| p.stats.reset())?;
        self.sink.snapshot(self.snapshot()?);
        Ok(())
    }

    /// Every profile with its runtime status
    pub fn snapshot(&self) -> EngineResult<Vec<ProfileSnapshot>> {
        let mut profiles = self.profiles.load_all_profiles()?;
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles
            .into_iter()
            .map(|profile| {
                let instance = self.registry.get(&profile.name).ok().map(|i| i.snapshot());
                ProfileSnapshot {
                    state: instance.as_ref().map(|i| i.state).unwrap_or(InstanceState::Stopped),
                    status: instance.as_ref().map(|i| i.status_text.clone()).unwrap_or_default(),
                    current_key: instance.as_ref().and_then(|i| i.current_key.clone()),
                    pid: instance.as_ref().and_then(|i| i.pid),
                    last_error: instance.and_then(|i| i.last_error),
                    profile,
                }
            })
            .collect())
    }

    pub fn instance(&self, name: &str) -> EngineResult<InstanceSnapshot> {
        Ok(self.registry.get(name)?.snapshot())
    }

    pub fn state(&self, name: &str) -> EngineResult<InstanceState> {
        Ok(self.registry.get(name)?.state())
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Load, change and store a profile as one step
    fn update_profile<F>(&self, name: &str, change: F) -> EngineResult<Profile>
    where
        F: FnOnce(&mut Profile),
    {
        let _lock = self.profile_writes.lock().unwrap_or_else(|e| e.into_inner());
        let mut profile = self
            .profiles
            .load_profile(name)?
            .ok_or_else(|| EngineError::unknown_profile(name))?;
        change(&mut profile);
        self.profiles.save_profile(&profile)?;
        Ok(profile)
    }

    fn bump_stat(&self, name: &str, kind: StatKind) {
        if let Err(e) = self.update_profile(name, |p| p.stats.increment(kind)) {
            error!("Failed to update {:?} counter for '{}': {}", kind, name, e);
        }
    }

    fn record_event(&self, name: &str, event: &str, details: Option<&str>) {
        if let Err(e) = self.profiles.record_event(name, event, details) {
            debug!("History for '{}' not recorded: {}", name, e);
        }
    }

    // === Script channel ===

    /// Route a message from a running game to its profile
    pub async fn handle_script_message(
        self: &Arc<Self>,
        pid: u32,
        message: ScriptMessage,
    ) -> EngineResult<()> {
        let Some(name) = self.registry.profile_for(pid) else {
            warn!("Ignoring {:?} from unknown PID {}", message, pid);
            return Ok(());
        };
        let instance = self.registry.get(&name)?;

        match message {
            ScriptMessage::Heartbeat => instance.record_heartbeat(),
            ScriptMessage::Status(text) => self.notify(&instance, text),
            ScriptMessage::Run => self.bump_stat(&name, StatKind::Run),
            ScriptMessage::Chicken => self.bump_stat(&name, StatKind::Chicken),
            ScriptMessage::Death => self.bump_stat(&name, StatKind::Death),
            ScriptMessage::KeyInUse => self.hold_and_rotate(&name, "in use").await,
            ScriptMessage::KeyDisabled => self.hold_and_rotate(&name, "disabled").await,
            ScriptMessage::RealmDown => self.realm_down(&name).await,
            ScriptMessage::Restart => {
                let engine = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = engine.restart_profile(&name).await {
                        warn!("Restart of '{}' requested by script failed: {}", name, e);
                    }
                });
            }
            ScriptMessage::Stop => {
                let engine = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = engine.stop_profile(&name).await {
                        warn!("Stop of '{}' requested by script failed: {}", name, e);
                    }
                });
            }
        }
        Ok(())
    }

    /// Heartbeat from the game running as `pid`; false when no profile owns it
    pub fn on_heartbeat(&self, pid: u32) -> bool {
        let instance = self
            .registry
            .profile_for(pid)
            .and_then(|name| self.registry.get(&name).ok());
        match instance {
            Some(instance) => {
                instance.record_heartbeat();
                true
            }
            None => {
                debug!("Heartbeat from unknown PID {}", pid);
                false
            }
        }
    }

    /// Deliver an ad hoc command to a running profile
    pub fn send_command(&self, name: &str, payload: &str) -> EngineResult<()> {
        let pid = self.running_pid(name)?;
        self.channel
            .send_message(pid, MessageKind::Command, payload)
            .map_err(|e| EngineError::OsOperationFailed(format!("send command: {}", e)))
    }

    pub(super) fn send_handshake(&self, pid: u32) {
        if let Err(e) = self
            .channel
            .send_message(pid, MessageKind::Handle, self.supervisor.channel_handle())
        {
            warn!("Handshake to PID {} failed: {}", pid, e);
        }
    }

    // === Windows ===

    pub fn show_window(&self, name: &str) -> EngineResult<()> {
        let pid = self.running_pid(name)?;
        self.supervisor.show_window(pid, true)
    }

    pub fn hide_window(&self, name: &str) -> EngineResult<()> {
        let pid = self.running_pid(name)?;
        self.supervisor.show_window(pid, false)
    }

    pub fn move_window(&self, name: &str, placement: WindowPlacement) -> EngineResult<()> {
        let pid = self.running_pid(name)?;
        self.supervisor.move_window(pid, placement)
    }

    fn running_pid(&self, name: &str) -> EngineResult<u32> {
        self.registry
            .get(name)?
            .pid()
            .ok_or_else(|| EngineError::StateConflict(format!("'{}' is not running", name)))
    }

    pub(super) fn notify(&self, instance: &ProfileInstance, status: impl Into<String>) {
        let status = status.into();
        instance.set_status_text(status.clone());
        self.sink.status_changed(StatusEvent {
            profile: instance.name(),
            state: instance.state(),
            status,
        });
    }
}
