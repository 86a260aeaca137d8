//! Process supervision - Launching, patching and terminating game processes

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::{EngineError, EngineResult};
use super::keys::CdKey;
use super::patches::{PatchCatalog, PatchEntry};
use super::profile::{Profile, WindowPlacement};
use super::settings::Settings;

/// How often termination polls for exit during the grace period
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A launched OS process
pub trait ChildProcess: Send + Sync {
    fn pid(&self) -> u32;
    /// `Some(code)` once the process has exited
    fn exit_code(&self) -> anyhow::Result<Option<i32>>;
    /// Ask the process to close its windows and exit
    fn request_close(&self) -> anyhow::Result<()>;
    fn kill(&self) -> anyhow::Result<()>;
}

/// Everything needed to start one game process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub profile: String,
    pub executable: PathBuf,
    pub working_directory: PathBuf,
    pub arguments: Vec<String>,
    pub visible: bool,
    pub window: WindowPlacement,
}

/// OS-facing half of the supervisor
pub trait ProcessBackend: Send + Sync {
    /// Start the process, suspended before its entry point where the OS allows it
    fn spawn(&self, request: &LaunchRequest) -> anyhow::Result<Arc<dyn ChildProcess>>;
    /// Let a suspended process run
    fn resume(&self, pid: u32) -> anyhow::Result<()>;
    fn apply_patch(&self, pid: u32, module_path: &Path, offset: usize, bytes: &[u8]) -> bool;
    fn load_module(&self, pid: u32, module_path: &Path) -> bool;
    fn show_window(&self, pid: u32, visible: bool) -> anyhow::Result<()>;
    fn move_window(&self, pid: u32, placement: WindowPlacement) -> anyhow::Result<()>;
}

/// Launch-time options shared by every profile
#[derive(Debug, Clone, Default)]
pub struct SupervisorOptions {
    /// Companion scripting module loaded into every game
    pub companion_module: Option<PathBuf>,
    /// Handle the game uses to reach the message channel
    pub channel_handle: String,
    /// Grace period between close request and kill
    pub termination_grace: Duration,
}

impl From<&Settings> for SupervisorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            companion_module: settings.companion_module.clone(),
            channel_handle: settings.channel_handle.clone(),
            termination_grace: Duration::from_secs(settings.termination_grace_secs as u64),
        }
    }
}

/// Run OS work on the blocking pool. A panic resumes in the awaiting task.
async fn run_blocking<T, F>(work: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => match e.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            Err(e) => Err(EngineError::ProcessLifecycle(format!(
                "blocking task cancelled: {}",
                e
            ))),
        },
    }
}

/// Launches profiles and tears them down
pub struct ProcessSupervisor {
    backend: Arc<dyn ProcessBackend>,
    catalog: PatchCatalog,
    options: SupervisorOptions,
}

impl ProcessSupervisor {
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        catalog: PatchCatalog,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            backend,
            catalog,
            options,
        }
    }

    /// Handle passed to games and sent in handshakes
    pub fn channel_handle(&self) -> &str {
        &self.options.channel_handle
    }

    /// Command line for a profile, optionally carrying a key pair
    pub fn launch_arguments(&self, profile: &Profile, key: Option<&CdKey>) -> Vec<String> {
        let mut args: Vec<String> = profile
            .launch_parameters
            .split_whitespace()
            .map(str::to_string)
            .collect();

        args.extend(["-title".to_string(), profile.name.clone()]);
        args.extend(["-profile".to_string(), profile.name.clone()]);
        if !self.options.channel_handle.is_empty() {
            args.extend(["-handle".to_string(), self.options.channel_handle.clone()]);
        }
        if let Some(key) = key {
            args.extend(["-d2c".to_string(), key.classic.clone()]);
            args.extend(["-d2x".to_string(), key.expansion.clone()]);
        }
        if let Some(ref module) = self.options.companion_module {
            args.extend(["-companion".to_string(), module.display().to_string()]);
        }
        if !profile.entry_script.is_empty() {
            args.extend(["-script".to_string(), profile.entry_script.clone()]);
        }
        args.extend([
            "-x".to_string(),
            profile.window.x.to_string(),
            "-y".to_string(),
            profile.window.y.to_string(),
        ]);
        if !profile.visible {
            args.push("-hidden".to_string());
        }
        args
    }

    /// Path of a patched module: the executable itself or a file next to it
    fn resolve_module(profile: &Profile, module: &str) -> PathBuf {
        let is_executable = profile
            .game_path
            .file_name()
            .map(|f| f.to_string_lossy().eq_ignore_ascii_case(module))
            .unwrap_or(false);
        if is_executable {
            profile.game_path.clone()
        } else {
            profile.game_directory().join(module)
        }
    }

    /// Spawn the game, patch it before it runs and let it go.
    ///
    /// The OS work runs on the blocking pool so a slow remote thread in one
    /// game never stalls the monitors of the others.
    pub async fn launch(
        &self,
        profile: &Profile,
        key: Option<&CdKey>,
    ) -> EngineResult<Arc<dyn ChildProcess>> {
        if profile.game_path.as_os_str().is_empty() {
            return Err(EngineError::Configuration(format!(
                "profile '{}' has no game path",
                profile.name
            )));
        }

        let request = LaunchRequest {
            profile: profile.name.clone(),
            executable: profile.game_path.clone(),
            working_directory: profile.game_directory(),
            arguments: self.launch_arguments(profile, key),
            visible: profile.visible,
            window: profile.window,
        };
        let patches: Vec<(PathBuf, PatchEntry)> = self
            .catalog
            .for_version(&profile.game_version)
            .into_iter()
            .map(|patch| (Self::resolve_module(profile, &patch.module), patch.clone()))
            .collect();

        info!(
            "Launching '{}' from {:?}",
            profile.name, profile.game_path
        );
        let backend = Arc::clone(&self.backend);
        let companion = self.options.companion_module.clone();
        let version = profile.game_version.clone();
        run_blocking(move || {
            Self::launch_blocking(
                backend.as_ref(),
                &request,
                &patches,
                companion.as_deref(),
                &version,
            )
        })
        .await
    }

    fn launch_blocking(
        backend: &dyn ProcessBackend,
        request: &LaunchRequest,
        patches: &[(PathBuf, PatchEntry)],
        companion: Option<&Path>,
        version: &str,
    ) -> EngineResult<Arc<dyn ChildProcess>> {
        let name = &request.profile;
        let process = backend.spawn(request).map_err(|e| {
            EngineError::ProcessLifecycle(format!("failed to launch '{}': {}", name, e))
        })?;
        let pid = process.pid();

        let mut applied = 0;
        for (module, patch) in patches {
            if backend.apply_patch(pid, module, patch.offset, &patch.bytes) {
                applied += 1;
            } else {
                warn!(
                    "Patch {}+{:#x} not applied to '{}'",
                    patch.module, patch.offset, name
                );
            }
        }
        if !patches.is_empty() {
            debug!(
                "Applied {}/{} patch(es) for version {} to PID {}",
                applied,
                patches.len(),
                version,
                pid
            );
        }

        if let Some(module) = companion {
            if !backend.load_module(pid, module) {
                warn!("Companion module not loaded into '{}'", name);
            }
        }

        if let Err(e) = backend.resume(pid) {
            let _ = process.kill();
            return Err(EngineError::ProcessLifecycle(format!(
                "failed to resume '{}': {}",
                name, e
            )));
        }

        info!("'{}' running as PID {}", name, pid);
        Ok(process)
    }

    /// Ask the process to exit; kill it when the grace period runs out.
    /// Returns true when the kill was needed.
    pub async fn terminate(&self, process: Arc<dyn ChildProcess>) -> EngineResult<bool> {
        let pid = process.pid();
        if matches!(process.exit_code(), Ok(Some(_))) {
            return Ok(false);
        }

        if let Err(e) = process.request_close() {
            debug!("Close request to PID {} failed: {}", pid, e);
        }

        let deadline = tokio::time::Instant::now() + self.options.termination_grace;
        while tokio::time::Instant::now() < deadline {
            if matches!(process.exit_code(), Ok(Some(_))) {
                debug!("PID {} exited gracefully", pid);
                return Ok(false);
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        warn!("PID {} did not exit in time, killing", pid);
        self.kill(process).await?;
        Ok(true)
    }

    /// Kill and reap the process on the blocking pool
    pub async fn kill(&self, process: Arc<dyn ChildProcess>) -> EngineResult<()> {
        run_blocking(move || {
            process.kill().map_err(|e| {
                EngineError::OsOperationFailed(format!("kill PID {}: {}", process.pid(), e))
            })
        })
        .await
    }

    pub fn show_window(&self, pid: u32, visible: bool) -> EngineResult<()> {
        self.backend
            .show_window(pid, visible)
            .map_err(|e| EngineError::OsOperationFailed(format!("show window: {}", e)))
    }

    pub fn move_window(&self, pid: u32, placement: WindowPlacement) -> EngineResult<()> {
        self.backend
            .move_window(pid, placement)
            .map_err(|e| EngineError::OsOperationFailed(format!("move window: {}", e)))
    }
}
