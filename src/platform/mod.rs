//! Platform-specific implementations for Windows and Unix

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub mod unix;

use std::path::Path;
use std::process::Child;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::debug;

use crate::core::{
    ChildProcess, LaunchRequest, ProcessBackend, ProcessInjector, WindowPlacement,
};

#[cfg(windows)]
use self::windows as native;
#[cfg(unix)]
use self::unix as native;

#[cfg(windows)]
type NativeOpener = windows::WindowsOpener;
#[cfg(unix)]
type NativeOpener = unix::UnixOpener;

/// A game process started by [`NativeBackend`]
pub struct SpawnedProcess {
    pid: u32,
    child: Mutex<Child>,
}

impl SpawnedProcess {
    fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Mutex::new(child),
        }
    }

    fn child(&self) -> Result<std::sync::MutexGuard<'_, Child>> {
        self.child
            .lock()
            .map_err(|e| anyhow::anyhow!("Process lock poisoned: {}", e))
    }
}

impl ChildProcess for SpawnedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn exit_code(&self) -> Result<Option<i32>> {
        let status = self.child()?.try_wait()?;
        // Killed by a signal has no code; report it as a failure
        Ok(status.map(|s| s.code().unwrap_or(-1)))
    }

    fn request_close(&self) -> Result<()> {
        native::close_windows(self.pid)
    }

    fn kill(&self) -> Result<()> {
        let mut child = self.child()?;
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.kill()?;
        // Reap so the exit code is observable
        let _ = child.wait();
        Ok(())
    }
}

/// Process backend for the current OS
pub struct NativeBackend {
    injector: ProcessInjector<NativeOpener>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            injector: ProcessInjector::new(NativeOpener::default()),
        }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessBackend for NativeBackend {
    fn spawn(&self, request: &LaunchRequest) -> Result<Arc<dyn ChildProcess>> {
        let child = native::spawn_suspended(request)?;
        debug!("Spawned '{}' as PID {}", request.profile, child.id());
        Ok(Arc::new(SpawnedProcess::new(child)))
    }

    fn resume(&self, pid: u32) -> Result<()> {
        native::resume_process(pid)
    }

    fn apply_patch(&self, pid: u32, module_path: &Path, offset: usize, bytes: &[u8]) -> bool {
        self.injector.apply_patch(pid, module_path, offset, bytes)
    }

    fn load_module(&self, pid: u32, module_path: &Path) -> bool {
        self.injector.load_module(pid, module_path)
    }

    #[cfg(windows)]
    fn show_window(&self, pid: u32, visible: bool) -> Result<()> {
        windows::show_windows(pid, visible)
    }

    #[cfg(windows)]
    fn move_window(&self, pid: u32, placement: WindowPlacement) -> Result<()> {
        windows::move_windows(pid, placement)
    }

    #[cfg(not(windows))]
    fn show_window(&self, pid: u32, _visible: bool) -> Result<()> {
        anyhow::bail!("Window control for PID {} is not supported on this platform", pid)
    }

    #[cfg(not(windows))]
    fn move_window(&self, pid: u32, _placement: WindowPlacement) -> Result<()> {
        anyhow::bail!("Window control for PID {} is not supported on this platform", pid)
    }
}
