//! Process injector - Writes byte patches into another process.
//!
//! The target may still be suspended before its entry point, so the module
//! holding the patch site is not assumed to be mapped. A remote thread runs
//! the target's own module loader on the module path; the loader returns the
//! base address either way (fresh load or already mapped). The thread is a new,
//! unsuspended thread, so this works on a suspended process as well.
//!
//! Every failure is logged and reported as `false`. Nothing propagates out of
//! [`ProcessInjector::apply_patch`].

use std::path::Path;

use tracing::{debug, error, warn};

use super::error::{EngineError, EngineResult};

/// `PAGE_EXECUTE_READWRITE`
pub const PAGE_EXECUTE_READWRITE: u32 = 0x40;

/// Memory and thread primitives on an opened target process
pub trait RemoteProcess {
    /// Reserve and commit `size` bytes of read-write memory; returns the address
    fn allocate(&self, size: usize) -> anyhow::Result<usize>;
    /// Release memory returned by [`allocate`](Self::allocate)
    fn free(&self, address: usize) -> anyhow::Result<()>;
    fn write(&self, address: usize, data: &[u8]) -> anyhow::Result<()>;
    /// Change protection of a region; returns the previous protection
    fn protect(&self, address: usize, size: usize, protection: u32) -> anyhow::Result<u32>;
    /// Run the module loader in a new remote thread with `argument`, wait for
    /// it and return the thread exit code
    fn run_loader(&self, argument: usize) -> anyhow::Result<u32>;
}

/// Opens target processes with create-thread, VM and query rights
pub trait ProcessOpener: Send + Sync {
    type Process: RemoteProcess;

    fn open(&self, pid: u32) -> anyhow::Result<Self::Process>;
}

/// Remote buffer freed on drop
struct RemoteAllocation<'a, P: RemoteProcess> {
    process: &'a P,
    address: usize,
}

impl<'a, P: RemoteProcess> RemoteAllocation<'a, P> {
    fn new(process: &'a P, size: usize) -> EngineResult<Self> {
        let address = process
            .allocate(size)
            .map_err(|e| EngineError::OsOperationFailed(format!("allocate: {}", e)))?;
        Ok(Self { process, address })
    }
}

impl<P: RemoteProcess> Drop for RemoteAllocation<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.process.free(self.address) {
            warn!("Failed to free remote buffer at {:#x}: {}", self.address, e);
        }
    }
}

/// Temporary protection change restored on drop
struct ProtectionChange<'a, P: RemoteProcess> {
    process: &'a P,
    address: usize,
    size: usize,
    original: u32,
}

impl<'a, P: RemoteProcess> ProtectionChange<'a, P> {
    fn new(process: &'a P, address: usize, size: usize, protection: u32) -> EngineResult<Self> {
        let original = process
            .protect(address, size, protection)
            .map_err(|e| EngineError::OsOperationFailed(format!("protect: {}", e)))?;
        Ok(Self {
            process,
            address,
            size,
            original,
        })
    }
}

impl<P: RemoteProcess> Drop for ProtectionChange<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.process.protect(self.address, self.size, self.original) {
            error!(
                "Failed to restore protection {:#x} at {:#x}: {}",
                self.original, self.address, e
            );
        }
    }
}

/// Null-terminated UTF-16 bytes of a path, as the wide loader expects
fn wide_path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

/// Applies patches and loads modules in target processes
pub struct ProcessInjector<O: ProcessOpener> {
    opener: O,
}

impl<O: ProcessOpener> ProcessInjector<O> {
    pub fn new(opener: O) -> Self {
        Self { opener }
    }

    /// Write `bytes` at `module base + offset` in process `pid`
    pub fn apply_patch(&self, pid: u32, module_path: &Path, offset: usize, bytes: &[u8]) -> bool {
        match self.try_apply_patch(pid, module_path, offset, bytes) {
            Ok(address) => {
                debug!(
                    "Patched {} byte(s) at {:#x} ({}+{:#x}) in PID {}",
                    bytes.len(),
                    address,
                    module_path.display(),
                    offset,
                    pid
                );
                true
            }
            Err(e) => {
                error!(
                    "Patch {}+{:#x} in PID {} failed: {}",
                    module_path.display(),
                    offset,
                    pid,
                    e
                );
                false
            }
        }
    }

    /// Make sure `module_path` is loaded in `pid`
    pub fn load_module(&self, pid: u32, module_path: &Path) -> bool {
        let result = self
            .open(pid)
            .and_then(|process| Self::module_base(&process, module_path));
        match result {
            Ok(base) => {
                debug!("Module {} at {:#x} in PID {}", module_path.display(), base, pid);
                true
            }
            Err(e) => {
                error!("Loading {} into PID {} failed: {}", module_path.display(), pid, e);
                false
            }
        }
    }

    fn open(&self, pid: u32) -> EngineResult<O::Process> {
        self.opener
            .open(pid)
            .map_err(|e| EngineError::OsOperationFailed(format!("open process {}: {}", pid, e)))
    }

    fn try_apply_patch(
        &self,
        pid: u32,
        module_path: &Path,
        offset: usize,
        bytes: &[u8],
    ) -> EngineResult<usize> {
        if bytes.is_empty() {
            return Err(EngineError::Configuration("empty patch payload".into()));
        }
        let process = self.open(pid)?;
        let base = Self::module_base(&process, module_path)?;
        let address = base.checked_add(offset).ok_or_else(|| {
            EngineError::Configuration(format!("offset {:#x} overflows base {:#x}", offset, base))
        })?;

        let _protection =
            ProtectionChange::new(&process, address, bytes.len(), PAGE_EXECUTE_READWRITE)?;
        process
            .write(address, bytes)
            .map_err(|e| EngineError::OsOperationFailed(format!("write: {}", e)))?;
        Ok(address)
    }

    /// Base of the module in the target, loading it first if necessary
    fn module_base(process: &O::Process, module_path: &Path) -> EngineResult<usize> {
        let path = wide_path_bytes(module_path);
        let buffer = RemoteAllocation::new(process, path.len())?;
        process
            .write(buffer.address, &path)
            .map_err(|e| EngineError::OsOperationFailed(format!("write module path: {}", e)))?;

        let base = process
            .run_loader(buffer.address)
            .map_err(|e| EngineError::OsOperationFailed(format!("remote thread: {}", e)))?;
        if base == 0 {
            return Err(EngineError::Configuration(format!(
                "module {} could not be loaded",
                module_path.display()
            )));
        }
        Ok(base as usize)
    }
}
