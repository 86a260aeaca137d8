//! Unix process control via signals

use anyhow::{Context, Result};
use std::process::{Child, Command};

use crate::core::{LaunchRequest, ProcessOpener, RemoteProcess};

fn signal(pid: u32, signal: i32, what: &str) -> Result<()> {
    unsafe {
        let result = libc::kill(pid as i32, signal);
        if result == 0 {
            Ok(())
        } else {
            anyhow::bail!(
                "Failed to {} process {}: {}",
                what,
                pid,
                std::io::Error::last_os_error()
            )
        }
    }
}

/// Start the game and stop it until patching is done
pub fn spawn_suspended(request: &LaunchRequest) -> Result<Child> {
    let child = Command::new(&request.executable)
        .args(&request.arguments)
        .current_dir(&request.working_directory)
        .spawn()
        .with_context(|| format!("Failed to start {:?}", request.executable))?;
    signal(child.id(), libc::SIGSTOP, "suspend")?;
    Ok(child)
}

/// Resume a suspended process (SIGCONT)
pub fn resume_process(pid: u32) -> Result<()> {
    signal(pid, libc::SIGCONT, "resume")
}

/// Ask the process to exit (SIGTERM)
pub fn close_windows(pid: u32) -> Result<()> {
    signal(pid, libc::SIGTERM, "terminate")
}

/// No remote memory access on this platform; every open fails
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixOpener;

pub enum Unsupported {}

impl RemoteProcess for Unsupported {
    fn allocate(&self, _size: usize) -> Result<usize> {
        match *self {}
    }
    fn free(&self, _address: usize) -> Result<()> {
        match *self {}
    }
    fn write(&self, _address: usize, _data: &[u8]) -> Result<()> {
        match *self {}
    }
    fn protect(&self, _address: usize, _size: usize, _protection: u32) -> Result<u32> {
        match *self {}
    }
    fn run_loader(&self, _argument: usize) -> Result<u32> {
        match *self {}
    }
}

impl ProcessOpener for UnixOpener {
    type Process = Unsupported;

    fn open(&self, pid: u32) -> Result<Unsupported> {
        anyhow::bail!("Patching process {} is not supported on this platform", pid)
    }
}
