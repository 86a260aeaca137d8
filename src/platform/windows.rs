//! Windows-specific process launch, injection and window control

use anyhow::{Context, Result};
use std::ffi::c_void;
use std::mem;
use std::os::windows::process::CommandExt;
use std::process::{Child, Command};
use tracing::{debug, warn};

use windows::core::{s, w};
use windows::Win32::Foundation::{
    CloseHandle, BOOL, FALSE, HANDLE, HWND, LPARAM, WAIT_OBJECT_0, WPARAM,
};
use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::Win32::System::Memory::{
    VirtualAllocEx, VirtualFreeEx, VirtualProtectEx, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
    PAGE_PROTECTION_FLAGS, PAGE_READWRITE,
};
use windows::Win32::System::Threading::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::core::{LaunchRequest, ProcessOpener, RemoteProcess, WindowPlacement};

/// How long the remote loader thread may take
const LOADER_TIMEOUT_MS: u32 = 10_000;

/// Process or thread handle closed on drop
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Start the game with its main thread suspended
pub fn spawn_suspended(request: &LaunchRequest) -> Result<Child> {
    Command::new(&request.executable)
        .args(&request.arguments)
        .current_dir(&request.working_directory)
        .creation_flags(CREATE_SUSPENDED.0)
        .spawn()
        .with_context(|| format!("Failed to start {:?}", request.executable))
}

/// Resume all threads in a process
pub fn resume_process(pid: u32) -> Result<()> {
    unsafe {
        let snapshot = OwnedHandle(CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0)?);

        let mut entry = THREADENTRY32 {
            dwSize: mem::size_of::<THREADENTRY32>() as u32,
            ..Default::default()
        };

        let mut resumed = 0;
        if Thread32First(snapshot.0, &mut entry).is_ok() {
            loop {
                if entry.th32OwnerProcessID == pid {
                    if let Ok(thread) = OpenThread(THREAD_SUSPEND_RESUME, FALSE, entry.th32ThreadID)
                    {
                        let thread = OwnedHandle(thread);
                        if ResumeThread(thread.0) != u32::MAX {
                            resumed += 1;
                        }
                    }
                }
                if Thread32Next(snapshot.0, &mut entry).is_err() {
                    break;
                }
            }
        }

        if resumed == 0 {
            anyhow::bail!("No threads of PID {} could be resumed", pid);
        }
        debug!("Resumed {} thread(s) of PID {}", resumed, pid);
        Ok(())
    }
}

/// Top-level windows owned by a process
fn process_windows(pid: u32) -> Vec<HWND> {
    unsafe extern "system" fn collect(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let found = &mut *(lparam.0 as *mut (u32, Vec<HWND>));
        let mut window_pid: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut window_pid));
        if window_pid == found.0 {
            found.1.push(hwnd);
        }
        BOOL::from(true)
    }

    let mut found: (u32, Vec<HWND>) = (pid, Vec::new());
    unsafe {
        let _ = EnumWindows(Some(collect), LPARAM(&mut found as *mut _ as isize));
    }
    found.1
}

/// Post WM_CLOSE to every window of the process
pub fn close_windows(pid: u32) -> Result<()> {
    let windows = process_windows(pid);
    if windows.is_empty() {
        anyhow::bail!("PID {} has no windows to close", pid);
    }
    for hwnd in windows {
        unsafe {
            if let Err(e) = PostMessageW(hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)) {
                debug!("WM_CLOSE to {:?} failed: {}", hwnd, e);
            }
        }
    }
    Ok(())
}

pub fn show_windows(pid: u32, visible: bool) -> Result<()> {
    let windows = process_windows(pid);
    if windows.is_empty() {
        anyhow::bail!("PID {} has no windows", pid);
    }
    let command = if visible { SW_SHOW } else { SW_HIDE };
    for hwnd in windows {
        unsafe {
            let _ = ShowWindow(hwnd, command);
        }
    }
    Ok(())
}

pub fn move_windows(pid: u32, placement: WindowPlacement) -> Result<()> {
    let windows = process_windows(pid);
    if windows.is_empty() {
        anyhow::bail!("PID {} has no windows", pid);
    }
    for hwnd in windows {
        unsafe {
            SetWindowPos(
                hwnd,
                HWND::default(),
                placement.x,
                placement.y,
                0,
                0,
                SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
            )
            .with_context(|| format!("Failed to move window of PID {}", pid))?;
        }
    }
    Ok(())
}

/// Opens processes for patching and module loading
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsOpener;

impl ProcessOpener for WindowsOpener {
    type Process = WindowsProcess;

    fn open(&self, pid: u32) -> Result<WindowsProcess> {
        let access = PROCESS_CREATE_THREAD
            | PROCESS_QUERY_INFORMATION
            | PROCESS_VM_OPERATION
            | PROCESS_VM_WRITE
            | PROCESS_VM_READ;
        let handle = unsafe { OpenProcess(access, FALSE, pid) }
            .with_context(|| format!("Failed to open process {}", pid))?;
        Ok(WindowsProcess {
            handle: OwnedHandle(handle),
        })
    }
}

/// An opened target process
pub struct WindowsProcess {
    handle: OwnedHandle,
}

impl RemoteProcess for WindowsProcess {
    fn allocate(&self, size: usize) -> Result<usize> {
        let address = unsafe {
            VirtualAllocEx(
                self.handle.0,
                None,
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        if address.is_null() {
            anyhow::bail!("VirtualAllocEx returned null: {}", windows::core::Error::from_win32());
        }
        Ok(address as usize)
    }

    fn free(&self, address: usize) -> Result<()> {
        unsafe { VirtualFreeEx(self.handle.0, address as *mut c_void, 0, MEM_RELEASE)? };
        Ok(())
    }

    fn write(&self, address: usize, data: &[u8]) -> Result<()> {
        let mut written = 0usize;
        unsafe {
            WriteProcessMemory(
                self.handle.0,
                address as *const c_void,
                data.as_ptr() as *const c_void,
                data.len(),
                Some(&mut written),
            )?;
        }
        if written != data.len() {
            anyhow::bail!("Wrote {} of {} bytes", written, data.len());
        }
        Ok(())
    }

    fn protect(&self, address: usize, size: usize, protection: u32) -> Result<u32> {
        let mut old = PAGE_PROTECTION_FLAGS(0);
        unsafe {
            VirtualProtectEx(
                self.handle.0,
                address as *const c_void,
                size,
                PAGE_PROTECTION_FLAGS(protection),
                &mut old,
            )?;
        }
        Ok(old.0)
    }

    fn run_loader(&self, argument: usize) -> Result<u32> {
        unsafe {
            // kernel32 is mapped at the same base in every process of a session
            let kernel32 = GetModuleHandleW(w!("kernel32.dll"))?;
            let load_library = GetProcAddress(kernel32, s!("LoadLibraryW"))
                .context("LoadLibraryW not found")?;
            let start: unsafe extern "system" fn(*mut c_void) -> u32 =
                mem::transmute(load_library);

            let thread = OwnedHandle(CreateRemoteThread(
                self.handle.0,
                None,
                0,
                Some(start),
                Some(argument as *const c_void),
                0,
                None,
            )?);

            if WaitForSingleObject(thread.0, LOADER_TIMEOUT_MS) != WAIT_OBJECT_0 {
                warn!("Remote loader thread did not finish in time");
                anyhow::bail!("Remote loader thread timed out");
            }

            let mut exit_code: u32 = 0;
            GetExitCodeThread(thread.0, &mut exit_code)?;
            Ok(exit_code)
        }
    }
}
