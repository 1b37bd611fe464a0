// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY spawn and async master I/O.
//!
//! The master fd is switched to non-blocking at spawn and driven through
//! `AsyncFd` readiness: wait for the fd, attempt the syscall, and retry on
//! a spurious wakeup. `io::Error` conversion comes straight from `Errno`.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, Pid};
use thiserror::Error;
use tokio::io::unix::AsyncFd;

/// Errors from PTY operations.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("forkpty failed: {0}")]
    Fork(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A shell running on a PTY.
pub struct Pty {
    master: AsyncFd<OwnedFd>,
    child_pid: Pid,
    // Packed (rows << 16 | cols), so resize idempotence needs no lock.
    size: AtomicU32,
}

impl Pty {
    /// Fork a PTY and exec the user's shell (`$SHELL`, fallback `/bin/sh`)
    /// in `cwd`.
    // Forking is inherently unsafe; the child's post-fork window is kept
    // to chdir + env + exec below.
    #[allow(unsafe_code)]
    pub fn spawn_shell(cwd: &Path, rows: u16, cols: u16) -> Result<Self, PtyError> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let winsize = Winsize { ws_row: rows, ws_col: cols, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: the forked child shares this process's address space
        // snapshot, so it must not touch daemon state. The child branch
        // below only enters `cwd`, sets its terminal environment, and
        // execs the shell; on exec failure it exits without unwinding.
        let forked =
            unsafe { forkpty(&winsize, None) }.map_err(|e| PtyError::Fork(e.to_string()))?;

        match forked {
            ForkptyResult::Child => {
                let _ = std::env::set_current_dir(cwd);
                std::env::set_var("TERM", "xterm-256color");
                std::env::set_var("PASEO", "1");

                let prog = CString::new(shell.as_bytes())
                    .unwrap_or_else(|_| CString::from(c"/bin/sh"));
                let args = [prog.clone()];
                let _ = execvp(&prog, &args);
                std::process::exit(127);
            }
            ForkptyResult::Parent { child, master } => {
                // AsyncFd readiness only works on a non-blocking fd.
                let raw = master.as_raw_fd();
                let flags = fcntl(raw, FcntlArg::F_GETFL).map_err(io::Error::from)?;
                let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
                fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;

                Ok(Self {
                    master: AsyncFd::new(master).map_err(PtyError::Io)?,
                    child_pid: child,
                    size: AtomicU32::new(pack_size(rows, cols)),
                })
            }
        }
    }

    pub fn child_pid(&self) -> Pid {
        self.child_pid
    }

    /// Next chunk of child output. `Ok(0)` or EIO means the slave side
    /// hung up.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut ready = self.master.readable().await?;
            let attempt = ready
                .try_io(|fd| nix::unistd::read(fd.as_raw_fd(), buf).map_err(io::Error::from));
            if let Ok(outcome) = attempt {
                return outcome;
            }
            // Spurious readiness; park on the fd again.
        }
    }

    /// Write the whole buffer, waiting for writability between partial
    /// writes.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let mut ready = self.master.writable().await?;
            let attempt = ready.try_io(|fd| {
                nix::unistd::write(fd.get_ref(), remaining).map_err(io::Error::from)
            });
            if let Ok(outcome) = attempt {
                remaining = &remaining[outcome?..];
            }
        }
        Ok(())
    }

    /// Apply a window size. Idempotent for equal sizes.
    // The resize ioctl has no safe nix wrapper for PTY masters.
    #[allow(unsafe_code)]
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), PtyError> {
        let packed = pack_size(rows, cols);
        if self.size.swap(packed, Ordering::Relaxed) == packed {
            return Ok(());
        }
        let ws = Winsize { ws_row: rows, ws_col: cols, ws_xpixel: 0, ws_ypixel: 0 };
        // SAFETY: the fd is the PTY master this Pty owns for its whole
        // lifetime, and `ws` is fully initialized; TIOCSWINSZ copies the
        // struct into the kernel and touches nothing else.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            return Err(PtyError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Graceful signal now; the mux escalates to SIGKILL on a timer.
    pub fn signal_hup(&self) {
        let _ = kill(self.child_pid, Signal::SIGHUP);
    }

    pub fn signal_kill(&self) {
        let _ = kill(self.child_pid, Signal::SIGKILL);
        let _ = waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG));
    }

    /// Reap the child without blocking the runtime.
    pub async fn wait_exit(&self) -> Option<i32> {
        let pid = self.child_pid;
        tokio::task::spawn_blocking(move || loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Some(code),
                Ok(WaitStatus::Signaled(_, sig, _)) => return Some(128 + sig as i32),
                Ok(_) => continue,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(_) => return None,
            }
        })
        .await
        .ok()
        .flatten()
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        // Last-resort teardown; kill_terminal's graceful path normally ran
        // already.
        let _ = kill(self.child_pid, Signal::SIGHUP);
        let _ = kill(self.child_pid, Signal::SIGKILL);
        let _ = waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG));
    }
}

fn pack_size(rows: u16, cols: u16) -> u32 {
    ((rows as u32) << 16) | cols as u32
}
