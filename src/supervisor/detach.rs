//! Detaching from the controlling terminal
//!
//! Classic double fork. Must run before any threads exist, so callers do
//! this before building the tokio runtime.

use crate::error::{CredpipeError, CredpipeResult};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Turn the calling process into a daemon
///
/// Returns only in the final grandchild; both intermediate parents exit.
pub fn daemonize(log_file: Option<&Path>) -> CredpipeResult<()> {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    fork_and_exit_parent()?;

    // SAFETY: setsid has no preconditions; we are not a group leader after fork
    if unsafe { libc::setsid() } < 0 {
        return Err(CredpipeError::Detach(std::io::Error::last_os_error()));
    }

    fork_and_exit_parent()?;

    std::env::set_current_dir("/").map_err(CredpipeError::Detach)?;
    // SAFETY: umask only changes the process file mode mask
    unsafe { libc::umask(0o077) };

    redirect_std_streams(log_file)
}

fn fork_and_exit_parent() -> CredpipeResult<()> {
    // SAFETY: called while the process is single-threaded
    match unsafe { libc::fork() } {
        -1 => Err(CredpipeError::Detach(std::io::Error::last_os_error())),
        0 => Ok(()),
        // SAFETY: _exit skips atexit handlers and buffered I/O owned by the child
        _ => unsafe { libc::_exit(0) },
    }
}

fn redirect_std_streams(log_file: Option<&Path>) -> CredpipeResult<()> {
    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(CredpipeError::Detach)?;

    let out: File = match log_file {
        Some(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(CredpipeError::Detach)?,
        None => devnull.try_clone().map_err(CredpipeError::Detach)?,
    };

    dup_onto(&devnull, libc::STDIN_FILENO)?;
    dup_onto(&out, libc::STDOUT_FILENO)?;
    dup_onto(&out, libc::STDERR_FILENO)?;
    Ok(())
}

fn dup_onto(file: &File, target: libc::c_int) -> CredpipeResult<()> {
    // SAFETY: both descriptors are valid for the duration of the call
    if unsafe { libc::dup2(file.as_raw_fd(), target) } < 0 {
        return Err(CredpipeError::Detach(std::io::Error::last_os_error()));
    }
    Ok(())
}
