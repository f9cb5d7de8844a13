use crate::ExitCode;
use crate::jobs;
use crate::parser::{Command, RedirectMode};
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::process::{self, Child, Stdio};
use thiserror::Error;

/// Status recorded when the program could not be found.
pub const NOT_FOUND_STATUS: ExitCode = 127;
/// Status recorded when the program was found but could not be executed.
pub const NOT_EXECUTABLE_STATUS: ExitCode = 126;
/// Status recorded when a redirection target could not be opened.
pub const REDIRECT_FAILURE_STATUS: ExitCode = 1;

/// Why a command never started running.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// The value `$?` takes after this failure.
    pub fn status(&self) -> ExitCode {
        match self {
            LaunchError::Redirect { .. } => REDIRECT_FAILURE_STATUS,
            LaunchError::Exec { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                NOT_FOUND_STATUS
            }
            LaunchError::Exec { .. } => NOT_EXECUTABLE_STATUS,
        }
    }
}

/// How a foreground wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Foreground {
    /// The child exited or was killed; carries the status for `$?`.
    Completed(ExitCode),
    /// The child was stopped and has been sent SIGCONT; it keeps running
    /// as the background job.
    Stopped,
}

/// Starts `cmd` as a child process with its redirections applied.
///
/// Redirection targets are opened here, before the child exists, so a bad
/// path abandons the command without spawning anything. The program name is
/// looked up through `PATH` unless it contains a slash.
pub fn spawn(cmd: &Command) -> Result<Child, LaunchError> {
    let mut process = process::Command::new(cmd.program);
    process.args(&cmd.arguments);

    if let Some(path) = cmd.input_redirect {
        let file = File::open(path).map_err(|source| LaunchError::Redirect {
            path: path.to_string(),
            source,
        })?;
        process.stdin(Stdio::from(file));
    }

    if let Some(redirect) = cmd.output_redirect {
        let mut options = OpenOptions::new();
        options.write(true).create(true).mode(0o666);
        match redirect.mode {
            RedirectMode::Truncate => options.truncate(true),
            RedirectMode::Append => options.append(true),
        };
        let file = options
            .open(redirect.path)
            .map_err(|source| LaunchError::Redirect {
                path: redirect.path.to_string(),
                source,
            })?;
        process.stdout(Stdio::from(file));
    }

    // SAFETY: the hook only calls signal(2), which is async-signal-safe.
    unsafe {
        process.pre_exec(|| jobs::restore_default_dispositions().map_err(io::Error::from));
    }

    process.spawn().map_err(|source| LaunchError::Exec {
        program: cmd.program.to_string(),
        source,
    })
}

/// Blocks until the child `pid` exits, is killed, or stops.
///
/// A stopped child is continued immediately and reported as
/// [`Foreground::Stopped`]; the caller treats it as a background job.
pub fn wait_foreground(pid: Pid) -> nix::Result<Foreground> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Stopped(..)) => {
                jobs::resume(pid);
                return Ok(Foreground::Stopped);
            }
            Ok(status) => {
                if let Some(code) = status_code(status) {
                    return Ok(Foreground::Completed(code));
                }
            }
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Converts a terminal wait status into the shell's `$?` convention:
/// the exit code, or 128 plus the signal number.
pub fn status_code(status: WaitStatus) -> Option<ExitCode> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

/// The child's pid in the form `waitpid` expects.
pub fn child_pid(child: &Child) -> Pid {
    Pid::from_raw(child.id() as i32)
}
