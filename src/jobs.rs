//! Signal disposition of the shell and collection of child state changes.
//!
//! The shell ignores SIGINT and SIGTSTP so that terminal interrupts only reach
//! its children. SIGCHLD is caught by a handler that does nothing but post the
//! sender's pid into a fixed-size mailbox of atomics; the read-eval loop drains
//! the mailbox with [`reap_children`] and does the actual `waitpid` calls and
//! reporting. Stopped children are always continued: this shell never leaves a
//! job stopped.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::{debug, warn};

const MAILBOX_SLOTS: usize = 64;

/// Pids posted by the SIGCHLD handler. A slot holds 0 when empty.
struct ChildMailbox {
    slots: [AtomicI32; MAILBOX_SLOTS],
    overflowed: AtomicBool,
}

impl ChildMailbox {
    const fn new() -> Self {
        Self {
            slots: [const { AtomicI32::new(0) }; MAILBOX_SLOTS],
            overflowed: AtomicBool::new(false),
        }
    }

    /// Async-signal-safe: no allocation, no locks.
    fn post(&self, pid: i32) {
        if pid <= 0 {
            return;
        }
        for slot in &self.slots {
            if slot
                .compare_exchange(0, pid, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
        self.overflowed.store(true, Ordering::Release);
    }

    /// Moves every posted pid into `out`. Returns whether posts were lost.
    fn drain(&self, out: &mut Vec<Pid>) -> bool {
        for slot in &self.slots {
            let pid = slot.swap(0, Ordering::AcqRel);
            if pid > 0 {
                out.push(Pid::from_raw(pid));
            }
        }
        self.overflowed.swap(false, Ordering::AcqRel)
    }
}

static MAILBOX: ChildMailbox = ChildMailbox::new();

extern "C" fn on_child_signal(
    _signo: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    let saved_errno = Errno::last_raw();
    if !info.is_null() {
        // SAFETY: the kernel hands us a valid siginfo_t for SA_SIGINFO handlers.
        let pid = unsafe { sender_pid(&*info) };
        MAILBOX.post(pid);
    }
    Errno::set_raw(saved_errno);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn sender_pid(info: &libc::siginfo_t) -> libc::pid_t {
    unsafe { info.si_pid() }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
unsafe fn sender_pid(info: &libc::siginfo_t) -> libc::pid_t {
    info.si_pid
}

extern "C" fn on_segfault(_signo: libc::c_int) {
    const MESSAGE: &[u8] = b"smallsh: segmentation fault, exiting\n";
    // SAFETY: write(2) and _exit(2) are async-signal-safe.
    unsafe {
        libc::write(libc::STDERR_FILENO, MESSAGE.as_ptr().cast(), MESSAGE.len());
        libc::_exit(1);
    }
}

/// Sets up the shell's own signal disposition. Called once at startup.
pub fn install_signal_handlers() -> Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    let child = SigAction::new(
        SigHandler::SigAction(on_child_signal),
        SaFlags::SA_SIGINFO | SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let segv = SigAction::new(
        SigHandler::Handler(on_segfault),
        SaFlags::empty(),
        SigSet::empty(),
    );

    // SAFETY: the handlers above only touch atomics, errno, and
    // async-signal-safe libc calls.
    unsafe {
        signal::sigaction(Signal::SIGINT, &ignore).context("sigaction(SIGINT)")?;
        signal::sigaction(Signal::SIGTSTP, &ignore).context("sigaction(SIGTSTP)")?;
        signal::sigaction(Signal::SIGCHLD, &child).context("sigaction(SIGCHLD)")?;
        signal::sigaction(Signal::SIGSEGV, &segv).context("sigaction(SIGSEGV)")?;
    }
    debug!("signal handlers installed");
    Ok(())
}

/// Undoes the ignored dispositions so a spawned program gets normal
/// terminal-signal behaviour.
///
/// Runs in the forked child before exec, so only async-signal-safe calls.
pub(crate) fn restore_default_dispositions() -> nix::Result<()> {
    // SAFETY: resetting to SIG_DFL installs no Rust handler.
    unsafe {
        signal::signal(Signal::SIGINT, SigHandler::SigDfl)?;
        signal::signal(Signal::SIGTSTP, SigHandler::SigDfl)?;
    }
    Ok(())
}

/// Sends SIGCONT to a stopped child.
pub(crate) fn resume(pid: Pid) {
    if let Err(err) = signal::kill(pid, Signal::SIGCONT) {
        warn!(%pid, %err, "failed to continue stopped child");
    }
}

/// A state change of a child process, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    Exited(Pid, i32),
    Signaled(Pid, i32),
    Stopped(Pid),
    Continued(Pid),
}

impl ChildEvent {
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(pid, code) => Some(ChildEvent::Exited(pid, code)),
            WaitStatus::Signaled(pid, signal, _) => Some(ChildEvent::Signaled(pid, signal as i32)),
            WaitStatus::Stopped(pid, _) => Some(ChildEvent::Stopped(pid)),
            WaitStatus::Continued(pid) => Some(ChildEvent::Continued(pid)),
            _ => None,
        }
    }

    /// Whether the event gets a line on the diagnostic stream.
    pub fn is_reported(&self) -> bool {
        !matches!(self, ChildEvent::Continued(_))
    }
}

impl fmt::Display for ChildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildEvent::Exited(pid, code) => {
                write!(f, "Child process {pid} done. Exit status {code}.")
            }
            ChildEvent::Signaled(pid, signo) => {
                write!(f, "Child process {pid} done. Signaled {signo}.")
            }
            ChildEvent::Stopped(pid) => write!(f, "Child process {pid} stopped. Continuing."),
            ChildEvent::Continued(pid) => write!(f, "Child process {pid} continued."),
        }
    }
}

/// Applies the shell's policy to one event and reports it.
pub(crate) fn handle_event(event: ChildEvent, diag: &mut dyn Write) {
    debug!(?event, "child state changed");
    if let ChildEvent::Stopped(pid) = event {
        resume(pid);
    }
    if event.is_reported() {
        let _ = writeln!(diag, "{event}");
    }
}

/// Collects every child that changed state and reports it on `diag`.
///
/// Pids posted by the SIGCHLD handler are polled first, so their notices come
/// out in arrival order. SIGCHLD is not queued: children changing state
/// together may raise a single signal, and the mailbox can overflow. The
/// sweep over all children that follows is what guarantees nothing is
/// missed; the mailbox only decides which reports come first.
pub fn reap_children(diag: &mut dyn Write) {
    let mut posted = Vec::new();
    if MAILBOX.drain(&mut posted) {
        debug!("child mailbox overflowed");
    }
    for pid in posted {
        poll_children(Some(pid), diag);
    }
    poll_children(None, diag);
}

fn poll_children(pid: Option<Pid>, diag: &mut dyn Write) {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    loop {
        match waitpid(pid, Some(flags)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => match ChildEvent::from_wait_status(status) {
                Some(event) => handle_event(event, diag),
                None => debug!(?status, "ignoring wait status"),
            },
            Err(Errno::EINTR) => continue,
            // Already collected, e.g. by a foreground wait.
            Err(Errno::ECHILD) => break,
            Err(err) => {
                warn!(?pid, %err, "waitpid failed");
                break;
            }
        }
    }
}
