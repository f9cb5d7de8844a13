use crate::ExitCode;
use crate::builtin;
use crate::expand;
use crate::external::{self, Foreground};
use crate::jobs::{self, ChildEvent};
use crate::lexer;
use crate::parser::{self, Command};
use crate::state::ShellState;
use anyhow::Context;
use nix::errno::Errno;
use nix::unistd::geteuid;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Where command lines come from.
pub enum LineSource {
    /// Line editor on the controlling terminal; a prompt precedes every line.
    Terminal,
    /// A script file or non-terminal standard input; no prompt.
    Reader(Box<dyn BufRead>),
}

/// A small shell that runs built-in and external commands line by line.
///
/// The interpreter owns the [`ShellState`] and writes every diagnostic
/// (errors, child notices) to a separate stream, standard error by default,
/// so command output is never mixed with shell messages.
///
/// Example
/// ```no_run
/// use smallsh::{Interpreter, ShellState};
/// let mut sh = Interpreter::new(ShellState::new(false));
/// sh.run_line("printf hello");
/// assert_eq!(sh.state().last_foreground_status, 0);
/// ```
pub struct Interpreter {
    state: ShellState,
    diag: Box<dyn Write>,
}

impl Interpreter {
    /// Create an interpreter reporting to standard error.
    pub fn new(state: ShellState) -> Self {
        Self::with_diagnostics(state, Box::new(io::stderr()))
    }

    /// Create an interpreter reporting to a custom diagnostic stream.
    pub fn with_diagnostics(state: ShellState, diag: Box<dyn Write>) -> Self {
        Self { state, diag }
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    /// Runs the read-eval loop until `exit` or end of input.
    ///
    /// Returns the status the shell process should exit with.
    pub fn run(&mut self, source: LineSource) -> anyhow::Result<ExitCode> {
        match source {
            LineSource::Terminal => self.repl(),
            LineSource::Reader(reader) => self.run_reader(reader),
        }
    }

    fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new().context("starting line editor")?;

        loop {
            self.reap();
            let prompt = if self.state.interactive {
                self.prompt()
            } else {
                String::new()
            };
            match rl.readline(&prompt) {
                Ok(line) => {
                    self.run_line(&line);
                    if let Some(code) = self.state.exit_request {
                        return Ok(code);
                    }
                }
                // Ctrl-C at the prompt only discards the line.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(ReadlineError::Io(err)) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(ReadlineError::Errno(errno)) if errno as i32 == Errno::EINTR as i32 => continue,
                Err(err) => return Err(err).context("reading input"),
            }
        }

        Ok(self.state.last_foreground_status)
    }

    /// Runs every line of `reader` without prompting.
    ///
    /// A line that is not valid UTF-8 is reported and skipped rather than
    /// run with altered bytes.
    pub fn run_reader(&mut self, mut reader: impl BufRead) -> anyhow::Result<ExitCode> {
        let mut raw = Vec::new();
        let mut line_number = 0usize;
        loop {
            self.reap();
            raw.clear();
            if reader.read_until(b'\n', &mut raw).context("reading input")? == 0 {
                break;
            }
            line_number += 1;
            match std::str::from_utf8(&raw) {
                Ok(line) => self.run_line(trim_line_terminator(line)),
                Err(err) => self.report(format_args!(
                    "line {line_number}: invalid UTF-8 at byte {}, line skipped",
                    err.valid_up_to()
                )),
            }
            if let Some(code) = self.state.exit_request {
                return Ok(code);
            }
        }

        Ok(self.state.last_foreground_status)
    }

    /// Splits, expands, parses and executes one line.
    pub fn run_line(&mut self, line: &str) {
        let mut words = lexer::split_into_words(line);
        expand::expand_words(&mut words, &self.state);
        match parser::parse(&words) {
            Ok(Some(cmd)) => self.execute(&cmd),
            Ok(None) => {}
            Err(err) => self.report(err),
        }
    }

    /// Executes a parsed command: built-ins in-process, anything else as a child.
    pub fn execute(&mut self, cmd: &Command) {
        if let Some(result) = builtin::try_run(cmd.program, &cmd.arguments, &mut self.state) {
            if let Err(err) = result {
                self.report(format_args!("{err:#}"));
            }
            return;
        }

        let child = match external::spawn(cmd) {
            Ok(child) => child,
            Err(err) => {
                self.report(&err);
                if !cmd.background {
                    self.state.last_foreground_status = err.status();
                }
                return;
            }
        };
        let pid = external::child_pid(&child);
        debug!(%pid, program = cmd.program, background = cmd.background, "spawned");

        if cmd.background {
            self.state.last_background_pid = Some(pid);
            return;
        }

        match external::wait_foreground(pid) {
            Ok(Foreground::Completed(code)) => {
                debug!(%pid, code, "foreground command finished");
                self.state.last_foreground_status = code;
            }
            Ok(Foreground::Stopped) => {
                let _ = writeln!(self.diag, "{}", ChildEvent::Stopped(pid));
                self.state.last_background_pid = Some(pid);
            }
            Err(err) => self.report(format_args!("waitpid: {err}")),
        }
        self.reap();
    }

    /// Prompt text: `PS1`, or `#` for root and `$` for everyone else.
    pub fn prompt(&self) -> String {
        match self.state.get_var("PS1") {
            Some(ps1) => ps1.to_string(),
            None if geteuid().is_root() => "#".to_string(),
            None => "$".to_string(),
        }
    }

    fn reap(&mut self) {
        jobs::reap_children(&mut *self.diag);
    }

    fn report(&mut self, message: impl Display) {
        let _ = writeln!(self.diag, "smallsh: {message}");
    }
}

fn trim_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{SharedBuffer, lock_process};
    use nix::sys::signal::{Signal, kill};
    use nix::sys::wait::waitpid;
    use std::fs;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn interpreter() -> (Interpreter, SharedBuffer) {
        let diag = SharedBuffer::default();
        let sh = Interpreter::with_diagnostics(ShellState::new(false), Box::new(diag.clone()));
        (sh, diag)
    }

    #[test]
    fn test_status_feeds_next_expansion() {
        let _lock = lock_process();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("status.txt");
        let (mut sh, _diag) = interpreter();

        sh.run_line(r"sh -c exit\ 3");
        assert_eq!(sh.state().last_foreground_status, 3);

        sh.run_line(&format!("printf %s $? > {}", out.display()));
        assert_eq!(fs::read_to_string(&out).unwrap(), "3");
        assert_eq!(sh.state().last_foreground_status, 0);
    }

    #[test]
    fn test_script_exit_code_is_last_status() {
        let _lock = lock_process();
        let (mut sh, _diag) = interpreter();
        let script = Cursor::new("# comment\n\nsh -c exit\\ 5\n");
        assert_eq!(sh.run_reader(script).unwrap(), 5);
    }

    #[test]
    fn test_exit_stops_the_loop() {
        let _lock = lock_process();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let (mut sh, _diag) = interpreter();

        let script = format!("exit 7\nprintf x > {}\n", marker.display());
        assert_eq!(sh.run_reader(Cursor::new(script)).unwrap(), 7);
        assert!(!marker.exists());
    }

    #[test]
    fn test_bad_exit_keeps_running() {
        let _lock = lock_process();
        let (mut sh, diag) = interpreter();
        let script = Cursor::new("exit abc\nexit 1 2\nexit 2\n");
        assert_eq!(sh.run_reader(script).unwrap(), 2);
        let messages = diag.contents();
        assert!(messages.contains("smallsh: exit: abc: integer argument required"));
        assert!(messages.contains("smallsh: exit: too many arguments"));
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let _lock = lock_process();
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad");
        let (mut sh, diag) = interpreter();

        let mut script = b"printf hi > ".to_vec();
        script.extend_from_slice(bad.to_string_lossy().as_bytes());
        script.extend_from_slice(b"\xffx\nexit 4\n");
        assert_eq!(sh.run_reader(Cursor::new(script)).unwrap(), 4);

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        let messages = diag.contents();
        assert!(messages.starts_with("smallsh: line 1: invalid UTF-8"), "{messages}");
    }

    #[test]
    fn test_plain_exit_uses_last_status() {
        let _lock = lock_process();
        let (mut sh, _diag) = interpreter();
        let script = Cursor::new("sh -c exit\\ 9\nexit\n");
        assert_eq!(sh.run_reader(script).unwrap(), 9);
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let (mut sh, diag) = interpreter();
        sh.run_line("cat <");
        assert_eq!(
            diag.contents(),
            "smallsh: syntax error: `<` requires a file name\n"
        );
        assert_eq!(sh.state().last_foreground_status, 0);
    }

    #[test]
    fn test_unknown_program_sets_status() {
        let _lock = lock_process();
        let (mut sh, diag) = interpreter();
        sh.run_line("smallsh-no-such-program-xyz arg");
        assert_eq!(sh.state().last_foreground_status, 127);
        assert!(diag.contents().starts_with("smallsh: smallsh-no-such-program-xyz: "));
    }

    #[test]
    fn test_background_does_not_block() {
        let _lock = lock_process();
        let (mut sh, _diag) = interpreter();

        let started = Instant::now();
        sh.run_line("sleep 5 &");
        assert!(started.elapsed() < Duration::from_secs(4));

        let pid = sh.state().last_background_pid.expect("background pid");
        assert_eq!(sh.state().last_foreground_status, 0);

        kill(pid, Signal::SIGKILL).unwrap();
        waitpid(pid, None).unwrap();
    }

    #[test]
    fn test_background_pid_expands() {
        let _lock = lock_process();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bg.txt");
        let (mut sh, _diag) = interpreter();

        sh.run_line("true &");
        let pid = sh.state().last_background_pid.expect("background pid");
        sh.run_line(&format!("printf %s $! > {}", out.display()));

        assert_eq!(fs::read_to_string(&out).unwrap(), pid.to_string());
    }

    #[test]
    fn test_stopped_foreground_becomes_background() {
        let _lock = lock_process();
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stop.sh");
        fs::write(&script, "kill -STOP $$\nexit 0\n").unwrap();
        let (mut sh, diag) = interpreter();
        sh.state.last_foreground_status = 42;

        sh.run_line(&format!("sh {}", script.display()));

        let pid = sh.state().last_background_pid.expect("stopped job pid");
        assert!(diag.contents().contains(&format!("Child process {pid} stopped. Continuing.")));
        // A stopped job does not produce a foreground status.
        assert_eq!(sh.state().last_foreground_status, 42);

        let done = format!("Child process {pid} done. Exit status 0.");
        let deadline = Instant::now() + Duration::from_secs(10);
        while !diag.contents().contains(&done) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            sh.reap();
        }
        assert!(diag.contents().contains(&done), "{}", diag.contents());
    }

    #[test]
    fn test_cd_failure_is_reported() {
        let _lock = lock_process();
        let (mut sh, diag) = interpreter();
        sh.run_line("cd /smallsh/definitely/missing");
        assert!(diag.contents().starts_with("smallsh: cd: /smallsh/definitely/missing: "));
        assert!(!sh.state().should_exit());
    }

    #[test]
    fn test_prompt_prefers_ps1() {
        let mut state = ShellState::default();
        state.set_var("PS1", "> ");
        let sh = Interpreter::with_diagnostics(state, Box::new(io::sink()));
        assert_eq!(sh.prompt(), "> ");

        let sh = Interpreter::with_diagnostics(ShellState::default(), Box::new(io::sink()));
        let expected = if geteuid().is_root() { "#" } else { "$" };
        assert_eq!(sh.prompt(), expected);
    }

    #[test]
    fn test_trim_line_terminator() {
        assert_eq!(trim_line_terminator("ls\n"), "ls");
        assert_eq!(trim_line_terminator("ls\r\n"), "ls");
        assert_eq!(trim_line_terminator("ls"), "ls");
    }
}
