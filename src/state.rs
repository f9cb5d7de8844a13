use crate::ExitCode;
use crate::expand::ParameterSource;
use nix::unistd::Pid;
use std::collections::HashMap;
use std::env as stdenv;

/// Mutable state shared by the read-eval loop and the command runner.
///
/// The state contains:
/// - `last_foreground_status`: value of `$?`, also the default `exit` status.
/// - `last_background_pid`: value of `$!`; a stopped foreground job lands here too.
/// - `interactive`: whether prompts are shown.
/// - `vars`: snapshot of the process environment used for `${name}`.
/// - `exit_request`: set by the `exit` built-in; the loop stops when present.
#[derive(Debug, Clone, Default)]
pub struct ShellState {
    pub last_foreground_status: ExitCode,
    pub last_background_pid: Option<Pid>,
    pub interactive: bool,
    pub vars: HashMap<String, String>,
    pub exit_request: Option<ExitCode>,
}

impl ShellState {
    /// Capture the current process environment into a new state.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn new(interactive: bool) -> Self {
        let vars = stdenv::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self {
            interactive,
            vars,
            ..Self::default()
        }
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn should_exit(&self) -> bool {
        self.exit_request.is_some()
    }
}

impl ParameterSource for ShellState {
    fn shell_pid(&self) -> u32 {
        std::process::id()
    }

    fn last_background_pid(&self) -> Option<i32> {
        self.last_background_pid.map(Pid::as_raw)
    }

    fn last_foreground_status(&self) -> ExitCode {
        self.last_foreground_status
    }

    fn variable(&self, name: &str) -> Option<&str> {
        self.get_var(name)
    }
}
