use crate::ExitCode;
use crate::state::ShellState;
use anyhow::{Context, Result, anyhow, bail};
use std::env;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins run inside the shell process, never in a child, so they can change
/// the shell's own working directory or end the shell.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "exit" or "cd".
    fn name() -> &'static str;

    /// Validates the arguments (program name excluded).
    fn from_args(args: &[&str]) -> Result<Self>;

    /// Executes the command against the shell state.
    fn execute(self, state: &mut ShellState) -> Result<()>;
}

fn run<T: BuiltinCommand>(args: &[&str], state: &mut ShellState) -> Result<()> {
    T::from_args(args)?.execute(state)
}

/// Runs `name` as a builtin.
///
/// Returns `None` when `name` is not a builtin, so the caller can start an
/// external program instead.
pub(crate) fn try_run(name: &str, args: &[&str], state: &mut ShellState) -> Option<Result<()>> {
    if name == Exit::name() {
        Some(run::<Exit>(args, state))
    } else if name == Cd::name() {
        Some(run::<Cd>(args, state))
    } else {
        None
    }
}

/// Exit the shell, with the given status or the last foreground status.
#[derive(Debug, PartialEq, Eq)]
pub struct Exit {
    pub code: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn from_args(args: &[&str]) -> Result<Self> {
        let code = match args {
            [] => None,
            [code] => Some(
                code.parse::<ExitCode>()
                    .map_err(|_| anyhow!("exit: {code}: integer argument required"))?,
            ),
            _ => bail!("exit: too many arguments"),
        };
        Ok(Exit { code })
    }

    fn execute(self, state: &mut ShellState) -> Result<()> {
        state.exit_request = Some(self.code.unwrap_or(state.last_foreground_status));
        Ok(())
    }
}

/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
#[derive(Debug, PartialEq, Eq)]
pub struct Cd {
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn from_args(args: &[&str]) -> Result<Self> {
        match args {
            [] => Ok(Cd { target: None }),
            [dir] => Ok(Cd {
                target: Some(dir.to_string()),
            }),
            _ => bail!("cd: too many arguments"),
        }
    }

    fn execute(self, state: &mut ShellState) -> Result<()> {
        let target = match self.target {
            Some(t) => PathBuf::from(t),
            None => state
                .get_var("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("cd: HOME not set"))?,
        };

        env::set_current_dir(&target).with_context(|| format!("cd: {}", target.display()))?;
        Ok(())
    }
}
