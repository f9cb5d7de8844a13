//! A small line-oriented Unix shell.
//!
//! Each input line goes through the same stages: it is split into words by the
//! [`lexer`], every word has its parameter references (`$$`, `$!`, `$?`,
//! `${name}`) rewritten by [`expand`], the words are structured into a
//! [`parser::Command`], and the [`Interpreter`] runs it either as a built-in
//! (`exit`, `cd`) or as a child process with optional redirections and a
//! trailing `&` for background execution.
//!
//! Child lifecycle events are collected asynchronously by the handlers in
//! [`jobs`] and reported by the main loop before each prompt.

mod builtin;
pub mod expand;
mod external;
mod interpreter;
pub mod jobs;
pub mod lexer;
pub mod parser;
pub mod state;

/// The read-eval loop and command dispatcher.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::{Interpreter, LineSource};
pub use state::ShellState;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;
