//! Parameter expansion inside a single word.
//!
//! Four forms are recognised anywhere in a word: `$$` (the shell's process
//! id), `$!` (the last background process id), `$?` (the last foreground
//! status) and `${name}` (an environment variable). Anything else, including
//! a `${` without a closing brace, is copied through unchanged. Expansion
//! never fails; unknown values become the empty string.

use crate::ExitCode;
use std::fmt::Write;

/// Values that parameter references resolve to.
///
/// Implemented by [`crate::ShellState`]; tests provide their own doubles.
pub trait ParameterSource {
    /// Process id substituted for `$$`.
    fn shell_pid(&self) -> u32;

    /// Process id substituted for `$!`, if a background job was ever started.
    fn last_background_pid(&self) -> Option<i32>;

    /// Status substituted for `$?`.
    fn last_foreground_status(&self) -> ExitCode;

    /// Value substituted for `${name}`.
    fn variable(&self, name: &str) -> Option<&str>;
}

/// Which parameter a [`ParamRef`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `$$`
    Pid,
    /// `$!`
    BackgroundPid,
    /// `$?`
    Status,
    /// `${name}`
    Variable,
}

/// One parameter reference found in a word, covering bytes `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamRef {
    pub kind: ParamKind,
    pub start: usize,
    pub end: usize,
}

impl ParamRef {
    /// The variable name of a `${name}` reference within `word`.
    pub fn name<'w>(&self, word: &'w str) -> Option<&'w str> {
        match self.kind {
            ParamKind::Variable => word.get(self.start + 2..self.end - 1),
            _ => None,
        }
    }
}

/// Forward-only scanner yielding the parameter references of one word.
///
/// The cursor never moves backwards, so every call to [`Iterator::next`]
/// makes progress even on input such as `$$$${{{`.
#[derive(Debug, Clone)]
pub struct ParamScanner<'a> {
    word: &'a str,
    cursor: usize,
}

impl<'a> ParamScanner<'a> {
    pub fn new(word: &'a str) -> Self {
        Self { word, cursor: 0 }
    }

    /// Byte offset where the next search starts.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl Iterator for ParamScanner<'_> {
    type Item = ParamRef;

    fn next(&mut self) -> Option<ParamRef> {
        let bytes = self.word.as_bytes();
        while self.cursor < bytes.len() {
            let Some(offset) = self.word[self.cursor..].find('$') else {
                self.cursor = bytes.len();
                break;
            };
            let start = self.cursor + offset;
            let found = match bytes.get(start + 1) {
                Some(b'$') => Some((ParamKind::Pid, start + 2)),
                Some(b'!') => Some((ParamKind::BackgroundPid, start + 2)),
                Some(b'?') => Some((ParamKind::Status, start + 2)),
                Some(b'{') => self.word[start + 2..]
                    .find('}')
                    .map(|close| (ParamKind::Variable, start + 2 + close + 1)),
                _ => None,
            };
            match found {
                Some((kind, end)) => {
                    self.cursor = end;
                    return Some(ParamRef { kind, start, end });
                }
                // A lone `$` stays literal; resume right after it.
                None => self.cursor = start + 1,
            }
        }
        None
    }
}

/// Appends the expansion of `word` to `out`.
///
/// The caller owns the buffer, so one allocation can serve a whole line.
pub fn expand_into(word: &str, params: &impl ParameterSource, out: &mut String) {
    let mut copied = 0;
    for param in ParamScanner::new(word) {
        out.push_str(&word[copied..param.start]);
        // Writing into a String cannot fail.
        let _ = match param.kind {
            ParamKind::Pid => write!(out, "{}", params.shell_pid()),
            ParamKind::BackgroundPid => match params.last_background_pid() {
                Some(pid) => write!(out, "{}", pid),
                None => Ok(()),
            },
            ParamKind::Status => write!(out, "{}", params.last_foreground_status()),
            ParamKind::Variable => {
                let value = param
                    .name(word)
                    .and_then(|name| params.variable(name))
                    .unwrap_or_default();
                out.push_str(value);
                Ok(())
            }
        };
        copied = param.end;
    }
    out.push_str(&word[copied..]);
}

/// Returns the expansion of `word` as a new string.
pub fn expand(word: &str, params: &impl ParameterSource) -> String {
    let mut out = String::with_capacity(word.len());
    expand_into(word, params, &mut out);
    out
}

/// Replaces every word with its expansion, reusing one scratch buffer.
pub fn expand_words(words: &mut [String], params: &impl ParameterSource) {
    let mut scratch = String::new();
    for word in words.iter_mut() {
        scratch.clear();
        expand_into(word, params, &mut scratch);
        std::mem::swap(word, &mut scratch);
    }
}
