//! Turns an expanded word sequence into a [`Command`].
//!
//! Operators are only recognised as whole words: `<`, `>`, `>>`, and `&` when
//! it is the last word of the line.

use thiserror::Error;

/// How an output redirection opens its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>`: create or truncate.
    Truncate,
    /// `>>`: create or append.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRedirect<'a> {
    pub path: &'a str,
    pub mode: RedirectMode,
}

/// A simple command, borrowing its words from the parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    /// Program name, `argv[0]`.
    pub program: &'a str,
    /// Remaining arguments in their original order.
    pub arguments: Vec<&'a str>,
    /// File bound to standard input (`<`).
    pub input_redirect: Option<&'a str>,
    /// File bound to standard output (`>` or `>>`).
    pub output_redirect: Option<OutputRedirect<'a>>,
    /// Set by a trailing `&`.
    pub background: bool,
}

/// Errors that abandon the current line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A redirection operator was the last word on the line.
    #[error("syntax error: `{operator}` requires a file name")]
    DanglingRedirect { operator: String },
    /// Every word was consumed by an operator.
    #[error("syntax error: missing command name")]
    MissingProgram,
}

struct CommandBuilder<'a> {
    words: &'a [String],
    pos: usize,
}

impl<'a> CommandBuilder<'a> {
    fn from(words: &'a [String]) -> Self {
        CommandBuilder { words, pos: 0 }
    }

    fn consume(&mut self) -> Option<&'a str> {
        let word = self.words.get(self.pos).map(String::as_str);
        if word.is_some() {
            self.pos += 1;
        }
        word
    }

    fn is_last(&self) -> bool {
        self.pos == self.words.len()
    }

    fn redirect_target(&mut self, operator: &str) -> Result<&'a str, ParseError> {
        self.consume().ok_or_else(|| ParseError::DanglingRedirect {
            operator: operator.to_string(),
        })
    }

    fn build(mut self) -> Result<Option<Command<'a>>, ParseError> {
        if self.words.is_empty() {
            return Ok(None);
        }

        let mut program = None;
        let mut arguments = Vec::new();
        let mut input_redirect = None;
        let mut output_redirect = None;
        let mut background = false;

        while let Some(word) = self.consume() {
            match word {
                "&" if self.is_last() => background = true,
                "<" => input_redirect = Some(self.redirect_target(word)?),
                ">" | ">>" => {
                    let mode = if word == ">>" {
                        RedirectMode::Append
                    } else {
                        RedirectMode::Truncate
                    };
                    let path = self.redirect_target(word)?;
                    output_redirect = Some(OutputRedirect { path, mode });
                }
                _ if program.is_none() => program = Some(word),
                _ => arguments.push(word),
            }
        }

        let program = program.ok_or(ParseError::MissingProgram)?;
        Ok(Some(Command {
            program,
            arguments,
            input_redirect,
            output_redirect,
            background,
        }))
    }
}

/// Builds a command from the words of one line.
///
/// Returns `Ok(None)` for a line without words (blank or comment only).
pub fn parse(words: &[String]) -> Result<Option<Command<'_>>, ParseError> {
    CommandBuilder::from(words).build()
}
