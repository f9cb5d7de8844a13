//! Word splitting for a single input line.
//!
//! The rules are deliberately small: words are separated by whitespace, a word
//! that starts with `#` turns the rest of the line into a comment, and a
//! backslash takes the next character literally. There is no quoting.

/// Upper bound on the number of words taken from one line.
///
/// Words past the limit are dropped without an error.
pub const MAX_WORDS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    /// Between words.
    Start,
    ReadingWord,
    /// The previous character was a backslash inside (or starting) a word.
    Escaping,
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
    words: Vec<String>,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
            words: Vec::new(),
        }
    }

    /// Runs the machine over the whole line and returns the collected words.
    fn make_words(mut self) -> Vec<String> {
        while self.words.len() < MAX_WORDS {
            let Some(ch) = self.read_char() else {
                break;
            };
            let keep_going = match self.state {
                LexingState::Start => self.handle_start(ch),
                LexingState::ReadingWord => self.handle_word(ch),
                LexingState::Escaping => self.handle_escape(ch),
            };
            if !keep_going {
                break;
            }
        }

        // A trailing backslash has nothing left to escape. It still ends the
        // word it belongs to, but does not start a word of its own.
        if self.state == LexingState::Escaping && self.buffer.is_empty() {
            self.state = LexingState::Start;
        }
        self.finish_word();
        self.words
    }

    fn read_char(&mut self) -> Option<char> {
        self.input.next()
    }

    /// Returns `false` when a comment starts and the rest of the line is ignored.
    fn handle_start(&mut self, ch: char) -> bool {
        match ch {
            c if is_separator(c) => {}
            '#' => return false,
            '\\' => self.state = LexingState::Escaping,
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
        true
    }

    fn handle_word(&mut self, ch: char) -> bool {
        match ch {
            c if is_separator(c) => self.finish_word(),
            '\\' => self.state = LexingState::Escaping,
            c => self.buffer.push(c),
        }
        true
    }

    fn handle_escape(&mut self, ch: char) -> bool {
        self.buffer.push(ch);
        self.state = LexingState::ReadingWord;
        true
    }

    fn finish_word(&mut self) {
        if self.state != LexingState::Start && self.words.len() < MAX_WORDS {
            self.words.push(std::mem::take(&mut self.buffer));
        }
        self.buffer.clear();
        self.state = LexingState::Start;
    }
}

fn is_separator(ch: char) -> bool {
    ch.is_ascii_whitespace() || ch == '\x0b'
}

/// Splits one input line into words.
///
/// The line should not contain its trailing newline, although a newline is
/// treated as ordinary whitespace if present.
pub fn split_into_words(line: &str) -> Vec<String> {
    LexingFSM::new(line).make_words()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        split_into_words(line)
    }

    #[test]
    fn test_splits_on_whitespace() {
        assert_eq!(words("  ls   -l\t/tmp "), vec!["ls", "-l", "/tmp"]);
    }

    #[test]
    fn test_escaped_space_joins_words() {
        assert_eq!(words(r"a\ b c"), vec!["a b", "c"]);
    }

    #[test]
    fn test_comment_ends_line() {
        assert_eq!(words("x # y"), vec!["x"]);
        assert!(words("# only a comment").is_empty());
        assert!(words("   #indented").is_empty());
    }

    #[test]
    fn test_hash_inside_word_is_literal() {
        assert_eq!(words("a#b c"), vec!["a#b", "c"]);
    }

    #[test]
    fn test_escaped_hash_is_not_a_comment() {
        assert_eq!(words(r"echo \#tag"), vec!["echo", "#tag"]);
    }

    #[test]
    fn test_escaped_backslash() {
        assert_eq!(words(r"a\\b"), vec![r"a\b"]);
        assert_eq!(words(r"\\"), vec![r"\"]);
    }

    #[test]
    fn test_trailing_backslash_is_dropped() {
        assert_eq!(words(r"abc\"), vec!["abc"]);
        assert_eq!(words(r"x \"), vec!["x"]);
        assert!(words(r"\").is_empty());
    }

    #[test]
    fn test_escaped_trailing_space_is_kept() {
        assert_eq!(words(r"a\ "), vec!["a "]);
    }

    #[test]
    fn test_blank_line_has_no_words() {
        assert!(words("").is_empty());
        assert!(words(" \t \n").is_empty());
    }

    #[test]
    fn test_operators_are_plain_words() {
        assert_eq!(
            words("sort < in > out &"),
            vec!["sort", "<", "in", ">", "out", "&"]
        );
    }

    #[test]
    fn test_word_count_is_capped() {
        let line = (0..MAX_WORDS + 20)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let result = words(&line);
        assert_eq!(result.len(), MAX_WORDS);
        assert_eq!(result.last().map(String::as_str), Some("511"));
    }
}
