use std::borrow::Cow;
use std::io::{self, BufRead, IsTerminal, Write};

/// Line-oriented user interface used by the command loop.
pub trait Ui {
    /// Prints `prompt` and reads one line without its terminator.
    /// `Ok(None)` signals a clean end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Shows a message, adding a final newline if missing.
    fn print(&mut self, text: &str);

    /// Shows an error message, adding a final newline if missing.
    fn print_error(&mut self, text: &str);
}

fn with_newline(text: &str) -> Cow<'_, str> {
    if text.ends_with('\n') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{text}\n"))
    }
}

fn colorize(text: &str) -> String {
    const RED: &str = "\x1b[0;31m";
    const RESET: &str = "\x1b[0m";
    format!("{RED}{text}{RESET}")
}

/// Prompts on stdout, reads stdin, and writes messages to stderr so that
/// stdout stays reserved for regular output.
pub struct StdUi {
    input: io::StdinLock<'static>,
    color_errors: bool,
}

impl StdUi {
    pub fn new() -> Self {
        Self {
            input: io::stdin().lock(),
            color_errors: io::stderr().is_terminal(),
        }
    }

    fn write_stderr(&self, text: &str) {
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }
}

impl Default for StdUi {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui for StdUi {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;

        let mut raw = Vec::new();
        if self.input.read_until(b'\n', &mut raw)? == 0 {
            return Ok(None);
        }
        Ok(Some(decode_line(&raw)))
    }

    fn print(&mut self, text: &str) {
        self.write_stderr(&with_newline(text));
    }

    fn print_error(&mut self, text: &str) {
        let text = with_newline(text);
        if self.color_errors {
            self.write_stderr(&colorize(&text));
        } else {
            self.write_stderr(&text);
        }
    }
}

/// Invalid UTF-8 is replaced rather than rejected, so a stray byte never
/// ends the session.
fn decode_line(raw: &[u8]) -> String {
    strip_line_ending(String::from_utf8_lossy(raw).into_owned())
}

fn strip_line_ending(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}
