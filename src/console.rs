//! ## Console
//!
//! Line-oriented operator I/O over any reader/writer pair, so the
//! interactive flow can be scripted in tests.
//!
//! Invalid input is rejected and asked for again in a loop; nothing is ever
//! clamped or defaulted. A closed input is reported as
//! [`io::ErrorKind::UnexpectedEof`].
//!

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::error::Error;

pub const OUT_OF_RANGE: &str = "Invalid input: integer out of range.";
pub const NOT_AN_INTEGER: &str = "Invalid input: not an integer.";

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Console { input, output }
    }

    /// Writer for operator-facing text
    pub fn out(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Next input line without its line ending.
    pub fn read_line(&mut self) -> io::Result<String> {
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "operator input closed"));
        }

        let trimmed = line.trim_end_matches(&['\r', '\n'][..]).len();
        line.truncate(trimmed);
        Ok(line)
    }

    /// Print `prompt` on its own line, then read the answer.
    pub fn prompt_line(&mut self, prompt: &str) -> io::Result<String> {
        writeln!(self.output, "{prompt}")?;
        self.read_line()
    }

    /// ### Read Integer
    ///
    /// Ask until the answer parses as an integer. An empty `prompt` prints
    /// nothing, for menus that were already rendered.
    ///
    pub fn read_integer(&mut self, prompt: &str) -> io::Result<i64> {
        loop {
            if !prompt.is_empty() {
                writeln!(self.output, "{prompt}")?;
            }
            let line = self.read_line()?;
            match line.trim().parse() {
                Ok(value) => return Ok(value),
                Err(_) => {
                    debug!(input = %line, "rejected non-integer input");
                    writeln!(self.output, "{NOT_AN_INTEGER}")?;
                }
            }
        }
    }

    /// ### Read Bounded Integer
    ///
    /// Ask until the answer is an integer in `[min, max]`.
    ///
    pub fn read_int(&mut self, prompt: &str, min: i64, max: i64) -> io::Result<i64> {
        loop {
            let value = self.read_integer(prompt)?;
            match Error::check_range(value, min, max) {
                Ok(()) => return Ok(value),
                Err(err) => {
                    debug!(error = %err, "rejected out of range input");
                    writeln!(self.output, "{OUT_OF_RANGE}")?;
                }
            }
        }
    }

    pub fn pause(&mut self) -> io::Result<()> {
        writeln!(self.output, "Hit enter to continue.")?;
        self.read_line().map(|_| ())
    }
}
