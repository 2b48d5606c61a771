//! Line-oriented "User: " prompt shared by the interactive demos

use std::io::{self, BufRead, Write};

/// Asked once when input runs out or a turn fails
pub const FALLBACK_QUESTION: &str = "What do you know about LangGraph?";

const EXIT_WORDS: &[&str] = &["quit", "exit", "q"];

/// Prompts for one line per turn.
///
/// Stops on an exit word (printing "Goodbye!"). EOF or a read error
/// substitutes [`FALLBACK_QUESTION`] once and then stops.
pub struct Repl<R, W> {
    input: R,
    output: W,
    finished: bool,
    fallback_used: bool,
}

impl Repl<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Repl<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            finished: false,
            fallback_used: false,
        }
    }

    /// Next user turn, or `None` when the session is over
    pub fn next_turn(&mut self) -> io::Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            write!(self.output, "User: ")?;
            self.output.flush()?;

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => {
                    tracing::debug!("end of input, using fallback question");
                    return self.take_fallback();
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if is_exit_word(line) {
                        writeln!(self.output, "Goodbye!")?;
                        self.finished = true;
                        return Ok(None);
                    }
                    return Ok(Some(line.to_string()));
                }
                Err(e) => {
                    tracing::debug!("input error, using fallback question: {}", e);
                    return self.take_fallback();
                }
            }
        }
    }

    /// Replace a failed turn with [`FALLBACK_QUESTION`], echoed as a user line.
    ///
    /// `None` once the fallback has been used; the session ends either way.
    pub fn fallback(&mut self) -> io::Result<Option<String>> {
        if self.fallback_used {
            self.finished = true;
            return Ok(None);
        }
        write!(self.output, "User: ")?;
        self.take_fallback()
    }

    // Assumes the "User: " prompt is already on screen
    fn take_fallback(&mut self) -> io::Result<Option<String>> {
        self.finished = true;
        if self.fallback_used {
            writeln!(self.output)?;
            return Ok(None);
        }
        self.fallback_used = true;
        writeln!(self.output, "{}", FALLBACK_QUESTION)?;
        Ok(Some(FALLBACK_QUESTION.to_string()))
    }

    /// Ask a one-off question outside the turn loop (e.g. for an interrupt)
    pub fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }
}

fn is_exit_word(line: &str) -> bool {
    let lower = line.to_lowercase();
    EXIT_WORDS.contains(&lower.as_str())
}
