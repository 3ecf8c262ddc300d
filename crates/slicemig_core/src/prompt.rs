use std::io::{self, BufRead, Stdout, Write};

use anyhow::{Context, Result, bail};

/// Operator interaction used by the interactive run.
pub trait Prompter {
    /// Asks a question and returns the trimmed answer.
    fn ask(&mut self, question: &str) -> Result<String>;
    /// Prints a line to the operator.
    fn say(&mut self, line: &str) -> Result<()>;

    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{question} (y/n)"))?;
        Ok(is_affirmative(&answer))
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub struct TerminalPrompter<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl TerminalPrompter<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.writer, "{question}: ").context("failed to write prompt")?;
        self.writer.flush().context("failed to flush prompt")?;

        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .context("failed to read operator input")?;
        if read == 0 {
            bail!("input closed before answering: {question}");
        }
        Ok(line.trim().to_string())
    }

    fn say(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{line}").context("failed to write output")
    }
}

/// Returns `preset` when given, otherwise asks. Blank answers are rejected.
pub fn value_or_ask<P: Prompter + ?Sized>(
    prompter: &mut P,
    preset: Option<&str>,
    question: &str,
) -> Result<String> {
    let value = match preset.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.to_string(),
        None => prompter.ask(question)?,
    };
    if value.is_empty() {
        bail!("a value is required for: {question}");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn prompter(input: &str) -> TerminalPrompter<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalPrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn ask_writes_question_and_trims_answer() {
        let mut prompter = prompter("  my-repo \r\n");
        let answer = prompter.ask("Repository").expect("ask");
        assert_eq!(answer, "my-repo");
        let output = String::from_utf8(prompter.into_writer()).expect("utf8");
        assert_eq!(output, "Repository: ");
    }

    #[test]
    fn confirm_accepts_yes_variants_only() {
        let mut prompter = prompter("Y\nyes\nno\n\n");
        assert!(prompter.confirm("Save?").expect("first"));
        assert!(prompter.confirm("Save?").expect("second"));
        assert!(!prompter.confirm("Save?").expect("third"));
        assert!(!prompter.confirm("Save?").expect("fourth"));
        let output = String::from_utf8(prompter.into_writer()).expect("utf8");
        assert!(output.starts_with("Save? (y/n): "));
    }

    #[test]
    fn ask_fails_on_closed_input() {
        let mut prompter = prompter("");
        let error = prompter.ask("Repository").expect_err("must fail");
        assert!(error.to_string().contains("input closed"));
    }

    #[test]
    fn value_or_ask_prefers_preset() {
        let mut prompter = prompter("from-prompt\n");
        assert_eq!(
            value_or_ask(&mut prompter, Some("preset"), "Repository").expect("preset"),
            "preset"
        );
        assert_eq!(
            value_or_ask(&mut prompter, Some("  "), "Repository").expect("prompted"),
            "from-prompt"
        );
    }

    #[test]
    fn value_or_ask_rejects_blank_answers() {
        let mut prompter = prompter("\n");
        let error = value_or_ask(&mut prompter, None, "Slice type").expect_err("must fail");
        assert!(error.to_string().contains("Slice type"));
    }
}
