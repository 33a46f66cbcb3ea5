use std::io::{self, BufRead, Stdout, StdinLock, Write};

use dialoguer::{Input, Password};

use crate::error::{ArchiveError, Result};

const YES: [&str; 2] = ["yes", "y"];
const NO: [&str; 2] = ["no", "n"];

/// Operator interaction: credentials, challenge codes and per-conversation questions.
pub trait Prompter {
    /// Shows `prompt` and returns the answer without its line terminator.
    fn ask_line(&mut self, prompt: &str) -> Result<String>;

    /// Like [`Prompter::ask_line`], for answers that must not be echoed.
    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        self.ask_line(prompt)
    }

    /// Repeats the question until the answer is one of y/yes/n/no (any case).
    fn ask_yes_no(&mut self, question: &str) -> Result<bool> {
        loop {
            let answer = self.ask_line(&format!("{question} [y/n]"))?;
            let answer = answer.trim().to_lowercase();
            if YES.contains(&answer.as_str()) {
                return Ok(true);
            }
            if NO.contains(&answer.as_str()) {
                return Ok(false);
            }
        }
    }
}

fn prompt_error(e: dialoguer::Error) -> ArchiveError {
    ArchiveError::Prompt(e.to_string())
}

/// Interactive terminal prompts. Secrets are read with echo off.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask_line(&mut self, prompt: &str) -> Result<String> {
        Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(prompt_error)
    }

    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(prompt_error)
    }
}

/// Reads answers line by line from any reader. Used when stdin is not a
/// terminal (piped answers) and in tests.
pub struct ScriptedPrompter<R, W> {
    input: R,
    output: W,
}

impl ScriptedPrompter<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ScriptedPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Prompter for ScriptedPrompter<R, W> {
    fn ask_line(&mut self, prompt: &str) -> Result<String> {
        writeln!(self.output, "{prompt}: ")
            .and_then(|_| self.output.flush())
            .map_err(|e| ArchiveError::Prompt(e.to_string()))?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|e| ArchiveError::Prompt(e.to_string()))?;
        if read == 0 {
            return Err(ArchiveError::Prompt("input closed".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
