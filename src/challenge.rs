//! Operator challenges.
//!
//! The security gate never touches the terminal directly. It asks a
//! [`ChallengeProvider`] for secrets and confirmations, which lets the same
//! engine run against a real terminal or a scripted, headless provider.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Source of operator input for password and confirmation prompts.
pub trait ChallengeProvider {
    /// Ask for a secret without echoing it.
    fn ask_secret(&mut self, prompt: &str) -> io::Result<String>;

    /// Ask a yes/no question. Only an affirmative answer returns `true`.
    fn ask_confirmation(&mut self, prompt: &str) -> io::Result<bool>;

    /// Ask for a line of echoed text, without the trailing newline.
    fn ask_text(&mut self, prompt: &str) -> io::Result<String>;
}

/// Accepts `yes` or `y` in any case, ignoring surrounding whitespace.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "yes" | "y")
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

/// Interactive provider: secrets through `rpassword`, confirmations on stdin.
#[derive(Debug, Default)]
pub struct TerminalChallenge;

impl ChallengeProvider for TerminalChallenge {
    fn ask_secret(&mut self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt)
    }

    fn ask_confirmation(&mut self, prompt: &str) -> io::Result<bool> {
        let line = read_line(&format!("{prompt} (yes/no): "))?;
        Ok(is_affirmative(&line))
    }

    fn ask_text(&mut self, prompt: &str) -> io::Result<String> {
        read_line(prompt)
    }
}

fn read_line(prompt: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

// ---------------------------------------------------------------------------
// Scripted
// ---------------------------------------------------------------------------

/// Headless provider that replays queued answers.
///
/// Every prompt it receives is recorded, so callers can assert on how many
/// challenges were issued. Running out of answers is an
/// `UnexpectedEof` error rather than a silent default.
#[derive(Debug, Default)]
pub struct ScriptedChallenge {
    secrets: VecDeque<String>,
    confirmations: VecDeque<bool>,
    texts: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedChallenge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secrets<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets.extend(secrets.into_iter().map(Into::into));
        self
    }

    pub fn with_confirmations(mut self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.confirmations.extend(answers);
        self
    }

    pub fn with_texts<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.texts.extend(texts.into_iter().map(Into::into));
        self
    }

    /// All prompts issued so far, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }

    /// Answers that were queued but never asked for.
    pub fn remaining_secrets(&self) -> usize {
        self.secrets.len()
    }
}

impl ChallengeProvider for ScriptedChallenge {
    fn ask_secret(&mut self, prompt: &str) -> io::Result<String> {
        self.prompts.push(prompt.to_string());
        self.secrets
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted secret left"))
    }

    fn ask_confirmation(&mut self, prompt: &str) -> io::Result<bool> {
        self.prompts.push(prompt.to_string());
        self.confirmations.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted confirmation left")
        })
    }

    fn ask_text(&mut self, prompt: &str) -> io::Result<String> {
        self.prompts.push(prompt.to_string());
        self.texts
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted text left"))
    }
}
