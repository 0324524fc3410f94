// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User interaction.
//!
//! Business logic never renders prompts itself. Instead it asks a
//! [`Prompter`] a question and acts on the answer, which keeps every decision
//! testable without a terminal.

use inquire::{Confirm, InquireError, Password, Select, Text};

/// Ask the user questions.
pub trait Prompter {
    /// Pick one option out of a list.
    fn select(&mut self, message: &str, options: Vec<String>) -> Result<String>;

    /// Answer a yes or no question.
    fn confirm(&mut self, message: &str, default: bool) -> Result<bool>;

    /// Enter free form text.
    fn text(&mut self, message: &str) -> Result<String>;

    /// Enter text that must not be echoed, e.g., tokens.
    fn secret(&mut self, message: &str) -> Result<String>;
}

/// Prompter that renders questions in the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn select(&mut self, message: &str, options: Vec<String>) -> Result<String> {
        if options.is_empty() {
            return Err(PromptError::NoOptions(message.to_string()));
        }

        Ok(Select::new(message, options).prompt()?)
    }

    fn confirm(&mut self, message: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new(message).with_default(default).prompt()?)
    }

    fn text(&mut self, message: &str) -> Result<String> {
        Ok(Text::new(message).prompt()?)
    }

    fn secret(&mut self, message: &str) -> Result<String> {
        Ok(Password::new(message).without_confirmation().prompt()?)
    }
}

/// Prompt error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Prompt was cancelled or could not be rendered.
    #[error(transparent)]
    Inquire(#[from] InquireError),

    /// Nothing to choose from.
    #[error("nothing to choose from for {0:?}")]
    NoOptions(String),

    /// No answer is available.
    #[error("no answer for {0:?}")]
    NoAnswer(String),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;
