use std::io::IsTerminal;

use cdf_cli_core::credentials::Prompt;
use cdf_cli_core::{CdfError, Result};
use inquire::{Password, PasswordDisplayMode, Text};

/// Terminal prompt backed by `inquire`.
pub struct InquirePrompt;

impl InquirePrompt {
    /// Only available when stdin is a terminal; otherwise credentials that are
    /// not supplied stay unresolved.
    pub fn when_interactive() -> Option<Self> {
        std::io::stdin().is_terminal().then_some(Self)
    }
}

impl Prompt for InquirePrompt {
    fn prompt_visible(&self, label: &str) -> Result<String> {
        Text::new(label)
            .prompt()
            .map_err(|e| CdfError::Configuration(format!("failed to read input: {e}")))
    }

    fn prompt_secret(&self, label: &str) -> Result<String> {
        Password::new(label)
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Hidden)
            .prompt()
            .map_err(|e| CdfError::Configuration(format!("failed to read input: {e}")))
    }
}
