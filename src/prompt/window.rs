//! Prompt budget.
//!
//! Token counts are estimated at roughly four characters per token; the
//! budget only has to be conservative, not exact.

use crate::core::config::LlmSettings;

/// Input budget left for the prompt once the output reserve is set aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBudget {
    pub max_tokens: usize,
    pub output_reserve: usize,
}

impl PromptBudget {
    pub fn new(max_tokens: usize, output_reserve: usize) -> Self {
        Self {
            max_tokens,
            output_reserve,
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new(settings.max_context_tokens, settings.output_reserve_tokens)
    }

    pub fn available_tokens(&self) -> usize {
        self.max_tokens.saturating_sub(self.output_reserve)
    }

    pub fn fits(&self, tokens: usize) -> bool {
        tokens <= self.available_tokens()
    }
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self::from_settings(&LlmSettings::default())
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}
