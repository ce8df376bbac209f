//! Prompt assembly: the composer, per-task instructions and the input
//! budget.

pub mod composer;
pub mod templates;
pub mod window;

pub use composer::{
    ComposedPrompt, LocaleHints, PromptComposer, PromptRequest, Truncation, GENERAL_REGION,
    RESPONSE_CUE,
};
pub use window::{estimate_tokens, PromptBudget};
