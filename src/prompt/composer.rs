//! Prompt Composer.
//!
//! Pure string assembly in a fixed order: task instructions (with locale
//! clauses), reference context, history oldest first, the current input,
//! then the cue where the model's turn begins. When the result would not
//! fit the input budget, the oldest history turns go first, then the least
//! relevant passages, and the prompt says so in place of what was removed.

use serde::Serialize;

use super::window::{estimate_tokens, PromptBudget};
use crate::history::{render_transcript, ConversationTurn};
use crate::rag::Passage;

/// Region value meaning "no particular state".
pub const GENERAL_REGION: &str = "India (General)";

pub const RESPONSE_CUE: &str = "AI:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleHints {
    pub language: Option<String>,
    pub region: Option<String>,
}

impl LocaleHints {
    /// Blank values and the general region are treated as absent.
    pub fn new(language: Option<&str>, region: Option<&str>) -> Self {
        let clean = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            language: clean(language),
            region: clean(region).filter(|r| !r.eq_ignore_ascii_case(GENERAL_REGION)),
        }
    }

    fn clauses(&self) -> Vec<String> {
        let mut clauses = Vec::new();
        if let Some(region) = &self.region {
            clauses.push(format!(
                "Prioritize the laws of {} where they differ from central law.",
                region
            ));
        }
        if let Some(language) = &self.language {
            clauses.push(format!("Answer in {}.", language));
        }
        clauses
    }
}

pub struct PromptRequest<'a> {
    pub instructions: &'a str,
    /// `None` omits the context section entirely (tasks without retrieval);
    /// `Some(&[])` states that no reference material was found.
    pub context: Option<&'a [Passage]>,
    pub history: &'a [ConversationTurn],
    pub user_input: &'a str,
    pub locale: &'a LocaleHints,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Truncation {
    pub dropped_history_turns: usize,
    pub dropped_context_passages: usize,
    /// Still over budget with all history and context removed.
    pub over_budget: bool,
}

#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub text: String,
    pub estimated_tokens: usize,
    pub truncation: Option<Truncation>,
}

impl ComposedPrompt {
    pub fn warnings(&self) -> Vec<String> {
        let Some(t) = &self.truncation else {
            return Vec::new();
        };
        let mut warnings = Vec::new();
        if t.dropped_history_turns > 0 {
            warnings.push(format!(
                "{} earlier conversation turn(s) were left out to fit the model's input limit",
                t.dropped_history_turns
            ));
        }
        if t.dropped_context_passages > 0 {
            warnings.push(format!(
                "{} reference passage(s) were left out to fit the model's input limit",
                t.dropped_context_passages
            ));
        }
        if t.over_budget {
            warnings.push("the request exceeds the model's input limit".to_string());
        }
        warnings
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptComposer {
    budget: PromptBudget,
}

impl PromptComposer {
    pub fn new(budget: PromptBudget) -> Self {
        Self { budget }
    }

    pub fn compose(&self, request: &PromptRequest<'_>) -> ComposedPrompt {
        let history_len = request.history.len();
        let context_len = request.context.map_or(0, <[Passage]>::len);

        let mut history_start = 0;
        let mut context_keep = context_len;
        let mut over_budget = false;

        let text = loop {
            let text = render(request, history_start, context_keep);
            if self.budget.fits(estimate_tokens(&text)) {
                break text;
            }
            if history_start < history_len {
                history_start += 1;
            } else if context_keep > 0 {
                context_keep -= 1;
            } else {
                over_budget = true;
                break text;
            }
        };

        let truncation = Truncation {
            dropped_history_turns: history_start,
            dropped_context_passages: context_len - context_keep,
            over_budget,
        };
        let truncation = (truncation != Truncation::default()).then_some(truncation);
        if let Some(t) = &truncation {
            tracing::warn!(
                dropped_history = t.dropped_history_turns,
                dropped_context = t.dropped_context_passages,
                over_budget = t.over_budget,
                "Prompt truncated to fit input budget"
            );
        }

        ComposedPrompt {
            estimated_tokens: estimate_tokens(&text),
            text,
            truncation,
        }
    }
}

fn render(request: &PromptRequest<'_>, history_start: usize, context_keep: usize) -> String {
    let mut out = String::new();

    out.push_str(request.instructions.trim());
    out.push('\n');
    for clause in request.locale.clauses() {
        out.push_str(&clause);
        out.push('\n');
    }

    if let Some(context) = request.context {
        out.push_str("\n--- REFERENCE CONTEXT ---\n");
        if context.is_empty() {
            out.push_str(
                "No reference material was found for this question. Say that the reference \
                 material does not cover it; do not invent sections, acts or case law.\n",
            );
        } else if context_keep == 0 {
            out.push_str(
                "Reference material was left out to fit the input limit. Say that you could \
                 not consult it.\n",
            );
        } else {
            for (idx, passage) in context.iter().take(context_keep).enumerate() {
                out.push_str(&format!("[{}]{}\n", idx + 1, citation(passage)));
                out.push_str(&passage.text);
                out.push('\n');
            }
        }
    }

    if history_start > 0 || !request.history.is_empty() {
        out.push_str("\n--- CONVERSATION HISTORY ---\n");
        if history_start > 0 {
            out.push_str(&format!("({} earlier turn(s) omitted)\n", history_start));
        }
        let kept = &request.history[history_start..];
        if !kept.is_empty() {
            out.push_str(&render_transcript(kept));
            out.push('\n');
        }
    }

    out.push_str("\n--- CURRENT USER INPUT ---\n");
    out.push_str("User: ");
    out.push_str(request.user_input.trim());
    out.push_str("\n\n--- YOUR RESPONSE ---\n");
    out.push_str(RESPONSE_CUE);
    out
}

fn citation(passage: &Passage) -> String {
    match (&passage.source, passage.page) {
        (Some(source), Some(page)) => format!(" (source: {}, page {})", source, page),
        (Some(source), None) => format!(" (source: {})", source),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;

    fn passage(text: &str) -> Passage {
        Passage {
            text: text.to_string(),
            source: Some("rent.pdf".to_string()),
            page: Some(3),
            score: 0.9,
        }
    }

    fn request<'a>(
        context: Option<&'a [Passage]>,
        history: &'a History,
        locale: &'a LocaleHints,
    ) -> PromptRequest<'a> {
        PromptRequest {
            instructions: "ACT AS: Legal Assistant.",
            context,
            history: history.turns(),
            user_input: "What is the rent notice period?",
            locale,
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let history = History::parse("User: hello\nAI: namaste");
        let locale = LocaleHints::new(Some("Hinglish"), Some("Maharashtra"));
        let context = [passage("Tenant must give 15 days notice.")];
        let prompt = PromptComposer::default().compose(&request(Some(&context), &history, &locale));

        let text = &prompt.text;
        let positions: Vec<usize> = [
            "ACT AS: Legal Assistant.",
            "Prioritize the laws of Maharashtra",
            "Answer in Hinglish.",
            "Tenant must give 15 days notice.",
            "User: hello",
            "AI: namaste",
            "User: What is the rent notice period?",
        ]
        .iter()
        .map(|needle| text.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.ends_with(RESPONSE_CUE));
        assert!(text.contains("(source: rent.pdf, page 3)"));
        assert!(prompt.truncation.is_none());
    }

    #[test]
    fn general_region_adds_no_clause() {
        let locale = LocaleHints::new(Some("English"), Some("India (General)"));
        assert_eq!(locale.region, None);
        let history = History::new();
        let prompt = PromptComposer::default().compose(&request(None, &history, &locale));
        assert!(!prompt.text.contains("Prioritize"));
        assert!(!prompt.text.contains("REFERENCE CONTEXT"));
    }

    #[test]
    fn empty_context_is_stated_not_hidden() {
        let history = History::new();
        let locale = LocaleHints::default();
        let prompt = PromptComposer::default().compose(&request(Some(&[]), &history, &locale));
        assert!(prompt.text.contains("No reference material was found"));
    }

    #[test]
    fn composition_is_deterministic() {
        let history = History::parse("User: a\nAI: b");
        let locale = LocaleHints::new(Some("Hindi"), None);
        let context = [passage("x")];
        let composer = PromptComposer::default();
        let first = composer.compose(&request(Some(&context), &history, &locale));
        let second = composer.compose(&request(Some(&context), &history, &locale));
        assert_eq!(first.text, second.text);
    }

    #[test]
    fn oldest_history_is_dropped_before_context() {
        let mut history = History::new();
        for i in 0..20 {
            history.push(crate::history::Role::User, format!("turn {i} {}", "words ".repeat(20)));
        }
        let locale = LocaleHints::default();
        let context = [passage("Tenant must give 15 days notice.")];
        let composer = PromptComposer::new(PromptBudget::new(600, 100));

        let prompt = composer.compose(&request(Some(&context), &history, &locale));
        let truncation = prompt.truncation.clone().unwrap();
        assert!(truncation.dropped_history_turns > 0);
        assert_eq!(truncation.dropped_context_passages, 0);
        assert!(!prompt.text.contains("turn 0 "));
        assert!(prompt.text.contains("turn 19 "));
        assert!(prompt.text.contains("15 days notice"));
        assert!(prompt.estimated_tokens <= 500);
        assert!(!prompt.warnings().is_empty());
    }

    #[test]
    fn context_is_dropped_once_history_is_gone() {
        let history = History::parse("User: earlier question");
        let locale = LocaleHints::default();
        let context = [passage(&"long passage ".repeat(100)), passage("short")];
        let composer = PromptComposer::new(PromptBudget::new(200, 50));

        let prompt = composer.compose(&request(Some(&context), &history, &locale));
        let truncation = prompt.truncation.unwrap();
        assert_eq!(truncation.dropped_history_turns, 1);
        assert!(truncation.dropped_context_passages >= 1);
        assert!(!truncation.over_budget);
    }

    #[test]
    fn impossible_budget_is_flagged() {
        let history = History::new();
        let locale = LocaleHints::default();
        let composer = PromptComposer::new(PromptBudget::new(5, 0));
        let prompt = composer.compose(&request(None, &history, &locale));
        assert!(prompt.truncation.unwrap().over_budget);
    }
}
