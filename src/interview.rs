//! FIR interview engine.
//!
//! A two-state machine driven turn by turn from caller-supplied history:
//!
//! ```text
//! COLLECTING --(reply without marker)--> COLLECTING
//! COLLECTING --(reply containing REPORT_COLLECTED)--> COMPLETE
//! ```
//!
//! The model asks one question per turn and decides when the report is
//! complete. Each reply also carries a `FIELDS: {...}` status line, which
//! is stripped from the visible answer and exposed as structured field
//! status. The returned history keeps the cumulative status line on each
//! assistant turn so the next request can rebuild it; confirmed fields only
//! ever grow. The transition itself is taken only on the terminal marker; a
//! disagreement between the marker and the field status is reported as a
//! warning. A completed interview never returns to COLLECTING.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::core::status::CoreStatus;
use crate::history::{History, Role};
use crate::llm::LlmService;
use crate::prompt::templates::{
    fir_interview, FIELD_STATUS_PREFIX, FIR_REQUIRED_FIELDS, REPORT_COLLECTED_MARKER,
};
use crate::prompt::{ComposedPrompt, LocaleHints, PromptComposer, PromptRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewPhase {
    Collecting,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterviewState {
    pub required_fields: Vec<String>,
    pub confirmed_fields: BTreeSet<String>,
    /// Everything the user has said so far, oldest first.
    pub narrative: String,
    pub phase: InterviewPhase,
}

impl InterviewState {
    pub fn new() -> Self {
        Self {
            required_fields: FIR_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            confirmed_fields: BTreeSet::new(),
            narrative: String::new(),
            phase: InterviewPhase::Collecting,
        }
    }

    /// Rebuilds the state implied by a history. An empty history is the
    /// initial COLLECTING state.
    pub fn from_history(history: &History) -> Self {
        let mut state = Self::new();
        let mut narrative = Vec::new();

        for turn in history.turns() {
            match turn.role {
                Role::User => narrative.push(turn.text.trim()),
                Role::Assistant => {
                    if let Some(fields) = parse_field_status(&turn.text) {
                        state.confirmed_fields.extend(fields);
                    }
                    if turn.text.contains(REPORT_COLLECTED_MARKER) {
                        state.phase = InterviewPhase::Complete;
                    }
                }
            }
        }

        state.narrative = narrative.join("\n");
        state
    }

    pub fn missing_fields(&self) -> Vec<String> {
        self.required_fields
            .iter()
            .filter(|f| !self.confirmed_fields.contains(*f))
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == InterviewPhase::Complete
    }
}

impl Default for InterviewState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
    pub confirmed: Vec<String>,
    pub missing: Vec<String>,
}

impl From<&InterviewState> for FieldReport {
    fn from(state: &InterviewState) -> Self {
        Self {
            confirmed: state.confirmed_fields.iter().cloned().collect(),
            missing: state.missing_fields(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewTurn {
    pub status: CoreStatus,
    pub state: InterviewPhase,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub fields: FieldReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// History to send with the next turn. Unchanged when the turn could
    /// not be generated, so the same input can be retried.
    pub history: String,
}

pub struct InterviewEngine {
    llm: LlmService,
    composer: PromptComposer,
}

impl InterviewEngine {
    pub fn new(llm: LlmService, composer: PromptComposer) -> Self {
        Self { llm, composer }
    }

    /// The exact prompt for one turn. Identical input gives an identical
    /// prompt.
    pub fn compose_turn(&self, history: &History, user_input: &str) -> ComposedPrompt {
        let instructions = fir_interview();
        let locale = LocaleHints::default();
        self.composer
            .compose(&PromptRequest {
                instructions: &instructions,
                context: None,
                history: history.turns(),
                user_input,
                locale: &locale,
            })
    }

    pub async fn next_turn(&self, history: &History, user_input: &str) -> InterviewTurn {
        let state = InterviewState::from_history(history);

        if state.is_complete() {
            let summary = history
                .turns()
                .iter()
                .rev()
                .find(|t| t.role == Role::Assistant && t.text.contains(REPORT_COLLECTED_MARKER))
                .map(|t| summary_after_marker(&split_field_status(&t.text).0));
            return InterviewTurn {
                status: CoreStatus::Success,
                state: InterviewPhase::Complete,
                answer: summary.clone().unwrap_or_default(),
                summary,
                fields: FieldReport::from(&state),
                warnings: vec!["this interview is already complete".to_string()],
                error: None,
                history: history.to_transcript(),
            };
        }

        let prompt = self.compose_turn(history, user_input);
        let mut warnings = prompt.warnings();
        let reply = match self.llm.complete(&prompt.text).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, "Interview turn could not be generated");
                return InterviewTurn {
                    status: CoreStatus::Degraded,
                    state: InterviewPhase::Collecting,
                    answer: "The assistant is unavailable right now. Your answers are saved; \
                             please send the same message again."
                        .to_string(),
                    summary: None,
                    fields: FieldReport::from(&state),
                    warnings,
                    error: Some(format!("InterviewAIUnavailable: {}", err)),
                    history: history.to_transcript(),
                };
            }
        };

        let (visible, field_status) = split_field_status(&reply);
        let mut next = state;
        let reported = field_status.is_some();
        if let Some(fields) = field_status {
            next.confirmed_fields.extend(fields);
        }
        if !user_input.trim().is_empty() {
            if !next.narrative.is_empty() {
                next.narrative.push('\n');
            }
            next.narrative.push_str(user_input.trim());
        }

        let summary = if visible.contains(REPORT_COLLECTED_MARKER) {
            next.phase = InterviewPhase::Complete;
            let missing = next.missing_fields();
            if reported && !missing.is_empty() {
                warnings.push(format!(
                    "report marked complete while still missing: {}",
                    missing.join(", ")
                ));
            }
            Some(summary_after_marker(&visible))
        } else {
            if reported && next.missing_fields().is_empty() {
                warnings.push("all details reported but the summary was not produced yet".to_string());
            }
            None
        };

        let mut updated = history.clone();
        updated.push(Role::User, user_input.trim());
        updated.push(Role::Assistant, with_status_line(&visible, &next.confirmed_fields));

        tracing::debug!(
            phase = ?next.phase,
            confirmed = next.confirmed_fields.len(),
            "Interview turn generated"
        );

        InterviewTurn {
            status: CoreStatus::Success,
            state: next.phase,
            answer: visible,
            summary,
            fields: FieldReport::from(&next),
            warnings,
            error: None,
            history: updated.to_transcript(),
        }
    }
}

/// The stored form of an assistant turn: visible text plus the cumulative
/// status line.
fn with_status_line(visible: &str, confirmed: &BTreeSet<String>) -> String {
    let fields = serde_json::to_string(confirmed).unwrap_or_else(|_| "[]".to_string());
    format!("{visible}\n{FIELD_STATUS_PREFIX} {fields}")
}

/// Splits a reply into its visible text and the parsed `FIELDS:` status.
fn split_field_status(reply: &str) -> (String, Option<BTreeSet<String>>) {
    let mut status = None;
    let mut visible = Vec::new();
    for line in reply.lines() {
        match parse_status_line(line) {
            Some(fields) => status = Some(fields),
            None => visible.push(line),
        }
    }
    (visible.join("\n").trim().to_string(), status)
}

fn parse_field_status(text: &str) -> Option<BTreeSet<String>> {
    text.lines().filter_map(parse_status_line).last()
}

/// Accepts `FIELDS: {"location": true, ...}` or `FIELDS: ["location", ...]`.
/// Unknown field names are ignored.
fn parse_status_line(line: &str) -> Option<BTreeSet<String>> {
    let body = line.trim().strip_prefix(FIELD_STATUS_PREFIX)?.trim();
    let body = body.trim_matches('`');
    let value: Value = serde_json::from_str(body).ok()?;

    let names: Vec<String> = match value {
        Value::Object(map) => map
            .into_iter()
            .filter(|(_, v)| v.as_bool().unwrap_or(false))
            .map(|(k, _)| k)
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => return None,
    };

    Some(
        names
            .into_iter()
            .filter(|n| FIR_REQUIRED_FIELDS.contains(&n.as_str()))
            .collect(),
    )
}

fn summary_after_marker(text: &str) -> String {
    let Some(pos) = text.find(REPORT_COLLECTED_MARKER) else {
        return text.trim().to_string();
    };
    let rest = text[pos + REPORT_COLLECTED_MARKER.len()..]
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    if rest.is_empty() {
        text.trim().to_string()
    } else {
        rest.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LlmSettings;
    use crate::core::errors::ApiError;
    use crate::llm::service::testing::{Scripted, ScriptedGateway};
    use crate::prompt::{estimate_tokens, PromptBudget};
    use std::sync::Arc;

    fn engine(gateway: Arc<ScriptedGateway>) -> InterviewEngine {
        InterviewEngine::new(
            LlmService::new(gateway, &LlmSettings::default()),
            PromptComposer::default(),
        )
    }

    #[test]
    fn empty_history_starts_collecting() {
        let state = InterviewState::from_history(&History::new());
        assert_eq!(state.phase, InterviewPhase::Collecting);
        assert_eq!(state.missing_fields().len(), FIR_REQUIRED_FIELDS.len());
    }

    #[tokio::test]
    async fn question_keeps_collecting_and_strips_status_line() {
        let gateway = Arc::new(ScriptedGateway::replying(
            "Theek hai. Yeh kab hua?\nFIELDS: {\"incident_type\":true,\"date_time\":false}",
        ));
        let turn = engine(gateway).next_turn(&History::new(), "Mera phone chori ho gaya").await;

        assert_eq!(turn.status, CoreStatus::Success);
        assert_eq!(turn.state, InterviewPhase::Collecting);
        assert_eq!(turn.answer, "Theek hai. Yeh kab hua?");
        assert_eq!(turn.fields.confirmed, vec!["incident_type"]);
        assert!(turn.fields.missing.contains(&"date_time".to_string()));
        assert!(turn.summary.is_none());
        assert_eq!(
            turn.history,
            "User: Mera phone chori ho gaya\nAI: Theek hai. Yeh kab hua?\nFIELDS: [\"incident_type\"]"
        );
    }

    #[tokio::test]
    async fn confirmed_fields_carry_across_turns() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Scripted::Reply("Kab hua?\nFIELDS: {\"incident_type\":true}".into()),
            Scripted::Reply("Kahan hua?\nFIELDS: {\"date_time\":true}".into()),
            Scripted::Reply("Koi gawah tha?".into()),
        ]));
        let engine = engine(gateway);

        let first = engine.next_turn(&History::new(), "Chain snatching hui").await;
        let second = engine
            .next_turn(&History::parse(&first.history), "Kal raat 9 baje")
            .await;
        assert_eq!(second.fields.confirmed, vec!["date_time", "incident_type"]);

        let third = engine
            .next_turn(&History::parse(&second.history), "Andheri station ke bahar")
            .await;
        assert_eq!(third.fields.confirmed, vec!["date_time", "incident_type"]);
        assert_eq!(third.answer, "Koi gawah tha?");

        let rebuilt = InterviewState::from_history(&History::parse(&third.history));
        assert_eq!(rebuilt.confirmed_fields.len(), 2);
        assert_eq!(rebuilt.missing_fields(), vec!["location", "description", "witnesses"]);
    }

    #[tokio::test]
    async fn completed_history_reports_its_fields() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Scripted::Reply(
            "REPORT_COLLECTED: Phone stolen at Dadar.\n\
             FIELDS: [\"incident_type\",\"date_time\",\"location\",\"description\",\"witnesses\"]"
                .into(),
        )]));
        let engine = engine(gateway.clone());
        let done = engine.next_turn(&History::parse("User: chori\nAI: Kab?"), "kal").await;
        assert_eq!(done.state, InterviewPhase::Complete);

        let again = engine.next_turn(&History::parse(&done.history), "aur kuch").await;
        assert_eq!(again.state, InterviewPhase::Complete);
        assert!(again.fields.missing.is_empty());
        assert_eq!(again.summary.as_deref(), Some("Phone stolen at Dadar."));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn truncated_history_is_reported_as_a_warning() {
        let input = "phone chori";
        let base = estimate_tokens(
            &engine(Arc::new(ScriptedGateway::default()))
                .compose_turn(&History::new(), input)
                .text,
        );
        let mut history = History::new();
        for n in 0..30 {
            history.push(Role::User, format!("turn {n}: {}", "kal raat station pe ".repeat(20)));
            history.push(Role::Assistant, "Aur batao?");
        }
        let gateway = Arc::new(ScriptedGateway::replying("Kahan hua?"));
        let engine = InterviewEngine::new(
            LlmService::new(gateway, &LlmSettings::default()),
            PromptComposer::new(PromptBudget::new(base + 200, 0)),
        );

        let turn = engine.next_turn(&history, input).await;

        assert_eq!(turn.status, CoreStatus::Success);
        assert!(turn.warnings.iter().any(|w| w.contains("conversation turn(s) were left out")));
    }

    #[tokio::test]
    async fn marker_completes_the_interview() {
        let gateway = Arc::new(ScriptedGateway::replying(
            "REPORT_COLLECTED: Here is your summary...\nPhone stolen at Dadar station, 9 pm, no witnesses.\n\
             FIELDS: {\"incident_type\":true,\"date_time\":true,\"location\":true,\"description\":true,\"witnesses\":true}",
        ));
        let history = History::parse("User: Phone chori\nAI: Kab?\nUser: Kal 9 baje Dadar station pe");
        let turn = engine(gateway).next_turn(&history, "Koi gawah nahi tha").await;

        assert_eq!(turn.state, InterviewPhase::Complete);
        assert!(turn.summary.unwrap().contains("Dadar station"));
        assert!(turn.fields.missing.is_empty());
        assert!(turn.warnings.is_empty());
    }

    #[tokio::test]
    async fn no_marker_means_no_completion_even_with_all_fields() {
        let gateway = Arc::new(ScriptedGateway::replying(
            "Shukriya. Kuch aur?\nFIELDS: [\"incident_type\",\"date_time\",\"location\",\"description\",\"witnesses\"]",
        ));
        let turn = engine(gateway).next_turn(&History::new(), "sab bata diya").await;
        assert_eq!(turn.state, InterviewPhase::Collecting);
        assert_eq!(turn.warnings.len(), 1);
    }

    #[tokio::test]
    async fn premature_marker_is_flagged_but_honoured() {
        let gateway = Arc::new(ScriptedGateway::replying(
            "REPORT_COLLECTED: Summary\nFIELDS: {\"incident_type\":true}",
        ));
        let turn = engine(gateway).next_turn(&History::new(), "chori").await;
        assert_eq!(turn.state, InterviewPhase::Complete);
        assert!(turn.warnings[0].contains("still missing"));
    }

    #[tokio::test]
    async fn completed_history_never_reopens() {
        let gateway = Arc::new(ScriptedGateway::new(Vec::new()));
        let history = History::parse("User: chori\nAI: REPORT_COLLECTED: Here is your summary... Phone stolen.");
        let turn = engine(gateway.clone()).next_turn(&history, "ek aur baat").await;

        assert_eq!(turn.state, InterviewPhase::Complete);
        assert_eq!(turn.summary.as_deref(), Some("Here is your summary... Phone stolen."));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn unavailable_gateway_preserves_history() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Scripted::Fail(ApiError::upstream("503")),
            Scripted::Fail(ApiError::upstream("503")),
        ]));
        let history = History::parse("User: chori\nAI: Kab hua?");
        let turn = engine(gateway).next_turn(&history, "kal raat").await;

        assert_eq!(turn.status, CoreStatus::Degraded);
        assert_eq!(turn.state, InterviewPhase::Collecting);
        assert!(turn.error.unwrap().starts_with("InterviewAIUnavailable"));
        assert_eq!(turn.history, history.to_transcript());
    }

    #[tokio::test]
    async fn same_history_gives_same_prompt() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Scripted::Reply("Kab?".into()),
            Scripted::Reply("Kab?".into()),
        ]));
        let engine = engine(gateway.clone());
        let history = History::parse("User: chori\nAI: Kya hua?");

        let first = engine.next_turn(&history, "phone").await;
        let second = engine.next_turn(&history, "phone").await;

        let prompts = gateway.prompts.lock().unwrap().clone();
        assert_eq!(prompts[0], prompts[1]);
        assert_eq!(first.history, second.history);
        assert_eq!(first.fields.confirmed, second.fields.confirmed);
    }

    #[test]
    fn status_line_ignores_unknown_fields() {
        let fields = parse_status_line("FIELDS: {\"location\": true, \"mood\": true}").unwrap();
        assert_eq!(fields.into_iter().collect::<Vec<_>>(), vec!["location"]);
        assert!(parse_status_line("FIELDS: not json").is_none());
        assert!(parse_status_line("Where did it happen?").is_none());
    }
}
