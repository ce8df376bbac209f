//! Caller-supplied conversation history.
//!
//! History is never stored server-side: every request carries it, either as
//! a JSON array of `{role, text}` objects or as the transcript form the
//! web client sends (`User: ...` / `AI: ...` lines).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "ai", alias = "model")]
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(alias = "content")]
    pub text: String,
    /// 0-based position in the history.
    #[serde(default)]
    pub ordinal: usize,
}

/// Ordered sequence of turns, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct History {
    turns: Vec<ConversationTurn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: impl IntoIterator<Item = ConversationTurn>) -> Self {
        let mut history = Self::new();
        for turn in turns {
            history.push(turn.role, turn.text);
        }
        history
    }

    /// Parses either serialized form. Blank input is an empty history.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::new();
        }
        if trimmed.starts_with('[') {
            if let Ok(turns) = serde_json::from_str::<Vec<ConversationTurn>>(trimmed) {
                return Self::from_turns(turns);
            }
        }
        Self::parse_transcript(trimmed)
    }

    fn parse_transcript(raw: &str) -> Self {
        let mut history = Self::new();
        for line in raw.lines() {
            let line = line.trim_end();
            match split_speaker(line) {
                Some((role, text)) => history.push(role, text),
                None => match history.turns.last_mut() {
                    Some(last) => {
                        last.text.push('\n');
                        last.text.push_str(line);
                    }
                    None if !line.trim().is_empty() => history.push(Role::User, line.trim()),
                    None => {}
                },
            }
        }
        for turn in &mut history.turns {
            turn.text = turn.text.trim().to_string();
        }
        history
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        let ordinal = self.turns.len();
        self.turns.push(ConversationTurn {
            role,
            text: text.into(),
            ordinal,
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Transcript form, one `Label: text` entry per turn.
    pub fn to_transcript(&self) -> String {
        render_transcript(&self.turns)
    }
}

pub fn render_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_speaker(line: &str) -> Option<(Role, &str)> {
    const SPEAKERS: &[(&str, Role)] = &[
        ("User:", Role::User),
        ("You:", Role::User),
        ("AI:", Role::Assistant),
        ("Assistant:", Role::Assistant),
        ("Officer:", Role::Assistant),
    ];
    let trimmed = line.trim_start();
    SPEAKERS.iter().find_map(|(prefix, role)| {
        trimmed
            .strip_prefix(prefix)
            .map(|rest| (*role, rest.trim()))
    })
}
