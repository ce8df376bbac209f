//! Phone menu for callers without a smartphone.
//!
//! The telephony provider fetches TwiML from the voice webhooks; this
//! module builds those documents. Key 1 raises an SOS, key 2 records a
//! short legal query.

use std::fmt::Write;

pub const TWIML_CONTENT_TYPE: &str = "application/xml";

pub const MENU_PATH: &str = "/voice";
pub const HANDLE_KEY_PATH: &str = "/handle-key";
pub const PROCESS_SPEECH_PATH: &str = "/process-speech";

const VOICE: &str = "alice";
const LANGUAGE: &str = "en-IN";
/// Longest spoken query the recorder accepts, in seconds.
const MAX_QUERY_SECONDS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verb {
    Say(String),
    Gather {
        action: String,
        num_digits: u8,
        prompt: String,
    },
    Record {
        action: String,
        max_length: u32,
    },
    Redirect(String),
    Hangup,
}

/// An ordered list of TwiML verbs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwimlResponse {
    verbs: Vec<Verb>,
}

impl TwimlResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    /// Reads `prompt` while waiting for `num_digits` key presses, which are
    /// posted to `action`.
    pub fn gather(mut self, action: &str, num_digits: u8, prompt: impl Into<String>) -> Self {
        self.verbs.push(Verb::Gather {
            action: action.to_string(),
            num_digits,
            prompt: prompt.into(),
        });
        self
    }

    pub fn record(mut self, action: &str, max_length: u32) -> Self {
        self.verbs.push(Verb::Record {
            action: action.to_string(),
            max_length,
        });
        self
    }

    pub fn redirect(mut self, url: &str) -> Self {
        self.verbs.push(Verb::Redirect(url.to_string()));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for verb in &self.verbs {
            // Writing to a String cannot fail.
            let _ = match verb {
                Verb::Say(text) => write!(xml, "{}", say_xml(text)),
                Verb::Gather {
                    action,
                    num_digits,
                    prompt,
                } => write!(
                    xml,
                    r#"<Gather numDigits="{}" action="{}" method="POST">{}</Gather>"#,
                    num_digits,
                    escape_xml(action),
                    say_xml(prompt)
                ),
                Verb::Record { action, max_length } => write!(
                    xml,
                    r#"<Record maxLength="{}" action="{}" method="POST"/>"#,
                    max_length,
                    escape_xml(action)
                ),
                Verb::Redirect(url) => {
                    write!(xml, r#"<Redirect method="POST">{}</Redirect>"#, escape_xml(url))
                }
                Verb::Hangup => write!(xml, "<Hangup/>"),
            };
        }
        xml.push_str("</Response>");
        xml
    }
}

fn say_xml(text: &str) -> String {
    format!(
        r#"<Say voice="{VOICE}" language="{LANGUAGE}">{}</Say>"#,
        escape_xml(text)
    )
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Emergency,
    LegalAdvice,
    Unknown,
}

impl MenuChoice {
    pub fn from_digits(digits: &str) -> Self {
        match digits.trim() {
            "1" => MenuChoice::Emergency,
            "2" => MenuChoice::LegalAdvice,
            _ => MenuChoice::Unknown,
        }
    }
}

/// The greeting and key prompt.
pub fn main_menu() -> TwimlResponse {
    TwimlResponse::new().gather(
        HANDLE_KEY_PATH,
        1,
        "Welcome to Nyay Sahayak. Press 1 for Emergency SOS. Press 2 for Legal Advice.",
    )
    // Reached only when the caller pressed nothing.
    .redirect(MENU_PATH)
}

/// Reply once the SOS alert has been dispatched, or why it could not be.
pub fn emergency(alert_dispatched: bool) -> TwimlResponse {
    if alert_dispatched {
        TwimlResponse::new()
            .say("Emergency Mode Activated. Sending Alert.")
            .hangup()
    } else {
        TwimlResponse::new()
            .say("Emergency alerts are not available right now. Please dial 112.")
            .hangup()
    }
}

pub fn legal_query() -> TwimlResponse {
    TwimlResponse::new()
        .say("Please state your legal query.")
        .record(PROCESS_SPEECH_PATH, MAX_QUERY_SECONDS)
}

pub fn invalid_choice() -> TwimlResponse {
    TwimlResponse::new()
        .say("Sorry, that is not a valid option.")
        .redirect(MENU_PATH)
}

pub fn query_received() -> TwimlResponse {
    TwimlResponse::new().say("We received your query.").hangup()
}
