//! Request-level orchestration.
//!
//! Each operation runs retrieval (where it applies), composes the prompt,
//! calls the completion gateway and maps every partial failure onto the
//! `success | degraded | error` discriminator. Nothing here holds
//! per-conversation state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ApiError;
use crate::core::status::CoreStatus;
use crate::documents::{StructuredDocument, TemplateId};
use crate::extract::{extract_json_object, string_fields};
use crate::history::History;
use crate::llm::{ImageInput, LlmService};
use crate::prompt::templates::{self, DOSSIER_FIELDS, NOTICE_FIELDS};
use crate::prompt::{ComposedPrompt, LocaleHints, PromptComposer, PromptRequest, GENERAL_REGION};
use crate::rag::loader::pdf_pages;
use crate::rag::{Passage, Retriever};
use crate::stream::ResponseStream;

/// Dossiers with less extractable text than this are rejected.
const MIN_DOSSIER_CHARS: usize = 50;
/// Dossier text beyond this many characters is not sent to the model.
const MAX_DOSSIER_CHARS: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_detail_level")]
    pub detail_level: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub history: String,
}

fn default_user_name() -> String {
    "User".to_string()
}

fn default_role() -> String {
    "Citizen".to_string()
}

fn default_language() -> String {
    "Hinglish".to_string()
}

fn default_detail_level() -> String {
    "Detailed".to_string()
}

fn default_state() -> String {
    GENERAL_REGION.to_string()
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            user_name: default_user_name(),
            role: default_role(),
            language: default_language(),
            detail_level: default_detail_level(),
            state: default_state(),
            history: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: Option<String>,
    pub page: Option<u64>,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub status: CoreStatus,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub warnings: Vec<String>,
}

/// A composed ask prompt, ready for whole-response or streaming use.
#[derive(Debug, Clone)]
pub struct PreparedAsk {
    pub prompt: String,
    pub status: CoreStatus,
    pub sources: Vec<SourceRef>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DossierAnalysis {
    pub status: CoreStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Map<String, Value>>,
    /// Completion text kept when it could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceReply {
    pub status: CoreStatus,
    pub user_text: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extracted legal-notice fields plus any prompt warnings.
#[derive(Debug, Clone)]
pub struct NoticeDraft {
    pub document: StructuredDocument,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FirAnalysis {
    pub status: CoreStatus,
    pub analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct AssistantOptions {
    pub top_k: usize,
    pub include_sources: bool,
    pub max_pdf_pages: usize,
}

pub struct Assistant {
    retriever: Arc<Retriever>,
    llm: LlmService,
    composer: PromptComposer,
    options: AssistantOptions,
}

impl Assistant {
    pub fn new(
        retriever: Arc<Retriever>,
        llm: LlmService,
        composer: PromptComposer,
        options: AssistantOptions,
    ) -> Self {
        Self {
            retriever,
            llm,
            composer,
            options,
        }
    }

    /// Retrieval plus composition for a legal question. Retrieval problems
    /// degrade the result instead of failing it.
    pub async fn prepare_ask(&self, request: &AskRequest) -> Result<PreparedAsk, ApiError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(ApiError::BadRequest("question must not be empty".to_string()));
        }

        let retrieval = self.retriever.retrieve(question, self.options.top_k).await?;
        let mut status = CoreStatus::Success;
        let mut warnings = Vec::new();
        if let Some(reason) = &retrieval.degraded {
            status = CoreStatus::Degraded;
            warnings.push(format!(
                "Reference material was unavailable ({}); the answer is not grounded in the legal corpus.",
                reason
            ));
        }

        let history = History::parse(&request.history);
        let instructions =
            templates::legal_assistant(&request.user_name, &request.role, &request.detail_level);
        let locale = LocaleHints::new(Some(&request.language), Some(&request.state));
        let composed = self.composer.compose(&PromptRequest {
            instructions: &instructions,
            context: Some(retrieval.passages.as_slice()),
            history: history.turns(),
            user_input: question,
            locale: &locale,
        });
        warnings.extend(composed.warnings());

        let sources = if self.options.include_sources {
            retrieval.passages.iter().map(source_ref).collect()
        } else {
            Vec::new()
        };

        Ok(PreparedAsk {
            prompt: composed.text,
            status,
            sources,
            warnings,
        })
    }

    pub async fn ask(&self, request: &AskRequest) -> Result<AskResponse, ApiError> {
        let prepared = self.prepare_ask(request).await?;

        match self.llm.complete(&prepared.prompt).await {
            Ok(answer) => Ok(AskResponse {
                status: prepared.status,
                answer,
                sources: prepared.sources,
                warnings: prepared.warnings,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "Answer generation unavailable");
                let mut warnings = prepared.warnings;
                warnings.push(err.to_string());
                Ok(AskResponse {
                    status: prepared.status.combine(CoreStatus::Degraded),
                    answer: ai_unavailable_answer(&err),
                    sources: prepared.sources,
                    warnings,
                })
            }
        }
    }

    /// Opens a fragment stream for a prepared prompt.
    pub async fn stream(&self, prepared: &PreparedAsk) -> Result<ResponseStream, ApiError> {
        let rx = self.llm.stream(&prepared.prompt).await?;
        Ok(ResponseStream::new(rx))
    }

    /// Extracts legal-notice fields from a spoken or typed complaint.
    pub async fn extract_notice(&self, complaint: &str) -> Result<NoticeDraft, ApiError> {
        let complaint = complaint.trim();
        if complaint.is_empty() {
            return Err(ApiError::BadRequest("voice_input must not be empty".to_string()));
        }

        let instructions = templates::legal_notice_extraction();
        let prompt = self.compose_plain(&instructions, &History::new(), complaint);
        let raw = self.llm.complete(&prompt.text).await?;

        let object = extract_json_object(&raw)?;
        let fields = string_fields(&object, &NOTICE_FIELDS, &raw)?;
        Ok(NoticeDraft {
            document: StructuredDocument::new(TemplateId::LegalNotice, fields),
            warnings: prompt.warnings(),
        })
    }

    /// Analyses an uploaded case file. Unparseable model output is returned
    /// as a degraded result with the raw text, never as empty data.
    pub async fn analyze_dossier(&self, pdf: Vec<u8>) -> Result<DossierAnalysis, ApiError> {
        let pages = pdf_pages(pdf, Some(self.options.max_pdf_pages))
            .await
            .map_err(|reason| ApiError::BadRequest(format!("PDF Read Error: {}", reason)))?;
        let text = pages.join("\n");
        if text.trim().chars().count() < MIN_DOSSIER_CHARS {
            return Err(ApiError::BadRequest("PDF Empty".to_string()));
        }

        let mut warnings = Vec::new();
        let char_count = text.chars().count();
        let text: String = if char_count > MAX_DOSSIER_CHARS {
            warnings.push(format!(
                "only the first {} of {} characters were analysed",
                MAX_DOSSIER_CHARS, char_count
            ));
            text.chars().take(MAX_DOSSIER_CHARS).collect()
        } else {
            text
        };

        let instructions = templates::dossier_analysis();
        let prompt = self.compose_plain(&instructions, &History::new(), &format!("TEXT: {}", text));
        warnings.extend(prompt.warnings());
        let raw = self.llm.complete(&prompt.text).await?;

        Ok(match extract_json_object(&raw) {
            Ok(analysis) => {
                let missing: Vec<&str> = DOSSIER_FIELDS
                    .iter()
                    .copied()
                    .filter(|field| !analysis.contains_key(*field))
                    .collect();
                let status = if missing.is_empty() {
                    CoreStatus::Success
                } else {
                    warnings.push(format!("analysis is missing: {}", missing.join(", ")));
                    CoreStatus::Degraded
                };
                DossierAnalysis {
                    status,
                    analysis: Some(analysis),
                    raw: None,
                    warnings,
                }
            }
            Err(ApiError::ExtractionFailed { message, raw }) => {
                warnings.push(message);
                DossierAnalysis {
                    status: CoreStatus::Degraded,
                    analysis: None,
                    raw: Some(raw),
                    warnings,
                }
            }
            Err(other) => return Err(other),
        })
    }

    /// Short officer-style reply to a transcribed voice note.
    pub async fn voice_reply(&self, transcript: &str, history: &str) -> Result<VoiceReply, ApiError> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(ApiError::BadRequest("transcript must not be empty".to_string()));
        }

        let instructions = templates::voice_reply();
        let prompt = self.compose_plain(&instructions, &History::parse(history), transcript);
        let warnings = prompt.warnings();

        Ok(match self.llm.complete(&prompt.text).await {
            Ok(answer) => VoiceReply {
                status: CoreStatus::Success,
                user_text: transcript.to_string(),
                answer,
                warnings,
                error: None,
            },
            Err(err) => {
                tracing::warn!(error = %err, "Voice reply unavailable");
                VoiceReply {
                    status: CoreStatus::Degraded,
                    user_text: transcript.to_string(),
                    answer: ai_unavailable_answer(&err),
                    warnings,
                    error: Some(err.to_string()),
                }
            }
        })
    }

    /// Transcribes a recorded voice note, then answers it like
    /// [`Assistant::voice_reply`]. A failed transcription is degraded; audio
    /// with no recognisable speech is rejected.
    pub async fn voice_message(
        &self,
        audio: Vec<u8>,
        filename: &str,
        history: &str,
    ) -> Result<VoiceReply, ApiError> {
        if audio.is_empty() {
            return Err(ApiError::BadRequest("audio file must not be empty".to_string()));
        }

        let transcript = match self.llm.transcribe(audio, filename).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "Voice note could not be transcribed");
                return Ok(VoiceReply {
                    status: CoreStatus::Degraded,
                    user_text: String::new(),
                    answer: "The voice note could not be transcribed right now. Please try again or type your question."
                        .to_string(),
                    warnings: Vec::new(),
                    error: Some(err.to_string()),
                });
            }
        };
        if transcript.trim().is_empty() {
            return Err(ApiError::BadRequest("no speech was recognised in the audio".to_string()));
        }

        self.voice_reply(&transcript, history).await
    }

    /// Reads a photographed FIR with the vision model.
    pub async fn analyze_fir(
        &self,
        image: Vec<u8>,
        declared_type: Option<&str>,
    ) -> Result<FirAnalysis, ApiError> {
        if image.is_empty() {
            return Err(ApiError::BadRequest("image file must not be empty".to_string()));
        }
        let Some(mime_type) = image_mime(declared_type, &image) else {
            return Err(ApiError::BadRequest(
                "upload a JPEG, PNG or WebP image of the FIR".to_string(),
            ));
        };

        let instructions = templates::fir_image_analysis();
        let image = ImageInput { mime_type, data: image };
        Ok(match self.llm.describe_image(&instructions, image).await {
            Ok(analysis) => FirAnalysis {
                status: CoreStatus::Success,
                analysis,
                error: None,
            },
            Err(err) => {
                tracing::warn!(error = %err, "FIR analysis unavailable");
                FirAnalysis {
                    status: CoreStatus::Degraded,
                    analysis: ai_unavailable_answer(&err),
                    error: Some(err.to_string()),
                }
            }
        })
    }

    fn compose_plain(&self, instructions: &str, history: &History, input: &str) -> ComposedPrompt {
        let locale = LocaleHints::default();
        self.composer.compose(&PromptRequest {
            instructions,
            context: None,
            history: history.turns(),
            user_input: input,
            locale: &locale,
        })
    }
}

/// The declared image type when it is one, else the type sniffed from the
/// leading bytes.
fn image_mime(declared: Option<&str>, data: &[u8]) -> Option<String> {
    if let Some(declared) = declared.map(str::trim) {
        if declared.starts_with("image/") {
            return Some(declared.to_string());
        }
    }
    let sniffed = if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"\x89PNG") {
        "image/png"
    } else if data.len() > 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        return None;
    };
    Some(sniffed.to_string())
}

fn source_ref(passage: &Passage) -> SourceRef {
    SourceRef {
        source: passage.source.clone(),
        page: passage.page,
        score: passage.score,
    }
}

fn ai_unavailable_answer(err: &ApiError) -> String {
    match err {
        ApiError::ConfigurationMissing(setting) => format!(
            "AI unavailable: the assistant is not configured ({} is missing). No answer was generated.",
            setting
        ),
        _ => "AI unavailable: the assistant could not generate an answer right now. Please try again."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LlmSettings;
    use crate::llm::service::testing::{Scripted, ScriptedGateway};
    use crate::prompt::PromptBudget;
    use crate::rag::{EmbeddingGateway, IndexedVector, InMemoryRagStore, LexicalEmbedder, RagStore};
    use serde_json::json;

    const OPTIONS: AssistantOptions = AssistantOptions {
        top_k: 2,
        include_sources: true,
        max_pdf_pages: 15,
    };

    async fn assistant(gateway: Arc<ScriptedGateway>, texts: &[&str]) -> Assistant {
        assistant_with(gateway, texts, PromptComposer::default()).await
    }

    async fn assistant_with(
        gateway: Arc<ScriptedGateway>,
        texts: &[&str],
        composer: PromptComposer,
    ) -> Assistant {
        let embedder = Arc::new(LexicalEmbedder::new(256).unwrap());
        let store = Arc::new(InMemoryRagStore::new());
        if !texts.is_empty() {
            let items = texts
                .iter()
                .enumerate()
                .map(|(i, t)| IndexedVector {
                    id: i.to_string(),
                    vector: embedder.embed_one(t),
                    text: t.to_string(),
                    metadata: json!({"source": format!("doc{i}.pdf")}),
                })
                .collect();
            store.replace_all(items, embedder.model()).await.unwrap();
        }
        Assistant::new(
            Arc::new(Retriever::new(embedder, store)),
            LlmService::new(gateway, &LlmSettings::default()),
            composer,
            OPTIONS,
        )
    }

    /// One page of plain Helvetica text.
    fn pdf_with_text(text: &str) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    const CASE_TEXT: &str =
        "State vs Ramesh. FIR 112 of 2026 at Kothrud police station. Accused charged with theft under BNS 303.";

    fn long_history(turns: usize) -> String {
        (0..turns)
            .map(|n| format!("User: turn {n} {}\nAI: theek hai", "kal raat station pe ".repeat(20)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Room for the instructions and input plus a little history.
    fn tight_composer(instructions: &str, input: &str) -> PromptComposer {
        let locale = LocaleHints::default();
        let base = PromptComposer::default().compose(&PromptRequest {
            instructions,
            context: None,
            history: &[],
            user_input: input,
            locale: &locale,
        });
        PromptComposer::new(PromptBudget::new(base.estimated_tokens + 200, 0))
    }

    #[tokio::test]
    async fn ask_grounds_answer_and_adds_state_clause() {
        let gateway = Arc::new(ScriptedGateway::replying("15 din ka notice dena hoga."));
        let assistant = assistant(
            gateway.clone(),
            &["Tenant must give 15 days notice before the rent period ends.", "Bail is a right."],
        )
        .await;

        let mut request = AskRequest::new("What is the rent notice period?");
        request.state = "Maharashtra".to_string();
        let response = assistant.ask(&request).await.unwrap();

        assert_eq!(response.status, CoreStatus::Success);
        assert_eq!(response.answer, "15 din ka notice dena hoga.");
        assert_eq!(response.sources[0].source.as_deref(), Some("doc0.pdf"));
        let prompt = gateway.last_prompt().unwrap();
        assert!(prompt.contains("Prioritize the laws of Maharashtra"));
        assert!(prompt.contains("Answer in Hinglish."));
    }

    #[tokio::test]
    async fn empty_index_degrades_but_still_answers() {
        let gateway = Arc::new(ScriptedGateway::replying("I am not sure."));
        let response = assistant(gateway.clone(), &[])
            .await
            .ask(&AskRequest::new("What is bail?"))
            .await
            .unwrap();

        assert_eq!(response.status, CoreStatus::Degraded);
        assert_eq!(response.answer, "I am not sure.");
        assert!(gateway.last_prompt().unwrap().contains("No reference material was found"));
        assert!(!response.warnings.is_empty());
    }

    #[tokio::test]
    async fn generation_outage_is_explicit() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Scripted::Fail(ApiError::upstream("503")),
            Scripted::Fail(ApiError::upstream("503")),
        ]));
        let response = assistant(gateway, &["anything"])
            .await
            .ask(&AskRequest::new("q"))
            .await
            .unwrap();
        assert_eq!(response.status, CoreStatus::Degraded);
        assert!(response.answer.starts_with("AI unavailable"));
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::default());
        let err = assistant(gateway, &[]).await.ask(&AskRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn notice_fields_are_extracted_from_fenced_json() {
        let gateway = Arc::new(ScriptedGateway::replying(
            "```json\n{\"sender_name\":\"A\",\"receiver_name\":\"B\",\"amount\":5000,\"reason\":\"unpaid dues\",\"act\":\"NI Act\"}\n```",
        ));
        let doc = assistant(gateway, &[])
            .await
            .extract_notice("B ne mera 5000 wapas nahi kiya")
            .await
            .unwrap();
        assert_eq!(doc.document.template, TemplateId::LegalNotice);
        assert_eq!(doc.document.fields["sender_name"], "A");
        assert_eq!(doc.document.fields["amount"], "5000");
        assert!(doc.warnings.is_empty());
    }

    #[tokio::test]
    async fn notice_extraction_failure_keeps_raw_text() {
        let gateway = Arc::new(ScriptedGateway::replying("Sorry, I need more details."));
        let err = assistant(gateway, &[]).await.extract_notice("help").await.unwrap_err();
        assert!(matches!(err, ApiError::ExtractionFailed { raw, .. } if raw == "Sorry, I need more details."));
    }

    #[tokio::test]
    async fn unreadable_dossier_is_bad_request() {
        let gateway = Arc::new(ScriptedGateway::default());
        let err = assistant(gateway.clone(), &[])
            .await
            .analyze_dossier(b"not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.starts_with("PDF Read Error")));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn dossier_without_enough_text_is_empty() {
        let gateway = Arc::new(ScriptedGateway::default());
        let err = assistant(gateway.clone(), &[])
            .await
            .analyze_dossier(pdf_with_text("Page 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "PDF Empty"));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn dossier_analysis_is_returned() {
        let gateway = Arc::new(ScriptedGateway::replying(
            "```json\n{\"case_title\":\"State vs Ramesh\",\"case_details\":\"Theft\",\"timeline\":[],\
             \"documents\":[\"FIR\"],\"opposition_analysis\":[],\"defence_strategy\":[\"Seek bail\"]}\n```",
        ));
        let analysis = assistant(gateway.clone(), &[])
            .await
            .analyze_dossier(pdf_with_text(CASE_TEXT))
            .await
            .unwrap();

        assert_eq!(analysis.status, CoreStatus::Success);
        assert_eq!(analysis.analysis.unwrap()["case_title"], "State vs Ramesh");
        assert!(analysis.raw.is_none());
        assert!(gateway.last_prompt().unwrap().contains("Kothrud"));
    }

    #[tokio::test]
    async fn unparseable_dossier_analysis_keeps_raw_text() {
        let gateway = Arc::new(ScriptedGateway::replying("The accused should apply for bail."));
        let analysis = assistant(gateway, &[])
            .await
            .analyze_dossier(pdf_with_text(CASE_TEXT))
            .await
            .unwrap();

        assert_eq!(analysis.status, CoreStatus::Degraded);
        assert!(analysis.analysis.is_none());
        assert_eq!(analysis.raw.as_deref(), Some("The accused should apply for bail."));
        assert!(!analysis.warnings.is_empty());
    }

    #[tokio::test]
    async fn voice_reply_reports_dropped_history() {
        let gateway = Arc::new(ScriptedGateway::replying("Thane jaiye."));
        let input = "mera bag chori ho gaya";
        let composer = tight_composer(&templates::voice_reply(), input);
        let reply = assistant_with(gateway, &[], composer)
            .await
            .voice_reply(input, &long_history(30))
            .await
            .unwrap();

        assert_eq!(reply.status, CoreStatus::Success);
        assert!(reply.warnings.iter().any(|w| w.contains("conversation turn(s) were left out")));
    }

    #[tokio::test]
    async fn voice_message_is_transcribed_then_answered() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Scripted::Reply("meri cycle chori ho gayi".into()),
            Scripted::Reply("FIR darj karwaiye.".into()),
        ]));
        let reply = assistant(gateway.clone(), &[])
            .await
            .voice_message(vec![1, 2, 3], "note.wav", "")
            .await
            .unwrap();

        assert_eq!(reply.status, CoreStatus::Success);
        assert_eq!(reply.user_text, "meri cycle chori ho gayi");
        assert_eq!(reply.answer, "FIR darj karwaiye.");
        let prompts = gateway.prompts.lock().unwrap().clone();
        assert_eq!(prompts[0], "[audio:note.wav]");
        assert!(prompts[1].contains("meri cycle chori ho gayi"));
    }

    #[tokio::test]
    async fn failed_transcription_is_degraded() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Scripted::Fail(
            ApiError::ConfigurationMissing("llm.api_key".into()),
        )]));
        let reply = assistant(gateway.clone(), &[])
            .await
            .voice_message(vec![1], "note.wav", "")
            .await
            .unwrap();
        assert_eq!(reply.status, CoreStatus::Degraded);
        assert!(reply.error.unwrap().contains("llm.api_key"));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn silent_voice_message_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::replying("   "));
        let err = assistant(gateway, &[])
            .await
            .voice_message(vec![1], "note.wav", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn fir_photo_is_sent_to_the_vision_model() {
        let gateway = Arc::new(ScriptedGateway::replying("FIR 112, Kothrud. Theft under BNS 303."));
        let analysis = assistant(gateway.clone(), &[])
            .await
            .analyze_fir(vec![0xFF, 0xD8, 0xFF, 0xE0], None)
            .await
            .unwrap();

        assert_eq!(analysis.status, CoreStatus::Success);
        assert!(analysis.analysis.contains("Kothrud"));
        assert!(gateway.last_prompt().unwrap().ends_with("[image:image/jpeg]"));
        assert_eq!(gateway.last_model().as_deref(), Some("llama-3.2-11b-vision-preview"));
    }

    #[tokio::test]
    async fn non_image_fir_upload_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::default());
        let err = assistant(gateway.clone(), &[])
            .await
            .analyze_fir(b"%PDF-1.5".to_vec(), Some("application/pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn voice_reply_uses_history() {
        let gateway = Arc::new(ScriptedGateway::replying("Aap thane aa jaiye."));
        let reply = assistant(gateway.clone(), &[])
            .await
            .voice_reply("mera bag chori ho gaya", "User: namaste\nAI: boliye")
            .await
            .unwrap();
        assert_eq!(reply.status, CoreStatus::Success);
        assert_eq!(reply.user_text, "mera bag chori ho gaya");
        assert!(gateway.last_prompt().unwrap().contains("AI: boliye"));
    }
}
