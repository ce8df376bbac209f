pub mod openai;
pub mod provider;
pub mod service;
pub mod types;

pub use openai::OpenAiCompatibleProvider;
pub use provider::{CompletionGateway, UnconfiguredGateway};
pub use service::LlmService;
pub use types::{ChatMessage, ChatRequest, ImageInput, TranscriptionRequest};
