use std::sync::Arc;

use crate::assistant::{Assistant, AssistantOptions};
use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::core::errors::ApiError;
use crate::interview::InterviewEngine;
use crate::llm::LlmService;
use crate::notify::{Notifier, TwilioNotifier};
use crate::prompt::{PromptBudget, PromptComposer};
use crate::rag::{
    build_embedder, Chunker, EmbeddingGateway, IngestionPipeline, RagStore, Retriever,
    SqliteRagStore, UnconfiguredEmbedder,
};

pub mod error;

use error::InitializationError;

/// Shared, read-only service graph. Conversation state is never held here;
/// every request carries its own history.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<AppConfig>,
    pub llm: LlmService,
    pub embedder: Arc<dyn EmbeddingGateway>,
    pub rag_store: Arc<dyn RagStore>,
    pub ingestion: Arc<IngestionPipeline>,
    pub assistant: Arc<Assistant>,
    pub interview: Arc<InterviewEngine>,
    /// The missing setting's name when SMS credentials are not configured.
    pub notifier: Result<Arc<dyn Notifier>, String>,
}

impl AppState {
    /// Loads configuration and wires every component.
    ///
    /// Missing gateway credentials do not fail start-up: the affected
    /// component is replaced by a stand-in that reports
    /// `ConfigurationMissing` on each request.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_app_config()
            .map_err(|e| InitializationError::Config(e.into()))?;
        Self::from_config(paths, config, settings).await
    }

    pub async fn from_config(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: AppConfig,
    ) -> Result<Arc<Self>, InitializationError> {
        let llm = LlmService::from_settings(&settings.llm);

        let embedder: Arc<dyn EmbeddingGateway> = match build_embedder(&settings.embedding) {
            Ok(embedder) => embedder,
            Err(ApiError::ConfigurationMissing(setting)) => {
                tracing::warn!(setting = %setting, "Embedding gateway not configured; retrieval will be degraded");
                Arc::new(UnconfiguredEmbedder::new(setting))
            }
            Err(err) => return Err(InitializationError::Embedding(err.into())),
        };

        let index_path = paths.resolve(&settings.rag.index_path);
        let rag_store: Arc<dyn RagStore> = Arc::new(
            SqliteRagStore::with_path(index_path.clone())
                .await
                .map_err(|e| InitializationError::Rag(e.into()))?,
        );

        let chunker = Chunker::new(settings.rag.chunk_size, settings.rag.chunk_overlap)
            .map_err(|e| InitializationError::Rag(e.into()))?;
        let ingestion = Arc::new(
            IngestionPipeline::new(chunker, embedder.clone(), rag_store.clone())
                .with_lock_file(index_path.with_extension("lock")),
        );

        let retriever = Arc::new(Retriever::new(embedder.clone(), rag_store.clone()));
        let composer = PromptComposer::new(PromptBudget::from_settings(&settings.llm));
        let assistant = Arc::new(Assistant::new(
            retriever,
            llm.clone(),
            composer,
            AssistantOptions {
                top_k: settings.rag.top_k,
                include_sources: settings.rag.include_sources,
                max_pdf_pages: settings.rag.max_pdf_pages,
            },
        ));
        let interview = Arc::new(InterviewEngine::new(llm.clone(), composer));

        let notifier: Result<Arc<dyn Notifier>, String> =
            match TwilioNotifier::new(&settings.notify) {
                Ok(notifier) => Ok(Arc::new(notifier)),
                Err(ApiError::ConfigurationMissing(setting)) => {
                    tracing::warn!(setting = %setting, "SMS notifier not configured; SOS is disabled");
                    Err(setting)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "SMS notifier unavailable; SOS is disabled");
                    Err(err.to_string())
                }
            };

        tracing::info!(
            index = %index_path.display(),
            llm_configured = llm.is_configured(),
            embedding_model = embedder.model(),
            "Application state initialized"
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            settings: Arc::new(settings),
            llm,
            embedder,
            rag_store,
            ingestion,
            assistant,
            interview,
            notifier,
        }))
    }
}
