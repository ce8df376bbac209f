use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use sahayak_backend::core::config::AppPaths;
use sahayak_backend::core::logging;
use sahayak_backend::server;
use sahayak_backend::state::AppState;

const USAGE: &str = "usage: sahayak-backend [serve | ingest [corpus_dir]]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let mut args = env::args().skip(1);
    let command = args.next();
    let state = AppState::initialize(paths).await?;

    match command.as_deref() {
        None | Some("serve") => serve(state).await,
        Some("ingest") => ingest(&state, args.next().map(PathBuf::from)).await,
        Some(other) => anyhow::bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(state.settings.server.port);
    let bind_addr = format!("{}:{}", state.settings.server.host, port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn ingest(state: &AppState, corpus_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let corpus_dir =
        corpus_dir.unwrap_or_else(|| state.paths.resolve(&state.settings.rag.corpus_dir));
    let report = state
        .ingestion
        .ingest(&corpus_dir)
        .await
        .with_context(|| format!("Ingestion of {} failed", corpus_dir.display()))?;

    for failure in &report.failures {
        tracing::warn!(source = %failure.source, reason = %failure.reason, "Document skipped");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
