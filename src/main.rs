use std::sync::Arc;

use applicant_sync::channels::{SlackChannel, slack_routes};
use applicant_sync::config::{AppConfig, SheetsBackend};
use applicant_sync::extract::{ContextEnricher, ModelExtractor, PatternExtractor};
use applicant_sync::llm::create_provider;
use applicant_sync::pipeline::{ApplicationProcessor, ProcessorDeps, TriggerGate};
use applicant_sync::sheets::{GoogleSheetsStore, MemorySheetStore, SheetRouter, SheetStore};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("📋 Applicant Sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Triggers: {}", config.trigger_phrases.join(", "));
    eprintln!("   Webhook: http://0.0.0.0:{}/slack/events", config.port);

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;

    // ── Spreadsheet ─────────────────────────────────────────────────────
    let store: Arc<dyn SheetStore> = match &config.sheets {
        SheetsBackend::Google {
            service_account_json,
            spreadsheet_key,
        } => {
            eprintln!("   Sheets: google ({spreadsheet_key})");
            Arc::new(GoogleSheetsStore::new(service_account_json, spreadsheet_key)?)
        }
        SheetsBackend::Memory => {
            eprintln!("   Sheets: memory (rows are not persisted)");
            Arc::new(MemorySheetStore::new())
        }
    };

    // ── Pipeline ────────────────────────────────────────────────────────
    let processor = Arc::new(ApplicationProcessor::new(ProcessorDeps {
        gate: TriggerGate::new(config.trigger_phrases.clone(), config.dedup_capacity),
        patterns: PatternExtractor::new(),
        model: ModelExtractor::new(llm, config.extraction_retry_delay),
        enricher: ContextEnricher::new(&config.trigger_phrases, config.timezone_offset),
        router: SheetRouter::new(store),
        replies: Arc::new(SlackChannel::new(config.slack_bot_token.clone())),
    }));

    let app = slack_routes(processor).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
