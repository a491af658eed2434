//! Roundtable server entry point.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::sync::watch;

use roundtable::adapters::ai::{MockLlmProvider, OpenAIConfig, OpenAIProvider};
use roundtable::adapters::http::{api_router, FlowAppState};
use roundtable::adapters::memory::InMemorySessionRepository;
use roundtable::adapters::postgres::{self, PostgresSessionRepository};
use roundtable::adapters::recorder::{FileInteractionRecorder, FileRecorderConfig};
use roundtable::adapters::retrieval::HttpKnowledgeRetriever;
use roundtable::adapters::yaml::{YamlRoleRepository, YamlTemplateRepository};
use roundtable::application::{FlowEngine, FlowEngineConfig, LlmInvoker, RetryPolicy};
use roundtable::config::{
    AppConfig, LlmConfig, LlmProviderKind, RecorderConfig, ValidationError,
};
use roundtable::logging;
use roundtable::ports::{
    GenerationOptions, InteractionRecorder, LlmProvider, SessionRepository,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    config.validate()?;
    logging::init(&config.server.log_level, config.server.json_logs);

    tracing::info!(
        environment = ?config.server.environment,
        provider = ?config.llm.provider,
        "starting roundtable"
    );

    let sessions: Arc<dyn SessionRepository> = match &config.database {
        Some(database) => {
            let pool = postgres::connect(database).await?;
            Arc::new(PostgresSessionRepository::new(pool))
        }
        None => {
            tracing::warn!("no database configured, sessions are held in memory");
            Arc::new(InMemorySessionRepository::new())
        }
    };

    let templates = YamlTemplateRepository::load(&config.flow.templates_dir).await?;
    let roles = YamlRoleRepository::load(&config.flow.roles_file).await?;

    let recorder = FileInteractionRecorder::new(recorder_config(&config.recorder));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let recorder_task = recorder.spawn(shutdown_rx);

    match recorder.orphaned_records().await {
        Ok(orphans) if !orphans.is_empty() => {
            tracing::warn!(count = orphans.len(), "interactions without a finalized outcome");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not scan interaction archive"),
    }

    let invoker = LlmInvoker::new(build_provider(&config.llm)?, retry_policy(&config.llm))
        .with_options(generation_options(&config.llm));

    let mut engine = FlowEngine::new(
        sessions,
        Arc::new(templates),
        Arc::new(roles),
        invoker,
        Arc::new(recorder),
    )
    .with_config(FlowEngineConfig {
        retrieval_timeout: config.flow.retrieval_timeout(),
    });

    if let Some(base_url) = &config.retrieval.base_url {
        let retriever = HttpKnowledgeRetriever::new(
            base_url.clone(),
            config.retrieval.api_key.clone(),
            config.flow.retrieval_timeout(),
        )?;
        engine = engine.with_retriever(Arc::new(retriever));
    }

    let app = api_router(FlowAppState::new(engine), config.server.request_timeout());
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("draining interaction recorder");
    let _ = shutdown_tx.send(true);
    if let Err(e) = recorder_task.await {
        tracing::error!(error = %e, "recorder task ended abnormally");
    }

    Ok(())
}

fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, BoxError> {
    match config.provider {
        LlmProviderKind::OpenAI => {
            let api_key = config
                .api_key
                .as_ref()
                .ok_or(ValidationError::MissingRequired("LLM__API_KEY"))?;
            let provider = OpenAIProvider::new(
                OpenAIConfig::new(api_key.expose_secret().clone())
                    .with_model(config.model.clone())
                    .with_base_url(config.base_url.clone())
                    .with_timeout(config.timeout()),
            )?;
            Ok(Arc::new(provider))
        }
        LlmProviderKind::Mock => {
            tracing::warn!("using the mock LLM provider");
            Ok(Arc::new(MockLlmProvider::new()))
        }
    }
}

fn retry_policy(config: &LlmConfig) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(config.max_attempts)
        .with_backoff(config.base_backoff(), config.max_backoff())
        .with_attempt_timeout(config.timeout())
}

fn generation_options(config: &LlmConfig) -> GenerationOptions {
    let mut options = GenerationOptions::new();
    if let Some(temperature) = config.temperature {
        options = options.with_temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }
    options
}

fn recorder_config(config: &RecorderConfig) -> FileRecorderConfig {
    FileRecorderConfig {
        dir: config.dir.clone(),
        flush_interval: config.flush_interval(),
        buffer_threshold: config.buffer_threshold,
        rotate_bytes: config.rotate_bytes,
        success_retention_days: config.success_retention_days,
        failure_retention_days: config.failure_retention_days,
        sweep_interval: config.sweep_interval(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
