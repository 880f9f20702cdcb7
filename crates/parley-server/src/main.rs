use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let default_log_filter =
        "parley=info,parley_api=info,parley_ws=info,parley_core=info,parley_server=info,tower_http=info,axum=warn,hyper=warn";
    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter)),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;
    let bind_address = args.bind.unwrap_or(config.server.bind_address.clone());

    ensure_data_dirs(&config);

    let db = parley_db::create_pool(&config.database.url, config.database.max_connections)
        .await
        .context("database pool")?;
    parley_db::run_migrations(&db).await.context("migrations")?;

    let app_config = parley_core::AppConfig {
        jwt_secret: config.auth.jwt_secret.clone(),
        jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
        clip_dir: config.media.clip_dir.clone(),
        plan_deadline_secs: config.interview.plan_deadline_secs,
        question_limit: config.interview.question_limit,
        coding_problem_limit: config.interview.coding_problem_limit,
        silence_auto_advance: config.interview.silence_auto_advance,
        silence_timeout_secs: config.interview.silence_timeout_secs,
    };

    let llm = parley_core::llm::LlmClient::new(parley_core::llm::LlmConfig {
        base_url: config.llm.base_url.clone(),
        api_key: config.llm.api_key.clone(),
        model: config.llm.model.clone(),
        request_timeout: Duration::from_secs(config.llm.request_timeout_secs),
    });
    if config.llm.base_url.is_empty() {
        tracing::warn!("llm.base_url not set; planners and scoring run on fallbacks");
    }

    let asr = parley_asr::realtime::RealtimeAsrConfig {
        endpoint: config.asr.endpoint.clone(),
        app_id: config.asr.app_id.clone(),
        api_key: config.asr.api_key.clone(),
        connect_attempts: config.asr.connect_attempts,
        retry_delay: Duration::from_secs(config.asr.retry_delay_secs),
    };
    if config.asr.endpoint.is_empty() {
        tracing::warn!("asr.endpoint not set; interviews run without live captions");
    }

    let offline_asr = if config.offline_asr.enabled {
        Some(parley_asr::offline::OfflineAsrConfig {
            endpoint: config.offline_asr.endpoint.clone(),
            app_id: config.offline_asr.app_id.clone(),
            secret_key: config.offline_asr.secret_key.clone(),
            ..Default::default()
        })
    } else {
        None
    };

    let proctor = Arc::new(parley_media::proctor::Proctor::new(
        config.proctor.model_path.clone().map(PathBuf::from),
        config.proctor.confidence_threshold,
    ));
    let muxer = Arc::new(parley_media::clip::ClipMuxer::new(&config.media.clip_dir));

    let registry = parley_core::registry::SessionRegistry::new();
    let (scoring, scoring_rx) = parley_core::jobs::ScoringQueue::new();
    parley_core::jobs::spawn_workers(
        config.interview.scorer_workers,
        scoring_rx,
        db.clone(),
        llm.clone(),
        offline_asr.clone(),
        registry.clone(),
    );

    let state = parley_core::AppState {
        db,
        config: app_config,
        registry,
        streams: parley_core::streams::StreamHub::new(),
        llm,
        proctor,
        muxer,
        scoring,
        asr,
        offline_asr,
    };

    let app = parley_api::build_router()
        .merge(parley_ws::gateway_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    tracing::info!(%bind_address, "parley server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server")?;
    Ok(())
}

fn ensure_data_dirs(config: &config::Config) {
    for dir in [config.media.clip_dir.as_str(), "./data"] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(dir, error = %e, "failed to create data directory");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
