//! Longform pipeline engine server: HTTP ingress plus the job dispatch
//! loop, wired from environment configuration.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pipeline_engine::config::{EngineConfig, LlmProvider};
use pipeline_engine::extract::ExtractorRegistry;
use pipeline_engine::generator::Generator;
use pipeline_engine::llm::{LlmClient, LocalLlmClient, RemoteLlmClient};
use pipeline_engine::orchestrator::Orchestrator;
use pipeline_engine::tokenizer::Tokenizer;
use pipeline_engine::transcribe::Transcriber;
use pipeline_engine::validator::Validator;
use pipeline_engine::{PersistenceStore, SqliteStore};
use pipeline_server::adapters::{FfmpegMediaProbe, WhisperHttpClient, YtDlpGateway};
use pipeline_server::reactor::Reactor;
use pipeline_server::state::AppState;
use pipeline_server::{build_app, rate_limit, serve};
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let engine_config = EngineConfig::from_env()?;
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:5173".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    tracing::info!(database_path = %engine_config.database_path, "opening persistence store");
    let store: Arc<dyn PersistenceStore> = Arc::new(SqliteStore::open(&engine_config.database_path).await?);

    let llm: Arc<dyn LlmClient> = match engine_config.llm_provider {
        LlmProvider::Remote => Arc::new(RemoteLlmClient::new(
            engine_config.remote_base_url.clone(),
            engine_config.remote_api_key.clone().unwrap_or_default(),
            engine_config.llm_timeout,
        )?),
        LlmProvider::LocalOllama => {
            Arc::new(LocalLlmClient::new(engine_config.local_base_url.clone(), engine_config.llm_timeout)?)
        }
    };

    let tokenizer = Arc::new(Tokenizer::cl100k()?);

    let video_gateway = Arc::new(YtDlpGateway::new(
        env::var("YTDLP_BINARY").unwrap_or_else(|_| "yt-dlp".to_string()),
    ));
    let extractors = Arc::new(ExtractorRegistry::new(
        reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?,
        video_gateway,
        engine_config.media_duration_cap_secs,
    ));

    let transcription_client = Arc::new(WhisperHttpClient::new(
        env::var("WHISPER_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        env::var("WHISPER_API_KEY").ok(),
        env::var("WHISPER_MODEL").unwrap_or_else(|_| "whisper-1".to_string()),
        engine_config.llm_timeout,
    )?);
    let media_probe = Arc::new(FfmpegMediaProbe::new(
        env::var("FFPROBE_BINARY").unwrap_or_else(|_| "ffprobe".to_string()),
        env::var("FFMPEG_BINARY").unwrap_or_else(|_| "ffmpeg".to_string()),
    ));
    let transcriber = Arc::new(Transcriber::new(
        transcription_client,
        media_probe,
        pipeline_engine::BMAX,
    ));

    let generator = Arc::new(Generator::new(
        llm.clone(),
        engine_config.model_tiers.map_model.clone(),
        engine_config.model_tiers.reduce_model.clone(),
    ));
    let validator = Arc::new(Validator::new(
        llm,
        tokenizer.clone(),
        engine_config.model_tiers.validation_model.clone(),
    ));

    let working_dir_root = PathBuf::from(&engine_config.working_dir_root);
    tokio::fs::create_dir_all(&working_dir_root).await?;

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        extractors,
        transcriber,
        tokenizer,
        generator,
        validator,
        working_dir_root.clone(),
        engine_config.chunk_cap,
    ));

    let dispatch_notify = Arc::new(Notify::new());

    let state = AppState {
        store: store.clone(),
        orchestrator: orchestrator.clone(),
        dispatch_notify: dispatch_notify.clone(),
        working_dir_root,
        upload_byte_cap: engine_config.upload_byte_cap,
        create_limiter: rate_limit::per_minute(30),
        upload_limiter: rate_limit::per_minute(10),
        regenerate_limiter: rate_limit::per_minute(5),
    };

    let reactor = Reactor::new(store, orchestrator, dispatch_notify);
    tokio::spawn(async move {
        reactor.run().await;
    });

    let app = build_app(state, &cors_origins);
    serve(app, &host, port).await
}
