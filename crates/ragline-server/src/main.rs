//! `ragline` binary: HTTP server plus one-shot query and config commands.
#![allow(clippy::print_stdout, reason = "Command output goes to stdout")]

use anyhow::{Context as _, Result};
use clap::Parser as _;
use ragline_core::RagConfig;
use ragline_pipeline::{Pipeline, QueryRequest};
use ragline_server::{AppState, build_router, init_tracing};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let mut config = load_config(&cli)?;

    match cli.command {
        None => serve(config).await,
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Some(Commands::Query { query, max_chunks }) => handle_query(config, query, max_chunks).await,
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&redacted(config))?);
            Ok(())
        }
    }
}

fn redacted(mut config: RagConfig) -> RagConfig {
    for secret in [
        &mut config.providers.gemini_api_key,
        &mut config.providers.openai_api_key,
        &mut config.store.supabase_key,
    ] {
        if secret.is_some() {
            *secret = Some("<redacted>".to_owned());
        }
    }
    config
}

fn load_config(cli: &Cli) -> Result<RagConfig> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RagConfig::load_or_create().context("loading default config")?,
    };
    config.apply_env_overrides()?;
    Ok(config)
}

async fn serve(config: RagConfig) -> Result<()> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let cors_origins = config.server.cors_origins.clone();

    let state = match Pipeline::from_config(config) {
        Ok(pipeline) => {
            info!(
                embedding = %pipeline.info().embedding_provider,
                vectors = %pipeline.info().vector_backend,
                "pipeline initialized"
            );
            AppState::new(pipeline)
        }
        Err(err) => {
            error!("pipeline failed to initialize: {err}");
            warn!("serving health checks only");
            AppState::uninitialized()
        }
    };

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("listening on {address}");

    axum::serve(listener, build_router(state, &cors_origins))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
    }
}

async fn handle_query(config: RagConfig, query: String, max_chunks: Option<usize>) -> Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let response = pipeline
        .answer(QueryRequest {
            max_chunks,
            ..QueryRequest::new(query)
        })
        .await?;

    println!("{}", response.answer);
    println!();
    for (position, ranked) in response.chunks.iter().enumerate() {
        println!(
            "[{}] {} ({:.3})",
            position + 1,
            ranked.chunk.metadata.document_name,
            ranked.combined_score
        );
    }
    if let Some(session_id) = response.session_id {
        println!("session: {session_id}");
    }
    println!("took {} ms", response.processing_time_ms);
    Ok(())
}
