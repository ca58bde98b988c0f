// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Composition root. Parses and validates the CLI, loads configuration,
//! wires the component graph (§9 Design Notes), and dispatches to one of
//! the three subcommands: `serve` runs the HTTP server, `migrate` applies
//! pending schema migrations, `janitor` runs a single reclamation sweep.

use audio_drm::application::services::AuthorizationService;
use audio_drm::application::use_cases::{ChapterMaterializer, Janitor, StreamServer, UploadIngest};
use audio_drm::infrastructure::adapters::{AesGcmEnvelopeCrypto, ChunkStore, FfmpegTranscoder, HmacSignedUrlCodec, JwtAuthenticator, Transcoder};
use audio_drm::infrastructure::config::AppConfig;
use audio_drm::infrastructure::metrics::MetricsService;
use audio_drm::infrastructure::repositories::schema::initialize_database;
use audio_drm::infrastructure::repositories::SqliteRepository;
use audio_drm::infrastructure::runtime::SysinfoMemoryGovernor;
use audio_drm::presentation::{routes, security_headers, AppState};
use audio_drm_bootstrap::signals::SystemSignals;
use audio_drm_bootstrap::{bootstrap_cli, map_error_to_exit_code, ExitCode, ValidatedCommand};
use audio_drm_domain::ports::{MemoryGovernor, Repository, SignedUrlCodec};
use audio_drm_domain::value_objects::EncryptionKey;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

fn main() -> std::process::ExitCode {
    let validated_cli = match bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return std::process::ExitCode::from(ExitCode::UsageError.as_i32() as u8);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start the async runtime: {e}");
            return std::process::ExitCode::from(ExitCode::OsError.as_i32() as u8);
        }
    };

    match runtime.block_on(run(validated_cli)) {
        Ok(()) => std::process::ExitCode::from(ExitCode::Success.as_i32() as u8),
        Err(e) => {
            let code = map_error_to_exit_code(e.root_cause());
            tracing::error!(error = %e, exit_code = code.as_i32(), "exiting with error");
            std::process::ExitCode::from(code.as_i32() as u8)
        }
    }
}

/// Derives the process-wide session-token `EncryptionKey` from the
/// configured `session-secret`. SHA-256 of the secret's UTF-8 bytes gives
/// a fixed 32-byte key regardless of the operator's chosen secret length,
/// the same way the signed-URL and JWT secrets are taken as raw bytes of
/// whatever length the operator supplies.
fn derive_session_key(session_secret: &str) -> EncryptionKey {
    let digest = Sha256::digest(session_secret.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    EncryptionKey::from_bytes(bytes)
}

async fn run(cli: audio_drm_bootstrap::ValidatedCli) -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::load(cli.config.as_deref())?);

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    audio_drm::infrastructure::logging::init_tracing(level);

    match cli.command {
        ValidatedCommand::Migrate => run_migrate(&config).await,
        ValidatedCommand::Janitor => run_janitor(&config).await,
        ValidatedCommand::Serve { bind_addr, max_concurrent_chapters } => run_serve(config, bind_addr, max_concurrent_chapters).await,
    }
}

async fn run_migrate(config: &AppConfig) -> anyhow::Result<()> {
    tracing::info!(database_url = %config.database_url, "applying pending migrations");
    initialize_database(&config.database_url).await?;
    tracing::info!("migrations applied");
    Ok(())
}

async fn run_janitor(config: &Arc<AppConfig>) -> anyhow::Result<()> {
    Janitor::verify_roots_disjoint(config)?;
    let pool = initialize_database(&config.database_url).await?;
    let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::new(pool));
    let chunk_store = Arc::new(ChunkStore::new(config.chunks_root.clone()));

    let janitor = Janitor::new(repository, chunk_store, config.clone());
    let report = janitor.run_once().await;
    tracing::info!(
        sessions_reaped = report.sessions_reaped,
        temp_files_reaped = report.temp_files_reaped,
        orphaned_chapters_reaped = report.orphaned_chapters_reaped,
        bytes_reclaimed = report.bytes_reclaimed,
        "janitor sweep complete"
    );
    Ok(())
}

async fn run_serve(config: Arc<AppConfig>, bind_addr: String, max_concurrent_chapters: Option<usize>) -> anyhow::Result<()> {
    let mut config = (*config).clone();
    if let Some(max) = max_concurrent_chapters {
        config.max_concurrent_chapters = max;
    }
    let config = Arc::new(config);

    Janitor::verify_roots_disjoint(&config)?;

    let pool = initialize_database(&config.database_url).await?;
    let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::new(pool));
    let chunk_store = Arc::new(ChunkStore::new(config.chunks_root.clone()));

    let session_key = derive_session_key(&config.session_secret);
    let crypto = Arc::new(AesGcmEnvelopeCrypto::new(session_key));
    let signed_url_codec: Arc<dyn SignedUrlCodec> = Arc::new(HmacSignedUrlCodec::new(config.signed_url_secret.clone().into_bytes()));
    let jwt = JwtAuthenticator::new(config.auth_jwt_secret.clone().into_bytes());
    let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new("ffmpeg", config.ffmpeg_timeout));
    let governor: Arc<dyn MemoryGovernor> = Arc::new(SysinfoMemoryGovernor::spawn(config.memory_bands));

    let upload_ingest = Arc::new(UploadIngest::new(
        repository.clone(),
        chunk_store.clone(),
        crypto.clone() as Arc<dyn audio_drm_domain::ports::EnvelopeCryptoService>,
        transcoder.clone(),
        config.clone(),
    ));
    let chapter_materializer = Arc::new(ChapterMaterializer::new(
        repository.clone(),
        crypto.clone() as Arc<dyn audio_drm_domain::ports::EnvelopeCryptoService>,
        transcoder.clone(),
        governor.clone(),
        config.clone(),
    ));
    let stream_server = Arc::new(StreamServer::new(repository.clone(), crypto.clone(), signed_url_codec.clone(), transcoder.clone(), config.clone()));
    let authorization = AuthorizationService::new(repository.clone());
    let metrics = Arc::new(MetricsService::new()?);

    let state = Arc::new(AppState {
        repository: repository.clone(),
        upload_ingest,
        chapter_materializer,
        stream_server,
        crypto,
        signed_url_codec,
        authorization,
        jwt,
        config: config.clone(),
        metrics: metrics.clone(),
    });

    let shutdown = Arc::new(audio_drm_bootstrap::shutdown::ShutdownCoordinator::new(std::time::Duration::from_secs(
        audio_drm_bootstrap::shutdown::DEFAULT_GRACE_PERIOD_SECS,
    )));

    spawn_janitor_task(repository, chunk_store, config.clone(), metrics.clone(), shutdown.token());
    spawn_memory_band_sampler(governor.clone(), metrics.clone(), shutdown.token());

    let metrics_router = axum::Router::new().route("/metrics", axum::routing::get(serve_metrics)).with_state(metrics);
    let app = routes::router(state).merge(metrics_router).layer(axum::middleware::from_fn(security_headers::apply));

    let addr: SocketAddr = bind_addr.parse().map_err(|e| anyhow::anyhow!("invalid bind address {bind_addr}: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let signals = audio_drm_bootstrap::signals::create_signal_handler();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        signals
            .wait_for_signal(Box::new(move || {
                shutdown_for_signal.initiate_shutdown();
            }))
            .await;
    });

    let shutdown_for_serve = shutdown.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_for_serve.wait_for_shutdown().await;
        })
        .await?;

    shutdown.complete_shutdown();
    Ok(())
}

async fn serve_metrics(axum::extract::State(metrics): axum::extract::State<Arc<MetricsService>>) -> Result<String, axum::http::StatusCode> {
    metrics.render().map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)
}

/// Mirrors the governor's own `MemoryBand` onto the `audio_drm_memory_band`
/// gauge (SPEC_FULL §11) so it shows up next to the other series on
/// `/metrics` without the Stream Server or Chapter Materializer needing to
/// know metrics exist.
fn spawn_memory_band_sampler(governor: Arc<dyn MemoryGovernor>, metrics: Arc<MetricsService>, token: audio_drm_bootstrap::shutdown::CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {
                    metrics.set_memory_band(governor.band());
                }
                _ = token.cancelled() => break,
            }
        }
    });
}

/// Runs the Janitor (§4.7) on `config.janitor-interval`, stopping as soon
/// as shutdown is signalled rather than mid-sweep.
fn spawn_janitor_task(
    repository: Arc<dyn Repository>,
    chunk_store: Arc<ChunkStore>,
    config: Arc<AppConfig>,
    metrics: Arc<MetricsService>,
    token: audio_drm_bootstrap::shutdown::CancellationToken,
) {
    tokio::spawn(async move {
        let janitor = Janitor::new(repository, chunk_store, config.clone());
        loop {
            tokio::select! {
                _ = tokio::time::sleep(config.janitor_interval) => {
                    let report = janitor.run_once().await;
                    metrics.record_janitor_sweep(report.bytes_reclaimed, report.sessions_reaped);
                    tracing::info!(
                        sessions_reaped = report.sessions_reaped,
                        temp_files_reaped = report.temp_files_reaped,
                        orphaned_chapters_reaped = report.orphaned_chapters_reaped,
                        bytes_reclaimed = report.bytes_reclaimed,
                        "janitor sweep complete"
                    );
                }
                _ = token.cancelled() => {
                    tracing::info!("janitor task stopping on shutdown");
                    break;
                }
            }
        }
    });
}
