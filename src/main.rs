use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backport_bot::backport::BackportEngine;
use backport_bot::config::BotConfig;
use backport_bot::git::workspace::clear_work_dir;
use backport_bot::github::GitHubApp;
use backport_bot::intake::Intake;
use backport_bot::queue::Dispatcher;
use backport_bot::server::{AppState, build_router, delivery_channel};
use backport_bot::webhooks::SignatureVerifier;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backport_bot=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BotConfig::from_env().context("invalid configuration")?;

    let app = GitHubApp::from_key_file(config.app_id, &config.private_key_path)
        .context("failed to set up GitHub App authentication")?;
    let info = app
        .app_info()
        .await
        .context("failed to fetch GitHub App details")?;
    let missing = info.missing_events();
    if !missing.is_empty() {
        bail!(
            "the GitHub App is not subscribed to {}; subscribe to `pull_request` and `issue_comment` events",
            missing.join(", ")
        );
    }
    tracing::info!(app = %info.name, "Authenticated as GitHub App");

    let git = config.git_config(&info.name);
    for dir in [git.root_dir.clone(), git.cache_dir(), git.work_dir()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let leftovers = clear_work_dir(&git).context("failed to clear the work directory")?;
    if leftovers > 0 {
        tracing::info!(count = leftovers, "Removed workspaces left by a previous run");
    }

    let shutdown = CancellationToken::new();
    let engine = BackportEngine::new(app.clone(), git, config.conflict_strategy);
    let dispatcher = Arc::new(Dispatcher::new_with_shutdown(
        Arc::new(engine),
        shutdown.child_token(),
    ));
    let intake = Arc::new(Intake::new(
        app,
        Arc::clone(&dispatcher),
        config.allowed_owners.clone(),
    ));

    let (deliveries, receiver) = delivery_channel();
    let intake_task = tokio::spawn(Arc::clone(&intake).run(receiver, shutdown.child_token()));

    let verifier = SignatureVerifier::new(config.webhook_secret);
    let router = build_router(AppState::new(verifier, deliveries));

    let addr = format!("{}:{}", config.serve_host, config.serve_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutting down");
    shutdown.cancel();
    dispatcher.shutdown_all().await;
    if let Err(e) = intake_task.await {
        tracing::error!(error = %e, "Intake task panicked");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
