//! SignBot - Signatory Pull Request Bot
//!
//! Watches the signup database for new signatories, verifies each one's
//! social profile, filters out likely spam and opens a pull request adding
//! their signature document to the pledge site's repository.
//!
//! The process runs until the change stream ends or a shutdown signal
//! arrives; in-flight signups are cancelled and left in the database for
//! the next run to pick up.

mod config;
mod error;
mod events;
mod github;
mod models;
mod pipeline;
mod state;
mod twitter;

#[cfg(test)]
mod testing;

use crate::config::Settings;
use crate::events::FirebaseEventSource;
use crate::pipeline::ReconciliationLoop;
use crate::state::AppContext;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting SignBot...");

    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");
    info!(
        "🎯 Publishing to {}/{} (base {}) via fork {}",
        settings.github.upstream_owner,
        settings.github.upstream_repo,
        settings.github.base_branch,
        settings.github.fork_owner
    );

    let http = reqwest::Client::builder()
        .user_agent(concat!("signbot/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let context = Arc::new(AppContext::from_settings(&settings, http.clone()));

    let mut source = FirebaseEventSource::connect(&http, &settings.firebase).await?;
    info!("👂 Listening for signups at {}", settings.firebase.db_url);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    let result = ReconciliationLoop::new(context).run(&mut source, cancel).await;
    info!("Notifications have stopped");

    match result {
        Ok(summary) => {
            info!("👋 Shutdown complete after {} published signups", summary.published);
            Ok(())
        }
        Err(e) => {
            error!("❌ Change stream failed: {}", e);
            Err(e.into())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,signbot=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, cancelling in-flight signups...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, cancelling in-flight signups...");
        },
    }
}
