//! # polystored: polystore daemon
//!
//! Composition root that opens every configured persistence stack and keeps
//! them alive until the process is told to stop.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Install the tracing subscriber
//! - Build the stack registry; any stack failing to open aborts startup
//! - Construct application services over the routed repositories and report
//!   what each stack holds
//! - Handle graceful shutdown (SIGTERM/SIGINT), closing every stack
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use anyhow::Context;
use polystore_adapter_storage_sqlx::{Registry, RegistryBuilder};
use polystore_app::services::book_service::BookService;
use polystore_app::services::user_service::UserService;
use polystore_domain::accounts::UserRepository;
use polystore_domain::error::PolystoreError;
use polystore_domain::library::BookRepository;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_new(&config.logging.filter)
        .with_context(|| format!("invalid log filter {:?}", config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let registry = RegistryBuilder::new()
        .stacks_from_config(&config.datasource)
        .context("invalid stack configuration")?
        .build()
        .await
        .context("failed to open persistence stacks")?;

    if let Err(err) = report(&registry).await {
        registry.shutdown().await;
        return Err(err).context("failed to read stack contents");
    }

    tracing::info!("polystored running, waiting for shutdown signal");
    shutdown_signal().await;

    registry.shutdown().await;
    Ok(())
}

/// Log every stack, then what the routed repositories hold.
async fn report(registry: &Registry) -> Result<(), PolystoreError> {
    for stack in registry.stacks() {
        tracing::info!(
            stack = %stack.name(),
            primary = stack.is_primary(),
            datasource = %stack.datasource().name(),
            driver = %stack.datasource().driver(),
            unit = %stack.unit().name(),
            coordinator = %stack.coordinator().name(),
            "stack ready"
        );
    }

    if let Ok(repo) = registry.repository::<BookRepository>() {
        let books = BookService::new(repo);
        tracing::info!(count = books.count_books().await?, "books");
        for book in books.list_books().await? {
            tracing::debug!(%book, "book");
        }
    }

    if let Ok(repo) = registry.repository::<UserRepository>() {
        let users = UserService::new(repo);
        tracing::info!(count = users.count_users().await?, "users");
        for user in users.list_users().await? {
            tracing::debug!(%user, "user");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
