//! pincache CLI and HTTP gateway entry point.
//!
//! Binary name: `pcache`
//!
//! Parses CLI arguments, loads configuration and builds one chunk cache per
//! dataset, then dispatches to the appropriate command handler or starts
//! the HTTP gateway.

mod cli;
mod http;
mod state;

use std::sync::Arc;

use clap::Parser;
use clap_complete::generate;

use pincache_core::fetch::source::ChunkSource;
use pincache_core::registry::CacheRegistry;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,pincache=debug",
        _ => "trace",
    };
    pincache_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    pincache_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "pcache", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    match cli.command {
        Commands::Datasets => {
            cli::dataset::list_datasets(&state, cli.json)?;
        }

        Commands::Count { dataset } => {
            cli::dataset::show_count(&state, &dataset, cli.json).await?;
        }

        Commands::Chunk { dataset, index } => {
            cli::dataset::show_chunk(&state, &dataset, index, cli.json).await?;
        }

        Commands::Load {
            dataset,
            search,
            filters,
            sort,
            desc,
            page,
            page_size,
        } => {
            let args = cli::dataset::LoadArgs {
                search,
                filters,
                sort,
                desc,
                page,
                page_size,
            };
            cli::dataset::load_dataset(&state, &dataset, args, cli.json, cli.quiet).await?;
        }

        Commands::Export {
            dataset,
            format,
            output,
            columns,
            search,
        } => {
            cli::export::export_dataset(
                &state,
                &dataset,
                format,
                output.as_deref(),
                columns,
                search,
                cli.quiet,
            )
            .await?;
        }

        Commands::Serve { port, host } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} pincache gateway listening on {}",
                    console::style("*").cyan().bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!(
                    "  {} dataset(s): {}",
                    state.registry.names().len(),
                    state.registry.names().join(", ")
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let purge = spawn_purge_task(state.registry.clone(), state.config.chunk_ttl());
            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            purge.abort();
            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Periodically drop expired cache entries so idle datasets release memory.
fn spawn_purge_task<S: ChunkSource>(
    registry: Arc<CacheRegistry<S>>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(std::time::Duration::from_secs(1)));
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let dropped = registry.purge_expired();
            if dropped > 0 {
                tracing::debug!(dropped, "purged expired cache entries");
            }
        }
    })
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
