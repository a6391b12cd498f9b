//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::AppConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::Pipeline;

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    // Load and parse configuration
    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        nomad_addr = %config.stream.nomad_addr,
        namespace = %config.stream.namespace,
        topics = ?config.stream.topics,
        providers = config.sinks.providers.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let cancel = CancellationToken::new();
    let pipeline = Pipeline::new(config);

    info!("Starting pipeline...");

    // The pipeline keeps running after the signal until it has drained
    let run = pipeline.run(cancel.clone());
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        _ = setup_shutdown_signal() => {
            warn!("Received shutdown signal, draining pipeline...");
            cancel.cancel();
            run.await
        }
    };

    match result {
        Ok(stats) => {
            info!(
                events = stats.totals.events_delivered,
                commit_index = ?stats.totals.commit_index,
                duration_secs = stats.totals.duration.as_secs_f64(),
                "Pipeline completed successfully"
            );
            stats.print_summary();
        }
        Err(e) => {
            let component = e.component().to_string();
            return Err(e).with_context(|| format!("Pipeline execution failed in {component}"));
        }
    }

    info!("Nomad Events Sink finished");
    Ok(())
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &AppConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("App:");
    println!("  Data dir: {}", config.app.data_dir.display());
    println!(
        "  Commit index interval: {:?}",
        config.app.commit_index_interval
    );

    println!("\nStream:");
    println!("  Nomad: {}", config.stream.nomad_addr);
    println!("  Namespace: {}", config.stream.namespace);
    if config.stream.topics.is_empty() {
        println!("  Topics: all");
    } else {
        println!("  Topics: {}", config.stream.topics.join(", "));
    }
    println!("  Initial position: {:?}", config.stream.initial_position);
    println!("  Reconnect budget: {:?}", config.stream.reconnect_budget());

    let batch = &config.sinks.batch;
    println!("\nBatching:");
    println!("  Events per batch: {}", batch.events_count);
    println!("  Idle timeout: {:?}", batch.idle_timeout);
    println!("  Queue size: {}", batch.queue_size);
    println!("  Push timeout: {:?}", batch.push_timeout);

    println!("\nProviders ({}):", config.sinks.providers.len());
    for provider in &config.sinks.providers {
        println!("  - {} ({:?})", provider.name, provider.provider_type);
    }

    println!();
}
