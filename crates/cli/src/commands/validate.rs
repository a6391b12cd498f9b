//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{AppConfig, ProviderType, TopicFilter};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    nomad_addr: String,
    namespace: String,
    topics: Vec<String>,
    events_count: usize,
    provider_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(summarize(&config)),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn summarize(config: &AppConfig) -> ConfigSummary {
    // Already validated by the loader
    let topics = TopicFilter::parse(&config.stream.topics)
        .map(|filter| filter.entries().iter().map(ToString::to_string).collect())
        .unwrap_or_default();

    ConfigSummary {
        nomad_addr: config.stream.nomad_addr.clone(),
        namespace: config.stream.namespace.clone(),
        topics,
        events_count: config.sinks.batch.events_count,
        provider_count: config.sinks.providers.len(),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sinks.providers.is_empty() {
        warnings.push("No providers configured - events will be dropped".to_string());
    }

    if config.stream.topics.is_empty() {
        warnings.push("stream.topics is empty - all topics will be delivered".to_string());
    }

    if config.stream.max_reconnect_attempts == 0 {
        warnings.push("stream.max_reconnect_attempts is 0 - reconnects are unlimited".to_string());
    }

    if config.sinks.batch.push_timeout < config.sinks.batch.idle_timeout {
        warnings.push(
            "sinks.batch.push_timeout is shorter than idle_timeout - slow providers will time out often"
                .to_string(),
        );
    }

    for provider in &config.sinks.providers {
        if provider.provider_type == ProviderType::Http
            && provider.params.contains_key("username")
            && !provider.params.contains_key("password")
        {
            warnings.push(format!(
                "Provider '{}' has a username but no password",
                provider.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Nomad: {}", summary.nomad_addr);
            println!("  Namespace: {}", summary.namespace);
            if summary.topics.is_empty() {
                println!("  Topics: all");
            } else {
                println!("  Topics: {}", summary.topics.join(", "));
            }
            println!("  Events per batch: {}", summary.events_count);
            println!("  Providers: {}", summary.provider_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
