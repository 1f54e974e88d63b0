//! capability-check: resolve every capability slot of a configuration
//! document and report the outcome.
//!
//! Exits non-zero if any slot fails, listing each failure with its kind.
//! With `--prompt`, one slot is also exercised end to end.
//!
//! # Environment Variables
//!
//! - `CAPABILITY_CONFIG` - document path when `--config` is not given
//! - `RUST_LOG` - tracing filter (default: "info,capability_resolver=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin capability-check -- --config capabilities.yaml
//! cargo run --bin capability-check -- --config capabilities.yaml --slot chat --prompt "ping"
//! ```
//!
//! Dotted `module` locations are resolved against an empty module table
//! here, so only built-ins and shared-library plugins (feature
//! `native-plugins`) can be bound by this tool.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use capability_resolver::{
    CapabilitiesDocument, CapabilityFactory, ChatCapability, ConfigurationBinder,
};

#[derive(Debug, Parser)]
#[command(name = "capability-check", version, about = "Resolve and report capability slots")]
struct Args {
    /// Capability document (YAML, or JSON by `.json` extension)
    #[arg(short, long, env = "CAPABILITY_CONFIG")]
    config: PathBuf,

    /// Slot to exercise with --prompt
    #[arg(long, default_value = "chat")]
    slot: String,

    /// Send this prompt to the selected slot after binding
    #[arg(long)]
    prompt: Option<String>,

    /// System message used with --prompt
    #[arg(long, default_value = "")]
    system: String,

    /// Print the slot report as JSON
    #[arg(long)]
    json: bool,
}

/// One line of the slot report.
#[derive(Debug, Serialize)]
struct SlotReport {
    slot: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_report(reports: &[SlotReport], json: bool) {
    if json {
        match serde_json::to_string_pretty(reports) {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::error!("Failed to encode report: {}", e),
        }
        return;
    }
    for report in reports {
        match (&report.kind, &report.error) {
            (Some(kind), Some(error)) => println!("  {} [{}]: {}", report.slot, kind, error),
            _ => println!("  {}: ok", report.slot),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,capability_resolver=debug".into()),
        )
        .init();

    let args = Args::parse();

    let document = match CapabilitiesDocument::from_path(&args.config) {
        Ok(document) => document,
        Err(e) => {
            tracing::error!("Failed to read {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        "Resolving {} capability slot(s) from {}",
        document.len(),
        args.config.display()
    );

    let binder = ConfigurationBinder::<dyn ChatCapability>::new(CapabilityFactory::default());
    let capabilities = match binder.bind_document(&document) {
        Ok(capabilities) => capabilities,
        Err(errors) => {
            tracing::error!("{}", errors);
            let failed: Vec<&str> = errors.failures.iter().map(|f| f.slot.as_str()).collect();
            let mut reports: Vec<SlotReport> = document
                .slots()
                .filter(|(slot, _)| !failed.contains(slot))
                .map(|(slot, _)| SlotReport {
                    slot: slot.to_string(),
                    ok: true,
                    kind: None,
                    error: None,
                })
                .collect();
            reports.extend(errors.failures.iter().map(|failure| SlotReport {
                slot: failure.slot.clone(),
                ok: false,
                kind: Some(failure.source.kind()),
                error: Some(failure.source.to_string()),
            }));
            print_report(&reports, args.json);
            return ExitCode::FAILURE;
        }
    };

    let reports: Vec<SlotReport> = capabilities
        .names()
        .into_iter()
        .map(|slot| SlotReport {
            slot: slot.to_string(),
            ok: true,
            kind: None,
            error: None,
        })
        .collect();
    print_report(&reports, args.json);
    tracing::info!("All {} slot(s) resolved", capabilities.len());

    let Some(prompt) = args.prompt else {
        return ExitCode::SUCCESS;
    };

    let Some(chat) = capabilities.get(&args.slot) else {
        tracing::error!(
            "Slot {} is not configured (configured: {})",
            args.slot,
            capabilities.names().join(", ")
        );
        return ExitCode::FAILURE;
    };

    match chat.generate_response(&prompt, &args.system).await {
        Ok(answer) => {
            println!("{answer}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Slot {} failed to respond: {:#}", args.slot, e);
            ExitCode::FAILURE
        }
    }
}
