//! record-reformer - re-tag and reshape structured events
//!
//! This binary reads NDJSON events, rewrites their tag and record from the
//! configured templates and writes the reformed events to stdout.

use std::io::BufWriter;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;

use record_reformer::cli::{Cli, LogFormat, OutputFormat};
use record_reformer::config::Config;
use record_reformer::io::{run_stream, NdjsonSink};
use record_reformer::transformer::{ExpandMode, FieldMap, ReformEngine, RemoveKeys, Template};

/// Summary printed by --dry-run
#[derive(Debug, Serialize)]
struct DryRunReport<'a> {
    output_tag: &'a Template,
    mode: ExpandMode,
    renew_record: bool,
    remove_keys: Option<&'a RemoveKeys>,
    hostname: &'a str,
    fields: &'a FieldMap,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let started = Instant::now();

    record_reformer::init_logging(
        &cli.log_level.to_string(),
        cli.log_format == LogFormat::Json,
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting record-reformer"
    );

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if cli.hostname.is_some() {
        config.hostname = cli.hostname.clone();
    }
    let hostname = config.hostname.clone().unwrap_or_else(system_hostname);

    if cli.validate {
        let engine = ReformEngine::prepare(&config, hostname)?;
        print_validation(&engine, cli.output_format)?;
        return Ok(());
    }

    let engine = ReformEngine::from_config(&config, hostname.clone())?;

    if cli.dry_run {
        let report = DryRunReport {
            output_tag: engine.output_tag(),
            mode: engine.mode(),
            renew_record: engine.assembler().renew(),
            remove_keys: engine.assembler().remove_keys(),
            hostname: &hostname,
            fields: engine.assembler().field_map(),
        };
        print_dry_run(&report, cli.output_format)?;
        return Ok(());
    }

    info!(
        mode = %engine.mode(),
        fields = engine.assembler().field_map().len(),
        startup_ms = started.elapsed().as_millis() as u64,
        "Pipeline ready"
    );

    let reader: Box<dyn AsyncBufRead + Unpin> = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let stdout = std::io::stdout();
    let mut sink = NdjsonSink::new(BufWriter::new(stdout.lock()));

    run_stream(&engine, reader, &mut sink, shutdown_signal()).await?;
    sink.finish().context("Failed to write output")?;

    let snapshot = engine.metrics().snapshot();
    info!(
        received = snapshot.events_received,
        emitted = snapshot.events_emitted,
        dropped = snapshot.events_dropped,
        "Input exhausted"
    );
    if cli.stats {
        eprintln!("{}", snapshot);
    }

    Ok(())
}

/// System hostname, resolved once at startup
fn system_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

fn print_validation(engine: &ReformEngine, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Configuration is valid");
            println!("  mode: {}", engine.mode());
            println!("  output_tag: {}", engine.output_tag());
            println!("  fields: {}", engine.assembler().field_map().len());
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "valid": true,
                "mode": engine.mode(),
                "fields": engine.assembler().field_map().len(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Yaml => {
            println!("valid: true");
            println!("mode: {}", engine.mode());
            println!("fields: {}", engine.assembler().field_map().len());
        }
    }
    Ok(())
}

fn print_dry_run(report: &DryRunReport<'_>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("output_tag: {}", report.output_tag);
            println!("mode: {}", report.mode);
            println!("renew_record: {}", report.renew_record);
            match report.remove_keys {
                Some(keys) => println!("remove_keys: {}", keys.keys().join(",")),
                None => println!("remove_keys: (none)"),
            }
            println!("hostname: {}", report.hostname);
            println!("fields:");
            for (key, template) in report.fields.iter() {
                println!("  {} = {}", key, template);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(report)?),
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
}
