//! Table Export - print a topic's compacted state
//!
//! Reads a topic from the beginning up to its highwater, prints the latest
//! value of every live key as `key=value` lines sorted by key, and optionally
//! keeps printing changes until Ctrl+C.
//!
//! # Running the Example
//!
//! ```bash
//! BOOTSTRAP_SERVERS=localhost:9092 cargo run -p table-export-demo -- alarm-registrations --follow
//! ```
//!
//! With `--metrics-addr 0.0.0.0:9000`, table metrics are served at
//! <http://localhost:9000/metrics>.

#![allow(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use eventsource_core::listener::{CacheSnapshot, EventSourceListener, ListenerResult};
use eventsource_core::{Message, TableConfig};
use eventsource_redpanda::{RedpandaTableConsumer, Utf8Deserializer};
use eventsource_runtime::{EventSourceTable, describe_metrics, export_records};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "table-export")]
#[command(about = "Export the compacted state of a topic")]
struct Cli {
    /// Topic to read
    topic: String,

    /// Broker addresses (default: $BOOTSTRAP_SERVERS or localhost:9092)
    #[arg(short, long)]
    brokers: Option<String>,

    /// Seconds to wait for the highwater
    #[arg(long, default_value = "30")]
    highwater_timeout: String,

    /// Only export keys containing this text
    #[arg(short, long)]
    filter_key: Option<String>,

    /// Keep printing changes after the export, until Ctrl+C
    #[arg(long)]
    follow: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Extra client property, `key=value` (repeatable)
    #[arg(short = 'X', long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

/// Prints changes delivered after the highwater.
struct FollowPrinter;

impl EventSourceListener<String, String> for FollowPrinter {
    fn on_highwater(&mut self, _cache: CacheSnapshot<String, String>) -> ListenerResult {
        Ok(())
    }

    fn on_batch(&mut self, messages: &[Message<String, String>], highwater_reached: bool) -> ListenerResult {
        if highwater_reached {
            for message in messages {
                match message.value() {
                    Some(value) => println!("{}={value}", message.key()),
                    None => println!("{} (deleted)", message.key()),
                }
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,eventsource_runtime=info,rdkafka=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        describe_metrics();
        tracing::info!(%addr, "Prometheus metrics available");
    }

    let mut properties = vec![
        ("topic".to_string(), cli.topic.clone()),
        ("highwater.timeout".to_string(), cli.highwater_timeout.clone()),
    ];
    if let Some(brokers) = &cli.brokers {
        properties.push(("bootstrap.servers".to_string(), brokers.clone()));
    }
    properties.extend(cli.properties.iter().cloned());
    let config = TableConfig::from_properties(properties)?;

    let consumer = RedpandaTableConsumer::from_config(&config, Utf8Deserializer, Utf8Deserializer)?;
    let mut table = EventSourceTable::new(config, consumer)?;
    table.track_cache()?;
    if cli.follow {
        table.add_listener(FollowPrinter)?;
    }
    table.start()?;

    tokio::select! {
        result = table.wait_for_highwater() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted before highwater");
            table.stop();
            return Ok(());
        }
    }

    let cache = table.await_highwater_cache()?;
    let filter = cli.filter_key.as_deref().unwrap_or_default();
    for record in export_records(&cache, |key, _| key.contains(filter)) {
        if let Some(value) = record.value() {
            println!("{}={value}", record.key());
        }
    }
    tracing::info!(keys = cache.len(), "Export complete");

    if cli.follow {
        tracing::info!("Following changes, press Ctrl+C to exit");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown signal received, stopping...");
    }

    table.stop();
    tokio::task::spawn_blocking(move || table.join()).await??;
    Ok(())
}
