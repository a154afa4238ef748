//! Command-line watcher for an Azuracast now-playing feed.
//!
//! Wires a resolver, a connection, and a coordinator together and prints
//! every unified metadata update until ctrl-c. Doubles as the reference for
//! how an application shell is expected to drive the client crates.

mod config;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use azura_client::connection::MetadataConnection;
use azura_client::coordinator::{MetadataCoordinator, UnifiedMetadata};
use azura_client::resolver::ConfigResolver;
use azura_proto::stations::StationDescriptor;

use config::WatchConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = WatchConfig::load()?;
    if config.station.server.is_empty() || config.station.short_code.is_empty() {
        anyhow::bail!(
            "no station configured; set [station] server and short_code in {:?}",
            WatchConfig::config_path()
        );
    }

    let resolver = Arc::new(ConfigResolver::new(
        &config.sources.url,
        config.sources.api_key.clone(),
    )?);
    let connection = Arc::new(MetadataConnection::new());
    let coordinator = MetadataCoordinator::new(Arc::clone(&connection), Arc::clone(&resolver));

    let mut updates = coordinator.subscribe();

    coordinator.connect_to_station(StationDescriptor {
        server_host: config.station.server.clone(),
        short_code: config.station.short_code.clone(),
        default_dj: config.station.default_dj.clone(),
        name: config.station.name.clone(),
        description: config.station.description.clone(),
    });

    info!(station = %config.station.short_code, "watching now-playing feed; ctrl-c to stop");

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(Some(metadata)) => print_now_playing(&metadata),
                Ok(None) => println!("(no station)"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "missed metadata updates");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    coordinator.disconnect_current_station();
    Ok(())
}

fn print_now_playing(metadata: &UnifiedMetadata) {
    let mut line = format!("{} - {}", metadata.artist, metadata.track);
    if let Some(album) = &metadata.album {
        line.push_str(&format!(" [{album}]"));
    }
    if let Some(dj) = &metadata.dj {
        let label = if metadata.is_live_dj { "live" } else { "dj" };
        line.push_str(&format!(" ({label}: {dj})"));
    }
    println!("{line}");
}
