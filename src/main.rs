//! CLI entry point: parses arguments, initializes logging, loads
//! configuration, and wires the tailing engine and sink proxy together as
//! two cooperating threads connected only by the channel.

mod channel;
mod config;
mod engine;
mod offset_store;
mod record;
mod scanner;
mod sink;
mod watcher;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use signal_hook::consts::SIGTERM;
use signal_hook::iterator::Signals;

use channel::channel as make_channel;
use config::{Config, SinkConfig};
use offset_store::OffsetStore;
use sink::kafka::KafkaSink;
use sink::stdout::StdoutSink;
use sink::{Sink, SinkProxy};
use watcher::{PlatformWatcher, ShutdownFlag, Watcher};

#[derive(Parser)]
#[command(name = "pooltail", about = "Tails a pool directory and ships new lines to a named sink")]
struct Cli {
    /// Path to the INI-sectioned configuration file.
    config: PathBuf,

    /// Override RUST_LOG's default verbosity for this run.
    #[arg(long)]
    log_level: Option<String>,

    /// Directory to write rotating log files to, instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Perform the initial scan-and-drain, then exit without starting a watcher.
    #[arg(long)]
    once: bool,
}

fn init_logging(log_dir: Option<&std::path::Path>, level: Option<&str>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let directive = format!("pooltail={}", level.unwrap_or("info"));
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "pooltail.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
                )
                .init();
            Ok(None)
        }
    }
}

fn build_sinks(config: &Config) -> anyhow::Result<HashMap<String, Box<dyn Sink>>> {
    let mut sinks: HashMap<String, Box<dyn Sink>> = HashMap::new();
    for (name, sink_config) in &config.sinks {
        let sink: Box<dyn Sink> = match sink_config {
            SinkConfig::Stdout => Box::new(StdoutSink),
            SinkConfig::Kafka { servers, topic } => {
                Box::new(KafkaSink::new(servers.clone(), topic.clone())?)
            }
        };
        sinks.insert(name.clone(), sink);
    }
    Ok(sinks)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref(), cli.log_level.as_deref())?;

    let config = Config::load(&cli.config)?;
    tracing::info!(
        pool_path = %config.pool_path.display(),
        sink = %config.sink_name,
        "loaded configuration"
    );

    let offsets = Arc::new(OffsetStore::load(&config.offset_file)?);
    let (tx, rx) = make_channel();
    let sinks = build_sinks(&config)?;
    let proxy = SinkProxy::new(sinks);
    let sink_thread = std::thread::spawn(move || proxy.run(rx));

    // Only SIGTERM is handled here. SIGUSR1 is the kqueue backend's own
    // internal wakeup signal (raised by its directory poller, consumed by
    // its content tailer via a kevent signal filter) and must not also go
    // through a classic signal_hook handler.
    let shutdown = ShutdownFlag::new();
    let mut signals = Signals::new([SIGTERM])?;
    let shutdown_for_signals = shutdown.clone();
    let sender_for_signals = tx.clone();
    std::thread::spawn(move || {
        for signal in signals.forever() {
            if signal == SIGTERM {
                tracing::info!("SIGTERM received, shutting down");
                shutdown_for_signals.set();
                let _ = sender_for_signals.send(channel::Message::Stop);
                break;
            }
        }
    });

    if cli.once {
        tracing::info!("--once: performing a single scan-and-drain, not starting a watcher");
        engine::initial_scan_and_drain(
            &config.pool_path,
            &config.filename_pattern,
            &config.sink_name,
            &tx,
            &offsets,
        )?;
    } else {
        let watcher = PlatformWatcher::new(
            config.pool_path.clone(),
            config.filename_pattern.clone(),
            config.sink_name.clone(),
            tx.clone(),
            offsets,
            shutdown.clone(),
        );
        watcher.run()?;
    }

    let _ = tx.send(channel::Message::Stop);
    sink_thread.join().expect("sink proxy thread panicked");
    tracing::info!("shutdown complete");
    Ok(())
}
