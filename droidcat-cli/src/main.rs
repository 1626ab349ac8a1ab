//! droidcat command-line front end
//!
//! Lists devices, manages TCP/IP connections and streams logcat output
//! through the droidcat core library.

use anyhow::Context;
use clap::{Parser, Subcommand};
use droidcat_core::{
    init_logging_from_config, init_logging_with_level, AppConfig, BridgeError, LogLevel,
    LogcatEntry, LogcatEvent,
};
use std::path::Path;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "droidcat")]
#[command(about = "Android debug bridge device listing and logcat streaming")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (TOML or YAML)
    #[arg(short, long, default_value = "droidcat.toml")]
    config: String,

    /// Path to the adb executable
    #[arg(long)]
    adb: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List attached devices
    Devices {
        /// Resolve model, API level and Android version for ready devices
        #[arg(short, long)]
        long: bool,
    },
    /// Print the adb version
    Version,
    /// Connect to a device over TCP/IP
    Connect {
        host: String,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Disconnect one TCP/IP device, or all of them
    Disconnect {
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Clear the on-device log buffer
    Clear {
        #[arg(short, long)]
        serial: Option<String>,
    },
    /// Stream log entries until the process exits or Ctrl-C
    Logcat {
        #[arg(short, long)]
        serial: Option<String>,

        /// Only show this tag; repeatable, accepts TAG or TAG:LEVEL
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Minimum level (V, D, I, W, E, F or a level name)
        #[arg(short, long)]
        level: Option<LogLevel>,

        /// Case-insensitive text matched against tag or message
        #[arg(short, long)]
        filter: Option<String>,

        /// Clear the device log before streaming
        #[arg(long)]
        clear_first: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config).await?;
    if let Some(adb) = &cli.adb {
        config.adb.adb_path = Some(adb.clone());
    }

    if cli.verbose {
        init_logging_with_level("debug")?;
    } else {
        init_logging_from_config(&config.logging)?;
    }
    debug!("Using adb at {}", config.resolve_adb_path());

    if let Err(e) = run(cli.command, &config).await {
        let suggestion = e
            .downcast_ref::<BridgeError>()
            .and_then(|e| e.recovery_suggestion());
        if let Some(suggestion) = suggestion {
            error!("{}", suggestion);
        }
        return Err(e);
    }
    Ok(())
}

async fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    if Path::new(path).exists() {
        return AppConfig::from_file(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path));
    }

    let mut config = AppConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let executor = config.executor();

    match command {
        Command::Devices { long } => {
            if long {
                let infos = executor.list_device_infos().await?;
                if infos.is_empty() {
                    println!("No devices attached");
                }
                for info in infos {
                    println!(
                        "{:<24} {:<14} {}",
                        info.device.serial,
                        info.device.state,
                        info.display_label()
                    );
                }
            } else {
                let devices = executor.list_devices().await?;
                if devices.is_empty() {
                    println!("No devices attached");
                }
                for device in devices {
                    println!(
                        "{:<24} {:<14} {}",
                        device.serial,
                        device.state,
                        device.model.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Command::Version => {
            let version = executor.version().await?;
            println!("adb {}", version.version);
        }
        Command::Connect { host, port } => {
            let outcome = executor.connect(&host, port).await?;
            println!("{}", outcome.message);
            if !outcome.success {
                anyhow::bail!("connect to {} failed", host);
            }
        }
        Command::Disconnect { host, port } => {
            let outcome = executor.disconnect(host.as_deref(), port).await?;
            println!("{}", outcome.message);
            if !outcome.success {
                anyhow::bail!("disconnect failed");
            }
        }
        Command::Clear { serial } => {
            let result = executor.clear_logcat(serial.as_deref()).await?;
            if !result.success() {
                anyhow::bail!("logcat -c failed: {}", result.stderr.trim());
            }
            println!("Device log cleared");
        }
        Command::Logcat {
            serial,
            tags,
            level,
            filter,
            clear_first,
        } => {
            let tags = if tags.is_empty() {
                config.logcat.default_tags.clone()
            } else {
                tags
            };
            stream_logcat(config, serial.as_deref(), &tags, level, filter.as_deref(), clear_first)
                .await?;
        }
    }
    Ok(())
}

async fn stream_logcat(
    config: &AppConfig,
    serial: Option<&str>,
    tags: &[String],
    level: Option<LogLevel>,
    filter: Option<&str>,
    clear_first: bool,
) -> anyhow::Result<()> {
    let stream = config.logcat_stream();
    if let Some(level) = level {
        stream.set_min_level(level);
    }
    if filter.is_some() {
        stream.set_text_filter(filter);
    }

    if clear_first {
        let result = stream.executor().clear_logcat(serial).await?;
        if !result.success() {
            warn!("Could not clear device log: {}", result.stderr.trim());
        }
    }

    let mut subscription = stream.subscribe();
    stream.start(serial, tags).await?;

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(LogcatEvent::Entry(entry)) => print_entry(&entry),
                Some(LogcatEvent::Started { session_id, .. }) => {
                    info!("Streaming logcat (session {})", session_id);
                }
                Some(LogcatEvent::Error(message)) => warn!("adb: {}", message),
                Some(LogcatEvent::Closed { exit_code, .. }) => {
                    info!("logcat exited with {:?}", exit_code);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                stream.stop().await;
                break;
            }
        }
    }

    if let Ok(stats) = stream.buffer().stats() {
        debug!(
            "Buffered {} entries, evicted {}",
            stats.total_entries, stats.evicted
        );
    }
    Ok(())
}

fn print_entry(entry: &LogcatEntry) {
    println!(
        "{} {:>5} {:>5} {} {}: {}",
        entry.timestamp.format("%m-%d %H:%M:%S%.3f"),
        entry.pid,
        entry.tid,
        entry.level.code(),
        entry.tag,
        entry.message
    );
}
