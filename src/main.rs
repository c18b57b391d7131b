//! Hikvision camera bridge: exposes cameras driven through the vendor
//! network SDK as entities with snapshots, live streams and PTZ.
//!
//! Usage:
//!   hik-bridge -c /etc/hik-bridge/hik_bridge.conf                  # serve
//!   hik-bridge -c /etc/hik-bridge/hik_bridge.conf --stderr serve   # log to stderr
//!   hik-bridge add --host 192.168.1.64 --password secret
//!   hik-bridge snapshot <entry-id> -o cam.jpg
//!   hik-bridge record <entry-id> -o cam.ps --seconds 30

mod config;
mod entity;
mod entries;
mod error;
mod flow;
mod http;
mod ptz;
mod relay;
mod runtime;
mod sdk;
mod session;
mod util;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use once_cell::sync::OnceCell;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::config::{BridgeConfig, DeviceConfig};
use crate::entity::Integration;
use crate::entries::{ConfigEntry, EntryStore};
use crate::flow::{ConfigFlow, FlowResult};
use crate::relay::{CallbackSink, Frame, FrameSink, LoopSink};
use crate::runtime::SdkRuntime;
use crate::session::{DeviceSession, StreamOptions};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "hik-bridge", about = "Hikvision camera bridge (HCNetSDK)")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = "/etc/hik-bridge/hik_bridge.conf")]
    config: PathBuf,

    /// Log to stderr instead of syslog (useful for debugging).
    #[arg(long)]
    stderr: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API for all configured cameras (default).
    Serve,
    /// Verify a camera's credentials and store it as a new entry.
    Add {
        #[arg(long)]
        host:     String,
        #[arg(long, default_value_t = config::DEFAULT_PORT)]
        port:     u16,
        #[arg(long, default_value = config::DEFAULT_USERNAME)]
        username: String,
        #[arg(long, env = "HIK_PASSWORD")]
        password: String,
        #[arg(long, default_value_t = config::DEFAULT_CHANNEL)]
        channel:  i32,
        /// RTSP port for the stream URL, when it differs from the SDK port.
        #[arg(long)]
        rtsp_port: Option<u16>,
    },
    /// List stored entries.
    List,
    /// Delete a stored entry.
    Remove { entry_id: String },
    /// Capture one JPEG from a stored camera.
    Snapshot {
        entry_id: String,
        /// Output file; defaults to a timestamped file under `snapshot_dir`.
        #[arg(short, long)]
        output:   Option<PathBuf>,
    },
    /// Write a camera's raw preview stream to a file.
    Record {
        entry_id: String,
        #[arg(short, long)]
        output:   PathBuf,
        /// Stop after this many seconds (or on Ctrl-C).
        #[arg(long, default_value_t = 10)]
        seconds:  u64,
    },
    /// Open a preview briefly and report what the camera sends.
    Watch {
        entry_id: String,
        #[arg(long, default_value_t = 5)]
        seconds:  u64,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("hik-bridge: config error: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = config::validate_config(&cfg) {
        eprintln!("hik-bridge: config validation: {e}");
        process::exit(1);
    }

    let command = cli.command.unwrap_or(Command::Serve);
    let daemon = matches!(command, Command::Serve);
    let use_syslog = daemon && cfg.log_syslog && !cli.stderr;
    if let Err(e) = setup_logging(use_syslog) {
        eprintln!("hik-bridge: {e}");
        process::exit(1);
    }

    let cfg = Arc::new(cfg);
    let res = match command {
        Command::Serve => serve(cfg).await,
        Command::Add { host, port, username, password, channel, rtsp_port } => {
            let device = DeviceConfig { host, port, username, password, channel, rtsp_port };
            add_entry(&cfg, device).await
        }
        Command::List => list_entries(&cfg),
        Command::Remove { entry_id } => remove_entry(&cfg, &entry_id),
        Command::Snapshot { entry_id, output } => snapshot(&cfg, &entry_id, output).await,
        Command::Record { entry_id, output, seconds } => record(&cfg, &entry_id, &output, seconds).await,
        Command::Watch { entry_id, seconds } => watch(&cfg, &entry_id, seconds).await,
    };
    if let Err(e) = res {
        error!("{e:#}");
        eprintln!("hik-bridge: {e:#}");
        process::exit(1);
    }
}

fn stream_options(cfg: &BridgeConfig) -> StreamOptions {
    StreamOptions {
        decode:      cfg.decode_preview,
        stream_type: cfg.stream_type,
        link_mode:   cfg.link_mode,
    }
}

async fn serve(cfg: Arc<BridgeConfig>) -> anyhow::Result<()> {
    if let Err(e) = util::write_pid_file(&cfg.pid_file) {
        error!("cannot write PID file {}: {e}", cfg.pid_file.display());
    }

    let runtime = SdkRuntime::global(&cfg.sdk_options()).context("loading HCNetSDK")?;
    let store = EntryStore::load(&cfg.entries_file)
        .with_context(|| format!("loading entries from {}", cfg.entries_file.display()))?;
    let integration = Integration::new(Arc::clone(&runtime), stream_options(&cfg));

    info!("hik-bridge starting with {} camera(s)", store.entries().len());
    for entry in store.entries() {
        // A camera that is down at startup stays unloaded; the rest still run.
        if let Err(e) = integration.setup_entry(entry.clone()).await {
            warn!("setup of {} ({}) failed: {e}", entry.title, entry.data.host);
        }
    }

    let state = http::AppState {
        integration: Arc::clone(&integration),
        flow:        Arc::new(ConfigFlow::new(Arc::clone(&runtime))),
        entries:     Arc::new(Mutex::new(store)),
        settings:    Arc::new(http::HttpSettings {
            stream_buffer_frames: cfg.stream_buffer_frames,
            mjpeg_interval:       Duration::from_millis(cfg.mjpeg_interval_ms),
            snapshot_dir:         cfg.snapshot_dir.clone(),
        }),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    };
    let res = http::serve(cfg.listen_addr, state, shutdown).await;

    integration.unload_all().await;
    util::remove_pid_file(&cfg.pid_file);
    res.context("HTTP server")
}

async fn add_entry(cfg: &BridgeConfig, device: DeviceConfig) -> anyhow::Result<()> {
    let runtime = SdkRuntime::global(&cfg.sdk_options()).context("loading HCNetSDK")?;
    let mut store = EntryStore::load(&cfg.entries_file)?;
    let flow = ConfigFlow::new(runtime);

    match flow.step_user(Some(device), |host| store.has_unique_id(host)).await {
        FlowResult::CreateEntry { title, data } => {
            let entry = ConfigEntry::new(title, data);
            println!("{}  {}", entry.entry_id, entry.title);
            store.add(entry)?;
            Ok(())
        }
        FlowResult::Abort { reason } => bail!("{reason}"),
        FlowResult::Form { errors, .. } => {
            let reason = errors.get("base").copied().unwrap_or(flow::ERROR_UNKNOWN);
            bail!("{reason}")
        }
    }
}

fn list_entries(cfg: &BridgeConfig) -> anyhow::Result<()> {
    let store = EntryStore::load(&cfg.entries_file)?;
    for e in store.entries() {
        println!(
            "{}  {:<24} {}:{}  ch{}  {}",
            e.entry_id,
            e.title,
            e.data.host,
            e.data.port,
            e.data.channel,
            e.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

fn remove_entry(cfg: &BridgeConfig, entry_id: &str) -> anyhow::Result<()> {
    let mut store = EntryStore::load(&cfg.entries_file)?;
    match store.remove(entry_id)? {
        Some(e) => {
            println!("removed {}", e.title);
            Ok(())
        }
        None => bail!("no entry {entry_id}"),
    }
}

/// Log in to a stored camera for a one-off command.
async fn connect_entry(cfg: &BridgeConfig, entry_id: &str) -> anyhow::Result<(ConfigEntry, Arc<DeviceSession>)> {
    let store = EntryStore::load(&cfg.entries_file)?;
    let Some(entry) = store.get(entry_id).cloned() else {
        bail!("no entry {entry_id}");
    };
    let runtime = SdkRuntime::global(&cfg.sdk_options()).context("loading HCNetSDK")?;
    let session = DeviceSession::new(runtime, entry.data.clone());
    session.connect().await.with_context(|| format!("connecting to {}", entry.data.host))?;
    Ok((entry, session))
}

/// Sleep `seconds`, cut short by Ctrl-C.
async fn run_for(seconds: u64) {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
}

async fn snapshot(cfg: &BridgeConfig, entry_id: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let (entry, session) = connect_entry(cfg, entry_id).await?;
    let jpeg = session.snapshot().await;
    session.disconnect().await?;
    let jpeg = jpeg.context("capturing snapshot")?;

    let path = match output {
        Some(p) => {
            tokio::fs::write(&p, &jpeg).await.with_context(|| format!("writing {}", p.display()))?;
            p
        }
        None => util::save_snapshot(&cfg.snapshot_dir, &entry.data.host, &jpeg).await?,
    };
    println!("{} ({} bytes)", path.display(), jpeg.len());
    Ok(())
}

async fn record(cfg: &BridgeConfig, entry_id: &str, output: &Path, seconds: u64) -> anyhow::Result<()> {
    let file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    let writer = Arc::new(Mutex::new(BufWriter::new(file)));
    let write_failed = Arc::new(AtomicBool::new(false));
    let (entry, session) = connect_entry(cfg, entry_id).await?;

    let sink = {
        let writer = Arc::clone(&writer);
        let write_failed = Arc::clone(&write_failed);
        LoopSink::spawn(&tokio::runtime::Handle::current(), cfg.stream_buffer_frames, move |frame: Frame| {
            let writer = Arc::clone(&writer);
            let write_failed = Arc::clone(&write_failed);
            async move {
                if write_failed.load(Ordering::Relaxed) {
                    return;
                }
                if let Err(e) = writer.lock().await.write_all(&frame.data).await {
                    error!("write failed at frame {}: {e}", frame.seq);
                    write_failed.store(true, Ordering::Relaxed);
                }
            }
        })
    };

    let started = session.start_stream(sink.clone(), stream_options(cfg)).await;
    if started.is_ok() {
        info!("recording {} to {} for {seconds}s", entry.title, output.display());
        run_for(seconds).await;
        session.stop_stream().await?;
    }
    // Already closed by the relay unless the preview never started.
    sink.close();
    sink.join().await;
    session.disconnect().await?;
    started.with_context(|| format!("starting preview of {}", entry.data.host))?;

    writer.lock().await.flush().await?;
    if write_failed.load(Ordering::Relaxed) {
        bail!("writing {} failed", output.display());
    }
    println!("{} ({} frames dropped)", output.display(), sink.dropped());
    Ok(())
}

async fn watch(cfg: &BridgeConfig, entry_id: &str, seconds: u64) -> anyhow::Result<()> {
    let (entry, session) = connect_entry(cfg, entry_id).await?;

    let opened = Instant::now();
    let header_after = Arc::new(OnceCell::new());
    let payload_bytes = Arc::new(AtomicU64::new(0));
    let sink = {
        let header_after = Arc::clone(&header_after);
        let payload_bytes = Arc::clone(&payload_bytes);
        CallbackSink::new(move |frame: Frame| {
            if frame.kind.is_header() {
                let _ = header_after.set(opened.elapsed());
            } else {
                payload_bytes.fetch_add(frame.data.len() as u64, Ordering::Relaxed);
            }
        })
    };

    let started = session.start_stream(sink, stream_options(cfg)).await;
    let mut stats = None;
    if started.is_ok() {
        run_for(seconds).await;
        stats = session.stream_stats();
        session.stop_stream().await?;
    }
    session.disconnect().await?;
    started.with_context(|| format!("starting preview of {}", entry.data.host))?;

    let elapsed = opened.elapsed().as_secs_f64().max(0.001);
    match header_after.get() {
        Some(d) => println!("{}: header after {} ms", entry.title, d.as_millis()),
        None => println!("{}: no stream header received", entry.title),
    }
    let bytes = payload_bytes.load(Ordering::Relaxed);
    println!("  payload: {bytes} bytes, {:.0} kbit/s", bytes as f64 * 8.0 / 1000.0 / elapsed);
    if let Some(st) = stats {
        println!(
            "  frames: {} delivered, {} early, {} repeat headers",
            st.delivered, st.early_dropped, st.repeat_headers
        );
    }
    Ok(())
}

// ── Logging setup ─────────────────────────────────────────────────────────────

fn setup_logging(use_syslog: bool) -> anyhow::Result<()> {
    if use_syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process:  "hik-bridge".into(),
            pid:      process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| anyhow::anyhow!("syslog connect failed: {e}"))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|()| log::set_max_level(log::LevelFilter::Info))
            .map_err(|e| anyhow::anyhow!("set_logger: {e}"))?;
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }
    Ok(())
}
