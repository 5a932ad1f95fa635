mod analysis;
mod config;
mod device;
mod pipeline;
mod protocol;
mod record;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use analysis::CycleRateAnalyzer;
use config::Config;
use device::{list_available_ports, DeviceSession, SampleRecord};
use pipeline::{
    run_analyzer, run_filter_stage, AnalyzerMessage, FilterSettings, FilterStage,
    ProcessedSample, WindowedAnalyzer,
};
use record::CaptureRecord;

/// Headless CLI for live respiration capture and breath-rate analysis from a
/// serial sensor belt
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port of the respiration belt (e.g. /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Breath amplitude level sent to the belt (1-255)
    #[arg(short, long)]
    amplitude: Option<u8>,

    /// Filter mode: "passthrough" or "lowpass"
    #[arg(short, long)]
    filter: Option<String>,

    /// Low-pass cutoff frequency (Hz)
    #[arg(long, default_value = "0.5")]
    cutoff_hz: f64,

    /// Low-pass filter order
    #[arg(long, default_value = "5")]
    order: usize,

    /// Config file path (defaults to ~/.respmon/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the session summary as JSON to this path on exit
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    // Handle --list-ports
    if args.list_ports {
        return list_ports_and_exit();
    }

    // Load config and fold in command-line overrides
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let mut config = Config::load(&config_path)?;
    if args.port.is_some() {
        config.port = args.port.clone();
    }
    if let Some(level) = args.amplitude {
        config.amplitude_level = level;
    }
    match args.filter.as_deref() {
        None => {}
        Some("passthrough") => config.filter = FilterSettings::Passthrough,
        Some("lowpass") => {
            config.filter = FilterSettings::LowPass {
                cutoff_hz: args.cutoff_hz,
                sample_rate_hz: config.sample_rate_hz,
                order: args.order,
            }
        }
        Some(other) => anyhow::bail!("Unknown filter mode: {} (use passthrough or lowpass)", other),
    }
    config.validate()?;

    let port_name = config.port.clone().context(
        "No serial port specified; pass --port or set it in the config (see --list-ports)",
    )?;

    info!("Respiration monitor starting...");
    info!("Port: {}", port_name);
    info!("Amplitude level: {}", config.amplitude_level);
    info!("Filter: {:?}", config.filter);

    // Open the belt before spawning anything so an unreachable port fails
    // here, as a plain error to the caller.
    let stage = FilterStage::new(config.filter)?;
    let session = DeviceSession::open(&port_name, config.amplitude_level)?;

    // Create channels
    let (raw_tx, raw_rx) = mpsc::channel::<SampleRecord>(1024);
    let (analysis_tx, analysis_rx) = mpsc::channel::<ProcessedSample>(1024);
    let (display_tx, mut display_rx) = mpsc::channel::<ProcessedSample>(256);
    let (result_tx, mut result_rx) = mpsc::channel::<AnalyzerMessage>(32);

    let stop_flag = Arc::new(AtomicBool::new(false));

    // Spawn one worker per stage; channel closure cascades the shutdown.
    let session_stop = stop_flag.clone();
    let session_handle = std::thread::spawn(move || session.run(raw_tx, session_stop));
    let filter_handle =
        std::thread::spawn(move || run_filter_stage(raw_rx, analysis_tx, display_tx, stage));

    let windowed = WindowedAnalyzer::with_sizes(
        CycleRateAnalyzer::new(config.n_bins),
        config.window_size,
        config.step_size,
        config.sample_rate_hz,
    );
    let analyzer_handle = std::thread::spawn(move || run_analyzer(analysis_rx, result_tx, windowed));

    // Set up Ctrl+C handler
    let stop_flag_ctrlc = stop_flag.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, stopping...");
        stop_flag_ctrlc.store(true, Ordering::SeqCst);
    });

    // Drain the best-effort display lane; a live UI would subscribe here.
    tokio::spawn(async move {
        let mut seen: u64 = 0;
        while let Some(sample) = display_rx.recv().await {
            seen += 1;
            if seen % 250 == 0 {
                debug!(
                    "Waveform at {:.1}s: {:.1} ({} samples streamed)",
                    sample.timestamp, sample.filtered_value, seen
                );
            }
        }
    });

    println!("\nCapturing... Press Ctrl+C to stop.\n");

    let mut record = CaptureRecord::new(port_name, config.amplitude_level, config.filter);

    // Consume analysis results until the pipeline winds down
    while let Some(msg) = result_rx.recv().await {
        match msg {
            AnalyzerMessage::Result(result) => {
                record.add_result(&result);
                if let Some(rate) = result.metrics.rate.last() {
                    println!(
                        "[{:02}:{:04.1}] respiration rate: {:.1} breaths/min",
                        (result.timestamp / 60.0) as u64,
                        result.timestamp % 60.0,
                        rate
                    );
                }
            }
            AnalyzerMessage::Stopped => {
                info!("Analysis pipeline stopped");
                break;
            }
        }
    }

    // Wait for the workers
    let link_result = session_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Capture thread panicked"))?;
    let _ = filter_handle.join();
    let _ = analyzer_handle.join();

    if let Ok(stats) = &link_result {
        record.apply_link_stats(stats);
    }
    record.finalize();

    // Print summary
    println!("\n--- Session Summary ---");
    println!("Duration: {:.1}s", record.duration_secs());
    println!("Samples: {}", record.samples_received);
    println!("Windows analyzed: {}", record.windows_analyzed);
    if let Some(rate) = record.last_rate_bpm {
        println!("Last rate: {:.1} breaths/min", rate);
    }
    if record.bytes_discarded > 0 || record.checksum_errors > 0 {
        warn!(
            "Link noise: {} bytes discarded, {} checksum failures",
            record.bytes_discarded, record.checksum_errors
        );
    }

    if let Some(path) = &args.summary {
        let json =
            serde_json::to_string_pretty(&record).context("Failed to serialize session summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session summary to {path:?}"))?;
        info!("Session summary written to {:?}", path);
    }

    link_result.context("Capture session failed")?;
    info!("Session complete");
    Ok(())
}

fn list_ports_and_exit() -> Result<()> {
    println!("Available serial ports:\n");

    match list_available_ports() {
        Ok(ports) => {
            if ports.is_empty() {
                println!("  No serial ports found.");
            } else {
                for port in ports {
                    println!("  - {} ({})", port.name, port.description);
                }
            }
        }
        Err(e) => {
            error!("Failed to list serial ports: {}", e);
            println!("  Error: {}", e);
        }
    }

    Ok(())
}
