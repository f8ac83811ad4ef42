//! serialscope - headless capture entry point
//!
//! Opens one or more serial links, feeds every numeric line they send into a
//! signal registry, and writes a timestamped CSV each time the registry's
//! primary signal fills up. Lines typed on stdin are forwarded to the
//! devices; end of input stops the capture.

use anyhow::{bail, Context};
use clap::Parser;
use crossbeam_channel::{select, unbounded, Receiver};
use serde_json::Value;
use serialscope::buffer::{BufferEventKind, MultiSignalRegistry};
use serialscope::config::{AppConfig, LinkConfig};
use serialscope::logging;
use serialscope::serial::{
    virtual_pair, LinkEvent, LinkEventKind, LinkSettings, PortEnumerator, SerialLink,
    SerialLinkPool, StaticPorts, SystemPorts, VirtualDevice, DEFAULT_BAUD_RATE,
};
use serialscope::timing::{SamplerTimeCounter, TimerCount};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Port name advertised by the simulated device
const VIRTUAL_PORT: &str = "VIRTUAL0";

/// How often the status line is logged
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "serialscope")]
#[command(version, about = "Capture line-delimited samples from serial devices")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture from this port instead of the configured links
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate for --port
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Capture from a simulated device producing sine waves
    #[arg(long = "virtual")]
    simulate: bool,

    /// Samples kept per signal before an export
    #[arg(long)]
    capacity: Option<usize>,

    /// Directory for exported CSV files
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Also write logs to daily files in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print the available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(logging::DEFAULT_FILTER, cli.log_dir.as_deref());

    if cli.list_ports {
        for port in SystemPorts.list_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Could not load configuration {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(capacity) = cli.capacity {
        config.capture.capacity = capacity;
    }
    if let Some(out) = cli.out.clone() {
        config.capture.output_dir = out;
    }
    config.validate()?;

    tracing::info!("Starting serialscope");

    let mut registry = config.capture.build_registry()?;
    std::fs::create_dir_all(&config.capture.output_dir).with_context(|| {
        format!(
            "Could not create output directory {}",
            config.capture.output_dir.display()
        )
    })?;

    let running = Arc::new(AtomicBool::new(true));
    let mut simulator = None;
    let pool = if cli.simulate {
        let (pool, device) = virtual_pool();
        simulator = Some(spawn_sine_source(
            device,
            config.capture.signals.clone(),
            Arc::clone(&running),
        )?);
        pool
    } else if let Some(port) = cli.port.clone() {
        let link = LinkConfig {
            baud_rate: cli.baud,
            ..LinkConfig::new("device", Some(port))
        };
        SerialLinkPool::from_config(&[link])?
    } else if !config.links.is_empty() {
        SerialLinkPool::from_config(&config.links)?
    } else {
        bail!("No serial link configured; pass --port, --virtual or --config");
    };

    let data = pool.subscribe_channel(LinkEventKind::Data);
    pool.on(LinkEventKind::Connection, |event| {
        if let LinkEvent::Connection { source, connected } = event {
            tracing::info!(link = ?source, connected, "Connection changed");
        }
    });
    pool.on(LinkEventKind::Ports, |event| {
        if let LinkEvent::Ports(ports) = event {
            tracing::info!(?ports, "Available ports changed");
        }
    });

    let (full_tx, full_rx) = unbounded();
    let primary = registry.primary_key().to_string();
    registry.on(&primary, BufferEventKind::Full, move |_| {
        let _ = full_tx.send(());
    });

    let input = spawn_stdin_reader()?;
    pool.start_all();

    let mut schedule = ExportSchedule::new(registry.capacity(), config.capture.auto_clear);
    let mut sampler = SamplerTimeCounter::new();
    let mut status = TimerCount::new(STATUS_INTERVAL);
    let mut received: u64 = 0;
    let mut exports: u64 = 0;

    loop {
        select! {
            recv(data) -> event => {
                let Ok(LinkEvent::Data { line, .. }) = event else { continue };
                let samples = parse_samples(&line, registry.names());
                if samples.is_empty() {
                    tracing::debug!(%line, "Ignoring non-numeric line");
                    continue;
                }
                registry.append_all(samples);
                received += 1;
                sampler.update();

                let full = full_rx.try_iter().count() > 0;
                if schedule.record(full) && export(&registry, &config.capture.output_dir) {
                    exports += 1;
                }
                if full && config.capture.auto_clear {
                    registry.clear_all();
                }
            }
            recv(input) -> line => match line {
                Ok(line) => {
                    for name in pool.names() {
                        pool.write_to(name, line.as_str());
                    }
                }
                Err(_) => break,
            },
            default(Duration::from_millis(250)) => {}
        }

        if status.update() {
            tracing::info!(
                received,
                exports,
                rate_hz = sampler.frequency(),
                "Capture status"
            );
        }
    }

    tracing::info!("Input closed, stopping");
    pool.stop_all();
    running.store(false, Ordering::SeqCst);
    if let Some(handle) = simulator {
        let _ = handle.join();
    }

    if registry.get(&primary).is_some_and(|b| !b.is_empty()) {
        export(&registry, &config.capture.output_dir);
    }
    Ok(())
}

/// A pool holding one link to a simulated device
fn virtual_pool() -> (SerialLinkPool, VirtualDevice) {
    let (port, device) = virtual_pair(VIRTUAL_PORT);
    let settings = LinkSettings {
        reconnect_delay: Duration::from_millis(200),
        ..LinkSettings::default()
    };
    let link = SerialLink::with_enumerator(
        "virtual",
        port,
        StaticPorts::new([VIRTUAL_PORT]),
        settings,
    );
    link.restore_port();

    let mut pool = SerialLinkPool::with_enumerator(StaticPorts::new([VIRTUAL_PORT]));
    pool.insert(link);
    (pool, device)
}

/// Feed sine waves into a virtual device until `running` is cleared
fn spawn_sine_source(
    device: VirtualDevice,
    signals: Vec<String>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("virtual-device".to_string())
        .spawn(move || {
            let dt = 0.01;
            let mut t: f64 = 0.0;
            while running.load(Ordering::SeqCst) {
                let line = if signals.len() == 1 {
                    format!("{:.6}", (t * std::f64::consts::TAU).sin())
                } else {
                    let object: serde_json::Map<String, Value> = signals
                        .iter()
                        .enumerate()
                        .map(|(i, name)| {
                            let phase = i as f64 * std::f64::consts::FRAC_PI_2;
                            let value = (t * std::f64::consts::TAU + phase).sin();
                            (name.clone(), Value::from(value))
                        })
                        .collect();
                    Value::Object(object).to_string()
                };
                device.send_line(line);
                t += dt;
                thread::sleep(Duration::from_secs_f64(dt));
            }
        })?;
    Ok(handle)
}

/// Forward stdin lines; the channel disconnects at end of input
fn spawn_stdin_reader() -> anyhow::Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Decides when the capture loop writes a CSV file
///
/// Every `full` crossing exports. Without auto-clear the primary buffer
/// stays above its threshold after the first crossing, so a rolling export
/// follows every `window` batches instead.
#[derive(Debug)]
struct ExportSchedule {
    window: usize,
    rolling: bool,
    since_export: usize,
}

impl ExportSchedule {
    fn new(window: usize, auto_clear: bool) -> Self {
        Self {
            window: window.max(1),
            rolling: !auto_clear,
            since_export: 0,
        }
    }

    /// Record one appended batch; returns whether to export now
    fn record(&mut self, full: bool) -> bool {
        self.since_export += 1;
        let due = full || (self.rolling && self.since_export >= self.window);
        if due {
            self.since_export = 0;
        }
        due
    }
}

/// Write the registry to a new timestamped CSV file
fn export(registry: &MultiSignalRegistry, dir: &Path) -> bool {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
    let path = dir.join(format!("capture-{}.csv", stamp));
    let saved = registry.save_all(&path);
    if saved {
        tracing::info!(path = %path.display(), "Exported capture");
    }
    saved
}

/// Extract `(signal, value)` pairs from one line
///
/// Accepts a bare number (assigned to the first signal), comma-separated
/// numbers (assigned to the signals in order), or a JSON object of
/// name -> number. Anything else yields nothing.
fn parse_samples(line: &str, names: &[String]) -> Vec<(String, f64)> {
    let line = line.trim();
    let Some(primary) = names.first() else {
        return Vec::new();
    };

    if let Ok(value) = line.parse::<f64>() {
        return vec![(primary.clone(), value)];
    }

    if line.starts_with('{') {
        return match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(name, value)| json_number(&value).map(|v| (name, v)))
                .collect(),
            _ => Vec::new(),
        };
    }

    let fields: Option<Vec<f64>> = line
        .split(',')
        .map(|field| field.trim().parse::<f64>().ok())
        .collect();
    match fields {
        Some(values) if values.len() > 1 => names.iter().cloned().zip(values).collect(),
        _ => Vec::new(),
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bare_number_goes_to_primary() {
        assert_eq!(
            parse_samples(" 3.5 ", &names(&["v", "i"])),
            vec![("v".to_string(), 3.5)]
        );
    }

    #[test]
    fn test_json_object_by_name() {
        let mut samples = parse_samples(r#"{"i": 0.2, "v": "1.5", "label": "x"}"#, &names(&["v", "i"]));
        samples.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            samples,
            vec![("i".to_string(), 0.2), ("v".to_string(), 1.5)]
        );
    }

    #[test]
    fn test_csv_fields_in_signal_order() {
        assert_eq!(
            parse_samples("1,2,3", &names(&["a", "b"])),
            vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)]
        );
    }

    #[test]
    fn test_garbage_is_ignored() {
        assert!(parse_samples("hello", &names(&["a"])).is_empty());
        assert!(parse_samples("{oops", &names(&["a"])).is_empty());
        assert!(parse_samples("1,x", &names(&["a", "b"])).is_empty());
    }

    #[test]
    fn test_auto_clear_exports_only_on_full() {
        let mut schedule = ExportSchedule::new(4, true);
        let exports: Vec<bool> = [false, false, true, false, false, false, false, false]
            .into_iter()
            .map(|full| schedule.record(full))
            .collect();
        assert_eq!(exports, vec![false, false, true, false, false, false, false, false]);
    }

    #[test]
    fn test_rolling_exports_keep_coming_without_auto_clear() {
        // A buffer of 4 crosses its threshold once, at the third batch.
        let mut schedule = ExportSchedule::new(4, false);
        let due: Vec<usize> = (1..=14)
            .filter(|batch| schedule.record(*batch == 3))
            .collect();
        assert_eq!(due, vec![3, 7, 11]);
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "serialscope",
            "--virtual",
            "--capacity",
            "64",
            "--out",
            "/tmp/caps",
        ]);
        assert!(cli.simulate);
        assert_eq!(cli.capacity, Some(64));
        assert_eq!(cli.baud, 9600);
        assert_eq!(cli.out.as_deref(), Some(Path::new("/tmp/caps")));
    }
}
