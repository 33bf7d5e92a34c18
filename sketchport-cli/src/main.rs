//! sketchport CLI - detect Arduino-compatible boards and upload sketches.
//!
//! ## Features
//!
//! - List serial ports with board classification
//! - Identify a connected board (descriptor match + probe ladder)
//! - Wrap bare sketch logic in the standard envelope
//! - Chunked, paced sketch upload with progress display
//! - Serial monitor and a connection watcher with auto-reconnect
//! - Shell completion generation
//! - Environment variable support

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use sketchport::{
    DetectedPort, Session, SessionObserver, SessionState, TransportError, UploadError,
    UploadOptions, WrapOptions, detect_ports, identify, upload,
};
use std::env;
use std::fs;
use std::io;
use std::io::{Read as _, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod config;
mod monitor_io;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// User-facing error classes that map to dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or unusable setup — exit code 2.
    #[error("{0}")]
    Usage(String),
    /// Interrupted by the user — exit code 130.
    #[error("{0}")]
    Cancelled(String),
}

/// sketchport - detect Arduino-compatible boards and upload sketches.
///
/// Environment variables:
///   SKETCHPORT_PORT              - Default serial port
///   SKETCHPORT_BAUD              - Default baud rate (default: 9600)
///   SKETCHPORT_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "sketchport")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "SKETCHPORT_PORT")]
    port: Option<String>,

    /// Baud rate for the serial connection.
    #[arg(
        short,
        long,
        global = true,
        default_value = "9600",
        env = "SKETCHPORT_BAUD"
    )]
    baud: u32,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "SKETCHPORT_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// List all available ports (including unrecognized types).
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports with board classification.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Identify the connected board.
    Detect {
        /// Descriptor match only — never opens the port.
        #[arg(long)]
        no_probe: bool,

        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Upload a sketch to the connected board.
    Upload {
        /// Path to the sketch source file.
        sketch: PathBuf,

        /// Chunk size in bytes.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Pacing delay between chunks, in milliseconds.
        #[arg(long)]
        chunk_delay_ms: Option<u64>,

        /// Send the file verbatim, skipping envelope wrapping.
        #[arg(long)]
        raw: bool,

        /// Baud rate declared in the generated envelope.
        #[arg(long)]
        sketch_baud: Option<u32>,

        /// Library header to include in the envelope (repeatable).
        #[arg(long = "include", value_name = "HEADER")]
        includes: Vec<String>,
    },

    /// Wrap bare sketch logic in the standard envelope and print it.
    Wrap {
        /// Path to the sketch source file.
        sketch: PathBuf,

        /// Write the wrapped sketch here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Baud rate declared in the generated envelope.
        #[arg(long)]
        sketch_baud: Option<u32>,

        /// Library header to include in the envelope (repeatable).
        #[arg(long = "include", value_name = "HEADER")]
        includes: Vec<String>,
    },

    /// Open a read-only serial monitor.
    Monitor {
        /// Baud rate for monitoring.
        #[arg(long, default_value = "9600")]
        monitor_baud: u32,
    },

    /// Watch the connection: liveness polling and auto-reconnect.
    Watch {
        /// Polling interval in milliseconds.
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Disable automatic reconnection attempts.
        #[arg(long)]
        no_reconnect: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    match run() {
        Ok(()) => {},
        Err(e) => {
            if let Some(cli_err) = e.downcast_ref::<CliError>() {
                match cli_err {
                    CliError::Usage(msg) => {
                        eprintln!("{} {msg}", style("Error:").red().bold());
                        std::process::exit(2);
                    },
                    CliError::Cancelled(msg) => {
                        eprintln!("{msg}");
                        std::process::exit(130);
                    },
                }
            }
            eprintln!("{} {e:#}", style("Error:").red().bold());
            std::process::exit(1);
        },
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "sketchport v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Load configuration
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { json } => {
            cmd_list_ports(*json);
            Ok(())
        },
        Commands::Detect { no_probe, json } => cmd_detect(&cli, &mut config, *no_probe, *json),
        Commands::Upload {
            sketch,
            chunk_size,
            chunk_delay_ms,
            raw,
            sketch_baud,
            includes,
        } => cmd_upload(
            &cli,
            &mut config,
            sketch,
            *chunk_size,
            *chunk_delay_ms,
            *raw,
            *sketch_baud,
            includes,
        ),
        Commands::Wrap {
            sketch,
            output,
            sketch_baud,
            includes,
        } => cmd_wrap(&config, sketch, output.as_deref(), *sketch_baud, includes),
        Commands::Monitor { monitor_baud } => cmd_monitor(&cli, &mut config, *monitor_baud),
        Commands::Watch {
            interval_ms,
            no_reconnect,
        } => cmd_watch(&cli, *interval_ms, *no_reconnect),
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Get serial port from CLI args or interactive selection.
fn get_port(cli: &Cli, config: &mut Config) -> Result<DetectedPort> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    // Ask to remember if not a known board and interactive mode
    if !selected.is_known && !cli.non_interactive {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port)
}

/// Effective baud for the serial connection: CLI flag wins, then config.
fn connection_baud(cli: &Cli, config: &Config) -> u32 {
    // clap already applied the CLI/env default; an explicit config value
    // only kicks in when the user stayed on the default
    if cli.baud != sketchport::DEFAULT_BAUD {
        cli.baud
    } else {
        config.connection.baud.unwrap_or(cli.baud)
    }
}

fn wrap_options(config: &Config, sketch_baud: Option<u32>, includes: &[String]) -> WrapOptions {
    WrapOptions {
        baud: sketch_baud
            .or(config.upload.sketch_baud)
            .unwrap_or(sketchport::DEFAULT_BAUD),
        includes: includes.to_vec(),
    }
}

/// List ports command implementation.
fn cmd_list_ports(json: bool) {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.info.name,
                    "board": p.board,
                    "recognized": p.is_recognized(),
                    "vid": p.info.vid,
                    "pid": p.info.pid,
                    "manufacturer": p.info.manufacturer,
                    "product": p.info.product,
                    "serial": p.info.serial_number,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("no serial ports found").dim());
        return;
    }

    for port in &detected {
        let board_info = if let Some(board) = port.board {
            format!(" [{}]", style(board).yellow())
        } else {
            String::new()
        };

        let vid_pid = if let (Some(vid), Some(pid)) = (port.info.vid, port.info.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        let product = port
            .info
            .product
            .as_ref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(&port.info.name).cyan(),
            board_info,
            vid_pid,
            product
        );
    }

    if let Ok(auto_port) = sketchport::auto_detect_port() {
        eprintln!(
            "\n{} would auto-select {}",
            style("→").green().bold(),
            style(&auto_port.info.name).cyan().bold()
        );
    }
}

/// Detect command implementation.
fn cmd_detect(cli: &Cli, config: &mut Config, no_probe: bool, json: bool) -> Result<()> {
    let port = get_port(cli, config)?;

    let model = if no_probe {
        identify::descriptor_match(&port)
            .unwrap_or(sketchport::GENERIC_BOARD)
            .to_string()
    } else {
        let session = Session::new();
        if !cli.quiet {
            eprintln!(
                "{} Probing {}...",
                style("⏳").yellow(),
                style(&port.info.name).cyan()
            );
        }
        let model = session.connect(&port, connection_baud(cli, config))?;
        session.disconnect();
        model
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "port": port.info.name,
                "model": model,
                "vid": port.info.vid,
                "pid": port.info.pid,
            }))
            .unwrap_or_default()
        );
    } else {
        if !cli.quiet {
            eprintln!(
                "{} {} identifies as:",
                style("✓").green(),
                style(&port.info.name).cyan()
            );
        }
        println!("{model}");
    }

    Ok(())
}

/// Upload command implementation.
#[allow(clippy::too_many_arguments)]
fn cmd_upload(
    cli: &Cli,
    config: &mut Config,
    sketch: &PathBuf,
    chunk_size: Option<usize>,
    chunk_delay_ms: Option<u64>,
    raw: bool,
    sketch_baud: Option<u32>,
    includes: &[String],
) -> Result<()> {
    let source = fs::read_to_string(sketch)
        .with_context(|| format!("failed to read sketch {}", sketch.display()))?;

    let port = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port.info.name).cyan(),
            connection_baud(cli, config)
        );
    }

    let session = Arc::new(Session::new());

    // Ctrl-C tears the session down; the chunk loop observes the cancel
    // flag and aborts before the next chunk
    {
        let session = Arc::clone(&session);
        ctrlc::set_handler(move || session.disconnect())
            .context("failed to install interrupt handler")?;
    }

    if !cli.quiet {
        eprintln!("{} Connecting...", style("⏳").yellow());
    }
    let model = session.connect(&port, connection_baud(cli, config))?;
    if !cli.quiet {
        eprintln!("{} Connected to {}", style("✓").green(), style(&model).bold());
    }

    let options = UploadOptions {
        chunk_size: chunk_size
            .or(config.upload.chunk_size)
            .unwrap_or(sketchport::DEFAULT_CHUNK_SIZE),
        chunk_delay: Duration::from_millis(
            chunk_delay_ms
                .or(config.upload.chunk_delay_ms)
                .unwrap_or(sketchport::DEFAULT_CHUNK_DELAY.as_millis() as u64),
        ),
        raw,
        wrap: wrap_options(config, sketch_baud, includes),
    };

    let total = sketchport::upload::payload(&source, &options).len() as u64;
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let result = upload(&session, &source, &options, |sent, _| {
        pb.set_position(sent as u64);
    });

    match result {
        Ok(()) => {
            pb.finish_with_message("done");
            session.disconnect();
            if !cli.quiet {
                eprintln!(
                    "\n{} Sketch uploaded ({total} bytes)",
                    style("🎉").green().bold()
                );
            }
            Ok(())
        },
        Err(UploadError::TransportFailure(TransportError::Cancelled)) => {
            pb.abandon_with_message("cancelled");
            Err(CliError::Cancelled("upload cancelled".to_string()).into())
        },
        Err(e) => {
            pb.abandon_with_message("failed");
            session.disconnect();
            Err(e).context("upload failed")
        },
    }
}

/// Wrap command implementation.
fn cmd_wrap(
    config: &Config,
    sketch: &PathBuf,
    output: Option<&std::path::Path>,
    sketch_baud: Option<u32>,
    includes: &[String],
) -> Result<()> {
    let source = fs::read_to_string(sketch)
        .with_context(|| format!("failed to read sketch {}", sketch.display()))?;

    let wrapped = sketchport::wrap(&source, &wrap_options(config, sketch_baud, includes));

    match output {
        Some(path) => {
            fs::write(path, &wrapped)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{} Wrote wrapped sketch to {}",
                style("✓").green(),
                path.display()
            );
        },
        None => print!("{wrapped}"),
    }

    Ok(())
}

/// Monitor command implementation: read-only line monitor, Ctrl-C exits.
fn cmd_monitor(cli: &Cli, config: &mut Config, monitor_baud: u32) -> Result<()> {
    let port = get_port(cli, config)?;

    eprintln!(
        "{} Monitoring {} at {} baud",
        style("📡").cyan(),
        style(&port.info.name).green(),
        monitor_baud
    );
    eprintln!("{}", style("Press Ctrl-C to exit").dim());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install interrupt handler")?;
    }

    let mut serial = serialport::new(&port.info.name, monitor_baud)
        .timeout(Duration::from_millis(100))
        .open()
        .with_context(|| format!("failed to open {}", port.info.name))?;

    let mut raw = [0u8; 1024];
    let mut pending: Vec<u8> = Vec::new();

    while running.load(Ordering::SeqCst) {
        match serial.read(&mut raw) {
            Ok(n) if n > 0 => {
                pending.extend_from_slice(&raw[..n]);
                let text = monitor_io::drain_lossy(&mut pending);
                if !text.is_empty() {
                    print!("{}", monitor_io::clean_text(&text));
                    io::stdout().flush().ok();
                }
            },
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                // Timeout is expected, keep polling
            },
            Err(e) => {
                return Err(e).context("serial monitor read failed");
            },
            _ => {},
        }
    }

    eprintln!("\n{} Monitor closed", style("✓").green());
    Ok(())
}

/// Observer that narrates session events to stderr.
struct EventPrinter;

impl SessionObserver for EventPrinter {
    fn on_connect(&self, model: &str, port: &sketchport::PortInfo) {
        eprintln!(
            "{} Connected: {} on {}",
            style("✓").green(),
            style(model).bold(),
            style(&port.name).cyan()
        );
    }

    fn on_disconnect(&self) {
        eprintln!("{} Disconnected", style("✗").red());
    }

    fn on_status_change(&self, state: SessionState) {
        debug!("session status: {state}");
    }
}

/// Watch command implementation.
fn cmd_watch(cli: &Cli, interval_ms: u64, no_reconnect: bool) -> Result<()> {
    let session = Arc::new(Session::new());
    session.add_observer(Box::new(EventPrinter));

    eprintln!(
        "{} Watching for boards (poll every {interval_ms} ms, reconnect {})",
        style("👀").cyan(),
        if no_reconnect { "off" } else { "on" }
    );
    eprintln!("{}", style("Press Ctrl-C to stop").dim());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install interrupt handler")?;
    }

    let mut monitor = sketchport::StatusMonitor::start(
        Arc::clone(&session),
        sketchport::MonitorOptions {
            interval: Duration::from_millis(interval_ms),
            auto_reconnect: !no_reconnect,
            baud: cli.baud,
        },
    );

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    monitor.stop();
    session.disconnect();
    eprintln!("{} Watch stopped", style("✓").green());
    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
