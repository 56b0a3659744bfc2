/*!
# Screenshift

Closed-loop controller for a display mounted on a linear mechanism. Telemetry
from the mechanism drives a compensating visual offset, and every telemetry
frame is answered with a new target position derived from the pointer.

## Features

- Binary serial protocol: 4-byte telemetry in, 2-byte commands out
- Velocity-lead prediction of the visual offset
- Pointer-to-step conversion with optional travel clamping
- Simulated mechanism for running without hardware
- Follows the system pointer; a pointer pad stands in for it in debug mode
- GUI with status and preview
- Command-line interface for headless operation

## Usage

### GUI Mode (default)
```bash
screenshift
```

### Command Line Mode
```bash
screenshift run --port /dev/ttyACM0 --baud 115200
```

### Simulated mechanism, offsets as JSON lines
```bash
screenshift run --debug --live
```
*/

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod config;
mod control;
mod gui;
mod link;
mod offset;
mod pointer;
mod session;
mod simulator;

use config::AppConfig;
use gui::ScreenshiftGui;
use session::{SessionOptions, ShiftSession};
use shared::TravelClamp;

#[derive(Parser)]
#[command(name = "screenshift")]
#[command(about = "Keep a shifting display in step with the pointer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "screenshift.toml")]
    config: PathBuf,

    /// Run in command-line mode (no GUI)
    #[arg(long)]
    cli: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller headless
    Run {
        /// Serial port path (discovered by prefix when omitted)
        #[arg(short, long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Port name prefix used for discovery
        #[arg(long)]
        prefix: Option<String>,

        /// Print offsets to stdout as JSON lines (disables logging)
        #[arg(long)]
        live: bool,

        /// Drive a simulated mechanism with a sweeping pointer
        #[arg(long)]
        debug: bool,

        /// Cap targets at the end of travel
        #[arg(long)]
        clamp_travel: bool,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "screenshift.toml")]
        output: PathBuf,
    },

    /// List available serial ports
    Ports,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Check if we're in live mode - if so, disable logging completely
    let is_live_mode = matches!(cli.command, Some(Commands::Run { live: true, .. }));

    if !is_live_mode {
        // Initialize logging to stderr to keep stdout clean for JSON lines
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Some(Commands::Run { port, baud, prefix, live, debug, clamp_travel }) => {
            // Flags override whatever the config file says
            let mut config = load_or_default(&cli.config);
            if let Some(port) = port {
                config.link.port_path = Some(port);
            }
            if let Some(baud) = baud {
                config.link.baud_rate = baud;
            }
            if let Some(prefix) = prefix {
                config.link.port_prefix = prefix;
            }
            if clamp_travel {
                config.calibration.travel_clamp = TravelClamp::Enabled;
            }
            config.validate()?;

            run_cli(config, SessionOptions { live_output: live, debug_mode: debug })
        }

        Some(Commands::Config { output }) => {
            // Generate configuration file
            generate_config_file(output)
        }

        Some(Commands::Ports) => list_ports(),

        None => {
            if cli.cli {
                // CLI mode with config file
                let config = AppConfig::load_from_file(&cli.config)?;
                println!("🚀 Starting controller from config: {}", cli.config.display());
                run_cli(config, SessionOptions::default())
            } else {
                // GUI mode
                run_gui(cli.config)
            }
        }
    }
}

/// Config file if it can be read, defaults otherwise
fn load_or_default(path: &Path) -> AppConfig {
    if !path.exists() {
        return AppConfig::new();
    }
    AppConfig::load_from_file(path).unwrap_or_else(|e| {
        eprintln!("⚠️ Failed to load config ({:#}), using defaults", e);
        AppConfig::new()
    })
}

/// Run the controller headless until Ctrl+C or a link failure
fn run_cli(config: AppConfig, options: SessionOptions) -> Result<(), Box<dyn std::error::Error>> {
    // In live mode stdout carries JSON only
    if !options.live_output {
        if options.debug_mode {
            println!("🚀 Starting controller (DEBUG mode)");
            println!("🧪 Simulated mechanism, sweeping pointer");
        } else {
            println!("🚀 Starting controller (CLI mode)");
            match &config.link.port_path {
                Some(path) => println!("🔌 Port: {}", path),
                None => println!("🔍 Port: first match for {}*", config.link.port_prefix),
            }
            println!("📡 Baud rate: {}", config.link.baud_rate);
            println!("🖱️ Pointer: system");
        }
    }

    let live_output = options.live_output;
    let mut session = ShiftSession::new(config, options);

    // Set up Ctrl+C handler
    let running = session.get_running_flag();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, shutting down gracefully...");
        running.store(false, std::sync::atomic::Ordering::SeqCst);
    })?;

    let pointer = session.default_pointer();
    match session.start(pointer) {
        Ok(stats) => {
            if !live_output {
                println!(
                    "✅ Controller stopped ({} frames, {} discarded, {} commands)",
                    stats.frames_received, stats.frames_discarded, stats.commands_sent
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Controller failed: {:#}", e);
            Err(format!("Controller failed: {:#}", e).into())
        }
    }
}

/// Run the GUI application
fn run_gui(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("🖥️ Starting Screenshift GUI");

    let config = AppConfig::load_from_file(&config_path).unwrap_or_else(|_| {
        eprintln!("⚠️ Failed to load config, using defaults");
        AppConfig::new()
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.gui.window_width, config.gui.window_height])
            .with_title("Screenshift"),
        ..Default::default()
    };

    eframe::run_native(
        "Screenshift",
        options,
        Box::new(|cc| Ok(Box::new(ScreenshiftGui::new(config, config_path, cc)))),
    )?;

    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   screenshift --config {}", output_path.display());

    Ok(())
}

/// Print every serial port the system reports
fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = link::describe_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}
