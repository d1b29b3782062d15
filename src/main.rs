use clap::{Parser, Subcommand};
use drone_tracker::api::{TrackerEvent, TrackingSession};
use drone_tracker::hardware::{
    CommandSink, NullCommandSink, SerialCommandSink, SerialRangingLink,
};
use drone_tracker::{SerialSettings, TelemetryPacket, TrackerConfig};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "drone_tracker")]
#[command(about = "Serial multilateration tracker with boundary events", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track until Enter is pressed (emergency stop) or the link fails
    Run {
        /// JSON configuration file (defaults to the built-in field layout)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Ranging serial port, overrides the configuration
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
        /// Serial radio bridge for outbound opcodes
        #[arg(long, value_name = "PORT")]
        command_port: Option<String>,
    },
    /// Print the default configuration as JSON
    DefaultConfig,
    /// Decode one peripheral telemetry packet given as hex
    Telemetry {
        #[arg(value_name = "HEX")]
        hex: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Run {
            config,
            port,
            baud,
            command_port,
        } => {
            let mut config = match config {
                Some(path) => TrackerConfig::from_file(path)?,
                None => TrackerConfig::default(),
            };
            if let Some(port) = port {
                config.serial.port = port;
            }
            if let Some(baud) = baud {
                config.serial.baud_rate = baud;
            }
            if let Some(port) = command_port {
                let base = config.command_link.take().unwrap_or_default();
                config.command_link = Some(SerialSettings { port, ..base });
            }
            run(&config)
        }
        Command::DefaultConfig => {
            println!("{}", TrackerConfig::default().to_json_pretty()?);
            Ok(())
        }
        Command::Telemetry { hex } => {
            println!("{}", TelemetryPacket::decode_hex(&hex)?);
            Ok(())
        }
    }
}

fn run(config: &TrackerConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let commands: Box<dyn CommandSink> = match &config.command_link {
        Some(settings) => Box::new(SerialCommandSink::open(settings)?),
        None => Box::new(NullCommandSink),
    };
    let link = SerialRangingLink::open(&config.serial)?;

    let mut session = TrackingSession::new(config, Box::new(link), commands)?;
    session.on_position(Box::new(|update| {
        if update.fresh {
            let p = update.position;
            println!("Position: [{:.2}, {:.2}, {:.2}]", p.x, p.y, p.z);
        }
    }));
    session.on_event(Box::new(|event| match event {
        TrackerEvent::Threshold(event) => println!("{}", event.label),
        TrackerEvent::LinkFailed(err) => eprintln!("Ranging link failed: {}", err),
    }));

    let (stop_tx, stop_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        // EOF on stdin is not a stop request
        if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                let _ = stop_tx.send(());
            }
        }
    });

    let handle = session.start()?;
    println!("Tracking on {}. Press Enter to stop.", config.serial.port);

    while handle.is_running() {
        match stop_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(()) => {
                log::info!("Emergency stop requested");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                thread::sleep(Duration::from_millis(100));
            }
        }
    }

    let tracker = handle.stop()?;
    let stats = tracker.stats();
    println!(
        "Frames: {}  Updates: {}  Skipped: {}  Events: {}  Commands sent: {}  Read errors: {}",
        stats.frames,
        stats.updates,
        stats.skipped(),
        stats.events,
        stats.commands_sent,
        stats.read_errors_skipped
    );
    for (name, count) in tracker.detector().counts() {
        println!("  {}: {}", name, count);
    }
    Ok(())
}
