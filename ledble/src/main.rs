//! Command line control for BLE RGB light controllers
//!
//! Finds the configured controller, connects, and sends power or color
//! commands to it.

mod config;
mod logging;

use std::time::Duration;

use clap::{Parser, Subcommand};
use ledble_controller::ble::BtleBluetooth;
use ledble_controller::{
    AddressParseError, DeviceAddress, SendError, Session, SessionError, SessionState,
    TransportError,
};
use ledble_proto::{Command, ParseColorError, Rgb};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::warn;

use crate::config::{Config, ConfigError};

#[derive(Parser)]
#[command(name = "ledble")]
#[command(about = "Control a BLE RGB light controller")]
struct Cli {
    /// Device address, e.g. 24:71:89:1D:64:52 (overrides config.json)
    #[arg(short, long, global = true)]
    address: Option<String>,
    /// Give up finding and connecting to the device after this many seconds
    #[arg(short, long, global = true)]
    timeout: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn the light on
    On,
    /// Turn the light off
    Off,
    /// Set a steady color
    Color {
        /// Hex color, e.g. ff8000
        hex: String,
    },
    /// Set a steady color from hue, saturation and value (each 0.0 to 1.0)
    Hsv {
        hue: f64,
        saturation: f64,
        value: f64,
    },
    /// Read hex colors from stdin and send each one
    Prompt,
    /// Connect and disconnect to clear a stuck connection
    Unstick,
    /// Show the effective configuration
    Config {
        /// Write it to config.json
        #[arg(long)]
        save: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Address(#[from] AddressParseError),
    #[error(transparent)]
    Color(#[from] ParseColorError),
    #[error("bluetooth unavailable: {0}")]
    Bluetooth(#[from] TransportError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("device not ready after {0}s")]
    Timeout(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let home = config::ledble_home()?;
    let mut config = Config::load(&home)?;
    if let Some(address) = cli.address {
        config.address = address;
    }
    if cli.timeout.is_some() {
        config.timeout_secs = cli.timeout;
    }

    logging::init_logger(&config.log_level);
    let address: DeviceAddress = config.address.parse()?;

    match cli.command {
        Commands::On => send_one(&config, address, Command::power(true)).await,
        Commands::Off => send_one(&config, address, Command::power(false)).await,
        Commands::Color { hex } => {
            let rgb = Rgb::from_hex(&hex)?;
            send_one(&config, address, rgb.into_command()).await
        }
        Commands::Hsv {
            hue,
            saturation,
            value,
        } => {
            let rgb = Rgb::from_hsv(hue, saturation, value);
            send_one(&config, address, rgb.into_command()).await
        }
        Commands::Prompt => {
            let session = open(&config, address).await?;
            let result = prompt(&session).await;
            settle(result, session.close().await)
        }
        Commands::Unstick => {
            let bluetooth = BtleBluetooth::default_adapter().await?;
            with_timeout(config.timeout_secs, ledble_controller::unstick(bluetooth, address)).await?;
            println!("Bluetooth connection is no longer stuck.");
            Ok(())
        }
        Commands::Config { save } => {
            println!("home: {}", home.display());
            println!("address: {}", address);
            match config.timeout_secs {
                Some(secs) => println!("timeout: {secs}s"),
                None => println!("timeout: none"),
            }
            println!("log level: {}", config.log_level);
            if save {
                let path = config.save(&home)?;
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
    }
}

async fn send_one(config: &Config, address: DeviceAddress, command: Command) -> Result<(), CliError> {
    let session = open(config, address).await?;
    let sent = session.send(&command).await.map_err(CliError::from);
    settle(sent, session.close().await)
}

/// The command's own error comes first; a failed close is reported only after
/// a successful command
fn settle(outcome: Result<(), CliError>, closed: Result<(), SessionError>) -> Result<(), CliError> {
    outcome?;
    Ok(closed?)
}

/// Start a session, cancelling it if it is not ready within the configured timeout
async fn open(config: &Config, address: DeviceAddress) -> Result<Session<BtleBluetooth>, CliError> {
    let bluetooth = BtleBluetooth::default_adapter().await?;
    let mut session = Session::new(bluetooth, address);
    tokio::spawn(report_progress(session.subscribe()));

    let watchdog = config.timeout_secs.map(|secs| {
        let abort = session.abort_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            abort.cancel();
        })
    });

    let started = session.start().await;
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }

    let Err(e) = started else {
        return Ok(session);
    };
    if let Err(close) = session.close().await {
        warn!(error = %close, "closing failed session");
    }
    match (e, config.timeout_secs) {
        (SessionError::Cancelled, Some(secs)) => Err(CliError::Timeout(secs)),
        (e, _) => Err(e.into()),
    }
}

async fn with_timeout<T>(
    secs: Option<u64>,
    fut: impl std::future::Future<Output = Result<T, SessionError>>,
) -> Result<T, CliError> {
    match secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| CliError::Timeout(secs))?
            .map_err(CliError::from),
        None => Ok(fut.await?),
    }
}

async fn report_progress(mut states: watch::Receiver<SessionState>) {
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        match state {
            SessionState::Discovering => println!("Scanning for device..."),
            SessionState::DeviceAcquired => println!("Connecting to device..."),
            SessionState::Ready => println!("Connected"),
            _ => {}
        }
    }
}

/// Send one color per line until stdin closes. Bad input and failed writes are
/// reported and skipped; a session failure ends the loop.
async fn prompt(session: &Session<BtleBluetooth>) -> Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"Enter a hex color: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let rgb = match Rgb::from_hex(line) {
            Ok(rgb) => rgb,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match session.send(&rgb.into_command()).await {
            Ok(()) => {}
            Err(e @ (SendError::Encode(_) | SendError::Transport(_))) => eprintln!("{e}"),
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "ledble",
            "color",
            "ff8000",
            "--address",
            "AA:BB:CC:DD:EE:FF",
            "-t",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(cli.timeout, Some(5));
        assert!(matches!(cli.command, Commands::Color { ref hex } if hex == "ff8000"));
    }

    #[test]
    fn command_error_is_reported_before_close_error() {
        let closed = || Err(SessionError::Disconnect(TransportError::new("link busy")));

        let err = settle(Err(SendError::Disconnected.into()), closed()).unwrap_err();
        assert!(matches!(err, CliError::Send(SendError::Disconnected)));

        let err = settle(Ok(()), closed()).unwrap_err();
        assert!(matches!(err, CliError::Session(SessionError::Disconnect(_))));

        assert!(settle(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn hsv_takes_three_values() {
        let cli = Cli::try_parse_from(["ledble", "hsv", "0.5", "1", "1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Hsv { hue, saturation, value } if hue == 0.5 && saturation == 1.0 && value == 1.0
        ));
        assert!(Cli::try_parse_from(["ledble", "hsv", "0.5"]).is_err());
    }
}
