use clap::Parser;
use serde::Serialize;
use serial_transport::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use serial_transport::create_serial_transport;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Send one request over a serial port and read a fixed-length response.",
    long_about = "Writes the given hex payload to the serial port, then waits for exactly \
                  --response-length bytes or until the read timeout elapses."
)]
struct Args {
    /// Serial port name, e.g. /dev/ttyUSB0 or COM3. Overrides the config file.
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate. Overrides the config file.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read budget in milliseconds.
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Write timeout in milliseconds.
    #[arg(long)]
    write_timeout_ms: Option<u64>,

    /// Number of response bytes to read after writing.
    #[arg(short = 'n', long, default_value_t = 0)]
    response_length: usize,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// Payload bytes in hex, e.g. `02 01 00 5A 04` or `0201005A04`.
    #[arg(required = true)]
    payload: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExchangeReport<'a> {
    port: &'a str,
    sent: String,
    received: String,
    received_len: usize,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn parse_hex(parts: &[String]) -> Result<Vec<u8>, String> {
    let digits: String = parts
        .iter()
        .flat_map(|p| p.split(|c: char| c.is_whitespace() || c == ',' || c == ':'))
        .map(|p| p.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    if !digits.is_ascii() {
        return Err(format!("invalid hex payload '{digits}'"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{digits}'"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?.into_config(),
        None => ConfigLoader::load()?.into_config(),
    };

    if let Some(port) = &args.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.serial.options.baud_rate = baud;
    }
    if let Some(ms) = args.read_timeout_ms {
        config.serial.options.read_timeout_ms = ms;
    }
    if let Some(ms) = args.write_timeout_ms {
        config.serial.options.write_timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.logging);

    let port_name = config
        .serial
        .port
        .clone()
        .ok_or("no serial port given; use --port or set [serial].port")?;
    let payload = parse_hex(&args.payload)?;

    let mut transport = create_serial_transport(&port_name, &config.serial.options)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling");
            trigger.cancel();
        }
    });

    info!(port = %port_name, bytes = payload.len(), expected = args.response_length, "exchanging");
    let response = match transport
        .write_and_read(&payload, args.response_length, &cancel)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, state = %transport.state(), "exchange failed");
            return Err(e.into());
        }
    };

    if args.json {
        let report = ExchangeReport {
            port: &port_name,
            sent: to_hex(&payload),
            received: to_hex(&response),
            received_len: response.len(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", to_hex(&response));
    }

    transport.disconnect(None);
    Ok(())
}
