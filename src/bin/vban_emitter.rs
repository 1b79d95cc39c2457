//! Emitter daemon: captures from a local audio backend and streams it out as VBAN audio packets.

use std::net::Ipv4Addr;
use std::process::exit;

use clap::Parser;
use log::{error, info};
use simplelog::{ColorChoice, Config, TerminalMode, TermLogger};

use vband::backend::default_backend_name;
use vband::engine::{AudioEngine, Direction};
use vband::map::AudioMap;
use vband::pipeline;
use vband::socket::{Direction as SocketDirection, Socket, SocketConfig};
use vband::{BitFormat, StreamConfiguration, VbanError};

/// Exits with the negated raw OS errno for an I/O failure, or 1 for any other error kind, per the
/// three-way exit code contract (argument error, generic failure, I/O errno).
fn exit_for_error(err: &VbanError) -> ! {
    match err {
        VbanError::Io(io_err) => exit(-io_err.raw_os_error().unwrap_or(1)),
        _ => exit(1),
    }
}

#[derive(Parser)]
struct Cli {
    /// IP address to send the stream to
    #[arg(short, long)]
    ip: Ipv4Addr,

    /// Port to send to
    #[arg(short, long)]
    port: u16,

    /// Streamname to use
    #[arg(short, long)]
    stream_name: String,

    /// Audio backend to use (alsa, pulseaudio, jack, pipe, file). Default is the first compiled in.
    #[arg(short, long)]
    backend: Option<String>,

    /// Audio device name (not used for jack or pipe)
    #[arg(short, long)]
    device_name: Option<String>,

    /// Audio device sample rate. Default 44100
    #[arg(short = 'r', long)]
    sample_rate: Option<u32>,

    /// Audio device number of channels. Default 2
    #[arg(short = 'n', long)]
    nb_channels: Option<u16>,

    /// Audio device sample format: one of 8I, 16I, 24I, 32I, 32F, 64F, 12I, 10I. Default 16I
    #[arg(short = 'f', long)]
    bit_format: Option<String>,

    /// Channels captured from the device to send, e.g. "1" to send only the left channel
    #[arg(short, long)]
    channels: Option<String>,

    /// Log level: 0=Off 1=Error 2=Warn 3=Info 4=Debug
    #[arg(short, long)]
    log_level: Option<usize>,
}

fn level_filter(log_level: Option<usize>) -> log::LevelFilter {
    match log_level {
        None => log::LevelFilter::Info,
        Some(0) => log::LevelFilter::Off,
        Some(1) => log::LevelFilter::Error,
        Some(2) => log::LevelFilter::Warn,
        Some(3) => log::LevelFilter::Info,
        Some(4) => log::LevelFilter::Debug,
        _ => {
            println!("Log level must be between 0 and 4. Using default.");
            log::LevelFilter::Info
        }
    }
}

fn parse_bit_format(s: &str) -> Result<BitFormat, VbanError> {
    match s {
        "8I" => Ok(BitFormat::Int8),
        "16I" => Ok(BitFormat::Int16),
        "24I" => Ok(BitFormat::Int24),
        "32I" => Ok(BitFormat::Int32),
        "32F" => Ok(BitFormat::Float32),
        "64F" => Ok(BitFormat::Float64),
        "12I" => Ok(BitFormat::Int12),
        "10I" => Ok(BitFormat::Int10),
        other => Err(VbanError::InvalidArgument(format!("unknown bit format '{other}'"))),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            exit(1);
        }
    };

    TermLogger::init(level_filter(cli.log_level), Config::default(), TerminalMode::Stdout, ColorChoice::Auto).unwrap();

    let backend_name = cli.backend.as_deref().unwrap_or_else(|| default_backend_name());
    let device_name = cli.device_name.as_deref().unwrap_or("default");

    let bit_fmt = match cli.bit_format.as_deref().map(parse_bit_format).transpose() {
        Ok(fmt) => fmt.unwrap_or(BitFormat::Int16),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    let cfg = StreamConfiguration {
        nb_channels: cli.nb_channels.unwrap_or(2),
        sample_rate: cli.sample_rate.unwrap_or(44100),
        bit_fmt,
    };

    let socket = match Socket::open(SocketConfig { direction: SocketDirection::Out, ip_address: cli.ip, port: cli.port }) {
        Ok(s) => s,
        Err(e) => {
            error!("could not open socket: {e}");
            exit_for_error(&e);
        }
    };

    let mut engine = match AudioEngine::new(Direction::Out, backend_name, device_name, 1024) {
        Ok(e) => e,
        Err(e) => {
            error!("could not create audio engine: {e}");
            exit(1);
        }
    };

    if let Some(list) = &cli.channels {
        match AudioMap::parse(list) {
            Ok(map) => engine.set_map_config(map),
            Err(e) => {
                error!("invalid channel list '{list}': {e}");
                exit(1);
            }
        }
    }

    pipeline::install_signal_handlers();

    info!("vban_emitter: sending to {}:{} as stream '{}'", cli.ip, cli.port, cli.stream_name);
    match pipeline::emit_loop(&socket, &mut engine, cfg, &cli.stream_name) {
        Ok(()) => exit(0),
        Err(e) => {
            error!("emit loop terminated: {e}");
            exit_for_error(&e);
        }
    }
}
