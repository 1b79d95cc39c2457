//! Receiver daemon: pulls VBAN audio packets off the network and plays them through a local
//! audio backend.

use std::net::Ipv4Addr;
use std::process::exit;

use clap::Parser;
use log::{error, info};
use simplelog::{ColorChoice, Config, TerminalMode, TermLogger};

use vband::backend::{buffer_size_hint_frames, default_backend_name};
use vband::engine::{AudioEngine, Direction};
use vband::map::AudioMap;
use vband::pipeline;
use vband::socket::{Direction as SocketDirection, Socket, SocketConfig};
use vband::encode_streamname;
use vband::VbanError;

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
    /// IP address to accept the stream from
    #[arg(short, long)]
    ip: Ipv4Addr,

    /// Port to listen to
    #[arg(short, long)]
    port: u16,

    /// Streamname to play; packets for any other name are silently dropped
    #[arg(short, long)]
    stream_name: String,

    /// Audio backend to use (alsa, pulseaudio, jack, pipe, file). Default is the first compiled in.
    #[arg(short, long)]
    backend: Option<String>,

    /// Network quality indicator, 0 (low latency) to 4. Default is 1.
    #[arg(short, long)]
    quality: Option<u8>,

    /// Channels from the stream to use, e.g. "2,1" to swap a stereo pair. Default forwards as-is.
    #[arg(short, long)]
    channels: Option<String>,

    /// Audio device name (file path for the file backend, server name for jack, device for alsa)
    #[arg(short, long)]
    device_name: Option<String>,

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

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            exit(1);
        }
    };

    TermLogger::init(level_filter(cli.log_level), Config::default(), TerminalMode::Stdout, ColorChoice::Auto).unwrap();

    let quality = cli.quality.unwrap_or(1);
    let backend_name = cli.backend.as_deref().unwrap_or_else(|| default_backend_name());
    let device_name = cli.device_name.as_deref().unwrap_or("default");

    let socket = match Socket::open(SocketConfig { direction: SocketDirection::In, ip_address: cli.ip, port: cli.port }) {
        Ok(s) => s,
        Err(e) => {
            error!("could not open socket: {e}");
            exit_for_error(&e);
        }
    };

    let buffer_size_hint_frames = buffer_size_hint_frames(quality);
    let mut engine = match AudioEngine::new(Direction::In, backend_name, device_name, buffer_size_hint_frames) {
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

    info!("vban_receiver: listening on {}:{} for stream '{}'", cli.ip, cli.port, cli.stream_name);
    let streamname = encode_streamname(&cli.stream_name);
    match pipeline::receive_loop(&socket, &mut engine, &streamname) {
        Ok(()) => exit(0),
        Err(e) => {
            error!("receive loop terminated: {e}");
            exit_for_error(&e);
        }
    }
}
