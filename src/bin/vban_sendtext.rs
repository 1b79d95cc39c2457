//! One-shot sender: emits a single TXT sub-protocol datagram and exits.

use std::net::Ipv4Addr;
use std::process::exit;

use clap::Parser;
use log::error;
use simplelog::{ColorChoice, Config, TerminalMode, TermLogger};

use vband::packet;
use vband::socket::{Direction, Socket, SocketConfig};
use vband::{VbanError, VBAN_DATA_MAX_SIZE, VBAN_HEADER_SIZE, VBAN_PROTOCOL_MAX_SIZE};

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

    /// Data bitrate indicator. Default 0 (no special bitrate)
    #[arg(short, long)]
    bps: Option<u8>,

    /// Subchannel identification. Default 0
    #[arg(short = 'n', long)]
    ident: Option<u8>,

    /// Text format: 0=ASCII 1=UTF8 2=WCHAR 240=USER. Default 1
    #[arg(short = 'f', long)]
    format: Option<u8>,

    /// Log level: 0=Off 1=Error 2=Warn 3=Info 4=Debug
    #[arg(short, long)]
    log_level: Option<usize>,

    /// Message to send
    message: String,
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

    if cli.message.len() > VBAN_DATA_MAX_SIZE - 1 {
        error!("message too long, max length is {}", VBAN_DATA_MAX_SIZE - 1);
        exit(1);
    }

    let socket = match Socket::open(SocketConfig { direction: Direction::Out, ip_address: cli.ip, port: cli.port }) {
        Ok(s) => s,
        Err(e) => {
            error!("could not open socket: {e}");
            exit_for_error(&e);
        }
    };

    let mut buffer = vec![0u8; VBAN_PROTOCOL_MAX_SIZE];
    if let Err(e) = packet::init_txt_header(
        &mut buffer,
        cli.bps.unwrap_or(0),
        cli.ident.unwrap_or(0),
        cli.format.unwrap_or(1),
        &cli.stream_name,
    ) {
        error!("could not build header: {e}");
        exit(1);
    }

    let message_bytes = cli.message.as_bytes();
    let total = VBAN_HEADER_SIZE + message_bytes.len();
    buffer[VBAN_HEADER_SIZE..total].copy_from_slice(message_bytes);

    match socket.write(&buffer[..total]) {
        Ok(_) => exit(0),
        Err(e) => {
            error!("could not send message: {e}");
            exit_for_error(&e);
        }
    }
}
