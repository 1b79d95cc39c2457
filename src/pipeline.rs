//! The two daemon loops: receive (socket → codec → engine → backend) and emit (backend →
//! engine → codec → socket), plus the process-wide shutdown flag both poll.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, warn};

use crate::backend::Backend;
use crate::engine::AudioEngine;
use crate::socket::Socket;
use crate::{encode_streamname, packet, StreamConfiguration, VbanError, VBAN_HEADER_SIZE, VBAN_PROTOCOL_MAX_SIZE, VBAN_STREAM_NAME_SIZE};

static RUN: AtomicBool = AtomicBool::new(true);

/// Signal-safe handler: stores into the atomic and nothing else, matching the original C
/// implementation's `signalHandler` (which only ever did `MainRun = 0`).
extern "C" fn handle_signal(_signum: libc::c_int) {
    RUN.store(false, Ordering::Relaxed);
}

/// Installs `SIGINT`/`SIGTERM` handlers that clear the run flag. Call once from `main()`.
pub fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

pub fn is_running() -> bool {
    RUN.load(Ordering::Relaxed)
}

/// Exposed so a binary can trigger shutdown outside of a delivered signal (e.g. `vban_sendtext`
/// running as a one-shot needs no loop at all, but tests exercise this directly).
pub fn request_shutdown() {
    RUN.store(false, Ordering::Relaxed);
}

#[cfg(test)]
fn reset_run_flag_for_test() {
    RUN.store(true, Ordering::Relaxed);
}

/// `loop { read a datagram; validate; reconfigure if needed; write to the device }` until the
/// run flag clears or the socket fails outright.
pub fn receive_loop<B: Backend>(socket: &Socket, engine: &mut AudioEngine<B>, streamname: &[u8; VBAN_STREAM_NAME_SIZE]) -> Result<(), VbanError> {
    let mut buffer = vec![0u8; VBAN_PROTOCOL_MAX_SIZE];

    while is_running() {
        let n = match socket.read(&mut buffer) {
            Ok(n) => n,
            Err(e) => {
                error!("pipeline: socket read failed, terminating: {e}");
                return Err(e);
            }
        };

        match packet::validate(streamname, &buffer[..n]) {
            Ok(()) => {}
            Err(VbanError::WrongStream) => {
                warn!("pipeline: packet for a different stream, skipping");
                continue;
            }
            Err(e) => {
                warn!("pipeline: dropping invalid packet: {e}");
                continue;
            }
        }

        let cfg = packet::get_stream_config(&buffer[..n]);
        if let Err(e) = engine.set_stream_config(cfg) {
            warn!("pipeline: could not reconfigure device, dropping packet: {e}");
            continue;
        }

        let payload = &buffer[VBAN_HEADER_SIZE..n];
        if let Err(e) = engine.write(payload) {
            error!("pipeline: device write failed, terminating: {e}");
            return Err(e);
        }
    }

    debug!("pipeline: receive loop exiting");
    Ok(())
}

/// `audio.set_stream_config(cfg); init_header; loop { read from the device; set_new_content;
/// write to the socket }` until the run flag clears or the device read fails.
pub fn emit_loop<B: Backend>(
    socket: &Socket,
    engine: &mut AudioEngine<B>,
    cfg: StreamConfiguration,
    streamname: &str,
) -> Result<(), VbanError> {
    let mut buffer = vec![0u8; VBAN_PROTOCOL_MAX_SIZE];

    engine.set_stream_config(cfg)?;
    let wire_cfg = engine.wire_stream_config().expect("set_stream_config just succeeded");
    packet::init_header(&mut buffer, &wire_cfg, streamname)?;
    let max = packet::max_payload_size(&buffer);
    let streamname_field = encode_streamname(streamname);

    while is_running() {
        let size = match engine.read(&mut buffer[VBAN_HEADER_SIZE..VBAN_HEADER_SIZE + max]) {
            Ok(n) => n,
            Err(e) => {
                error!("pipeline: device read failed, terminating: {e}");
                return Err(e);
            }
        };

        if size == 0 {
            continue;
        }

        packet::set_new_content(&mut buffer, size)?;
        packet::validate(&streamname_field, &buffer[..VBAN_HEADER_SIZE + size])?;

        if let Err(e) = socket.write(&buffer[..VBAN_HEADER_SIZE + size]) {
            error!("pipeline: socket write failed, terminating: {e}");
            return Err(e);
        }
    }

    debug!("pipeline: emit loop exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{self, BackendHandle};
    use crate::map::AudioMap;
    use crate::socket::{Direction as SocketDirection, SocketConfig};
    use crate::BitFormat;
    use std::net::Ipv4Addr;

    #[derive(Default)]
    struct ScriptedBackend {
        write_calls: Vec<Vec<u8>>,
        read_script: Vec<Vec<u8>>,
    }

    impl Backend for ScriptedBackend {
        fn open(&mut self, _direction: backend::Direction, _cfg: &StreamConfiguration, _hint: usize) -> Result<(), VbanError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), VbanError> {
            Ok(())
        }
        fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError> {
            self.write_calls.push(buf.to_vec());
            Ok(buf.len())
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, VbanError> {
            if let Some(chunk) = self.read_script.pop() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            } else {
                request_shutdown();
                Ok(0)
            }
        }
    }

    #[test]
    fn run_flag_toggles() {
        reset_run_flag_for_test();
        assert!(is_running());
        request_shutdown();
        assert!(!is_running());
        reset_run_flag_for_test();
    }

    #[test]
    fn receive_loop_exits_immediately_once_the_run_flag_is_cleared() {
        reset_run_flag_for_test();

        let cfg = StreamConfiguration { nb_channels: 2, sample_rate: 48000, bit_fmt: BitFormat::Int16 };
        let mut engine = AudioEngine::with_backend(crate::engine::Direction::In, ScriptedBackend::default(), 1024);
        engine.set_stream_config(cfg).unwrap();

        let socket = Socket::open(SocketConfig { direction: SocketDirection::In, ip_address: Ipv4Addr::new(127, 0, 0, 1), port: 0 }).unwrap();
        let streamname = encode_streamname("Stream1");

        // Clearing the flag before entering the loop proves it is checked up front, without
        // needing a peer to feed the socket a packet.
        request_shutdown();
        let result = receive_loop(&socket, &mut engine, &streamname);
        assert!(result.is_ok());
        reset_run_flag_for_test();
    }

    #[test]
    fn emit_loop_forwards_one_packet_then_stops_when_the_device_runs_dry() {
        reset_run_flag_for_test();

        let cfg = StreamConfiguration { nb_channels: 2, sample_rate: 48000, bit_fmt: BitFormat::Int16 };
        let mut backend = ScriptedBackend::default();
        backend.read_script.push(vec![0u8; cfg.frame_size() * 4]); // one batch; the next read requests shutdown
        let mut engine = AudioEngine::with_backend(crate::engine::Direction::Out, backend, 1024);

        let out_socket = Socket::open(SocketConfig { direction: crate::socket::Direction::Out, ip_address: Ipv4Addr::new(127, 0, 0, 1), port: 0 }).unwrap();

        let result = emit_loop(&out_socket, &mut engine, cfg, "Stream1");
        assert!(result.is_ok());
        reset_run_flag_for_test();
    }

    #[test]
    fn map_config_is_accepted_before_stream_config() {
        reset_run_flag_for_test();
        let mut engine = AudioEngine::with_backend(crate::engine::Direction::In, ScriptedBackend::default(), 1024);
        engine.set_map_config(AudioMap::from_indices(vec![0, 1]));
        let cfg = StreamConfiguration { nb_channels: 2, sample_rate: 44100, bit_fmt: BitFormat::Int16 };
        assert!(engine.set_stream_config(cfg).is_ok());
        reset_run_flag_for_test();
    }

    #[test]
    fn backend_handle_by_name_is_reachable_from_pipeline_module() {
        assert!(BackendHandle::by_name("pipe", "").is_ok());
    }
}
