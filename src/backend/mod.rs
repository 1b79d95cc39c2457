//! Pluggable audio backend: a capability set of {open, close, write, read} with one concrete
//! implementation per supported audio API, chosen at construction by name.

#[cfg(feature = "alsa")]
pub mod alsa;
pub mod file;
#[cfg(feature = "jack")]
pub mod jack;
pub mod pipe;
#[cfg(feature = "pulseaudio")]
pub mod pulseaudio;

use crate::{StreamConfiguration, VbanError, VBAN_PROTOCOL_MAX_SIZE};

/// Which way samples flow between the device and this process.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Device plays samples this process hands it (receiver side).
    Playback,
    /// Device hands this process samples it captured (emitter side).
    Capture,
}

/// The capability set every concrete backend implements. `open` is idempotent: calling it again
/// while already open closes first, matching the original backends' close-then-reopen-on-format-
/// change behavior.
pub trait Backend {
    fn open(&mut self, direction: Direction, cfg: &StreamConfiguration, buffer_size_hint_frames: usize) -> Result<(), VbanError>;
    fn close(&mut self) -> Result<(), VbanError>;
    fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VbanError>;
}

/// Maps a `-q` quality index (0..=4) to a target buffer size, in frames: a base frame count
/// from `{512, 1024, 2048, 4096, 8192}` tripled, then floored at the frame-equivalent of
/// `VBAN_PROTOCOL_MAX_SIZE` for a minimal single-channel 8-bit stream (one byte per frame), so
/// the buffer can never be smaller than one maximal packet's worth of frames.
pub fn buffer_size_hint_frames(quality: u8) -> usize {
    let base = match quality {
        0 => 512,
        1 => 1024,
        2 => 2048,
        3 => 4096,
        4 => 8192,
        _ => 1024,
    };

    (base * 3).max(VBAN_PROTOCOL_MAX_SIZE)
}

/// A concrete backend, selected by name at construction and held behind this enum rather than
/// `Box<dyn Backend>` so the callback backend's ring buffer stays reachable without vtable
/// indirection on the hot path.
#[derive(Debug)]
pub enum BackendHandle {
    #[cfg(feature = "alsa")]
    Alsa(alsa::AlsaBackend),
    #[cfg(feature = "pulseaudio")]
    PulseAudio(pulseaudio::PulseAudioBackend),
    #[cfg(feature = "jack")]
    Jack(jack::JackBackend),
    Pipe(pipe::PipeBackend),
    File(file::FileBackend),
}

/// The first compiled-in backend, in the order a full build would try them, so a binary with no
/// `-b` flag still works on a build that selected only a subset of backend features.
pub fn default_backend_name() -> &'static str {
    #[cfg(feature = "alsa")]
    return "alsa";
    #[cfg(all(not(feature = "alsa"), feature = "pulseaudio"))]
    return "pulseaudio";
    #[cfg(all(not(feature = "alsa"), not(feature = "pulseaudio"), feature = "jack"))]
    return "jack";
    #[cfg(all(not(feature = "alsa"), not(feature = "pulseaudio"), not(feature = "jack")))]
    return "pipe";
}

impl BackendHandle {
    /// Constructs the named backend. `device_name` is passed through unchanged; its meaning is
    /// backend-specific (an ALSA PCM name, a PulseAudio sink/source name, a JACK client name, a
    /// FIFO path, or a file path/`-` for stdio).
    pub fn by_name(name: &str, device_name: &str) -> Result<Self, VbanError> {
        match name {
            #[cfg(feature = "alsa")]
            "alsa" => Ok(BackendHandle::Alsa(alsa::AlsaBackend::new(device_name))),
            #[cfg(feature = "pulseaudio")]
            "pulseaudio" => Ok(BackendHandle::PulseAudio(pulseaudio::PulseAudioBackend::new(device_name))),
            #[cfg(feature = "jack")]
            "jack" => Ok(BackendHandle::Jack(jack::JackBackend::new(device_name))),
            "pipe" => Ok(BackendHandle::Pipe(pipe::PipeBackend::new(device_name))),
            "file" => Ok(BackendHandle::File(file::FileBackend::new(device_name))),
            other => Err(VbanError::InvalidArgument(format!("unknown backend '{other}'"))),
        }
    }
}

impl Backend for BackendHandle {
    fn open(&mut self, direction: Direction, cfg: &StreamConfiguration, buffer_size_hint_frames: usize) -> Result<(), VbanError> {
        match self {
            #[cfg(feature = "alsa")]
            BackendHandle::Alsa(b) => b.open(direction, cfg, buffer_size_hint_frames),
            #[cfg(feature = "pulseaudio")]
            BackendHandle::PulseAudio(b) => b.open(direction, cfg, buffer_size_hint_frames),
            #[cfg(feature = "jack")]
            BackendHandle::Jack(b) => b.open(direction, cfg, buffer_size_hint_frames),
            BackendHandle::Pipe(b) => b.open(direction, cfg, buffer_size_hint_frames),
            BackendHandle::File(b) => b.open(direction, cfg, buffer_size_hint_frames),
        }
    }

    fn close(&mut self) -> Result<(), VbanError> {
        match self {
            #[cfg(feature = "alsa")]
            BackendHandle::Alsa(b) => b.close(),
            #[cfg(feature = "pulseaudio")]
            BackendHandle::PulseAudio(b) => b.close(),
            #[cfg(feature = "jack")]
            BackendHandle::Jack(b) => b.close(),
            BackendHandle::Pipe(b) => b.close(),
            BackendHandle::File(b) => b.close(),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError> {
        match self {
            #[cfg(feature = "alsa")]
            BackendHandle::Alsa(b) => b.write(buf),
            #[cfg(feature = "pulseaudio")]
            BackendHandle::PulseAudio(b) => b.write(buf),
            #[cfg(feature = "jack")]
            BackendHandle::Jack(b) => b.write(buf),
            BackendHandle::Pipe(b) => b.write(buf),
            BackendHandle::File(b) => b.write(buf),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VbanError> {
        match self {
            #[cfg(feature = "alsa")]
            BackendHandle::Alsa(b) => b.read(buf),
            #[cfg(feature = "pulseaudio")]
            BackendHandle::PulseAudio(b) => b.read(buf),
            #[cfg(feature = "jack")]
            BackendHandle::Jack(b) => b.read(buf),
            BackendHandle::Pipe(b) => b.read(buf),
            BackendHandle::File(b) => b.read(buf),
        }
    }
}
