//! The error kinds propagated across the packet codec, audio backends, engine, and pipeline.

use thiserror::Error;

/// Unified error type for the crate. Variant names track the VBAN spec's error-kind taxonomy so a
/// caller can match on `Malformed` vs. `WrongStream` vs. `UnsupportedProtocol` without parsing a
/// message string.
#[derive(Debug, Error)]
pub enum VbanError {
    /// Null/malformed configuration at an API boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Packet fails structural validation (size, fourcc, reserved bit, payload-size mismatch).
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// Valid packet, but for a different streamname than configured.
    #[error("packet for a different stream")]
    WrongStream,

    /// Non-AUDIO sub-protocol on the receive side, or a non-PCM codec.
    #[error("unsupported protocol or codec: {0}")]
    UnsupportedProtocol(String),

    /// Backend open/write/read failed.
    #[error("audio device error: {0}")]
    DeviceError(String),

    /// Socket failure other than signal-interrupt.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Short write/read on the callback backend, or a recoverable ALSA underrun.
    #[error("transient condition: {0}")]
    Transient(String),
}
