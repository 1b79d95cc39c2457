//! PulseAudio backend, built on the blocking `Simple` API — the closest match to ALSA's
//! synchronous read/write model, so it plugs into the pipeline loop the same way.

use libpulse_binding::sample::{Format as PulseFormat, Spec};
use libpulse_binding::stream::Direction as PulseDirection;
use libpulse_simple_binding::Simple;
use log::{debug, trace};

use crate::backend::{Backend, Direction};
use crate::{BitFormat, StreamConfiguration, VbanError};

fn pulse_format(bit_fmt: BitFormat) -> Result<PulseFormat, VbanError> {
    match bit_fmt {
        BitFormat::Int16 => Ok(PulseFormat::S16le),
        BitFormat::Int24 => Ok(PulseFormat::S24le),
        BitFormat::Int32 => Ok(PulseFormat::S32le),
        BitFormat::Float32 => Ok(PulseFormat::F32le),
        BitFormat::Int8 => Ok(PulseFormat::U8),
        other => Err(VbanError::UnsupportedProtocol(format!("{other:?} has no PulseAudio sample format"))),
    }
}

pub struct PulseAudioBackend {
    device: String,
    simple: Option<Simple>,
}

impl PulseAudioBackend {
    pub fn new(device: &str) -> Self {
        PulseAudioBackend { device: device.to_string(), simple: None }
    }
}

impl Backend for PulseAudioBackend {
    fn open(&mut self, direction: Direction, cfg: &StreamConfiguration, _buffer_size_hint_frames: usize) -> Result<(), VbanError> {
        self.close()?;

        let spec = Spec {
            format: pulse_format(cfg.bit_fmt)?,
            channels: cfg.nb_channels.min(u8::MAX as u16) as u8,
            rate: cfg.sample_rate,
        };
        if !spec.is_valid() {
            return Err(VbanError::InvalidArgument(format!("invalid pulseaudio spec for {cfg:?}")));
        }

        let pulse_dir = match direction {
            Direction::Playback => PulseDirection::Playback,
            Direction::Capture => PulseDirection::Record,
        };

        let device = if self.device.is_empty() { None } else { Some(self.device.as_str()) };

        let simple = Simple::new(
            None,
            "vband",
            pulse_dir,
            device,
            "vban stream",
            &spec,
            None,
            None,
        )
        .map_err(|e| VbanError::DeviceError(format!("could not open pulseaudio stream: {e}")))?;

        debug!("pulseaudio: opened '{}' with {} channels at {} Hz", self.device, cfg.nb_channels, cfg.sample_rate);
        self.simple = Some(simple);
        Ok(())
    }

    fn close(&mut self) -> Result<(), VbanError> {
        self.simple = None;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError> {
        let simple = self.simple.as_ref().ok_or_else(|| VbanError::DeviceError("pulseaudio backend not open".into()))?;
        simple.write(buf).map_err(|e| VbanError::DeviceError(format!("pulseaudio write failed: {e}")))?;
        trace!("pulseaudio: wrote {} bytes", buf.len());
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VbanError> {
        let simple = self.simple.as_ref().ok_or_else(|| VbanError::DeviceError("pulseaudio backend not open".into()))?;
        simple.read(buf).map_err(|e| VbanError::DeviceError(format!("pulseaudio read failed: {e}")))?;
        trace!("pulseaudio: read {} bytes", buf.len());
        Ok(buf.len())
    }
}
