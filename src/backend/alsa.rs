//! ALSA backend: one PCM device opened for either playback or capture, generalized from a fixed
//! stereo/16-bit device to the stream's actual channel count and bit format.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction as AlsaDirection, ValueOr};
use log::{debug, error, trace, warn};

use crate::backend::{Backend, Direction};
use crate::{BitFormat, StreamConfiguration, VbanError};

fn alsa_format(bit_fmt: BitFormat) -> Result<Format, VbanError> {
    match bit_fmt {
        BitFormat::Int8 => Ok(Format::S8),
        BitFormat::Int16 => Ok(Format::s16()),
        BitFormat::Int24 => Ok(Format::S243LE),
        BitFormat::Int32 => Ok(Format::s32()),
        BitFormat::Float32 => Ok(Format::float()),
        BitFormat::Float64 => Ok(Format::float64()),
        other => Err(VbanError::UnsupportedProtocol(format!("{other:?} has no ALSA sample format"))),
    }
}

pub struct AlsaBackend {
    device: String,
    pcm: Option<PCM>,
}

impl AlsaBackend {
    pub fn new(device: &str) -> Self {
        AlsaBackend { device: device.to_string(), pcm: None }
    }
}

impl Backend for AlsaBackend {
    fn open(&mut self, direction: Direction, cfg: &StreamConfiguration, buffer_size_hint_frames: usize) -> Result<(), VbanError> {
        self.close()?;

        let alsa_dir = match direction {
            Direction::Playback => AlsaDirection::Playback,
            Direction::Capture => AlsaDirection::Capture,
        };

        let pcm = PCM::new(&self.device, alsa_dir, false)
            .map_err(|e| VbanError::DeviceError(format!("could not open alsa device '{}': {e}", self.device)))?;

        {
            let hwp = HwParams::any(&pcm)
                .map_err(|e| VbanError::DeviceError(format!("could not get alsa hw params: {e}")))?;
            hwp.set_channels(cfg.nb_channels as u32)
                .map_err(|e| VbanError::DeviceError(format!("could not set channel count: {e}")))?;
            hwp.set_rate(cfg.sample_rate, ValueOr::Nearest)
                .map_err(|e| VbanError::DeviceError(format!("could not set sample rate: {e}")))?;
            hwp.set_format(alsa_format(cfg.bit_fmt)?)
                .map_err(|e| VbanError::DeviceError(format!("could not set sample format: {e}")))?;
            hwp.set_access(Access::RWInterleaved)
                .map_err(|e| VbanError::DeviceError(format!("could not set access mode: {e}")))?;
            hwp.set_buffer_size_near(buffer_size_hint_frames as i64)
                .map_err(|e| VbanError::DeviceError(format!("could not set buffer size: {e}")))?;
            pcm.hw_params(&hwp)
                .map_err(|e| VbanError::DeviceError(format!("could not attach hw params: {e}")))?;
        }

        if let Err(errno) = pcm.start() {
            warn!("alsa: error starting pcm: {errno}");
            let _ = pcm.drain();
            if let Err(errno2) = pcm.recover(errno.errno(), true) {
                error!("alsa: could not recover from failed start: {errno2}");
            }
        }

        debug!("alsa: opened '{}' with {} channels at {} Hz", self.device, cfg.nb_channels, cfg.sample_rate);
        self.pcm = Some(pcm);
        Ok(())
    }

    fn close(&mut self) -> Result<(), VbanError> {
        self.pcm = None;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError> {
        let pcm = self.pcm.as_ref().ok_or_else(|| VbanError::DeviceError("alsa backend not open".into()))?;
        let io = pcm.io_bytes();

        match io.writei(buf) {
            Ok(bytes) => {
                trace!("alsa: wrote {bytes} bytes");
                Ok(bytes)
            }
            Err(errno) => {
                warn!("alsa: write failed: {errno}, attempting recovery");
                pcm.recover(errno.errno(), true)
                    .map_err(|e| VbanError::DeviceError(format!("alsa write recovery failed: {e}")))?;
                io.writei(buf).map_err(|e| VbanError::Transient(format!("alsa write failed after recovery: {e}")))
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VbanError> {
        let pcm = self.pcm.as_ref().ok_or_else(|| VbanError::DeviceError("alsa backend not open".into()))?;
        let io = pcm.io_bytes();

        match io.readi(buf) {
            Ok(bytes) => {
                trace!("alsa: read {bytes} bytes");
                Ok(bytes)
            }
            Err(errno) => {
                warn!("alsa: read failed: {errno}, attempting recovery");
                pcm.recover(errno.errno(), true)
                    .map_err(|e| VbanError::DeviceError(format!("alsa read recovery failed: {e}")))?;
                io.readi(buf).map_err(|e| VbanError::Transient(format!("alsa read failed after recovery: {e}")))
            }
        }
    }
}
