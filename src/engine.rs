//! Audio engine: owns the current stream configuration and channel map, decides when the
//! backend needs reopening, and performs the channel remap between the wire layout and the
//! device layout.

use log::{error, info};

use crate::backend::{self, Backend, BackendHandle};
use crate::map::{self, AudioMap};
use crate::{StreamConfiguration, VbanError, VBAN_DATA_MAX_SIZE};

/// Which way audio flows through this engine: `In` takes wire packets and plays them (the
/// receiver), `Out` captures from a device and produces wire packets (the emitter).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    In,
    Out,
}

/// Generic over the backend so engine logic can be exercised against an in-memory fake in tests
/// without touching a real audio device; production code uses the default `BackendHandle`.
pub struct AudioEngine<B: Backend = BackendHandle> {
    direction: Direction,
    buffer_size_hint_frames: usize,
    current_stream: Option<StreamConfiguration>,
    map: Option<AudioMap>,
    backend: B,
    scratch: Vec<u8>,
}

impl AudioEngine<BackendHandle> {
    pub fn new(direction: Direction, backend_name: &str, device_name: &str, buffer_size_hint_frames: usize) -> Result<Self, VbanError> {
        let backend = BackendHandle::by_name(backend_name, device_name)?;
        Ok(AudioEngine::with_backend(direction, backend, buffer_size_hint_frames))
    }
}

impl<B: Backend> AudioEngine<B> {
    pub fn with_backend(direction: Direction, backend: B, buffer_size_hint_frames: usize) -> Self {
        AudioEngine { direction, buffer_size_hint_frames, current_stream: None, map: None, backend, scratch: vec![0u8; VBAN_DATA_MAX_SIZE] }
    }

    pub fn current_stream(&self) -> Option<StreamConfiguration> {
        self.current_stream
    }

    /// The stream configuration as it appears on the wire: unchanged for `In` (the wire is the
    /// source of truth there); overridden to the map's output channel count for `Out` when a map
    /// is active, since the map narrows/reorders the captured device channels onto fewer wire
    /// channels.
    pub fn wire_stream_config(&self) -> Option<StreamConfiguration> {
        self.current_stream.map(|stream| {
            let mut wire = stream;
            if self.direction == Direction::Out {
                if let Some(map) = &self.map {
                    wire.nb_channels = map.len() as u16;
                }
            }
            wire
        })
    }

    fn device_config(&self, stream: &StreamConfiguration) -> StreamConfiguration {
        let mut device = *stream;
        if self.direction == Direction::In {
            if let Some(map) = &self.map {
                device.nb_channels = map.len() as u16;
            }
        }
        device
    }

    /// Reopens the backend only if `cfg` differs from the cached configuration. On open failure
    /// the cache is cleared so the next packet retries from a clean `UNCONFIGURED` state.
    pub fn set_stream_config(&mut self, cfg: StreamConfiguration) -> Result<(), VbanError> {
        if self.current_stream == Some(cfg) {
            return Ok(());
        }

        info!("engine: new stream config {} channels, {} Hz, {:?}", cfg.nb_channels, cfg.sample_rate, cfg.bit_fmt);

        self.backend.close()?;

        let backend_direction = match self.direction {
            Direction::In => backend::Direction::Playback,
            Direction::Out => backend::Direction::Capture,
        };
        let device_cfg = self.device_config(&cfg);

        match self.backend.open(backend_direction, &device_cfg, self.buffer_size_hint_frames) {
            Ok(()) => {
                self.current_stream = Some(cfg);
                Ok(())
            }
            Err(e) => {
                error!("engine: could not open backend with new config: {e}");
                self.current_stream = None;
                Err(e)
            }
        }
    }

    pub fn set_map_config(&mut self, map: AudioMap) {
        info!("engine: new map config with {} output channels", map.len());
        self.map = Some(map);
    }

    fn ensure_scratch(&mut self, needed: usize) {
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0);
        }
    }

    /// Receive direction: forwards `buffer` to the backend, remapping from wire channels to
    /// device channels first if a map is configured.
    pub fn write(&mut self, buffer: &[u8]) -> Result<usize, VbanError> {
        let stream = self.current_stream.ok_or_else(|| VbanError::InvalidArgument("write before stream config is set".into()))?;
        let sample_size = stream.bit_fmt.sample_size();
        if sample_size == 0 {
            return Err(VbanError::UnsupportedProtocol(format!("{:?} is not PCM-playable", stream.bit_fmt)));
        }

        let Some(map) = self.map.clone() else {
            return self.backend.write(buffer);
        };

        let source_channels = stream.nb_channels as usize;
        let src_frame_size = source_channels * sample_size;
        if src_frame_size == 0 {
            return Err(VbanError::InvalidArgument("zero-channel stream".into()));
        }

        let num_frames = buffer.len() / src_frame_size;
        let dest_frame_size = map.len() * sample_size;
        let needed = num_frames * dest_frame_size;
        self.ensure_scratch(needed);

        map::remap(&map, buffer, &mut self.scratch[..needed], source_channels, sample_size, num_frames);
        self.backend.write(&self.scratch[..needed])
    }

    /// Emit direction: reads from the backend at the device channel count, remapping down to the
    /// wire channel count if a map is configured.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize, VbanError> {
        let stream = self.current_stream.ok_or_else(|| VbanError::InvalidArgument("read before stream config is set".into()))?;
        let sample_size = stream.bit_fmt.sample_size();
        if sample_size == 0 {
            return Err(VbanError::UnsupportedProtocol(format!("{:?} is not PCM-playable", stream.bit_fmt)));
        }

        let Some(map) = self.map.clone() else {
            return self.backend.read(buffer);
        };

        let device_channels = stream.nb_channels as usize;
        let device_frame_size = device_channels * sample_size;
        if device_frame_size == 0 {
            return Err(VbanError::InvalidArgument("zero-channel stream".into()));
        }

        let wire_frame_size = map.len() * sample_size;
        let max_frames = buffer.len() / wire_frame_size;
        let device_needed = max_frames * device_frame_size;
        self.ensure_scratch(device_needed);

        let device_bytes = self.backend.read(&mut self.scratch[..device_needed])?;
        let frames_read = device_bytes / device_frame_size;
        let wire_bytes = frames_read * wire_frame_size;

        map::remap(&map, &self.scratch[..device_bytes], &mut buffer[..wire_bytes], device_channels, sample_size, frames_read);
        Ok(wire_bytes)
    }
}

impl<B: Backend> Drop for AudioEngine<B> {
    fn drop(&mut self) {
        let _ = self.backend.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BitFormat;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeBackendState {
        opens: usize,
        last_open_channels: Option<u16>,
        writes: Vec<Vec<u8>>,
        read_script: Vec<Vec<u8>>,
    }

    struct FakeBackend {
        state: Arc<Mutex<FakeBackendState>>,
    }

    impl Backend for FakeBackend {
        fn open(&mut self, _direction: backend::Direction, cfg: &StreamConfiguration, _hint: usize) -> Result<(), VbanError> {
            let mut s = self.state.lock().unwrap();
            s.opens += 1;
            s.last_open_channels = Some(cfg.nb_channels);
            Ok(())
        }

        fn close(&mut self) -> Result<(), VbanError> {
            Ok(())
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError> {
            self.state.lock().unwrap().writes.push(buf.to_vec());
            Ok(buf.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, VbanError> {
            let mut s = self.state.lock().unwrap();
            let chunk = s.read_script.pop().unwrap_or_default();
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }
    }

    fn stereo_16() -> StreamConfiguration {
        StreamConfiguration { nb_channels: 2, sample_rate: 48000, bit_fmt: BitFormat::Int16 }
    }

    fn fake_engine(direction: Direction) -> (AudioEngine<FakeBackend>, Arc<Mutex<FakeBackendState>>) {
        let state = Arc::new(Mutex::new(FakeBackendState::default()));
        let backend = FakeBackend { state: Arc::clone(&state) };
        (AudioEngine::with_backend(direction, backend, 1024), state)
    }

    #[test]
    fn set_stream_config_is_a_noop_when_unchanged() {
        let (mut engine, state) = fake_engine(Direction::In);
        let cfg = stereo_16();

        engine.set_stream_config(cfg).unwrap();
        engine.set_stream_config(cfg).unwrap();

        assert_eq!(state.lock().unwrap().opens, 1);
    }

    #[test]
    fn set_stream_config_reopens_on_change() {
        let (mut engine, state) = fake_engine(Direction::In);
        engine.set_stream_config(stereo_16()).unwrap();

        let mono = StreamConfiguration { nb_channels: 1, ..stereo_16() };
        engine.set_stream_config(mono).unwrap();

        assert_eq!(state.lock().unwrap().opens, 2);
        assert_eq!(engine.current_stream(), Some(mono));
    }

    #[test]
    fn receive_write_without_map_forwards_buffer_unchanged() {
        let (mut engine, state) = fake_engine(Direction::In);
        engine.set_stream_config(stereo_16()).unwrap();

        engine.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(state.lock().unwrap().writes, vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn receive_write_with_map_opens_device_at_mapped_channel_count() {
        let (mut engine, state) = fake_engine(Direction::In);
        engine.set_map_config(AudioMap::from_indices(vec![1, 0, 0])); // 3 device channels
        engine.set_stream_config(stereo_16()).unwrap();

        assert_eq!(state.lock().unwrap().last_open_channels, Some(3));
    }

    #[test]
    fn receive_write_with_swap_map_reorders_bytes_before_forwarding() {
        let (mut engine, state) = fake_engine(Direction::In);
        engine.set_map_config(AudioMap::from_indices(vec![1, 0]));
        engine.set_stream_config(stereo_16()).unwrap();

        // L0 R0 as two 2-byte samples
        engine.write(&[0x10, 0x20, 0x30, 0x40]).unwrap();
        assert_eq!(state.lock().unwrap().writes, vec![vec![0x30, 0x40, 0x10, 0x20]]);
    }

    #[test]
    fn emit_read_with_map_narrows_device_channels_onto_wire() {
        let (mut engine, state) = fake_engine(Direction::Out);
        engine.set_map_config(AudioMap::from_indices(vec![0])); // pick device channel 0 only
        engine.set_stream_config(stereo_16()).unwrap(); // device captures at 2 channels
        state.lock().unwrap().read_script.push(vec![0xAA, 0xBB, 0xCC, 0xDD]); // L0 R0

        let mut wire_buf = vec![0u8; 2];
        let n = engine.read(&mut wire_buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(wire_buf, vec![0xAA, 0xBB]);
    }

    #[test]
    fn write_before_stream_config_is_set_errors() {
        let (mut engine, _state) = fake_engine(Direction::In);
        assert!(engine.write(&[1, 2]).is_err());
    }
}
