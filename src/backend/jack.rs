//! JACK backend: playback only, driven by JACK's own real-time callback thread. The pipeline
//! thread only ever touches the lock-free ring buffer; all port I/O happens inside the process
//! callback, which must never block or allocate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jack::{AsyncClient, AudioOut, Client, ClientOptions, Control, Port, ProcessScope};
use log::{debug, error, warn};

use crate::backend::{Backend, Direction};
use crate::ring::ByteRing;
use crate::{BitFormat, StreamConfiguration, VbanError, VBAN_CHANNELS_MAX_NB};

const NB_BUFFERS: usize = 2;

fn convert_sample(bytes: &[u8], bit_fmt: BitFormat) -> f32 {
    match bit_fmt {
        BitFormat::Int8 => bytes[0] as i8 as f32 / (1i32 << 7) as f32,
        BitFormat::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / (1i32 << 15) as f32,
        BitFormat::Int24 => {
            let raw = (bytes[2] as i32) << 16 | (bytes[1] as i32) << 8 | bytes[0] as i32;
            let signed = (raw << 8) >> 8; // sign-extend the 24-bit value
            signed as f32 / (1i32 << 23) as f32
        }
        BitFormat::Int32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / (1i64 << 31) as f32,
        BitFormat::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        BitFormat::Float64 | BitFormat::Int12 | BitFormat::Int10 => 0.0,
    }
}

struct PlaybackProcessHandler {
    ports: Vec<Port<AudioOut>>,
    ring: Arc<ByteRing>,
    active: Arc<AtomicBool>,
    bit_fmt: BitFormat,
}

impl jack::ProcessHandler for PlaybackProcessHandler {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        self.active.store(true, Ordering::Relaxed);

        let nframes = ps.n_frames() as usize;
        let sample_size = self.bit_fmt.sample_size();
        let nb_channels = self.ports.len();
        let needed = nframes * nb_channels * sample_size;

        let segs = self.ring.read_vector();
        let available = segs[0].buf.len() + segs[1].buf.len();
        if available < needed {
            warn!("jack: short read, emitting silence for this callback");
            for port in &mut self.ports {
                port.as_mut_slice(ps).fill(0.0);
            }
            return Control::Continue;
        }

        let mut consumed = 0usize;
        let mut in_first = true;
        let mut pos_in_seg = 0usize;
        let mut sample_buf = [0u8; 8];

        for frame in 0..nframes {
            for channel in 0..nb_channels {
                let seg = if in_first { segs[0].buf } else { segs[1].buf };
                let remaining_in_seg = seg.len() - pos_in_seg;

                let value = if remaining_in_seg >= sample_size {
                    let bytes = &seg[pos_in_seg..pos_in_seg + sample_size];
                    pos_in_seg += sample_size;
                    convert_sample(bytes, self.bit_fmt)
                } else {
                    // The sample straddles the wrap point: stitch the tail of the first segment
                    // with the head of the second before converting.
                    sample_buf[..remaining_in_seg].copy_from_slice(&seg[pos_in_seg..]);
                    let rest = sample_size - remaining_in_seg;
                    sample_buf[remaining_in_seg..sample_size].copy_from_slice(&segs[1].buf[..rest]);
                    in_first = false;
                    pos_in_seg = rest;
                    convert_sample(&sample_buf[..sample_size], self.bit_fmt)
                };

                if pos_in_seg >= seg.len() && in_first {
                    in_first = false;
                    pos_in_seg = 0;
                }

                self.ports[channel].as_mut_slice(ps)[frame] = value;
                consumed += sample_size;
            }
        }

        self.ring.advance_read(consumed);
        Control::Continue
    }
}

struct ShutdownNotifications {
    shutdown: Arc<AtomicBool>,
}

impl jack::NotificationHandler for ShutdownNotifications {
    fn shutdown(&mut self, _status: jack::ClientStatus, reason: &str) {
        error!("jack: server shut down: {reason}");
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

pub struct JackBackend {
    client_name: String,
    async_client: Option<AsyncClient<ShutdownNotifications, PlaybackProcessHandler>>,
    ring: Option<Arc<ByteRing>>,
    active: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl JackBackend {
    pub fn new(client_name: &str) -> Self {
        JackBackend {
            client_name: if client_name.is_empty() { "vband".to_string() } else { client_name.to_string() },
            async_client: None,
            ring: None,
            active: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Backend for JackBackend {
    fn open(&mut self, direction: Direction, cfg: &StreamConfiguration, buffer_size_hint_frames: usize) -> Result<(), VbanError> {
        if direction != Direction::Playback {
            return Err(VbanError::UnsupportedProtocol("jack backend only supports playback".into()));
        }
        if cfg.nb_channels as usize > VBAN_CHANNELS_MAX_NB {
            return Err(VbanError::InvalidArgument(format!("channel count {} exceeds jack port limit", cfg.nb_channels)));
        }

        self.close()?;

        let (client, _status) = Client::new(&self.client_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| VbanError::DeviceError(format!("could not open jack client: {e}")))?;

        let sample_size = cfg.bit_fmt.sample_size();
        if sample_size == 0 {
            return Err(VbanError::UnsupportedProtocol(format!("{:?} is not PCM-playable", cfg.bit_fmt)));
        }

        let mut ports = Vec::with_capacity(cfg.nb_channels as usize);
        for ch in 0..cfg.nb_channels {
            let port = client
                .register_port(&format!("playback_{}", ch + 1), AudioOut::default())
                .map_err(|e| VbanError::DeviceError(format!("could not register jack port {ch}: {e}")))?;
            ports.push(port);
        }

        let jack_period_bytes = client.buffer_size() as usize * cfg.nb_channels as usize * sample_size;
        let hint_bytes = buffer_size_hint_frames * cfg.nb_channels as usize * sample_size;
        let ring_capacity = hint_bytes.max(jack_period_bytes) * NB_BUFFERS;
        let ring = Arc::new(ByteRing::new(ring_capacity));
        ring.write(&vec![0u8; ring_capacity / NB_BUFFERS]);

        let process_handler = PlaybackProcessHandler {
            ports,
            ring: Arc::clone(&ring),
            active: Arc::clone(&self.active),
            bit_fmt: cfg.bit_fmt,
        };
        let notifications = ShutdownNotifications { shutdown: Arc::clone(&self.shutdown) };

        let async_client = client
            .activate_async(notifications, process_handler)
            .map_err(|e| VbanError::DeviceError(format!("could not activate jack client: {e}")))?;

        debug!("jack: opened '{}' with {} channels", self.client_name, cfg.nb_channels);
        self.ring = Some(ring);
        self.async_client = Some(async_client);
        Ok(())
    }

    fn close(&mut self) -> Result<(), VbanError> {
        if let Some(async_client) = self.async_client.take() {
            async_client
                .deactivate()
                .map_err(|e| VbanError::DeviceError(format!("could not deactivate jack client: {e}")))?;
        }
        self.ring = None;
        self.active.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError> {
        let ring = self.ring.as_ref().ok_or_else(|| VbanError::DeviceError("jack backend not open".into()))?;

        if self.shutdown.load(Ordering::Relaxed) {
            return Err(VbanError::DeviceError("jack server has shut down".into()));
        }

        let written = ring.write(buf);
        if written == 0 && !buf.is_empty() {
            warn!("jack: short write");
        }
        Ok(written)
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, VbanError> {
        Err(VbanError::UnsupportedProtocol("jack backend does not support capture".into()))
    }
}
