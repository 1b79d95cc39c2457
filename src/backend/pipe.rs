//! Named-pipe (FIFO) backend: writes/reads raw interleaved PCM bytes through a POSIX FIFO,
//! created with `mkfifo` on open and unlinked on close.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{Read as IoRead, Write as IoWrite};

use log::{debug, error};

use crate::backend::{Backend, Direction};
use crate::{StreamConfiguration, VbanError};

const DEFAULT_FIFO_PATH: &str = "/tmp/vban_0";

#[derive(Debug)]
pub struct PipeBackend {
    path: String,
    file: Option<File>,
}

impl PipeBackend {
    pub fn new(path: &str) -> Self {
        PipeBackend {
            path: if path.is_empty() { DEFAULT_FIFO_PATH.to_string() } else { path.to_string() },
            file: None,
        }
    }

    fn create_fifo(&self) -> Result<(), VbanError> {
        let c_path = CString::new(self.path.as_str())
            .map_err(|_| VbanError::InvalidArgument("pipe path contains a NUL byte".into()))?;

        // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
        let ret = unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                error!("pipe: mkfifo failed for '{}': {err}", self.path);
                return Err(VbanError::Io(err));
            }
        }
        Ok(())
    }
}

impl Backend for PipeBackend {
    fn open(&mut self, direction: Direction, _cfg: &StreamConfiguration, _buffer_size_hint_frames: usize) -> Result<(), VbanError> {
        self.close()?;
        self.create_fifo()?;

        let mut opts = OpenOptions::new();
        match direction {
            Direction::Playback => opts.write(true),
            Direction::Capture => opts.read(true),
        };

        let file = opts.open(&self.path).map_err(|e| {
            error!("pipe: open failed for '{}': {e}", self.path);
            VbanError::Io(e)
        })?;

        debug!("pipe: opened '{}'", self.path);
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<(), VbanError> {
        if self.file.take().is_some() {
            let c_path = CString::new(self.path.as_str()).ok();
            if let Some(c_path) = c_path {
                // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
                unsafe { libc::unlink(c_path.as_ptr()) };
            }
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError> {
        let file = self.file.as_mut().ok_or_else(|| VbanError::DeviceError("pipe backend not open".into()))?;
        file.write(buf).map_err(VbanError::Io)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VbanError> {
        let file = self.file.as_mut().ok_or_else(|| VbanError::DeviceError("pipe backend not open".into()))?;
        file.read(buf).map_err(VbanError::Io)
    }
}
