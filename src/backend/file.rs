//! Plain-file backend: writes/reads raw interleaved PCM bytes to a regular file, or to
//! stdout/stdin when no path is given.

use std::fs::{File, OpenOptions};
use std::io::{Read as IoRead, Write as IoWrite};

use log::{debug, error};

use crate::backend::{Backend, Direction};
use crate::{StreamConfiguration, VbanError};

#[derive(Debug)]
enum Target {
    Stdout(std::io::Stdout),
    Stdin(std::io::Stdin),
    File(File),
}

#[derive(Debug)]
pub struct FileBackend {
    path: String,
    target: Option<Target>,
}

impl FileBackend {
    pub fn new(path: &str) -> Self {
        FileBackend { path: path.to_string(), target: None }
    }
}

impl Backend for FileBackend {
    fn open(&mut self, direction: Direction, _cfg: &StreamConfiguration, _buffer_size_hint_frames: usize) -> Result<(), VbanError> {
        self.close()?;

        let target = if self.path.is_empty() {
            match direction {
                Direction::Playback => Target::Stdout(std::io::stdout()),
                Direction::Capture => Target::Stdin(std::io::stdin()),
            }
        } else {
            let file = match direction {
                Direction::Playback => OpenOptions::new().create(true).write(true).truncate(true).open(&self.path),
                Direction::Capture => OpenOptions::new().read(true).open(&self.path),
            }
            .map_err(|e| {
                error!("file: open failed for '{}': {e}", self.path);
                VbanError::Io(e)
            })?;
            Target::File(file)
        };

        debug!("file: opened '{}'", if self.path.is_empty() { "<stdio>" } else { &self.path });
        self.target = Some(target);
        Ok(())
    }

    fn close(&mut self) -> Result<(), VbanError> {
        self.target = None;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, VbanError> {
        match self.target.as_mut().ok_or_else(|| VbanError::DeviceError("file backend not open".into()))? {
            Target::Stdout(s) => s.write(buf).map_err(VbanError::Io),
            Target::File(f) => f.write(buf).map_err(VbanError::Io),
            Target::Stdin(_) => Err(VbanError::InvalidArgument("cannot write to a capture target".into())),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, VbanError> {
        match self.target.as_mut().ok_or_else(|| VbanError::DeviceError("file backend not open".into()))? {
            Target::Stdin(s) => s.read(buf).map_err(VbanError::Io),
            Target::File(f) => f.read(buf).map_err(VbanError::Io),
            Target::Stdout(_) => Err(VbanError::InvalidArgument("cannot read from a playback target".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BitFormat;

    fn cfg() -> StreamConfiguration {
        StreamConfiguration { nb_channels: 2, sample_rate: 44100, bit_fmt: BitFormat::Int16 }
    }

    #[test]
    fn writes_and_reads_back_a_regular_file() {
        let path = std::env::temp_dir().join(format!("vband_file_backend_test_{}", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();

        let mut writer = FileBackend::new(&path_str);
        writer.open(Direction::Playback, &cfg(), 1024).unwrap();
        writer.write(&[1, 2, 3, 4]).unwrap();
        writer.close().unwrap();

        let mut reader = FileBackend::new(&path_str);
        reader.open(Direction::Capture, &cfg(), 1024).unwrap();
        let mut buf = [0u8; 4];
        let n = reader.read(&mut buf).unwrap();
        reader.close().unwrap();

        std::fs::remove_file(&path_str).ok();

        assert_eq!(n, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }
}
