//! Wire-level types and constants for the VBAN (Voicemeeter Banana) audio-over-UDP protocol.
//!
//! This crate implements the receive/transmit pipeline described by the VBAN specification:
//! packet framing and validation, a pluggable audio backend, channel remapping, and the two
//! daemon loops (`vban_receiver`, `vban_emitter`) plus the `vban_sendtext` one-shot sender.

use byteorder::{ByteOrder, LittleEndian};

pub mod backend;
pub mod engine;
pub mod error;
pub mod map;
pub mod packet;
pub mod pipeline;
pub mod ring;
pub mod socket;

pub use error::VbanError;

/// Size in bytes of a VBAN header, including the 4-byte frame counter.
pub const VBAN_HEADER_SIZE: usize = 28;
/// Maximum size in bytes of the payload that follows a header.
pub const VBAN_DATA_MAX_SIZE: usize = 1436;
/// Maximum number of samples per channel carried by one audio packet.
pub const VBAN_SAMPLES_MAX_NB: usize = 256;
/// Maximum number of channels an audio sub-protocol packet may carry.
pub const VBAN_CHANNELS_MAX_NB: usize = 256;
/// Largest legal VBAN datagram, header included.
pub const VBAN_PROTOCOL_MAX_SIZE: usize = VBAN_DATA_MAX_SIZE + VBAN_HEADER_SIZE;
/// Width in bytes of the `streamname` header field.
pub const VBAN_STREAM_NAME_SIZE: usize = 16;

const VBAN_FOURCC: [u8; 4] = *b"VBAN";

const VBAN_SR_MASK: u8 = 0x1F;
const VBAN_PROTOCOL_MASK: u8 = 0xE0;
const VBAN_BIT_RESOLUTION_MASK: u8 = 0x07;
const VBAN_RESERVED_MASK: u8 = 0x08;
const VBAN_CODEC_MASK: u8 = 0xF0;

/// On-wire sample rate table; the index into this table is the on-wire `sr_byte` low 5 bits.
pub const VBAN_SR_TABLE: [u32; 21] = [
    6000, 12000, 24000, 48000, 96000, 192000, 384000, 8000, 16000, 32000, 64000, 128000, 256000,
    512000, 11025, 22050, 44100, 88200, 176400, 352800, 705600,
];

/// Byte width of one sample for each `BitFormat` variant, indexed by its on-wire value.
pub const VBAN_BIT_RESOLUTION_SIZE: [usize; 8] = [1, 2, 3, 4, 4, 8, 0, 0];

/// Looks up the on-wire index of a sample rate, if supported.
pub fn sr_index_from_value(value: u32) -> Option<u8> {
    VBAN_SR_TABLE.iter().position(|&sr| sr == value).map(|i| i as u8)
}

/// VBAN sub-protocol, encoded in the high 3 bits of the `sr_byte` header field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubProtocol {
    Audio,
    Serial,
    Txt,
    Service,
    Undefined1,
    Undefined2,
    Undefined3,
    Undefined4,
}

impl From<u8> for SubProtocol {
    fn from(sr_byte: u8) -> Self {
        match sr_byte & VBAN_PROTOCOL_MASK {
            0x00 => SubProtocol::Audio,
            0x20 => SubProtocol::Serial,
            0x40 => SubProtocol::Txt,
            0x60 => SubProtocol::Service,
            0x80 => SubProtocol::Undefined1,
            0xA0 => SubProtocol::Undefined2,
            0xC0 => SubProtocol::Undefined3,
            0xE0 => SubProtocol::Undefined4,
            _ => unreachable!("masked to 3 bits"),
        }
    }
}

impl SubProtocol {
    fn wire_value(self) -> u8 {
        match self {
            SubProtocol::Audio => 0x00,
            SubProtocol::Serial => 0x20,
            SubProtocol::Txt => 0x40,
            SubProtocol::Service => 0x60,
            SubProtocol::Undefined1 => 0x80,
            SubProtocol::Undefined2 => 0xA0,
            SubProtocol::Undefined3 => 0xC0,
            SubProtocol::Undefined4 => 0xE0,
        }
    }
}

/// Codec nibble, encoded in the high 4 bits of the `bit_byte` header field. Only `Pcm` is ever
/// accepted by [`crate::packet::validate`]; the rest exist so a header round-trips faithfully.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Codec {
    Pcm,
    Vbca,
    Vbcv,
    Reserved(u8),
    User,
}

impl From<u8> for Codec {
    fn from(bit_byte: u8) -> Self {
        match bit_byte & VBAN_CODEC_MASK {
            0x00 => Codec::Pcm,
            0x10 => Codec::Vbca,
            0x20 => Codec::Vbcv,
            0xF0 => Codec::User,
            other => Codec::Reserved(other),
        }
    }
}

impl Codec {
    fn wire_value(self) -> u8 {
        match self {
            Codec::Pcm => 0x00,
            Codec::Vbca => 0x10,
            Codec::Vbcv => 0x20,
            Codec::User => 0xF0,
            Codec::Reserved(v) => v & VBAN_CODEC_MASK,
        }
    }
}

/// Bit-width and sample type, encoded in the low 3 bits of the `bit_byte` header field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BitFormat {
    Int8,
    Int16,
    Int24,
    Int32,
    Float32,
    Float64,
    Int12,
    Int10,
}

impl BitFormat {
    /// Byte width of a single sample in this format. `Int12`/`Int10` return 0: they are not PCM
    /// playable and never reach a sample-size computation.
    pub fn sample_size(self) -> usize {
        VBAN_BIT_RESOLUTION_SIZE[self as usize]
    }

    fn wire_value(self) -> u8 {
        self as u8
    }
}

impl From<u8> for BitFormat {
    fn from(bit_byte: u8) -> Self {
        match bit_byte & VBAN_BIT_RESOLUTION_MASK {
            0 => BitFormat::Int8,
            1 => BitFormat::Int16,
            2 => BitFormat::Int24,
            3 => BitFormat::Int32,
            4 => BitFormat::Float32,
            5 => BitFormat::Float64,
            6 => BitFormat::Int12,
            7 => BitFormat::Int10,
            _ => unreachable!("masked to 3 bits"),
        }
    }
}

/// The (channels, sample rate, bit format) triple that identifies an audio format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StreamConfiguration {
    pub nb_channels: u16,
    pub sample_rate: u32,
    pub bit_fmt: BitFormat,
}

impl StreamConfiguration {
    /// Size in bytes of one frame (one sample per channel) in this configuration.
    pub fn frame_size(&self) -> usize {
        self.bit_fmt.sample_size() * self.nb_channels as usize
    }
}

/// A parsed VBAN header. Field names track the wire layout; getters expose the "offset applied"
/// values (e.g. `num_samples()` is `nbs + 1`, not the raw on-wire byte).
#[derive(Copy, Clone, Debug)]
pub struct VBanHeader {
    pub sr_byte: u8,
    pub nbs: u8,
    pub nbc: u8,
    pub bit_byte: u8,
    pub streamname: [u8; VBAN_STREAM_NAME_SIZE],
    pub frame_counter: u32,
}

impl VBanHeader {
    pub fn sub_protocol(&self) -> SubProtocol {
        SubProtocol::from(self.sr_byte)
    }

    pub fn sample_rate_index(&self) -> u8 {
        self.sr_byte & VBAN_SR_MASK
    }

    pub fn codec(&self) -> Codec {
        Codec::from(self.bit_byte)
    }

    pub fn bit_fmt(&self) -> BitFormat {
        BitFormat::from(self.bit_byte)
    }

    pub fn reserved_bit_set(&self) -> bool {
        self.bit_byte & VBAN_RESERVED_MASK != 0
    }

    pub fn num_samples(&self) -> u16 {
        self.nbs as u16 + 1
    }

    pub fn num_channels(&self) -> u16 {
        self.nbc as u16 + 1
    }

    /// Reads the first `size` bytes of `buffer` as a header. Panics if `buffer` is shorter than
    /// [`VBAN_HEADER_SIZE`]; callers must check the length before parsing (see
    /// [`crate::packet::validate`]).
    pub fn parse(buffer: &[u8]) -> Self {
        assert!(buffer.len() >= VBAN_HEADER_SIZE, "buffer shorter than a VBAN header");

        let mut streamname = [0u8; VBAN_STREAM_NAME_SIZE];
        streamname.copy_from_slice(&buffer[8..8 + VBAN_STREAM_NAME_SIZE]);

        VBanHeader {
            sr_byte: buffer[4],
            nbs: buffer[5],
            nbc: buffer[6],
            bit_byte: buffer[7],
            streamname,
            frame_counter: LittleEndian::read_u32(&buffer[24..28]),
        }
    }

    /// Writes this header into the first [`VBAN_HEADER_SIZE`] bytes of `buffer`.
    pub fn write_into(&self, buffer: &mut [u8]) {
        assert!(buffer.len() >= VBAN_HEADER_SIZE, "buffer shorter than a VBAN header");

        buffer[0..4].copy_from_slice(&VBAN_FOURCC);
        buffer[4] = self.sr_byte;
        buffer[5] = self.nbs;
        buffer[6] = self.nbc;
        buffer[7] = self.bit_byte;
        buffer[8..8 + VBAN_STREAM_NAME_SIZE].copy_from_slice(&self.streamname);
        LittleEndian::write_u32(&mut buffer[24..28], self.frame_counter);
    }
}

/// Encodes `name` into a fixed 16-byte NUL-padded streamname field, truncating names longer than
/// [`VBAN_STREAM_NAME_SIZE`].
pub fn encode_streamname(name: &str) -> [u8; VBAN_STREAM_NAME_SIZE] {
    let mut buf = [0u8; VBAN_STREAM_NAME_SIZE];
    let bytes = name.as_bytes();
    let n = bytes.len().min(VBAN_STREAM_NAME_SIZE);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sr_table_round_trips() {
        for (idx, &rate) in VBAN_SR_TABLE.iter().enumerate() {
            assert_eq!(sr_index_from_value(rate), Some(idx as u8));
        }
        assert_eq!(sr_index_from_value(123456), None);
    }

    #[test]
    fn bit_format_sample_sizes() {
        assert_eq!(BitFormat::Int8.sample_size(), 1);
        assert_eq!(BitFormat::Int16.sample_size(), 2);
        assert_eq!(BitFormat::Int24.sample_size(), 3);
        assert_eq!(BitFormat::Int32.sample_size(), 4);
        assert_eq!(BitFormat::Float32.sample_size(), 4);
        assert_eq!(BitFormat::Float64.sample_size(), 8);
    }

    #[test]
    fn header_round_trip() {
        let mut buf = [0u8; VBAN_HEADER_SIZE];
        let hdr = VBanHeader {
            sr_byte: SubProtocol::Audio.wire_value() | 3,
            nbs: 127,
            nbc: 1,
            bit_byte: Codec::Pcm.wire_value() | BitFormat::Int16.wire_value(),
            streamname: encode_streamname("Stream1"),
            frame_counter: 42,
        };
        hdr.write_into(&mut buf);

        assert_eq!(&buf[0..4], b"VBAN");
        let parsed = VBanHeader::parse(&buf);
        assert_eq!(parsed.sample_rate_index(), 3);
        assert_eq!(parsed.num_samples(), 128);
        assert_eq!(parsed.num_channels(), 2);
        assert_eq!(parsed.bit_fmt(), BitFormat::Int16);
        assert_eq!(parsed.codec(), Codec::Pcm);
        assert_eq!(parsed.frame_counter, 42);
        assert!(!parsed.reserved_bit_set());
    }

    #[test]
    fn encode_streamname_pads_and_truncates() {
        let short = encode_streamname("hi");
        assert_eq!(&short[..2], b"hi");
        assert_eq!(&short[2..], &[0u8; 14]);

        let exact = encode_streamname("0123456789abcdef"); // 16 chars
        assert_eq!(&exact[..], b"0123456789abcdef");

        let long = encode_streamname("0123456789abcdefXYZ");
        assert_eq!(&long[..], b"0123456789abcdef");
    }
}
