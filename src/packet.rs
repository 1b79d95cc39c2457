//! Packet codec: validates inbound buffers, derives stream configurations, and writes headers
//! for outbound payloads.

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    encode_streamname, BitFormat, Codec, StreamConfiguration, SubProtocol, VBanHeader, VbanError,
    VBAN_CHANNELS_MAX_NB, VBAN_DATA_MAX_SIZE, VBAN_HEADER_SIZE, VBAN_SAMPLES_MAX_NB,
    VBAN_SR_TABLE, VBAN_STREAM_NAME_SIZE, VBAN_SR_MASK,
};

/// Compares the wire streamname field against `configured`, bounded to
/// [`crate::VBAN_STREAM_NAME_SIZE`] bytes. A configured name shorter than the field width must
/// match a prefix of the wire field, with the next wire byte NUL — the field is a fixed 16-byte
/// NUL-padded buffer, not a C string of arbitrary length.
fn streamname_matches(configured: &[u8; VBAN_STREAM_NAME_SIZE], wire: &[u8; VBAN_STREAM_NAME_SIZE]) -> bool {
    let configured_len = configured.iter().position(|&b| b == 0).unwrap_or(VBAN_STREAM_NAME_SIZE);

    if configured[..configured_len] != wire[..configured_len] {
        return false;
    }

    if configured_len < VBAN_STREAM_NAME_SIZE {
        wire[configured_len] == 0
    } else {
        true
    }
}

fn payload_size_for(hdr: &VBanHeader) -> Result<usize, VbanError> {
    let bit_fmt = hdr.bit_fmt();
    let sample_size = bit_fmt.sample_size();
    if sample_size == 0 {
        return Err(VbanError::UnsupportedProtocol(format!(
            "bit format {bit_fmt:?} is not PCM-playable"
        )));
    }
    Ok(hdr.num_samples() as usize * sample_size * hdr.num_channels() as usize)
}

/// Validates `buffer` as a VBAN packet for the configured `streamname`.
///
/// On success, `get_stream_config` may be called on the same buffer. Must be called before
/// `get_stream_config` — the latter does not re-check anything.
pub fn validate(streamname: &[u8; VBAN_STREAM_NAME_SIZE], buffer: &[u8]) -> Result<(), VbanError> {
    if buffer.len() <= VBAN_HEADER_SIZE {
        return Err(VbanError::Malformed("packet too small".into()));
    }

    if &buffer[0..4] != b"VBAN" {
        return Err(VbanError::Malformed("invalid vban magic fourcc".into()));
    }

    let hdr = VBanHeader::parse(buffer);

    if !streamname_matches(streamname, &hdr.streamname) {
        return Err(VbanError::WrongStream);
    }

    if hdr.reserved_bit_set() {
        return Err(VbanError::Malformed("reserved format bit has a non-zero value".into()));
    }

    match hdr.sub_protocol() {
        SubProtocol::Audio => {
            if hdr.codec() != Codec::Pcm {
                return Err(VbanError::UnsupportedProtocol(format!(
                    "codec {:?} is not supported, only PCM is",
                    hdr.codec()
                )));
            }

            let sample_rate_index = hdr.sample_rate_index() as usize;
            if sample_rate_index >= VBAN_SR_TABLE.len() {
                return Err(VbanError::Malformed("invalid sample rate index".into()));
            }

            let payload_size = payload_size_for(&hdr)?;
            let actual = buffer.len() - VBAN_HEADER_SIZE;
            if payload_size != actual {
                return Err(VbanError::Malformed(format!(
                    "invalid payload size, expected {payload_size}, got {actual}"
                )));
            }

            Ok(())
        }
        other => Err(VbanError::UnsupportedProtocol(format!("{other:?} is not supported"))),
    }
}

/// Projects the stream configuration out of an already-`validate`d buffer. Calling this before
/// `validate` succeeds is a logic error: out-of-range enum values will not have been rejected.
pub fn get_stream_config(buffer: &[u8]) -> StreamConfiguration {
    let hdr = VBanHeader::parse(buffer);
    StreamConfiguration {
        nb_channels: hdr.num_channels(),
        sample_rate: VBAN_SR_TABLE[hdr.sample_rate_index() as usize],
        bit_fmt: hdr.bit_fmt(),
    }
}

/// Writes a fresh header for `stream_cfg`/`streamname` into `buffer`, zeroing the frame counter.
pub fn init_header(
    buffer: &mut [u8],
    stream_cfg: &StreamConfiguration,
    streamname: &str,
) -> Result<(), VbanError> {
    if stream_cfg.nb_channels == 0 || stream_cfg.nb_channels as usize > VBAN_CHANNELS_MAX_NB {
        return Err(VbanError::InvalidArgument(format!(
            "channel count {} out of range",
            stream_cfg.nb_channels
        )));
    }

    let sr_index = crate::sr_index_from_value(stream_cfg.sample_rate).ok_or_else(|| {
        VbanError::InvalidArgument(format!("sample rate {} is not in the VBAN table", stream_cfg.sample_rate))
    })?;

    let hdr = VBanHeader {
        sr_byte: SubProtocol::Audio.wire_value() | sr_index,
        nbs: 0,
        nbc: (stream_cfg.nb_channels - 1) as u8,
        bit_byte: Codec::Pcm.wire_value() | stream_cfg.bit_fmt.wire_value(),
        streamname: encode_streamname(streamname),
        frame_counter: 0,
    };
    hdr.write_into(buffer);
    Ok(())
}

/// Writes a one-shot TXT sub-protocol header into `buffer`, for `vban_sendtext`. `bps` is masked
/// to the 5 bits the sub-protocol byte has available for it; `ident` and `format` are written
/// verbatim, matching the original sender's raw struct assignment (TXT packets have no channel
/// count or sample-format semantics, so neither field is offset-adjusted the way the AUDIO path's
/// `nbc`/`bit_byte` are).
pub fn init_txt_header(buffer: &mut [u8], bps: u8, ident: u8, format: u8, streamname: &str) -> Result<(), VbanError> {
    if buffer.len() < VBAN_HEADER_SIZE {
        return Err(VbanError::InvalidArgument("buffer shorter than a VBAN header".into()));
    }

    let hdr = VBanHeader {
        sr_byte: SubProtocol::Txt.wire_value() | (bps & VBAN_SR_MASK),
        nbs: 0,
        nbc: ident,
        bit_byte: format,
        streamname: encode_streamname(streamname),
        frame_counter: 0,
    };
    hdr.write_into(buffer);
    Ok(())
}

/// Updates `nbs` to match `payload_size` and increments the frame counter. The caller guarantees
/// `payload_size` is a whole multiple of the current frame size.
pub fn set_new_content(buffer: &mut [u8], payload_size: usize) -> Result<(), VbanError> {
    let hdr = VBanHeader::parse(buffer);
    let bit_fmt = hdr.bit_fmt();
    let frame_size = bit_fmt.sample_size() * hdr.num_channels() as usize;
    if frame_size == 0 {
        return Err(VbanError::InvalidArgument("zero frame size".into()));
    }

    let num_samples = payload_size / frame_size;
    if num_samples == 0 || num_samples > VBAN_SAMPLES_MAX_NB {
        return Err(VbanError::InvalidArgument(format!(
            "payload of {payload_size} bytes yields {num_samples} samples, out of range"
        )));
    }

    buffer[5] = (num_samples - 1) as u8;
    let frame_counter = hdr.frame_counter.wrapping_add(1);
    LittleEndian::write_u32(&mut buffer[24..28], frame_counter);
    Ok(())
}

/// Largest payload that will remain spec-compliant for the stream configuration currently
/// encoded in `buffer`'s header: `min(VBAN_DATA_MAX_SIZE, VBAN_SAMPLES_MAX_NB * frame_size)`.
pub fn max_payload_size(buffer: &[u8]) -> usize {
    let hdr = VBanHeader::parse(buffer);
    let frame_size = hdr.bit_fmt().sample_size() * hdr.num_channels() as usize;
    if frame_size == 0 {
        return 0;
    }

    let sample_count = (VBAN_DATA_MAX_SIZE / frame_size).min(VBAN_SAMPLES_MAX_NB);
    sample_count * frame_size
}
