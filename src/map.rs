//! Channel map: an ordered list of source-channel indices defining an output layout, and the
//! remap copy that applies it between the wire layout and the device layout.

use crate::VbanError;
use crate::VBAN_CHANNELS_MAX_NB;

/// An ordered sequence of source-channel indices. `map[c]` is the source channel feeding output
/// channel `c`; a source index `>= source_channels` at write time is zero-filled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AudioMap {
    channels: Vec<u8>,
}

impl AudioMap {
    /// Parses a comma-separated 1-based channel list (as taken from `-c`) into a 0-based map.
    /// Parsing stops at the first token that is not a valid `1..=VBAN_CHANNELS_MAX_NB` channel
    /// number rather than failing the whole list.
    pub fn parse(list: &str) -> Result<Self, VbanError> {
        let mut channels = Vec::new();

        for token in list.split(',') {
            let chan: u32 = match token.trim().parse() {
                Ok(v) => v,
                Err(_) => break,
            };

            if !(1..=VBAN_CHANNELS_MAX_NB as u32).contains(&chan) {
                break;
            }

            channels.push((chan - 1) as u8);
            if channels.len() >= VBAN_CHANNELS_MAX_NB {
                break;
            }
        }

        if channels.is_empty() {
            return Err(VbanError::InvalidArgument(format!("no valid channels in '{list}'")));
        }

        Ok(AudioMap { channels })
    }

    /// Builds a map directly from 0-based source indices.
    pub fn from_indices(channels: Vec<u8>) -> Self {
        AudioMap { channels }
    }

    /// Output channel count, i.e. `|map|`.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[u8] {
        &self.channels
    }
}

/// Remaps `src` (interleaved frames of `source_channels` channels, `sample_size` bytes/sample)
/// into `dest` (interleaved frames of `map.len()` channels), per §4.5:
///
/// for each output frame `f` and output channel `c`: if `map[c] < source_channels`, copy the
/// sample at `(f*source_channels + map[c]) * sample_size` in `src` to
/// `(f*map.len() + c) * sample_size` in `dest`; else write zeros.
///
/// `dest` must be exactly `num_frames * map.len() * sample_size` bytes; `src` must hold at least
/// `num_frames` frames of `source_channels` channels.
pub fn remap(
    map: &AudioMap,
    src: &[u8],
    dest: &mut [u8],
    source_channels: usize,
    sample_size: usize,
    num_frames: usize,
) {
    let dest_channels = map.len();
    let src_frame_size = source_channels * sample_size;
    let dest_frame_size = dest_channels * sample_size;

    debug_assert!(dest.len() >= num_frames * dest_frame_size);
    debug_assert!(src.len() >= num_frames * src_frame_size);

    dest[..num_frames * dest_frame_size].fill(0);

    for (c, &source_chan) in map.channels().iter().enumerate() {
        if source_chan as usize >= source_channels {
            continue;
        }

        for frame in 0..num_frames {
            let src_off = frame * src_frame_size + source_chan as usize * sample_size;
            let dest_off = frame * dest_frame_size + c * sample_size;
            dest[dest_off..dest_off + sample_size].copy_from_slice(&src[src_off..src_off + sample_size]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_stops_at_first_invalid_token() {
        let map = AudioMap::parse("1,2,xyz,3").unwrap();
        assert_eq!(map.channels(), &[0, 1]);
    }

    #[test]
    fn parse_rejects_out_of_range_channel() {
        let map = AudioMap::parse("1,0,2").unwrap();
        assert_eq!(map.channels(), &[0]); // stops at the invalid "0"
    }

    #[test]
    fn parse_rejects_empty_list() {
        assert!(AudioMap::parse("abc").is_err());
    }

    #[test]
    fn identity_map_reproduces_input_byte_for_byte() {
        let map = AudioMap::from_indices(vec![0, 1]);
        let src: Vec<u8> = (0u8..16).collect(); // 4 frames, 2ch, 2 bytes/sample
        let mut dest = vec![0u8; src.len()];
        remap(&map, &src, &mut dest, 2, 2, 4);
        assert_eq!(src, dest);
    }

    #[test]
    fn swap_map_on_stereo_reorders_channels() {
        let map = AudioMap::from_indices(vec![1, 0]);
        // L0 R0 L1 R1, 1 byte/sample for clarity.
        let src = vec![0x10, 0x20, 0x11, 0x21];
        let mut dest = vec![0u8; 4];
        remap(&map, &src, &mut dest, 2, 1, 2);
        assert_eq!(dest, vec![0x20, 0x10, 0x21, 0x11]);
    }

    #[test]
    fn out_of_range_source_channel_is_zero_filled() {
        let map = AudioMap::from_indices(vec![0, 5]); // source only has 2 channels
        let src = vec![0xAA, 0xBB, 0xAA, 0xBB];
        let mut dest = vec![0xFFu8; 4];
        remap(&map, &src, &mut dest, 2, 1, 2);
        assert_eq!(dest, vec![0xAA, 0x00, 0xAA, 0x00]);
    }

    #[test]
    fn permutation_map_is_idempotent_under_inverse_composition() {
        // map = [2,0,1] on 3 channels; its inverse is [1,2,0].
        let map = AudioMap::from_indices(vec![2, 0, 1]);
        let inverse = AudioMap::from_indices(vec![1, 2, 0]);

        let src: Vec<u8> = (0u8..12).collect(); // 4 frames, 3ch, 1 byte/sample
        let mut mapped = vec![0u8; src.len()];
        remap(&map, &src, &mut mapped, 3, 1, 4);

        let mut restored = vec![0u8; src.len()];
        remap(&inverse, &mapped, &mut restored, 3, 1, 4);

        assert_eq!(src, restored);
    }

    fn inverse_of(perm: &[u8]) -> Vec<u8> {
        let mut inverse = vec![0u8; perm.len()];
        for (c, &source) in perm.iter().enumerate() {
            inverse[source as usize] = c as u8;
        }
        inverse
    }

    proptest! {
        /// For any permutation of `1..=VBAN_CHANNELS_MAX_NB` channels and any frame data,
        /// remapping by the permutation and then by its inverse reproduces the original bytes.
        #[test]
        fn permutation_and_its_inverse_compose_to_identity(
            nb_channels in 1usize..=32,
            num_frames in 0usize..8,
            seed in any::<u64>(),
        ) {
            // Channel indices are stored as `u8`; 32 exercises genuinely large permutations
            // without brushing against that range, and stays well under VBAN_CHANNELS_MAX_NB.
            let sample_size = 2;

            // Fisher-Yates over a deterministic PRNG seeded per case, since proptest's own
            // `Just`/`prop::collection::vec` strategies don't directly express "a permutation".
            let mut perm: Vec<u8> = (0..nb_channels as u8).collect();
            let mut state = seed | 1;
            for i in (1..perm.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                let j = (state >> 33) as usize % (i + 1);
                perm.swap(i, j);
            }
            let map = AudioMap::from_indices(perm.clone());
            let inverse = AudioMap::from_indices(inverse_of(&perm));

            let src: Vec<u8> = (0..num_frames * nb_channels * sample_size)
                .map(|i| (i % 256) as u8)
                .collect();

            let mut mapped = vec![0u8; src.len()];
            remap(&map, &src, &mut mapped, nb_channels, sample_size, num_frames);

            let mut restored = vec![0u8; src.len()];
            remap(&inverse, &mapped, &mut restored, nb_channels, sample_size, num_frames);

            prop_assert_eq!(src, restored);
        }
    }
}
