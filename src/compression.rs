//! The two filter primitives honored by the chunk reconstructor: DEFLATE
//! (via a vetted zlib-compatible inflate crate, treated as a black box)
//! and SHUFFLE (a small pure byte-transpose, implemented directly).

use crate::error::{Error, Result};

/// Inflates a zlib stream to exactly `expected_size` bytes.
pub fn inflate(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = zune_inflate::DeflateDecoder::new(data);
    let decompressed = decoder
        .decode_zlib()
        .map_err(|e| Error::decompression(format!("{:?}", e)))?;

    if decompressed.len() != expected_size {
        return Err(Error::decompression(format!(
            "inflated to {} bytes, expected {}",
            decompressed.len(),
            expected_size
        )));
    }

    Ok(decompressed)
}

/// Reverses the HDF5 shuffle filter: `input` is `type_size` interleaved
/// byte-planes of `count = input.len() / type_size` elements; output byte
/// at `i*type_size + b` equals input byte at `b*count + i`.
pub fn unshuffle(input: &[u8], type_size: usize) -> Vec<u8> {
    if type_size <= 1 {
        return input.to_vec();
    }

    let count = input.len() / type_size;
    let mut out = vec![0u8; input.len()];

    for b in 0..type_size {
        let plane = &input[b * count..(b + 1) * count];
        for (i, byte) in plane.iter().enumerate() {
            out[i * type_size + b] = *byte;
        }
    }

    out
}

/// Inverse of `unshuffle`, provided for completeness and for the
/// round-trip property test; the reader never needs to shuffle on write.
pub fn shuffle(input: &[u8], type_size: usize) -> Vec<u8> {
    if type_size <= 1 {
        return input.to_vec();
    }

    let count = input.len() / type_size;
    let mut out = vec![0u8; input.len()];

    for i in 0..count {
        for b in 0..type_size {
            out[b * count + i] = input[i * type_size + b];
        }
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unshuffle_is_inverse_of_shuffle() {
        let original: Vec<u8> = (0..32u8).collect();
        let shuffled = shuffle(&original, 4);
        let restored = unshuffle(&shuffled, 4);
        assert_eq!(restored, original);
    }

    #[test]
    fn shuffle_groups_same_significance_bytes() {
        // two f32-sized (4 byte) elements: 0x11223344, 0xAABBCCDD little endian
        let input = vec![0x44, 0x33, 0x22, 0x11, 0xDD, 0xCC, 0xBB, 0xAA];
        let shuffled = shuffle(&input, 4);
        // plane 0 (least significant bytes of each element): 0x44, 0xDD
        assert_eq!(&shuffled[0..2], &[0x44, 0xDD]);
        assert_eq!(&shuffled[6..8], &[0x11, 0xAA]);
    }
}
