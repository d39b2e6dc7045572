//! Fixed-size float buffer codec for the SoC MOSI/MISO buffers.
//!
//! Layout of an encoded MOSI buffer:
//!
//! ```text
//! ┌──────────────┬──────────┬──────────┬─────┬──────────────┐
//! │ count (u32)  │ f32 #0   │ f32 #1   │ ... │ zero padding │
//! │ 4 bytes, LE  │ 4 B, LE  │ 4 B, LE  │     │ to size      │
//! └──────────────┴──────────┴──────────┴─────┴──────────────┘
//! ```
//!
//! The firmware reads the prefix as an unsigned integer, so the count is
//! never encoded as a float.

use thiserror::Error;

/// Width of the count prefix in bytes.
pub const PREFIX_SIZE: usize = 4;

/// Width of one encoded float in bytes.
pub const FLOAT_SIZE: usize = 4;

/// Codec contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer overflow: {required} bytes needed but buffer holds {capacity}")]
    BufferOverflow { required: usize, capacity: usize },

    #[error("buffer too small: expected at least {required} bytes, got {available}")]
    BufferTooSmall { required: usize, available: usize },
}

/// Number of bytes `count` floats occupy once prefixed.
pub fn encoded_len(count: usize) -> usize {
    PREFIX_SIZE + FLOAT_SIZE * count
}

/// How many floats fit into a buffer of `buffer_size` bytes after the prefix.
pub fn max_values(buffer_size: usize) -> usize {
    buffer_size.saturating_sub(PREFIX_SIZE) / FLOAT_SIZE
}

/// Pack `values` into a zero-padded buffer of exactly `buffer_size` bytes.
pub fn pack(values: &[f32], buffer_size: usize) -> Result<Vec<u8>, CodecError> {
    let required = encoded_len(values.len());
    if required > buffer_size || u32::try_from(values.len()).is_err() {
        return Err(CodecError::BufferOverflow {
            required,
            capacity: buffer_size,
        });
    }

    let mut buffer = Vec::with_capacity(buffer_size);
    buffer.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for value in values {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
    buffer.resize(buffer_size, 0);

    Ok(buffer)
}

/// Decode `count` little-endian floats starting at `offset`.
pub fn unpack(buffer: &[u8], offset: usize, count: usize) -> Result<Vec<f32>, CodecError> {
    let required = FLOAT_SIZE * count;
    let available = buffer.len().saturating_sub(offset);
    if available < required {
        return Err(CodecError::BufferTooSmall {
            required,
            available,
        });
    }

    Ok(buffer[offset..offset + required]
        .chunks_exact(FLOAT_SIZE)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Decode the single float a command leaves in the result buffer.
pub fn unpack_result(buffer: &[u8], offset: usize) -> Result<f32, CodecError> {
    let values = unpack(buffer, offset, 1)?;
    Ok(values[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let buffer = pack(&[1.0, -2.5], 16).unwrap();

        assert_eq!(buffer.len(), 16);
        assert_eq!(&buffer[0..4], &2u32.to_le_bytes());
        assert_eq!(&buffer[4..8], &1.0f32.to_le_bytes());
        assert_eq!(&buffer[8..12], &(-2.5f32).to_le_bytes());
        assert!(buffer[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_round_trip() {
        let values: Vec<f32> = (0..10).map(|i| i as f32 * 0.37 - 1.0).collect();
        let buffer = pack(&values, 4096).unwrap();
        let decoded = unpack(&buffer, PREFIX_SIZE, values.len()).unwrap();

        assert_eq!(decoded, values);
    }

    #[test]
    fn test_pack_exact_fit() {
        let buffer = pack(&[3.0, 4.0], encoded_len(2)).unwrap();
        assert_eq!(buffer.len(), 12);
    }

    #[test]
    fn test_pack_overflow() {
        let err = pack(&[1.0, 2.0, 3.0], 15).unwrap_err();
        assert_eq!(
            err,
            CodecError::BufferOverflow {
                required: 16,
                capacity: 15
            }
        );

        // Even the prefix alone does not fit
        assert!(matches!(
            pack(&[], 3),
            Err(CodecError::BufferOverflow { .. })
        ));
    }

    #[test]
    fn test_unpack_too_small() {
        let buffer = [0u8; 10];
        let err = unpack(&buffer, 4, 2).unwrap_err();
        assert_eq!(
            err,
            CodecError::BufferTooSmall {
                required: 8,
                available: 6
            }
        );

        // Offset past the end
        assert!(unpack(&buffer, 20, 1).is_err());
    }

    #[test]
    fn test_unpack_result_offset() {
        let mut buffer = vec![0u8; 12];
        buffer[4..8].copy_from_slice(&6.25f32.to_le_bytes());

        assert_eq!(unpack_result(&buffer, 4).unwrap(), 6.25);
        assert_eq!(unpack_result(&buffer, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_max_values() {
        assert_eq!(max_values(4096), 1023);
        assert_eq!(max_values(4), 0);
        assert_eq!(max_values(0), 0);
    }
}
