use core::fmt;

use bitflags::bitflags;

use crate::search::{MIN_DIST, MIN_MATCH};
use crate::util::*;
use crate::{FLAG_MASK, RAW_MAX};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecompressError {
    /// The trailer has an impossible shape or header length.
    CorruptHeader,
    /// The trailer's length fields contradict each other or the input.
    BadLength,
    /// The trailer describes more than 16 MiB - 1 of output.
    DecodedTooLarge,
    /// The token stream ended before the output was complete.
    TruncatedStream,
    /// A match reaches before the start of the decoded data.
    InvalidBackreference,
    /// The output buffer was too small to hold all the output.
    OutputTooSmall,
    /// The output buffer could not be allocated.
    OutOfMemory,
}

impl fmt::Display for DecompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompressError::CorruptHeader => write!(f, "bad header"),
            DecompressError::BadLength => write!(f, "bad length"),
            DecompressError::DecodedTooLarge => write!(f, "bad decoded length"),
            DecompressError::TruncatedStream => write!(f, "unexpected end of encoded data"),
            DecompressError::InvalidBackreference => write!(f, "invalid backreference"),
            DecompressError::OutputTooSmall => write!(f, "output buffer was insufficient"),
            DecompressError::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecompressError {}

bitflags! {
    /// Recoverable conditions met while decoding
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DecodeWarnings: u8 {
        /// The input was a stored frame.
        const NOT_COMPRESSED = 0x1;
        /// The token stream ran out early; the output is partial.
        const TRUNCATED_STREAM = 0x2;
        /// A match ran past the end of the output and was cut short.
        const OVERLONG_MATCH = 0x4;
    }
}

/// Footer of a compressed frame
///
/// Layout, little endian: `encoded_len` (3 bytes), `header_len` (1 byte),
/// `increase_len` (4 bytes). A stored frame instead ends in four zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Trailer size including the 0xFF padding in front of it, 8..=11
    pub header_len: u8,
    /// Packed token bytes plus `header_len`
    pub encoded_len: u32,
    /// Decoded size minus encoded size
    pub increase_len: u32,
}
impl Trailer {
    pub const MIN_LEN: usize = 8;
    pub const MAX_LEN: usize = 11;

    pub fn to_bytes(&self) -> [u8; 8] {
        let enc = self.encoded_len | (u32::from(self.header_len) << 24);
        let mut ret = [0u8; 8];
        ret[..4].copy_from_slice(&enc.to_le_bytes());
        ret[4..].copy_from_slice(&self.increase_len.to_le_bytes());
        ret
    }
}

/// Layout of an encoded buffer, derived from its trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// `len` bytes to copy as-is
    Stored { len: usize },
    Compressed {
        trailer: Trailer,
        /// Leading bytes copied as-is
        verbatim_len: usize,
        /// Packed token bytes following the verbatim part
        packed_len: usize,
        raw_len: usize,
    },
}
impl Frame {
    /// Read the trailer at the end of `inp`
    ///
    /// `expected_len` is the decoded size the caller knows about, if any. A
    /// stored frame needs it to tell data from padding.
    pub fn parse(inp: &[u8], expected_len: Option<usize>) -> Result<Self, DecompressError> {
        let total = inp.len();
        let increase_len = read_u32_le(inp, total.wrapping_sub(4))
            .ok_or(DecompressError::CorruptHeader)?;

        if increase_len == 0 {
            return Self::parse_stored(&inp[..total - 4], expected_len);
        }

        if total < Trailer::MIN_LEN {
            return Err(DecompressError::CorruptHeader);
        }
        let header_len = inp[total - 5];
        if !(Trailer::MIN_LEN..=Trailer::MAX_LEN).contains(&(header_len as usize)) {
            return Err(DecompressError::CorruptHeader);
        }
        if total <= header_len as usize {
            return Err(DecompressError::BadLength);
        }
        let encoded_len = read_u32_le(inp, total - 8).ok_or(DecompressError::CorruptHeader)?
            & 0x00ff_ffff;
        let enc = encoded_len as usize;
        if enc <= header_len as usize || enc > total {
            return Err(DecompressError::BadLength);
        }

        let verbatim_len = total - enc;
        let packed_len = enc - header_len as usize;
        // a frame may be up to 4 bytes longer than its output, the increase
        // then wraps below zero
        let raw_len = (total as u32).wrapping_add(increase_len) as usize;
        if raw_len > RAW_MAX {
            return Err(DecompressError::DecodedTooLarge);
        }
        if raw_len < verbatim_len {
            return Err(DecompressError::BadLength);
        }
        if expected_len.is_some_and(|n| n != raw_len) {
            return Err(DecompressError::BadLength);
        }

        Ok(Frame::Compressed {
            trailer: Trailer {
                header_len,
                encoded_len,
                increase_len,
            },
            verbatim_len,
            packed_len,
            raw_len,
        })
    }

    fn parse_stored(payload: &[u8], expected_len: Option<usize>) -> Result<Self, DecompressError> {
        if payload.len() % 4 != 0 {
            return Err(DecompressError::CorruptHeader);
        }
        let len = match expected_len {
            None => payload.len(),
            Some(n) => {
                let padding = payload.get(n..).ok_or(DecompressError::CorruptHeader)?;
                if padding.len() >= 4 || padding.iter().any(|&b| b != 0) {
                    return Err(DecompressError::CorruptHeader);
                }
                n
            }
        };
        if len > RAW_MAX {
            return Err(DecompressError::DecodedTooLarge);
        }
        Ok(Frame::Stored { len })
    }

    /// Size of the decoded output
    pub fn raw_len(&self) -> usize {
        match *self {
            Frame::Stored { len } => len,
            Frame::Compressed { raw_len, .. } => raw_len,
        }
    }
}

fn decompress_impl(
    inp: &[u8],
    frame: &Frame,
    outp: &mut impl OutputSink,
) -> Result<DecodeWarnings, DecompressError> {
    let (verbatim_len, packed_len, raw_len) = match *frame {
        Frame::Stored { len } => {
            outp.put_lits(&inp[..len]);
            return Ok(DecodeWarnings::NOT_COMPRESSED);
        }
        Frame::Compressed {
            verbatim_len,
            packed_len,
            raw_len,
            ..
        } => (verbatim_len, packed_len, raw_len),
    };

    outp.put_lits(&inp[..verbatim_len]);

    // the token stream is stored back to front
    let mut pak = inp[verbatim_len..verbatim_len + packed_len]
        .iter()
        .rev()
        .copied();
    let mut warnings = DecodeWarnings::empty();
    let mut flags = 0;
    let mut mask = 0u8;

    while outp.pos() < raw_len {
        mask >>= 1;
        if mask == 0 {
            let Some(f) = pak.next() else { break };
            flags = f;
            mask = FLAG_MASK;
        }

        if flags & mask == 0 {
            let Some(b) = pak.next() else { break };
            outp.put_lits(&[b]);
        } else {
            let (Some(b0), Some(b1)) = (pak.next(), pak.next()) else {
                break;
            };
            let mut len = (b0 >> 4) as usize + MIN_MATCH;
            let dist = (((b0 & 0xf) as usize) << 8 | b1 as usize) + MIN_DIST;
            if outp.pos() + len > raw_len {
                warnings |= DecodeWarnings::OVERLONG_MATCH;
                len = raw_len - outp.pos();
            }
            if !outp.put_backref(verbatim_len, dist, len) {
                return Err(DecompressError::InvalidBackreference);
            }
        }
    }

    if outp.pos() != raw_len {
        warnings |= DecodeWarnings::TRUNCATED_STREAM;
    }

    invert(&mut outp.written_mut()[verbatim_len..]);

    Ok(warnings)
}

/// Decompress the input into a preallocated buffer
///
/// Returns the decompressed size and any warnings on success. On a
/// truncated stream the size is that of the partial output.
pub fn decompress_to_buf(
    inp: &[u8],
    outp: &mut [u8],
    expected_len: Option<usize>,
) -> Result<(usize, DecodeWarnings), DecompressError> {
    let frame = Frame::parse(inp, expected_len)?;
    let outp = outp
        .get_mut(..frame.raw_len())
        .ok_or(DecompressError::OutputTooSmall)?;
    let mut outp: BufOutput = outp.into();
    let warnings = decompress_impl(inp, &frame, &mut outp)?;
    Ok((outp.pos, warnings))
}

/// Output of [decompress_to_vec]
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub data: Vec<u8>,
    pub warnings: DecodeWarnings,
}

#[cfg(feature = "alloc")]
impl Decompressed {
    /// Treat truncation and clamped matches as errors
    pub fn into_strict(self) -> Result<Vec<u8>, DecompressError> {
        if self.warnings.contains(DecodeWarnings::TRUNCATED_STREAM) {
            Err(DecompressError::TruncatedStream)
        } else if self.warnings.contains(DecodeWarnings::OVERLONG_MATCH) {
            Err(DecompressError::BadLength)
        } else {
            Ok(self.data)
        }
    }
}

#[cfg(feature = "alloc")]
/// Decompress the input into a [Vec](alloc::vec::Vec)
///
/// `expected_len` is checked against the trailer of a compressed frame and
/// strips the padding of a stored one.
pub fn decompress_to_vec(
    inp: &[u8],
    expected_len: Option<usize>,
) -> Result<Decompressed, DecompressError> {
    let frame = Frame::parse(inp, expected_len)?;
    let mut ret = Vec::new();
    ret.try_reserve_exact(frame.raw_len())
        .map_err(|_| DecompressError::OutOfMemory)?;

    let mut ret: VecOutput = ret.into();
    let warnings = decompress_impl(inp, &frame, &mut ret)?;
    Ok(Decompressed {
        data: ret.vec,
        warnings,
    })
}
