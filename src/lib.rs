//! Bottom LZ (BLZ) coding, as used for Nintendo DS/DSi ARM binaries
//!
//! BLZ is an LZSS variant that runs over the data back to front, so that a
//! decoder can expand a binary in place: it reads the packed stream from the
//! top of the buffer down and writes output from the top down, and the write
//! cursor never overtakes the read cursor.
//!
//! An encoded buffer ends in a trailer. Four zero bytes mean the data is
//! stored as-is; otherwise the trailer gives the size of the packed part and
//! how much it grows by when decoded. Everything before the packed part is
//! copied through unchanged.
#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "alloc")]
mod compress;
mod crc;
mod decompress;
#[cfg(feature = "alloc")]
pub mod rom;
mod search;
mod util;

#[cfg(feature = "alloc")]
pub use compress::{
    compress_to_buf, compress_to_vec, compress_with_options, max_compressed_len, CompressError,
    CompressOptions, CompressionMode, ARM9_UNCOMPRESSED_PREFIX,
};
pub use crc::crc16;
#[cfg(feature = "alloc")]
pub use decompress::{decompress_to_vec, Decompressed};
pub use decompress::{decompress_to_buf, DecodeWarnings, DecompressError, Frame, Trailer};
pub use search::{
    find_best_match, find_match, lookahead_rejects, Match, Token, MAX_DIST, MAX_MATCH, MIN_DIST,
    MIN_MATCH,
};
pub use util::{align4, invert};

/// Largest input the 24-bit length fields can describe
pub const RAW_MAX: usize = 0x00ff_ffff;

/// Flag bit of the first token in a group
pub(crate) const FLAG_MASK: u8 = 0x80;
