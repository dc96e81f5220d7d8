use core::fmt;

use crate::decompress::Trailer;
use crate::search::*;
use crate::util::*;
use crate::{FLAG_MASK, RAW_MAX};

use alloc::vec::Vec;

/// Leading bytes of an ARM9 binary that stay uncompressed
pub const ARM9_UNCOMPRESSED_PREFIX: usize = 0x4000;

/// Compression errors
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompressError {
    /// The input is longer than the 24-bit length fields allow.
    InputTooLarge,
    /// The work buffers could not be allocated.
    OutOfMemory,
    /// The output buffer was too small to hold all the output.
    OutputTooSmall,
}
impl fmt::Display for CompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressError::InputTooLarge => write!(f, "input is larger than 16 MiB - 1"),
            CompressError::OutOfMemory => write!(f, "out of memory"),
            CompressError::OutputTooSmall => write!(f, "output buffer was insufficient"),
        }
    }
}
#[cfg(feature = "std")]
impl std::error::Error for CompressError {}

/// Parsing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    /// Always take the longest match at the cursor
    Normal,
    /// Drop a match when the lookahead finds a better one a byte later
    Best,
}
impl Default for CompressionMode {
    fn default() -> Self {
        Self::Normal
    }
}

/// Compression settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressOptions {
    pub mode: CompressionMode,
    /// Number of leading (forward order) bytes that are never compressed
    ///
    /// Clamped to the input length.
    pub uncompressed_prefix: usize,
}
impl CompressOptions {
    pub fn new(mode: CompressionMode) -> Self {
        Self {
            mode,
            uncompressed_prefix: 0,
        }
    }

    /// Settings for an ARM9 binary, whose first 16 KiB must stay in place
    pub fn arm9(mode: CompressionMode) -> Self {
        Self {
            mode,
            uncompressed_prefix: ARM9_UNCOMPRESSED_PREFIX,
        }
    }
}

/// Receives the token stream in encoding order
pub(crate) trait TokenSink {
    fn put_lit(&mut self, b: u8);
    fn put_match(&mut self, m: Match);
    /// Number of packed bytes produced so far
    fn packed_len(&self) -> usize;
}

/// Packs tokens as flag-byte-prefixed groups of up to 8
struct FlagPacker {
    out: Vec<u8>,
    flag_pos: usize,
    mask: u8,
}
impl FlagPacker {
    fn with_capacity(cap: usize) -> Result<Self, CompressError> {
        Ok(Self {
            out: try_alloc(cap)?,
            flag_pos: 0,
            mask: 0,
        })
    }

    fn push_flag(&mut self, bit: u8) {
        self.mask >>= 1;
        if self.mask == 0 {
            self.flag_pos = self.out.len();
            self.out.push(0);
            self.mask = FLAG_MASK;
        }
        self.out[self.flag_pos] = (self.out[self.flag_pos] << 1) | bit;
    }

    /// Shift the last flag byte so its first token sits in the top bit
    fn finish(mut self) -> Vec<u8> {
        while self.mask != 0 && self.mask != 1 {
            self.mask >>= 1;
            self.out[self.flag_pos] <<= 1;
        }
        self.out
    }
}
impl TokenSink for FlagPacker {
    fn put_lit(&mut self, b: u8) {
        self.push_flag(0);
        self.out.push(b);
    }

    fn put_match(&mut self, m: Match) {
        debug_assert!((MIN_MATCH..=MAX_MATCH).contains(&m.len));
        debug_assert!((MIN_DIST..=MAX_DIST).contains(&m.dist));

        self.push_flag(1);
        let len = m.len - MIN_MATCH;
        let dist = m.dist - MIN_DIST;
        self.out.push(((len << 4) | (dist >> 8)) as u8);
        self.out.push(dist as u8);
    }

    fn packed_len(&self) -> usize {
        self.out.len()
    }
}

/// Where to stop compressing: the first `pak` packed bytes cover everything
/// except the last `raw` bytes of the reversed input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CutPoint {
    pak: usize,
    raw: usize,
}

/// Tokenize `rev` (already reversed), tracking the best cut point
///
/// `raw_len` is the full input length, which may exceed `rev.len()` when a
/// prefix is excluded from compression.
fn pack_tokens<S: TokenSink>(
    rev: &[u8],
    raw_len: usize,
    mode: CompressionMode,
    sink: &mut S,
) -> CutPoint {
    let mut cut = CutPoint { pak: 0, raw: raw_len };
    let mut cursor = 0;

    while cursor < rev.len() {
        let mut found = find_best_match(rev, cursor);

        if mode == CompressionMode::Best {
            if let Some(m) = found {
                if lookahead_rejects(rev, cursor, m) {
                    found = None;
                }
            }
        }

        match found {
            Some(m) => {
                sink.put_match(m);
                cursor += m.len;
            }
            None => {
                sink.put_lit(rev[cursor]);
                cursor += 1;
            }
        }

        let remaining = raw_len - cursor;
        if sink.packed_len() + remaining < cut.pak + cut.raw {
            cut = CutPoint {
                pak: sink.packed_len(),
                raw: remaining,
            };
        }
    }

    cut
}

fn try_alloc(cap: usize) -> Result<Vec<u8>, CompressError> {
    let mut v = Vec::new();
    v.try_reserve_exact(cap)
        .map_err(|_| CompressError::OutOfMemory)?;
    Ok(v)
}

/// Raw bytes, zero padded, then an all-zero trailer
fn stored_frame(inp: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut out = try_alloc(max_compressed_len(inp.len()))?;
    out.extend_from_slice(inp);
    out.resize(align4(inp.len()), 0);
    out.extend_from_slice(&[0; 4]);
    Ok(out)
}

/// Uncompressed head, reversed packed tokens, 0xFF padding, trailer
///
/// `increase_len` wraps when the frame is up to 4 bytes longer than the
/// input; the target loader adds it with 32-bit wraparound.
fn compressed_frame(inp: &[u8], pak: &[u8], cut: CutPoint) -> Result<Vec<u8>, CompressError> {
    let body_len = cut.raw + cut.pak;
    let padded_len = align4(body_len);
    let header_len = Trailer::MIN_LEN + (padded_len - body_len);

    let mut out = try_alloc(padded_len + Trailer::MIN_LEN)?;
    out.extend_from_slice(&inp[..cut.raw]);
    out.extend(pak[..cut.pak].iter().rev());
    out.resize(padded_len, 0xff);

    let trailer = Trailer {
        header_len: header_len as u8,
        encoded_len: (cut.pak + header_len) as u32,
        increase_len: (inp.len() as u32).wrapping_sub((body_len + header_len) as u32),
    };
    out.extend_from_slice(&trailer.to_bytes());
    Ok(out)
}

/// Tokenize the reversed input in one mode and build its frame
fn encode_frame(inp: &[u8], rev: &[u8], mode: CompressionMode) -> Result<Vec<u8>, CompressError> {
    let raw_len = inp.len();
    let mut packer = FlagPacker::with_capacity(raw_len + (raw_len + 7) / 8 + 11)?;
    let cut = pack_tokens(rev, raw_len, mode, &mut packer);
    let pak = packer.finish();

    let frame_len = align4(cut.pak + cut.raw) + Trailer::MIN_LEN;
    // a zero increase field would read as "stored"
    if cut.pak == 0 || raw_len + 4 < frame_len || raw_len == frame_len {
        stored_frame(inp)
    } else {
        compressed_frame(inp, &pak, cut)
    }
}

/// Upper bound on the encoded size of `raw_len` bytes
pub const fn max_compressed_len(raw_len: usize) -> usize {
    align4(raw_len) + 4
}

/// Compress the input with the given settings
///
/// Returns the encoded frame. This falls back to a stored frame when the
/// compressed one would be more than 4 bytes longer than the input.
///
/// The lookahead of [CompressionMode::Best] can lose to greedy parsing, so
/// that mode also encodes greedily and keeps whichever frame is shorter.
pub fn compress_with_options(inp: &[u8], opts: &CompressOptions) -> Result<Vec<u8>, CompressError> {
    if inp.len() > RAW_MAX {
        return Err(CompressError::InputTooLarge);
    }
    let raw_len = inp.len();
    let compress_len = raw_len - usize::min(opts.uncompressed_prefix, raw_len);

    let mut rev = try_alloc(raw_len)?;
    rev.extend_from_slice(inp);
    invert(&mut rev);
    let rev = &rev[..compress_len];

    let out = encode_frame(inp, rev, opts.mode)?;
    if opts.mode == CompressionMode::Best {
        let greedy = encode_frame(inp, rev, CompressionMode::Normal)?;
        if greedy.len() < out.len() {
            return Ok(greedy);
        }
    }
    Ok(out)
}

/// Compress the input into a [Vec](alloc::vec::Vec)
pub fn compress_to_vec(inp: &[u8], mode: CompressionMode) -> Result<Vec<u8>, CompressError> {
    compress_with_options(inp, &CompressOptions::new(mode))
}

/// Compress the input into a preallocated buffer
///
/// Returns the compressed size on success, or an error otherwise. A buffer
/// of [max_compressed_len] bytes is always large enough.
///
/// The frame is built in a temporary [Vec](alloc::vec::Vec) and copied out,
/// so this allocates like [compress_to_vec].
pub fn compress_to_buf(
    inp: &[u8],
    outp: &mut [u8],
    opts: &CompressOptions,
) -> Result<usize, CompressError> {
    let packed = compress_with_options(inp, opts)?;
    let dst = outp
        .get_mut(..packed.len())
        .ok_or(CompressError::OutputTooSmall)?;
    dst.copy_from_slice(&packed);
    Ok(packed.len())
}
