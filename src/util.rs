/// Reverse a buffer in place
///
/// The codec works "bottom-up": both the raw data and the token stream are
/// processed from the end of the file towards the start.
pub fn invert(buf: &mut [u8]) {
    buf.reverse();
}

/// Round up to the next multiple of 4
pub const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

pub(crate) fn read_u16_le(buf: &[u8], pos: usize) -> Option<u16> {
    let b = buf.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32_le(buf: &[u8], pos: usize) -> Option<u32> {
    let b = buf.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn write_u16_le(buf: &mut [u8], pos: usize, v: u16) -> Option<()> {
    buf.get_mut(pos..pos.checked_add(2)?)?
        .copy_from_slice(&v.to_le_bytes());
    Some(())
}

pub(crate) fn write_u32_le(buf: &mut [u8], pos: usize, v: u32) -> Option<()> {
    buf.get_mut(pos..pos.checked_add(4)?)?
        .copy_from_slice(&v.to_le_bytes());
    Some(())
}

/// Internal abstraction for types of decoder outputs (slice vs Vec)
///
/// Note for all functions: we guarantee writing all the way up to the limit
pub(crate) trait OutputSink {
    /// Number of bytes written so far
    fn pos(&self) -> usize;
    /// Add the given literal run to the output
    ///
    /// Returns false if the output is full.
    fn put_lits(&mut self, lits: &[u8]) -> bool;
    /// Add a backreference to the output
    ///
    /// A `dist` of 1 means the byte just written. Bytes before `floor` are
    /// not part of the reversed region and may not be referenced.
    ///
    /// Returns false if the reference reaches below `floor`.
    fn put_backref(&mut self, floor: usize, dist: usize, len: usize) -> bool;
    /// Everything written so far
    fn written_mut(&mut self) -> &mut [u8];
}

pub(crate) struct BufOutput<'a> {
    pub pos: usize,
    pub buf: &'a mut [u8],
}
impl<'a> From<&'a mut [u8]> for BufOutput<'a> {
    fn from(buf: &'a mut [u8]) -> Self {
        Self { pos: 0, buf }
    }
}
impl<'a> OutputSink for BufOutput<'a> {
    fn pos(&self) -> usize {
        self.pos
    }

    fn put_lits(&mut self, lits: &[u8]) -> bool {
        let mut len = lits.len();
        let mut did_overflow = false;
        if self.pos + len > self.buf.len() {
            did_overflow = true;
            len = self.buf.len() - self.pos;
        }

        self.buf[self.pos..self.pos + len].copy_from_slice(&lits[..len]);
        self.pos += len;

        !did_overflow
    }

    fn put_backref(&mut self, floor: usize, dist: usize, len: usize) -> bool {
        if dist == 0 || self.pos < floor + dist {
            return false;
        }
        let len = usize::min(len, self.buf.len() - self.pos);

        // byte by byte, the source may overlap the destination
        for i in 0..len {
            self.buf[self.pos + i] = self.buf[self.pos - dist + i];
        }
        self.pos += len;
        true
    }

    fn written_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.pos]
    }
}

#[cfg(feature = "alloc")]
pub(crate) struct VecOutput {
    pub vec: alloc::vec::Vec<u8>,
}
#[cfg(feature = "alloc")]
impl From<alloc::vec::Vec<u8>> for VecOutput {
    fn from(vec: alloc::vec::Vec<u8>) -> Self {
        Self { vec }
    }
}
#[cfg(feature = "alloc")]
impl OutputSink for VecOutput {
    fn pos(&self) -> usize {
        self.vec.len()
    }

    fn put_lits(&mut self, lits: &[u8]) -> bool {
        self.vec.extend_from_slice(lits);
        true
    }

    fn put_backref(&mut self, floor: usize, dist: usize, len: usize) -> bool {
        let pos = self.vec.len();
        if dist == 0 || pos < floor + dist {
            return false;
        }

        self.vec.resize(pos + len, 0);
        for i in 0..len {
            self.vec[pos + i] = self.vec[pos - dist + i];
        }
        true
    }

    fn written_mut(&mut self) -> &mut [u8] {
        &mut self.vec
    }
}
