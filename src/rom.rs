//! Nintendo DS/DSi ROM helpers around the codec
//!
//! Everything here works on byte slices. Finding files, reading and writing
//! them is left to the caller.

use core::fmt;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::compress::{compress_with_options, CompressError, CompressOptions, CompressionMode};
use crate::crc::crc16;
use crate::decompress::Frame;
use crate::util::*;

/// Bytes of the header that [RomHeader::parse] looks at
pub const HEADER_LEN: usize = 0x1e0;

const MODULE_PARAMS_MAGIC: [u32; 2] = [0xdec0_0621, 0x2106_c0de];
/// Module params further in than this are not the SDK's
const MODULE_PARAMS_MAX_OFFSET: usize = 0x3000;

/// MBK6 setting of titles that touch the GBA slot
pub const A7MBK6_GBA_SLOT: u32 = 0x0040_3000;

// SDK5 GBA slot init prologues, primary and alternate encodings
const GBA_SLOT_INIT_ARM: [[u32; 3]; 2] = [
    [0xe92d_4038, 0xe59f_0094, 0xe590_1008],
    [0xe92d_4038, 0xe59f_4090, 0xe594_0008],
];
const GBA_SLOT_INIT_THUMB: [[u16; 3]; 2] = [[0xb538, 0x4818, 0x6881], [0xb538, 0x4c18, 0x68a0]];

const ARM_BX_LR: u32 = 0xe12f_ff1e;
const THUMB_BX_LR: u16 = 0x4770;

const SECURE_AREA_ID: u32 = 0xe7ff_deff;
const SECURE_AREA_ID_TAIL: u16 = 0xdeff;
const SECURE_AREA_LEN: usize = 0x800;

#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RomError {
    /// The ROM is shorter than its header.
    HeaderTooShort,
    /// A binary described by the header lies outside the ROM.
    RegionOutOfBounds,
    /// The ARM9 binary has no module params.
    ModuleParamsNotFound,
    /// The module params are not where the SDK puts them.
    ModuleParamsInvalid,
    /// The module params already record a compressed binary.
    AlreadyCompressed,
    /// The field to patch is not in the uncompressed part of the output.
    PatchOutOfBounds,
    Compress(CompressError),
}

impl fmt::Display for RomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RomError::HeaderTooShort => write!(f, "ROM header is truncated"),
            RomError::RegionOutOfBounds => write!(f, "binary lies outside the ROM"),
            RomError::ModuleParamsNotFound => write!(f, "module params not found"),
            RomError::ModuleParamsInvalid => write!(f, "module params offset is invalid"),
            RomError::AlreadyCompressed => write!(f, "ARM9 binary already compressed"),
            RomError::PatchOutOfBounds => write!(f, "patch location is not stored verbatim"),
            RomError::Compress(e) => write!(f, "compression failed: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RomError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RomError::Compress(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CompressError> for RomError {
    fn from(e: CompressError) -> Self {
        RomError::Compress(e)
    }
}

/// The header fields the optimizer needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomHeader {
    pub title_id: [u8; 3],
    pub arm9_rom_offset: u32,
    pub arm9_ram_address: u32,
    pub arm9_size: u32,
    pub arm7_rom_offset: u32,
    pub arm7_size: u32,
    pub a7mbk6: u32,
    pub arm7i_rom_offset: u32,
    pub device_list_address: u32,
    pub arm7i_size: u32,
}

impl RomHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, RomError> {
        if rom.len() < HEADER_LEN {
            return Err(RomError::HeaderTooShort);
        }
        let word = |pos| read_u32_le(rom, pos).ok_or(RomError::HeaderTooShort);

        Ok(Self {
            title_id: [rom[0x0c], rom[0x0d], rom[0x0e]],
            arm9_rom_offset: word(0x20)?,
            arm9_ram_address: word(0x28)?,
            arm9_size: word(0x2c)?,
            arm7_rom_offset: word(0x30)?,
            arm7_size: word(0x3c)?,
            a7mbk6: word(0x1a0)?,
            arm7i_rom_offset: word(0x1d0)?,
            device_list_address: word(0x1d4)?,
            arm7i_size: word(0x1dc)?,
        })
    }

    pub fn arm9<'a>(&self, rom: &'a [u8]) -> Result<&'a [u8], RomError> {
        region(rom, self.arm9_rom_offset, self.arm9_size)
    }

    pub fn arm7<'a>(&self, rom: &'a [u8]) -> Result<&'a [u8], RomError> {
        region(rom, self.arm7_rom_offset, self.arm7_size)
    }

    pub fn arm7i<'a>(&self, rom: &'a [u8]) -> Result<&'a [u8], RomError> {
        region(rom, self.arm7i_rom_offset, self.arm7i_size)
    }
}

fn region(rom: &[u8], offset: u32, len: u32) -> Result<&[u8], RomError> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or(RomError::RegionOutOfBounds)?;
    rom.get(start..end).ok_or(RomError::RegionOutOfBounds)
}

/// Write the donor's MBK6 and device list words into a ROM header
pub fn patch_base_header(
    rom: &mut [u8],
    a7mbk6: u32,
    device_list_address: u32,
) -> Result<(), RomError> {
    if rom.len() < HEADER_LEN {
        return Err(RomError::HeaderTooShort);
    }
    write_u32_le(rom, 0x1a0, a7mbk6).ok_or(RomError::HeaderTooShort)?;
    write_u32_le(rom, 0x1d4, device_list_address).ok_or(RomError::HeaderTooShort)?;
    Ok(())
}

/// The SDK's module params block inside an ARM9 binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleParams {
    /// Offset of the magic words
    pub offset: usize,
    pub sdk_major: u8,
    pub sdk_minor: u8,
    /// Nonzero once the binary has been compressed
    pub compressed_static_end: u32,
}

impl ModuleParams {
    /// Scan word-aligned offsets for the module params magic
    pub fn find(arm9: &[u8]) -> Option<Self> {
        (8..arm9.len())
            .step_by(4)
            .find(|&off| {
                read_u32_le(arm9, off) == Some(MODULE_PARAMS_MAGIC[0])
                    && read_u32_le(arm9, off + 4) == Some(MODULE_PARAMS_MAGIC[1])
            })
            .map(|offset| Self {
                offset,
                sdk_major: arm9[offset - 1],
                sdk_minor: arm9[offset - 2],
                compressed_static_end: read_u32_le(arm9, offset - 8).unwrap_or(0),
            })
    }

    pub fn check(&self) -> Result<(), RomError> {
        if self.compressed_static_end != 0 {
            return Err(RomError::AlreadyCompressed);
        }
        if self.offset >= MODULE_PARAMS_MAX_OFFSET {
            return Err(RomError::ModuleParamsInvalid);
        }
        Ok(())
    }

    /// Offset of the compressed-static-end field
    pub fn static_end_offset(&self) -> usize {
        self.offset - 8
    }
}

/// Stub out the SDK5 GBA slot init routine with `bx lr`
///
/// Only applies when `a7mbk6` is [A7MBK6_GBA_SLOT]. ARM code is searched
/// first, then Thumb. Returns true if a routine was patched.
pub fn patch_gba_slot_init(arm9: &mut [u8], a7mbk6: u32) -> bool {
    if a7mbk6 != A7MBK6_GBA_SLOT {
        return false;
    }

    let arm = (0..arm9.len()).step_by(4).find(|&i| {
        (0..3).all(|k| {
            read_u32_le(arm9, i + 4 * k)
                .is_some_and(|w| GBA_SLOT_INIT_ARM.iter().any(|sig| sig[k] == w))
        })
    });
    if let Some(i) = arm {
        return write_u32_le(arm9, i, ARM_BX_LR).is_some();
    }

    let thumb = (0..arm9.len()).step_by(2).find(|&i| {
        (0..3).all(|k| {
            read_u16_le(arm9, i + 2 * k)
                .is_some_and(|h| GBA_SLOT_INIT_THUMB.iter().any(|sig| sig[k] == h))
        })
    });
    match thumb {
        Some(i) => write_u16_le(arm9, i, THUMB_BX_LR).is_some(),
        None => false,
    }
}

/// State of the ARM9 secure area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureAreaStatus {
    /// The binary is smaller than 16 KiB.
    TooShort,
    /// The secure area ID words are missing.
    BadId,
    /// The last halfword of the 2 KiB secure area is not zero.
    BadEnd,
    CrcOk,
    CrcMismatch { stored: u16, computed: u16 },
}

/// Validate the secure area ID and its CRC-16
pub fn check_secure_area(arm9: &[u8]) -> SecureAreaStatus {
    if arm9.len() < crate::compress::ARM9_UNCOMPRESSED_PREFIX {
        return SecureAreaStatus::TooShort;
    }
    let id_ok = (0..3).all(|k| read_u32_le(arm9, 4 * k) == Some(SECURE_AREA_ID))
        && read_u16_le(arm9, 0x0c) == Some(SECURE_AREA_ID_TAIL);
    if !id_ok {
        return SecureAreaStatus::BadId;
    }
    if read_u16_le(arm9, SECURE_AREA_LEN - 2) != Some(0) {
        return SecureAreaStatus::BadEnd;
    }

    let computed = crc16(&arm9[0x10..SECURE_AREA_LEN]);
    match read_u16_le(arm9, 0x0e) {
        Some(stored) if stored != computed => SecureAreaStatus::CrcMismatch { stored, computed },
        _ => SecureAreaStatus::CrcOk,
    }
}

/// Like [check_secure_area], but rewrites a mismatched CRC
///
/// The status returned is the one found before repairing.
pub fn repair_secure_area_crc(arm9: &mut [u8]) -> SecureAreaStatus {
    let status = check_secure_area(arm9);
    if let SecureAreaStatus::CrcMismatch { computed, .. } = status {
        write_u16_le(arm9, 0x0e, computed);
    }
    status
}

/// Record the end of the compressed binary in its module params
///
/// Returns the value written, `arm9_ram_address + packed.len()`.
pub fn patch_static_end(
    packed: &mut [u8],
    params: &ModuleParams,
    arm9_ram_address: u32,
) -> Result<u32, RomError> {
    let pos = params.static_end_offset();
    let verbatim_len = match Frame::parse(packed, None).map_err(|_| RomError::PatchOutOfBounds)? {
        Frame::Stored { len } => len,
        Frame::Compressed { verbatim_len, .. } => verbatim_len,
    };
    if pos + 4 > verbatim_len {
        return Err(RomError::PatchOutOfBounds);
    }

    let value = arm9_ram_address.wrapping_add(packed.len() as u32);
    write_u32_le(packed, pos, value).ok_or(RomError::PatchOutOfBounds)?;
    Ok(value)
}

/// Donor ROM file names to try for an SDK version, best match first
pub fn donor_names(sdk_major: u8, sdk_minor: u8) -> Vec<String> {
    (0..=sdk_minor)
        .rev()
        .map(|minor| format!("sdk{}{}.nds", sdk_major, minor))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Arm9Options {
    pub mode: CompressionMode,
    /// Rewrite a wrong secure area CRC before compressing
    pub repair_secure_area_crc: bool,
}

/// Result of [compress_arm9]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm9Output {
    pub header: RomHeader,
    pub params: ModuleParams,
    /// The encoded binary, static end already patched
    pub packed: Vec<u8>,
    pub static_end: u32,
    pub gba_slot_patched: bool,
    pub secure_area: SecureAreaStatus,
}

/// Extract, patch and compress the ARM9 binary of a ROM
pub fn compress_arm9(rom: &[u8], opts: &Arm9Options) -> Result<Arm9Output, RomError> {
    let header = RomHeader::parse(rom)?;
    let mut arm9 = header.arm9(rom)?.to_vec();

    let params = ModuleParams::find(&arm9).ok_or(RomError::ModuleParamsNotFound)?;
    params.check()?;

    let gba_slot_patched = patch_gba_slot_init(&mut arm9, header.a7mbk6);
    let secure_area = if opts.repair_secure_area_crc {
        repair_secure_area_crc(&mut arm9)
    } else {
        check_secure_area(&arm9)
    };

    let mut packed = compress_with_options(&arm9, &CompressOptions::arm9(opts.mode))?;
    let static_end = patch_static_end(&mut packed, &params, header.arm9_ram_address)?;

    Ok(Arm9Output {
        header,
        params,
        packed,
        static_end,
        gba_slot_patched,
        secure_area,
    })
}
