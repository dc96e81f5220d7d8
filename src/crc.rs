/// CRC-16 with the reflected 0x8005 polynomial, seeded with 0xFFFF
///
/// This is the checksum Nintendo uses for the ARM9 secure area. It is
/// computed a bit at a time; the inputs it sees are 2 KiB at most.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &b in data {
        crc ^= b as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xa001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
