//! 8-bit checksums used by the wire formats.

/// CRC-8 polynomial used by the counting-machine and CDM formats.
pub const CRC8_POLY: u8 = 0x31;

/// CRC-8 with polynomial 0x31, zero init, MSB-first, no final XOR.
pub fn crc8(data: &[u8]) -> u8 {
    crc8_with_poly(data, CRC8_POLY)
}

/// Bit-wise CRC-8 over `data` with an arbitrary polynomial.
pub fn crc8_with_poly(data: &[u8], polynomial: u8) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ polynomial;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Sum of all bytes modulo 256 (ZM format).
pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// XOR of all bytes.
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}
