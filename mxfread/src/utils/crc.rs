//! CRC-32 used by the content package CRC side channel.
//!
//! The algorithm is the reflected IEEE 802.3 CRC-32 (as used by zlib and
//! Ethernet), computed over each essence element value in the package.

/// CRC parameters: polynomial, initial register value and final xor.
pub struct Algorithm<T> {
    poly: T,
    init: T,
    xorout: T,
}

/// IEEE 802.3 CRC-32, reflected polynomial form.
pub const CRC_32_IEEE_ALG: Algorithm<u32> = Algorithm {
    poly: 0xEDB8_8320,
    init: 0xFFFF_FFFF,
    xorout: 0xFFFF_FFFF,
};

/// Shifts `len` bits through a reflected CRC-32 register.
#[inline(always)]
pub const fn crc32_reflected(poly: u32, mut value: u32, len: usize) -> u32 {
    let mut i = 0;
    while i < len {
        value = (value >> 1) ^ ((value & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc32_reflected(poly, i as u32, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc32 {
    pub poly: u32,
    pub init: u32,
    pub xorout: u32,
    table: [u32; 256],
}

impl Crc32 {
    pub const fn new(algorithm: &Algorithm<u32>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            xorout: algorithm.xorout,
            table: crc32_table(algorithm.poly),
        }
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table[((crc ^ bytes[i] as u32) & 0xFF) as usize] ^ (crc >> 8);
            i += 1;
        }

        crc
    }

    pub const fn checksum(&self, bytes: &[u8]) -> u32 {
        self.update(self.init, bytes) ^ self.xorout
    }
}

pub static CRC_32_IEEE: Crc32 = Crc32::new(&CRC_32_IEEE_ALG);

#[test]
fn crc32_check_value() {
    assert_eq!(CRC_32_IEEE.checksum(b"123456789"), 0xCBF4_3926);
    assert_eq!(CRC_32_IEEE.checksum(&[]), 0);
}
