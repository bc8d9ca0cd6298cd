//! SMPTE RDD 6 Dolby metadata.
//!
//! An RDD-6 frame is carried as two sub-frames. Each sub-frame starts with a
//! 16-bit sync word and a sync segment, is followed by data segments, and is
//! closed by a zero id byte and the end sync word.

pub mod frame;
pub mod payload;
pub mod segment;
pub mod tables;

pub const FIRST_SUBFRAME_SYNC_WORD: u16 = 0x3D0A;
pub const SECOND_SUBFRAME_SYNC_WORD: u16 = 0x3D0B;
pub const END_SYNC_WORD: u16 = 0x0B3D;

/// Payload sizes from 1 to 256 bytes; a size byte of 0 encodes 256.
pub const MAX_PAYLOAD_SIZE: usize = 256;

pub const DOLBY_E_COMPLETE_ID: u8 = 1;
pub const DOLBY_E_ESSENTIAL_ID: u8 = 2;
pub const DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID: u8 = 3;
pub const DOLBY_DIGITAL_ESSENTIAL_EXT_BSI_ID: u8 = 4;
pub const DOLBY_DIGITAL_COMPLETE_ID: u8 = 5;
pub const DOLBY_DIGITAL_ESSENTIAL_ID: u8 = 6;
