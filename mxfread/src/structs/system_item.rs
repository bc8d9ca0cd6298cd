//! Content package system items.
//!
//! The system metadata pack (SMPTE 331/385/405) is a fixed 57-byte layout:
//!
//! | offset | size | field |
//! |-------:|-----:|-------|
//! | 0  | 1  | system metadata bitmap |
//! | 1  | 1  | content package rate |
//! | 2  | 1  | content package type |
//! | 3  | 2  | channel handle |
//! | 5  | 2  | continuity count |
//! | 7  | 16 | SMPTE universal label |
//! | 23 | 17 | creation date/time stamp |
//! | 40 | 17 | user date/time stamp |
//!
//! A date/time stamp whose first byte is `0x81` carries an SMPTE 12M timecode.

use anyhow::{Result, bail};

use crate::structs::timecode::Timecode;
use crate::utils::errors::SystemItemError;
use crate::utils::ul::Ul;

pub const SYSTEM_METADATA_PACK_LEN: usize = 57;
pub const STAMP_LEN: usize = 17;
pub const STAMP_TYPE_SMPTE_12M: u8 = 0x81;

const BITMAP_CREATION_STAMP: u8 = 0x10;
const BITMAP_USER_STAMP: u8 = 0x08;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMetadataPack {
    pub bitmap: u8,
    pub content_package_rate: u8,
    pub content_package_type: u8,
    pub channel_handle: u16,
    pub continuity_count: u16,
    pub label: Ul,
    pub creation_stamp: [u8; STAMP_LEN],
    pub user_stamp: [u8; STAMP_LEN],
}

impl SystemMetadataPack {
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < SYSTEM_METADATA_PACK_LEN {
            bail!(SystemItemError::PackTooShort(value.len()));
        }

        let mut label = [0; 16];
        label.copy_from_slice(&value[7..23]);
        let mut creation_stamp = [0; STAMP_LEN];
        creation_stamp.copy_from_slice(&value[23..40]);
        let mut user_stamp = [0; STAMP_LEN];
        user_stamp.copy_from_slice(&value[40..57]);

        Ok(Self {
            bitmap: value[0],
            content_package_rate: value[1],
            content_package_type: value[2],
            channel_handle: u16::from_be_bytes([value[3], value[4]]),
            continuity_count: u16::from_be_bytes([value[5], value[6]]),
            label: Ul(label),
            creation_stamp,
            user_stamp,
        })
    }

    fn stamp_timecode(present: bool, stamp: &[u8; STAMP_LEN]) -> Result<Option<Timecode>> {
        if !present || stamp[0] != STAMP_TYPE_SMPTE_12M {
            return Ok(None);
        }
        Timecode::from_smpte12m(&stamp[1..5])
            .map(Some)
            .map_err(|e| SystemItemError::InvalidTimecode(e.to_string()).into())
    }

    pub fn creation_timecode(&self) -> Result<Option<Timecode>> {
        Self::stamp_timecode(self.bitmap & BITMAP_CREATION_STAMP != 0, &self.creation_stamp)
    }

    pub fn user_timecode(&self) -> Result<Option<Timecode>> {
        Self::stamp_timecode(self.bitmap & BITMAP_USER_STAMP != 0, &self.user_stamp)
    }
}

/// Splits a CRC-32 element value into one big-endian CRC per essence element.
pub fn parse_crc32_element(value: &[u8]) -> Result<Vec<u32>> {
    if value.len() % 4 != 0 {
        bail!(SystemItemError::InvalidCrc32Length(value.len()));
    }
    Ok(value
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// System item content collected from one content package.
#[derive(Debug, Clone, Default)]
pub struct SystemItem {
    pub metadata_pack: Option<SystemMetadataPack>,
    pub creation_timecode: Option<Timecode>,
    pub user_timecode: Option<Timecode>,
    pub crc32: Option<Vec<u32>>,
}

impl SystemItem {
    pub fn set_metadata_pack(&mut self, value: &[u8]) -> Result<()> {
        let pack = SystemMetadataPack::parse(value)?;
        self.creation_timecode = pack.creation_timecode()?;
        self.user_timecode = pack.user_timecode()?;
        self.metadata_pack = Some(pack);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::testutil::system_metadata_pack_value;

    #[test]
    fn timecode_stamps() -> Result<()> {
        let creation = "10:00:01:02".parse::<Timecode>()?;
        let value = system_metadata_pack_value(Some(creation), None);

        let mut item = SystemItem::default();
        item.set_metadata_pack(&value)?;
        assert_eq!(item.creation_timecode, Some(creation));
        assert_eq!(item.user_timecode, None);
        Ok(())
    }

    #[test]
    fn short_pack_is_fatal() {
        let value = system_metadata_pack_value(None, None);
        assert!(SystemMetadataPack::parse(&value[..56]).is_err());
    }

    #[test]
    fn malformed_stamp_is_fatal() {
        let mut value = system_metadata_pack_value(None, None);
        value[0] |= BITMAP_CREATION_STAMP;
        value[23] = STAMP_TYPE_SMPTE_12M;
        value[24] = 0x3F;
        let mut item = SystemItem::default();
        assert!(item.set_metadata_pack(&value).is_err());
    }

    #[test]
    fn crc32_element_length() -> Result<()> {
        assert_eq!(
            parse_crc32_element(&[0xCB, 0xF4, 0x39, 0x26, 0, 0, 0, 1])?,
            vec![0xCBF4_3926, 1]
        );
        assert!(parse_crc32_element(&[0, 0, 0]).is_err());
        Ok(())
    }
}
