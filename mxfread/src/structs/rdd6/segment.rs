//! Sync and data segments.
//!
//! A data segment on the wire is `id (8) | size (8) | payload | checksum (8)`,
//! where a size byte of 0 stands for a 256-byte payload and the checksum is
//! the two's complement of the 8-bit sum of the size byte and the payload.

use anyhow::{Result, bail};

use super::{
    DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID, DOLBY_DIGITAL_ESSENTIAL_ID, MAX_PAYLOAD_SIZE,
};
use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::errors::Rdd6Error;

/// Sync segment fields following the 16-bit sync word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncSegment {
    pub rev_id: u8,
    pub originator_id: u8,
    pub originator_address: u16,
    pub frame_count: u16,
}

impl SyncSegment {
    /// Bytes after the sync word.
    pub const LEN: usize = 6;

    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        if reader.available_bytes()? < Self::LEN as u64 {
            bail!(Rdd6Error::Truncated("sync segment"));
        }
        Ok(Self {
            rev_id: reader.get_n(8)?,
            originator_id: reader.get_n(8)?,
            originator_address: reader.get_n(16)?,
            frame_count: reader.get_n(16)?,
        })
    }

    pub fn write(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        writer.put_n(8, self.rev_id)?;
        writer.put_n(8, self.originator_id)?;
        writer.put_n(16, self.originator_address)?;
        writer.put_n(16, self.frame_count)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub id: u8,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

impl DataSegment {
    /// Wraps a payload and computes its checksum.
    pub fn new(id: u8, payload: Vec<u8>) -> Result<Self> {
        if id == 0 {
            bail!(Rdd6Error::ReservedSegmentId);
        }
        if payload.is_empty() || payload.len() > MAX_PAYLOAD_SIZE {
            bail!(Rdd6Error::InvalidPayloadSize(payload.len()));
        }
        let checksum = Self::calc_checksum(Self::encode_size(payload.len()), &payload);
        Ok(Self {
            id,
            payload,
            checksum,
        })
    }

    /// Size byte for a payload length, 256 wrapping to 0.
    pub fn encode_size(len: usize) -> u8 {
        (len & 0xFF) as u8
    }

    pub fn decode_size(size_byte: u8) -> usize {
        if size_byte == 0 {
            MAX_PAYLOAD_SIZE
        } else {
            size_byte as usize
        }
    }

    pub fn size_byte(&self) -> u8 {
        Self::encode_size(self.payload.len())
    }

    /// Checksum over the size byte as it appears on the wire and the payload.
    pub fn calc_checksum(size_byte: u8, payload: &[u8]) -> u8 {
        payload
            .iter()
            .fold(size_byte, |sum, &b| sum.wrapping_add(b))
            .wrapping_neg()
    }

    pub fn has_valid_checksum(&self) -> bool {
        Self::calc_checksum(self.size_byte(), &self.payload) == self.checksum
    }

    /// Leading 5-bit program id of the AC-3 family payloads.
    ///
    /// Other segment ids carry no program id and yield `None`.
    pub fn program_id(&self) -> Option<u8> {
        if !(DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID..=DOLBY_DIGITAL_ESSENTIAL_ID).contains(&self.id) {
            return None;
        }
        self.payload.first().map(|b| b >> 3)
    }

    pub fn write(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        if self.payload.is_empty() || self.payload.len() > MAX_PAYLOAD_SIZE {
            bail!(Rdd6Error::InvalidPayloadSize(self.payload.len()));
        }
        writer.put_n(8, self.id)?;
        writer.put_n(8, self.size_byte())?;
        writer.put_bytes(&self.payload)?;
        writer.put_n(8, self.checksum)?;
        Ok(())
    }

    /// Reads the segment following an already consumed non-zero id byte.
    ///
    /// The checksum is returned as stored; callers decide how to treat a
    /// mismatch.
    pub fn read(id: u8, reader: &mut BsIoSliceReader) -> Result<Self> {
        if reader.available_bytes()? < 1 {
            bail!(Rdd6Error::Truncated("data segment size"));
        }
        let size = Self::decode_size(reader.get_n(8)?);
        if reader.available_bytes()? < size as u64 + 1 {
            bail!(Rdd6Error::Truncated("data segment payload"));
        }
        let payload = reader.get_bytes(size)?;
        let checksum = reader.get_n(8)?;

        Ok(Self {
            id,
            payload,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_zero_means_256() -> Result<()> {
        let payload = vec![1u8; 256];
        let segment = DataSegment::new(7, payload)?;
        assert_eq!(segment.size_byte(), 0);
        // 256 ones sum to 0 modulo 256 and the size byte contributes 0
        assert_eq!(segment.checksum, 0);
        assert!(segment.has_valid_checksum());

        let mut writer = BsIoVecWriter::default();
        segment.write(&mut writer)?;
        let bytes = writer.into_bytes()?;
        assert_eq!(bytes.len(), 259);
        assert_eq!(bytes[1], 0);

        let mut reader = BsIoSliceReader::from_slice(&bytes[1..]);
        let parsed = DataSegment::read(7, &mut reader)?;
        assert_eq!(parsed.payload.len(), 256);
        assert_eq!(parsed, segment);
        Ok(())
    }

    #[test]
    fn checksum_covers_size_byte() -> Result<()> {
        let segment = DataSegment::new(5, vec![0x10, 0x20])?;
        assert_eq!(segment.checksum, 0u8.wrapping_sub(2 + 0x10 + 0x20));
        for len in [1usize, 127, 255, 256] {
            assert_eq!(DataSegment::decode_size(DataSegment::encode_size(len)), len);
        }
        Ok(())
    }

    #[test]
    fn program_id_only_for_ac3_segments() -> Result<()> {
        let ac3 = DataSegment::new(5, vec![0b0001_1000, 0])?;
        assert_eq!(ac3.program_id(), Some(3));
        let dolby_e = DataSegment::new(1, vec![0b0001_1000, 0])?;
        assert_eq!(dolby_e.program_id(), None);
        Ok(())
    }

    #[test]
    fn truncated_payload() {
        let bytes = [0x04, 0xAA, 0xBB];
        let mut reader = BsIoSliceReader::from_slice(&bytes);
        assert!(DataSegment::read(1, &mut reader).is_err());
    }
}
