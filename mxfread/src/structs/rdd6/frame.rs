use anyhow::{Result, bail};

use super::segment::{DataSegment, SyncSegment};
use super::{
    DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID, DOLBY_DIGITAL_ESSENTIAL_ID, END_SYNC_WORD,
    FIRST_SUBFRAME_SYNC_WORD, SECOND_SUBFRAME_SYNC_WORD,
};
use crate::utils::bitstream_io::BsIoVecWriter;
use crate::utils::errors::Rdd6Error;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubFrame {
    pub sync: SyncSegment,
    pub segments: Vec<DataSegment>,
}

impl SubFrame {
    fn write(&self, sync_word: u16, writer: &mut BsIoVecWriter) -> Result<()> {
        writer.put_n(16, sync_word)?;
        self.sync.write(writer)?;
        for segment in &self.segments {
            segment.write(writer)?;
        }
        writer.put_n::<u8>(8, 0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rdd6Frame {
    pub first: SubFrame,
    pub second: SubFrame,
}

impl Rdd6Frame {
    /// Serializes both sub-frames and the end sync word.
    ///
    /// Also returns the byte length of the first sub-frame, where the second
    /// one starts when the frame is split over two ANC packets.
    pub fn construct(&self) -> Result<(Vec<u8>, usize)> {
        let mut writer = BsIoVecWriter::default();
        self.first.write(FIRST_SUBFRAME_SYNC_WORD, &mut writer)?;
        let first_len = (writer.position() >> 3) as usize;
        self.second.write(SECOND_SUBFRAME_SYNC_WORD, &mut writer)?;
        writer.put_n(16, END_SYNC_WORD)?;

        Ok((writer.into_bytes()?, first_len))
    }

    pub fn segments(&self) -> impl Iterator<Item = &DataSegment> {
        self.first.segments.iter().chain(self.second.segments.iter())
    }

    /// All data segments with `id` across both sub-frames.
    pub fn data_segments(&self, id: u8) -> Vec<&DataSegment> {
        self.segments().filter(|s| s.id == id).collect()
    }

    /// First AC-3 family segment with `id` that belongs to `program_id`.
    pub fn program_data_segment(&self, id: u8, program_id: u8) -> Result<Option<&DataSegment>> {
        if !(DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID..=DOLBY_DIGITAL_ESSENTIAL_ID).contains(&id) {
            bail!(Rdd6Error::NoProgramId(id));
        }
        Ok(self
            .segments()
            .find(|s| s.id == id && s.program_id() == Some(program_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Result<Rdd6Frame> {
        Ok(Rdd6Frame {
            first: SubFrame {
                sync: SyncSegment {
                    rev_id: 1,
                    originator_id: 2,
                    originator_address: 0x0304,
                    frame_count: 5,
                },
                segments: vec![
                    DataSegment::new(5, vec![0b0000_1000, 1])?,
                    DataSegment::new(5, vec![0b0001_0000, 2])?,
                ],
            },
            second: SubFrame {
                sync: SyncSegment::default(),
                segments: vec![DataSegment::new(0x40, vec![0xAA])?],
            },
        })
    }

    #[test]
    fn construct_layout() -> Result<()> {
        let (bytes, first_len) = frame()?.construct()?;
        // sync word, sync segment, two 5-byte segments, terminator
        assert_eq!(first_len, 2 + 6 + 10 + 1);
        assert_eq!(&bytes[..2], &[0x3D, 0x0A]);
        assert_eq!(&bytes[first_len..first_len + 2], &[0x3D, 0x0B]);
        assert_eq!(bytes.len(), first_len + 2 + 6 + 4 + 1 + 2);
        assert_eq!(&bytes[bytes.len() - 2..], &[0x0B, 0x3D]);
        Ok(())
    }

    #[test]
    fn program_lookup() -> Result<()> {
        let frame = frame()?;
        assert_eq!(frame.data_segments(5).len(), 2);
        assert_eq!(frame.data_segments(0x40).len(), 1);
        let segment = frame.program_data_segment(5, 2)?;
        assert_eq!(segment.map(|s| s.payload[1]), Some(2));
        assert!(frame.program_data_segment(5, 3)?.is_none());
        assert!(frame.program_data_segment(1, 0).is_err());
        Ok(())
    }
}
