//! Index table segments.
//!
//! Constant bytes-per-element segments carry only an edit unit byte count.
//! Variable bytes-per-element segments carry one entry per edit unit whose
//! stream offset locates the unit relative to the start of the essence
//! container.

use anyhow::{Result, bail};

use crate::structs::metadata::{ItemId, MetadataSet, Rational};
use crate::utils::errors::IndexError;
use crate::utils::ul::Ul;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaEntry {
    pub pos_table_index: i8,
    pub slice: u8,
    pub element_delta: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub temporal_offset: i8,
    pub key_frame_offset: i8,
    pub flags: u8,
    pub stream_offset: u64,
}

#[derive(Debug, Clone, Default)]
pub struct IndexTableSegment {
    pub index_edit_rate: Rational,
    pub index_start_position: i64,
    pub index_duration: i64,
    pub edit_unit_byte_count: u32,
    pub index_sid: u32,
    pub body_sid: u32,
    pub slice_count: u8,
    pub pos_table_count: u8,
    pub delta_entries: Vec<DeltaEntry>,
    pub entries: Vec<IndexEntry>,
}

const INDEX_SID: ItemId = ItemId::Static(0x3F06);
const BODY_SID: ItemId = ItemId::Static(0x3F07);
const EDIT_UNIT_BYTE_COUNT: ItemId = ItemId::Static(0x3F05);
const SLICE_COUNT: ItemId = ItemId::Static(0x3F08);
const DELTA_ENTRY_ARRAY: ItemId = ItemId::Static(0x3F09);
const INDEX_ENTRY_ARRAY: ItemId = ItemId::Static(0x3F0A);
const INDEX_EDIT_RATE: ItemId = ItemId::Static(0x3F0B);
const INDEX_START_POSITION: ItemId = ItemId::Static(0x3F0C);
const INDEX_DURATION: ItemId = ItemId::Static(0x3F0D);
const POS_TABLE_COUNT: ItemId = ItemId::Static(0x3F0E);

fn item<'a>(set: &'a MetadataSet, id: ItemId) -> Option<&'a [u8]> {
    let ItemId::Static(tag) = id else {
        return None;
    };
    set.items
        .iter()
        .find(|item| item.tag == tag)
        .map(|item| item.value.as_slice())
}

fn be_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | b as u64)
}

fn fixed<const N: usize>(set: &MetadataSet, id: ItemId) -> Result<Option<[u8; N]>> {
    match item(set, id) {
        None => Ok(None),
        Some(value) if value.len() == N => {
            let mut bytes = [0; N];
            bytes.copy_from_slice(value);
            Ok(Some(bytes))
        }
        Some(value) => bail!(IndexError::InvalidItemLength {
            tag: id,
            len: value.len()
        }),
    }
}

impl IndexTableSegment {
    pub fn parse(key: &Ul, value: &[u8]) -> Result<Self> {
        let set = MetadataSet::parse(key, value)?;

        let mut segment = Self::default();
        if let Some(rate) = fixed::<8>(&set, INDEX_EDIT_RATE)? {
            segment.index_edit_rate = Rational::new(
                i32::from_be_bytes([rate[0], rate[1], rate[2], rate[3]]),
                i32::from_be_bytes([rate[4], rate[5], rate[6], rate[7]]),
            );
        }
        segment.index_start_position = fixed::<8>(&set, INDEX_START_POSITION)?
            .map_or(0, i64::from_be_bytes);
        segment.index_duration =
            fixed::<8>(&set, INDEX_DURATION)?.map_or(0, i64::from_be_bytes);
        segment.edit_unit_byte_count =
            fixed::<4>(&set, EDIT_UNIT_BYTE_COUNT)?.map_or(0, u32::from_be_bytes);
        segment.index_sid = fixed::<4>(&set, INDEX_SID)?.map_or(0, u32::from_be_bytes);
        segment.body_sid = fixed::<4>(&set, BODY_SID)?.map_or(0, u32::from_be_bytes);
        segment.slice_count = fixed::<1>(&set, SLICE_COUNT)?.map_or(0, |b| b[0]);
        segment.pos_table_count = fixed::<1>(&set, POS_TABLE_COUNT)?.map_or(0, |b| b[0]);

        if let Some(array) = item(&set, DELTA_ENTRY_ARRAY) {
            segment.delta_entries = Self::parse_array(array, 6, |e| DeltaEntry {
                pos_table_index: e[0] as i8,
                slice: e[1],
                element_delta: u32::from_be_bytes([e[2], e[3], e[4], e[5]]),
            })?;
        }

        if let Some(array) = item(&set, INDEX_ENTRY_ARRAY) {
            let min_len =
                11 + 4 * segment.slice_count as usize + 8 * segment.pos_table_count as usize;
            segment.entries = Self::parse_array(array, min_len, |e| IndexEntry {
                temporal_offset: e[0] as i8,
                key_frame_offset: e[1] as i8,
                flags: e[2],
                stream_offset: be_u64(&e[3..11]),
            })?;
        }

        Ok(segment)
    }

    fn parse_array<T>(array: &[u8], min_len: usize, map: impl Fn(&[u8]) -> T) -> Result<Vec<T>> {
        if array.len() < 8 {
            bail!(IndexError::InvalidArray(array.len()));
        }
        let count = u32::from_be_bytes([array[0], array[1], array[2], array[3]]) as usize;
        let len = u32::from_be_bytes([array[4], array[5], array[6], array[7]]) as usize;
        if count > 0 && len < min_len {
            bail!(IndexError::EntryTooShort { len, min_len });
        }
        if count.checked_mul(len).is_none_or(|n| n > array.len() - 8) {
            bail!(IndexError::InvalidArray(array.len()));
        }

        Ok(array[8..]
            .chunks_exact(len.max(1))
            .take(count)
            .map(map)
            .collect())
    }

    pub fn is_cbe(&self) -> bool {
        self.edit_unit_byte_count > 0
    }

    pub fn covers(&self, position: i64) -> bool {
        position >= self.index_start_position
            && position < self.index_start_position + self.index_duration
    }
}

/// Byte offsets, relative to the start of the essence container, of every
/// indexed edit unit, merged from variable bytes-per-element segments.
pub fn collect_stream_offsets(segments: &[IndexTableSegment]) -> Result<Vec<u64>> {
    let mut sorted: Vec<&IndexTableSegment> = segments.iter().filter(|s| !s.is_cbe()).collect();
    sorted.sort_by_key(|s| s.index_start_position);

    let mut offsets = Vec::new();
    for segment in sorted {
        // Repeated segments, e.g. the same table in a body and the footer partition.
        if segment.index_start_position + segment.index_duration <= offsets.len() as i64 {
            continue;
        }
        if segment.index_start_position != offsets.len() as i64 {
            bail!(IndexError::SegmentGap {
                expected: offsets.len() as i64,
                found: segment.index_start_position,
            });
        }
        if segment.entries.len() as i64 != segment.index_duration {
            bail!(IndexError::EntryCountMismatch {
                entries: segment.entries.len(),
                duration: segment.index_duration,
            });
        }
        offsets.extend(segment.entries.iter().map(|e| e.stream_offset));
    }

    if offsets.windows(2).any(|w| w[0] >= w[1]) {
        bail!(IndexError::OffsetsNotIncreasing);
    }

    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::testutil::index_segment_value;
    use crate::utils::ul::INDEX_TABLE_SEGMENT_KEY;

    #[test]
    fn vbe_segments_merge() -> Result<()> {
        let first = IndexTableSegment::parse(
            &INDEX_TABLE_SEGMENT_KEY,
            &index_segment_value(2, 1, 0, 0, &[0, 100, 250]),
        )?;
        let second = IndexTableSegment::parse(
            &INDEX_TABLE_SEGMENT_KEY,
            &index_segment_value(2, 1, 0, 3, &[400, 420]),
        )?;
        assert_eq!(first.index_sid, 2);
        assert!(!first.is_cbe());
        assert!(second.covers(4));

        let offsets = collect_stream_offsets(&[second, first])?;
        assert_eq!(offsets, vec![0, 100, 250, 400, 420]);
        Ok(())
    }

    #[test]
    fn gap_between_segments_is_fatal() -> Result<()> {
        let first = IndexTableSegment::parse(
            &INDEX_TABLE_SEGMENT_KEY,
            &index_segment_value(2, 1, 0, 0, &[0, 100]),
        )?;
        let third = IndexTableSegment::parse(
            &INDEX_TABLE_SEGMENT_KEY,
            &index_segment_value(2, 1, 0, 5, &[900]),
        )?;
        assert!(collect_stream_offsets(&[first, third]).is_err());
        Ok(())
    }

    #[test]
    fn cbe_segment() -> Result<()> {
        let segment = IndexTableSegment::parse(
            &INDEX_TABLE_SEGMENT_KEY,
            &index_segment_value(2, 1, 6408, 0, &[]),
        )?;
        assert!(segment.is_cbe());
        assert_eq!(segment.edit_unit_byte_count, 6408);
        assert!(collect_stream_offsets(&[segment])?.is_empty());
        Ok(())
    }
}
