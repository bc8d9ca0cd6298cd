//! Header metadata: primer pack, local sets and typed item access.
//!
//! Only what the essence readers consume is modelled. Sets are kept as raw
//! tag/value lists and items are decoded on access.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use anyhow::{Result, bail};
use log::{debug, trace};

use crate::structs::partition::Partition;
use crate::utils::errors::MetadataError;
use crate::utils::klv::MxfFile;
use crate::utils::ul::{self, InstanceUid, Ul, Umid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Integer frame rate used as a timecode base, e.g. 30 for 30000/1001.
    pub fn rounded(&self) -> u16 {
        if self.den <= 0 {
            return 0;
        }
        ((self.num as i64 + self.den as i64 / 2) / self.den as i64) as u16
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Identifies an item either by its registered static local tag or, for
/// dynamically tagged items, by the UL the primer maps a tag to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemId {
    Static(u16),
    Dynamic(Ul),
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemId::Static(tag) => write!(f, "tag {tag:04X}"),
            ItemId::Dynamic(ul) => write!(f, "item {ul}"),
        }
    }
}

pub mod items {
    use super::ItemId::{self, Dynamic, Static};
    use crate::utils::ul::Ul;

    pub const INSTANCE_UID: ItemId = Static(0x3C0A);

    pub const PREFACE_CONTENT_STORAGE: ItemId = Static(0x3B03);
    pub const PREFACE_OPERATIONAL_PATTERN: ItemId = Static(0x3B09);
    pub const PREFACE_ESSENCE_CONTAINERS: ItemId = Static(0x3B0A);

    pub const CONTENT_STORAGE_PACKAGES: ItemId = Static(0x1901);
    pub const CONTENT_STORAGE_ESSENCE_CONTAINER_DATA: ItemId = Static(0x1902);

    pub const ECD_LINKED_PACKAGE_UID: ItemId = Static(0x2701);
    pub const ECD_INDEX_SID: ItemId = Static(0x3F06);
    pub const ECD_BODY_SID: ItemId = Static(0x3F07);

    pub const PACKAGE_UID: ItemId = Static(0x4401);
    pub const PACKAGE_TRACKS: ItemId = Static(0x4403);
    pub const SOURCE_PACKAGE_DESCRIPTOR: ItemId = Static(0x4701);

    pub const TRACK_ID: ItemId = Static(0x4801);
    pub const TRACK_NUMBER: ItemId = Static(0x4804);
    pub const TRACK_SEQUENCE: ItemId = Static(0x4803);
    pub const TRACK_EDIT_RATE: ItemId = Static(0x4B01);
    pub const TRACK_ORIGIN: ItemId = Static(0x4B02);

    pub const COMPONENT_DATA_DEFINITION: ItemId = Static(0x0201);
    pub const COMPONENT_DURATION: ItemId = Static(0x0202);
    pub const SEQUENCE_STRUCTURAL_COMPONENTS: ItemId = Static(0x1001);

    pub const SOURCE_CLIP_START_POSITION: ItemId = Static(0x1201);
    pub const SOURCE_CLIP_SOURCE_PACKAGE_ID: ItemId = Static(0x1101);
    pub const SOURCE_CLIP_SOURCE_TRACK_ID: ItemId = Static(0x1102);

    pub const TIMECODE_START: ItemId = Static(0x1501);
    pub const TIMECODE_ROUNDED_BASE: ItemId = Static(0x1502);
    pub const TIMECODE_DROP_FRAME: ItemId = Static(0x1503);

    pub const MULTIPLE_DESCRIPTOR_SUB_DESCRIPTORS: ItemId = Static(0x3F01);

    pub const FILE_DESCRIPTOR_LINKED_TRACK_ID: ItemId = Static(0x3006);
    pub const FILE_DESCRIPTOR_SAMPLE_RATE: ItemId = Static(0x3001);
    pub const FILE_DESCRIPTOR_CONTAINER_DURATION: ItemId = Static(0x3002);
    pub const FILE_DESCRIPTOR_ESSENCE_CONTAINER: ItemId = Static(0x3004);

    pub const PICTURE_ESSENCE_CODING: ItemId = Static(0x3201);
    pub const PICTURE_STORED_HEIGHT: ItemId = Static(0x3202);
    pub const PICTURE_STORED_WIDTH: ItemId = Static(0x3203);
    pub const PICTURE_DISPLAY_HEIGHT: ItemId = Static(0x3208);
    pub const PICTURE_DISPLAY_WIDTH: ItemId = Static(0x3209);
    pub const PICTURE_DISPLAY_X_OFFSET: ItemId = Static(0x320A);
    pub const PICTURE_DISPLAY_Y_OFFSET: ItemId = Static(0x320B);
    pub const PICTURE_FRAME_LAYOUT: ItemId = Static(0x320C);
    pub const PICTURE_ASPECT_RATIO: ItemId = Static(0x320E);
    pub const PICTURE_IMAGE_ALIGNMENT_OFFSET: ItemId = Static(0x3211);
    pub const PICTURE_IMAGE_START_OFFSET: ItemId = Static(0x3213);
    pub const PICTURE_IMAGE_END_OFFSET: ItemId = Static(0x3214);

    pub const CDCI_COMPONENT_DEPTH: ItemId = Static(0x3301);
    pub const CDCI_HORIZONTAL_SUBSAMPLING: ItemId = Static(0x3302);
    pub const CDCI_VERTICAL_SUBSAMPLING: ItemId = Static(0x3308);

    pub const SOUND_QUANTIZATION_BITS: ItemId = Static(0x3D01);
    pub const SOUND_AUDIO_SAMPLING_RATE: ItemId = Static(0x3D03);
    pub const SOUND_CHANNEL_COUNT: ItemId = Static(0x3D07);
    pub const WAVE_AVG_BPS: ItemId = Static(0x3D09);
    pub const WAVE_BLOCK_ALIGN: ItemId = Static(0x3D0A);

    pub const AVID_RESOLUTION_ID: ItemId = Dynamic(Ul([
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01, 0x0E, 0x04, 0x01, 0x01, 0x06, 0x01, 0x07,
        0x00,
    ]));
    pub const AVID_FRAME_SAMPLE_SIZE: ItemId = Dynamic(Ul([
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01, 0x0E, 0x04, 0x01, 0x01, 0x06, 0x01, 0x08,
        0x00,
    ]));
    pub const AVID_IMAGE_START_OFFSET: ItemId = Dynamic(Ul([
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01, 0x0E, 0x04, 0x01, 0x01, 0x06, 0x01, 0x0B,
        0x00,
    ]));
}

#[derive(Debug, Default, Clone)]
pub struct Primer {
    entries: HashMap<u16, Ul>,
}

impl Primer {
    pub fn parse(value: &[u8]) -> Result<Self> {
        let (count, item_len, body) = batch_header(value)?;
        if item_len != 18 {
            bail!(MetadataError::InvalidPrimerItemLength(item_len));
        }

        let entries = body
            .chunks_exact(18)
            .take(count)
            .map(|chunk| {
                let tag = u16::from_be_bytes([chunk[0], chunk[1]]);
                let mut key = [0; 16];
                key.copy_from_slice(&chunk[2..]);
                (tag, Ul(key))
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn lookup(&self, tag: u16) -> Option<&Ul> {
        self.entries.get(&tag)
    }

    fn tags_for<'a>(&'a self, item: &'a Ul) -> impl Iterator<Item = u16> + 'a {
        self.entries
            .iter()
            .filter(move |(_, ul)| ul.matches(item))
            .map(|(tag, _)| *tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Splits a batch/array value into (count, item length, items).
fn batch_header(value: &[u8]) -> Result<(usize, usize, &[u8])> {
    if value.len() < 8 {
        bail!(MetadataError::InvalidBatch(value.len()));
    }
    let count = u32::from_be_bytes([value[0], value[1], value[2], value[3]]) as usize;
    let item_len = u32::from_be_bytes([value[4], value[5], value[6], value[7]]) as usize;
    let body = &value[8..];
    if count.checked_mul(item_len).is_none_or(|n| n > body.len()) {
        bail!(MetadataError::InvalidBatch(value.len()));
    }
    Ok((count, item_len, body))
}

#[derive(Debug, Clone)]
pub struct MetadataItem {
    pub tag: u16,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MetadataSet {
    pub key: Ul,
    pub instance_uid: InstanceUid,
    pub items: Vec<MetadataItem>,
}

impl MetadataSet {
    pub fn parse(key: &Ul, value: &[u8]) -> Result<Self> {
        let mut items = Vec::new();
        let mut instance_uid = [0; 16];
        let mut pos = 0;

        while pos < value.len() {
            if pos + 4 > value.len() {
                bail!(MetadataError::TruncatedLocalSet(*key));
            }
            let tag = u16::from_be_bytes([value[pos], value[pos + 1]]);
            let len = u16::from_be_bytes([value[pos + 2], value[pos + 3]]) as usize;
            pos += 4;
            if pos + len > value.len() {
                bail!(MetadataError::TruncatedLocalSet(*key));
            }
            let item = &value[pos..pos + len];
            pos += len;

            if ItemId::Static(tag) == items::INSTANCE_UID && len == 16 {
                instance_uid.copy_from_slice(item);
            }
            items.push(MetadataItem {
                tag,
                value: item.to_vec(),
            });
        }

        Ok(Self {
            key: *key,
            instance_uid,
            items,
        })
    }
}

#[derive(Debug, Default)]
pub struct HeaderMetadata {
    pub primer: Primer,
    sets: Vec<MetadataSet>,
    by_uid: HashMap<InstanceUid, usize>,
}

impl HeaderMetadata {
    /// Reads the header metadata that follows a partition pack, leaving the
    /// file positioned at the end of the header byte count.
    pub fn read(file: &mut MxfFile, partition: &Partition) -> Result<Self> {
        if !partition.has_header_metadata() {
            bail!(MetadataError::NoHeaderMetadata);
        }

        let kl = file.read_next_nonfiller_kl()?;
        if !ul::is_primer_pack(&kl.key) {
            bail!(MetadataError::MissingPrimer(kl.key));
        }
        let primer_start = file.tell() - kl.kl_size();
        let end = primer_start + partition.header_byte_count;

        let primer = Primer::parse(&file.read_bytes(kl.len)?)?;
        let mut metadata = Self {
            primer,
            ..Default::default()
        };

        while file.tell() < end {
            let kl = file.read_kl()?;
            if file.tell() + kl.len > end {
                bail!(MetadataError::SetOverrunsHeader(kl.key));
            }
            if ul::is_local_set_coded(&kl.key) {
                let value = file.read_bytes(kl.len)?;
                metadata.push_set(MetadataSet::parse(&kl.key, &value)?);
            } else {
                trace!("Skipping non-set header KLV {}", kl.key);
                file.skip(kl.len)?;
            }
        }

        debug!(
            "Read {} header metadata sets ({} primer entries)",
            metadata.sets.len(),
            metadata.primer.len()
        );

        Ok(metadata)
    }

    pub fn push_set(&mut self, set: MetadataSet) {
        if set.instance_uid != [0; 16] {
            self.by_uid.insert(set.instance_uid, self.sets.len());
        }
        self.sets.push(set);
    }

    pub fn sets(&self) -> impl Iterator<Item = SetRef<'_>> {
        self.sets.iter().map(move |set| SetRef { header: self, set })
    }

    pub fn find_sets(&self, key: &Ul) -> Vec<SetRef<'_>> {
        self.sets().filter(|set| set.is_a(key)).collect()
    }

    pub fn find_set(&self, key: &Ul) -> Result<SetRef<'_>> {
        self.sets()
            .find(|set| set.is_a(key))
            .ok_or_else(|| MetadataError::MissingSet(*key).into())
    }

    pub fn resolve_ref(&self, uid: &InstanceUid) -> Result<SetRef<'_>> {
        self.by_uid
            .get(uid)
            .map(|&index| SetRef {
                header: self,
                set: &self.sets[index],
            })
            .ok_or_else(|| MetadataError::UnresolvedReference(*uid).into())
    }
}

/// A set together with the primer needed to resolve its dynamic items.
#[derive(Clone, Copy)]
pub struct SetRef<'a> {
    header: &'a HeaderMetadata,
    set: &'a MetadataSet,
}

macro_rules! fixed_item {
    ($name:ident, $ty:ty, $len:expr) => {
        pub fn $name(&self, id: ItemId) -> Result<$ty> {
            let value = self.fixed_value(id, $len)?;
            let mut bytes = [0; $len];
            bytes.copy_from_slice(value);
            Ok(<$ty>::from_be_bytes(bytes))
        }
    };
}

impl<'a> SetRef<'a> {
    pub fn key(&self) -> &Ul {
        &self.set.key
    }

    pub fn instance_uid(&self) -> &InstanceUid {
        &self.set.instance_uid
    }

    pub fn is_a(&self, key: &Ul) -> bool {
        self.set.key.matches(key)
    }

    pub fn header(&self) -> &'a HeaderMetadata {
        self.header
    }

    pub fn item_value(&self, id: ItemId) -> Option<&'a [u8]> {
        let set = self.set;
        match id {
            ItemId::Static(tag) => set
                .items
                .iter()
                .find(|item| item.tag == tag)
                .map(|item| item.value.as_slice()),
            ItemId::Dynamic(ul) => self.header.primer.tags_for(&ul).find_map(|tag| {
                set.items
                    .iter()
                    .find(|item| item.tag == tag)
                    .map(|item| item.value.as_slice())
            }),
        }
    }

    pub fn have_item(&self, id: ItemId) -> bool {
        self.item_value(id).is_some()
    }

    fn value(&self, id: ItemId) -> Result<&'a [u8]> {
        self.item_value(id).ok_or_else(|| {
            MetadataError::MissingItem {
                set: self.set.key,
                item: id,
            }
            .into()
        })
    }

    fn fixed_value(&self, id: ItemId, len: usize) -> Result<&'a [u8]> {
        let value = self.value(id)?;
        if value.len() != len {
            bail!(MetadataError::InvalidItemLength {
                item: id,
                expected: len,
                found: value.len(),
            });
        }
        Ok(value)
    }

    fixed_item!(get_u8_item, u8, 1);
    fixed_item!(get_u16_item, u16, 2);
    fixed_item!(get_u32_item, u32, 4);
    fixed_item!(get_i32_item, i32, 4);
    fixed_item!(get_i64_item, i64, 8);

    pub fn get_bool_item(&self, id: ItemId) -> Result<bool> {
        Ok(self.get_u8_item(id)? != 0)
    }

    pub fn get_length_item(&self, id: ItemId) -> Result<i64> {
        self.get_i64_item(id)
    }

    pub fn get_position_item(&self, id: ItemId) -> Result<i64> {
        self.get_i64_item(id)
    }

    pub fn get_rational_item(&self, id: ItemId) -> Result<Rational> {
        let value = self.fixed_value(id, 8)?;
        Ok(Rational {
            num: i32::from_be_bytes([value[0], value[1], value[2], value[3]]),
            den: i32::from_be_bytes([value[4], value[5], value[6], value[7]]),
        })
    }

    pub fn get_ul_item(&self, id: ItemId) -> Result<Ul> {
        let mut bytes = [0; 16];
        bytes.copy_from_slice(self.fixed_value(id, 16)?);
        Ok(Ul(bytes))
    }

    pub fn get_umid_item(&self, id: ItemId) -> Result<Umid> {
        let mut bytes = [0; 32];
        bytes.copy_from_slice(self.fixed_value(id, 32)?);
        Ok(Umid(bytes))
    }

    pub fn get_strong_ref_item(&self, id: ItemId) -> Result<SetRef<'a>> {
        let mut uid = [0; 16];
        uid.copy_from_slice(self.fixed_value(id, 16)?);
        self.header.resolve_ref(&uid)
    }

    fn get_16_byte_array(&self, id: ItemId) -> Result<Vec<[u8; 16]>> {
        let (count, item_len, body) = batch_header(self.value(id)?)?;
        if count > 0 && item_len != 16 {
            bail!(MetadataError::InvalidItemLength {
                item: id,
                expected: 16,
                found: item_len,
            });
        }
        Ok(body
            .chunks_exact(16)
            .take(count)
            .map(|chunk| {
                let mut bytes = [0; 16];
                bytes.copy_from_slice(chunk);
                bytes
            })
            .collect())
    }

    /// Resolves a strong reference array. Dangling references are skipped
    /// with a debug message since dark or unsupported sets are not kept.
    pub fn get_strong_ref_array_item(&self, id: ItemId) -> Result<Vec<SetRef<'a>>> {
        Ok(self
            .get_16_byte_array(id)?
            .iter()
            .filter_map(|uid| match self.header.resolve_ref(uid) {
                Ok(set) => Some(set),
                Err(e) => {
                    debug!("{e}");
                    None
                }
            })
            .collect())
    }

    pub fn get_ul_array_item(&self, id: ItemId) -> Result<Vec<Ul>> {
        Ok(self.get_16_byte_array(id)?.into_iter().map(Ul).collect())
    }

    pub fn get_utf16_item(&self, id: ItemId) -> Result<String> {
        let value = self.value(id)?;
        let units: Vec<u16> = value
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::testutil::{local_set_value, primer_value, uid};
    use crate::utils::ul::{SOURCE_PACKAGE_SET_KEY, TRACK_SET_KEY};

    #[test]
    fn typed_items_and_references() -> Result<()> {
        let track_uid = uid(1);
        let package_uid = uid(2);

        let mut refs = Vec::new();
        refs.extend_from_slice(&1u32.to_be_bytes());
        refs.extend_from_slice(&16u32.to_be_bytes());
        refs.extend_from_slice(&track_uid);

        let mut header = HeaderMetadata::default();
        header.push_set(MetadataSet::parse(
            &TRACK_SET_KEY,
            &local_set_value(&[
                (0x3C0A, track_uid.to_vec()),
                (0x4801, 7u32.to_be_bytes().to_vec()),
                (0x4B01, [0, 0, 0x75, 0x30, 0, 0, 0x03, 0xE9].to_vec()),
            ]),
        )?);
        header.push_set(MetadataSet::parse(
            &SOURCE_PACKAGE_SET_KEY,
            &local_set_value(&[(0x3C0A, package_uid.to_vec()), (0x4403, refs)]),
        )?);

        let package = header.find_set(&SOURCE_PACKAGE_SET_KEY)?;
        let tracks = package.get_strong_ref_array_item(items::PACKAGE_TRACKS)?;
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].get_u32_item(items::TRACK_ID)?, 7);
        assert_eq!(
            tracks[0].get_rational_item(items::TRACK_EDIT_RATE)?,
            Rational::new(30000, 1001)
        );
        assert!(!tracks[0].have_item(items::TRACK_NUMBER));
        assert!(tracks[0].get_u32_item(items::TRACK_NUMBER).is_err());
        assert!(tracks[0].get_u16_item(items::TRACK_ID).is_err());
        Ok(())
    }

    #[test]
    fn dynamic_items_resolve_through_primer() -> Result<()> {
        let ItemId::Dynamic(resolution_ul) = items::AVID_RESOLUTION_ID else {
            unreachable!()
        };
        let mut header = HeaderMetadata {
            primer: Primer::parse(&primer_value(&[(0xFFF3, resolution_ul)]))?,
            ..Default::default()
        };
        header.push_set(MetadataSet::parse(
            &TRACK_SET_KEY,
            &local_set_value(&[
                (0x3C0A, uid(9).to_vec()),
                (0xFFF3, 1235u32.to_be_bytes().to_vec()),
            ]),
        )?);

        let set = header.find_set(&TRACK_SET_KEY)?;
        assert_eq!(set.get_u32_item(items::AVID_RESOLUTION_ID)?, 1235);
        Ok(())
    }

    #[test]
    fn truncated_set_is_rejected() {
        let value = [0x3C, 0x0A, 0x00, 0x10, 0x01];
        assert!(MetadataSet::parse(&TRACK_SET_KEY, &value).is_err());
    }

    #[test]
    fn rounded_rate() {
        assert_eq!(Rational::new(30000, 1001).rounded(), 30);
        assert_eq!(Rational::new(25, 1).rounded(), 25);
        assert_eq!(Rational::new(60000, 1001).rounded(), 60);
    }
}
