//! SMPTE universal labels and key predicates.
//!
//! Keys and labels are compared with the registry version byte (byte 7)
//! masked out, since writers disagree on which version they stamp.

use std::fmt::{Debug, Display, Formatter};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ul(pub [u8; 16]);

pub type InstanceUid = [u8; 16];

/// Basic SMPTE UMID, 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Umid(pub [u8; 32]);

impl Default for Umid {
    fn default() -> Self {
        Self([0; 32])
    }
}

impl Debug for Umid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Ul {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Equality ignoring the version byte.
    pub fn matches(&self, other: &Ul) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .enumerate()
            .all(|(i, (a, b))| i == 7 || a == b)
    }

    /// Prefix equality ignoring the version byte.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        prefix.len() <= 16
            && prefix
                .iter()
                .enumerate()
                .all(|(i, b)| i == 7 || self.0[i] == *b)
    }

    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Display for Ul {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Debug for Ul {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

const SMPTE_PREFIX: [u8; 4] = [0x06, 0x0E, 0x2B, 0x34];

const PARTITION_PACK_PREFIX: [u8; 13] = [
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01,
];

pub const PARTITION_KIND_HEADER: u8 = 0x02;
pub const PARTITION_KIND_BODY: u8 = 0x03;
pub const PARTITION_KIND_FOOTER: u8 = 0x04;

/// Builds a partition pack key for `kind` (byte 13) and `status` (byte 14).
pub const fn partition_pack_key(kind: u8, status: u8) -> Ul {
    Ul([
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, kind, status,
        0x00,
    ])
}

pub const PRIMER_PACK_KEY: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x05, 0x01, 0x00,
]);

pub const RANDOM_INDEX_PACK_KEY: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x11, 0x01, 0x00,
]);

pub const FILL_KEY: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x02, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00, 0x00, 0x00,
]);

pub const INDEX_TABLE_SEGMENT_KEY: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x10, 0x01, 0x00,
]);

const LOCAL_SET_PREFIX: [u8; 14] = [
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x01, 0x01, 0x01, 0x01,
];

/// Builds a structural metadata set key from its byte 14 identifier.
pub const fn set_key(id: u8) -> Ul {
    Ul([
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x01, 0x01, 0x01, 0x01, id, 0x00,
    ])
}

pub const PREFACE_SET_KEY: Ul = set_key(0x2F);
pub const CONTENT_STORAGE_SET_KEY: Ul = set_key(0x18);
pub const ESSENCE_CONTAINER_DATA_SET_KEY: Ul = set_key(0x23);
pub const MATERIAL_PACKAGE_SET_KEY: Ul = set_key(0x36);
pub const SOURCE_PACKAGE_SET_KEY: Ul = set_key(0x37);
pub const TRACK_SET_KEY: Ul = set_key(0x3B);
pub const SEQUENCE_SET_KEY: Ul = set_key(0x0F);
pub const SOURCE_CLIP_SET_KEY: Ul = set_key(0x11);
pub const TIMECODE_COMPONENT_SET_KEY: Ul = set_key(0x14);
pub const FILE_DESCRIPTOR_SET_KEY: Ul = set_key(0x25);
pub const GENERIC_PICTURE_DESCRIPTOR_SET_KEY: Ul = set_key(0x27);
pub const CDCI_DESCRIPTOR_SET_KEY: Ul = set_key(0x28);
pub const RGBA_DESCRIPTOR_SET_KEY: Ul = set_key(0x29);
pub const GENERIC_SOUND_DESCRIPTOR_SET_KEY: Ul = set_key(0x42);
pub const MULTIPLE_DESCRIPTOR_SET_KEY: Ul = set_key(0x44);
pub const AES3_DESCRIPTOR_SET_KEY: Ul = set_key(0x47);
pub const WAVE_DESCRIPTOR_SET_KEY: Ul = set_key(0x48);
pub const MPEG_DESCRIPTOR_SET_KEY: Ul = set_key(0x51);

/// SDTI-CP system metadata pack.
pub const CP_SYSTEM_METADATA_PACK_KEY: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x04, 0x01, 0x01, 0x00,
]);

/// Generic container system metadata pack.
pub const GC_SYSTEM_METADATA_PACK_KEY: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x14, 0x02, 0x01, 0x00,
]);

/// Generic container system item element holding one CRC-32 per essence element.
pub const CRC32_ELEMENT_KEY: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x14, 0x02, 0x10, 0x00,
]);

const GC_ELEMENT_PREFIX: [u8; 12] = [
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01,
];

const AVID_ELEMENT_PREFIX: [u8; 12] = [
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0E, 0x04, 0x03, 0x01,
];

pub const OP1A_PREFIX: [u8; 14] = [
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x01,
];

pub const OP_ATOM_PREFIX: [u8; 13] = [
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x02, 0x0D, 0x01, 0x02, 0x01, 0x10,
];

/// OP-1A, single item and single package, qualifiers internal/stream/uni-track.
pub const OP1A_UL: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x01, 0x09, 0x00,
]);

pub const OP_ATOM_UL: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x02, 0x0D, 0x01, 0x02, 0x01, 0x10, 0x00, 0x00, 0x00,
]);

const DATA_DEF_PREFIX: [u8; 8] = [0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01];

pub const PICTURE_DATA_DEF: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x02, 0x01, 0x00, 0x00, 0x00,
]);

pub const SOUND_DATA_DEF: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
]);

pub const TIMECODE_DATA_DEF: Ul = Ul([
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x01, 0x01, 0x00, 0x00, 0x00,
]);

/// Prefix shared by the generic container essence container labels.
pub const GC_LABEL_PREFIX: [u8; 13] = [
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x02,
];

/// Prefix of the Avid legacy essence container labels.
pub const AVID_LABEL_PREFIX: [u8; 13] = [
    0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0E, 0x04, 0x03, 0x01, 0x02,
];

/// Builds a generic container essence container label from bytes 13..16.
pub const fn gc_label(mapping: u8, variant: u8, wrapping: u8) -> Ul {
    Ul([
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x02, mapping,
        variant, wrapping,
    ])
}

pub const fn avid_label(mapping: u8, variant: u8, wrapping: u8) -> Ul {
    Ul([
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0E, 0x04, 0x03, 0x01, 0x02, mapping,
        variant, wrapping,
    ])
}

pub fn is_partition_pack(key: &Ul) -> bool {
    key.starts_with(&PARTITION_PACK_PREFIX)
        && (PARTITION_KIND_HEADER..=PARTITION_KIND_FOOTER).contains(&key.0[13])
        && (0x01..=0x04).contains(&key.0[14])
}

pub fn is_header_partition_pack(key: &Ul) -> bool {
    is_partition_pack(key) && key.0[13] == PARTITION_KIND_HEADER
}

pub fn is_body_partition_pack(key: &Ul) -> bool {
    is_partition_pack(key) && key.0[13] == PARTITION_KIND_BODY
}

pub fn is_footer_partition_pack(key: &Ul) -> bool {
    is_partition_pack(key) && key.0[13] == PARTITION_KIND_FOOTER
}

pub fn is_primer_pack(key: &Ul) -> bool {
    key.matches(&PRIMER_PACK_KEY)
}

pub fn is_rip(key: &Ul) -> bool {
    key.matches(&RANDOM_INDEX_PACK_KEY)
}

pub fn is_fill(key: &Ul) -> bool {
    key.matches(&FILL_KEY)
}

pub fn is_index_table_segment(key: &Ul) -> bool {
    key.matches(&INDEX_TABLE_SEGMENT_KEY)
}

pub fn is_local_set(key: &Ul) -> bool {
    key.starts_with(&LOCAL_SET_PREFIX)
}

/// Any key coded as a local set (structural, descriptive or dark).
pub fn is_local_set_coded(key: &Ul) -> bool {
    key.starts_with(&SMPTE_PREFIX) && key.0[4] == 0x02 && key.0[5] == 0x53
}

/// CP and GC picture, sound, data and compound essence elements, including the
/// Avid legacy element keys.
pub fn is_gc_essence_element(key: &Ul) -> bool {
    (key.starts_with(&GC_ELEMENT_PREFIX) || key.starts_with(&AVID_ELEMENT_PREFIX))
        && matches!(key.0[12], 0x05 | 0x06 | 0x07 | 0x15 | 0x16 | 0x17 | 0x18)
}

pub fn is_system_item(key: &Ul) -> bool {
    key.starts_with(&SMPTE_PREFIX)
        && key.0[8..12] == [0x0D, 0x01, 0x03, 0x01]
        && matches!(key.0[12], 0x04 | 0x14)
}

pub fn is_system_metadata_pack(key: &Ul) -> bool {
    key.matches(&CP_SYSTEM_METADATA_PACK_KEY) || key.matches(&GC_SYSTEM_METADATA_PACK_KEY)
}

pub fn is_crc32_element(key: &Ul) -> bool {
    key.matches(&CRC32_ELEMENT_KEY)
}

/// Essence element track number: item type, element count, element type and
/// element number packed big-endian.
pub fn track_number(key: &Ul) -> u32 {
    u32::from_be_bytes([key.0[12], key.0[13], key.0[14], key.0[15]])
}

pub fn is_op1a(label: &Ul) -> bool {
    label.starts_with(&OP1A_PREFIX)
}

pub fn is_op_atom(label: &Ul) -> bool {
    label.starts_with(&OP_ATOM_PREFIX)
}

fn data_def_kind(label: &Ul) -> Option<[u8; 5]> {
    if !label.starts_with(&DATA_DEF_PREFIX) {
        return None;
    }
    let mut kind = [0; 5];
    kind.copy_from_slice(&label.0[8..13]);
    Some(kind)
}

pub fn is_picture_data_def(label: &Ul) -> bool {
    data_def_kind(label) == Some([0x01, 0x03, 0x02, 0x02, 0x01])
}

pub fn is_sound_data_def(label: &Ul) -> bool {
    data_def_kind(label) == Some([0x01, 0x03, 0x02, 0x02, 0x02])
}

pub fn is_timecode_data_def(label: &Ul) -> bool {
    data_def_kind(label) == Some([0x01, 0x03, 0x02, 0x01, 0x01])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_byte_is_ignored() {
        let mut fill = FILL_KEY;
        fill.0[7] = 0x01;
        assert!(is_fill(&fill));
        fill.0[6] = 0x02;
        assert!(!is_fill(&fill));
    }

    #[test]
    fn partition_pack_kinds() {
        let header = partition_pack_key(PARTITION_KIND_HEADER, 0x04);
        let footer = partition_pack_key(PARTITION_KIND_FOOTER, 0x02);
        assert!(is_header_partition_pack(&header));
        assert!(!is_footer_partition_pack(&header));
        assert!(is_footer_partition_pack(&footer));
        assert!(!is_partition_pack(&PRIMER_PACK_KEY));
        assert!(!is_partition_pack(&RANDOM_INDEX_PACK_KEY));
    }

    #[test]
    fn essence_element_track_number() {
        let key = Ul([
            0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x15, 0x01,
            0x05, 0x01,
        ]);
        assert!(is_gc_essence_element(&key));
        assert!(!is_system_item(&key));
        assert_eq!(track_number(&key), 0x1501_0501);
        assert!(is_system_item(&CRC32_ELEMENT_KEY));
        assert!(!is_gc_essence_element(&CRC32_ELEMENT_KEY));
    }
}
