//! Partition packs and the random index pack.

use std::io::{Cursor, Read};

use anyhow::{Result, bail};
use byteorder::{BigEndian, ReadBytesExt};

use crate::utils::errors::PartitionError;
use crate::utils::ul::{self, Ul};

/// Fixed part of a partition pack value, before the essence container batch.
pub const PARTITION_PACK_FIXED_LEN: usize = 88;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Header,
    Body,
    Footer,
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub key: Ul,
    pub kind: PartitionKind,
    pub closed: bool,
    pub complete: bool,
    pub major_version: u16,
    pub minor_version: u16,
    pub kag_size: u32,
    pub this_partition: u64,
    pub previous_partition: u64,
    pub footer_partition: u64,
    pub header_byte_count: u64,
    pub index_byte_count: u64,
    pub index_sid: u32,
    pub body_offset: u64,
    pub body_sid: u32,
    pub operational_pattern: Ul,
    pub essence_containers: Vec<Ul>,
}

fn read_ul(reader: &mut impl Read) -> std::io::Result<Ul> {
    let mut bytes = [0; 16];
    reader.read_exact(&mut bytes)?;
    Ok(Ul(bytes))
}

impl Partition {
    pub fn parse(key: &Ul, value: &[u8]) -> Result<Self> {
        if value.len() < PARTITION_PACK_FIXED_LEN {
            bail!(PartitionError::PackTooShort(value.len()));
        }

        let kind = match key.0[13] {
            ul::PARTITION_KIND_HEADER => PartitionKind::Header,
            ul::PARTITION_KIND_BODY => PartitionKind::Body,
            ul::PARTITION_KIND_FOOTER => PartitionKind::Footer,
            other => bail!(PartitionError::InvalidKind(other)),
        };
        let status = key.0[14];

        let mut reader = Cursor::new(value);
        let mut partition = Self {
            key: *key,
            kind,
            closed: status == 0x02 || status == 0x04,
            complete: status == 0x03 || status == 0x04,
            major_version: reader.read_u16::<BigEndian>()?,
            minor_version: reader.read_u16::<BigEndian>()?,
            kag_size: reader.read_u32::<BigEndian>()?,
            this_partition: reader.read_u64::<BigEndian>()?,
            previous_partition: reader.read_u64::<BigEndian>()?,
            footer_partition: reader.read_u64::<BigEndian>()?,
            header_byte_count: reader.read_u64::<BigEndian>()?,
            index_byte_count: reader.read_u64::<BigEndian>()?,
            index_sid: reader.read_u32::<BigEndian>()?,
            body_offset: reader.read_u64::<BigEndian>()?,
            body_sid: reader.read_u32::<BigEndian>()?,
            operational_pattern: read_ul(&mut reader)?,
            essence_containers: Vec::new(),
        };

        let count = reader.read_u32::<BigEndian>()?;
        let item_len = reader.read_u32::<BigEndian>()?;
        if count > 0 && item_len != 16 {
            bail!(PartitionError::InvalidBatchItemLength(item_len));
        }
        let remaining = value.len() as u64 - reader.position();
        if count as u64 * 16 > remaining {
            bail!(PartitionError::BatchOverrun {
                count,
                remaining
            });
        }
        for _ in 0..count {
            partition.essence_containers.push(read_ul(&mut reader)?);
        }

        Ok(partition)
    }

    pub fn is_footer(&self) -> bool {
        self.kind == PartitionKind::Footer
    }

    pub fn is_header(&self) -> bool {
        self.kind == PartitionKind::Header
    }

    pub fn has_header_metadata(&self) -> bool {
        self.header_byte_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RipEntry {
    pub body_sid: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RandomIndexPack {
    pub entries: Vec<RipEntry>,
}

impl RandomIndexPack {
    /// Parses a RIP value, including its trailing overall length field.
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < 4 || (value.len() - 4) % 12 != 0 {
            bail!(PartitionError::InvalidRipLength(value.len()));
        }

        let mut reader = Cursor::new(value);
        let mut entries = Vec::with_capacity((value.len() - 4) / 12);
        for _ in 0..(value.len() - 4) / 12 {
            entries.push(RipEntry {
                body_sid: reader.read_u32::<BigEndian>()?,
                offset: reader.read_u64::<BigEndian>()?,
            });
        }

        if entries.windows(2).any(|w| w[0].offset >= w[1].offset) {
            bail!(PartitionError::RipNotAscending);
        }

        Ok(Self { entries })
    }
}
