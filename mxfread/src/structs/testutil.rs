//! Builders for synthetic MXF structures used by the unit tests.

use anyhow::Result;

use crate::structs::metadata::{HeaderMetadata, MetadataSet, Rational};
use crate::structs::partition::Partition;
use crate::structs::timecode::Timecode;
use crate::utils::crc::CRC_32_IEEE;
use crate::utils::ul::{self, Ul};

pub fn uid(n: u32) -> [u8; 16] {
    let mut bytes = [0xA5; 16];
    bytes[12..].copy_from_slice(&n.to_be_bytes());
    bytes
}

fn umid(n: u8) -> [u8; 32] {
    let mut bytes = [0; 32];
    bytes[..12].copy_from_slice(&[
        0x06, 0x0A, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x05, 0x01, 0x01, 0x0D, 0x20,
    ]);
    bytes[31] = n;
    bytes
}

/// Appends a KLV triplet with a 4-byte BER length.
pub fn put_klv(out: &mut Vec<u8>, key: &Ul, value: &[u8]) {
    out.extend_from_slice(&key.0);
    out.push(0x83);
    out.extend_from_slice(&(value.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(value);
}

const KL_SIZE: u64 = 20;

pub fn local_set_value(entries: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut value = Vec::new();
    for (tag, item) in entries {
        value.extend_from_slice(&tag.to_be_bytes());
        value.extend_from_slice(&(item.len() as u16).to_be_bytes());
        value.extend_from_slice(item);
    }
    value
}

pub fn primer_value(entries: &[(u16, Ul)]) -> Vec<u8> {
    let mut value = Vec::new();
    value.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    value.extend_from_slice(&18u32.to_be_bytes());
    for (tag, ul) in entries {
        value.extend_from_slice(&tag.to_be_bytes());
        value.extend_from_slice(&ul.0);
    }
    value
}

fn batch(items: &[&[u8]], item_len: u32) -> Vec<u8> {
    let mut value = Vec::new();
    value.extend_from_slice(&(items.len() as u32).to_be_bytes());
    value.extend_from_slice(&item_len.to_be_bytes());
    for item in items {
        value.extend_from_slice(item);
    }
    value
}

fn ref_array(uids: &[[u8; 16]]) -> Vec<u8> {
    batch(&uids.iter().map(|u| u.as_slice()).collect::<Vec<_>>(), 16)
}

fn rational(rate: Rational) -> Vec<u8> {
    let mut value = rate.num.to_be_bytes().to_vec();
    value.extend_from_slice(&rate.den.to_be_bytes());
    value
}

fn be32(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

fn be64(value: i64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Value of an index table segment; `offsets` empty for a constant
/// bytes-per-element segment.
pub fn index_segment_value(
    index_sid: u32,
    body_sid: u32,
    edit_unit_byte_count: u32,
    start: i64,
    offsets: &[u64],
) -> Vec<u8> {
    let mut entries = vec![
        (0x3C0A, uid(0xF000 + (index_sid << 8) + start as u32).to_vec()),
        (0x3F0B, rational(Rational::new(25, 1))),
        (0x3F0C, be64(start)),
        (0x3F0D, be64(offsets.len() as i64)),
        (0x3F05, be32(edit_unit_byte_count)),
        (0x3F06, be32(index_sid)),
        (0x3F07, be32(body_sid)),
        (0x3F08, vec![0]),
        (0x3F0E, vec![0]),
    ];
    if !offsets.is_empty() {
        let rows: Vec<Vec<u8>> = offsets
            .iter()
            .map(|offset| {
                let mut row = vec![0, 0, 0x80];
                row.extend_from_slice(&offset.to_be_bytes());
                row
            })
            .collect();
        let rows: Vec<&[u8]> = rows.iter().map(Vec::as_slice).collect();
        entries.push((0x3F0A, batch(&rows, 11)));
    }
    local_set_value(&entries)
}

pub fn system_metadata_pack_value(creation: Option<Timecode>, user: Option<Timecode>) -> Vec<u8> {
    let mut value = vec![0; 57];
    value[1] = 0x02 << 1;
    value[2] = 0x01;
    for (bit, offset, timecode) in [(0x10, 23, creation), (0x08, 40, user)] {
        if let Some(timecode) = timecode {
            value[0] |= bit;
            value[offset] = 0x81;
            value[offset + 1..offset + 5].copy_from_slice(&timecode.to_smpte12m());
        }
    }
    value
}

/// Partition pack fields, written out by [`PartitionLayout::value`].
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    pub kind: u8,
    pub status: u8,
    pub kag: u32,
    pub this_partition: u64,
    pub previous_partition: u64,
    pub footer: u64,
    pub header_byte_count: u64,
    pub index_byte_count: u64,
    pub index_sid: u32,
    pub body_offset: u64,
    pub body_sid: u32,
    pub op: Ul,
    pub essence_containers: Vec<Ul>,
}

impl Default for PartitionLayout {
    fn default() -> Self {
        Self {
            kind: ul::PARTITION_KIND_HEADER,
            status: 0x04,
            kag: 1,
            this_partition: 0,
            previous_partition: 0,
            footer: 0,
            header_byte_count: 0,
            index_byte_count: 0,
            index_sid: 0,
            body_offset: 0,
            body_sid: 0,
            op: ul::OP1A_UL,
            essence_containers: Vec::new(),
        }
    }
}

impl PartitionLayout {
    pub fn key(&self) -> Ul {
        ul::partition_pack_key(self.kind, self.status)
    }

    pub fn value(&self) -> Vec<u8> {
        let mut value = Vec::new();
        value.extend_from_slice(&1u16.to_be_bytes());
        value.extend_from_slice(&3u16.to_be_bytes());
        value.extend_from_slice(&self.kag.to_be_bytes());
        value.extend_from_slice(&self.this_partition.to_be_bytes());
        value.extend_from_slice(&self.previous_partition.to_be_bytes());
        value.extend_from_slice(&self.footer.to_be_bytes());
        value.extend_from_slice(&self.header_byte_count.to_be_bytes());
        value.extend_from_slice(&self.index_byte_count.to_be_bytes());
        value.extend_from_slice(&self.index_sid.to_be_bytes());
        value.extend_from_slice(&self.body_offset.to_be_bytes());
        value.extend_from_slice(&self.body_sid.to_be_bytes());
        value.extend_from_slice(&self.op.0);
        let labels: Vec<&[u8]> = self.essence_containers.iter().map(|l| l.0.as_slice()).collect();
        value.extend_from_slice(&batch(&labels, 16));
        value
    }
}

/// Bytes of frame `frame` of track `track`; the first byte is the frame
/// number for track 0.
pub fn frame_data(track: usize, frame: i64, size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (frame as usize + i + track * 0x40) as u8)
        .collect()
}

fn essence_element_key(track_number: u32) -> Ul {
    let mut key = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0, 0, 0, 0,
    ];
    key[12..].copy_from_slice(&track_number.to_be_bytes());
    Ul(key)
}

/// One essence track of a synthetic clip.
#[derive(Debug, Clone)]
pub struct TrackLayout {
    pub descriptor_key: Ul,
    pub essence_container: Ul,
    pub data_def: Ul,
    pub edit_rate: Rational,
    pub track_number: u32,
    /// Bytes per frame written by the file builders.
    pub frame_size: usize,
    pub descriptor_items: Vec<(u16, Vec<u8>)>,
}

impl TrackLayout {
    fn picture_items(width: u32, height: u32) -> Vec<(u16, Vec<u8>)> {
        vec![
            (0x3001, rational(Rational::new(25, 1))),
            (0x3203, be32(width)),
            (0x3202, be32(height)),
            (0x320C, vec![0]),
            (0x320A, be32(0)),
            (0x320B, be32(0)),
            (0x320E, rational(Rational::new(4, 3))),
            (0x3302, be32(2)),
            (0x3308, be32(1)),
            (0x3301, be32(8)),
        ]
    }

    /// Frame-wrapped 8-bit 4:2:2 uncompressed picture at 25 fps.
    pub fn uncompressed(width: u32, height: u32) -> Self {
        Self {
            descriptor_key: ul::CDCI_DESCRIPTOR_SET_KEY,
            essence_container: ul::gc_label(0x05, 0x7F, 0x01),
            data_def: ul::PICTURE_DATA_DEF,
            edit_rate: Rational::new(25, 1),
            track_number: 0x1501_0501,
            frame_size: (width * height * 2) as usize,
            descriptor_items: Self::picture_items(width, height),
        }
    }

    pub fn uncompressed_pal() -> Self {
        Self::uncompressed(720, 576)
    }

    /// Clip-wrapped Avid MJPEG, sized from an index table.
    pub fn avid_mjpeg() -> Self {
        Self {
            descriptor_key: ul::CDCI_DESCRIPTOR_SET_KEY,
            essence_container: ul::avid_label(0x01, 0x01, 0x02),
            data_def: ul::PICTURE_DATA_DEF,
            edit_rate: Rational::new(25, 1),
            track_number: 0x1501_0801,
            frame_size: 0,
            descriptor_items: Self::picture_items(720, 288),
        }
    }

    /// Frame-wrapped 16-bit WAVE audio at 48 kHz, edited at `edit_rate`.
    pub fn wave(channels: u32, edit_rate: Rational) -> Self {
        let block_align = 2 * channels;
        let samples = 48000 * edit_rate.den as u32 / edit_rate.num as u32;
        Self {
            descriptor_key: ul::WAVE_DESCRIPTOR_SET_KEY,
            essence_container: ul::gc_label(0x06, 0x01, 0x00),
            data_def: ul::SOUND_DATA_DEF,
            edit_rate,
            track_number: 0x1601_0101,
            frame_size: (samples * block_align) as usize,
            descriptor_items: vec![
                (0x3001, rational(Rational::new(48000, 1))),
                (0x3D03, rational(Rational::new(48000, 1))),
                (0x3D07, be32(channels)),
                (0x3D01, be32(16)),
                (0x3D0A, (block_align as u16).to_be_bytes().to_vec()),
            ],
        }
    }

    pub fn wave_pal(channels: u32) -> Self {
        Self::wave(channels, Rational::new(25, 1))
    }

    /// WAVE audio edited per sample.
    pub fn wave_sample_rate(channels: u32) -> Self {
        Self::wave(channels, Rational::new(48000, 1))
    }

    /// Switches the essence container label to clip wrapping.
    pub fn clip_wrapped(mut self) -> Self {
        let label = &mut self.essence_container.0;
        match label[13] {
            0x06 if label[14] % 2 == 1 => label[14] += 1,
            0x06 => {}
            _ => label[15] = 0x02,
        }
        self
    }
}

/// Packages, tracks and descriptors of a synthetic file.
#[derive(Debug, Clone)]
pub struct ClipLayout {
    pub tracks: Vec<TrackLayout>,
    /// Material package timecode start.
    pub playout_start: Option<i64>,
    /// File package timecode start.
    pub file_source_start: Option<i64>,
    pub duration: i64,
    pub operational_pattern: Ul,
    pub index_sid: u32,
}

impl Default for ClipLayout {
    fn default() -> Self {
        Self {
            tracks: vec![TrackLayout::uncompressed_pal(), TrackLayout::wave_pal(2)],
            playout_start: Some(90000),
            file_source_start: None,
            duration: 100,
            operational_pattern: ul::OP1A_UL,
            index_sid: 2,
        }
    }
}

type SetItems = Vec<(u16, Vec<u8>)>;

#[derive(Default)]
struct SetBuilder {
    sets: Vec<(Ul, SetItems)>,
    next: u32,
}

impl SetBuilder {
    fn add(&mut self, key: Ul, mut items: SetItems) -> [u8; 16] {
        self.next += 1;
        let instance = uid(self.next);
        items.insert(0, (0x3C0A, instance.to_vec()));
        self.sets.push((key, items));
        instance
    }

    fn sequence(&mut self, data_def: &Ul, duration: i64, component: [u8; 16]) -> [u8; 16] {
        self.add(
            ul::SEQUENCE_SET_KEY,
            vec![
                (0x0201, data_def.0.to_vec()),
                (0x0202, be64(duration)),
                (0x1001, ref_array(&[component])),
            ],
        )
    }

    fn timecode_track(&mut self, track_id: u32, start: i64, duration: i64) -> [u8; 16] {
        let component = self.add(
            ul::TIMECODE_COMPONENT_SET_KEY,
            vec![
                (0x0201, ul::TIMECODE_DATA_DEF.0.to_vec()),
                (0x0202, be64(duration)),
                (0x1501, be64(start)),
                (0x1502, 25u16.to_be_bytes().to_vec()),
                (0x1503, vec![0]),
            ],
        );
        let sequence = self.sequence(&ul::TIMECODE_DATA_DEF, duration, component);
        self.add(
            ul::TRACK_SET_KEY,
            vec![
                (0x4801, be32(track_id)),
                (0x4804, be32(0)),
                (0x4B01, rational(Rational::new(25, 1))),
                (0x4803, sequence.to_vec()),
            ],
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn essence_track(
        &mut self,
        track: &TrackLayout,
        track_id: u32,
        track_number: u32,
        duration: i64,
        source_package: [u8; 32],
        source_track_id: u32,
    ) -> [u8; 16] {
        let clip = self.add(
            ul::SOURCE_CLIP_SET_KEY,
            vec![
                (0x0201, track.data_def.0.to_vec()),
                (0x0202, be64(duration)),
                (0x1201, be64(0)),
                (0x1101, source_package.to_vec()),
                (0x1102, be32(source_track_id)),
            ],
        );
        let sequence = self.sequence(&track.data_def, duration, clip);
        self.add(
            ul::TRACK_SET_KEY,
            vec![
                (0x4801, be32(track_id)),
                (0x4804, be32(track_number)),
                (0x4B01, rational(track.edit_rate)),
                (0x4803, sequence.to_vec()),
            ],
        )
    }
}

fn build_sets(layout: &ClipLayout) -> Vec<(Ul, SetItems)> {
    let mut builder = SetBuilder::default();
    let material_umid = umid(1);
    let file_umid = umid(2);

    let mut file_tracks = Vec::new();
    if let Some(start) = layout.file_source_start {
        file_tracks.push(builder.timecode_track(901, start, layout.duration));
    }
    let mut descriptors = Vec::new();
    for (i, track) in layout.tracks.iter().enumerate() {
        let track_id = i as u32 + 1;
        file_tracks.push(builder.essence_track(
            track,
            track_id,
            track.track_number,
            layout.duration,
            [0; 32],
            0,
        ));
        let mut items = track.descriptor_items.clone();
        items.push((0x3004, track.essence_container.0.to_vec()));
        items.push((0x3006, be32(track_id)));
        descriptors.push(builder.add(track.descriptor_key, items));
    }
    let descriptor = match descriptors.as_slice() {
        [single] => *single,
        _ => builder.add(
            ul::MULTIPLE_DESCRIPTOR_SET_KEY,
            vec![
                (0x3001, rational(Rational::new(25, 1))),
                (0x3004, ul::gc_label(0x7F, 0x01, 0x00).0.to_vec()),
                (0x3F01, ref_array(&descriptors)),
            ],
        ),
    };
    let file_package = builder.add(
        ul::SOURCE_PACKAGE_SET_KEY,
        vec![
            (0x4401, file_umid.to_vec()),
            (0x4403, ref_array(&file_tracks)),
            (0x4701, descriptor.to_vec()),
        ],
    );

    let mut material_tracks = Vec::new();
    if let Some(start) = layout.playout_start {
        material_tracks.push(builder.timecode_track(1001, start, layout.duration));
    }
    for (i, track) in layout.tracks.iter().enumerate() {
        let track_id = i as u32 + 1;
        material_tracks.push(builder.essence_track(
            track,
            track_id,
            0,
            layout.duration,
            file_umid,
            track_id,
        ));
    }
    let material = builder.add(
        ul::MATERIAL_PACKAGE_SET_KEY,
        vec![
            (0x4401, material_umid.to_vec()),
            (0x4403, ref_array(&material_tracks)),
        ],
    );

    let ecd = builder.add(
        ul::ESSENCE_CONTAINER_DATA_SET_KEY,
        vec![
            (0x2701, file_umid.to_vec()),
            (0x3F06, be32(layout.index_sid)),
            (0x3F07, be32(1)),
        ],
    );
    let storage = builder.add(
        ul::CONTENT_STORAGE_SET_KEY,
        vec![
            (0x1901, ref_array(&[material, file_package])),
            (0x1902, ref_array(&[ecd])),
        ],
    );
    let labels: Vec<&[u8]> = layout
        .tracks
        .iter()
        .map(|t| t.essence_container.0.as_slice())
        .collect();
    builder.add(
        ul::PREFACE_SET_KEY,
        vec![
            (0x3B03, storage.to_vec()),
            (0x3B09, layout.operational_pattern.0.to_vec()),
            (0x3B0A, batch(&labels, 16)),
        ],
    );

    builder.sets
}

/// Primer pack and header metadata sets as stored in a header partition.
fn header_metadata_bytes(layout: &ClipLayout) -> Vec<u8> {
    let mut out = Vec::new();
    put_klv(&mut out, &ul::PRIMER_PACK_KEY, &primer_value(&[]));
    for (key, items) in build_sets(layout) {
        put_klv(&mut out, &key, &local_set_value(&items));
    }
    out
}

fn essence_containers(layout: &ClipLayout) -> Vec<Ul> {
    layout.tracks.iter().map(|t| t.essence_container).collect()
}

/// Parsed header metadata of `layout` and a matching header partition.
pub fn header_metadata(layout: &ClipLayout) -> Result<(HeaderMetadata, Partition)> {
    let mut header = HeaderMetadata::default();
    for (key, items) in build_sets(layout) {
        header.push_set(MetadataSet::parse(&key, &local_set_value(&items))?);
    }

    let partition = PartitionLayout {
        header_byte_count: header_metadata_bytes(layout).len() as u64,
        body_sid: 1,
        op: layout.operational_pattern,
        essence_containers: essence_containers(layout),
        ..Default::default()
    };
    let partition = Partition::parse(&partition.key(), &partition.value())?;
    Ok((header, partition))
}

/// Writes partitions, linking each to the previous one and to the footer.
#[derive(Default)]
struct FileBuilder {
    out: Vec<u8>,
    /// (body SID, offset) of each partition pack.
    partitions: Vec<(u32, u64)>,
    footer: Option<u64>,
}

impl FileBuilder {
    fn partition(&mut self, mut layout: PartitionLayout) {
        let offset = self.out.len() as u64;
        layout.this_partition = offset;
        layout.previous_partition = self.partitions.last().map_or(0, |p| p.1);
        if layout.kind == ul::PARTITION_KIND_FOOTER {
            self.footer = Some(offset);
        }
        self.partitions.push((layout.body_sid, offset));
        put_klv(&mut self.out, &layout.key(), &layout.value());
    }

    fn finish(mut self, with_rip: bool) -> Vec<u8> {
        if let Some(footer) = self.footer {
            for &(_, offset) in &self.partitions {
                // footer partition field of the pack value
                let pos = (offset + KL_SIZE + 24) as usize;
                self.out[pos..pos + 8].copy_from_slice(&footer.to_be_bytes());
            }
        }
        if with_rip {
            let mut value = Vec::new();
            for &(body_sid, offset) in &self.partitions {
                value.extend_from_slice(&body_sid.to_be_bytes());
                value.extend_from_slice(&offset.to_be_bytes());
            }
            let total = KL_SIZE + value.len() as u64 + 4;
            value.extend_from_slice(&(total as u32).to_be_bytes());
            put_klv(&mut self.out, &ul::RANDOM_INDEX_PACK_KEY, &value);
        }
        self.out
    }
}

/// Layout of a synthetic OP-1A file.
#[derive(Debug, Clone)]
pub struct Op1aLayout {
    pub clip: ClipLayout,
    /// Content packages per essence partition, the first in the header
    /// partition.
    pub frames_per_partition: Vec<usize>,
    pub with_rip: bool,
    pub with_footer: bool,
    /// Creation timecode of frame 0 in a system metadata pack.
    pub system_item_start: Option<i64>,
    pub with_crc32: bool,
    /// Frame whose last essence element gets a wrong CRC-32.
    pub corrupt_crc_frame: Option<i64>,
}

impl Default for Op1aLayout {
    fn default() -> Self {
        Self {
            clip: ClipLayout {
                tracks: vec![TrackLayout::uncompressed(16, 8), TrackLayout::wave_pal(1)],
                ..Default::default()
            },
            frames_per_partition: vec![4],
            with_rip: true,
            with_footer: true,
            system_item_start: None,
            with_crc32: false,
            corrupt_crc_frame: None,
        }
    }
}

impl Op1aLayout {
    pub fn content_package_len(&self) -> u64 {
        let mut len = 0;
        if self.system_item_start.is_some() {
            len += KL_SIZE + 57;
        }
        if self.with_crc32 {
            len += KL_SIZE + 4 * self.clip.tracks.len() as u64;
        }
        len + self
            .clip
            .tracks
            .iter()
            .map(|t| KL_SIZE + t.frame_size as u64)
            .sum::<u64>()
    }

    pub fn picture_frame(&self, frame: i64) -> Vec<u8> {
        frame_data(0, frame, self.clip.tracks[0].frame_size)
    }

    pub fn sound_frame(&self, frame: i64) -> Vec<u8> {
        frame_data(1, frame, self.clip.tracks[1].frame_size)
    }

    fn content_package(&self, out: &mut Vec<u8>, frame: i64) {
        if let Some(start) = self.system_item_start {
            let creation = Timecode::from_frame_count(start + frame, 25, false);
            put_klv(
                out,
                &ul::GC_SYSTEM_METADATA_PACK_KEY,
                &system_metadata_pack_value(Some(creation), None),
            );
        }
        let elements: Vec<Vec<u8>> = self
            .clip
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| frame_data(i, frame, t.frame_size))
            .collect();
        if self.with_crc32 {
            let mut value = Vec::new();
            for (i, element) in elements.iter().enumerate() {
                let mut crc = CRC_32_IEEE.checksum(element);
                if self.corrupt_crc_frame == Some(frame) && i + 1 == elements.len() {
                    crc ^= 1;
                }
                value.extend_from_slice(&crc.to_be_bytes());
            }
            put_klv(out, &ul::CRC32_ELEMENT_KEY, &value);
        }
        for (track, element) in self.clip.tracks.iter().zip(&elements) {
            put_klv(out, &essence_element_key(track.track_number), element);
        }
    }
}

pub fn op1a_file(layout: &Op1aLayout) -> Result<Vec<u8>> {
    let mut clip = layout.clip.clone();
    clip.duration = layout.frames_per_partition.iter().sum::<usize>() as i64;
    let metadata = header_metadata_bytes(&clip);

    let mut file = FileBuilder::default();
    let status = if layout.with_footer { 0x04 } else { 0x01 };
    let mut frame = 0;
    for (i, &frames) in layout.frames_per_partition.iter().enumerate() {
        let partition = match i {
            0 => PartitionLayout {
                status,
                header_byte_count: metadata.len() as u64,
                body_sid: 1,
                op: clip.operational_pattern,
                essence_containers: essence_containers(&clip),
                ..Default::default()
            },
            _ => PartitionLayout {
                kind: ul::PARTITION_KIND_BODY,
                status,
                body_sid: 1,
                op: clip.operational_pattern,
                essence_containers: essence_containers(&clip),
                ..Default::default()
            },
        };
        file.partition(partition);
        if i == 0 {
            file.out.extend_from_slice(&metadata);
        }
        for _ in 0..frames {
            layout.content_package(&mut file.out, frame);
            frame += 1;
        }
    }

    if layout.with_footer {
        file.partition(PartitionLayout {
            kind: ul::PARTITION_KIND_FOOTER,
            op: clip.operational_pattern,
            essence_containers: essence_containers(&clip),
            ..Default::default()
        });
    }
    Ok(file.finish(layout.with_rip))
}

/// Header and body partitions of an OP-Atom file whose single essence
/// element value is `value`, followed by a footer holding `index`.
fn opatom_layout(clip: &ClipLayout, value: &[u8], index: Option<Vec<u8>>) -> Vec<u8> {
    let metadata = header_metadata_bytes(clip);
    let containers = essence_containers(clip);
    let mut file = FileBuilder::default();

    file.partition(PartitionLayout {
        header_byte_count: metadata.len() as u64,
        op: ul::OP_ATOM_UL,
        essence_containers: containers.clone(),
        ..Default::default()
    });
    file.out.extend_from_slice(&metadata);

    file.partition(PartitionLayout {
        kind: ul::PARTITION_KIND_BODY,
        body_sid: 1,
        op: ul::OP_ATOM_UL,
        essence_containers: containers.clone(),
        ..Default::default()
    });
    put_klv(&mut file.out, &essence_element_key(clip.tracks[0].track_number), value);

    let mut index_bytes = Vec::new();
    if let Some(segment) = &index {
        put_klv(&mut index_bytes, &ul::INDEX_TABLE_SEGMENT_KEY, segment);
    }
    file.partition(PartitionLayout {
        kind: ul::PARTITION_KIND_FOOTER,
        index_sid: if index.is_some() { clip.index_sid } else { 0 },
        index_byte_count: index_bytes.len() as u64,
        op: ul::OP_ATOM_UL,
        essence_containers: containers,
        ..Default::default()
    });
    file.out.extend_from_slice(&index_bytes);
    file.finish(true)
}

/// Clip-wrapped OP-Atom file holding `clip.duration` frames of its single
/// fixed-size track.
pub fn opatom_file(clip: &ClipLayout) -> Result<Vec<u8>> {
    let mut clip = clip.clone();
    clip.operational_pattern = ul::OP_ATOM_UL;
    clip.playout_start = None;
    clip.tracks = clip.tracks.into_iter().take(1).map(TrackLayout::clip_wrapped).collect();

    let frame_size = clip.tracks[0].frame_size;
    let value: Vec<u8> = (0..clip.duration)
        .flat_map(|frame| frame_data(0, frame, frame_size))
        .collect();
    Ok(opatom_layout(&clip, &value, None))
}

/// Clip-wrapped Avid MJPEG OP-Atom file with frames of `sizes` bytes after
/// `first_frame_offset` bytes of padding, located through an index table.
pub fn opatom_vbe_file(sizes: &[usize], first_frame_offset: u64) -> Result<Vec<u8>> {
    let clip = ClipLayout {
        tracks: vec![TrackLayout::avid_mjpeg()],
        playout_start: None,
        duration: sizes.len() as i64,
        operational_pattern: ul::OP_ATOM_UL,
        ..Default::default()
    };

    let mut value = vec![0xFF; first_frame_offset as usize];
    let mut offsets = Vec::new();
    for (frame, &size) in sizes.iter().enumerate() {
        offsets.push(value.len() as u64);
        value.extend(frame_data(0, frame as i64, size));
    }
    let index = index_segment_value(clip.index_sid, 1, 0, 0, &offsets);
    Ok(opatom_layout(&clip, &value, Some(index)))
}
