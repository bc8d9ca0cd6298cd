//! Frame number to file offset mapping for frame-wrapped essence.
//!
//! A [`FileIndex`] keeps one entry per partition of the file and, for the
//! partitions carrying the indexed body stream, where the essence starts and
//! how many content packages it holds. Content packages are assumed to have
//! a constant length, learned from the first one in the file.
//!
//! Seeks are all-or-nothing: a failed [`FileIndex::set_position`] leaves the
//! cursor and the file position as they were before the call.

use anyhow::{Result, bail};
use log::{debug, trace, warn};

use crate::structs::partition::Partition;
use crate::utils::errors::IndexError;
use crate::utils::klv::{Kl, MxfFile};
use crate::utils::ul::{self, Ul};

fn is_content_package_start(key: &Ul) -> bool {
    ul::is_gc_essence_element(key) || ul::is_system_item(key)
}

fn ends_content_package(key: &Ul) -> bool {
    ul::is_partition_pack(key) || ul::is_rip(key) || ul::is_index_table_segment(key)
}

/// Reads the next KL, mapping end of file to `None`.
fn read_kl_or_eof(file: &mut MxfFile) -> Result<Option<Kl>> {
    match file.read_next_nonfiller_kl() {
        Ok(kl) => Ok(Some(kl)),
        Err(_) if file.eof() => Ok(None),
        Err(e) => Err(e),
    }
}

/// How the list of partitions of a file was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSource {
    RandomIndexPack,
    FooterBackLinks,
    HeaderOnly,
}

/// Finds the partitions of a seekable file.
///
/// Tries the random index pack first, then walks the previous partition
/// links back from the footer, and finally settles for the header partition
/// alone, in which case later partitions are found while reading. The
/// returned flag is true when the footer partition is among the partitions.
pub fn locate_partitions(
    file: &mut MxfFile,
    header: &Partition,
) -> Result<(Vec<Partition>, PartitionSource, bool)> {
    match partitions_from_rip(file) {
        Ok(Some(partitions)) => {
            let complete = partitions.last().is_some_and(|p| p.is_footer());
            debug!("Found {} partitions in the random index pack", partitions.len());
            return Ok((partitions, PartitionSource::RandomIndexPack, complete));
        }
        Ok(None) => debug!("No random index pack"),
        Err(e) => debug!("Ignoring random index pack: {e}"),
    }

    if header.footer_partition > 0 {
        match partitions_from_footer(file, header.footer_partition) {
            Ok(partitions) => {
                debug!("Found {} partitions from the footer", partitions.len());
                return Ok((partitions, PartitionSource::FooterBackLinks, true));
            }
            Err(e) => debug!("Ignoring footer partition links: {e}"),
        }
    }

    debug!("Only the header partition is known");
    Ok((vec![header.clone()], PartitionSource::HeaderOnly, false))
}

fn partitions_from_rip(file: &mut MxfFile) -> Result<Option<Vec<Partition>>> {
    let Some(rip) = file.read_rip()? else {
        return Ok(None);
    };
    if rip.entries.first().is_none_or(|e| e.offset != 0) {
        bail!(IndexError::RipWithoutHeader);
    }
    let mut partitions = Vec::with_capacity(rip.entries.len());
    for entry in &rip.entries {
        partitions.push(file.read_partition_at(entry.offset)?);
    }
    Ok(Some(partitions))
}

fn partitions_from_footer(file: &mut MxfFile, footer_offset: u64) -> Result<Vec<Partition>> {
    let footer = file.read_partition_at(footer_offset)?;
    if !footer.is_footer() {
        bail!(IndexError::NotAFooter(footer_offset));
    }

    let mut partitions = vec![footer];
    loop {
        let Some(last) = partitions.last() else {
            break;
        };
        if last.this_partition == 0 {
            break;
        }
        let previous = last.previous_partition;
        if previous >= last.this_partition {
            bail!(IndexError::BrokenPartitionChain(last.this_partition));
        }
        partitions.push(file.read_partition_at(previous)?);
    }
    partitions.reverse();

    Ok(partitions)
}

/// One partition pack occurrence.
#[derive(Debug, Clone)]
pub struct PartitionEntry {
    pub partition: Partition,
    /// Offset of the partition pack.
    pub start_pos: u64,
    /// Offset just after the partition pack.
    pub data_start_pos: u64,
    /// Offset of the first content package of the indexed stream.
    pub essence_start_pos: Option<u64>,
    /// Unknown for the last partition of a file still being written.
    pub num_content_packages: Option<i64>,
    /// Frame number of the first content package.
    pub start_position: Option<i64>,
}

impl PartitionEntry {
    fn has_essence(&self) -> bool {
        self.essence_start_pos.is_some()
    }

    fn starts_at_or_before(&self, frame: i64) -> bool {
        self.start_position.is_some_and(|start| start <= frame)
    }
}

/// The part of the index a seek moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    partition: usize,
    position: i64,
}

/// Navigation over the content packages of one body stream.
#[derive(Debug)]
pub struct FileIndex {
    body_sid: u32,
    entries: Vec<PartitionEntry>,
    content_package_len: u64,
    start_key: Ul,
    is_complete: bool,
    indexed_duration: i64,
    cursor: Cursor,
}

impl FileIndex {
    /// Builds the index over `partitions` and positions the file at the
    /// first content package.
    pub fn create_index(
        file: &mut MxfFile,
        partitions: Vec<Partition>,
        body_sid: u32,
        is_complete: bool,
    ) -> Result<Self> {
        let mut index = Self {
            body_sid,
            entries: Vec::with_capacity(partitions.len()),
            content_package_len: 0,
            start_key: Ul::default(),
            is_complete,
            indexed_duration: 0,
            cursor: Cursor {
                partition: 0,
                position: -1,
            },
        };

        for partition in partitions {
            let entry = index.scan_partition(file, partition)?;
            index.entries.push(entry);
        }

        let Some(first) = index.entries.iter().position(|e| e.has_essence()) else {
            debug!("No essence for body SID {body_sid}");
            return Ok(index);
        };
        index.learn_content_package(file, first)?;

        let mut start_position = 0;
        for i in 0..index.entries.len() {
            let Some(essence_start) = index.entries[i].essence_start_pos else {
                continue;
            };
            let count = match index.entries.get(i + 1) {
                Some(next) => Some(index.count_content_packages(file, essence_start, next.start_pos)?),
                None if index.is_complete => match file.size()? {
                    Some(size) => Some(index.count_content_packages(file, essence_start, size)?),
                    None => None,
                },
                None => None,
            };

            let entry = &mut index.entries[i];
            entry.start_position = Some(start_position);
            entry.num_content_packages = count;
            trace!(
                "Partition at {}: essence at {essence_start}, frames {start_position}+{count:?}",
                entry.start_pos
            );
            start_position += count.unwrap_or(0);
        }
        index.indexed_duration = start_position;

        let essence_start = index.entries[first].essence_start_pos.unwrap_or_default();
        file.seek(essence_start)?;
        index.cursor = Cursor {
            partition: first,
            position: 0,
        };

        debug!(
            "Index for body SID {body_sid}: {} partitions, content package {} bytes, {} frames{}",
            index.entries.len(),
            index.content_package_len,
            index.indexed_duration,
            if index.is_complete { "" } else { " so far" }
        );

        Ok(index)
    }

    /// Reads a partition pack and finds the start of the indexed essence.
    fn scan_partition(&self, file: &mut MxfFile, partition: Partition) -> Result<PartitionEntry> {
        let start_pos = partition.this_partition;
        file.seek(start_pos)?;
        let kl = file.read_kl()?;
        file.skip(kl.len)?;
        let data_start_pos = file.tell();

        let mut entry = PartitionEntry {
            partition,
            start_pos,
            data_start_pos,
            essence_start_pos: None,
            num_content_packages: None,
            start_position: None,
        };
        if entry.partition.body_sid != self.body_sid || entry.partition.is_footer() {
            return Ok(entry);
        }

        // Header metadata and index table segments precede the essence
        while let Some(kl) = read_kl_or_eof(file)? {
            if is_content_package_start(&kl.key) {
                entry.essence_start_pos = Some(file.tell() - kl.kl_size());
                break;
            }
            if ul::is_partition_pack(&kl.key) || ul::is_rip(&kl.key) {
                break;
            }
            file.skip(kl.len)?;
        }

        Ok(entry)
    }

    fn learn_content_package(&mut self, file: &mut MxfFile, entry: usize) -> Result<()> {
        let essence_start = self.entries[entry].essence_start_pos.unwrap_or_default();
        file.seek(essence_start)?;

        let first = file.read_kl()?;
        file.skip(first.len)?;
        self.start_key = first.key;
        self.content_package_len = first.total_size();

        loop {
            let kl = match file.read_kl() {
                Ok(kl) => kl,
                Err(_) if file.eof() => break,
                Err(e) => return Err(e),
            };
            if kl.key == self.start_key || ends_content_package(&kl.key) {
                break;
            }
            self.content_package_len += kl.total_size();
            file.skip(kl.len)?;
        }

        Ok(())
    }

    /// Content packages between `essence_start` and `end`. A trailing
    /// partial package only counts when it starts with the start key.
    fn count_content_packages(&self, file: &mut MxfFile, essence_start: u64, end: u64) -> Result<i64> {
        let span = end.saturating_sub(essence_start);
        let mut count = span / self.content_package_len;
        if span % self.content_package_len != 0 {
            file.seek(essence_start + count * self.content_package_len)?;
            if file.read_k()? == self.start_key {
                count += 1;
            }
        }
        Ok(count as i64)
    }

    pub fn body_sid(&self) -> u32 {
        self.body_sid
    }

    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    pub fn content_package_len(&self) -> u64 {
        self.content_package_len
    }

    pub fn start_key(&self) -> &Ul {
        &self.start_key
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Frames indexed so far; final once the index is complete.
    pub fn indexed_duration(&self) -> i64 {
        self.indexed_duration
    }

    /// Frame number of the content package at the file position, or -1.
    pub fn current_position(&self) -> i64 {
        self.cursor.position
    }

    /// Runs `op`, restoring the cursor and file position if it fails.
    fn with_rollback<T>(
        &mut self,
        file: &mut MxfFile,
        op: impl FnOnce(&mut Self, &mut MxfFile) -> Result<T>,
    ) -> Result<T> {
        let snapshot = self.cursor;
        let file_pos = file.tell();

        let result = op(self, file);
        if result.is_err() {
            self.cursor = snapshot;
            if let Err(e) = file.seek(file_pos) {
                warn!("Failed to restore file position {file_pos}: {e}");
            }
        }
        result
    }

    /// Positions the file at the content package of `frame`.
    pub fn set_position(&mut self, file: &mut MxfFile, frame: i64) -> Result<()> {
        self.with_rollback(file, |index, file| index.seek_to(file, frame))
    }

    fn seek_to(&mut self, file: &mut MxfFile, frame: i64) -> Result<()> {
        let out_of_range = IndexError::PositionOutOfRange {
            frame,
            indexed: self.indexed_duration,
        };
        if self.content_package_len == 0 || frame < 0 {
            bail!(out_of_range);
        }
        if self.is_complete && frame >= self.indexed_duration {
            bail!(out_of_range);
        }

        let mut i = self.cursor.partition.min(self.entries.len().saturating_sub(1));
        if self.entries[i].starts_at_or_before(frame) {
            while let Some(next) = self.next_essence_entry(i) {
                if !self.entries[next].starts_at_or_before(frame) {
                    break;
                }
                i = next;
            }
        } else {
            while i > 0 && !self.entries[i].starts_at_or_before(frame) {
                i -= 1;
            }
            if !self.entries[i].starts_at_or_before(frame) {
                bail!(out_of_range);
            }
        }

        let entry = &self.entries[i];
        let (Some(essence_start), Some(start)) = (entry.essence_start_pos, entry.start_position)
        else {
            bail!(out_of_range);
        };
        let relative = (frame - start) as u64;
        let offset = essence_start + relative * self.content_package_len;

        match entry.num_content_packages {
            Some(count) if frame - start >= count => bail!(out_of_range),
            Some(_) => {}
            // Still growing: the package has to be in the file already
            None => {
                if let Some(size) = file.size()? {
                    if offset + self.content_package_len > size {
                        bail!(out_of_range);
                    }
                }
            }
        }

        file.seek(offset)?;
        self.cursor = Cursor {
            partition: i,
            position: frame,
        };
        trace!("Positioned at frame {frame}, offset {offset}");

        Ok(())
    }

    fn next_essence_entry(&self, i: usize) -> Option<usize> {
        (i + 1..self.entries.len()).find(|&j| self.entries[j].has_essence())
    }

    /// Makes sure the file is positioned at the content package for the
    /// current position, moving on to later partitions when the current one
    /// is exhausted. Returns false at the end of the essence.
    pub fn next_content_package(&mut self, file: &mut MxfFile) -> Result<bool> {
        if self.content_package_len == 0 || self.cursor.position < 0 {
            return Ok(false);
        }
        self.with_rollback(file, |index, file| index.find_content_package(file))
    }

    fn find_content_package(&mut self, file: &mut MxfFile) -> Result<bool> {
        let entry = &self.entries[self.cursor.partition];
        let (start, count) = (entry.start_position.unwrap_or_default(), entry.num_content_packages);
        match count {
            Some(count) if self.cursor.position - start >= count => {
                self.move_to_next_partition_with_essence(file)
            }
            Some(_) => Ok(true),
            None => {
                let pos = file.tell();
                let Some(kl) = read_kl_or_eof(file)? else {
                    return Ok(false);
                };
                if kl.key == self.start_key {
                    file.seek(pos)?;
                    return Ok(true);
                }
                if !ul::is_partition_pack(&kl.key) && !ul::is_rip(&kl.key) {
                    bail!(IndexError::UnexpectedKey { pos, key: kl.key });
                }

                // The terminal partition ends here
                self.entries[self.cursor.partition].num_content_packages =
                    Some(self.cursor.position - start);
                if ul::is_partition_pack(&kl.key) {
                    self.discover_partition(file, pos)?;
                }
                self.move_to_next_partition_with_essence(file)
            }
        }
    }

    /// Appends the partition whose pack is at `pos`.
    fn discover_partition(&mut self, file: &mut MxfFile, pos: u64) -> Result<()> {
        let partition = file.read_partition_at(pos)?;
        debug!(
            "Discovered {:?} partition at {pos}, body SID {}",
            partition.kind, partition.body_sid
        );
        let is_footer = partition.is_footer();
        let mut entry = self.scan_partition(file, partition)?;
        if entry.has_essence() {
            entry.start_position = Some(self.cursor.position);
        }
        self.entries.push(entry);

        self.indexed_duration = self.cursor.position;
        self.is_complete = is_footer;
        Ok(())
    }

    /// Moves to the first content package of the next partition carrying
    /// the indexed stream. Returns false when there is none (yet).
    pub fn move_to_next_partition_with_essence(&mut self, file: &mut MxfFile) -> Result<bool> {
        loop {
            let next = self.cursor.partition + 1;
            if let Some(entry) = self.entries.get(next) {
                self.cursor.partition = next;
                if let Some(essence_start) = entry.essence_start_pos {
                    file.seek(essence_start)?;
                    return Ok(true);
                }
                continue;
            }

            if self.is_complete {
                return Ok(false);
            }

            // Look past a terminal partition without essence for the next pack
            let current = &self.entries[self.cursor.partition];
            if current.has_essence() {
                return Ok(false);
            }
            file.seek(current.data_start_pos)?;
            loop {
                let pos = file.tell();
                let Some(kl) = read_kl_or_eof(file)? else {
                    return Ok(false);
                };
                if ul::is_partition_pack(&kl.key) {
                    self.discover_partition(file, pos)?;
                    break;
                }
                if ul::is_rip(&kl.key) {
                    return Ok(false);
                }
                file.skip(kl.len)?;
            }
        }
    }

    /// Moves the cursor past the content package that has just been read.
    pub fn advance(&mut self) {
        self.cursor.position += 1;
    }

    /// Number of the last frame present in the file.
    ///
    /// Only answerable for a complete index or an incomplete one with a
    /// single essence partition, where it is derived from the file size.
    pub fn last_written_frame_number(&self, file: &mut MxfFile) -> Result<Option<i64>> {
        if self.is_complete {
            return Ok(Some(self.indexed_duration - 1));
        }
        if self.content_package_len == 0 {
            return Ok(None);
        }

        let mut essence = self.entries.iter().filter(|e| e.has_essence());
        let (Some(entry), None) = (essence.next(), essence.next()) else {
            return Ok(None);
        };
        let Some(size) = file.size()? else {
            return Ok(None);
        };
        let essence_start = entry.essence_start_pos.unwrap_or_default();
        let count = (size.saturating_sub(essence_start) / self.content_package_len) as i64;
        Ok(Some(entry.start_position.unwrap_or_default() + count - 1))
    }
}

/// Forward-only cursor for input that cannot seek.
///
/// Only the content package start key and length can be learned. KLs that
/// are read ahead to find the end of a content package are kept pending for
/// the next read.
#[derive(Debug)]
pub struct NsFileIndex {
    body_sid: u32,
    current_body_sid: u32,
    start_key: Option<Ul>,
    content_package_len: Option<u64>,
    position: i64,
    pending: Option<Kl>,
}

impl NsFileIndex {
    /// `current_body_sid` is the body SID of the partition the file is in.
    pub fn new(body_sid: u32, current_body_sid: u32) -> Self {
        Self {
            body_sid,
            current_body_sid,
            start_key: None,
            content_package_len: None,
            position: 0,
            pending: None,
        }
    }

    pub fn start_key(&self) -> Option<&Ul> {
        self.start_key.as_ref()
    }

    pub fn content_package_len(&self) -> Option<u64> {
        self.content_package_len
    }

    /// Frame number of the next content package.
    pub fn current_position(&self) -> i64 {
        self.position
    }

    /// KL read ahead of the next content package.
    pub fn pending_kl(&self) -> Option<&Kl> {
        self.pending.as_ref()
    }

    pub fn set_pending(&mut self, kl: Kl) {
        self.pending = Some(kl);
    }

    /// Reads forward to the first KL of the next content package, skipping
    /// partition packs, header metadata, index tables and other streams.
    /// Returns `None` at the end of the essence.
    pub fn next_content_package(&mut self, file: &mut MxfFile) -> Result<Option<Kl>> {
        loop {
            let kl = match self.pending.take() {
                Some(kl) => kl,
                None => match read_kl_or_eof(file)? {
                    Some(kl) => kl,
                    None => return Ok(None),
                },
            };

            if ul::is_partition_pack(&kl.key) {
                let partition = file.read_partition(&kl)?;
                self.current_body_sid = partition.body_sid;
                continue;
            }
            if ul::is_rip(&kl.key) {
                return Ok(None);
            }

            if self.current_body_sid == self.body_sid && is_content_package_start(&kl.key) {
                let start_key = *self.start_key.get_or_insert(kl.key);
                if kl.key == start_key {
                    return Ok(Some(kl));
                }
            }
            file.skip(kl.len)?;
        }
    }

    /// True when `key` follows the end of the current content package.
    pub fn ends_content_package(&self, key: &Ul) -> bool {
        Some(key) == self.start_key.as_ref() || ends_content_package(key)
    }

    /// Records a content package of `len` bytes as read.
    pub fn advance(&mut self, len: u64) {
        if self.content_package_len.is_none() {
            self.content_package_len = Some(len);
        }
        self.position += 1;
    }
}
