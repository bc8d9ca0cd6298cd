//! Reader for clip-wrapped OP-Atom files.
//!
//! The single track's essence is one KLV element. Frames inside it are
//! located by arithmetic for fixed and sequence frame sizes, and through the
//! stream offsets of the index table for variable sizes. Stream offsets are
//! relative to the start of the element value.

use anyhow::{Result, bail};
use log::{debug, trace};

use crate::process::essence_format::audio_frame_count;
use crate::process::reader::{
    EssenceReader, FrameListener, ReadStatus, ReaderOptions, read_frame,
};
use crate::structs::index_table::{IndexTableSegment, collect_stream_offsets};
use crate::structs::partition::Partition;
use crate::structs::track::{Clip, EssenceTrack, FrameSize};
use crate::utils::errors::ReaderError;
use crate::utils::klv::MxfFile;
use crate::utils::ul;

pub struct OpAtomReader {
    track: EssenceTrack,
    options: ReaderOptions,
    /// Offset of the essence element value.
    value_start: u64,
    value_len: u64,
    /// Per-frame offsets into the value, for variable frame sizes.
    offsets: Vec<u64>,
    duration: i64,
    /// Next frame to be read.
    position: i64,
}

impl OpAtomReader {
    /// Locates the essence element and, for variable frame sizes, the index
    /// table. The file must be positioned after the header metadata.
    pub fn open(
        file: &mut MxfFile,
        header: &Partition,
        clip: &Clip,
        options: ReaderOptions,
    ) -> Result<Self> {
        let [track] = clip.tracks.as_slice() else {
            bail!(ReaderError::OpAtomTrackCount(clip.tracks.len()));
        };
        let mut track = track.clone();

        let mut segments = Vec::new();
        let mut essence = None;
        let mut current_body_sid = header.body_sid;
        loop {
            let kl = match file.read_next_nonfiller_kl() {
                Ok(kl) => kl,
                Err(_) if file.eof() => break,
                Err(e) => return Err(e),
            };
            if ul::is_partition_pack(&kl.key) {
                current_body_sid = file.read_partition(&kl)?.body_sid;
            } else if ul::is_index_table_segment(&kl.key) {
                let segment = IndexTableSegment::parse(&kl.key, &file.read_bytes(kl.len)?)?;
                if segment.index_sid == track.index_sid {
                    segments.push(segment);
                }
            } else if ul::is_rip(&kl.key) {
                break;
            } else if essence.is_none()
                && ul::is_gc_essence_element(&kl.key)
                && current_body_sid == track.body_sid
            {
                essence = Some((file.tell(), kl.len));
                // Forward-only input stays at the essence
                if !file.is_seekable() {
                    break;
                }
                file.skip(kl.len)?;
            } else {
                file.skip(kl.len)?;
            }
        }
        let Some((value_start, value_len)) = essence else {
            bail!(ReaderError::EssenceNotFound(track.body_sid));
        };
        trace!("Essence element at {value_start}, {value_len} bytes");

        let mut offsets = Vec::new();
        if track.frame_size.is_variable() {
            if let Some(cbe) = segments.iter().find(|s| s.is_cbe()) {
                track.frame_size = FrameSize::Fixed(cbe.edit_unit_byte_count);
            } else {
                // The index follows the essence
                if !file.is_seekable() {
                    bail!(ReaderError::MissingIndex(track.index_sid));
                }
                offsets = collect_stream_offsets(&segments)?;
                let Some(&first) = offsets.first() else {
                    bail!(ReaderError::MissingIndex(track.index_sid));
                };
                track.first_frame_offset = first;
            }
        }

        let available = value_len.saturating_sub(track.first_frame_offset);
        let stored = match &track.frame_size {
            FrameSize::Variable => offsets.len() as i64,
            size => audio_frame_count(size, available),
        };
        let duration = match track.duration {
            d if d >= 0 => d.min(stored),
            _ => stored,
        };
        debug!("Clip-wrapped essence: {duration} frames ({stored} stored)");

        let reader = Self {
            track,
            options,
            value_start,
            value_len,
            offsets,
            duration,
            position: 0,
        };
        if file.is_seekable() {
            file.seek(reader.frame_location(0)?.0)?;
        } else if reader.track.first_frame_offset > 0 {
            file.skip(reader.track.first_frame_offset)?;
        }
        Ok(reader)
    }

    pub fn track(&self) -> &EssenceTrack {
        &self.track
    }

    /// File offset and size of `frame`.
    fn frame_location(&self, frame: i64) -> Result<(u64, u64)> {
        let out_of_range = ReaderError::FrameOutOfRange {
            frame,
            duration: self.duration,
        };
        if frame < 0 {
            bail!(out_of_range);
        }
        if let FrameSize::Variable = self.track.frame_size {
            let Some(&offset) = self.offsets.get(frame as usize) else {
                bail!(out_of_range);
            };
            let end = self
                .offsets
                .get(frame as usize + 1)
                .copied()
                .unwrap_or(self.value_len);
            return Ok((self.value_start + offset, end.saturating_sub(offset)));
        }

        let (Some(offset), Some(size)) = (
            self.track.frame_size.offset_of(frame),
            self.track.frame_size.size_of(frame),
        ) else {
            bail!(out_of_range);
        };
        Ok((
            self.value_start + self.track.first_frame_offset + offset,
            size as u64,
        ))
    }

    fn next_frame(
        &mut self,
        file: &mut MxfFile,
        listener: Option<&mut (dyn FrameListener + '_)>,
    ) -> Result<ReadStatus> {
        if self.position >= self.duration {
            return Ok(ReadStatus::EndOfEssence);
        }
        let (offset, size) = self.frame_location(self.position)?;
        if file.is_seekable() {
            file.seek(offset)?;
        }

        let start = file.tell();
        let result = match listener {
            Some(listener) => match listener.accept_frame(0) {
                true => read_frame(file, listener, 0, &self.track, size, None, &self.options)
                    .map(|buffer| Some((listener, buffer))),
                false => file.skip(size).map(|_| None),
            },
            None => file.skip(size).map(|_| None),
        };
        let read = match result {
            Ok(read) => read,
            Err(e) => {
                if file.is_seekable() {
                    file.seek(start)?;
                }
                return Err(e);
            }
        };

        self.position += 1;
        if let Some((listener, buffer)) = read {
            listener.receive_frame(0, buffer)?;
        }
        Ok(ReadStatus::Frame)
    }
}

impl EssenceReader for OpAtomReader {
    fn set_options(&mut self, options: ReaderOptions) {
        self.options = options;
    }

    fn duration(&self) -> i64 {
        self.duration
    }

    fn position_at_frame(&mut self, file: &mut MxfFile, frame: i64) -> Result<()> {
        if frame < 0 || frame >= self.duration {
            bail!(ReaderError::FrameOutOfRange {
                frame,
                duration: self.duration
            });
        }
        let (offset, _) = self.frame_location(frame)?;
        if file.is_seekable() {
            file.seek(offset)?;
        } else {
            let current = self.position;
            if frame < current {
                bail!(ReaderError::NotSeekable { frame, current });
            }
            file.skip(offset - file.tell())?;
        }
        self.position = frame;
        Ok(())
    }

    fn skip_next_frame(&mut self, file: &mut MxfFile) -> Result<ReadStatus> {
        self.next_frame(file, None)
    }

    fn read_next_frame(
        &mut self,
        file: &mut MxfFile,
        listener: &mut dyn FrameListener,
    ) -> Result<ReadStatus> {
        self.next_frame(file, Some(listener))
    }

    fn next_frame_number(&self) -> i64 {
        self.position
    }

    /// Frames fully present in the file, for a file that may still be
    /// growing.
    fn last_written_frame_number(&mut self, file: &mut MxfFile) -> Result<Option<i64>> {
        if self.track.frame_size.is_variable() {
            return Ok(Some(self.duration - 1));
        }
        let Some(size) = file.size()? else {
            return Ok(None);
        };
        let end = size.min(self.value_start + self.value_len);
        let written = end.saturating_sub(self.value_start + self.track.first_frame_offset);
        Ok(Some(audio_frame_count(&self.track.frame_size, written) - 1))
    }

    fn set_frame_rate(&mut self, file: &mut MxfFile, clip: &Clip) -> Result<()> {
        let Some(track) = clip.tracks.first() else {
            bail!(ReaderError::NoEssenceTracks);
        };
        if !file.is_seekable() && self.position > 0 {
            bail!(ReaderError::NotSeekable {
                frame: 0,
                current: self.position
            });
        }

        let first_frame_offset = self.track.first_frame_offset;
        self.track = track.clone();
        self.track.first_frame_offset = first_frame_offset;
        let stored = audio_frame_count(
            &self.track.frame_size,
            self.value_len.saturating_sub(first_frame_offset),
        );
        self.duration = match track.duration {
            d if d >= 0 => d.min(stored),
            _ => stored,
        };
        self.position = 0;
        if file.is_seekable() {
            file.seek(self.value_start + first_frame_offset)?;
        }
        debug!("Frame rate now {}: {} frames", track.frame_rate, self.duration);
        Ok(())
    }
}
