//! Essence reading façade.
//!
//! [`MxfReader`] opens a file, turns its header metadata into a [`Clip`] and
//! picks the [`EssenceReader`] for the operational pattern: OP-1A and
//! frame-wrapped OP-Atom content packages go through
//! [`Op1aReader`](crate::process::op1a::Op1aReader), clip-wrapped OP-Atom
//! through [`OpAtomReader`](crate::process::opatom::OpAtomReader).
//!
//! Frame reads return [`ReadStatus::EndOfEssence`] when there is nothing left
//! to read, which is distinct from an error.

use std::path::Path;

use anyhow::{Result, anyhow, bail};
use log::{debug, warn};

use crate::process::header::{HeaderProcessor, renegotiate_frame_rate};
use crate::process::op1a::Op1aReader;
use crate::process::opatom::OpAtomReader;
use crate::structs::metadata::{HeaderMetadata, Rational};
use crate::structs::system_item::SystemItem;
use crate::structs::timecode::Timecode;
use crate::structs::track::{Clip, EssenceTrack, SourceTimecode, TimecodeKind, Wrapping};
use crate::utils::crc::CRC_32_IEEE;
use crate::utils::errors::ReaderError;
use crate::utils::klv::MxfFile;
use crate::utils::ul;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Frame,
    EndOfEssence,
}

/// Receives the frames read by [`MxfReader::read_next_frame`].
///
/// For every allocated buffer exactly one of `receive_frame` and
/// `deallocate_buffer` is called. Frames of a content package are received
/// only once the whole package has been read and checked, so a read that
/// fails delivers nothing.
pub trait FrameListener {
    /// Whether the frame of track `track` should be read at all.
    fn accept_frame(&mut self, _track: usize) -> bool {
        true
    }

    /// Returns a buffer of at least `size` bytes.
    fn allocate_buffer(&mut self, _track: usize, size: usize) -> Result<Vec<u8>> {
        Ok(vec![0; size])
    }

    /// Takes back a buffer after a failed read.
    fn deallocate_buffer(&mut self, _track: usize, _buffer: Vec<u8>) {}

    fn receive_frame(&mut self, track: usize, buffer: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub fail_level: log::Level,
    /// Compare essence elements against the CRC-32 system item.
    pub check_crc32: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            check_crc32: false,
        }
    }
}

/// Reads `size` bytes of a frame into a listener buffer, checks it against
/// `expected_crc` and strips the image start offset. The buffer is not yet
/// handed to the listener.
pub(crate) fn read_frame(
    file: &mut MxfFile,
    listener: &mut dyn FrameListener,
    index: usize,
    track: &EssenceTrack,
    size: u64,
    expected_crc: Option<u32>,
    options: &ReaderOptions,
) -> Result<Vec<u8>> {
    // Input of unknown size is read before asking for a buffer
    let streamed = match file.is_seekable() {
        true => {
            file.check_len(size)?;
            None
        }
        false => Some(file.read_bytes(size)?),
    };
    let size = usize::try_from(size)?;
    let mut buffer = listener.allocate_buffer(index, size)?;
    if buffer.len() < size {
        let found = buffer.len();
        listener.deallocate_buffer(index, buffer);
        bail!(ReaderError::BufferTooSmall {
            track: index,
            needed: size,
            found
        });
    }
    buffer.truncate(size);

    let filled = match streamed {
        Some(data) => {
            buffer.copy_from_slice(&data);
            Ok(())
        }
        None => file.read_exact(&mut buffer),
    };
    if let Err(e) = filled {
        listener.deallocate_buffer(index, buffer);
        return Err(e);
    }

    if options.check_crc32 {
        if let Some(expected) = expected_crc {
            let found = CRC_32_IEEE.checksum(&buffer);
            if found != expected {
                let err = anyhow!(ReaderError::Crc32Mismatch {
                    track: track.track_id,
                    expected,
                    found
                });
                if log::Level::Warn <= options.fail_level {
                    listener.deallocate_buffer(index, buffer);
                    return Err(err);
                }
                warn!("{err}");
            }
        }
    }

    let padding = (track.image_start_offset as usize).min(buffer.len());
    if padding > 0 {
        buffer.drain(..padding);
    }
    Ok(buffer)
}

/// Frame access to the essence of one operational pattern.
pub trait EssenceReader {
    fn set_options(&mut self, options: ReaderOptions);

    /// Playable frames, capped by what the file holds.
    fn duration(&self) -> i64;

    fn position_at_frame(&mut self, file: &mut MxfFile, frame: i64) -> Result<()>;

    fn skip_next_frame(&mut self, file: &mut MxfFile) -> Result<ReadStatus>;

    fn read_next_frame(
        &mut self,
        file: &mut MxfFile,
        listener: &mut dyn FrameListener,
    ) -> Result<ReadStatus>;

    /// Frame number of the next frame to be read.
    fn next_frame_number(&self) -> i64;

    fn last_written_frame_number(&mut self, file: &mut MxfFile) -> Result<Option<i64>>;

    /// System item of the most recently read content package.
    fn system_item(&self) -> Option<&SystemItem> {
        None
    }

    /// Applies a renegotiated clip frame rate.
    fn set_frame_rate(&mut self, _file: &mut MxfFile, _clip: &Clip) -> Result<()> {
        bail!(ReaderError::FrameRateChangeUnsupported)
    }
}

/// An open MXF file with frame access to its essence.
pub struct MxfReader {
    file: MxfFile,
    clip: Clip,
    reader: Box<dyn EssenceReader>,
    options: ReaderOptions,
    /// A frame was read or skipped since the last positioning.
    has_read: bool,
}

impl MxfReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(MxfFile::open(path)?, ReaderOptions::default())
    }

    pub fn from_file(file: MxfFile) -> Result<Self> {
        Self::with_options(file, ReaderOptions::default())
    }

    pub fn with_options(mut file: MxfFile, options: ReaderOptions) -> Result<Self> {
        let kl = file.locate_header_partition()?;
        let header = file.read_partition(&kl)?;
        let metadata = HeaderMetadata::read(&mut file, &header)?;
        let mut clip = HeaderProcessor {
            fail_level: options.fail_level,
        }
        .process(&metadata, &header)?;

        let op = clip.operational_pattern;
        let frame_wrapped = clip.tracks.iter().all(|t| t.wrapping == Wrapping::Frame);
        let reader: Box<dyn EssenceReader> =
            if ul::is_op1a(&op) || (ul::is_op_atom(&op) && frame_wrapped) {
                debug!("Reading content packages ({op})");
                Box::new(Op1aReader::open(&mut file, &header, &clip, options)?)
            } else if ul::is_op_atom(&op) {
                debug!("Reading clip-wrapped OP-Atom essence");
                let reader = OpAtomReader::open(&mut file, &header, &clip, options)?;
                clip.tracks[0].first_frame_offset = reader.track().first_frame_offset;
                Box::new(reader)
            } else {
                bail!(ReaderError::UnsupportedOperationalPattern(op));
            };

        let mut mxf = Self {
            file,
            clip,
            reader,
            options,
            has_read: false,
        };
        mxf.add_system_item_timecodes()?;

        Ok(mxf)
    }

    /// Adds the system item timecodes found in the first content package.
    fn add_system_item_timecodes(&mut self) -> Result<()> {
        if !self.file.is_seekable() {
            return Ok(());
        }
        let Some(item) = self.peek_system_item()? else {
            return Ok(());
        };
        for (kind, timecode) in [
            (TimecodeKind::SystemItemCreation, item.creation_timecode),
            (TimecodeKind::SystemItemUser, item.user_timecode),
        ] {
            if timecode.is_some() {
                self.clip
                    .source_timecodes
                    .push(SourceTimecode { kind, track: None });
            }
        }
        Ok(())
    }

    /// System item of the next frame, leaving the position unchanged.
    fn peek_system_item(&mut self) -> Result<Option<SystemItem>> {
        let next = self.reader.next_frame_number();
        if self.reader.skip_next_frame(&mut self.file)? == ReadStatus::EndOfEssence {
            return Ok(None);
        }
        let item = self.reader.system_item().cloned();
        self.reader.position_at_frame(&mut self.file, next)?;
        Ok(item)
    }

    pub fn clip(&self) -> &Clip {
        &self.clip
    }

    pub fn num_tracks(&self) -> usize {
        self.clip.tracks.len()
    }

    pub fn track(&self, index: usize) -> Option<&EssenceTrack> {
        self.clip.tracks.get(index)
    }

    pub fn frame_rate(&self) -> Rational {
        self.clip.frame_rate
    }

    pub fn duration(&self) -> i64 {
        self.reader.duration()
    }

    pub fn is_seekable(&self) -> bool {
        self.file.is_seekable()
    }

    /// Sets the failure level for recoverable conditions while reading.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on CRC-32 mismatches and defaulted items (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.options.fail_level = level;
        self.reader.set_options(self.options);
    }

    pub fn set_check_crc32(&mut self, check: bool) {
        self.options.check_crc32 = check;
        self.reader.set_options(self.options);
    }

    /// Reads an audio-only clip in frames of `frame_rate`, restarting at
    /// frame 0.
    pub fn set_frame_rate(&mut self, frame_rate: Rational) -> Result<()> {
        let mut clip = self.clip.clone();
        renegotiate_frame_rate(&mut clip, frame_rate)?;
        self.reader.set_frame_rate(&mut self.file, &clip)?;
        self.clip = clip;
        self.has_read = false;
        Ok(())
    }

    pub fn position_at_frame(&mut self, frame: i64) -> Result<()> {
        self.reader.position_at_frame(&mut self.file, frame)?;
        self.has_read = false;
        Ok(())
    }

    pub fn skip_next_frame(&mut self) -> Result<ReadStatus> {
        let status = self.reader.skip_next_frame(&mut self.file)?;
        self.has_read |= status == ReadStatus::Frame;
        Ok(status)
    }

    pub fn read_next_frame(&mut self, listener: &mut dyn FrameListener) -> Result<ReadStatus> {
        let status = self.reader.read_next_frame(&mut self.file, listener)?;
        self.has_read |= status == ReadStatus::Frame;
        Ok(status)
    }

    /// Number of the most recently read frame, -1 before the first read.
    pub fn frame_number(&self) -> i64 {
        self.reader.next_frame_number() - 1
    }

    pub fn last_written_frame_number(&mut self) -> Result<Option<i64>> {
        self.reader.last_written_frame_number(&mut self.file)
    }

    /// The frame timecode queries refer to.
    fn timecode_frame(&self) -> i64 {
        match self.has_read {
            true => self.frame_number(),
            false => self.reader.next_frame_number(),
        }
    }

    pub fn playout_timecode(&self) -> Option<Timecode> {
        self.clip
            .playout_timecode
            .map(|track| track.timecode_at(self.timecode_frame()))
    }

    pub fn num_source_timecodes(&self) -> usize {
        self.clip.source_timecodes.len()
    }

    /// Source timecode `index`; `None` when this frame does not carry one.
    pub fn source_timecode(&mut self, index: usize) -> Result<Option<Timecode>> {
        let source = *self
            .clip
            .source_timecodes
            .get(index)
            .ok_or(ReaderError::SourceTimecodeIndex(index))?;
        match source.track {
            Some(track) => Ok(Some(track.timecode_at(self.timecode_frame()))),
            None => self.system_item_timecode(source.kind),
        }
    }

    fn system_item_timecode(&mut self, kind: TimecodeKind) -> Result<Option<Timecode>> {
        let item = match self.has_read {
            true => self.reader.system_item().cloned(),
            false if self.file.is_seekable() => self.peek_system_item()?,
            false => None,
        };
        Ok(item.and_then(|item| match kind {
            TimecodeKind::SystemItemCreation => item.creation_timecode,
            TimecodeKind::SystemItemUser => item.user_timecode,
            _ => None,
        }))
    }

    pub fn position_at_playout_timecode(&mut self, timecode: &Timecode) -> Result<()> {
        let track = self
            .clip
            .playout_timecode
            .ok_or(ReaderError::TimecodeUnavailable)?;
        self.position_at_frame(track.frame_of(timecode))
    }

    /// Positions at the frame with source timecode `timecode` of the
    /// `index`-th source timecode of kind `kind`.
    pub fn position_at_source_timecode(
        &mut self,
        timecode: &Timecode,
        kind: TimecodeKind,
        index: usize,
    ) -> Result<()> {
        let source = *self
            .clip
            .source_timecodes
            .iter()
            .filter(|s| s.kind == kind)
            .nth(index)
            .ok_or(ReaderError::TimecodeUnavailable)?;
        if let Some(track) = source.track {
            return self.position_at_frame(track.frame_of(timecode));
        }

        // System item timecodes are only known per frame: jump by the
        // difference to the current one and check the result
        let reference = self.timecode_frame();
        let original = self.reader.next_frame_number();
        let original_has_read = self.has_read;
        let current = self
            .system_item_timecode(kind)?
            .ok_or(ReaderError::TimecodeUnavailable)?;
        let base = self.clip.frame_rate.rounded();
        let target = reference + timecode.to_frame_count(base) - current.to_frame_count(base);

        self.position_at_frame(target)?;
        if self.system_item_timecode(kind)? == Some(*timecode) {
            return Ok(());
        }

        self.reader.position_at_frame(&mut self.file, original)?;
        self.has_read = original_has_read;
        bail!(ReaderError::TimecodeNotFound(timecode.to_string()))
    }
}
