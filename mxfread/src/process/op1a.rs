//! Content package reader for OP-1A and frame-wrapped OP-Atom files.
//!
//! Each frame is one content package: an optional system item followed by
//! one essence element per track, matched to its track by the track number
//! in the element key. Seekable files are navigated through a
//! [`FileIndex`], other input through a forward-only [`NsFileIndex`].

use anyhow::{Result, bail};
use log::{debug, trace, warn};

use crate::process::file_index::{FileIndex, NsFileIndex, locate_partitions};
use crate::process::reader::{
    EssenceReader, FrameListener, ReadStatus, ReaderOptions, read_frame,
};
use crate::structs::partition::Partition;
use crate::structs::system_item::{SystemItem, parse_crc32_element};
use crate::structs::track::{Clip, EssenceTrack};
use crate::utils::errors::{KlvError, ReaderError};
use crate::utils::klv::{Kl, MxfFile};
use crate::utils::ul;

enum Navigation {
    Indexed(FileIndex),
    Forward(NsFileIndex),
}

/// Dispatches the elements of one content package.
struct ContentPackage<'a> {
    tracks: &'a [EssenceTrack],
    options: &'a ReaderOptions,
    system_item: SystemItem,
    /// Essence elements seen so far, indexing the CRC-32 list.
    element: usize,
    /// Frames read but not yet received by the listener.
    frames: Vec<(usize, Vec<u8>)>,
}

impl<'a> ContentPackage<'a> {
    fn new(tracks: &'a [EssenceTrack], options: &'a ReaderOptions) -> Self {
        Self {
            tracks,
            options,
            system_item: SystemItem::default(),
            element: 0,
            frames: Vec::new(),
        }
    }

    /// Handles the element whose KL has just been read.
    fn process(
        &mut self,
        file: &mut MxfFile,
        kl: &Kl,
        listener: Option<&mut (dyn FrameListener + '_)>,
    ) -> Result<()> {
        if ul::is_system_metadata_pack(&kl.key) {
            let value = file.read_bytes(kl.len)?;
            return self.system_item.set_metadata_pack(&value);
        }
        if ul::is_crc32_element(&kl.key) {
            let value = file.read_bytes(kl.len)?;
            self.system_item.crc32 = Some(parse_crc32_element(&value)?);
            return Ok(());
        }
        if !ul::is_gc_essence_element(&kl.key) {
            trace!("Skipping element {}", kl.key);
            return file.skip(kl.len);
        }

        let element = self.element;
        self.element += 1;
        let track_number = ul::track_number(&kl.key);
        let Some(index) = self.tracks.iter().position(|t| t.track_number == track_number) else {
            trace!("Skipping element of unknown track {track_number:08X}");
            return file.skip(kl.len);
        };
        let Some(listener) = listener else {
            return file.skip(kl.len);
        };
        if !listener.accept_frame(index) {
            return file.skip(kl.len);
        }

        let crc = self
            .system_item
            .crc32
            .as_ref()
            .and_then(|crcs| crcs.get(element).copied());
        let buffer = read_frame(
            file,
            listener,
            index,
            &self.tracks[index],
            kl.len,
            crc,
            self.options,
        )?;
        self.frames.push((index, buffer));
        Ok(())
    }

    /// Hands the frames of the completed package to the listener.
    fn deliver(&mut self, listener: Option<&mut (dyn FrameListener + '_)>) -> Result<()> {
        let Some(listener) = listener else {
            return Ok(());
        };
        let mut frames = std::mem::take(&mut self.frames).into_iter();
        while let Some((index, buffer)) = frames.next() {
            if let Err(e) = listener.receive_frame(index, buffer) {
                for (index, buffer) in frames {
                    listener.deallocate_buffer(index, buffer);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Returns the buffers of a package that failed to read.
    fn discard(&mut self, listener: Option<&mut (dyn FrameListener + '_)>) {
        if let Some(listener) = listener {
            for (index, buffer) in self.frames.drain(..) {
                listener.deallocate_buffer(index, buffer);
            }
        }
    }
}

pub struct Op1aReader {
    tracks: Vec<EssenceTrack>,
    options: ReaderOptions,
    navigation: Navigation,
    /// Duration from the header metadata, -1 when unknown.
    metadata_duration: i64,
    system_item: Option<SystemItem>,
}

impl Op1aReader {
    /// Sets up navigation over the body stream of the clip's tracks. The
    /// file must be positioned after the header metadata.
    pub fn open(
        file: &mut MxfFile,
        header: &Partition,
        clip: &Clip,
        options: ReaderOptions,
    ) -> Result<Self> {
        for track in &clip.tracks {
            if track.frame_size.is_variable() {
                bail!(ReaderError::VariableFrameSize(track.track_id));
            }
        }
        let Some(body_sid) = clip.tracks.first().map(|t| t.body_sid) else {
            bail!(ReaderError::NoEssenceTracks);
        };
        if let Some(other) = clip.tracks.iter().find(|t| t.body_sid != body_sid) {
            bail!(ReaderError::MultipleBodyStreams {
                first: body_sid,
                other: other.body_sid
            });
        }

        let navigation = if file.is_seekable() {
            let (partitions, source, complete) = locate_partitions(file, header)?;
            debug!("Partitions from {source:?}, complete: {complete}");
            Navigation::Indexed(FileIndex::create_index(file, partitions, body_sid, complete)?)
        } else {
            Navigation::Forward(NsFileIndex::new(body_sid, header.body_sid))
        };

        Ok(Self {
            tracks: clip.tracks.clone(),
            options,
            navigation,
            metadata_duration: clip.duration,
            system_item: None,
        })
    }

    /// Reads or skips the next content package.
    fn next_frame(
        &mut self,
        file: &mut MxfFile,
        mut listener: Option<&mut (dyn FrameListener + '_)>,
    ) -> Result<ReadStatus> {
        let duration = self.duration();
        let mut package = ContentPackage::new(&self.tracks, &self.options);

        match &mut self.navigation {
            Navigation::Indexed(index) => {
                if index.is_complete() && index.current_position() >= duration {
                    return Ok(ReadStatus::EndOfEssence);
                }
                if !index.next_content_package(file)? {
                    return Ok(ReadStatus::EndOfEssence);
                }

                let start = file.tell();
                let end = start + index.content_package_len();
                let read = read_indexed(
                    file,
                    &mut package,
                    index.start_key(),
                    end,
                    listener.as_deref_mut(),
                );
                if let Err(e) = read {
                    package.discard(listener);
                    if let Err(seek_err) = file.seek(start) {
                        warn!("Failed to restore file position {start}: {seek_err}");
                    }
                    return Err(e);
                }
                index.advance();
            }
            Navigation::Forward(index) => {
                let Some(first) = index.next_content_package(file)? else {
                    return Ok(ReadStatus::EndOfEssence);
                };
                let start = file.tell() - first.kl_size();
                let read = read_forward(file, &mut package, index, first, listener.as_deref_mut());
                if let Err(e) = read {
                    package.discard(listener);
                    return Err(e);
                }
                let len = file.tell() - start - index_pending_size(index);
                index.advance(len);
            }
        }

        package.deliver(listener)?;
        self.system_item = Some(package.system_item);
        Ok(ReadStatus::Frame)
    }
}

/// KL size of the read-ahead KL, which has been consumed but is not part of
/// the content package.
fn index_pending_size(index: &NsFileIndex) -> u64 {
    index.pending_kl().map_or(0, |kl| kl.kl_size())
}

fn read_indexed(
    file: &mut MxfFile,
    package: &mut ContentPackage<'_>,
    start_key: &ul::Ul,
    end: u64,
    mut listener: Option<&mut (dyn FrameListener + '_)>,
) -> Result<()> {
    let start = file.tell();
    while file.tell() < end {
        let pos = file.tell();
        let kl = file.read_kl()?;
        if pos > start && (kl.key == *start_key || ul::is_partition_pack(&kl.key)) {
            file.seek(pos)?;
            break;
        }
        let remaining = end.saturating_sub(file.tell());
        if kl.len > remaining {
            bail!(KlvError::LengthExceedsFile {
                pos: file.tell(),
                len: kl.len,
                remaining
            });
        }
        package.process(file, &kl, listener.as_deref_mut())?;
    }
    Ok(())
}

fn read_forward(
    file: &mut MxfFile,
    package: &mut ContentPackage<'_>,
    index: &mut NsFileIndex,
    first: Kl,
    mut listener: Option<&mut (dyn FrameListener + '_)>,
) -> Result<()> {
    package.process(file, &first, listener.as_deref_mut())?;
    loop {
        let kl = match file.read_next_nonfiller_kl() {
            Ok(kl) => kl,
            Err(_) if file.eof() => return Ok(()),
            Err(e) => return Err(e),
        };
        if index.ends_content_package(&kl.key) {
            index.set_pending(kl);
            return Ok(());
        }
        package.process(file, &kl, listener.as_deref_mut())?;
    }
}

impl EssenceReader for Op1aReader {
    fn set_options(&mut self, options: ReaderOptions) {
        self.options = options;
    }

    fn duration(&self) -> i64 {
        match &self.navigation {
            Navigation::Indexed(index) if index.is_complete() => match self.metadata_duration {
                d if d >= 0 => d.min(index.indexed_duration()),
                _ => index.indexed_duration(),
            },
            _ => self.metadata_duration,
        }
    }

    fn position_at_frame(&mut self, file: &mut MxfFile, frame: i64) -> Result<()> {
        let duration = self.duration();
        let current = match &mut self.navigation {
            Navigation::Indexed(index) => {
                if index.is_complete() && frame >= duration {
                    bail!(ReaderError::FrameOutOfRange { frame, duration });
                }
                index.set_position(file, frame)?;
                self.system_item = None;
                return Ok(());
            }
            Navigation::Forward(index) => index.current_position(),
        };

        if frame < current {
            bail!(ReaderError::NotSeekable { frame, current });
        }
        for _ in current..frame {
            if self.skip_next_frame(file)? == ReadStatus::EndOfEssence {
                bail!(ReaderError::FrameOutOfRange {
                    frame,
                    duration: self.next_frame_number()
                });
            }
        }
        self.system_item = None;
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
        match &self.navigation {
            Navigation::Indexed(index) => index.current_position().max(0),
            Navigation::Forward(index) => index.current_position(),
        }
    }

    fn last_written_frame_number(&mut self, file: &mut MxfFile) -> Result<Option<i64>> {
        match &self.navigation {
            Navigation::Indexed(index) => index.last_written_frame_number(file),
            Navigation::Forward(_) => Ok(None),
        }
    }

    fn system_item(&self) -> Option<&SystemItem> {
        self.system_item.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::metadata::HeaderMetadata;
    use crate::process::header::HeaderProcessor;
    use crate::structs::testutil::{Op1aLayout, op1a_file};
    use std::io::Cursor;

    struct Sizes(Vec<(usize, usize)>);

    impl FrameListener for Sizes {
        fn receive_frame(&mut self, track: usize, buffer: Vec<u8>) -> Result<()> {
            self.0.push((track, buffer.len()));
            Ok(())
        }
    }

    fn open(file: &mut MxfFile) -> Result<Op1aReader> {
        let kl = file.locate_header_partition()?;
        let header = file.read_partition(&kl)?;
        let metadata = HeaderMetadata::read(file, &header)?;
        let clip = HeaderProcessor::default().process(&metadata, &header)?;
        Op1aReader::open(file, &header, &clip, ReaderOptions::default())
    }

    #[test]
    fn seekable_and_forward_agree() -> Result<()> {
        let layout = Op1aLayout {
            frames_per_partition: vec![2, 3],
            ..Default::default()
        };
        let bytes = op1a_file(&layout)?;

        let mut results = Vec::new();
        for mut file in [
            MxfFile::from_seekable(Cursor::new(bytes.clone()))?,
            MxfFile::from_stream(Cursor::new(bytes)),
        ] {
            let mut reader = open(&mut file)?;
            let mut sizes = Sizes(Vec::new());
            while reader.read_next_frame(&mut file, &mut sizes)? == ReadStatus::Frame {}
            assert_eq!(reader.next_frame_number(), 5);
            results.push(sizes.0);
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0].len(), 10);
        Ok(())
    }

    #[test]
    fn skipping_parses_the_system_item() -> Result<()> {
        let layout = Op1aLayout {
            frames_per_partition: vec![3],
            system_item_start: Some(100),
            ..Default::default()
        };
        let mut file = MxfFile::from_seekable(Cursor::new(op1a_file(&layout)?))?;
        let mut reader = open(&mut file)?;
        reader.position_at_frame(&mut file, 2)?;
        assert!(reader.system_item().is_none());
        assert_eq!(reader.skip_next_frame(&mut file)?, ReadStatus::Frame);
        let creation = reader.system_item().and_then(|s| s.creation_timecode);
        assert_eq!(creation.map(|tc| tc.to_frame_count(25)), Some(102));
        assert_eq!(reader.skip_next_frame(&mut file)?, ReadStatus::EndOfEssence);
        Ok(())
    }

    #[derive(Default)]
    struct Buffers {
        allocated: usize,
        received: usize,
        returned: usize,
    }

    impl FrameListener for Buffers {
        fn allocate_buffer(&mut self, _track: usize, size: usize) -> Result<Vec<u8>> {
            self.allocated += 1;
            Ok(vec![0; size])
        }

        fn deallocate_buffer(&mut self, _track: usize, _buffer: Vec<u8>) {
            self.returned += 1;
        }

        fn receive_frame(&mut self, _track: usize, _buffer: Vec<u8>) -> Result<()> {
            self.received += 1;
            Ok(())
        }
    }

    #[test]
    fn crc_failure_withholds_whole_package() -> Result<()> {
        let layout = Op1aLayout {
            frames_per_partition: vec![2],
            with_crc32: true,
            corrupt_crc_frame: Some(1),
            ..Default::default()
        };
        let mut file = MxfFile::from_seekable(Cursor::new(op1a_file(&layout)?))?;
        let mut reader = open(&mut file)?;
        reader.set_options(ReaderOptions {
            fail_level: log::Level::Warn,
            check_crc32: true,
        });

        let mut buffers = Buffers::default();
        assert_eq!(reader.read_next_frame(&mut file, &mut buffers)?, ReadStatus::Frame);
        assert_eq!(buffers.received, 2);

        let err = reader.read_next_frame(&mut file, &mut buffers).err();
        assert!(matches!(
            err.as_ref().and_then(|e| e.downcast_ref::<ReaderError>()),
            Some(ReaderError::Crc32Mismatch { .. })
        ));
        // the picture element read fine but is handed back, not received
        assert_eq!(buffers.received, 2);
        assert_eq!(buffers.returned, 2);
        assert_eq!(buffers.allocated, buffers.received + buffers.returned);
        assert_eq!(reader.next_frame_number(), 1);
        Ok(())
    }

    #[test]
    fn forward_input_rejects_backward_seek() -> Result<()> {
        let layout = Op1aLayout {
            frames_per_partition: vec![3],
            ..Default::default()
        };
        let mut file = MxfFile::from_stream(Cursor::new(op1a_file(&layout)?));
        let mut reader = open(&mut file)?;
        reader.position_at_frame(&mut file, 2)?;
        assert_eq!(reader.next_frame_number(), 2);
        let err = reader.position_at_frame(&mut file, 1).err();
        assert!(matches!(
            err.as_ref().and_then(|e| e.downcast_ref::<ReaderError>()),
            Some(ReaderError::NotSeekable { .. })
        ));
        assert!(reader.position_at_frame(&mut file, 5).is_err());
        Ok(())
    }
}
