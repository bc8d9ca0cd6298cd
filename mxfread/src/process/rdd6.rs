use anyhow::{Result, anyhow, bail};
use log::{debug, trace};

use crate::log_or_err;
use crate::structs::rdd6::frame::{Rdd6Frame, SubFrame};
use crate::structs::rdd6::segment::{DataSegment, SyncSegment};
use crate::structs::rdd6::{END_SYNC_WORD, FIRST_SUBFRAME_SYNC_WORD, SECOND_SUBFRAME_SYNC_WORD};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::Rdd6Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    SeekingFirstSync,
    InFirstSubFrame,
    SeekingSecondSync,
    InSecondSubFrame,
    SeekingEndSync,
    Done,
}

/// Parses RDD-6 frames from captured ANC payload bytes.
///
/// Sync word irregularities and checksum mismatches are reported at
/// `Warn` and parsing continues, unless the fail level says otherwise.
#[derive(Debug, Clone)]
pub struct Rdd6Parser {
    pub fail_level: log::Level,
}

impl Default for Rdd6Parser {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
        }
    }
}

fn find_sync(data: &[u8], from: usize, sync_word: u16) -> Option<usize> {
    let pattern = sync_word.to_be_bytes();
    data.get(from..)?
        .windows(2)
        .position(|w| w == pattern)
        .map(|p| from + p)
}

impl Rdd6Parser {
    /// Sets the failure level for validation errors.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on sync and checksum irregularities (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    pub fn parse(&self, data: &[u8]) -> Result<Rdd6Frame> {
        let mut frame = Rdd6Frame::default();
        let mut state = ParseState::SeekingFirstSync;
        let mut pos = 0;

        while state != ParseState::Done {
            trace!("RDD-6 parse state {state:?} at byte {pos}");
            state = match state {
                ParseState::SeekingFirstSync => {
                    if let Some(sync_pos) = find_sync(data, pos, FIRST_SUBFRAME_SYNC_WORD) {
                        if sync_pos != pos {
                            log_or_err!(
                                self,
                                log::Level::Warn,
                                anyhow!(Rdd6Error::SkippedBytes {
                                    count: sync_pos - pos,
                                    sync_word: FIRST_SUBFRAME_SYNC_WORD
                                })
                            );
                        }
                        pos = sync_pos + 2;
                        ParseState::InFirstSubFrame
                    } else if let Some(sync_pos) = find_sync(data, pos, SECOND_SUBFRAME_SYNC_WORD)
                    {
                        log_or_err!(
                            self,
                            log::Level::Warn,
                            anyhow!(Rdd6Error::MissingSync(FIRST_SUBFRAME_SYNC_WORD))
                        );
                        pos = sync_pos + 2;
                        ParseState::InSecondSubFrame
                    } else {
                        bail!(Rdd6Error::NoSync);
                    }
                }
                ParseState::InFirstSubFrame => {
                    match self.read_sub_frame(data, &mut pos, &mut frame.first)? {
                        true => ParseState::SeekingSecondSync,
                        false => ParseState::Done,
                    }
                }
                ParseState::SeekingSecondSync => {
                    match find_sync(data, pos, SECOND_SUBFRAME_SYNC_WORD) {
                        Some(sync_pos) => {
                            if sync_pos != pos {
                                log_or_err!(
                                    self,
                                    log::Level::Warn,
                                    anyhow!(Rdd6Error::SkippedBytes {
                                        count: sync_pos - pos,
                                        sync_word: SECOND_SUBFRAME_SYNC_WORD
                                    })
                                );
                            }
                            pos = sync_pos + 2;
                            ParseState::InSecondSubFrame
                        }
                        None => {
                            log_or_err!(
                                self,
                                log::Level::Warn,
                                anyhow!(Rdd6Error::MissingSync(SECOND_SUBFRAME_SYNC_WORD))
                            );
                            ParseState::Done
                        }
                    }
                }
                ParseState::InSecondSubFrame => {
                    match self.read_sub_frame(data, &mut pos, &mut frame.second)? {
                        true => ParseState::SeekingEndSync,
                        false => ParseState::Done,
                    }
                }
                ParseState::SeekingEndSync => {
                    if data.get(pos..pos + 2) != Some(&END_SYNC_WORD.to_be_bytes()[..]) {
                        log_or_err!(
                            self,
                            log::Level::Warn,
                            anyhow!(Rdd6Error::MissingSync(END_SYNC_WORD))
                        );
                    }
                    ParseState::Done
                }
                ParseState::Done => ParseState::Done,
            };
        }

        debug!(
            "RDD-6 frame with {} + {} data segments",
            frame.first.segments.len(),
            frame.second.segments.len()
        );

        Ok(frame)
    }

    /// Reads a sync segment and data segments up to the zero terminator.
    ///
    /// Returns false when the data ends before the terminator.
    fn read_sub_frame(&self, data: &[u8], pos: &mut usize, sub_frame: &mut SubFrame) -> Result<bool> {
        let rest = data.get(*pos..).unwrap_or_default();
        let mut reader = BsIoSliceReader::from_slice(rest);

        let complete = self.read_segments(&mut reader, sub_frame)?;
        *pos += (reader.position()? >> 3) as usize;

        Ok(complete)
    }

    fn read_segments(&self, reader: &mut BsIoSliceReader, sub_frame: &mut SubFrame) -> Result<bool> {
        match SyncSegment::read(reader) {
            Ok(sync) => sub_frame.sync = sync,
            Err(err) => {
                log_or_err!(self, log::Level::Warn, err);
                return Ok(false);
            }
        }

        loop {
            if reader.available_bytes()? == 0 {
                log_or_err!(
                    self,
                    log::Level::Warn,
                    anyhow!(Rdd6Error::Truncated("sub-frame terminator"))
                );
                return Ok(false);
            }
            let id: u8 = reader.get_n(8)?;
            if id == 0 {
                return Ok(true);
            }

            let segment = match DataSegment::read(id, reader) {
                Ok(segment) => segment,
                Err(err) => {
                    log_or_err!(self, log::Level::Warn, err);
                    return Ok(false);
                }
            };
            if !segment.has_valid_checksum() {
                log_or_err!(
                    self,
                    log::Level::Warn,
                    anyhow!(Rdd6Error::ChecksumMismatch {
                        id,
                        expected: DataSegment::calc_checksum(
                            segment.size_byte(),
                            &segment.payload
                        ),
                        found: segment.checksum
                    })
                );
            }
            trace!("RDD-6 data segment {id}, {} bytes", segment.payload.len());
            sub_frame.segments.push(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::rdd6::payload::{DolbyEEssential, Payload, Rdd6Payload};

    fn sample_frame() -> Result<Rdd6Frame> {
        let essential = DolbyEEssential {
            program_config: 11,
            frame_rate_code: 3,
            original_frame_rate_code: 3,
            frame_count: 77,
            smpte_timecode: None,
        };
        Ok(Rdd6Frame {
            first: SubFrame {
                sync: SyncSegment {
                    rev_id: 1,
                    originator_id: 0,
                    originator_address: 0,
                    frame_count: 9,
                },
                segments: vec![essential.construct_payload()?],
            },
            second: SubFrame {
                sync: SyncSegment {
                    frame_count: 9,
                    ..Default::default()
                },
                segments: vec![DataSegment::new(0x21, vec![1, 2, 3, 4])?],
            },
        })
    }

    #[test]
    fn construct_then_parse() -> Result<()> {
        let frame = sample_frame()?;
        let (bytes, _) = frame.construct()?;
        let parsed = Rdd6Parser::default().parse(&bytes)?;
        assert_eq!(parsed, frame);

        let decoded = Payload::decode(&parsed.first.segments[0])?;
        assert!(matches!(decoded, Payload::DolbyEEssential(p) if p.frame_count == 77));
        Ok(())
    }

    #[test]
    fn leading_garbage_is_skipped() -> Result<()> {
        let frame = sample_frame()?;
        let (bytes, _) = frame.construct()?;
        let mut padded = vec![0xFF, 0x00, 0x3D];
        padded.extend_from_slice(&bytes);

        assert_eq!(Rdd6Parser::default().parse(&padded)?, frame);

        let mut strict = Rdd6Parser::default();
        strict.set_fail_level(log::Level::Warn);
        assert!(strict.parse(&padded).is_err());
        Ok(())
    }

    #[test]
    fn checksum_mismatch_is_lenient() -> Result<()> {
        let (mut bytes, first_len) = sample_frame()?.construct()?;
        // last byte before the first sub-frame terminator is the checksum
        bytes[first_len - 2] ^= 0x01;

        let parsed = Rdd6Parser::default().parse(&bytes)?;
        assert!(!parsed.first.segments[0].has_valid_checksum());

        let mut strict = Rdd6Parser::default();
        strict.set_fail_level(log::Level::Warn);
        let err = strict.parse(&bytes).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Rdd6Error>(),
            Some(Rdd6Error::ChecksumMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_second_sub_frame() -> Result<()> {
        let frame = sample_frame()?;
        let (bytes, first_len) = frame.construct()?;
        let parsed = Rdd6Parser::default().parse(&bytes[..first_len])?;
        assert_eq!(parsed.first, frame.first);
        assert!(parsed.second.segments.is_empty());
        Ok(())
    }

    #[test]
    fn no_sync_at_all() {
        assert!(Rdd6Parser::default().parse(&[0u8; 16]).is_err());
    }
}
