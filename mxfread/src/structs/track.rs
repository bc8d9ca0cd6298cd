//! Clip and essence track descriptions produced from header metadata.

use std::fmt::{Display, Formatter};

use crate::structs::metadata::Rational;
use crate::structs::timecode::Timecode;
use crate::utils::ul::Ul;

/// Bytes per frame of an essence track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSize {
    Fixed(u32),
    /// Frame boundaries come from an index table.
    Variable,
    /// Repeating per-frame sizes, e.g. 48 kHz audio at 30000/1001.
    Sequence(Vec<u32>),
}

impl FrameSize {
    pub fn is_variable(&self) -> bool {
        matches!(self, FrameSize::Variable)
    }

    /// Size of frame `frame` for fixed and sequence sizes.
    pub fn size_of(&self, frame: i64) -> Option<u32> {
        match self {
            FrameSize::Fixed(size) => Some(*size),
            FrameSize::Sequence(sizes) if !sizes.is_empty() => {
                Some(sizes[frame.rem_euclid(sizes.len() as i64) as usize])
            }
            _ => None,
        }
    }

    /// Byte offset of frame `frame` from the first frame.
    pub fn offset_of(&self, frame: i64) -> Option<u64> {
        match self {
            FrameSize::Fixed(size) => Some(frame as u64 * *size as u64),
            FrameSize::Sequence(sizes) if !sizes.is_empty() => {
                let cycle: u64 = sizes.iter().map(|&s| s as u64).sum();
                let n = sizes.len() as i64;
                let partial: u64 = sizes[..(frame % n) as usize]
                    .iter()
                    .map(|&s| s as u64)
                    .sum();
                Some((frame / n) as u64 * cycle + partial)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapping {
    Frame,
    Clip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssenceKind {
    D10,
    Dv,
    Uncompressed,
    Mpeg2,
    Avc,
    Vc3,
    AvidMjpeg,
    Wave,
    Aes3,
}

impl EssenceKind {
    pub fn is_sound(&self) -> bool {
        matches!(self, EssenceKind::Wave | EssenceKind::Aes3)
    }
}

impl Display for EssenceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EssenceKind::D10 => "D-10",
            EssenceKind::Dv => "DV",
            EssenceKind::Uncompressed => "Uncompressed",
            EssenceKind::Mpeg2 => "MPEG-2",
            EssenceKind::Avc => "AVC",
            EssenceKind::Vc3 => "VC-3",
            EssenceKind::AvidMjpeg => "Avid MJPEG",
            EssenceKind::Wave => "WAVE PCM",
            EssenceKind::Aes3 => "AES3 PCM",
        })
    }
}

/// Frame layout as coded in the picture descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameLayout {
    #[default]
    FullFrame,
    SeparateFields,
    SingleField,
    MixedFields,
    SegmentedFrame,
}

impl FrameLayout {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::FullFrame),
            1 => Some(Self::SeparateFields),
            2 => Some(Self::SingleField),
            3 => Some(Self::MixedFields),
            4 => Some(Self::SegmentedFrame),
            _ => None,
        }
    }

    /// Stored height counts one field for these layouts.
    pub fn is_field_based(&self) -> bool {
        matches!(self, Self::SeparateFields | Self::MixedFields)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PictureInfo {
    pub stored_width: u32,
    pub stored_height: u32,
    pub display_width: u32,
    pub display_height: u32,
    pub display_x_offset: u32,
    pub display_y_offset: u32,
    pub horiz_subsampling: u32,
    pub vert_subsampling: u32,
    pub component_depth: u32,
    pub frame_layout: FrameLayout,
    pub aspect_ratio: Option<Rational>,
    pub resolution_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SoundInfo {
    pub sampling_rate: Rational,
    pub channel_count: u32,
    pub bits_per_sample: u32,
    pub block_align: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackInfo {
    Picture(PictureInfo),
    Sound(SoundInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EssenceTrack {
    pub track_id: u32,
    pub track_number: u32,
    pub essence_container: Ul,
    pub kind: EssenceKind,
    pub wrapping: Wrapping,
    pub frame_size: FrameSize,
    pub frame_rate: Rational,
    /// Playout duration in frames at `frame_rate`.
    pub duration: i64,
    /// Essence sample rate from the file descriptor.
    pub sample_rate: Rational,
    pub body_sid: u32,
    pub index_sid: u32,
    /// Padding bytes at the start of each stored frame.
    pub image_start_offset: u32,
    /// Bytes before the first frame in a clip-wrapped element.
    pub first_frame_offset: u64,
    pub info: TrackInfo,
}

impl EssenceTrack {
    pub fn is_picture(&self) -> bool {
        matches!(self.info, TrackInfo::Picture(_))
    }

    pub fn is_sound(&self) -> bool {
        matches!(self.info, TrackInfo::Sound(_))
    }

    pub fn picture(&self) -> Option<&PictureInfo> {
        match &self.info {
            TrackInfo::Picture(info) => Some(info),
            TrackInfo::Sound(_) => None,
        }
    }

    pub fn sound(&self) -> Option<&SoundInfo> {
        match &self.info {
            TrackInfo::Sound(info) => Some(info),
            TrackInfo::Picture(_) => None,
        }
    }
}

/// Where a source timecode comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimecodeKind {
    /// Timecode track of the file source package.
    FileSource,
    /// Timecode track of the tape or import source package.
    PhysicalSource,
    /// Creation date/time stamp of the system metadata pack.
    SystemItemCreation,
    /// User date/time stamp of the system metadata pack.
    SystemItemUser,
}

impl Display for TimecodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TimecodeKind::FileSource => "file source",
            TimecodeKind::PhysicalSource => "physical source",
            TimecodeKind::SystemItemCreation => "system item creation",
            TimecodeKind::SystemItemUser => "system item user",
        })
    }
}

/// Timecode track found in the header metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimecodeTrack {
    pub rounded_base: u16,
    pub drop_frame: bool,
    /// Frame count of the first clip frame.
    pub start: i64,
}

impl TimecodeTrack {
    pub fn timecode_at(&self, frame: i64) -> Timecode {
        Timecode::from_frame_count(self.start + frame, self.rounded_base, self.drop_frame)
    }

    /// Clip frame holding `timecode`.
    pub fn frame_of(&self, timecode: &Timecode) -> i64 {
        timecode.to_frame_count(self.rounded_base) - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTimecode {
    pub kind: TimecodeKind,
    /// Present for the metadata kinds, absent for system item kinds.
    pub track: Option<TimecodeTrack>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub frame_rate: Rational,
    pub duration: i64,
    pub operational_pattern: Ul,
    pub tracks: Vec<EssenceTrack>,
    pub playout_timecode: Option<TimecodeTrack>,
    pub source_timecodes: Vec<SourceTimecode>,
}

impl Clip {
    pub fn is_audio_only(&self) -> bool {
        !self.tracks.is_empty() && self.tracks.iter().all(|t| t.is_sound())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_offsets() {
        let sizes = FrameSize::Sequence(vec![6408, 6404, 6408, 6404, 6408]);
        assert_eq!(sizes.offset_of(0), Some(0));
        assert_eq!(sizes.offset_of(2), Some(12812));
        assert_eq!(sizes.offset_of(5), Some(32032));
        assert_eq!(sizes.offset_of(7), Some(32032 + 12812));
        assert_eq!(sizes.size_of(6), Some(6404));
        assert_eq!(FrameSize::Variable.offset_of(1), None);
    }

    #[test]
    fn timecode_track_mapping() {
        let track = TimecodeTrack {
            rounded_base: 25,
            drop_frame: false,
            start: 90000,
        };
        let tc = track.timecode_at(30);
        assert_eq!(tc.to_string(), "01:00:01:05");
        assert_eq!(track.frame_of(&tc), 30);
    }
}
