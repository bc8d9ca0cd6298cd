//! Header metadata to clip description.
//!
//! Follows the material package tracks through their source clips to the
//! file source package tracks and descriptors, and collects the playout and
//! source timecode tracks along the way.

use anyhow::{Result, anyhow, bail};
use log::debug;

use crate::log_or_err;
use crate::process::essence_format::{EssenceFormatDispatch, sound_frame_size};
use crate::structs::metadata::{HeaderMetadata, Rational, SetRef, items};
use crate::structs::partition::Partition;
use crate::structs::track::{
    Clip, EssenceTrack, SourceTimecode, TimecodeKind, TimecodeTrack, TrackInfo,
};
use crate::utils::errors::{MetadataError, ReaderError};
use crate::utils::ul::{self, Ul, Umid};

/// Builds a [`Clip`] from header metadata.
#[derive(Debug, Clone)]
pub struct HeaderProcessor {
    pub fail_level: log::Level,
}

impl Default for HeaderProcessor {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
        }
    }
}

/// Source clip reference from a track's sequence.
struct SourceRef {
    package_uid: Umid,
    track_id: u32,
    start_position: i64,
}

fn first_component<'a>(sequence: SetRef<'a>, key: &Ul) -> Result<Option<SetRef<'a>>> {
    if sequence.is_a(key) {
        return Ok(Some(sequence));
    }
    if !sequence.is_a(&ul::SEQUENCE_SET_KEY) {
        return Ok(None);
    }
    Ok(sequence
        .get_strong_ref_array_item(items::SEQUENCE_STRUCTURAL_COMPONENTS)?
        .into_iter()
        .find(|component| component.is_a(key)))
}

fn source_ref(sequence: SetRef) -> Result<Option<SourceRef>> {
    let Some(clip) = first_component(sequence, &ul::SOURCE_CLIP_SET_KEY)? else {
        return Ok(None);
    };
    let package_uid = clip.get_umid_item(items::SOURCE_CLIP_SOURCE_PACKAGE_ID)?;
    if package_uid == Umid::default() {
        return Ok(None);
    }
    Ok(Some(SourceRef {
        package_uid,
        track_id: clip.get_u32_item(items::SOURCE_CLIP_SOURCE_TRACK_ID)?,
        start_position: match clip.have_item(items::SOURCE_CLIP_START_POSITION) {
            true => clip.get_position_item(items::SOURCE_CLIP_START_POSITION)?,
            false => 0,
        },
    }))
}

fn data_definition(sequence: &SetRef) -> Result<Ul> {
    sequence.get_ul_item(items::COMPONENT_DATA_DEFINITION)
}

/// The timecode track of a package, if it has one.
pub fn package_timecode_track(package: &SetRef) -> Result<Option<TimecodeTrack>> {
    for track in package.get_strong_ref_array_item(items::PACKAGE_TRACKS)? {
        let sequence = track.get_strong_ref_item(items::TRACK_SEQUENCE)?;
        if !ul::is_timecode_data_def(&data_definition(&sequence)?) {
            continue;
        }
        let Some(component) = first_component(sequence, &ul::TIMECODE_COMPONENT_SET_KEY)? else {
            continue;
        };
        return Ok(Some(TimecodeTrack {
            rounded_base: component.get_u16_item(items::TIMECODE_ROUNDED_BASE)?,
            drop_frame: match component.have_item(items::TIMECODE_DROP_FRAME) {
                true => component.get_bool_item(items::TIMECODE_DROP_FRAME)?,
                false => false,
            },
            start: component.get_position_item(items::TIMECODE_START)?,
        }));
    }
    Ok(None)
}

fn find_package<'a>(header: &'a HeaderMetadata, uid: &Umid) -> Result<Option<SetRef<'a>>> {
    for package in header.find_sets(&ul::SOURCE_PACKAGE_SET_KEY) {
        if package.get_umid_item(items::PACKAGE_UID)? == *uid {
            return Ok(Some(package));
        }
    }
    Ok(None)
}

fn find_track<'a>(package: &SetRef<'a>, track_id: u32) -> Result<Option<SetRef<'a>>> {
    for track in package.get_strong_ref_array_item(items::PACKAGE_TRACKS)? {
        if track.have_item(items::TRACK_ID) && track.get_u32_item(items::TRACK_ID)? == track_id {
            return Ok(Some(track));
        }
    }
    Ok(None)
}

/// Body and index SIDs of the essence container data linked to a package.
fn stream_ids(header: &HeaderMetadata, package_uid: &Umid) -> Result<(u32, u32)> {
    for ecd in header.find_sets(&ul::ESSENCE_CONTAINER_DATA_SET_KEY) {
        if ecd.get_umid_item(items::ECD_LINKED_PACKAGE_UID)? != *package_uid {
            continue;
        }
        let index_sid = match ecd.have_item(items::ECD_INDEX_SID) {
            true => ecd.get_u32_item(items::ECD_INDEX_SID)?,
            false => 0,
        };
        return Ok((ecd.get_u32_item(items::ECD_BODY_SID)?, index_sid));
    }
    bail!(MetadataError::MissingEssenceContainerData(*package_uid))
}

/// The file descriptor describing `track_id`, looking inside a multiple
/// descriptor when there is one.
fn track_descriptor<'a>(package: &SetRef<'a>, track_id: u32) -> Result<SetRef<'a>> {
    let descriptor = package.get_strong_ref_item(items::SOURCE_PACKAGE_DESCRIPTOR)?;
    if !descriptor.is_a(&ul::MULTIPLE_DESCRIPTOR_SET_KEY) {
        return Ok(descriptor);
    }

    for sub in descriptor.get_strong_ref_array_item(items::MULTIPLE_DESCRIPTOR_SUB_DESCRIPTORS)? {
        if sub.have_item(items::FILE_DESCRIPTOR_LINKED_TRACK_ID)
            && sub.get_u32_item(items::FILE_DESCRIPTOR_LINKED_TRACK_ID)? == track_id
        {
            return Ok(sub);
        }
    }
    bail!(MetadataError::MissingTrackDescriptor(track_id))
}

impl HeaderProcessor {
    /// Sets the failure level for unresolvable tracks and defaulted items.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on any track or item that had to be skipped or defaulted
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    pub fn process(&self, header: &HeaderMetadata, partition: &Partition) -> Result<Clip> {
        let preface = header.find_set(&ul::PREFACE_SET_KEY)?;
        let operational_pattern = match preface.have_item(items::PREFACE_OPERATIONAL_PATTERN) {
            true => preface.get_ul_item(items::PREFACE_OPERATIONAL_PATTERN)?,
            false => partition.operational_pattern,
        };

        let material = header.find_set(&ul::MATERIAL_PACKAGE_SET_KEY)?;
        let formats = EssenceFormatDispatch {
            fail_level: self.fail_level,
        };

        let mut tracks = Vec::new();
        let mut file_package_uid = None;
        let mut physical_ref = None;

        for material_track in material.get_strong_ref_array_item(items::PACKAGE_TRACKS)? {
            let sequence = material_track.get_strong_ref_item(items::TRACK_SEQUENCE)?;
            let data_def = data_definition(&sequence)?;
            if !ul::is_picture_data_def(&data_def) && !ul::is_sound_data_def(&data_def) {
                continue;
            }

            let material_track_id = material_track.get_u32_item(items::TRACK_ID)?;
            let Some(source) = source_ref(sequence)? else {
                debug!("Material track {material_track_id} has no source clip");
                continue;
            };

            let resolved = match find_package(header, &source.package_uid)? {
                Some(package) => find_track(&package, source.track_id)?.map(|t| (package, t)),
                None => None,
            };
            let Some((package, file_track)) = resolved else {
                log_or_err!(
                    self,
                    log::Level::Warn,
                    anyhow!(MetadataError::UnresolvedSourceClip(material_track_id))
                );
                continue;
            };

            let edit_rate = material_track.get_rational_item(items::TRACK_EDIT_RATE)?;
            let duration = match sequence.have_item(items::COMPONENT_DURATION) {
                true => sequence.get_length_item(items::COMPONENT_DURATION)?,
                false => -1,
            };

            let descriptor = track_descriptor(&package, source.track_id)?;
            let essence_container = descriptor.get_ul_item(items::FILE_DESCRIPTOR_ESSENCE_CONTAINER)?;
            let sample_rate = match descriptor.have_item(items::FILE_DESCRIPTOR_SAMPLE_RATE) {
                true => descriptor.get_rational_item(items::FILE_DESCRIPTOR_SAMPLE_RATE)?,
                false => edit_rate,
            };
            let format = formats.process_descriptor(&descriptor, &essence_container, edit_rate)?;

            let package_uid = package.get_umid_item(items::PACKAGE_UID)?;
            let (body_sid, index_sid) = stream_ids(header, &package_uid)?;

            if file_package_uid.is_none() {
                file_package_uid = Some(package_uid);
                let file_sequence = file_track.get_strong_ref_item(items::TRACK_SEQUENCE)?;
                physical_ref = source_ref(file_sequence)?;
            }

            tracks.push(EssenceTrack {
                track_id: material_track_id,
                track_number: match file_track.have_item(items::TRACK_NUMBER) {
                    true => file_track.get_u32_item(items::TRACK_NUMBER)?,
                    false => 0,
                },
                essence_container,
                kind: format.kind,
                wrapping: format.wrapping,
                frame_size: format.frame_size,
                frame_rate: edit_rate,
                duration,
                sample_rate,
                body_sid,
                index_sid,
                image_start_offset: format.image_start_offset,
                first_frame_offset: 0,
                info: format.info,
            });
        }

        if tracks.is_empty() {
            bail!(ReaderError::NoEssenceTracks);
        }

        let lead = tracks
            .iter()
            .find(|t| t.is_picture())
            .unwrap_or(&tracks[0]);
        let frame_rate = lead.frame_rate;
        let duration = tracks
            .iter()
            .filter(|t| t.frame_rate == frame_rate && t.duration >= 0)
            .map(|t| t.duration)
            .min()
            .unwrap_or(-1);

        let mut source_timecodes = Vec::new();
        if let Some(uid) = file_package_uid {
            if let Some(package) = find_package(header, &uid)? {
                if let Some(track) = package_timecode_track(&package)? {
                    source_timecodes.push(SourceTimecode {
                        kind: TimecodeKind::FileSource,
                        track: Some(track),
                    });
                }
            }
        }
        if let Some(source) = physical_ref {
            if let Some(package) = find_package(header, &source.package_uid)? {
                if let Some(mut track) = package_timecode_track(&package)? {
                    track.start += source.start_position;
                    source_timecodes.push(SourceTimecode {
                        kind: TimecodeKind::PhysicalSource,
                        track: Some(track),
                    });
                }
            }
        }

        let clip = Clip {
            frame_rate,
            duration,
            operational_pattern,
            playout_timecode: package_timecode_track(&material)?,
            source_timecodes,
            tracks,
        };
        debug!(
            "Clip: {} tracks at {} fps, duration {}",
            clip.tracks.len(),
            clip.frame_rate,
            clip.duration
        );

        Ok(clip)
    }
}

/// Changes the frame rate of an audio-only clip, e.g. to read a WAVE OP-Atom
/// file edited at the sample rate in video frame sized chunks.
pub fn renegotiate_frame_rate(clip: &mut Clip, frame_rate: Rational) -> Result<()> {
    if !clip.is_audio_only() {
        bail!(ReaderError::FrameRateChangeNotAudioOnly);
    }
    if !frame_rate.is_valid() {
        bail!(ReaderError::InvalidFrameRate(frame_rate));
    }

    let scale = |duration: i64, from: Rational| -> i64 {
        if duration < 0 {
            return duration;
        }
        let num = duration as i128 * frame_rate.num as i128 * from.den as i128;
        let den = frame_rate.den as i128 * from.num as i128;
        (num / den) as i64
    };

    for track in &mut clip.tracks {
        let TrackInfo::Sound(sound) = &track.info else {
            continue;
        };
        track.frame_size = sound_frame_size(sound, frame_rate)?;
        track.duration = scale(track.duration, track.frame_rate);
        track.frame_rate = frame_rate;
    }
    clip.duration = scale(clip.duration, clip.frame_rate);
    clip.frame_rate = frame_rate;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::testutil::{ClipLayout, TrackLayout, header_metadata};
    use crate::structs::track::{EssenceKind, FrameSize};

    #[test]
    fn picture_and_sound_tracks() -> Result<()> {
        let layout = ClipLayout {
            tracks: vec![TrackLayout::uncompressed_pal(), TrackLayout::wave_pal(2)],
            playout_start: Some(90000),
            file_source_start: Some(100),
            ..Default::default()
        };
        let (header, partition) = header_metadata(&layout)?;
        let clip = HeaderProcessor::default().process(&header, &partition)?;

        assert_eq!(clip.frame_rate, Rational::new(25, 1));
        assert_eq!(clip.duration, layout.duration);
        assert_eq!(clip.tracks.len(), 2);
        assert_eq!(clip.tracks[0].kind, EssenceKind::Uncompressed);
        assert_eq!(clip.tracks[1].frame_size, FrameSize::Fixed(1920 * 4));
        assert_eq!(clip.tracks[1].track_number, layout.tracks[1].track_number);
        assert_eq!(clip.tracks[0].body_sid, 1);
        assert_eq!(clip.playout_timecode.map(|t| t.start), Some(90000));
        assert_eq!(clip.source_timecodes.len(), 1);
        assert_eq!(clip.source_timecodes[0].kind, TimecodeKind::FileSource);
        Ok(())
    }

    #[test]
    fn audio_only_frame_rate_change() -> Result<()> {
        let layout = ClipLayout {
            tracks: vec![TrackLayout::wave_sample_rate(2)],
            duration: 48000 * 2,
            ..Default::default()
        };
        let (header, partition) = header_metadata(&layout)?;
        let mut clip = HeaderProcessor::default().process(&header, &partition)?;
        assert_eq!(clip.frame_rate, Rational::new(48000, 1));
        assert_eq!(clip.tracks[0].frame_size, FrameSize::Fixed(4));

        renegotiate_frame_rate(&mut clip, Rational::new(30000, 1001))?;
        assert_eq!(clip.duration, 59);
        assert_eq!(
            clip.tracks[0].frame_size,
            FrameSize::Sequence(vec![6408, 6404, 6408, 6404, 6408])
        );
        Ok(())
    }

    #[test]
    fn frame_rate_change_needs_audio_only() -> Result<()> {
        let (header, partition) = header_metadata(&ClipLayout::default())?;
        let mut clip = HeaderProcessor::default().process(&header, &partition)?;
        assert!(renegotiate_frame_rate(&mut clip, Rational::new(25, 1)).is_err());
        Ok(())
    }
}
