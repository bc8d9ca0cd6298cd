//! Essence container label dispatch.
//!
//! Each supported essence container label maps to an [`EssenceKind`] and a
//! wrapping. Formats with a fixed geometry (D-10, DV, VC-3) have it hard
//! coded; uncompressed, MPEG-2, AVC and MJPEG geometry is read from the
//! picture descriptor. Labels outside the table are rejected.

use anyhow::{Result, anyhow, bail};
use log::debug;

use crate::log_or_err;
use crate::structs::metadata::{ItemId, Rational, SetRef, items};
use crate::structs::track::{
    EssenceKind, FrameLayout, FrameSize, PictureInfo, SoundInfo, TrackInfo, Wrapping,
};
use crate::utils::errors::EssenceFormatError;
use crate::utils::ul::{AVID_LABEL_PREFIX, CDCI_DESCRIPTOR_SET_KEY, GC_LABEL_PREFIX, Ul};

const MAPPING_D10: u8 = 0x01;
const MAPPING_DV: u8 = 0x02;
const MAPPING_MPEG2: u8 = 0x04;
const MAPPING_UNCOMPRESSED: u8 = 0x05;
const MAPPING_AES_BWF: u8 = 0x06;
const MAPPING_AVC: u8 = 0x10;
const MAPPING_VC3: u8 = 0x11;

const AVID_MAPPING_MJPEG: u8 = 0x01;
const AVID_MAPPING_DNXHD: u8 = 0x06;

/// Longest audio frame size cycle accepted for a non-integer number of
/// samples per frame.
const MAX_SEQUENCE_LEN: i64 = 32;

/// Geometry and frame size of a format whose properties are fully implied
/// by its label or resolution id.
#[derive(Debug, Clone, Copy)]
struct FixedFormat {
    stored_width: u32,
    stored_height: u32,
    display_height: u32,
    display_y_offset: u32,
    horiz_subsampling: u32,
    vert_subsampling: u32,
    frame_layout: FrameLayout,
    frame_size: u32,
}

const fn fixed(
    width: u32,
    stored_height: u32,
    display_height: u32,
    subsampling: (u32, u32),
    frame_layout: FrameLayout,
    frame_size: u32,
) -> FixedFormat {
    FixedFormat {
        stored_width: width,
        stored_height,
        display_height,
        display_y_offset: stored_height - display_height,
        horiz_subsampling: subsampling.0,
        vert_subsampling: subsampling.1,
        frame_layout,
        frame_size,
    }
}

const D10_625: (u32, u32, u32) = (720, 608, 576);
const D10_525: (u32, u32, u32) = (720, 512, 486);

/// D-10 label variant byte: bit rate and line standard.
fn d10_format(variant: u8) -> Option<FixedFormat> {
    let (geometry, frame_size) = match variant {
        0x01 => (D10_625, 250_000),
        0x02 => (D10_525, 208_541),
        0x03 => (D10_625, 200_000),
        0x04 => (D10_525, 166_833),
        0x05 => (D10_625, 150_000),
        0x06 => (D10_525, 125_125),
        _ => return None,
    };
    Some(fixed(
        geometry.0,
        geometry.1,
        geometry.2,
        (2, 1),
        FrameLayout::SeparateFields,
        frame_size,
    ))
}

/// DV label variant byte: IEC 61834, DVCPRO, DVCPRO50 and DVCPRO HD.
fn dv_format(variant: u8) -> Option<FixedFormat> {
    use FrameLayout::{FullFrame, SeparateFields};

    Some(match variant {
        0x01 => fixed(720, 480, 480, (4, 1), SeparateFields, 120_000),
        0x02 => fixed(720, 576, 576, (2, 2), SeparateFields, 144_000),
        0x40 => fixed(720, 480, 480, (4, 1), SeparateFields, 120_000),
        0x41 => fixed(720, 576, 576, (4, 1), SeparateFields, 144_000),
        0x50 => fixed(720, 480, 480, (2, 1), SeparateFields, 240_000),
        0x51 => fixed(720, 576, 576, (2, 1), SeparateFields, 288_000),
        0x60 => fixed(1280, 1080, 1080, (2, 1), SeparateFields, 480_000),
        0x61 => fixed(1440, 1080, 1080, (2, 1), SeparateFields, 576_000),
        0x62 => fixed(960, 720, 720, (2, 1), FullFrame, 240_000),
        0x63 => fixed(960, 720, 720, (2, 1), FullFrame, 288_000),
        _ => return None,
    })
}

/// VC-3 (DNxHD) compression id, also stored as the Avid resolution id.
fn vc3_format(compression_id: u32) -> Option<FixedFormat> {
    use FrameLayout::{FullFrame, SeparateFields};

    Some(match compression_id {
        1235 | 1238 => fixed(1920, 1080, 1080, (2, 1), FullFrame, 917_504),
        1237 => fixed(1920, 1080, 1080, (2, 1), FullFrame, 606_208),
        1241 | 1243 => fixed(1920, 1080, 1080, (2, 1), SeparateFields, 917_504),
        1242 => fixed(1920, 1080, 1080, (2, 1), SeparateFields, 606_208),
        1244 => fixed(1440, 1080, 1080, (2, 1), SeparateFields, 606_208),
        1250 | 1251 => fixed(1280, 720, 720, (2, 1), FullFrame, 458_752),
        1252 => fixed(1280, 720, 720, (2, 1), FullFrame, 303_104),
        1253 => fixed(1920, 1080, 1080, (2, 1), FullFrame, 188_416),
        _ => return None,
    })
}

/// What the label table says about an essence container.
#[derive(Debug, Clone, Copy)]
pub struct LabelInfo {
    pub kind: EssenceKind,
    pub wrapping: Wrapping,
    fixed: Option<FixedFormat>,
}

fn picture_wrapping(byte: u8) -> Option<Wrapping> {
    match byte {
        0x01 => Some(Wrapping::Frame),
        0x02 => Some(Wrapping::Clip),
        _ => None,
    }
}

/// Looks up an essence container label.
pub fn lookup_label(label: &Ul) -> Result<LabelInfo> {
    let unsupported = || anyhow!(EssenceFormatError::UnsupportedLabel(*label));
    let [mapping, variant, wrapping] = [label.0[13], label.0[14], label.0[15]];

    let info = |kind, wrapping, fixed| LabelInfo {
        kind,
        wrapping,
        fixed,
    };

    if label.starts_with(&GC_LABEL_PREFIX) {
        let found = match mapping {
            MAPPING_D10 if matches!(wrapping, 0x01 | 0x7F) => {
                d10_format(variant).map(|f| info(EssenceKind::D10, Wrapping::Frame, Some(f)))
            }
            MAPPING_DV => match (dv_format(variant), picture_wrapping(wrapping)) {
                (Some(f), Some(w)) => Some(info(EssenceKind::Dv, w, Some(f))),
                _ => None,
            },
            MAPPING_MPEG2 if (0x60..=0x6F).contains(&variant) => {
                picture_wrapping(wrapping).map(|w| info(EssenceKind::Mpeg2, w, None))
            }
            MAPPING_UNCOMPRESSED => {
                picture_wrapping(wrapping).map(|w| info(EssenceKind::Uncompressed, w, None))
            }
            MAPPING_AES_BWF => match variant {
                0x01 => Some(info(EssenceKind::Wave, Wrapping::Frame, None)),
                0x02 => Some(info(EssenceKind::Wave, Wrapping::Clip, None)),
                0x03 => Some(info(EssenceKind::Aes3, Wrapping::Frame, None)),
                0x04 => Some(info(EssenceKind::Aes3, Wrapping::Clip, None)),
                _ => None,
            },
            MAPPING_AVC if (0x60..=0x6F).contains(&variant) => {
                picture_wrapping(wrapping).map(|w| info(EssenceKind::Avc, w, None))
            }
            MAPPING_VC3 => picture_wrapping(variant).map(|w| info(EssenceKind::Vc3, w, None)),
            _ => None,
        };
        return found.ok_or_else(unsupported);
    }

    if label.starts_with(&AVID_LABEL_PREFIX) {
        let found = match mapping {
            AVID_MAPPING_MJPEG => picture_wrapping(wrapping)
                .filter(|w| *w == Wrapping::Clip)
                .map(|w| info(EssenceKind::AvidMjpeg, w, None)),
            AVID_MAPPING_DNXHD => {
                picture_wrapping(wrapping).map(|w| info(EssenceKind::Vc3, w, None))
            }
            _ => None,
        };
        return found.ok_or_else(unsupported);
    }

    Err(unsupported())
}

/// Decode parameters derived from a file descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct EssenceFormat {
    pub kind: EssenceKind,
    pub wrapping: Wrapping,
    pub frame_size: FrameSize,
    pub image_start_offset: u32,
    pub info: TrackInfo,
}

/// Resolves essence container labels and descriptor items to track decode
/// parameters.
///
/// Absent optional descriptor items are replaced with defaults and reported
/// at `Warn`.
#[derive(Debug, Clone)]
pub struct EssenceFormatDispatch {
    pub fail_level: log::Level,
}

impl Default for EssenceFormatDispatch {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
        }
    }
}

impl EssenceFormatDispatch {
    /// Sets the failure level for missing optional descriptor items.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail when an optional item has to be defaulted
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    pub fn process_descriptor(
        &self,
        descriptor: &SetRef,
        label: &Ul,
        edit_rate: Rational,
    ) -> Result<EssenceFormat> {
        let label_info = lookup_label(label)?;
        debug!(
            "Essence container {label}: {} {:?} wrapped",
            label_info.kind, label_info.wrapping
        );

        if label_info.kind.is_sound() {
            let sound = self.process_sound_descriptor(descriptor)?;
            let frame_size = sound_frame_size(&sound, edit_rate)?;
            return Ok(EssenceFormat {
                kind: label_info.kind,
                wrapping: label_info.wrapping,
                frame_size,
                image_start_offset: 0,
                info: TrackInfo::Sound(sound),
            });
        }

        let (mut picture, mut frame_size) = match label_info.fixed {
            Some(format) => (fixed_picture_info(&format), FrameSize::Fixed(format.frame_size)),
            None => self.process_picture_descriptor(descriptor, &label_info)?,
        };

        picture.aspect_ratio = self.optional(descriptor, items::PICTURE_ASPECT_RATIO, |d, id| {
            d.get_rational_item(id).map(Some)
        })?;

        if descriptor.have_item(items::AVID_RESOLUTION_ID) {
            let resolution_id = descriptor.get_u32_item(items::AVID_RESOLUTION_ID)?;
            picture.resolution_id = Some(resolution_id);
            if label_info.kind == EssenceKind::Vc3 && label_info.fixed.is_none() {
                let format = vc3_format(resolution_id)
                    .ok_or(EssenceFormatError::UnknownResolutionId(resolution_id))?;
                frame_size = FrameSize::Fixed(format.frame_size);
            }
        }

        let image_start_offset = if descriptor.have_item(items::AVID_IMAGE_START_OFFSET) {
            descriptor.get_u32_item(items::AVID_IMAGE_START_OFFSET)?
        } else if descriptor.have_item(items::PICTURE_IMAGE_START_OFFSET) {
            descriptor.get_u32_item(items::PICTURE_IMAGE_START_OFFSET)?
        } else {
            0
        };
        if image_start_offset > 0 {
            if let FrameSize::Fixed(size) = frame_size {
                frame_size = FrameSize::Fixed(size + image_start_offset);
            }
        }

        // An explicitly stored sample size wins over anything computed
        if descriptor.have_item(items::AVID_FRAME_SAMPLE_SIZE) {
            let size = descriptor.get_u32_item(items::AVID_FRAME_SAMPLE_SIZE)?;
            if size > 0 {
                frame_size = FrameSize::Fixed(size);
            }
        }

        Ok(EssenceFormat {
            kind: label_info.kind,
            wrapping: label_info.wrapping,
            frame_size,
            image_start_offset,
            info: TrackInfo::Picture(picture),
        })
    }

    /// Reads an optional item, reporting its absence.
    fn optional<T: Default>(
        &self,
        descriptor: &SetRef,
        id: ItemId,
        get: impl Fn(&SetRef, ItemId) -> Result<T>,
    ) -> Result<T> {
        if descriptor.have_item(id) {
            return get(descriptor, id);
        }
        log_or_err!(
            self,
            log::Level::Warn,
            anyhow!(EssenceFormatError::MissingOptionalItem(id))
        );
        Ok(T::default())
    }

    fn process_picture_descriptor(
        &self,
        descriptor: &SetRef,
        label_info: &LabelInfo,
    ) -> Result<(PictureInfo, FrameSize)> {
        let stored_width = descriptor.get_u32_item(items::PICTURE_STORED_WIDTH)?;
        let stored_height = descriptor.get_u32_item(items::PICTURE_STORED_HEIGHT)?;

        let frame_layout = if descriptor.have_item(items::PICTURE_FRAME_LAYOUT) {
            let code = descriptor.get_u8_item(items::PICTURE_FRAME_LAYOUT)?;
            FrameLayout::from_code(code).ok_or(EssenceFormatError::InvalidFrameLayout(code))?
        } else {
            log_or_err!(
                self,
                log::Level::Warn,
                anyhow!(EssenceFormatError::MissingOptionalItem(
                    items::PICTURE_FRAME_LAYOUT
                ))
            );
            FrameLayout::default()
        };

        let display_width = match descriptor.have_item(items::PICTURE_DISPLAY_WIDTH) {
            true => descriptor.get_u32_item(items::PICTURE_DISPLAY_WIDTH)?,
            false => stored_width,
        };
        let display_height = match descriptor.have_item(items::PICTURE_DISPLAY_HEIGHT) {
            true => descriptor.get_u32_item(items::PICTURE_DISPLAY_HEIGHT)?,
            false => stored_height,
        };
        let display_x_offset = self.optional(descriptor, items::PICTURE_DISPLAY_X_OFFSET, |d, id| {
            d.get_u32_item(id)
        })?;
        let display_y_offset = self.optional(descriptor, items::PICTURE_DISPLAY_Y_OFFSET, |d, id| {
            d.get_u32_item(id)
        })?;

        let (horiz_subsampling, vert_subsampling, component_depth) =
            if descriptor.is_a(&CDCI_DESCRIPTOR_SET_KEY) {
                let horiz = match descriptor.have_item(items::CDCI_HORIZONTAL_SUBSAMPLING) {
                    true => descriptor.get_u32_item(items::CDCI_HORIZONTAL_SUBSAMPLING)?,
                    false => 2,
                };
                let vert = match descriptor.have_item(items::CDCI_VERTICAL_SUBSAMPLING) {
                    true => descriptor.get_u32_item(items::CDCI_VERTICAL_SUBSAMPLING)?,
                    false => 1,
                };
                let depth = match descriptor.have_item(items::CDCI_COMPONENT_DEPTH) {
                    true => descriptor.get_u32_item(items::CDCI_COMPONENT_DEPTH)?,
                    false => 8,
                };
                (horiz, vert, depth)
            } else {
                (1, 1, 8)
            };

        let picture = PictureInfo {
            stored_width,
            stored_height,
            display_width,
            display_height,
            display_x_offset,
            display_y_offset,
            horiz_subsampling,
            vert_subsampling,
            component_depth,
            frame_layout,
            aspect_ratio: None,
            resolution_id: None,
        };

        let frame_size = match label_info.kind {
            EssenceKind::Uncompressed => FrameSize::Fixed(uncompressed_frame_size(&picture)?),
            _ => FrameSize::Variable,
        };

        Ok((picture, frame_size))
    }

    fn process_sound_descriptor(&self, descriptor: &SetRef) -> Result<SoundInfo> {
        let sampling_rate = if descriptor.have_item(items::SOUND_AUDIO_SAMPLING_RATE) {
            descriptor.get_rational_item(items::SOUND_AUDIO_SAMPLING_RATE)?
        } else {
            descriptor.get_rational_item(items::FILE_DESCRIPTOR_SAMPLE_RATE)?
        };
        if !sampling_rate.is_valid() {
            bail!(EssenceFormatError::InvalidSampleRate(sampling_rate));
        }

        let channel_count = descriptor.get_u32_item(items::SOUND_CHANNEL_COUNT)?;
        let bits_per_sample = descriptor.get_u32_item(items::SOUND_QUANTIZATION_BITS)?;
        let block_align = if descriptor.have_item(items::WAVE_BLOCK_ALIGN) {
            descriptor.get_u16_item(items::WAVE_BLOCK_ALIGN)? as u32
        } else {
            log_or_err!(
                self,
                log::Level::Warn,
                anyhow!(EssenceFormatError::MissingOptionalItem(items::WAVE_BLOCK_ALIGN))
            );
            channel_count * bits_per_sample.div_ceil(8)
        };
        if block_align == 0 {
            bail!(EssenceFormatError::ZeroBlockAlign);
        }

        Ok(SoundInfo {
            sampling_rate,
            channel_count,
            bits_per_sample,
            block_align,
        })
    }
}

fn fixed_picture_info(format: &FixedFormat) -> PictureInfo {
    PictureInfo {
        stored_width: format.stored_width,
        stored_height: format.stored_height,
        display_width: format.stored_width,
        display_height: format.display_height,
        display_x_offset: 0,
        display_y_offset: format.display_y_offset,
        horiz_subsampling: format.horiz_subsampling,
        vert_subsampling: format.vert_subsampling,
        component_depth: 8,
        frame_layout: format.frame_layout,
        aspect_ratio: None,
        resolution_id: None,
    }
}

/// Byte size of an uncompressed picture frame.
///
/// 8-bit formats store `width * height` luma samples plus two chroma planes
/// reduced by the subsampling factors. 10-bit 4:2:2 is packed as 48 pixels
/// per 128 bytes.
pub fn uncompressed_frame_size(picture: &PictureInfo) -> Result<u32> {
    let width = picture.stored_width as u64;
    let mut height = picture.stored_height as u64;
    if picture.frame_layout.is_field_based() {
        height *= 2;
    }

    let size = match picture.component_depth {
        8 => {
            let subsampling = (picture.horiz_subsampling * picture.vert_subsampling).max(1) as f64;
            ((width * height) as f64 * (1.0 + 2.0 / subsampling)).round() as u64
        }
        10 => {
            if width % 48 != 0 {
                bail!(EssenceFormatError::UnalignedWidth(picture.stored_width));
            }
            width * 8 / 3 * height
        }
        depth => bail!(EssenceFormatError::UnsupportedComponentDepth(depth)),
    };

    u32::try_from(size).map_err(|_| anyhow!(EssenceFormatError::FrameTooLarge(size)))
}

/// Per-frame sample counts for `sample_rate` audio at `frame_rate`.
///
/// A non-integer number of samples per frame yields the shortest repeating
/// cadence, e.g. 1602, 1601, 1602, 1601, 1602 for 48 kHz at 30000/1001.
pub fn audio_sample_sequence(sample_rate: Rational, frame_rate: Rational) -> Result<Vec<u32>> {
    if !sample_rate.is_valid() || !frame_rate.is_valid() {
        bail!(EssenceFormatError::UnsupportedSampleRate {
            sample_rate,
            frame_rate
        });
    }

    // samples per frame = num / den
    let num = sample_rate.num as i64 * frame_rate.den as i64;
    let den = sample_rate.den as i64 * frame_rate.num as i64;
    let divisor = gcd(num, den);
    let (total, frames) = (num / divisor, den / divisor);
    if frames > MAX_SEQUENCE_LEN {
        bail!(EssenceFormatError::UnsupportedSampleRate {
            sample_rate,
            frame_rate
        });
    }

    // Cumulative counts rounded half up, so the cadence starts on the long frame
    let cumulative = |i: i64| (2 * i * total + frames) / (2 * frames);
    Ok((0..frames)
        .map(|i| (cumulative(i + 1) - cumulative(i)) as u32)
        .collect())
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a.abs() } else { gcd(b, a % b) }
}

/// Frame size of PCM audio stored one edit unit per frame.
pub fn sound_frame_size(sound: &SoundInfo, edit_rate: Rational) -> Result<FrameSize> {
    let samples = audio_sample_sequence(sound.sampling_rate, edit_rate)?;
    Ok(match samples.as_slice() {
        [samples] => FrameSize::Fixed(samples * sound.block_align),
        _ => FrameSize::Sequence(samples.iter().map(|s| s * sound.block_align).collect()),
    })
}

/// Number of whole frames in `data_size` bytes of audio essence.
pub fn audio_frame_count(frame_size: &FrameSize, data_size: u64) -> i64 {
    match frame_size {
        FrameSize::Fixed(size) if *size > 0 => (data_size / *size as u64) as i64,
        FrameSize::Sequence(sizes) if !sizes.is_empty() => {
            let cycle: u64 = sizes.iter().map(|&s| s as u64).sum();
            let mut count = (data_size / cycle) as i64 * sizes.len() as i64;
            let mut remaining = data_size % cycle;
            for &size in sizes {
                if remaining < size as u64 {
                    break;
                }
                remaining -= size as u64;
                count += 1;
            }
            count
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::metadata::{HeaderMetadata, MetadataSet};
    use crate::structs::testutil::local_set_value;
    use crate::utils::ul::{WAVE_DESCRIPTOR_SET_KEY, gc_label};

    const UNC_FRAME_WRAPPED: Ul = gc_label(MAPPING_UNCOMPRESSED, 0x7F, 0x01);

    fn header_with(key: &Ul, entries: &[(u16, Vec<u8>)]) -> Result<HeaderMetadata> {
        let mut header = HeaderMetadata::default();
        header.push_set(MetadataSet::parse(key, &local_set_value(entries))?);
        Ok(header)
    }

    fn u32_item(tag: u16, value: u32) -> (u16, Vec<u8>) {
        (tag, value.to_be_bytes().to_vec())
    }

    #[test]
    fn ntsc_audio_cadence() -> Result<()> {
        let sound = SoundInfo {
            sampling_rate: Rational::new(48000, 1),
            channel_count: 2,
            bits_per_sample: 16,
            block_align: 4,
        };
        let frame_size = sound_frame_size(&sound, Rational::new(30000, 1001))?;
        assert_eq!(
            frame_size,
            FrameSize::Sequence(vec![6408, 6404, 6408, 6404, 6408])
        );
        assert_eq!(audio_frame_count(&frame_size, 3 * 6408 + 2 * 6404), 5);
        assert_eq!(audio_frame_count(&frame_size, 32032 + 6407), 5);
        assert_eq!(audio_frame_count(&frame_size, 32032 + 6408), 6);

        let pal = sound_frame_size(&sound, Rational::new(25, 1))?;
        assert_eq!(pal, FrameSize::Fixed(7680));
        Ok(())
    }

    #[test]
    fn uncompressed_sizes() -> Result<()> {
        let mut picture = PictureInfo {
            stored_width: 1920,
            stored_height: 540,
            horiz_subsampling: 2,
            vert_subsampling: 1,
            component_depth: 8,
            frame_layout: FrameLayout::SeparateFields,
            ..Default::default()
        };
        assert_eq!(uncompressed_frame_size(&picture)?, 1920 * 1080 * 2);

        picture.component_depth = 10;
        assert_eq!(uncompressed_frame_size(&picture)?, 1920 * 8 / 3 * 1080);

        picture.stored_width = 1000;
        assert!(uncompressed_frame_size(&picture).is_err());
        Ok(())
    }

    #[test]
    fn unsupported_label_is_fatal() -> Result<()> {
        let header = header_with(&CDCI_DESCRIPTOR_SET_KEY, &[u32_item(0x3203, 720)])?;
        let descriptor = header.find_set(&CDCI_DESCRIPTOR_SET_KEY)?;
        let label = gc_label(0x7E, 0x01, 0x01);
        let err = EssenceFormatDispatch::default()
            .process_descriptor(&descriptor, &label, Rational::new(25, 1))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EssenceFormatError>(),
            Some(EssenceFormatError::UnsupportedLabel(_))
        ));
        Ok(())
    }

    #[test]
    fn cdci_defaults() -> Result<()> {
        let header = header_with(
            &CDCI_DESCRIPTOR_SET_KEY,
            &[
                u32_item(0x3203, 720),
                u32_item(0x3202, 576),
                (0x320C, vec![0]),
                u32_item(0x3302, 2),
                u32_item(0x3308, 1),
                u32_item(0x3301, 8),
            ],
        )?;
        let descriptor = header.find_set(&CDCI_DESCRIPTOR_SET_KEY)?;

        let format = EssenceFormatDispatch::default().process_descriptor(
            &descriptor,
            &UNC_FRAME_WRAPPED,
            Rational::new(25, 1),
        )?;
        assert_eq!(format.kind, EssenceKind::Uncompressed);
        assert_eq!(format.wrapping, Wrapping::Frame);
        assert_eq!(format.frame_size, FrameSize::Fixed(720 * 576 * 2));
        let picture = match &format.info {
            TrackInfo::Picture(picture) => picture,
            TrackInfo::Sound(_) => unreachable!(),
        };
        assert_eq!(picture.display_height, 576);
        assert_eq!(picture.display_x_offset, 0);

        let mut strict = EssenceFormatDispatch::default();
        strict.set_fail_level(log::Level::Warn);
        assert!(
            strict
                .process_descriptor(&descriptor, &UNC_FRAME_WRAPPED, Rational::new(25, 1))
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn d10_is_label_driven() -> Result<()> {
        let header = header_with(&CDCI_DESCRIPTOR_SET_KEY, &[])?;
        let descriptor = header.find_set(&CDCI_DESCRIPTOR_SET_KEY)?;
        let format = EssenceFormatDispatch::default().process_descriptor(
            &descriptor,
            &gc_label(MAPPING_D10, 0x01, 0x01),
            Rational::new(25, 1),
        )?;
        assert_eq!(format.kind, EssenceKind::D10);
        assert_eq!(format.frame_size, FrameSize::Fixed(250_000));
        Ok(())
    }

    #[test]
    fn wave_descriptor() -> Result<()> {
        let header = header_with(
            &WAVE_DESCRIPTOR_SET_KEY,
            &[
                (0x3D03, [0, 0, 0xBB, 0x80, 0, 0, 0, 1].to_vec()),
                u32_item(0x3D07, 2),
                u32_item(0x3D01, 24),
                (0x3D0A, 6u16.to_be_bytes().to_vec()),
            ],
        )?;
        let descriptor = header.find_set(&WAVE_DESCRIPTOR_SET_KEY)?;
        let format = EssenceFormatDispatch::default().process_descriptor(
            &descriptor,
            &gc_label(MAPPING_AES_BWF, 0x02, 0x00),
            Rational::new(25, 1),
        )?;
        assert_eq!(format.wrapping, Wrapping::Clip);
        assert_eq!(format.frame_size, FrameSize::Fixed(1920 * 6));
        Ok(())
    }
}
