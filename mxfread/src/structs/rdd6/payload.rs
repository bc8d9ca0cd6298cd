//! Typed RDD-6 data segment payloads.
//!
//! Parsing is lenient: reserved bits are skipped and field values are taken
//! as found. Construction is strict: every field is range checked first and
//! a payload that fails [`Rdd6Payload::validate`] is never serialized.

use std::fmt::Display;

use anyhow::{Result, bail};
use log::warn;

use super::segment::DataSegment;
use super::{
    DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID, DOLBY_DIGITAL_COMPLETE_ID,
    DOLBY_DIGITAL_ESSENTIAL_EXT_BSI_ID, DOLBY_DIGITAL_ESSENTIAL_ID, DOLBY_E_COMPLETE_ID,
    DOLBY_E_ESSENTIAL_ID,
};
use crate::structs::timecode::Timecode;
use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::errors::Rdd6Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramConfig {
    pub name: &'static str,
    pub program_count: u8,
    pub channel_count: u8,
}

const fn config(name: &'static str, program_count: u8, channel_count: u8) -> ProgramConfig {
    ProgramConfig {
        name,
        program_count,
        channel_count,
    }
}

/// Dolby E program configurations indexed by the 6-bit `program_config` code.
pub const PROGRAM_CONFIGS: [ProgramConfig; 24] = [
    config("5.1+2", 2, 8),
    config("5.1+1+1", 3, 8),
    config("4+4", 2, 8),
    config("4+2+2", 3, 8),
    config("4+2+1+1", 4, 8),
    config("4+1+1+1+1", 5, 8),
    config("2+2+2+2", 4, 8),
    config("2+2+2+1+1", 5, 8),
    config("2+2+1+1+1+1", 6, 8),
    config("2+1+1+1+1+1+1", 7, 8),
    config("1+1+1+1+1+1+1+1", 8, 8),
    config("5.1", 1, 6),
    config("4+2", 2, 6),
    config("4+1+1", 3, 6),
    config("2+2+2", 3, 6),
    config("2+2+1+1", 4, 6),
    config("2+1+1+1+1", 5, 6),
    config("1+1+1+1+1+1", 6, 6),
    config("4", 1, 4),
    config("2+2", 2, 4),
    config("2+1+1", 3, 4),
    config("1+1+1+1", 4, 4),
    config("7.1", 1, 8),
    config("7.1 screen", 1, 8),
];

pub fn program_config(code: u8) -> Result<&'static ProgramConfig> {
    match PROGRAM_CONFIGS.get(code as usize) {
        Some(config) => Ok(config),
        None => bail!(Rdd6Error::UnknownProgramConfig(code)),
    }
}

fn in_range<T: PartialOrd + Display>(payload: &str, field: &str, value: T, min: T, max: T) -> bool {
    if value < min || value > max {
        warn!("{payload}: {field} value {value} is outside the valid range {min}..={max}");
        return false;
    }
    true
}

fn require_bits(reader: &mut BsIoSliceReader, payload: &'static str, needed: u64) -> Result<()> {
    let available = reader.available()?;
    if available < needed {
        bail!(Rdd6Error::InsufficientBits {
            payload,
            needed,
            available
        });
    }
    Ok(())
}

pub trait Rdd6Payload: Sized {
    const SEGMENT_ID: u8;
    const NAME: &'static str;

    /// Range checks every field, logging the first violation.
    fn validate(&self) -> bool;

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()>;

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self>;

    fn construct_payload(&self) -> Result<DataSegment> {
        if !self.validate() {
            bail!(Rdd6Error::InvalidPayload(Self::NAME));
        }
        let mut writer = BsIoVecWriter::default();
        self.write_bits(&mut writer)?;
        DataSegment::new(Self::SEGMENT_ID, writer.into_bytes()?)
    }

    fn parse_payload(segment: &DataSegment) -> Result<Self> {
        if segment.id != Self::SEGMENT_ID {
            bail!(Rdd6Error::SegmentIdMismatch {
                expected: Self::SEGMENT_ID,
                found: segment.id
            });
        }
        let mut reader = BsIoSliceReader::from_slice(&segment.payload);
        Self::read_bits(&mut reader)
    }
}

// Dolby E timecode: valid (1), drop frame (1), reserved (30), then BCD
// hours, minutes, seconds and frames of 8 bits each.

fn read_smpte_timecode(reader: &mut BsIoSliceReader) -> Result<Option<Timecode>> {
    let valid = reader.get()?;
    let drop_frame = reader.get()?;
    reader.skip_n(30)?;
    let mut digits = [0u8; 4];
    for digit in digits.iter_mut() {
        let bcd: u8 = reader.get_n(8)?;
        *digit = (bcd >> 4) * 10 + (bcd & 0xF);
    }

    Ok(valid.then_some(Timecode {
        hours: digits[0],
        minutes: digits[1],
        seconds: digits[2],
        frames: digits[3],
        drop_frame,
    }))
}

fn write_smpte_timecode(writer: &mut BsIoVecWriter, timecode: Option<&Timecode>) -> Result<()> {
    let Some(tc) = timecode else {
        writer.put_n::<u64>(64, 0)?;
        return Ok(());
    };
    writer.put(true)?;
    writer.put(tc.drop_frame)?;
    writer.put_n::<u32>(30, 0)?;
    for value in [tc.hours, tc.minutes, tc.seconds, tc.frames] {
        writer.put_n(8, ((value / 10) << 4) | (value % 10))?;
    }
    Ok(())
}

fn validate_smpte_timecode(payload: &str, timecode: Option<&Timecode>) -> bool {
    let Some(tc) = timecode else {
        return true;
    };
    in_range(payload, "timecode hours", tc.hours, 0, 23)
        && in_range(payload, "timecode minutes", tc.minutes, 0, 59)
        && in_range(payload, "timecode seconds", tc.seconds, 0, 59)
        && in_range(payload, "timecode frames", tc.frames, 0, 59)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DolbyEComplete {
    pub program_config: u8,
    pub frame_rate_code: u8,
    pub original_frame_rate_code: u8,
    pub frame_count: u16,
    pub smpte_timecode: Option<Timecode>,
    pub pitch_shift_code: i16,
    /// One description text byte per program.
    pub description_text: Vec<u8>,
}

impl Rdd6Payload for DolbyEComplete {
    const SEGMENT_ID: u8 = DOLBY_E_COMPLETE_ID;
    const NAME: &'static str = "Dolby E complete";

    fn validate(&self) -> bool {
        let Ok(config) = program_config(self.program_config) else {
            warn!("{}: unknown program_config {}", Self::NAME, self.program_config);
            return false;
        };
        if self.description_text.len() != config.program_count as usize {
            warn!(
                "{}: {} description texts for {} programs",
                Self::NAME,
                self.description_text.len(),
                config.program_count
            );
            return false;
        }
        in_range(Self::NAME, "frame_rate_code", self.frame_rate_code, 1, 8)
            && in_range(
                Self::NAME,
                "original_frame_rate_code",
                self.original_frame_rate_code,
                1,
                8,
            )
            && validate_smpte_timecode(Self::NAME, self.smpte_timecode.as_ref())
            && in_range(Self::NAME, "pitch_shift_code", self.pitch_shift_code, -2048, 2047)
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        let config = program_config(self.program_config)?;
        writer.put_n(6, self.program_config)?;
        writer.put_n(4, self.frame_rate_code)?;
        writer.put_n(4, self.original_frame_rate_code)?;
        writer.put_n(16, self.frame_count)?;
        write_smpte_timecode(writer, self.smpte_timecode.as_ref())?;
        writer.put_s(12, self.pitch_shift_code)?;
        writer.put_n::<u8>(6, 0)?;
        for &text in &self.description_text {
            writer.put_n(8, text)?;
        }
        for _ in 0..config.channel_count {
            writer.put_n::<u8>(8, 0)?;
        }
        Ok(())
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        require_bits(reader, Self::NAME, 112)?;
        let program_config_code = reader.get_n(6)?;
        let config = program_config(program_config_code)?;
        let mut payload = Self {
            program_config: program_config_code,
            frame_rate_code: reader.get_n(4)?,
            original_frame_rate_code: reader.get_n(4)?,
            frame_count: reader.get_n(16)?,
            smpte_timecode: read_smpte_timecode(reader)?,
            pitch_shift_code: reader.get_s(12)?,
            description_text: Vec::with_capacity(config.program_count as usize),
        };
        reader.skip_n(6)?;

        require_bits(
            reader,
            Self::NAME,
            8 * (config.program_count as u64 + config.channel_count as u64),
        )?;
        for _ in 0..config.program_count {
            payload.description_text.push(reader.get_n(8)?);
        }
        reader.skip_n(8 * config.channel_count as u32)?;

        Ok(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DolbyEEssential {
    pub program_config: u8,
    pub frame_rate_code: u8,
    pub original_frame_rate_code: u8,
    pub frame_count: u16,
    pub smpte_timecode: Option<Timecode>,
}

impl Rdd6Payload for DolbyEEssential {
    const SEGMENT_ID: u8 = DOLBY_E_ESSENTIAL_ID;
    const NAME: &'static str = "Dolby E essential";

    fn validate(&self) -> bool {
        if program_config(self.program_config).is_err() {
            warn!("{}: unknown program_config {}", Self::NAME, self.program_config);
            return false;
        }
        in_range(Self::NAME, "frame_rate_code", self.frame_rate_code, 1, 8)
            && in_range(
                Self::NAME,
                "original_frame_rate_code",
                self.original_frame_rate_code,
                1,
                8,
            )
            && validate_smpte_timecode(Self::NAME, self.smpte_timecode.as_ref())
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        writer.put_n(6, self.program_config)?;
        writer.put_n(4, self.frame_rate_code)?;
        writer.put_n(4, self.original_frame_rate_code)?;
        writer.put_n(16, self.frame_count)?;
        write_smpte_timecode(writer, self.smpte_timecode.as_ref())?;
        writer.put_n::<u8>(2, 0)?;
        Ok(())
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        require_bits(reader, Self::NAME, 96)?;
        let program_config_code = reader.get_n(6)?;
        program_config(program_config_code)?;
        let payload = Self {
            program_config: program_config_code,
            frame_rate_code: reader.get_n(4)?,
            original_frame_rate_code: reader.get_n(4)?,
            frame_count: reader.get_n(16)?,
            smpte_timecode: read_smpte_timecode(reader)?,
        };
        reader.skip_n(2)?;
        Ok(payload)
    }
}

fn valid_datarate(payload: &str, datarate: u8) -> bool {
    if datarate <= 18 || datarate == 31 {
        return true;
    }
    warn!("{payload}: datarate value {datarate} is neither 0..=18 nor 31");
    false
}

/// AC-3 bitstream information common to the complete payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ac3Bsi {
    pub program_id: u8,
    pub datarate: u8,
    pub bsmod: u8,
    pub acmod: u8,
    pub cmixlev: u8,
    pub surmixlev: u8,
    pub dsurmod: u8,
    pub lfeon: bool,
    pub dialnorm: u8,
    pub langcode: bool,
    pub langcod: u8,
    pub audprodie: bool,
    pub mixlevel: u8,
    pub roomtyp: u8,
    pub copyrightb: bool,
    pub origbs: bool,
}

impl Ac3Bsi {
    const BITS: u64 = 47;

    fn validate(&self, payload: &str) -> bool {
        in_range(payload, "program_id", self.program_id, 0, 7)
            && valid_datarate(payload, self.datarate)
            && in_range(payload, "bsmod", self.bsmod, 0, 7)
            && in_range(payload, "acmod", self.acmod, 0, 7)
            && in_range(payload, "cmixlev", self.cmixlev, 0, 2)
            && in_range(payload, "surmixlev", self.surmixlev, 0, 2)
            && in_range(payload, "dsurmod", self.dsurmod, 0, 2)
            && in_range(payload, "dialnorm", self.dialnorm, 1, 31)
            && in_range(payload, "mixlevel", self.mixlevel, 0, 31)
            && in_range(payload, "roomtyp", self.roomtyp, 0, 2)
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        writer.put_n(5, self.program_id)?;
        writer.put_n(5, self.datarate)?;
        writer.put_n(3, self.bsmod)?;
        writer.put_n(3, self.acmod)?;
        writer.put_n(2, self.cmixlev)?;
        writer.put_n(2, self.surmixlev)?;
        writer.put_n(2, self.dsurmod)?;
        writer.put(self.lfeon)?;
        writer.put_n(5, self.dialnorm)?;
        writer.put(self.langcode)?;
        writer.put_n(8, self.langcod)?;
        writer.put(self.audprodie)?;
        writer.put_n(5, self.mixlevel)?;
        writer.put_n(2, self.roomtyp)?;
        writer.put(self.copyrightb)?;
        writer.put(self.origbs)?;
        Ok(())
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            program_id: reader.get_n(5)?,
            datarate: reader.get_n(5)?,
            bsmod: reader.get_n(3)?,
            acmod: reader.get_n(3)?,
            cmixlev: reader.get_n(2)?,
            surmixlev: reader.get_n(2)?,
            dsurmod: reader.get_n(2)?,
            lfeon: reader.get()?,
            dialnorm: reader.get_n(5)?,
            langcode: reader.get()?,
            langcod: reader.get_n(8)?,
            audprodie: reader.get()?,
            mixlevel: reader.get_n(5)?,
            roomtyp: reader.get_n(2)?,
            copyrightb: reader.get()?,
            origbs: reader.get()?,
        })
    }
}

/// Extended bitstream information (Annex D alternate syntax).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ac3ExtBsi {
    pub xbsi1e: bool,
    pub dmixmod: u8,
    pub ltrtcmixlev: u8,
    pub ltrtsurmixlev: u8,
    pub lorocmixlev: u8,
    pub lorosurmixlev: u8,
    pub xbsi2e: bool,
    pub dsurexmod: u8,
    pub dheadphonmod: u8,
    pub adconvtyp: u8,
    pub xbsi2: u8,
    pub encinfo: bool,
}

impl Ac3ExtBsi {
    const BITS: u64 = 30;

    /// Only the fields enabled by `xbsi1e` and `xbsi2e` are range checked.
    fn validate(&self, payload: &str) -> bool {
        (!self.xbsi1e
            || (in_range(payload, "dmixmod", self.dmixmod, 0, 2)
                && in_range(payload, "ltrtsurmixlev", self.ltrtsurmixlev, 3, 7)
                && in_range(payload, "lorosurmixlev", self.lorosurmixlev, 3, 7)))
            && (!self.xbsi2e
                || (in_range(payload, "dsurexmod", self.dsurexmod, 0, 2)
                    && in_range(payload, "dheadphonmod", self.dheadphonmod, 0, 2)
                    && in_range(payload, "adconvtyp", self.adconvtyp, 0, 1)))
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        writer.put(self.xbsi1e)?;
        writer.put_n(2, self.dmixmod)?;
        writer.put_n(3, self.ltrtcmixlev)?;
        writer.put_n(3, self.ltrtsurmixlev)?;
        writer.put_n(3, self.lorocmixlev)?;
        writer.put_n(3, self.lorosurmixlev)?;
        writer.put(self.xbsi2e)?;
        writer.put_n(2, self.dsurexmod)?;
        writer.put_n(2, self.dheadphonmod)?;
        writer.put_n(1, self.adconvtyp)?;
        writer.put_n(8, self.xbsi2)?;
        writer.put(self.encinfo)?;
        Ok(())
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            xbsi1e: reader.get()?,
            dmixmod: reader.get_n(2)?,
            ltrtcmixlev: reader.get_n(3)?,
            ltrtsurmixlev: reader.get_n(3)?,
            lorocmixlev: reader.get_n(3)?,
            lorosurmixlev: reader.get_n(3)?,
            xbsi2e: reader.get()?,
            dsurexmod: reader.get_n(2)?,
            dheadphonmod: reader.get_n(2)?,
            adconvtyp: reader.get_n(1)?,
            xbsi2: reader.get_n(8)?,
            encinfo: reader.get()?,
        })
    }
}

/// Compression and dynamic range words.
///
/// With the mode bit set a word holds a compression profile index (0..=5),
/// otherwise it is an arbitrary gain byte carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ac3Compression {
    pub compre: bool,
    pub compr1: u8,
    pub dynrnge: bool,
    pub dynrng: Vec<u8>,
}

impl Ac3Compression {
    fn validate(&self, payload: &str) -> bool {
        (!self.compre || in_range(payload, "compr1", self.compr1, 0, 5))
            && (!self.dynrnge
                || self
                    .dynrng
                    .iter()
                    .all(|&v| in_range(payload, "dynrng", v, 0, 5)))
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter, dynrng_count: usize) -> Result<()> {
        if self.dynrng.len() != dynrng_count {
            bail!(Rdd6Error::FieldCount {
                field: "dynrng",
                expected: dynrng_count,
                found: self.dynrng.len()
            });
        }
        writer.put(self.compre)?;
        writer.put_n(8, self.compr1)?;
        writer.put(self.dynrnge)?;
        for &value in &self.dynrng {
            writer.put_n(8, value)?;
        }
        Ok(())
    }

    fn read_bits(reader: &mut BsIoSliceReader, dynrng_count: usize) -> Result<Self> {
        let compre = reader.get()?;
        let compr1 = reader.get_n(8)?;
        let dynrnge = reader.get()?;
        let dynrng = (0..dynrng_count)
            .map(|_| reader.get_n(8))
            .collect::<std::io::Result<Vec<u8>>>()?;
        Ok(Self {
            compre,
            compr1,
            dynrnge,
            dynrng,
        })
    }
}

/// Encoder processing flags of the complete payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ac3Filters {
    pub hpfon: bool,
    pub bwlpfon: bool,
    pub lfelpfon: bool,
    pub sur90on: bool,
    pub suratton: bool,
    pub rfpremphon: bool,
}

impl Ac3Filters {
    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        for flag in [
            self.hpfon,
            self.bwlpfon,
            self.lfelpfon,
            self.sur90on,
            self.suratton,
            self.rfpremphon,
        ] {
            writer.put(flag)?;
        }
        Ok(())
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            hpfon: reader.get()?,
            bwlpfon: reader.get()?,
            lfelpfon: reader.get()?,
            sur90on: reader.get()?,
            suratton: reader.get()?,
            rfpremphon: reader.get()?,
        })
    }
}

const COMPLETE_DYNRNG_COUNT: usize = 4;
const ESSENTIAL_DYNRNG_COUNT: usize = 1;
const COMPLETE_TAIL_BITS: u64 = 6 + 10 + 8 * COMPLETE_DYNRNG_COUNT as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DolbyDigitalComplete {
    pub bsi: Ac3Bsi,
    pub filters: Ac3Filters,
    pub compression: Ac3Compression,
}

impl Default for DolbyDigitalComplete {
    fn default() -> Self {
        Self {
            bsi: Ac3Bsi::default(),
            filters: Ac3Filters::default(),
            compression: Ac3Compression {
                dynrng: vec![0; COMPLETE_DYNRNG_COUNT],
                ..Default::default()
            },
        }
    }
}

impl Rdd6Payload for DolbyDigitalComplete {
    const SEGMENT_ID: u8 = DOLBY_DIGITAL_COMPLETE_ID;
    const NAME: &'static str = "Dolby Digital complete";

    fn validate(&self) -> bool {
        self.bsi.validate(Self::NAME) && self.compression.validate(Self::NAME)
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        self.bsi.write_bits(writer)?;
        self.filters.write_bits(writer)?;
        self.compression.write_bits(writer, COMPLETE_DYNRNG_COUNT)
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        require_bits(reader, Self::NAME, Ac3Bsi::BITS + COMPLETE_TAIL_BITS)?;
        Ok(Self {
            bsi: Ac3Bsi::read_bits(reader)?,
            filters: Ac3Filters::read_bits(reader)?,
            compression: Ac3Compression::read_bits(reader, COMPLETE_DYNRNG_COUNT)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DolbyDigitalCompleteExtBsi {
    pub bsi: Ac3Bsi,
    pub ext_bsi: Ac3ExtBsi,
    pub filters: Ac3Filters,
    pub compression: Ac3Compression,
}

impl Default for DolbyDigitalCompleteExtBsi {
    fn default() -> Self {
        let complete = DolbyDigitalComplete::default();
        Self {
            bsi: complete.bsi,
            ext_bsi: Ac3ExtBsi::default(),
            filters: complete.filters,
            compression: complete.compression,
        }
    }
}

impl Rdd6Payload for DolbyDigitalCompleteExtBsi {
    const SEGMENT_ID: u8 = DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID;
    const NAME: &'static str = "Dolby Digital complete ext BSI";

    fn validate(&self) -> bool {
        self.bsi.validate(Self::NAME)
            && self.ext_bsi.validate(Self::NAME)
            && self.compression.validate(Self::NAME)
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        self.bsi.write_bits(writer)?;
        self.ext_bsi.write_bits(writer)?;
        self.filters.write_bits(writer)?;
        self.compression.write_bits(writer, COMPLETE_DYNRNG_COUNT)
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        require_bits(
            reader,
            Self::NAME,
            Ac3Bsi::BITS + Ac3ExtBsi::BITS + COMPLETE_TAIL_BITS,
        )?;
        Ok(Self {
            bsi: Ac3Bsi::read_bits(reader)?,
            ext_bsi: Ac3ExtBsi::read_bits(reader)?,
            filters: Ac3Filters::read_bits(reader)?,
            compression: Ac3Compression::read_bits(reader, COMPLETE_DYNRNG_COUNT)?,
        })
    }
}

/// Leading fields shared by both essential payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ac3EssentialBsi {
    pub program_id: u8,
    pub datarate: u8,
    pub bsmod: u8,
    pub acmod: u8,
    pub lfeon: bool,
    pub dialnorm: u8,
}

impl Ac3EssentialBsi {
    const BITS: u64 = 22;

    fn validate(&self, payload: &str) -> bool {
        in_range(payload, "program_id", self.program_id, 0, 7)
            && valid_datarate(payload, self.datarate)
            && in_range(payload, "dialnorm", self.dialnorm, 1, 31)
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        writer.put_n(5, self.program_id)?;
        writer.put_n(5, self.datarate)?;
        writer.put_n(3, self.bsmod)?;
        writer.put_n(3, self.acmod)?;
        writer.put(self.lfeon)?;
        writer.put_n(5, self.dialnorm)?;
        Ok(())
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            program_id: reader.get_n(5)?,
            datarate: reader.get_n(5)?,
            bsmod: reader.get_n(3)?,
            acmod: reader.get_n(3)?,
            lfeon: reader.get()?,
            dialnorm: reader.get_n(5)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ac3EssentialExtBsi {
    pub xbsi1e: bool,
    pub dmixmod: u8,
    pub xbsi2e: bool,
    pub dsurexmod: u8,
    pub dheadphonmod: u8,
}

impl Ac3EssentialExtBsi {
    const BITS: u64 = 8;

    fn validate(&self, payload: &str) -> bool {
        (!self.xbsi1e || in_range(payload, "dmixmod", self.dmixmod, 0, 2))
            && (!self.xbsi2e
                || (in_range(payload, "dsurexmod", self.dsurexmod, 0, 2)
                    && in_range(payload, "dheadphonmod", self.dheadphonmod, 0, 2)))
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        writer.put(self.xbsi1e)?;
        writer.put_n(2, self.dmixmod)?;
        writer.put(self.xbsi2e)?;
        writer.put_n(2, self.dsurexmod)?;
        writer.put_n(2, self.dheadphonmod)?;
        Ok(())
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            xbsi1e: reader.get()?,
            dmixmod: reader.get_n(2)?,
            xbsi2e: reader.get()?,
            dsurexmod: reader.get_n(2)?,
            dheadphonmod: reader.get_n(2)?,
        })
    }
}

const ESSENTIAL_TAIL_BITS: u64 = 10 + 8 * ESSENTIAL_DYNRNG_COUNT as u64;

fn essential_compression() -> Ac3Compression {
    Ac3Compression {
        dynrng: vec![0; ESSENTIAL_DYNRNG_COUNT],
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DolbyDigitalEssential {
    pub bsi: Ac3EssentialBsi,
    pub compression: Ac3Compression,
}

impl Default for DolbyDigitalEssential {
    fn default() -> Self {
        Self {
            bsi: Ac3EssentialBsi::default(),
            compression: essential_compression(),
        }
    }
}

impl Rdd6Payload for DolbyDigitalEssential {
    const SEGMENT_ID: u8 = DOLBY_DIGITAL_ESSENTIAL_ID;
    const NAME: &'static str = "Dolby Digital essential";

    fn validate(&self) -> bool {
        self.bsi.validate(Self::NAME) && self.compression.validate(Self::NAME)
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        self.bsi.write_bits(writer)?;
        self.compression.write_bits(writer, ESSENTIAL_DYNRNG_COUNT)
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        require_bits(reader, Self::NAME, Ac3EssentialBsi::BITS + ESSENTIAL_TAIL_BITS)?;
        Ok(Self {
            bsi: Ac3EssentialBsi::read_bits(reader)?,
            compression: Ac3Compression::read_bits(reader, ESSENTIAL_DYNRNG_COUNT)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DolbyDigitalEssentialExtBsi {
    pub bsi: Ac3EssentialBsi,
    pub ext_bsi: Ac3EssentialExtBsi,
    pub compression: Ac3Compression,
}

impl Default for DolbyDigitalEssentialExtBsi {
    fn default() -> Self {
        Self {
            bsi: Ac3EssentialBsi::default(),
            ext_bsi: Ac3EssentialExtBsi::default(),
            compression: essential_compression(),
        }
    }
}

impl Rdd6Payload for DolbyDigitalEssentialExtBsi {
    const SEGMENT_ID: u8 = DOLBY_DIGITAL_ESSENTIAL_EXT_BSI_ID;
    const NAME: &'static str = "Dolby Digital essential ext BSI";

    fn validate(&self) -> bool {
        self.bsi.validate(Self::NAME)
            && self.ext_bsi.validate(Self::NAME)
            && self.compression.validate(Self::NAME)
    }

    fn write_bits(&self, writer: &mut BsIoVecWriter) -> Result<()> {
        self.bsi.write_bits(writer)?;
        self.ext_bsi.write_bits(writer)?;
        self.compression.write_bits(writer, ESSENTIAL_DYNRNG_COUNT)
    }

    fn read_bits(reader: &mut BsIoSliceReader) -> Result<Self> {
        require_bits(
            reader,
            Self::NAME,
            Ac3EssentialBsi::BITS + Ac3EssentialExtBsi::BITS + ESSENTIAL_TAIL_BITS,
        )?;
        Ok(Self {
            bsi: Ac3EssentialBsi::read_bits(reader)?,
            ext_bsi: Ac3EssentialExtBsi::read_bits(reader)?,
            compression: Ac3Compression::read_bits(reader, ESSENTIAL_DYNRNG_COUNT)?,
        })
    }
}

/// A data segment decoded according to its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    DolbyEComplete(DolbyEComplete),
    DolbyEEssential(DolbyEEssential),
    DolbyDigitalCompleteExtBsi(DolbyDigitalCompleteExtBsi),
    DolbyDigitalEssentialExtBsi(DolbyDigitalEssentialExtBsi),
    DolbyDigitalComplete(DolbyDigitalComplete),
    DolbyDigitalEssential(DolbyDigitalEssential),
    /// Unknown ids are kept as opaque segments.
    Raw(DataSegment),
}

impl Payload {
    pub fn decode(segment: &DataSegment) -> Result<Self> {
        Ok(match segment.id {
            DOLBY_E_COMPLETE_ID => Self::DolbyEComplete(DolbyEComplete::parse_payload(segment)?),
            DOLBY_E_ESSENTIAL_ID => {
                Self::DolbyEEssential(DolbyEEssential::parse_payload(segment)?)
            }
            DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID => Self::DolbyDigitalCompleteExtBsi(
                DolbyDigitalCompleteExtBsi::parse_payload(segment)?,
            ),
            DOLBY_DIGITAL_ESSENTIAL_EXT_BSI_ID => Self::DolbyDigitalEssentialExtBsi(
                DolbyDigitalEssentialExtBsi::parse_payload(segment)?,
            ),
            DOLBY_DIGITAL_COMPLETE_ID => {
                Self::DolbyDigitalComplete(DolbyDigitalComplete::parse_payload(segment)?)
            }
            DOLBY_DIGITAL_ESSENTIAL_ID => {
                Self::DolbyDigitalEssential(DolbyDigitalEssential::parse_payload(segment)?)
            }
            _ => Self::Raw(segment.clone()),
        })
    }

    pub fn validate(&self) -> bool {
        match self {
            Self::DolbyEComplete(p) => p.validate(),
            Self::DolbyEEssential(p) => p.validate(),
            Self::DolbyDigitalCompleteExtBsi(p) => p.validate(),
            Self::DolbyDigitalEssentialExtBsi(p) => p.validate(),
            Self::DolbyDigitalComplete(p) => p.validate(),
            Self::DolbyDigitalEssential(p) => p.validate(),
            Self::Raw(_) => true,
        }
    }

    pub fn encode(&self) -> Result<DataSegment> {
        match self {
            Self::DolbyEComplete(p) => p.construct_payload(),
            Self::DolbyEEssential(p) => p.construct_payload(),
            Self::DolbyDigitalCompleteExtBsi(p) => p.construct_payload(),
            Self::DolbyDigitalEssentialExtBsi(p) => p.construct_payload(),
            Self::DolbyDigitalComplete(p) => p.construct_payload(),
            Self::DolbyDigitalEssential(p) => p.construct_payload(),
            Self::Raw(segment) => Ok(segment.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dolby_e_complete() -> DolbyEComplete {
        DolbyEComplete {
            program_config: 0,
            frame_rate_code: 3,
            original_frame_rate_code: 3,
            frame_count: 1234,
            smpte_timecode: Some(Timecode {
                hours: 10,
                minutes: 59,
                seconds: 7,
                frames: 24,
                drop_frame: false,
            }),
            pitch_shift_code: -2048,
            description_text: vec![0x41, 0x42],
        }
    }

    #[test]
    fn dolby_e_complete_layout() -> Result<()> {
        let payload = dolby_e_complete();
        let segment = payload.construct_payload()?;
        assert_eq!(segment.id, DOLBY_E_COMPLETE_ID);
        // 14 fixed bytes, 2 program descriptions, 8 channel groups
        assert_eq!(segment.payload.len(), 24);
        assert!(segment.has_valid_checksum());
        // program_config 0 and frame_rate_code 3 share the first byte
        assert_eq!(segment.payload[0], 0b0000_0000);
        assert_eq!(segment.payload[1], 0b1100_1100);

        assert_eq!(DolbyEComplete::parse_payload(&segment)?, payload);
        Ok(())
    }

    #[test]
    fn single_program_description() -> Result<()> {
        let config = program_config(11)?;
        assert_eq!((config.name, config.program_count, config.channel_count), ("5.1", 1, 6));

        let payload = DolbyEComplete {
            program_config: 11,
            description_text: vec![0x41],
            ..dolby_e_complete()
        };
        assert!(payload.validate());
        let segment = payload.construct_payload()?;
        // 14 fixed bytes, 1 program description, 6 channel groups
        assert_eq!(segment.payload.len(), 21);
        assert_eq!(segment.payload[0], 0b0010_1100);
        assert_eq!(segment.payload[14], 0x41);
        assert!(segment.payload[15..].iter().all(|&b| b == 0));

        let parsed = DolbyEComplete::parse_payload(&segment)?;
        assert_eq!(parsed.description_text, [0x41]);
        assert_eq!(parsed, payload);
        Ok(())
    }

    #[test]
    fn unknown_program_config_is_fatal() -> Result<()> {
        let mut payload = dolby_e_complete();
        payload.program_config = 24;
        assert!(!payload.validate());
        assert!(payload.construct_payload().is_err());

        let mut segment = dolby_e_complete().construct_payload()?;
        segment.payload[0] = 0xFC;
        assert!(DolbyEComplete::parse_payload(&segment).is_err());
        Ok(())
    }

    #[test]
    fn description_tail_must_be_present() -> Result<()> {
        let mut segment = dolby_e_complete().construct_payload()?;
        segment.payload.truncate(20);
        let err = DolbyEComplete::parse_payload(&segment).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Rdd6Error>(),
            Some(Rdd6Error::InsufficientBits { .. })
        ));
        Ok(())
    }

    #[test]
    fn pitch_shift_range() {
        let mut payload = dolby_e_complete();
        payload.pitch_shift_code = 2047;
        assert!(payload.validate());
        payload.pitch_shift_code = 2048;
        assert!(!payload.validate());
    }

    #[test]
    fn segment_id_mismatch() -> Result<()> {
        let segment = DataSegment::new(DOLBY_E_ESSENTIAL_ID, vec![0; 12])?;
        assert!(DolbyEComplete::parse_payload(&segment).is_err());
        Ok(())
    }

    #[test]
    fn dolby_digital_complete_ext_bsi() -> Result<()> {
        let mut payload = DolbyDigitalCompleteExtBsi::default();
        payload.bsi.program_id = 2;
        payload.bsi.datarate = 31;
        payload.bsi.acmod = 7;
        payload.bsi.dialnorm = 27;
        payload.bsi.langcode = true;
        payload.bsi.langcod = 0x09;
        payload.ext_bsi.xbsi1e = true;
        payload.ext_bsi.ltrtsurmixlev = 4;
        payload.ext_bsi.lorosurmixlev = 4;
        payload.compression.compre = true;
        payload.compression.compr1 = 1;
        payload.compression.dynrng = vec![1, 2, 0xFF, 0x1F];

        // dynrnge clear: the dynrng words are raw bytes
        let segment = payload.construct_payload()?;
        assert_eq!(segment.program_id(), Some(2));
        assert_eq!(segment.payload.len(), 16);
        assert_eq!(DolbyDigitalCompleteExtBsi::parse_payload(&segment)?, payload);

        payload.compression.dynrnge = true;
        assert!(!payload.validate());
        Ok(())
    }

    #[test]
    fn dolby_digital_ranges() {
        let mut payload = DolbyDigitalEssential::default();
        payload.bsi.dialnorm = 0;
        assert!(!payload.validate());
        payload.bsi.dialnorm = 31;
        payload.bsi.datarate = 19;
        assert!(!payload.validate());
        payload.bsi.datarate = 18;
        assert!(payload.validate());
    }

    #[test]
    fn raw_payload_passthrough() -> Result<()> {
        let segment = DataSegment::new(0x77, vec![1, 2, 3])?;
        let payload = Payload::decode(&segment)?;
        assert_eq!(payload, Payload::Raw(segment.clone()));
        assert_eq!(payload.encode()?, segment);
        Ok(())
    }
}
