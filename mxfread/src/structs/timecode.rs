//! SMPTE timecode
//!
//! Timecodes are counted at an integer "rounded" base (30 for 29.97 fps).
//! Drop-frame counting skips frame numbers 0 and 1 (0-3 at a base of 60) at
//! the start of every minute except each tenth minute.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{Result, anyhow, bail, ensure};
use log::trace;

use crate::utils::errors::TimecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
}

impl Display for Timecode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours,
            self.minutes,
            self.seconds,
            if self.drop_frame { ';' } else { ':' },
            self.frames
        )
    }
}

impl FromStr for Timecode {
    type Err = anyhow::Error;

    /// Parses `hh:mm:ss:ff`, with `;` (or `.`) before the frames for drop frame.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || anyhow!(TimecodeError::InvalidString(s.to_string()));

        let bytes = s.as_bytes();
        if bytes.len() != 11 || bytes[2] != b':' || bytes[5] != b':' {
            return Err(invalid());
        }
        let drop_frame = match bytes[8] {
            b':' => false,
            b';' | b'.' => true,
            _ => return Err(invalid()),
        };

        let field = |range: std::ops::Range<usize>| -> Result<u8> {
            let digits = &s[range];
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            digits.parse::<u8>().map_err(|_| invalid())
        };

        let timecode = Self {
            hours: field(0..2)?,
            minutes: field(3..5)?,
            seconds: field(6..8)?,
            frames: field(9..11)?,
            drop_frame,
        };
        if timecode.hours > 23 || timecode.minutes > 59 || timecode.seconds > 59 {
            return Err(invalid());
        }

        Ok(timecode)
    }
}

fn drop_count(rounded_base: u16) -> i64 {
    (rounded_base as i64 / 30) * 2
}

impl Timecode {
    /// Converts a frame count since midnight into a timecode.
    pub fn from_frame_count(count: i64, rounded_base: u16, drop_frame: bool) -> Self {
        if rounded_base == 0 {
            return Self::default();
        }
        let base = rounded_base as i64;
        let drop_frame = drop_frame && drop_count(rounded_base) > 0;

        let mut count = count;
        if drop_frame {
            let drop = drop_count(rounded_base);
            let frames_per_min = base * 60 - drop;
            let frames_per_10min = base * 600 - drop * 9;
            let frames_per_day = frames_per_10min * 6 * 24;
            count = count.rem_euclid(frames_per_day);

            let tens = count / frames_per_10min;
            let rem = count % frames_per_10min;
            count += drop * 9 * tens;
            if rem > drop {
                count += drop * ((rem - drop) / frames_per_min);
            }
        } else {
            count = count.rem_euclid(base * 86400);
        }

        Self {
            hours: (count / (base * 3600)) as u8,
            minutes: ((count / (base * 60)) % 60) as u8,
            seconds: ((count / base) % 60) as u8,
            frames: (count % base) as u8,
            drop_frame,
        }
    }

    /// Frame count since midnight at the given rounded base.
    pub fn to_frame_count(&self, rounded_base: u16) -> i64 {
        let base = rounded_base as i64;
        let total_minutes = 60 * self.hours as i64 + self.minutes as i64;
        let mut count = (total_minutes * 60 + self.seconds as i64) * base + self.frames as i64;
        if self.drop_frame {
            count -= drop_count(rounded_base) * (total_minutes - total_minutes / 10);
        }
        count
    }

    pub fn parse_bcd8(value: u8) -> Result<u8> {
        let tens = value >> 4;
        let units = value & 0xF;

        if tens > 9 || units > 9 {
            bail!(TimecodeError::InvalidBcdDigit(value));
        }

        Ok(10 * tens + units)
    }

    /// Decodes the first four bytes of an SMPTE 12M timecode (frames,
    /// seconds, minutes, hours) as packed in system item date/time stamps.
    pub fn from_smpte12m(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= 4,
            TimecodeError::InsufficientData(bytes.len())
        );

        let timecode = Self {
            frames: Self::parse_bcd8(bytes[0] & 0x3F)?,
            seconds: Self::parse_bcd8(bytes[1] & 0x7F)?,
            minutes: Self::parse_bcd8(bytes[2] & 0x7F)?,
            hours: Self::parse_bcd8(bytes[3] & 0x3F)?,
            drop_frame: bytes[0] & 0x40 != 0,
        };

        trace!("SMPTE 12M timecode: {timecode}");

        Ok(timecode)
    }

    pub fn to_smpte12m(&self) -> [u8; 4] {
        let bcd = |v: u8| ((v / 10) << 4) | (v % 10);
        [
            bcd(self.frames) | if self.drop_frame { 0x40 } else { 0 },
            bcd(self.seconds),
            bcd(self.minutes),
            bcd(self.hours),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_timecode() {
        let timecode = Timecode {
            hours: 10,
            minutes: 0,
            seconds: 0,
            frames: 12,
            drop_frame: false,
        };
        assert_eq!(format!("{timecode}"), "10:00:00:12");
    }

    #[test]
    fn drop_frame_counting() -> Result<()> {
        let tc = Timecode::from_frame_count(1800, 30, true);
        assert_eq!(tc.to_string(), "00:01:00;02");
        assert_eq!(Timecode::from_frame_count(1799, 30, true).to_string(), "00:00:59;29");
        assert_eq!(Timecode::from_frame_count(17982, 30, true).to_string(), "00:10:00;00");
        assert_eq!(tc.to_frame_count(30), 1800);

        let tc: Timecode = "01:00:00;00".parse()?;
        assert_eq!(tc.to_frame_count(30), 107892);
        assert_eq!(Timecode::from_frame_count(107892, 30, true), tc);
        Ok(())
    }

    #[test]
    fn non_drop_round_trip() -> Result<()> {
        let tc: Timecode = "23:59:59:24".parse()?;
        let count = tc.to_frame_count(25);
        assert_eq!(count, 25 * 86400 - 1);
        assert_eq!(Timecode::from_frame_count(count + 1, 25, false).to_string(), "00:00:00:00");
        assert!("24:00:00:00".parse::<Timecode>().is_err());
        assert!("1:00:00:00".parse::<Timecode>().is_err());
        Ok(())
    }

    #[test]
    fn smpte12m_bytes() -> Result<()> {
        let tc = Timecode::from_smpte12m(&[0x45, 0x30, 0x59, 0x23])?;
        assert_eq!(tc.to_string(), "23:59:30;05");
        assert_eq!(tc.to_smpte12m(), [0x45, 0x30, 0x59, 0x23]);
        assert!(Timecode::from_smpte12m(&[0x0A, 0, 0, 0]).is_err());
        Ok(())
    }
}
