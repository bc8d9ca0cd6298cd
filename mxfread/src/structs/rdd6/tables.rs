//! Value names used by the RDD-6 XML representation.

use anyhow::{Result, bail};

use crate::utils::errors::Rdd6XmlError;

#[derive(Debug, Clone, Copy)]
pub struct EnumTable {
    pub field: &'static str,
    pub entries: &'static [(u8, &'static str)],
}

impl EnumTable {
    pub fn name(&self, value: u8) -> Result<&'static str> {
        match self.entries.iter().find(|(v, _)| *v == value) {
            Some((_, name)) => Ok(name),
            None => bail!(Rdd6XmlError::UnknownEnumValue {
                field: self.field,
                value
            }),
        }
    }

    pub fn value(&self, name: &str) -> Result<u8> {
        match self.entries.iter().find(|(_, n)| *n == name) {
            Some((value, _)) => Ok(*value),
            None => bail!(Rdd6XmlError::UnknownEnumName {
                field: self.field,
                name: name.to_string()
            }),
        }
    }
}

pub const FRAME_RATE: EnumTable = EnumTable {
    field: "frame_rate",
    entries: &[
        (1, "23.98"),
        (2, "24"),
        (3, "25"),
        (4, "29.97"),
        (5, "30"),
        (6, "50"),
        (7, "59.94"),
        (8, "60"),
    ],
};

/// Data rate in kbps.
pub const DATA_RATE: EnumTable = EnumTable {
    field: "data_rate",
    entries: &[
        (0, "32"),
        (1, "40"),
        (2, "48"),
        (3, "56"),
        (4, "64"),
        (5, "80"),
        (6, "96"),
        (7, "112"),
        (8, "128"),
        (9, "160"),
        (10, "192"),
        (11, "224"),
        (12, "256"),
        (13, "320"),
        (14, "384"),
        (15, "448"),
        (16, "512"),
        (17, "576"),
        (18, "640"),
        (31, "not_specified"),
    ],
};

pub const BSMOD: EnumTable = EnumTable {
    field: "bsmod",
    entries: &[
        (0, "complete_main"),
        (1, "music_and_effects"),
        (2, "visually_impaired"),
        (3, "hearing_impaired"),
        (4, "dialogue"),
        (5, "commentary"),
        (6, "emergency"),
        (7, "voice_over_karaoke"),
    ],
};

pub const ACMOD: EnumTable = EnumTable {
    field: "acmod",
    entries: &[
        (0, "1+1"),
        (1, "1/0"),
        (2, "2/0"),
        (3, "3/0"),
        (4, "2/1"),
        (5, "3/1"),
        (6, "2/2"),
        (7, "3/2"),
    ],
};

pub const CENTER_MIX_LEVEL: EnumTable = EnumTable {
    field: "center_mix_level",
    entries: &[(0, "-3.0"), (1, "-4.5"), (2, "-6.0")],
};

pub const SURROUND_MIX_LEVEL: EnumTable = EnumTable {
    field: "surround_mix_level",
    entries: &[(0, "-3"), (1, "-6"), (2, "-inf")],
};

pub const ROOM_TYPE: EnumTable = EnumTable {
    field: "room_type",
    entries: &[(0, "not_indicated"), (1, "large"), (2, "small")],
};

pub const DMIXMOD: EnumTable = EnumTable {
    field: "downmix_mode",
    entries: &[(0, "not_indicated"), (1, "lt_rt"), (2, "lo_ro")],
};

/// Lt/Rt and Lo/Ro downmix levels in dB.
pub const DOWNMIX_LEVEL: EnumTable = EnumTable {
    field: "downmix_level",
    entries: &[
        (0, "3.0"),
        (1, "1.5"),
        (2, "0.0"),
        (3, "-1.5"),
        (4, "-3.0"),
        (5, "-4.5"),
        (6, "-6.0"),
        (7, "-inf"),
    ],
};

pub const SURROUND_EX_MODE: EnumTable = EnumTable {
    field: "surround_ex_mode",
    entries: &[(0, "not_indicated"), (1, "not_encoded"), (2, "encoded")],
};

pub const HEADPHONE_MODE: EnumTable = EnumTable {
    field: "headphone_mode",
    entries: &[(0, "not_indicated"), (1, "not_encoded"), (2, "encoded")],
};

pub const AD_CONVERTER_TYPE: EnumTable = EnumTable {
    field: "ad_converter_type",
    entries: &[(0, "standard"), (1, "hdcd")],
};

pub const COMPRESSION_PROFILE: EnumTable = EnumTable {
    field: "compression_profile",
    entries: &[
        (0, "none"),
        (1, "film_standard"),
        (2, "film_light"),
        (3, "music_standard"),
        (4, "music_light"),
        (5, "speech"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_both_ways() -> Result<()> {
        assert_eq!(DATA_RATE.name(31)?, "not_specified");
        assert_eq!(DATA_RATE.value("448")?, 15);
        assert_eq!(COMPRESSION_PROFILE.value("speech")?, 5);
        assert!(DATA_RATE.name(19).is_err());
        assert!(ACMOD.value("3/3").is_err());
        Ok(())
    }
}
