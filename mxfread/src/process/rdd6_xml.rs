//! RDD-6 frames as XML.
//!
//! The document has a `rdd6` root with `first_subframe` and `second_subframe`
//! children. Each sub-frame holds a `sync` element followed by typed payload
//! elements or `segment` elements carrying unknown segments as hex.
//!
//! Writing falls back to a `segment` element for any data segment that does
//! not decode into a valid typed payload. Reading is all-or-nothing: every
//! typed payload is range checked and serialized again, and the first
//! missing element or bad value aborts the document.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::structs::rdd6::frame::{Rdd6Frame, SubFrame};
use crate::structs::rdd6::payload::{
    Ac3Bsi, Ac3Compression, Ac3EssentialBsi, Ac3EssentialExtBsi, Ac3ExtBsi, Ac3Filters,
    DolbyDigitalComplete, DolbyDigitalCompleteExtBsi, DolbyDigitalEssential,
    DolbyDigitalEssentialExtBsi, DolbyEComplete, DolbyEEssential, PROGRAM_CONFIGS, Payload,
    Rdd6Payload, program_config,
};
use crate::structs::rdd6::segment::{DataSegment, SyncSegment};
use crate::structs::rdd6::tables::{
    ACMOD, AD_CONVERTER_TYPE, BSMOD, CENTER_MIX_LEVEL, COMPRESSION_PROFILE, DATA_RATE,
    DMIXMOD, DOWNMIX_LEVEL, EnumTable, FRAME_RATE, HEADPHONE_MODE, ROOM_TYPE,
    SURROUND_EX_MODE, SURROUND_MIX_LEVEL,
};
use crate::structs::timecode::Timecode;
use crate::utils::errors::Rdd6XmlError;

pub const RDD6_NAMESPACE: &str = "http://bbc.co.uk/rd/rdd6/201502";

const ROOT: &str = "rdd6";
const FIRST_SUBFRAME: &str = "first_subframe";
const SECOND_SUBFRAME: &str = "second_subframe";
const SYNC: &str = "sync";
const SEGMENT: &str = "segment";

const DOLBY_E_COMPLETE: &str = "dolby_e_complete";
const DOLBY_E_ESSENTIAL: &str = "dolby_e_essential";
const DOLBY_DIGITAL_COMPLETE_EXT_BSI: &str = "dolby_digital_complete_ext_bsi";
const DOLBY_DIGITAL_ESSENTIAL_EXT_BSI: &str = "dolby_digital_essential_ext_bsi";
const DOLBY_DIGITAL_COMPLETE: &str = "dolby_digital_complete";
const DOLBY_DIGITAL_ESSENTIAL: &str = "dolby_digital_essential";

const DYNAMIC_RANGE: [&str; 4] = [
    "dynamic_range_1",
    "dynamic_range_2",
    "dynamic_range_3",
    "dynamic_range_4",
];

fn hex_byte(value: u8) -> String {
    format!("{value:#04x}")
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { writer })
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut start = BytesStart::new(name);
        for &attribute in attributes {
            start.push_attribute(attribute);
        }
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn leaf(&mut self, name: &str, value: impl Display) -> Result<()> {
        self.start(name, &[])?;
        self.writer
            .write_event(Event::Text(BytesText::new(&value.to_string())))?;
        self.end(name)
    }

    fn into_string(self) -> Result<String> {
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}

/// Writes an RDD-6 frame as an XML document.
pub fn frame_to_xml(frame: &Rdd6Frame) -> Result<String> {
    let mut out = XmlOut::new()?;
    out.start(ROOT, &[("xmlns", RDD6_NAMESPACE)])?;
    write_sub_frame(&mut out, FIRST_SUBFRAME, &frame.first)?;
    write_sub_frame(&mut out, SECOND_SUBFRAME, &frame.second)?;
    out.end(ROOT)?;
    out.into_string()
}

fn write_sub_frame(out: &mut XmlOut, name: &str, sub_frame: &SubFrame) -> Result<()> {
    out.start(name, &[])?;

    out.start(SYNC, &[])?;
    out.leaf("rev_id", sub_frame.sync.rev_id)?;
    out.leaf("originator_id", sub_frame.sync.originator_id)?;
    out.leaf("originator_address", sub_frame.sync.originator_address)?;
    out.leaf("frame_count", sub_frame.sync.frame_count)?;
    out.end(SYNC)?;

    for segment in &sub_frame.segments {
        write_segment(out, segment)?;
    }

    out.end(name)
}

fn write_segment(out: &mut XmlOut, segment: &DataSegment) -> Result<()> {
    match Payload::decode(segment) {
        Ok(payload) if payload.validate() => write_payload(out, &payload),
        Ok(_) => {
            warn!(
                "Data segment {} holds out of range values, writing it as raw data",
                segment.id
            );
            write_raw_segment(out, segment)
        }
        Err(err) => {
            warn!(
                "Data segment {} cannot be decoded ({err}), writing it as raw data",
                segment.id
            );
            write_raw_segment(out, segment)
        }
    }
}

fn write_raw_segment(out: &mut XmlOut, segment: &DataSegment) -> Result<()> {
    let id = segment.id.to_string();
    let size = segment.payload.len().to_string();
    out.start(SEGMENT, &[("id", &id), ("size", &size)])?;
    out.writer
        .write_event(Event::Text(BytesText::new(&hex_string(&segment.payload))))?;
    out.end(SEGMENT)
}

fn write_payload(out: &mut XmlOut, payload: &Payload) -> Result<()> {
    match payload {
        Payload::DolbyEComplete(p) => {
            out.start(DOLBY_E_COMPLETE, &[])?;
            write_dolby_e_common(
                out,
                p.program_config,
                p.frame_rate_code,
                p.original_frame_rate_code,
                p.frame_count,
                p.smpte_timecode.as_ref(),
            )?;
            if p.pitch_shift_code != 0 {
                out.leaf("pitch_shift", p.pitch_shift_code)?;
            }
            out.start("descriptions", &[])?;
            for &text in &p.description_text {
                out.leaf("description", hex_byte(text))?;
            }
            out.end("descriptions")?;
            out.end(DOLBY_E_COMPLETE)
        }
        Payload::DolbyEEssential(p) => {
            out.start(DOLBY_E_ESSENTIAL, &[])?;
            write_dolby_e_common(
                out,
                p.program_config,
                p.frame_rate_code,
                p.original_frame_rate_code,
                p.frame_count,
                p.smpte_timecode.as_ref(),
            )?;
            out.end(DOLBY_E_ESSENTIAL)
        }
        Payload::DolbyDigitalCompleteExtBsi(p) => {
            let program_id = p.bsi.program_id.to_string();
            out.start(DOLBY_DIGITAL_COMPLETE_EXT_BSI, &[("program_id", &program_id)])?;
            write_bsi(out, &p.bsi)?;
            write_ext_bsi(out, &p.ext_bsi)?;
            write_filters(out, &p.filters)?;
            write_compression(out, &p.compression)?;
            out.end(DOLBY_DIGITAL_COMPLETE_EXT_BSI)
        }
        Payload::DolbyDigitalEssentialExtBsi(p) => {
            let program_id = p.bsi.program_id.to_string();
            out.start(DOLBY_DIGITAL_ESSENTIAL_EXT_BSI, &[("program_id", &program_id)])?;
            write_essential_bsi(out, &p.bsi)?;
            write_essential_ext_bsi(out, &p.ext_bsi)?;
            write_compression(out, &p.compression)?;
            out.end(DOLBY_DIGITAL_ESSENTIAL_EXT_BSI)
        }
        Payload::DolbyDigitalComplete(p) => {
            let program_id = p.bsi.program_id.to_string();
            out.start(DOLBY_DIGITAL_COMPLETE, &[("program_id", &program_id)])?;
            write_bsi(out, &p.bsi)?;
            write_filters(out, &p.filters)?;
            write_compression(out, &p.compression)?;
            out.end(DOLBY_DIGITAL_COMPLETE)
        }
        Payload::DolbyDigitalEssential(p) => {
            let program_id = p.bsi.program_id.to_string();
            out.start(DOLBY_DIGITAL_ESSENTIAL, &[("program_id", &program_id)])?;
            write_essential_bsi(out, &p.bsi)?;
            write_compression(out, &p.compression)?;
            out.end(DOLBY_DIGITAL_ESSENTIAL)
        }
        Payload::Raw(segment) => write_raw_segment(out, segment),
    }
}

fn write_dolby_e_common(
    out: &mut XmlOut,
    config: u8,
    frame_rate_code: u8,
    original_frame_rate_code: u8,
    frame_count: u16,
    timecode: Option<&Timecode>,
) -> Result<()> {
    out.leaf("program_config", program_config(config)?.name)?;
    out.leaf("frame_rate", FRAME_RATE.name(frame_rate_code)?)?;
    out.leaf("original_frame_rate", FRAME_RATE.name(original_frame_rate_code)?)?;
    out.leaf("frame_count", frame_count)?;
    if let Some(timecode) = timecode {
        out.leaf("timecode", timecode)?;
    }
    Ok(())
}

fn has_center_mix_level(acmod: u8) -> bool {
    acmod & 1 != 0 && acmod != 1
}

fn has_surround_mix_level(acmod: u8) -> bool {
    acmod & 4 != 0
}

// AC-3 mixlevel is coded as peak mixing level minus 80 dB SPL.
const MIX_LEVEL_BASE: u8 = 80;

fn write_bsi(out: &mut XmlOut, bsi: &Ac3Bsi) -> Result<()> {
    out.leaf("data_rate", DATA_RATE.name(bsi.datarate)?)?;
    out.leaf("bsmod", BSMOD.name(bsi.bsmod)?)?;
    out.leaf("acmod", ACMOD.name(bsi.acmod)?)?;
    if has_center_mix_level(bsi.acmod) {
        out.leaf("center_mix_level", CENTER_MIX_LEVEL.name(bsi.cmixlev)?)?;
    }
    if has_surround_mix_level(bsi.acmod) {
        out.leaf("surround_mix_level", SURROUND_MIX_LEVEL.name(bsi.surmixlev)?)?;
    }
    match bsi.dsurmod {
        1 => out.leaf("sur_encoded", false)?,
        2 => out.leaf("sur_encoded", true)?,
        _ => {}
    }
    out.leaf("lfe", bsi.lfeon)?;
    out.leaf("dialnorm", -(bsi.dialnorm as i16))?;
    if bsi.langcode {
        out.leaf("lang_code", hex_byte(bsi.langcod))?;
    }
    if bsi.audprodie {
        out.leaf("mix_level", MIX_LEVEL_BASE + bsi.mixlevel)?;
        out.leaf("room_type", ROOM_TYPE.name(bsi.roomtyp)?)?;
    }
    out.leaf("copyright", bsi.copyrightb)?;
    out.leaf("original_bitstream", bsi.origbs)
}

fn write_ext_bsi(out: &mut XmlOut, ext: &Ac3ExtBsi) -> Result<()> {
    if ext.xbsi1e {
        out.leaf("downmix_mode", DMIXMOD.name(ext.dmixmod)?)?;
        out.leaf("lt_rt_center_mix_level", DOWNMIX_LEVEL.name(ext.ltrtcmixlev)?)?;
        out.leaf("lt_rt_surround_mix_level", DOWNMIX_LEVEL.name(ext.ltrtsurmixlev)?)?;
        out.leaf("lo_ro_center_mix_level", DOWNMIX_LEVEL.name(ext.lorocmixlev)?)?;
        out.leaf("lo_ro_surround_mix_level", DOWNMIX_LEVEL.name(ext.lorosurmixlev)?)?;
    }
    if ext.xbsi2e {
        out.leaf("surround_ex_mode", SURROUND_EX_MODE.name(ext.dsurexmod)?)?;
        out.leaf("headphone_mode", HEADPHONE_MODE.name(ext.dheadphonmod)?)?;
        out.leaf("ad_converter_type", AD_CONVERTER_TYPE.name(ext.adconvtyp)?)?;
        out.leaf("xbsi2", hex_byte(ext.xbsi2))?;
    }
    out.leaf("encinfo", ext.encinfo)
}

fn write_essential_bsi(out: &mut XmlOut, bsi: &Ac3EssentialBsi) -> Result<()> {
    out.leaf("data_rate", DATA_RATE.name(bsi.datarate)?)?;
    out.leaf("bsmod", BSMOD.name(bsi.bsmod)?)?;
    out.leaf("acmod", ACMOD.name(bsi.acmod)?)?;
    out.leaf("lfe", bsi.lfeon)?;
    out.leaf("dialnorm", -(bsi.dialnorm as i16))
}

fn write_essential_ext_bsi(out: &mut XmlOut, ext: &Ac3EssentialExtBsi) -> Result<()> {
    if ext.xbsi1e {
        out.leaf("downmix_mode", DMIXMOD.name(ext.dmixmod)?)?;
    }
    if ext.xbsi2e {
        out.leaf("surround_ex_mode", SURROUND_EX_MODE.name(ext.dsurexmod)?)?;
        out.leaf("headphone_mode", HEADPHONE_MODE.name(ext.dheadphonmod)?)?;
    }
    Ok(())
}

fn write_filters(out: &mut XmlOut, filters: &Ac3Filters) -> Result<()> {
    out.leaf("hp_filter", filters.hpfon)?;
    out.leaf("bw_lp_filter", filters.bwlpfon)?;
    out.leaf("lfe_lp_filter", filters.lfelpfon)?;
    out.leaf("sur_90_filter", filters.sur90on)?;
    out.leaf("sur_atten", filters.suratton)?;
    out.leaf("rf_preemph", filters.rfpremphon)
}

/// Profile names when the mode bit is set, raw hex bytes otherwise.
fn compression_word(mode: bool, value: u8) -> Result<String> {
    if mode {
        Ok(COMPRESSION_PROFILE.name(value)?.to_string())
    } else {
        Ok(hex_byte(value))
    }
}

fn write_compression(out: &mut XmlOut, compression: &Ac3Compression) -> Result<()> {
    out.leaf(
        "compression",
        compression_word(compression.compre, compression.compr1)?,
    )?;
    for (name, &value) in DYNAMIC_RANGE.iter().zip(&compression.dynrng) {
        out.leaf(name, compression_word(compression.dynrnge, value)?)?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(start: &BytesStart) -> Result<Self> {
        let mut node = Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            ..Default::default()
        };
        for attribute in start.attributes() {
            let attribute = attribute?;
            node.attributes.push((
                String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned(),
                attribute.unescape_value()?.into_owned(),
            ));
        }
        Ok(node)
    }

    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&XmlNode> {
        self.child(name).ok_or_else(|| {
            anyhow!(Rdd6XmlError::MissingElement {
                parent: self.name.clone(),
                name: name.to_string(),
            })
        })
    }

    fn attribute(&self, name: &str) -> Result<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| {
                anyhow!(Rdd6XmlError::MissingAttribute {
                    element: self.name.clone(),
                    name: name.to_string(),
                })
            })
    }

    fn invalid(&self, value: &str) -> anyhow::Error {
        anyhow!(Rdd6XmlError::InvalidValue {
            element: self.name.clone(),
            value: value.to_string(),
        })
    }

    fn value<T: FromStr>(&self) -> Result<T> {
        let text = self.text.trim();
        text.parse().map_err(|_| self.invalid(text))
    }

    fn flag(&self) -> Result<bool> {
        match self.text.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(self.invalid(other)),
        }
    }

    fn hex(&self) -> Result<u8> {
        let text = self.text.trim();
        text.strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            .ok_or_else(|| self.invalid(text))
    }

    fn enumerated(&self, table: &EnumTable) -> Result<u8> {
        table.value(self.text.trim())
    }

    /// Compression word and whether it was written as a profile name.
    fn compression_word(&self) -> Result<(bool, u8)> {
        if self.text.trim().starts_with("0x") {
            Ok((false, self.hex()?))
        } else {
            Ok((true, self.enumerated(&COMPRESSION_PROFILE)?))
        }
    }

    fn req_value<T: FromStr>(&self, name: &str) -> Result<T> {
        self.require(name)?.value()
    }

    fn req_flag(&self, name: &str) -> Result<bool> {
        self.require(name)?.flag()
    }

    fn req_enum(&self, name: &str, table: &EnumTable) -> Result<u8> {
        self.require(name)?.enumerated(table)
    }

    fn opt_enum(&self, name: &str, table: &EnumTable) -> Result<Option<u8>> {
        self.child(name).map(|c| c.enumerated(table)).transpose()
    }

    /// Logs and skips elements this reader does not know about.
    fn skip_unknown(&self, known: &[&str]) {
        for child in &self.children {
            if !known.contains(&child.name.as_str()) {
                warn!("Ignoring unknown element <{}> in <{}>", child.name, self.name);
            }
        }
    }
}

fn read_tree(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    loop {
        let completed = match reader.read_event()? {
            Event::Start(start) => {
                stack.push(XmlNode::from_start(&start)?);
                None
            }
            Event::Empty(start) => Some(XmlNode::from_start(&start)?),
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.unescape()?);
                }
                None
            }
            Event::End(_) => Some(stack.pop().ok_or_else(|| {
                anyhow!(Rdd6XmlError::Malformed("unbalanced end tag".to_string()))
            })?),
            Event::Eof => bail!(Rdd6XmlError::Malformed(
                "document ends inside the root element".to_string()
            )),
            _ => None,
        };

        if let Some(node) = completed {
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => return Ok(node),
            }
        }
    }
}

/// Reads an RDD-6 frame from an XML document.
pub fn frame_from_xml(xml: &str) -> Result<Rdd6Frame> {
    let root = read_tree(xml)?;
    if root.name != ROOT {
        bail!(Rdd6XmlError::UnexpectedRoot(root.name));
    }
    root.skip_unknown(&[FIRST_SUBFRAME, SECOND_SUBFRAME]);

    Ok(Rdd6Frame {
        first: read_sub_frame(root.require(FIRST_SUBFRAME)?)?,
        second: read_sub_frame(root.require(SECOND_SUBFRAME)?)?,
    })
}

fn read_sub_frame(node: &XmlNode) -> Result<SubFrame> {
    let sync_node = node.require(SYNC)?;
    sync_node.skip_unknown(&["rev_id", "originator_id", "originator_address", "frame_count"]);
    let sync = SyncSegment {
        rev_id: sync_node.req_value("rev_id")?,
        originator_id: sync_node.req_value("originator_id")?,
        originator_address: sync_node.req_value("originator_address")?,
        frame_count: sync_node.req_value("frame_count")?,
    };

    let mut segments = Vec::new();
    for child in &node.children {
        let segment = match child.name.as_str() {
            SYNC => continue,
            SEGMENT => read_raw_segment(child)?,
            DOLBY_E_COMPLETE => read_dolby_e_complete(child)?.construct_payload()?,
            DOLBY_E_ESSENTIAL => read_dolby_e_essential(child)?.construct_payload()?,
            DOLBY_DIGITAL_COMPLETE_EXT_BSI => DolbyDigitalCompleteExtBsi {
                bsi: read_bsi(child)?,
                ext_bsi: read_ext_bsi(child)?,
                filters: read_filters(child)?,
                compression: read_compression(child, 4)?,
            }
            .construct_payload()?,
            DOLBY_DIGITAL_ESSENTIAL_EXT_BSI => DolbyDigitalEssentialExtBsi {
                bsi: read_essential_bsi(child)?,
                ext_bsi: read_essential_ext_bsi(child)?,
                compression: read_compression(child, 1)?,
            }
            .construct_payload()?,
            DOLBY_DIGITAL_COMPLETE => DolbyDigitalComplete {
                bsi: read_bsi(child)?,
                filters: read_filters(child)?,
                compression: read_compression(child, 4)?,
            }
            .construct_payload()?,
            DOLBY_DIGITAL_ESSENTIAL => DolbyDigitalEssential {
                bsi: read_essential_bsi(child)?,
                compression: read_compression(child, 1)?,
            }
            .construct_payload()?,
            other => {
                warn!("Ignoring unknown element <{other}> in <{}>", node.name);
                continue;
            }
        };
        debug!("<{}>: data segment {}", child.name, segment.id);
        segments.push(segment);
    }

    Ok(SubFrame { sync, segments })
}

fn read_raw_segment(node: &XmlNode) -> Result<DataSegment> {
    let id_attr = node.attribute("id")?;
    let id: u8 = id_attr.parse().map_err(|_| node.invalid(id_attr))?;
    let size_attr = node.attribute("size")?;
    let size: usize = size_attr.parse().map_err(|_| node.invalid(size_attr))?;

    let text = node.text.trim();
    if !text.is_ascii() || text.len() % 2 != 0 {
        return Err(node.invalid(text));
    }
    let payload = (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| node.invalid(text))?;
    if payload.len() != size {
        bail!(Rdd6XmlError::SizeMismatch {
            declared: size,
            found: payload.len()
        });
    }

    DataSegment::new(id, payload)
}

fn read_program_config(node: &XmlNode) -> Result<u8> {
    let name_node = node.require("program_config")?;
    let name = name_node.text.trim();
    PROGRAM_CONFIGS
        .iter()
        .position(|c| c.name == name)
        .map(|code| code as u8)
        .ok_or_else(|| {
            anyhow!(Rdd6XmlError::UnknownEnumName {
                field: "program_config",
                name: name.to_string(),
            })
        })
}

fn read_timecode(node: &XmlNode) -> Result<Option<Timecode>> {
    let Some(tc_node) = node.child("timecode") else {
        return Ok(None);
    };
    let text = tc_node.text.trim();
    text.parse::<Timecode>()
        .map(Some)
        .map_err(|_| anyhow!(Rdd6XmlError::InvalidTimecode(text.to_string())))
}

fn read_dolby_e_essential(node: &XmlNode) -> Result<DolbyEEssential> {
    node.skip_unknown(&[
        "program_config",
        "frame_rate",
        "original_frame_rate",
        "frame_count",
        "timecode",
    ]);
    Ok(DolbyEEssential {
        program_config: read_program_config(node)?,
        frame_rate_code: node.req_enum("frame_rate", &FRAME_RATE)?,
        original_frame_rate_code: node.req_enum("original_frame_rate", &FRAME_RATE)?,
        frame_count: node.req_value("frame_count")?,
        smpte_timecode: read_timecode(node)?,
    })
}

fn read_dolby_e_complete(node: &XmlNode) -> Result<DolbyEComplete> {
    node.skip_unknown(&[
        "program_config",
        "frame_rate",
        "original_frame_rate",
        "frame_count",
        "timecode",
        "pitch_shift",
        "descriptions",
    ]);

    let descriptions = node.require("descriptions")?;
    descriptions.skip_unknown(&["description"]);
    let description_text = descriptions
        .children
        .iter()
        .filter(|c| c.name == "description")
        .map(|c| c.hex())
        .collect::<Result<Vec<u8>>>()?;

    Ok(DolbyEComplete {
        program_config: read_program_config(node)?,
        frame_rate_code: node.req_enum("frame_rate", &FRAME_RATE)?,
        original_frame_rate_code: node.req_enum("original_frame_rate", &FRAME_RATE)?,
        frame_count: node.req_value("frame_count")?,
        smpte_timecode: read_timecode(node)?,
        pitch_shift_code: match node.child("pitch_shift") {
            Some(pitch) => pitch.value()?,
            None => 0,
        },
        description_text,
    })
}

const BSI_ELEMENTS: &[&str] = &[
    "data_rate",
    "bsmod",
    "acmod",
    "center_mix_level",
    "surround_mix_level",
    "sur_encoded",
    "lfe",
    "dialnorm",
    "lang_code",
    "mix_level",
    "room_type",
    "copyright",
    "original_bitstream",
];
const EXT_BSI_ELEMENTS: &[&str] = &[
    "downmix_mode",
    "lt_rt_center_mix_level",
    "lt_rt_surround_mix_level",
    "lo_ro_center_mix_level",
    "lo_ro_surround_mix_level",
    "surround_ex_mode",
    "headphone_mode",
    "ad_converter_type",
    "xbsi2",
    "encinfo",
];
const FILTER_ELEMENTS: &[&str] = &[
    "hp_filter",
    "bw_lp_filter",
    "lfe_lp_filter",
    "sur_90_filter",
    "sur_atten",
    "rf_preemph",
];

fn skip_unknown_ac3(node: &XmlNode) {
    let known: Vec<&str> = BSI_ELEMENTS
        .iter()
        .chain(EXT_BSI_ELEMENTS)
        .chain(FILTER_ELEMENTS)
        .chain(std::iter::once(&"compression"))
        .chain(DYNAMIC_RANGE.iter())
        .copied()
        .collect();
    node.skip_unknown(&known);
}

fn read_program_id(node: &XmlNode) -> Result<u8> {
    let text = node.attribute("program_id")?;
    text.parse().map_err(|_| node.invalid(text))
}

fn read_dialnorm(node: &XmlNode) -> Result<u8> {
    let dialnorm = node.require("dialnorm")?;
    let value: i16 = dialnorm.value()?;
    if !(-31..=0).contains(&value) {
        return Err(dialnorm.invalid(&value.to_string()));
    }
    Ok((-value) as u8)
}

fn read_bsi(node: &XmlNode) -> Result<Ac3Bsi> {
    skip_unknown_ac3(node);

    let acmod = node.req_enum("acmod", &ACMOD)?;
    let mut bsi = Ac3Bsi {
        program_id: read_program_id(node)?,
        datarate: node.req_enum("data_rate", &DATA_RATE)?,
        bsmod: node.req_enum("bsmod", &BSMOD)?,
        acmod,
        lfeon: node.req_flag("lfe")?,
        dialnorm: read_dialnorm(node)?,
        copyrightb: node.req_flag("copyright")?,
        origbs: node.req_flag("original_bitstream")?,
        ..Default::default()
    };

    if has_center_mix_level(acmod) {
        bsi.cmixlev = node.req_enum("center_mix_level", &CENTER_MIX_LEVEL)?;
    }
    if has_surround_mix_level(acmod) {
        bsi.surmixlev = node.req_enum("surround_mix_level", &SURROUND_MIX_LEVEL)?;
    }
    if let Some(sur_encoded) = node.child("sur_encoded") {
        bsi.dsurmod = if sur_encoded.flag()? { 2 } else { 1 };
    }
    if let Some(lang_code) = node.child("lang_code") {
        bsi.langcode = true;
        bsi.langcod = lang_code.hex()?;
    }
    if let Some(mix_level) = node.child("mix_level") {
        let level: u8 = mix_level.value()?;
        if !(MIX_LEVEL_BASE..=MIX_LEVEL_BASE + 31).contains(&level) {
            return Err(mix_level.invalid(&level.to_string()));
        }
        bsi.audprodie = true;
        bsi.mixlevel = level - MIX_LEVEL_BASE;
        bsi.roomtyp = node.req_enum("room_type", &ROOM_TYPE)?;
    }

    Ok(bsi)
}

fn read_ext_bsi(node: &XmlNode) -> Result<Ac3ExtBsi> {
    let mut ext = Ac3ExtBsi {
        encinfo: node.req_flag("encinfo")?,
        ..Default::default()
    };
    if let Some(dmixmod) = node.opt_enum("downmix_mode", &DMIXMOD)? {
        ext.xbsi1e = true;
        ext.dmixmod = dmixmod;
        ext.ltrtcmixlev = node.req_enum("lt_rt_center_mix_level", &DOWNMIX_LEVEL)?;
        ext.ltrtsurmixlev = node.req_enum("lt_rt_surround_mix_level", &DOWNMIX_LEVEL)?;
        ext.lorocmixlev = node.req_enum("lo_ro_center_mix_level", &DOWNMIX_LEVEL)?;
        ext.lorosurmixlev = node.req_enum("lo_ro_surround_mix_level", &DOWNMIX_LEVEL)?;
    }
    if let Some(dsurexmod) = node.opt_enum("surround_ex_mode", &SURROUND_EX_MODE)? {
        ext.xbsi2e = true;
        ext.dsurexmod = dsurexmod;
        ext.dheadphonmod = node.req_enum("headphone_mode", &HEADPHONE_MODE)?;
        ext.adconvtyp = node.req_enum("ad_converter_type", &AD_CONVERTER_TYPE)?;
        ext.xbsi2 = node.require("xbsi2")?.hex()?;
    }
    Ok(ext)
}

fn read_essential_bsi(node: &XmlNode) -> Result<Ac3EssentialBsi> {
    skip_unknown_ac3(node);
    Ok(Ac3EssentialBsi {
        program_id: read_program_id(node)?,
        datarate: node.req_enum("data_rate", &DATA_RATE)?,
        bsmod: node.req_enum("bsmod", &BSMOD)?,
        acmod: node.req_enum("acmod", &ACMOD)?,
        lfeon: node.req_flag("lfe")?,
        dialnorm: read_dialnorm(node)?,
    })
}

fn read_essential_ext_bsi(node: &XmlNode) -> Result<Ac3EssentialExtBsi> {
    let mut ext = Ac3EssentialExtBsi::default();
    if let Some(dmixmod) = node.opt_enum("downmix_mode", &DMIXMOD)? {
        ext.xbsi1e = true;
        ext.dmixmod = dmixmod;
    }
    if let Some(dsurexmod) = node.opt_enum("surround_ex_mode", &SURROUND_EX_MODE)? {
        ext.xbsi2e = true;
        ext.dsurexmod = dsurexmod;
        ext.dheadphonmod = node.req_enum("headphone_mode", &HEADPHONE_MODE)?;
    }
    Ok(ext)
}

fn read_filters(node: &XmlNode) -> Result<Ac3Filters> {
    Ok(Ac3Filters {
        hpfon: node.req_flag("hp_filter")?,
        bwlpfon: node.req_flag("bw_lp_filter")?,
        lfelpfon: node.req_flag("lfe_lp_filter")?,
        sur90on: node.req_flag("sur_90_filter")?,
        suratton: node.req_flag("sur_atten")?,
        rfpremphon: node.req_flag("rf_preemph")?,
    })
}

fn read_compression(node: &XmlNode, dynrng_count: usize) -> Result<Ac3Compression> {
    let (compre, compr1) = node.require("compression")?.compression_word()?;

    let mut dynrnge = None;
    let mut dynrng = Vec::with_capacity(dynrng_count);
    for name in &DYNAMIC_RANGE[..dynrng_count] {
        let word_node = node.require(name)?;
        let (mode, value) = word_node.compression_word()?;
        // One mode bit covers every dynamic range word
        if dynrnge.is_some_and(|m| m != mode) {
            return Err(word_node.invalid(word_node.text.trim()));
        }
        dynrnge = Some(mode);
        dynrng.push(value);
    }

    Ok(Ac3Compression {
        compre,
        compr1,
        dynrnge: dynrnge.unwrap_or_default(),
        dynrng,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::rdd6::DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID;

    fn sample_frame() -> Result<Rdd6Frame> {
        frame_with_dsurmod(1)
    }

    fn frame_with_dsurmod(dsurmod: u8) -> Result<Rdd6Frame> {
        let dolby_e = DolbyEComplete {
            program_config: 0,
            frame_rate_code: 3,
            original_frame_rate_code: 3,
            frame_count: 42,
            smpte_timecode: Some("10:00:00:05".parse()?),
            pitch_shift_code: 0,
            description_text: vec![0x41, 0x00],
        };

        let mut ac3 = DolbyDigitalCompleteExtBsi::default();
        ac3.bsi.program_id = 1;
        ac3.bsi.datarate = 15;
        ac3.bsi.acmod = 7;
        ac3.bsi.cmixlev = 1;
        ac3.bsi.surmixlev = 2;
        ac3.bsi.dsurmod = dsurmod;
        ac3.bsi.lfeon = true;
        ac3.bsi.dialnorm = 27;
        ac3.bsi.audprodie = true;
        ac3.bsi.mixlevel = 25;
        ac3.bsi.roomtyp = 1;
        ac3.ext_bsi.xbsi1e = true;
        ac3.ext_bsi.dmixmod = 2;
        ac3.ext_bsi.ltrtcmixlev = 4;
        ac3.ext_bsi.ltrtsurmixlev = 4;
        ac3.ext_bsi.lorocmixlev = 4;
        ac3.ext_bsi.lorosurmixlev = 4;
        ac3.filters.hpfon = true;
        ac3.compression.compre = true;
        ac3.compression.compr1 = 1;
        ac3.compression.dynrng = vec![0x1f, 0x00, 0xff, 0x80];

        Ok(Rdd6Frame {
            first: SubFrame {
                sync: SyncSegment {
                    rev_id: 1,
                    originator_id: 2,
                    originator_address: 3,
                    frame_count: 4,
                },
                segments: vec![dolby_e.construct_payload()?, ac3.construct_payload()?],
            },
            second: SubFrame {
                sync: SyncSegment {
                    frame_count: 4,
                    ..Default::default()
                },
                segments: vec![DataSegment::new(0x55, vec![0xde, 0xad])?],
            },
        })
    }

    #[test]
    fn xml_round_trip() -> Result<()> {
        let frame = sample_frame()?;
        let xml = frame_to_xml(&frame)?;

        assert!(xml.contains(RDD6_NAMESPACE));
        assert!(xml.contains("<program_config>5.1+2</program_config>"));
        assert!(xml.contains("<dialnorm>-27</dialnorm>"));
        assert!(xml.contains("<compression>film_standard</compression>"));
        assert!(xml.contains("<dynamic_range_1>0x1f</dynamic_range_1>"));
        assert!(xml.contains("<sur_encoded>false</sur_encoded>"));
        assert!(xml.contains(r#"<segment id="85" size="2">dead</segment>"#));
        assert!(!xml.contains("lang_code"));
        assert!(!xml.contains("pitch_shift"));

        assert_eq!(frame_from_xml(&xml)?, frame);
        Ok(())
    }

    #[test]
    fn surround_encoding_mode() -> Result<()> {
        for (dsurmod, element) in [
            (0, None),
            (1, Some("<sur_encoded>false</sur_encoded>")),
            (2, Some("<sur_encoded>true</sur_encoded>")),
        ] {
            let frame = frame_with_dsurmod(dsurmod)?;
            let xml = frame_to_xml(&frame)?;
            match element {
                Some(element) => assert!(xml.contains(element)),
                None => assert!(!xml.contains("sur_encoded")),
            }
            assert_eq!(frame_from_xml(&xml)?, frame);
        }
        Ok(())
    }

    #[test]
    fn undecodable_segment_is_written_raw() -> Result<()> {
        let mut frame = sample_frame()?;
        frame.second.segments = vec![DataSegment::new(DOLBY_DIGITAL_COMPLETE_EXT_BSI_ID, vec![0; 3])?];

        let xml = frame_to_xml(&frame)?;
        assert!(xml.contains(r#"<segment id="3" size="3">000000</segment>"#));
        assert_eq!(frame_from_xml(&xml)?, frame);
        Ok(())
    }

    #[test]
    fn unknown_elements_are_ignored() -> Result<()> {
        let xml = frame_to_xml(&sample_frame()?)?.replace(
            "<originator_id>2</originator_id>",
            "<originator_id>2</originator_id><vendor><nested/></vendor>",
        );
        assert_eq!(frame_from_xml(&xml)?, sample_frame()?);
        Ok(())
    }

    #[test]
    fn bad_values_abort() -> Result<()> {
        let xml = frame_to_xml(&sample_frame()?)?;

        let bad_enum = xml.replace("<acmod>3/2</acmod>", "<acmod>9/9</acmod>");
        assert!(frame_from_xml(&bad_enum).is_err());

        let missing = xml.replace("<lfe>true</lfe>", "");
        let err = frame_from_xml(&missing).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Rdd6XmlError>(),
            Some(Rdd6XmlError::MissingElement { .. })
        ));

        let bad_timecode = xml.replace("10:00:00:05", "10:00:00");
        assert!(frame_from_xml(&bad_timecode).is_err());

        let out_of_range = xml.replace("<dialnorm>-27</dialnorm>", "<dialnorm>0</dialnorm>");
        assert!(frame_from_xml(&out_of_range).is_err());

        assert!(frame_from_xml("<other/>").is_err());
        Ok(())
    }
}
