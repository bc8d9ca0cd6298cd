use anyhow::Result;
use indicatif::MultiProgress;
use serde::Serialize;

use super::command::{Cli, InfoArgs, ReportFormat};
use crate::input::InputReader;
use crate::timestamp::duration_str;
use mxfread::process::reader::{MxfReader, ReaderOptions};
use mxfread::structs::track::{EssenceTrack, FrameSize, TrackInfo, Wrapping};
use mxfread::utils::ul;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, _multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing MXF file: {}", args.input.display());

    let input = InputReader::new(&args.input);
    let options = ReaderOptions {
        fail_level: cli.fail_level(),
        ..Default::default()
    };
    let mut reader = MxfReader::with_options(input.open_mxf()?, options)?;
    let report = ClipReport::from_reader(&mut reader)?;

    match args.format {
        ReportFormat::Plain => display_report(&report),
        ReportFormat::Yaml => print!("{}", serde_yaml_ng::to_string(&report)?),
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ClipReport {
    operational_pattern: String,
    frame_rate: String,
    duration: i64,
    duration_time: String,
    seekable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_written_frame: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    playout_timecode: Option<String>,
    source_timecodes: Vec<TimecodeReport>,
    tracks: Vec<TrackReport>,
}

#[derive(Debug, Serialize)]
struct TimecodeReport {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<String>,
}

#[derive(Debug, Serialize)]
struct TrackReport {
    index: usize,
    track_id: u32,
    track_number: String,
    essence: String,
    wrapping: String,
    frame_size: String,
    edit_rate: String,
    duration: i64,
    body_sid: u32,
    index_sid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    picture: Option<PictureReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<SoundReport>,
}

#[derive(Debug, Serialize)]
struct PictureReport {
    stored: String,
    display: String,
    subsampling: String,
    component_depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
}

#[derive(Debug, Serialize)]
struct SoundReport {
    sampling_rate: String,
    channels: u32,
    bits_per_sample: u32,
    block_align: u32,
}

fn operational_pattern_name(label: &ul::Ul) -> String {
    if ul::is_op1a(label) {
        "OP-1A".to_string()
    } else if ul::is_op_atom(label) {
        "OP-Atom".to_string()
    } else {
        label.to_string()
    }
}

fn frame_size_str(frame_size: &FrameSize) -> String {
    match frame_size {
        FrameSize::Fixed(size) => format!("{size} bytes"),
        FrameSize::Variable => "variable".to_string(),
        FrameSize::Sequence(sizes) => {
            let sizes: Vec<String> = sizes.iter().map(u32::to_string).collect();
            format!("{} bytes", sizes.join("/"))
        }
    }
}

impl TrackReport {
    fn new(index: usize, track: &EssenceTrack) -> Self {
        let (picture, sound) = match &track.info {
            TrackInfo::Picture(p) => (
                Some(PictureReport {
                    stored: format!("{}x{}", p.stored_width, p.stored_height),
                    display: format!(
                        "{}x{}+{}+{}",
                        p.display_width, p.display_height, p.display_x_offset, p.display_y_offset
                    ),
                    subsampling: format!("{}:{}", p.horiz_subsampling, p.vert_subsampling),
                    component_depth: p.component_depth,
                    aspect_ratio: p.aspect_ratio.map(|r| r.to_string()),
                }),
                None,
            ),
            TrackInfo::Sound(s) => (
                None,
                Some(SoundReport {
                    sampling_rate: s.sampling_rate.to_string(),
                    channels: s.channel_count,
                    bits_per_sample: s.bits_per_sample,
                    block_align: s.block_align,
                }),
            ),
        };

        Self {
            index,
            track_id: track.track_id,
            track_number: format!("{:08X}", track.track_number),
            essence: track.kind.to_string(),
            wrapping: match track.wrapping {
                Wrapping::Frame => "frame",
                Wrapping::Clip => "clip",
            }
            .to_string(),
            frame_size: frame_size_str(&track.frame_size),
            edit_rate: track.frame_rate.to_string(),
            duration: track.duration,
            body_sid: track.body_sid,
            index_sid: track.index_sid,
            picture,
            sound,
        }
    }
}

impl ClipReport {
    fn from_reader(reader: &mut MxfReader) -> Result<Self> {
        let mut source_timecodes = Vec::new();
        for index in 0..reader.num_source_timecodes() {
            let kind = reader.clip().source_timecodes[index].kind;
            source_timecodes.push(TimecodeReport {
                kind: kind.to_string(),
                start: reader.source_timecode(index)?.map(|tc| tc.to_string()),
            });
        }

        let last_written_frame = match reader.is_seekable() {
            true => reader.last_written_frame_number()?,
            false => None,
        };

        let clip = reader.clip();
        Ok(Self {
            operational_pattern: operational_pattern_name(&clip.operational_pattern),
            frame_rate: clip.frame_rate.to_string(),
            duration: reader.duration(),
            duration_time: duration_str(reader.duration(), clip.frame_rate),
            seekable: reader.is_seekable(),
            last_written_frame,
            playout_timecode: reader.playout_timecode().map(|tc| tc.to_string()),
            source_timecodes,
            tracks: clip
                .tracks
                .iter()
                .enumerate()
                .map(|(i, t)| TrackReport::new(i, t))
                .collect(),
        })
    }
}

fn display_report(report: &ClipReport) {
    println!();
    println!("MXF Clip Information");
    println!("====================");
    println!();
    println!("  Operational pattern       {}", report.operational_pattern);
    println!("  Frame rate                {}", report.frame_rate);
    println!(
        "  Duration                  {} frames ({})",
        report.duration, report.duration_time
    );
    println!("  Seekable                  {}", report.seekable);
    if let Some(frame) = report.last_written_frame {
        println!("  Last written frame        {frame}");
    }
    println!();

    println!("Timecodes");
    match &report.playout_timecode {
        Some(tc) => println!("  Playout                   {tc}"),
        None => println!("  Playout                   none"),
    }
    for tc in &report.source_timecodes {
        let start = tc.start.as_deref().unwrap_or("unavailable");
        println!("  {:26}{start}", capitalize(&tc.kind));
    }
    println!();

    println!("Tracks");
    for track in &report.tracks {
        display_track(track);
    }
}

fn display_track(track: &TrackReport) {
    println!("  Track {}", track.index);
    println!("    Track id / number       {} / {}", track.track_id, track.track_number);
    println!("    Essence                 {} ({} wrapped)", track.essence, track.wrapping);
    println!("    Frame size              {}", track.frame_size);
    println!("    Edit rate               {}", track.edit_rate);
    println!("    Duration                {}", track.duration);
    println!("    Body / index SID        {} / {}", track.body_sid, track.index_sid);

    if let Some(picture) = &track.picture {
        println!("    Stored size             {}", picture.stored);
        println!("    Display area            {}", picture.display);
        println!("    Subsampling             {}", picture.subsampling);
        println!("    Component depth         {}", picture.component_depth);
        if let Some(aspect) = &picture.aspect_ratio {
            println!("    Aspect ratio            {aspect}");
        }
    }
    if let Some(sound) = &track.sound {
        println!("    Sampling rate           {}", sound.sampling_rate);
        println!("    Channels                {}", sound.channels);
        println!("    Bits per sample         {}", sound.bits_per_sample);
        println!("    Block align             {}", sound.block_align);
    }
    println!();
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
