use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, ExtractArgs};
use crate::input::InputReader;
use crate::timestamp::{duration_str, parse_rate};
use mxfread::process::reader::{FrameListener, MxfReader, ReadStatus, ReaderOptions};
use mxfread::structs::track::EssenceTrack;

/// Writes each accepted track's frames to its own file.
struct TrackWriters {
    writers: Vec<Option<BufWriter<File>>>,
    bytes: Vec<u64>,
}

impl TrackWriters {
    fn create(paths: &[Option<PathBuf>]) -> Result<Self> {
        let mut writers = Vec::with_capacity(paths.len());
        for path in paths {
            writers.push(match path {
                Some(path) => Some(BufWriter::new(File::create(path)?)),
                None => None,
            });
        }
        Ok(Self {
            bytes: vec![0; writers.len()],
            writers,
        })
    }

    fn finish(&mut self) -> Result<()> {
        for writer in self.writers.iter_mut().flatten() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl FrameListener for TrackWriters {
    fn accept_frame(&mut self, track: usize) -> bool {
        self.writers.get(track).is_some_and(Option::is_some)
    }

    fn receive_frame(&mut self, track: usize, buffer: Vec<u8>) -> Result<()> {
        let writer = self.writers[track]
            .as_mut()
            .ok_or_else(|| anyhow!("No output for track {track}"))?;
        writer.write_all(&buffer)?;
        self.bytes[track] += buffer.len() as u64;
        Ok(())
    }
}

fn track_path(output_dir: &Path, stem: &str, index: usize, track: &EssenceTrack) -> PathBuf {
    let ext = if track.is_sound() { "pcm" } else { "raw" };
    output_dir.join(format!("{stem}_track{index}.{ext}"))
}

fn create_progress_bar(multi: &MultiProgress, total_frames: Option<u64>) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_frames {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
        )?);
        pb
    };
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("reading essence");
    Ok(pb)
}

pub fn cmd_extract(args: &ExtractArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let input = InputReader::new(&args.input);
    let options = ReaderOptions {
        fail_level: cli.fail_level(),
        check_crc32: args.check_crc,
    };
    let mut reader = MxfReader::with_options(input.open_mxf()?, options)?;

    if let Some(text) = &args.frame_rate {
        let rate = parse_rate(text).ok_or_else(|| anyhow!("Invalid frame rate '{text}'"))?;
        reader.set_frame_rate(rate)?;
        log::info!("Reading at {rate} fps");
    }

    let stem = match input.is_pipe() {
        true => "stdin".to_string(),
        false => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "essence".to_string()),
    };
    fs::create_dir_all(&args.output_dir)?;

    let mut paths = Vec::with_capacity(reader.num_tracks());
    for (index, track) in reader.clip().tracks.iter().enumerate() {
        let wanted = args.tracks.is_empty() || args.tracks.contains(&index);
        paths.push(wanted.then(|| track_path(&args.output_dir, &stem, index, track)));
    }
    for &index in &args.tracks {
        if index >= paths.len() {
            log::warn!("Ignoring track {index}, the clip has {} tracks", paths.len());
        }
    }
    let mut writers = TrackWriters::create(&paths)?;

    if args.start > 0 {
        reader.position_at_frame(args.start)?;
    }

    let duration = reader.duration();
    let remaining = (duration >= 0).then(|| (duration - args.start).max(0));
    let total = match (args.count, remaining) {
        (Some(count), Some(remaining)) => Some(count.min(remaining)),
        (count, remaining) => count.or(remaining),
    };
    log::info!(
        "Extracting {} frames from frame {} ({} tracks)",
        total.map_or("all".to_string(), |t| t.to_string()),
        args.start,
        paths.iter().flatten().count()
    );

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, total.map(|t| t as u64))?),
        None => None,
    };

    let mut frames = 0i64;
    while total.is_none_or(|t| frames < t) {
        if reader.read_next_frame(&mut writers)? == ReadStatus::EndOfEssence {
            break;
        }
        frames += 1;
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    writers.finish()?;

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    log::info!(
        "Read {frames} frames ({})",
        duration_str(frames, reader.frame_rate())
    );
    for (path, bytes) in paths.iter().zip(&writers.bytes) {
        if let Some(path) = path {
            log::info!("  {} ({bytes} bytes)", path.display());
        }
    }

    Ok(())
}
