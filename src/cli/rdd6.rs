use std::fs;

use anyhow::Result;
use indicatif::MultiProgress;

use super::command::{Cli, Rdd6Args};
use crate::input::InputReader;
use mxfread::process::rdd6::Rdd6Parser;
use mxfread::process::rdd6_xml::{frame_from_xml, frame_to_xml};

pub fn cmd_rdd6(args: &Rdd6Args, cli: &Cli, _multi: Option<&MultiProgress>) -> Result<()> {
    let data = InputReader::new(&args.input).read_all()?;
    let from_xml = args
        .input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));

    if from_xml {
        let frame = frame_from_xml(std::str::from_utf8(&data)?)?;
        let (bytes, first_len) = frame.construct()?;
        fs::write(&args.output, &bytes)?;
        log::info!(
            "Wrote {} bytes of RDD-6 to {} (second sub-frame at byte {first_len})",
            bytes.len(),
            args.output.display()
        );
    } else {
        let mut parser = Rdd6Parser::default();
        parser.set_fail_level(cli.fail_level());
        let frame = parser.parse(&data)?;
        let xml = frame_to_xml(&frame)?;
        fs::write(&args.output, xml)?;
        log::info!(
            "Wrote {} data segments as XML to {}",
            frame.segments().count(),
            args.output.display()
        );
    }

    Ok(())
}
