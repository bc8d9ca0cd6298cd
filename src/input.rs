use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Result;
use mxfread::utils::klv::MxfFile;

/// Command line input, a file path or "-" for stdin.
pub struct InputReader {
    path: PathBuf,
    is_pipe: bool,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Self {
        let path = input_path.as_ref().to_path_buf();
        let is_pipe = path.as_os_str() == "-";
        Self { path, is_pipe }
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Opens the input for KLV access; stdin is read forward only.
    pub fn open_mxf(&self) -> Result<MxfFile> {
        if self.is_pipe {
            Ok(MxfFile::from_stream(io::stdin()))
        } else {
            MxfFile::open(&self.path)
        }
    }

    /// Reads the whole input, for small inputs such as a single RDD-6 frame.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        if self.is_pipe {
            let mut data = Vec::new();
            io::stdin().lock().read_to_end(&mut data)?;
            Ok(data)
        } else {
            Ok(fs::read(&self.path)?)
        }
    }
}
