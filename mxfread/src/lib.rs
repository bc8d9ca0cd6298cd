#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Reader for the essence of MXF (SMPTE 377) files and codec for SMPTE RDD 6
//! Dolby metadata frames.
//!
//! ### File Organization
//!
//! **Partitions**: A header partition with header metadata, optional body
//! partitions holding essence and index tables, and an optional footer. A
//! random index pack at the end of the file lists every partition.
//! **Header Metadata**: Local sets linked by strong references, from the
//! material package through the file package to the essence descriptors.
//!
//! ### Operational Patterns
//!
//! - OP-1A: frame wrapped content packages interleaving every track
//! - OP-Atom: a single clip wrapped track per file
//!
//! ### Growing and Streamed Files
//!
//! Files whose footer has not been written yet are indexed while reading, and
//! non-seekable input is read forward only.
//!
//! ## Quick Start
//!
//! 1. Open a file with [`process::reader::MxfReader`]
//! 2. Implement [`process::reader::FrameListener`] to receive frames
//! 3. Read frames in order, or position at a frame or timecode first
//!
//! ```rust,no_run
//! use mxfread::process::reader::{FrameListener, MxfReader, ReadStatus};
//!
//! struct Sizes;
//!
//! impl FrameListener for Sizes {
//!     fn receive_frame(&mut self, track: usize, buffer: Vec<u8>) -> anyhow::Result<()> {
//!         println!("track {track}: {} bytes", buffer.len());
//!         Ok(())
//!     }
//! }
//!
//! let mut reader = MxfReader::open("clip.mxf")?;
//! reader.position_at_frame(10)?;
//! while reader.read_next_frame(&mut Sizes)? == ReadStatus::Frame {}
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Processing functionality for MXF files and RDD-6 metadata.
///
/// 1. **Header Resolution** ([`process::header`]): Builds a clip description
///    from header metadata.
///
/// 2. **Indexing** ([`process::file_index`]): Locates content packages by
///    frame number.
///
/// 3. **Reading** ([`process::reader`]): Delivers essence frames per track.
///
/// 4. **RDD-6** ([`process::rdd6`], [`process::rdd6_xml`]): Frame parsing and
///    the XML bridge.
pub mod process;

/// Data structures representing MXF and RDD-6 components.
///
/// - **Partitions** ([`structs::partition`]): Partition packs and the random index pack
/// - **Header Metadata** ([`structs::metadata`]): Primer pack and local sets
/// - **Index Tables** ([`structs::index_table`]): Index table segments
/// - **System Items** ([`structs::system_item`]): Content package system metadata
/// - **Timecodes** ([`structs::timecode`]): SMPTE 12M timecodes
/// - **Tracks** ([`structs::track`]): Clip and essence track descriptions
/// - **RDD-6** ([`structs::rdd6`]): Frames, segments and typed payloads
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **KLV** ([`utils::klv`]): Key-length-value file access
/// - **Universal Labels** ([`utils::ul`]): Keys and labels
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading/writing
/// - **CRC Validation** ([`utils::crc`]): Essence element checksums
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
