//! Utility functions and supporting infrastructure.
//!
//! Provides KLV file access, universal labels, bitstream I/O, CRC validation
//! and error handling shared by the readers and the RDD-6 codec.

pub mod bitstream_io;
pub mod crc;
pub mod errors;
pub mod klv;
pub mod ul;
