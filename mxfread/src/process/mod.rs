/// Essence container label dispatch.
///
/// Maps essence container labels and descriptors to an
/// [`EssenceFormat`](essence_format::EssenceFormat): kind, wrapping and frame size.
pub mod essence_format;

/// Frame-accurate content package index for OP-1A files.
///
/// Provides the seekable [`FileIndex`](file_index::FileIndex) and the forward
/// only [`NsFileIndex`](file_index::NsFileIndex).
pub mod file_index;

/// Header metadata to [`Clip`](crate::structs::track::Clip) resolution.
pub mod header;

pub mod op1a;
pub mod opatom;

/// The [`MxfReader`](reader::MxfReader) front end and the
/// [`FrameListener`](reader::FrameListener) delivery interface.
pub mod reader;

/// RDD-6 frame parsing into [`Rdd6Frame`](crate::structs::rdd6::frame::Rdd6Frame).
pub mod rdd6;

/// RDD-6 frames to and from XML.
pub mod rdd6_xml;
