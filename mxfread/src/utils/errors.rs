use crate::structs::metadata::{ItemId, Rational};
use crate::utils::ul::{InstanceUid, Ul, Umid};

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum KlvError {
    #[error("Unexpected end of file at offset {pos}: {wanted} more bytes needed")]
    UnexpectedEof { pos: u64, wanted: u64 },

    #[error("Seek to offset {pos} failed: {reason}")]
    SeekFailed { pos: u64, reason: String },

    #[error("Indefinite BER length is not supported")]
    IndefiniteLength,

    #[error("BER length of {0} bytes exceeds 8")]
    BerLengthTooLong(u8),

    #[error("Header partition pack not found within the run-in")]
    HeaderPartitionNotFound,

    #[error("Expected {expected}, found key {found}")]
    UnexpectedKey { expected: &'static str, found: Ul },

    #[error("Value of {len} bytes at offset {pos} exceeds the {remaining} bytes left")]
    LengthExceedsFile { pos: u64, len: u64, remaining: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum PartitionError {
    #[error("Partition pack too short: {0} bytes")]
    PackTooShort(usize),

    #[error("Invalid partition kind {0:#04X}")]
    InvalidKind(u8),

    #[error("Invalid essence container batch item length {0}")]
    InvalidBatchItemLength(u32),

    #[error("Essence container batch of {count} labels overruns the pack ({remaining} bytes left)")]
    BatchOverrun { count: u32, remaining: u64 },

    #[error("Invalid random index pack length {0}")]
    InvalidRipLength(usize),

    #[error("Random index pack offsets are not ascending")]
    RipNotAscending,
}

#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("Partition has no header metadata")]
    NoHeaderMetadata,

    #[error("Header metadata does not start with a primer pack: found {0}")]
    MissingPrimer(Ul),

    #[error("Invalid primer pack item length {0}")]
    InvalidPrimerItemLength(usize),

    #[error("Metadata set {0} overruns the header byte count")]
    SetOverrunsHeader(Ul),

    #[error("Truncated local set {0}")]
    TruncatedLocalSet(Ul),

    #[error("Invalid batch or array of {0} bytes")]
    InvalidBatch(usize),

    #[error("No metadata set with key {0}")]
    MissingSet(Ul),

    #[error("Set {set} has no item {item}")]
    MissingItem { set: Ul, item: ItemId },

    #[error("Item {item} has {found} bytes, expected {expected}")]
    InvalidItemLength {
        item: ItemId,
        expected: usize,
        found: usize,
    },

    #[error("Unresolved strong reference {0:02X?}")]
    UnresolvedReference(InstanceUid),

    #[error("Material track {0} source clip does not resolve to a file package track")]
    UnresolvedSourceClip(u32),

    #[error("No essence container data for package {0:?}")]
    MissingEssenceContainerData(Umid),

    #[error("No file descriptor for track {0}")]
    MissingTrackDescriptor(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("Index table item {tag} has invalid length {len}")]
    InvalidItemLength { tag: ItemId, len: usize },

    #[error("Invalid index entry array of {0} bytes")]
    InvalidArray(usize),

    #[error("Index entries of {len} bytes are shorter than {min_len}")]
    EntryTooShort { len: usize, min_len: usize },

    #[error("Index table segment starts at {found}, expected {expected}")]
    SegmentGap { expected: i64, found: i64 },

    #[error("Index table segment has {entries} entries for a duration of {duration}")]
    EntryCountMismatch { entries: usize, duration: i64 },

    #[error("Index stream offsets are not increasing")]
    OffsetsNotIncreasing,

    #[error("Random index pack does not start with the header partition")]
    RipWithoutHeader,

    #[error("Partition at offset {0} is not a footer partition")]
    NotAFooter(u64),

    #[error("Broken partition back link at offset {0}")]
    BrokenPartitionChain(u64),

    #[error("Frame {frame} is outside the indexed essence ({indexed} frames)")]
    PositionOutOfRange { frame: i64, indexed: i64 },

    #[error("Unexpected key {key} in essence at offset {pos}")]
    UnexpectedKey { pos: u64, key: Ul },
}

#[derive(thiserror::Error, Debug)]
pub enum TimecodeError {
    #[error("Invalid timecode string '{0}'")]
    InvalidString(String),

    #[error("Invalid BCD digit in {0:#04X}")]
    InvalidBcdDigit(u8),

    #[error("SMPTE 12M timecode needs 4 bytes, found {0}")]
    InsufficientData(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum SystemItemError {
    #[error("System metadata pack too short: {0} bytes")]
    PackTooShort(usize),

    #[error("Invalid system item timecode: {0}")]
    InvalidTimecode(String),

    #[error("CRC-32 element length {0} is not a multiple of 4")]
    InvalidCrc32Length(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum EssenceFormatError {
    #[error("Unsupported essence container label {0}")]
    UnsupportedLabel(Ul),

    #[error("Descriptor item {0} is missing, using the default")]
    MissingOptionalItem(ItemId),

    #[error("Invalid frame layout {0}")]
    InvalidFrameLayout(u8),

    #[error("Unknown resolution id {0}")]
    UnknownResolutionId(u32),

    #[error("Unsupported component depth {0}")]
    UnsupportedComponentDepth(u32),

    #[error("10-bit stored width {0} is not a multiple of 48")]
    UnalignedWidth(u32),

    #[error("Frame size {0} exceeds 32 bits")]
    FrameTooLarge(u64),

    #[error("Invalid audio sampling rate {0}")]
    InvalidSampleRate(Rational),

    #[error("No frame size cycle for {sample_rate} Hz audio at {frame_rate} fps")]
    UnsupportedSampleRate {
        sample_rate: Rational,
        frame_rate: Rational,
    },

    #[error("Sound descriptor has a zero block align")]
    ZeroBlockAlign,
}

#[derive(thiserror::Error, Debug)]
pub enum ReaderError {
    #[error("Unsupported operational pattern {0}")]
    UnsupportedOperationalPattern(Ul),

    #[error("No picture or sound tracks")]
    NoEssenceTracks,

    #[error("OP-Atom files must have exactly one track, found {0}")]
    OpAtomTrackCount(usize),

    #[error("Track {0} has a variable frame size, which frame wrapped OP-1A reading does not support")]
    VariableFrameSize(u32),

    #[error("Tracks are stored in more than one essence stream (body SIDs {first} and {other})")]
    MultipleBodyStreams { first: u32, other: u32 },

    #[error("No essence element found in body SID {0}")]
    EssenceNotFound(u32),

    #[error("Variable size essence needs an index table (index SID {0})")]
    MissingIndex(u32),

    #[error("Frame {frame} is out of range (duration {duration})")]
    FrameOutOfRange { frame: i64, duration: i64 },

    #[error("Cannot seek back to frame {frame} from frame {current} in a non-seekable file")]
    NotSeekable { frame: i64, current: i64 },

    #[error("Buffer for track {track} holds {found} bytes, {needed} needed")]
    BufferTooSmall {
        track: usize,
        needed: usize,
        found: usize,
    },

    #[error("CRC-32 mismatch in track {track}: expected {expected:#010X}, found {found:#010X}")]
    Crc32Mismatch { track: u32, expected: u32, found: u32 },

    #[error("Only audio-only clips can change frame rate")]
    FrameRateChangeNotAudioOnly,

    #[error("Invalid frame rate {0}")]
    InvalidFrameRate(Rational),

    #[error("Frame rate changes are not supported for this file")]
    FrameRateChangeUnsupported,

    #[error("No timecode of the requested kind")]
    TimecodeUnavailable,

    #[error("Timecode {0} not found")]
    TimecodeNotFound(String),

    #[error("Source timecode index {0} out of range")]
    SourceTimecodeIndex(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum Rdd6Error {
    #[error("No RDD-6 sync word found")]
    NoSync,

    #[error("Missing sync word {0:#06X}")]
    MissingSync(u16),

    #[error("Skipped {count} bytes before sync word {sync_word:#06X}")]
    SkippedBytes { count: usize, sync_word: u16 },

    #[error("Truncated {0}")]
    Truncated(&'static str),

    #[error("Data segment id 0 is reserved")]
    ReservedSegmentId,

    #[error("Invalid data segment payload size {0}")]
    InvalidPayloadSize(usize),

    #[error("Data segment {id} checksum mismatch: expected {expected:#04X}, found {found:#04X}")]
    ChecksumMismatch { id: u8, expected: u8, found: u8 },

    #[error("Expected data segment {expected}, found {found}")]
    SegmentIdMismatch { expected: u8, found: u8 },

    #[error("{payload} payload needs {needed} bits, {available} available")]
    InsufficientBits {
        payload: &'static str,
        needed: u64,
        available: u64,
    },

    #[error("{0} payload has out of range fields")]
    InvalidPayload(&'static str),

    #[error("{field} has {found} values, expected {expected}")]
    FieldCount {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Unknown program config {0}")]
    UnknownProgramConfig(u8),

    #[error("Data segment {0} carries no program id")]
    NoProgramId(u8),
}

#[derive(thiserror::Error, Debug)]
pub enum Rdd6XmlError {
    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Unexpected root element <{0}>")]
    UnexpectedRoot(String),

    #[error("<{parent}> has no <{name}> element")]
    MissingElement { parent: String, name: String },

    #[error("<{element}> has no {name} attribute")]
    MissingAttribute { element: String, name: String },

    #[error("Invalid value '{value}' in <{element}>")]
    InvalidValue { element: String, value: String },

    #[error("Invalid timecode '{0}'")]
    InvalidTimecode(String),

    #[error("Payload declares {declared} bytes, found {found}")]
    SizeMismatch { declared: usize, found: usize },

    #[error("Unknown {field} value {value}")]
    UnknownEnumValue { field: &'static str, value: u8 },

    #[error("Unknown {field} name '{name}'")]
    UnknownEnumName { field: &'static str, name: String },
}
