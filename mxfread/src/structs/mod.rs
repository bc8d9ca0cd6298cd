//! Data structures representing MXF and RDD-6 components.
//!
//! Contains partition packs, header metadata sets, index table segments,
//! system items, timecodes, the clip and track descriptions produced from
//! header metadata, and the RDD-6 frame model.

pub mod index_table;
pub mod metadata;
pub mod partition;
pub mod rdd6;
pub mod system_item;
pub mod timecode;
pub mod track;

#[cfg(test)]
pub mod testutil;
