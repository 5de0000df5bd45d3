//! Boundary-format readers and writers.
//!
//! The heavy lifting of raw-log conversion belongs to external tooling;
//! this module only covers the formats the core exchanges with its
//! collaborators: post-ingestion track records, the fixed-station diurnal
//! series, segmented-track export, and the leveling network outputs.

pub mod diurnal;
pub mod leveling;
pub mod track;

pub use diurnal::read_diurnal_series;
pub use leveling::{write_corrections, write_ties};
pub use track::{read_track, write_segments};
