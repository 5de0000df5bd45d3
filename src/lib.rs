//! seamag: A Fast, Modular Marine Magnetometer Leveling Processor
//!
//! This library turns raw shipborne magnetometer tracks into a spatially
//! and temporally self-consistent magnetic-anomaly field: tracks are split
//! into straight survey lines, corrected for sensor lay-back, reference
//! field, and diurnal variation, and residual inter-line offsets are
//! removed by a weighted least-squares crossover adjustment.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    LineCorrections, LineId, MagError, MagResult, Sample, Segment, SegmentKind, SkipRecord, Tie,
    Track,
};

pub use crate::core::{
    CorrectionChain, CrossoverDetector, DiurnalSeries, LeastSquaresLeveler, LevelingNetwork,
    LevelingPipeline, PipelineParams, ReferenceField, ReferenceLinePolicy, RunReport,
    TrackSegmenter,
};
