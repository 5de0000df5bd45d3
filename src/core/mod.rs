//! Core magnetometer processing modules

pub mod corrections;
pub mod crossover;
pub mod geodesy;
pub mod leveler;
pub mod network;
pub mod pipeline;
pub mod segmenter;

// Re-export main types
pub use corrections::{
    Correction, CorrectionChain, DiurnalCorrection, DiurnalSeries, ReferenceField,
    ReferenceFieldCorrection, SampleContext, SensorOffsetCorrection, SensorOffsetParams,
};
pub use crossover::{CrossoverDetector, CrossoverParams};
pub use leveler::{
    ComponentSolve, LeastSquaresLeveler, LevelerParams, LevelingSolution, ReferenceLinePolicy,
};
pub use network::{ComponentDiagnostics, LevelingNetwork, NetworkParams};
pub use pipeline::{LevelingPipeline, PipelineParams, RunReport};
pub use segmenter::{SegmenterParams, TrackSegmenter};
