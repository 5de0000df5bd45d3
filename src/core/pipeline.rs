use crate::core::corrections::{CorrectionChain, DiurnalSeries, ReferenceField, SensorOffsetParams};
use crate::core::crossover::{CrossoverDetector, CrossoverParams};
use crate::core::geodesy;
use crate::core::leveler::{ComponentSolve, LeastSquaresLeveler, LevelerParams};
use crate::core::network::{ComponentDiagnostics, LevelingNetwork, NetworkParams};
use crate::core::segmenter::{SegmenterParams, TrackSegmenter};
use crate::types::{
    LineCorrections, LineId, MagError, MagResult, Segment, SegmentKind, SkipRecord, Tie, Track,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Complete configuration of one leveling run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineParams {
    pub segmenter: SegmenterParams,
    pub sensor: SensorOffsetParams,
    pub crossover: CrossoverParams,
    pub network: NetworkParams,
    pub leveler: LevelerParams,
}

/// Final artifact of a pipeline run. Every skipped or degraded line is
/// enumerated here; nothing is silently dropped.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// All segments, leveled where possible, in line-id order
    pub segments: Vec<Segment>,
    pub ties: Vec<Tie>,
    pub corrections: LineCorrections,
    pub component_solves: Vec<ComponentSolve>,
    pub network_diagnostics: Vec<ComponentDiagnostics>,
    pub skipped: Vec<SkipRecord>,
    /// Tracks that failed validation, with reasons; their samples produced
    /// no lines at all
    pub failed_tracks: Vec<(u32, String)>,
}

/// Batch pipeline: segmentation, correction chain, crossover detection,
/// network build, least-squares leveling.
///
/// Stages hand their outputs by value; per-track and per-segment work runs
/// on rayon workers, with the network build and solve after the join.
pub struct LevelingPipeline {
    params: PipelineParams,
}

impl LevelingPipeline {
    pub fn new(params: PipelineParams) -> Self {
        Self { params }
    }

    /// Run the full pipeline over a set of tracks.
    ///
    /// # Errors
    /// `MagError::InvalidTrack` only when every supplied track fails
    /// validation; any smaller failure is recorded in the report and the
    /// run continues.
    pub fn run(
        &self,
        tracks: &[Track],
        field: Arc<dyn ReferenceField>,
        diurnal: Arc<DiurnalSeries>,
    ) -> MagResult<RunReport> {
        if tracks.is_empty() {
            return Err(MagError::InvalidTrack("no tracks supplied".to_string()));
        }
        log::info!("leveling run over {} track(s)", tracks.len());

        let (segments, failed_tracks) = self.segment_all(tracks)?;
        let mut skipped = self.record_short_segments(&segments);

        let (segments, mut chain_skips) = self.apply_corrections(segments, field, diurnal);
        skipped.append(&mut chain_skips);

        let detector = CrossoverDetector::new(self.params.crossover.clone());
        let ties = detector.detect(&segments);

        let line_ids: Vec<LineId> = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Line)
            .map(|s| s.line_id)
            .collect();
        let line_lengths: HashMap<LineId, f64> = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Line)
            .map(|s| (s.line_id, geodesy::track_length(&s.samples)))
            .collect();

        let network = LevelingNetwork::build(ties.clone(), &line_ids, &self.params.network);
        let network_diagnostics = network.diagnostics.clone();

        let leveler = LeastSquaresLeveler::new(self.params.leveler.clone());
        let mut solution = leveler.solve(&network, &line_lengths);

        // Attach timestamp ranges to the leveler's skip records
        let spans: HashMap<LineId, _> = segments
            .iter()
            .map(|s| (s.line_id, s.time_span()))
            .collect();
        for record in &mut solution.skipped {
            if let Some(Some((start, end))) = spans.get(&record.line_id) {
                record.start_time = Some(*start);
                record.end_time = Some(*end);
            }
        }
        skipped.append(&mut solution.skipped);

        let segments = apply_line_corrections(segments, &solution.corrections);

        for record in &skipped {
            log::info!(
                "skipped/unleveled line {:02}: {}",
                record.line_id,
                record.reason
            );
        }
        log::info!(
            "run complete: {} segment(s), {} tie(s), {} skip record(s)",
            segments.len(),
            ties.len(),
            skipped.len()
        );

        Ok(RunReport {
            segments,
            ties,
            corrections: solution.corrections,
            component_solves: solution.component_solves,
            network_diagnostics,
            skipped,
            failed_tracks,
        })
    }

    /// Segment every track; tracks are independent, so they run on
    /// parallel workers with line ids renumbered afterwards
    fn segment_all(&self, tracks: &[Track]) -> MagResult<(Vec<Segment>, Vec<(u32, String)>)> {
        let segmenter = TrackSegmenter::new(self.params.segmenter.clone());

        let results: Vec<(u32, MagResult<Vec<Segment>>)> = tracks
            .par_iter()
            .map(|track| (track.cruise_id, segmenter.segment_track(track, 0)))
            .collect();

        let mut segments = Vec::new();
        let mut failed_tracks = Vec::new();
        let mut next_id: LineId = 0;
        for (cruise_id, result) in results {
            match result {
                Ok(track_segments) => {
                    for mut segment in track_segments {
                        segment.line_id = next_id;
                        next_id += 1;
                        segments.push(segment);
                    }
                }
                Err(e) => {
                    log::error!("cruise {}: track rejected: {}", cruise_id, e);
                    failed_tracks.push((cruise_id, e.to_string()));
                }
            }
        }

        if segments.is_empty() {
            return Err(MagError::InvalidTrack(format!(
                "all {} track(s) failed validation",
                tracks.len()
            )));
        }
        Ok((segments, failed_tracks))
    }

    fn record_short_segments(&self, segments: &[Segment]) -> Vec<SkipRecord> {
        segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Skipped)
            .map(|s| {
                let span = s.time_span();
                SkipRecord {
                    line_id: s.line_id,
                    reason: format!(
                        "segment too short for leveling ({} samples < {})",
                        s.samples.len(),
                        self.params.segmenter.min_segment_samples
                    ),
                    start_time: span.map(|(a, _)| a),
                    end_time: span.map(|(_, b)| b),
                }
            })
            .collect()
    }

    /// Apply the standard correction chain to every segment in parallel. A
    /// segment whose correction fails is retained uncorrected, demoted to
    /// skipped, and flagged.
    fn apply_corrections(
        &self,
        segments: Vec<Segment>,
        field: Arc<dyn ReferenceField>,
        diurnal: Arc<DiurnalSeries>,
    ) -> (Vec<Segment>, Vec<SkipRecord>) {
        let chain = CorrectionChain::standard(self.params.sensor.clone(), field, diurnal);

        let outcomes: Vec<(Segment, Option<SkipRecord>)> = segments
            .into_par_iter()
            .map(|segment| match chain.apply_segment(&segment) {
                Ok(corrected) => (corrected, None),
                Err(e) => {
                    let was_line = segment.kind == SegmentKind::Line;
                    let span = segment.time_span();
                    let record = was_line.then(|| SkipRecord {
                        line_id: segment.line_id,
                        reason: format!("correction chain failed: {}", e),
                        start_time: span.map(|(a, _)| a),
                        end_time: span.map(|(_, b)| b),
                    });
                    let demoted = Segment {
                        kind: SegmentKind::Skipped,
                        ..segment
                    };
                    (demoted, record)
                }
            })
            .collect();

        let mut corrected = Vec::with_capacity(outcomes.len());
        let mut skips = Vec::new();
        for (segment, record) in outcomes {
            if let Some(record) = record {
                log::warn!("line {:02}: {}", record.line_id, record.reason);
                skips.push(record);
            }
            corrected.push(segment);
        }
        (corrected, skips)
    }
}

/// Add each line's solved correction to every sample anomaly of that line
fn apply_line_corrections(segments: Vec<Segment>, corrections: &LineCorrections) -> Vec<Segment> {
    segments
        .into_iter()
        .map(|mut segment| {
            if segment.kind != SegmentKind::Line {
                return segment;
            }
            let c = corrections.get(&segment.line_id).copied().unwrap_or(0.0);
            if c != 0.0 {
                for sample in &mut segment.samples {
                    if let Some(anomaly) = sample.anomaly.as_mut() {
                        *anomaly += c;
                    }
                }
            }
            segment
        })
        .collect()
}
