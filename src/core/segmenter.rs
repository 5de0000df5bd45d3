use crate::core::geodesy;
use crate::types::{LineId, MagError, MagResult, Segment, SegmentKind, Track};
use serde::{Deserialize, Serialize};

/// Parameters for RDP-based track splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterParams {
    /// Simplification tolerance in degrees (perpendicular distance in
    /// lon/lat space)
    pub epsilon: f64,
    /// Segments with fewer samples than this are tagged skipped and do not
    /// participate in leveling
    pub min_segment_samples: usize,
}

impl Default for SegmenterParams {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            min_segment_samples: 10,
        }
    }
}

/// Splits a continuous GPS-magnetometer track into straight-line segments
/// using Ramer-Douglas-Peucker trajectory simplification.
///
/// Simplification only selects cut points; every sample of the input track
/// is retained and assigned to exactly one output segment.
pub struct TrackSegmenter {
    params: SegmenterParams,
}

impl TrackSegmenter {
    pub fn new(params: SegmenterParams) -> Self {
        Self { params }
    }

    /// Create a segmenter with standard parameters
    pub fn standard() -> Self {
        Self::new(SegmenterParams::default())
    }

    /// Split one track into segments. Line ids are assigned sequentially
    /// starting at `first_line_id`, one per emitted segment (skipped
    /// segments consume ids too, so the run report can name them).
    ///
    /// # Errors
    /// `MagError::InvalidTrack` if the track has fewer than 2 samples or
    /// non-monotonic timestamps.
    pub fn segment_track(&self, track: &Track, first_line_id: LineId) -> MagResult<Vec<Segment>> {
        track.validate()?;

        let points: Vec<(f64, f64)> = track.samples.iter().map(|s| (s.lon, s.lat)).collect();
        let cuts = rdp_cut_indices(&points, self.params.epsilon);

        log::debug!(
            "cruise {}: {} samples -> {} cut point(s)",
            track.cruise_id,
            points.len(),
            cuts.len()
        );

        // Half-open ranges between consecutive cut points partition the
        // original sample sequence exactly; the final range is closed on
        // the last sample.
        let mut boundaries = cuts;
        boundaries.push(points.len());

        let mut segments = Vec::new();
        let mut line_id = first_line_id;
        for w in boundaries.windows(2) {
            let (start, end) = (w[0], w[1]);
            if start >= end {
                continue;
            }
            let samples = track.samples[start..end].to_vec();
            let kind = if samples.len() >= self.params.min_segment_samples {
                SegmentKind::Line
            } else {
                SegmentKind::Skipped
            };
            let length_km = geodesy::track_length(&samples) / 1_000.0;
            log::info!(
                "cruise {}: line {:02} [{:?}] {} samples, {:.2} km",
                track.cruise_id,
                line_id,
                kind,
                samples.len(),
                length_km
            );
            segments.push(Segment {
                line_id,
                cruise_id: track.cruise_id,
                kind,
                samples,
            });
            line_id += 1;
        }

        if segments.is_empty() {
            return Err(MagError::InvalidTrack(format!(
                "cruise {}: segmentation produced no segments",
                track.cruise_id
            )));
        }

        Ok(segments)
    }
}

/// Indices of the RDP cut points for a polyline, in increasing order.
/// Always contains 0; contains the last index only when the track does not
/// collapse to a single straight run.
fn rdp_cut_indices(points: &[(f64, f64)], epsilon: f64) -> Vec<usize> {
    let mut cuts = vec![0];
    rdp_recurse(points, 0, points.len() - 1, epsilon, &mut cuts);
    cuts.sort_unstable();
    cuts.dedup();
    cuts
}

fn rdp_recurse(points: &[(f64, f64)], start: usize, end: usize, epsilon: f64, cuts: &mut Vec<usize>) {
    // Fewer than 3 points: nothing between the endpoints to test
    if end <= start + 1 {
        return;
    }

    let a = points[start];
    let b = points[end];
    let mut max_dist = f64::NEG_INFINITY;
    let mut max_idx = start + 1;
    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], a, b);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        rdp_recurse(points, start, max_idx, epsilon, cuts);
        cuts.push(max_idx);
        rdp_recurse(points, max_idx, end, epsilon, cuts);
    }
}

/// Perpendicular distance of `p` to the chord a-b in degree space. A
/// zero-length chord (duplicate endpoints) returns infinity so the caller
/// always splits there.
fn perpendicular_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return f64::INFINITY;
    }
    ((dy * p.0 - dx * p.1 + b.0 * a.1 - b.1 * a.0).abs()) / len_sq.sqrt()
}
