use crate::core::geodesy;
use crate::types::{Sample, Segment, SegmentKind, Tie};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters for crossover detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossoverParams {
    /// Sub-segment pairs whose direction cross product falls below this
    /// magnitude are treated as parallel/collinear and produce no tie
    pub parallel_epsilon: f64,
}

impl Default for CrossoverParams {
    fn default() -> Self {
        Self {
            parallel_epsilon: 1e-12,
        }
    }
}

/// Axis-aligned bounding box in lon/lat degrees
#[derive(Debug, Clone, Copy)]
struct Bbox {
    min_lon: f64,
    max_lon: f64,
    min_lat: f64,
    max_lat: f64,
}

impl Bbox {
    fn of_samples(samples: &[Sample]) -> Self {
        let mut bbox = Self {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for s in samples {
            bbox.min_lon = bbox.min_lon.min(s.lon);
            bbox.max_lon = bbox.max_lon.max(s.lon);
            bbox.min_lat = bbox.min_lat.min(s.lat);
            bbox.max_lat = bbox.max_lat.max(s.lat);
        }
        bbox
    }

    fn of_pair(a: &Sample, b: &Sample) -> Self {
        Self {
            min_lon: a.lon.min(b.lon),
            max_lon: a.lon.max(b.lon),
            min_lat: a.lat.min(b.lat),
            max_lat: a.lat.max(b.lat),
        }
    }

    fn intersects(&self, other: &Bbox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

/// Finds all geometric intersections between pairs of survey lines and
/// turns them into ties with interpolated per-line anomalies.
///
/// The pairwise search is O(S^2) in total sub-segment count; line-level and
/// sub-segment bounding-box rejection keeps it practical at cruise scale.
/// Line pairs are tested on parallel workers and merged into one tie set.
pub struct CrossoverDetector {
    params: CrossoverParams,
}

impl CrossoverDetector {
    pub fn new(params: CrossoverParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(CrossoverParams::default())
    }

    /// Detect every crossing between distinct retained lines. An empty
    /// result is a valid terminal state, not an error.
    pub fn detect(&self, segments: &[Segment]) -> Vec<Tie> {
        let lines: Vec<&Segment> = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Line && s.samples.len() >= 2)
            .collect();

        log::info!("crossover search over {} line(s)", lines.len());

        let bboxes: Vec<Bbox> = lines.iter().map(|l| Bbox::of_samples(&l.samples)).collect();
        let lengths: Vec<f64> = lines.iter().map(|l| geodesy::track_length(&l.samples)).collect();

        let mut pairs = Vec::new();
        for i in 0..lines.len() {
            for j in (i + 1)..lines.len() {
                if bboxes[i].intersects(&bboxes[j]) {
                    pairs.push((i, j));
                }
            }
        }
        log::debug!(
            "{} candidate pair(s) after bounding-box rejection",
            pairs.len()
        );

        let mut ties: Vec<Tie> = pairs
            .par_iter()
            .flat_map(|&(i, j)| {
                self.intersect_lines(lines[i], lines[j], lengths[i] + lengths[j])
            })
            .collect();

        // Normalize raw inverse-span weights into (0, 1]
        let max_raw = ties.iter().map(|t| t.weight).fold(0.0_f64, f64::max);
        if max_raw > 0.0 {
            for tie in &mut ties {
                tie.weight /= max_raw;
            }
        }

        log::info!("found {} crossover tie(s)", ties.len());
        ties
    }

    /// All intersections between two lines. The returned ties carry raw
    /// (unnormalized) inverse-span weights.
    fn intersect_lines(&self, a: &Segment, b: &Segment, combined_span_m: f64) -> Vec<Tie> {
        // Store smaller id first so the tie pair is canonical
        let (first, second) = if a.line_id <= b.line_id { (a, b) } else { (b, a) };

        let raw_weight = if combined_span_m > 0.0 {
            1.0 / combined_span_m
        } else {
            1.0
        };

        let mut ties = Vec::new();
        let last_a = first.samples.len() - 2;
        let last_b = second.samples.len() - 2;
        for (ia, sa) in first.samples.windows(2).enumerate() {
            let bbox_a = Bbox::of_pair(&sa[0], &sa[1]);
            for (ib, sb) in second.samples.windows(2).enumerate() {
                if !bbox_a.intersects(&Bbox::of_pair(&sb[0], &sb[1])) {
                    continue;
                }
                if let Some((t, u)) = self.segment_intersection(&sa[0], &sa[1], &sb[0], &sb[1]) {
                    // A crossing exactly on a shared sample point belongs
                    // to the next window; count it once
                    if (t >= 1.0 && ia < last_a) || (u >= 1.0 && ib < last_b) {
                        continue;
                    }
                    let (a0, a1, b0, b1) = match (sa[0].anomaly, sa[1].anomaly, sb[0].anomaly, sb[1].anomaly) {
                        (Some(a0), Some(a1), Some(b0), Some(b1)) => (a0, a1, b0, b1),
                        // No anomaly on a bracketing sample: no tie here
                        _ => continue,
                    };
                    let anomaly_a = a0 + t * (a1 - a0);
                    let anomaly_b = b0 + u * (b1 - b0);
                    let lon = sa[0].lon + t * (sa[1].lon - sa[0].lon);
                    let lat = sa[0].lat + t * (sa[1].lat - sa[0].lat);
                    ties.push(Tie {
                        line_a: first.line_id,
                        line_b: second.line_id,
                        lat,
                        lon,
                        anomaly_a,
                        anomaly_b,
                        misfit: anomaly_a - anomaly_b,
                        weight: raw_weight,
                    });
                }
            }
        }

        if !ties.is_empty() {
            log::debug!(
                "lines {:02} x {:02}: {} crossing(s)",
                first.line_id,
                second.line_id,
                ties.len()
            );
        }
        ties
    }

    /// Parametric 2-D intersection of sub-segments p0-p1 and q0-q1 in the
    /// lon/lat plane. Returns fractional positions (t, u) along each
    /// sub-segment, or None when they do not cross. Parallel and collinear
    /// pairs are treated as non-intersecting.
    fn segment_intersection(
        &self,
        p0: &Sample,
        p1: &Sample,
        q0: &Sample,
        q1: &Sample,
    ) -> Option<(f64, f64)> {
        let r = (p1.lon - p0.lon, p1.lat - p0.lat);
        let s = (q1.lon - q0.lon, q1.lat - q0.lat);

        let denom = cross(r, s);
        if denom.abs() < self.params.parallel_epsilon {
            return None;
        }

        let pq = (q0.lon - p0.lon, q0.lat - p0.lat);
        let t = cross(pq, s) / denom;
        let u = cross(pq, r) / denom;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            Some((t, u))
        } else {
            None
        }
    }
}

fn cross(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.0 * b.1 - a.1 * b.0
}
