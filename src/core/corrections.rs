use crate::core::geodesy;
use crate::types::{MagError, MagResult, Sample, Segment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Black-box reference-field model (e.g. IGRF). The core only consumes the
/// total-field magnitude at a position and time; model evaluation lives
/// outside this crate.
pub trait ReferenceField: Send + Sync {
    /// Total-field magnitude in nT at the given position, elevation in
    /// meters above the reference surface, and time
    fn total_field(&self, lat: f64, lon: f64, elevation_m: f64, time: DateTime<Utc>) -> f64;
}

/// Fixed-station diurnal-variation reference series at 1-minute cadence
#[derive(Debug, Clone)]
pub struct DiurnalSeries {
    /// (time, delta-field nT), strictly increasing in time
    records: Vec<(DateTime<Utc>, f64)>,
}

impl DiurnalSeries {
    /// Build a series from time-sorted records.
    ///
    /// # Errors
    /// `MagError::InvalidFormat` if fewer than 2 records are supplied or
    /// timestamps are not strictly increasing.
    pub fn new(records: Vec<(DateTime<Utc>, f64)>) -> MagResult<Self> {
        if records.len() < 2 {
            return Err(MagError::InvalidFormat(format!(
                "diurnal series needs at least 2 records, got {}",
                records.len()
            )));
        }
        for w in records.windows(2) {
            if w[1].0 <= w[0].0 {
                return Err(MagError::InvalidFormat(format!(
                    "diurnal series timestamps not strictly increasing at {}",
                    w[1].0
                )));
            }
        }
        Ok(Self { records })
    }

    /// Interval covered by the series
    pub fn coverage(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.records[0].0, self.records[self.records.len() - 1].0)
    }

    /// Delta-field at `time`, linearly interpolated between the two
    /// bracketing minute records.
    ///
    /// # Errors
    /// `MagError::MissingReferenceData` if `time` falls outside coverage.
    pub fn value_at(&self, time: DateTime<Utc>) -> MagResult<f64> {
        let (start, end) = self.coverage();
        if time < start || time > end {
            return Err(MagError::MissingReferenceData(format!(
                "sample time {} outside diurnal coverage [{}, {}]",
                time, start, end
            )));
        }

        let idx = self.records.partition_point(|r| r.0 <= time);
        if idx == 0 {
            return Ok(self.records[0].1);
        }
        let (t0, v0) = self.records[idx - 1];
        if t0 == time || idx == self.records.len() {
            return Ok(v0);
        }
        let (t1, v1) = self.records[idx];
        let span = (t1 - t0).num_milliseconds() as f64;
        let frac = (time - t0).num_milliseconds() as f64 / span;
        Ok(v0 + frac * (v1 - v0))
    }
}

/// Per-sample context supplied by the chain to each correction
#[derive(Debug, Clone, Copy)]
pub struct SampleContext {
    /// Platform heading at this sample, degrees clockwise from north
    pub heading_deg: f64,
}

/// A pure per-sample transform. Corrections are stateless across samples
/// and strictly ordered within one sample.
pub trait Correction: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, sample: &Sample, ctx: &SampleContext) -> MagResult<Sample>;
}

/// Sensor lay-back geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorOffsetParams {
    /// Horizontal distance from the GPS antenna to the sensor, meters
    pub layback_m: f64,
    /// Offset bearing relative to the platform heading, degrees
    /// (180 = towed astern)
    pub bearing_offset_deg: f64,
    /// Number of samples ahead used to estimate the heading; larger values
    /// smooth noisy short-baseline directions
    pub heading_steps: usize,
}

impl Default for SensorOffsetParams {
    fn default() -> Self {
        Self {
            layback_m: 330.0,
            bearing_offset_deg: 180.0,
            heading_steps: 3,
        }
    }
}

/// Relocates each sample from the GPS antenna to the sensor's true
/// position by projecting the lay-back along the instantaneous heading.
/// Field values are untouched; position must be corrected before the
/// reference-field lookup depends on it.
pub struct SensorOffsetCorrection {
    params: SensorOffsetParams,
}

impl SensorOffsetCorrection {
    pub fn new(params: SensorOffsetParams) -> Self {
        Self { params }
    }
}

impl Correction for SensorOffsetCorrection {
    fn name(&self) -> &str {
        "sensor-offset"
    }

    fn apply(&self, sample: &Sample, ctx: &SampleContext) -> MagResult<Sample> {
        let bearing = (ctx.heading_deg + self.params.bearing_offset_deg).rem_euclid(360.0);
        let (lat, lon) = geodesy::destination(sample.lat, sample.lon, bearing, self.params.layback_m);
        Ok(Sample {
            lat,
            lon,
            ..sample.clone()
        })
    }
}

/// Subtracts the reference-field magnitude at the (corrected) position and
/// sample time, yielding the first-pass anomaly
pub struct ReferenceFieldCorrection {
    field: Arc<dyn ReferenceField>,
    /// Sensor elevation passed to the model, meters (0 at the sea surface)
    elevation_m: f64,
}

impl ReferenceFieldCorrection {
    pub fn new(field: Arc<dyn ReferenceField>, elevation_m: f64) -> Self {
        Self { field, elevation_m }
    }
}

impl Correction for ReferenceFieldCorrection {
    fn name(&self) -> &str {
        "reference-field"
    }

    fn apply(&self, sample: &Sample, _ctx: &SampleContext) -> MagResult<Sample> {
        let reference = self
            .field
            .total_field(sample.lat, sample.lon, self.elevation_m, sample.time);
        Ok(Sample {
            anomaly: Some(sample.total_field - reference),
            ..sample.clone()
        })
    }
}

/// Subtracts the time-interpolated fixed-station diurnal variation from
/// the anomaly
pub struct DiurnalCorrection {
    series: Arc<DiurnalSeries>,
}

impl DiurnalCorrection {
    pub fn new(series: Arc<DiurnalSeries>) -> Self {
        Self { series }
    }
}

impl Correction for DiurnalCorrection {
    fn name(&self) -> &str {
        "diurnal"
    }

    fn apply(&self, sample: &Sample, _ctx: &SampleContext) -> MagResult<Sample> {
        let anomaly = sample.anomaly.ok_or_else(|| {
            MagError::Processing(
                "diurnal correction requires the reference-field correction to run first".to_string(),
            )
        })?;
        let delta = self.series.value_at(sample.time)?;
        Ok(Sample {
            anomaly: Some(anomaly - delta),
            ..sample.clone()
        })
    }
}

/// Ordered chain of pure corrections applied to every sample of a segment
pub struct CorrectionChain {
    corrections: Vec<Box<dyn Correction>>,
    heading_steps: usize,
}

impl CorrectionChain {
    pub fn new(heading_steps: usize) -> Self {
        Self {
            corrections: Vec::new(),
            heading_steps: heading_steps.max(1),
        }
    }

    /// The fixed production chain: sensor offset, reference-field
    /// subtraction, diurnal removal, in that order
    pub fn standard(
        sensor: SensorOffsetParams,
        field: Arc<dyn ReferenceField>,
        series: Arc<DiurnalSeries>,
    ) -> Self {
        let heading_steps = sensor.heading_steps;
        let mut chain = Self::new(heading_steps);
        chain.push(Box::new(SensorOffsetCorrection::new(sensor)));
        chain.push(Box::new(ReferenceFieldCorrection::new(field, 0.0)));
        chain.push(Box::new(DiurnalCorrection::new(series)));
        chain
    }

    pub fn push(&mut self, correction: Box<dyn Correction>) {
        self.corrections.push(correction);
    }

    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    /// Apply the full chain to every sample of a segment, returning a new
    /// segment. The first failure aborts the segment (the caller decides
    /// whether to retain it unleveled).
    pub fn apply_segment(&self, segment: &Segment) -> MagResult<Segment> {
        let headings = self.headings(&segment.samples);
        let mut corrected = Vec::with_capacity(segment.samples.len());

        for (sample, &heading_deg) in segment.samples.iter().zip(headings.iter()) {
            let ctx = SampleContext { heading_deg };
            let mut current = sample.clone();
            for correction in &self.corrections {
                current = correction.apply(&current, &ctx).map_err(|e| match e {
                    MagError::MissingReferenceData(msg) => MagError::MissingReferenceData(format!(
                        "line {:02}, correction '{}': {}",
                        segment.line_id,
                        correction.name(),
                        msg
                    )),
                    other => other,
                })?;
            }
            corrected.push(current);
        }

        log::debug!(
            "line {:02}: applied {} correction(s) to {} samples",
            segment.line_id,
            self.corrections.len(),
            corrected.len()
        );

        Ok(Segment {
            samples: corrected,
            ..segment.clone()
        })
    }

    /// Per-sample heading estimated from the sample `heading_steps` ahead;
    /// trailing samples reuse the last available heading
    fn headings(&self, samples: &[Sample]) -> Vec<f64> {
        let n = samples.len();
        let mut headings = vec![0.0; n];
        let mut last = 0.0;
        for i in 0..n {
            let j = (i + self.heading_steps).min(n - 1);
            if j > i {
                last = geodesy::initial_bearing(
                    samples[i].lat,
                    samples[i].lon,
                    samples[j].lat,
                    samples[j].lon,
                );
            }
            headings[i] = last;
        }
        headings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SegmentKind;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    struct ConstantField(f64);

    impl ReferenceField for ConstantField {
        fn total_field(&self, _lat: f64, _lon: f64, _elev: f64, _time: DateTime<Utc>) -> f64 {
            self.0
        }
    }

    fn minute_series(start_secs: i64, minutes: usize, value: f64) -> DiurnalSeries {
        let records = (0..minutes)
            .map(|m| {
                (
                    Utc.timestamp_opt(start_secs + 60 * m as i64, 0).unwrap(),
                    value,
                )
            })
            .collect();
        DiurnalSeries::new(records).unwrap()
    }

    fn eastbound_segment(n: usize) -> Segment {
        let samples = (0..n)
            .map(|i| {
                Sample::new(
                    Utc.timestamp_opt(10 * i as i64, 0).unwrap(),
                    35.0,
                    139.0 + 0.001 * i as f64,
                    46_250.0,
                )
            })
            .collect();
        Segment {
            line_id: 3,
            cruise_id: 211,
            kind: SegmentKind::Line,
            samples,
        }
    }

    #[test]
    fn test_diurnal_interpolation_between_minutes() {
        let records = vec![
            (Utc.timestamp_opt(0, 0).unwrap(), 10.0),
            (Utc.timestamp_opt(60, 0).unwrap(), 20.0),
            (Utc.timestamp_opt(120, 0).unwrap(), 15.0),
        ];
        let series = DiurnalSeries::new(records).unwrap();
        assert_relative_eq!(series.value_at(Utc.timestamp_opt(30, 0).unwrap()).unwrap(), 15.0);
        assert_relative_eq!(series.value_at(Utc.timestamp_opt(60, 0).unwrap()).unwrap(), 20.0);
        assert_relative_eq!(series.value_at(Utc.timestamp_opt(90, 0).unwrap()).unwrap(), 17.5);
        assert_relative_eq!(series.value_at(Utc.timestamp_opt(120, 0).unwrap()).unwrap(), 15.0);
    }

    #[test]
    fn test_diurnal_outside_coverage_is_missing_data() {
        let series = minute_series(0, 3, 5.0);
        let late = Utc.timestamp_opt(3600, 0).unwrap();
        assert!(matches!(
            series.value_at(late),
            Err(MagError::MissingReferenceData(_))
        ));
    }

    #[test]
    fn test_sensor_offset_moves_position_astern() {
        // Towed astern on an eastbound track the sensor sits west of the antenna
        let segment = eastbound_segment(10);
        let chain = {
            let mut c = CorrectionChain::new(3);
            c.push(Box::new(SensorOffsetCorrection::new(SensorOffsetParams {
                layback_m: 300.0,
                bearing_offset_deg: 180.0,
                heading_steps: 3,
            })));
            c
        };
        let corrected = chain.apply_segment(&segment).unwrap();
        for (orig, moved) in segment.samples.iter().zip(corrected.samples.iter()) {
            assert!(moved.lon < orig.lon);
            let d = geodesy::haversine_distance(orig.lat, orig.lon, moved.lat, moved.lon);
            assert_relative_eq!(d, 300.0, max_relative = 1e-4);
            assert_eq!(moved.total_field, orig.total_field);
        }
    }

    #[test]
    fn test_chain_inverse_reconstructs_reading() {
        // Applying the chain and then adding back reference + diurnal must
        // reproduce the measured reading
        let segment = eastbound_segment(8);
        let reference = 46_100.0;
        let diurnal = 12.5;
        let field: Arc<dyn ReferenceField> = Arc::new(ConstantField(reference));
        let series = Arc::new(minute_series(0, 10, diurnal));
        let chain = CorrectionChain::standard(SensorOffsetParams::default(), field, series);

        let corrected = chain.apply_segment(&segment).unwrap();
        for (orig, cor) in segment.samples.iter().zip(corrected.samples.iter()) {
            let reconstructed = cor.anomaly.unwrap() + reference + diurnal;
            assert_relative_eq!(reconstructed, orig.total_field, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_chain_fails_outside_diurnal_coverage() {
        let segment = eastbound_segment(8);
        let field: Arc<dyn ReferenceField> = Arc::new(ConstantField(46_000.0));
        // Series starts an hour after the segment
        let series = Arc::new(minute_series(3600, 10, 1.0));
        let chain = CorrectionChain::standard(SensorOffsetParams::default(), field, series);
        assert!(matches!(
            chain.apply_segment(&segment),
            Err(MagError::MissingReferenceData(_))
        ));
    }

    #[test]
    fn test_diurnal_before_reference_is_an_error() {
        let segment = eastbound_segment(4);
        let series = Arc::new(minute_series(0, 10, 1.0));
        let mut chain = CorrectionChain::new(3);
        chain.push(Box::new(DiurnalCorrection::new(series)));
        assert!(matches!(
            chain.apply_segment(&segment),
            Err(MagError::Processing(_))
        ));
    }
}
