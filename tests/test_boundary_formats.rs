//! File-format round trip: track and diurnal inputs through the pipeline
//! to the segmented-track, tie, and correction-table outputs.

use chrono::{DateTime, Utc};
use seamag::core::{PipelineParams, ReferenceField, SegmenterParams, SensorOffsetParams};
use seamag::io;
use seamag::LevelingPipeline;
use std::fmt::Write as _;
use std::fs;
use std::sync::Arc;

struct ConstantField;

impl ReferenceField for ConstantField {
    fn total_field(&self, _lat: f64, _lon: f64, _elev: f64, _time: DateTime<Utc>) -> f64 {
        46_000.0
    }
}

/// Two crossing survey lines as separate .trk files plus a covering
/// diurnal series, written under `dir`
fn write_inputs(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf, std::path::PathBuf) {
    // 2024-06-10 00:00:00 UTC
    let t0: i64 = 1_717_977_600;

    let mut trk_a = String::new();
    for i in 0..40 {
        let f = i as f64 / 39.0;
        writeln!(
            trk_a,
            "{} {:.7} {:.7} {:.1}",
            t0 + 10 * i,
            139.0 + 0.1 * f,
            35.0,
            46_012.0
        )
        .unwrap();
    }
    let path_a = dir.join("a.trk");
    fs::write(&path_a, trk_a).unwrap();

    let mut trk_b = String::new();
    for i in 0..40 {
        let f = i as f64 / 39.0;
        writeln!(
            trk_b,
            "{} {:.7} {:.7} {:.1}",
            t0 + 1000 + 10 * i,
            139.05,
            34.95 + 0.1 * f,
            46_037.0
        )
        .unwrap();
    }
    let path_b = dir.join("b.trk");
    fs::write(&path_b, trk_b).unwrap();

    let mut obsc = String::new();
    for m in 0..60 {
        writeln!(obsc, "2024 6 10 0 {} 12.0", m).unwrap();
    }
    let path_dv = dir.join("station.obsc");
    fs::write(&path_dv, obsc).unwrap();

    (path_a, path_b, path_dv)
}

#[test]
fn test_trk_to_leveling_outputs() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let (path_a, path_b, path_dv) = write_inputs(dir.path());

    let track_a = io::read_track(&path_a, 1).expect("read a.trk");
    let track_b = io::read_track(&path_b, 2).expect("read b.trk");
    let series = Arc::new(io::read_diurnal_series(&path_dv).expect("read diurnal"));

    let pipeline = LevelingPipeline::new(PipelineParams {
        segmenter: SegmenterParams {
            epsilon: 0.005,
            min_segment_samples: 10,
        },
        sensor: SensorOffsetParams {
            layback_m: 0.0,
            bearing_offset_deg: 180.0,
            heading_steps: 3,
        },
        ..Default::default()
    });
    let report = pipeline
        .run(&[track_a, track_b], Arc::new(ConstantField), series)
        .expect("pipeline run");

    assert_eq!(report.ties.len(), 1);
    // reading - reference - diurnal: line a = 0, line b = 25
    assert!((report.ties[0].misfit - (0.0 - 25.0)).abs() < 1e-6);

    // Export everything a downstream gridding/reporting tool consumes
    let out = dir.path().join("out");
    let written = io::write_segments(&out, &report.segments).expect("write segments");
    assert_eq!(written.len(), report.segments.len());
    assert!(out.join("main_tracks").exists());

    let lwt = out.join("run.lwt");
    io::write_ties(&lwt, &report.ties).expect("write ties");
    let tie_line = fs::read_to_string(&lwt).unwrap();
    let fields: Vec<String> = tie_line.split_whitespace().map(str::to_string).collect();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0], report.ties[0].line_a.to_string());
    assert_eq!(fields[1], report.ties[0].line_b.to_string());

    let lncor = out.join("run.lncor");
    io::write_corrections(&lncor, &report.corrections).expect("write corrections");
    let table = fs::read_to_string(&lncor).unwrap();
    assert_eq!(table.lines().count(), report.corrections.len());

    // Leveled export: the biased line's exported anomalies sit at the
    // reference line's level
    let leveled = fs::read_to_string(
        out.join(format!("main_tracks/line{:02}.trk", report.ties[0].line_b)),
    )
    .unwrap();
    for line in leveled.lines() {
        let anomaly: f64 = line.split_whitespace().nth(4).unwrap().parse().unwrap();
        assert!(anomaly.abs() < 1e-6, "expected leveled anomaly ~0, got {anomaly}");
    }
}
