use crate::types::{MagError, MagResult, Sample, Segment, SegmentKind, Track};
use chrono::TimeZone;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Read one post-ingestion track file: whitespace-delimited records of
/// `unixtime lon lat total_field`, `#` comment lines skipped.
pub fn read_track<P: AsRef<Path>>(path: P, cruise_id: u32) -> MagResult<Track> {
    let path = path.as_ref();
    log::info!("reading track file: {}", path.display());

    let content = fs::read_to_string(path)?;
    let mut samples = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(MagError::InvalidFormat(format!(
                "{}:{}: expected 'unixtime lon lat field', got {} field(s)",
                path.display(),
                lineno + 1,
                fields.len()
            )));
        }
        let parse = |s: &str, name: &str| -> MagResult<f64> {
            s.parse::<f64>().map_err(|_| {
                MagError::InvalidFormat(format!(
                    "{}:{}: invalid {} '{}'",
                    path.display(),
                    lineno + 1,
                    name,
                    s
                ))
            })
        };
        let unixtime = parse(fields[0], "unixtime")?;
        let lon = parse(fields[1], "longitude")?;
        let lat = parse(fields[2], "latitude")?;
        let total_field = parse(fields[3], "total field")?;

        let time = Utc
            .timestamp_millis_opt((unixtime * 1_000.0).round() as i64)
            .single()
            .ok_or_else(|| {
                MagError::InvalidFormat(format!(
                    "{}:{}: unixtime {} out of range",
                    path.display(),
                    lineno + 1,
                    unixtime
                ))
            })?;
        samples.push(Sample::new(time, lat, lon, total_field));
    }

    log::debug!("{}: {} sample(s)", path.display(), samples.len());
    Ok(Track::new(cruise_id, samples))
}

/// Write segmented-track output for external gridding tools: one file per
/// segment under `main_tracks/` or `skipped_tracks/`, records of
/// `cruise_id unixtime lon lat anomaly`. Samples without an anomaly write
/// `nan`. Returns the written paths.
pub fn write_segments<P: AsRef<Path>>(dir: P, segments: &[Segment]) -> MagResult<Vec<PathBuf>> {
    let base = dir.as_ref();
    let main_dir = base.join("main_tracks");
    let skip_dir = base.join("skipped_tracks");
    fs::create_dir_all(&main_dir)?;
    fs::create_dir_all(&skip_dir)?;

    let mut written = Vec::with_capacity(segments.len());
    for segment in segments {
        let outdir = match segment.kind {
            SegmentKind::Line => &main_dir,
            SegmentKind::Skipped => &skip_dir,
        };
        let path = outdir.join(format!("line{:02}.trk", segment.line_id));
        let mut file = fs::File::create(&path)?;
        for s in &segment.samples {
            match s.anomaly {
                Some(anomaly) => writeln!(
                    file,
                    "{} {} {:.7} {:.7} {:8.2}",
                    segment.cruise_id,
                    s.time.timestamp(),
                    s.lon,
                    s.lat,
                    anomaly
                )?,
                None => writeln!(
                    file,
                    "{} {} {:.7} {:.7} nan",
                    segment.cruise_id,
                    s.time.timestamp(),
                    s.lon,
                    s.lat
                )?,
            }
        }
        log::debug!(
            "wrote {:?} segment line{:02} ({} samples)",
            segment.kind,
            segment.line_id,
            segment.samples.len()
        );
        written.push(path);
    }

    log::info!("wrote {} segment file(s) under {}", written.len(), base.display());
    Ok(written)
}
