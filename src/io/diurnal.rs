use crate::core::corrections::DiurnalSeries;
use crate::types::{MagError, MagResult};
use chrono::{TimeZone, Utc};
use std::fs;
use std::path::Path;

/// Read a fixed-station diurnal reference series: space-delimited,
/// headerless 1-minute records of `year month day hour minute delta`,
/// sorted by time.
pub fn read_diurnal_series<P: AsRef<Path>>(path: P) -> MagResult<DiurnalSeries> {
    let path = path.as_ref();
    log::info!("reading diurnal reference series: {}", path.display());

    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(MagError::InvalidFormat(format!(
                "{}:{}: expected 'year month day hour minute delta', got {} field(s)",
                path.display(),
                lineno + 1,
                fields.len()
            )));
        }

        let bad = |what: &str| {
            MagError::InvalidFormat(format!("{}:{}: invalid {}", path.display(), lineno + 1, what))
        };
        let year: i32 = fields[0].parse().map_err(|_| bad("year"))?;
        let month: u32 = fields[1].parse().map_err(|_| bad("month"))?;
        let day: u32 = fields[2].parse().map_err(|_| bad("day"))?;
        let hour: u32 = fields[3].parse().map_err(|_| bad("hour"))?;
        let minute: u32 = fields[4].parse().map_err(|_| bad("minute"))?;
        let delta: f64 = fields[5].parse().map_err(|_| bad("delta-field"))?;

        let time = Utc
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .ok_or_else(|| bad("date/time"))?;
        records.push((time, delta));
    }

    log::debug!("{}: {} minute record(s)", path.display(), records.len());
    DiurnalSeries::new(records)
}
