use crate::types::{LineCorrections, MagResult, Tie};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Write tie records for external reporting: `line_a line_b misfit weight`
/// per line, space-delimited.
pub fn write_ties<P: AsRef<Path>>(path: P, ties: &[Tie]) -> MagResult<()> {
    let path = path.as_ref();
    let mut file = fs::File::create(path)?;
    for tie in ties {
        writeln!(
            file,
            "{:4} {:4} {:8.2} {:10.5}",
            tie.line_a, tie.line_b, tie.misfit, tie.weight
        )?;
    }
    log::info!("wrote {} tie record(s) to {}", ties.len(), path.display());
    Ok(())
}

/// Write the per-line correction table, sorted by line id:
/// `line_id correction`.
pub fn write_corrections<P: AsRef<Path>>(path: P, corrections: &LineCorrections) -> MagResult<()> {
    let path = path.as_ref();
    let mut entries: Vec<_> = corrections.iter().collect();
    entries.sort_by_key(|(id, _)| **id);

    let mut file = fs::File::create(path)?;
    for (id, c) in entries {
        writeln!(file, "{:4} {:8.4}", id, c)?;
    }
    log::info!(
        "wrote correction table ({} line(s)) to {}",
        corrections.len(),
        path.display()
    );
    Ok(())
}
