//! Plain-text checkpoint format.
//!
//! ```text
//! index, steps, peak
//! 1, 0, 1
//! 3, 7, 16
//! ```
//!
//! The header line is mandatory. Every following row is `key, steps, peak`
//! with `steps == -1` marking a diverged trajectory. Export writes one row per
//! odd key below `stop` in ascending order; load accepts any number of rows.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    errors::VerifyError,
    step_map::{StepMap, StepResult},
};

pub const CHECKPOINT_HEADER: &str = "index, steps, peak";

impl StepMap {
    /// Reads a checkpoint stream into the map, returning how many records were read.
    #[tracing::instrument(skip_all)]
    pub fn load<R: BufRead>(&mut self, reader: R) -> Result<usize, VerifyError> {
        let mut lines = reader.lines();

        let header = lines.next().ok_or(VerifyError::MissingHeader)??;
        if strip_cr(&header) != CHECKPOINT_HEADER {
            return Err(VerifyError::BadHeader { found: header });
        }

        let mut records = 0;
        for (idx, line) in lines.enumerate() {
            let line = line?;
            let row = line.trim();
            if row.is_empty() {
                continue;
            }
            // Header is line 1.
            let (key, result) = parse_record(row).map_err(|reason| VerifyError::MalformedRecord {
                line: idx + 2,
                content: row.to_string(),
                reason,
            })?;
            self.insert(key, result);
            records += 1;
        }

        debug!(records, entries = self.len(), "loaded checkpoint");
        Ok(records)
    }

    /// Writes the header and one record per odd key in `[1, stop)`.
    ///
    /// Every row is resolved and encoded before the first byte goes out, so a
    /// missing entry or an unencodable step count leaves `writer` untouched.
    #[tracing::instrument(skip(self, writer))]
    pub fn export<W: Write>(&self, writer: W, stop: u64) -> Result<usize, VerifyError> {
        for key in odd_keys(stop) {
            self.record(key)?;
        }

        let mut writer = BufWriter::new(writer);
        writeln!(writer, "{CHECKPOINT_HEADER}")?;
        let mut rows = 0;
        for key in odd_keys(stop) {
            let (steps, peak) = self.record(key)?;
            writeln!(writer, "{key}, {steps}, {peak}")?;
            rows += 1;
        }
        writer.flush()?;

        debug!(rows, "exported checkpoint");
        Ok(rows)
    }

    fn record(&self, key: u64) -> Result<(i64, u64), VerifyError> {
        let result = self.require(key)?;
        result.to_record().ok_or(VerifyError::StepCountOverflow {
            value: key,
            steps: result.steps().unwrap_or_default(),
        })
    }
}

fn odd_keys(stop: u64) -> impl Iterator<Item = u64> {
    (1..stop).step_by(2)
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn parse_record(row: &str) -> Result<(u64, StepResult), String> {
    let mut fields = row.split(',').map(str::trim);
    let (Some(key), Some(steps), Some(peak), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err("expected three comma-separated fields".to_string());
    };

    let key = key
        .parse::<u64>()
        .map_err(|e| format!("bad index {key:?}: {e}"))?;
    let steps = steps
        .parse::<i64>()
        .map_err(|e| format!("bad step count {steps:?}: {e}"))?;
    let peak = peak
        .parse::<u64>()
        .map_err(|e| format!("bad peak {peak:?}: {e}"))?;

    Ok((key, StepResult::from_record(steps, peak)?))
}

/// Loads a checkpoint file into a fresh [`StepMap`].
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<StepMap, VerifyError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(VerifyError::file(path))?;
    let mut step_map = StepMap::new();
    let records = step_map
        .load(BufReader::new(file))
        .map_err(|e| match e {
            VerifyError::Io(source) => VerifyError::File {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
    info!(path = %path.display(), records, "checkpoint loaded");
    Ok(step_map)
}

/// Exports `step_map` for every odd key below `stop` to `path`.
///
/// The rows go to a fresh temporary file next to `path` that is renamed over it
/// once fully written, so an interrupted save never leaves a truncated
/// checkpoint behind and never touches any other file in that directory.
pub fn save_checkpoint(
    step_map: &StepMap,
    path: impl AsRef<Path>,
    stop: u64,
) -> Result<usize, VerifyError> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(VerifyError::file(dir))?;
    let rows = step_map.export(tmp.as_file_mut(), stop)?;
    tmp.persist(path).map_err(|e| VerifyError::file(path)(e.error))?;

    info!(path = %path.display(), rows, "checkpoint saved");
    Ok(rows)
}
