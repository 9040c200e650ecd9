//! Conversion of stored analysis series into download formats.
//!
//! Series are stored as MessagePack (or JSON) arrays of records. Downloads
//! want JSON or CSV, so the stored file is decoded record by record into a
//! temporary file that the response then streams.

mod record;

pub use record::{Keypoints, PoseRecord, for_each_record};

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, warn};

use crate::artifact::{Artifact, ArtifactFormat};
use crate::utils::fs::{ensure_dir_all_sync_with_op, io_error};
use crate::{Error, Result};

/// Download encoding produced by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    pub fn artifact_format(self) -> ArtifactFormat {
        match self {
            OutputFormat::Json => ArtifactFormat::Json,
            OutputFormat::Csv => ArtifactFormat::Csv,
        }
    }
}

/// Write every record of a stored series as one JSON array.
///
/// Records are decoded into `serde_json::Value`, so any series shape works.
pub fn write_json<W: Write>(source: &Path, format: ArtifactFormat, out: W) -> Result<usize> {
    let mut out = BufWriter::new(out);
    out.write_all(b"[")?;
    let mut first = true;
    let count = for_each_record(source, format, |value: serde_json::Value| {
        if !first {
            out.write_all(b",")?;
        }
        first = false;
        serde_json::to_writer(&mut out, &value)?;
        Ok(())
    })?;
    out.write_all(b"]")?;
    out.flush()?;
    Ok(count)
}

/// Flatten a pose series into CSV.
///
/// Columns are `track_id, timestamp` followed by `{name}_x, {name}_y` for
/// every keypoint name seen in any record, in first-seen order. A record
/// lacking a keypoint gets empty fields for it. Reads the source twice.
pub fn write_csv<W: Write>(source: &Path, format: ArtifactFormat, out: W) -> Result<usize> {
    let mut names: Vec<String> = Vec::new();
    for_each_record(source, format, |record: PoseRecord| {
        for name in record.keypoints.names() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(())
    })?;

    let mut writer = csv::Writer::from_writer(out);
    let mut header = Vec::with_capacity(2 + names.len() * 2);
    header.push("track_id".to_string());
    header.push("timestamp".to_string());
    for name in &names {
        header.push(format!("{name}_x"));
        header.push(format!("{name}_y"));
    }
    writer.write_record(&header)?;

    let count = for_each_record(source, format, |record: PoseRecord| {
        let mut row = Vec::with_capacity(header.len());
        row.push(record.track_id.to_string());
        row.push(record.timestamp);
        for name in &names {
            match record.keypoints.get(name) {
                Some(point) => {
                    row.push(point.first().map(f64::to_string).unwrap_or_default());
                    row.push(point.get(1).map(f64::to_string).unwrap_or_default());
                }
                None => {
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        writer.write_record(&row)?;
        Ok(())
    })?;

    writer.flush()?;
    Ok(count)
}

/// Convert `artifact` into a temp file in `format`.
///
/// Runs on the blocking pool. On any failure the partial temp file is
/// removed before the error is returned; on success the caller owns the
/// returned path and the file is deleted when it is dropped.
pub async fn convert_to_temp(
    artifact: Artifact,
    format: OutputFormat,
    temp_dir: PathBuf,
) -> Result<TempPath> {
    tokio::task::spawn_blocking(move || convert_blocking(&artifact, format, &temp_dir))
        .await
        .map_err(|e| Error::Other(format!("conversion task failed: {e}")))?
}

fn convert_blocking(artifact: &Artifact, format: OutputFormat, temp_dir: &Path) -> Result<TempPath> {
    ensure_dir_all_sync_with_op("creating temp directory", temp_dir)?;
    let suffix = format!(".{}", format.artifact_format().extension());
    let temp: NamedTempFile = tempfile::Builder::new()
        .prefix("courtside-")
        .suffix(&suffix)
        .tempfile_in(temp_dir)
        .map_err(|e| io_error("creating temp file in", temp_dir, e))?;

    let result = match format {
        OutputFormat::Json => write_json(&artifact.path, artifact.format, temp.as_file()),
        OutputFormat::Csv => write_csv(&artifact.path, artifact.format, temp.as_file()),
    };

    match result {
        Ok(count) => {
            debug!(
                source = %artifact.path.display(),
                records = count,
                ?format,
                "Converted series"
            );
            Ok(temp.into_temp_path())
        }
        Err(e) => {
            warn!(source = %artifact.path.display(), error = %e, "Series conversion failed");
            Err(e)
        }
    }
}
