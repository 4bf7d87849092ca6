//! Table persistence (Arrow/CSV/Parquet)
//!
//! Records are converted to Arrow `RecordBatch`es and written as CSV or
//! Parquet. Every write is staged: the data goes to `<path>.tmp` first and is
//! renamed over `<path>` only once it is complete and flushed. A crash or an
//! error mid-write therefore never damages a previous good file, and the
//! staging file is left behind for inspection.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregatedRecord, AveragedRecord};
use crate::{Error, Result};

/// Suffix of staging files.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Persisted table format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    /// Comma separated values with a header row
    #[default]
    Csv,
    /// Apache Parquet
    Parquet,
}

impl TableFormat {
    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

/// `<path>.tmp`.
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// Delete a file, logging instead of failing.
///
/// A missing file is not worth a log line.
pub fn remove_best_effort(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "cleanup failed"),
    }
}

/// Schema of the long-form table.
#[must_use]
pub fn raw_schema() -> Schema {
    Schema::new(vec![
        Field::new("workload", DataType::Utf8, false),
        Field::new("variant", DataType::Utf8, false),
        Field::new("repeat", DataType::UInt32, false),
        Field::new("invocation", DataType::UInt32, false),
        Field::new("value", DataType::Float64, false),
    ])
}

/// Long-form table: one row per (variant, repeat, invocation).
///
/// # Errors
///
/// Returns an Arrow error if the batch cannot be assembled.
pub fn raw_table(records: &[AggregatedRecord]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.workload.as_str()))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.variant.as_str()))),
        Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.repeat))),
        Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.invocation))),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.value))),
    ];
    Ok(RecordBatch::try_new(Arc::new(raw_schema()), columns)?)
}

/// Wide-form table: `workload, invocation, <variant>_mean…`.
///
/// Variant columns appear in first-seen order. Records from workloads that
/// did not measure a variant get nulls in its column, so tables of different
/// workloads concatenate cleanly.
///
/// # Errors
///
/// Returns an Arrow error if the batch cannot be assembled.
pub fn averaged_table(records: &[AveragedRecord]) -> Result<RecordBatch> {
    let mut variants: Vec<&str> = Vec::new();
    for record in records {
        for (label, _) in &record.means {
            if !variants.contains(&label.as_str()) {
                variants.push(label);
            }
        }
    }

    let mut fields = vec![
        Field::new("workload", DataType::Utf8, false),
        Field::new("invocation", DataType::UInt32, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.workload.as_str()))),
        Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.invocation))),
    ];
    for variant in variants {
        fields.push(Field::new(format!("{variant}_mean"), DataType::Float64, true));
        let values: Vec<Option<f64>> = records.iter().map(|r| r.mean(variant)).collect();
        columns.push(Arc::new(Float64Array::from(values)));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Writes tables and summaries with staged renames.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableWriter {
    format: TableFormat,
}

impl TableWriter {
    /// Writer producing `format` files.
    #[must_use]
    pub const fn new(format: TableFormat) -> Self {
        Self { format }
    }

    /// Format in use.
    #[must_use]
    pub const fn format(&self) -> TableFormat {
        self.format
    }

    /// `<dir>/<stem>.<ext>` for this writer's format.
    #[must_use]
    pub fn table_path(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{stem}.{}", self.format.extension()))
    }

    /// Write `batch` to `path` via its staging file.
    ///
    /// # Errors
    ///
    /// Returns the write error (the partial staging file stays), or
    /// [`Error::Persist`] when the final rename fails.
    pub fn write_atomic(&self, batch: &RecordBatch, path: &Path) -> Result<()> {
        let staged = prepare_staging(path)?;
        let file = File::create(&staged)?;
        match self.format {
            TableFormat::Csv => {
                let mut writer = arrow::csv::Writer::new(BufWriter::new(file));
                writer.write(batch)?;
                let mut buffered = writer.into_inner();
                buffered.flush()?;
                buffered.get_ref().sync_all()?;
            }
            TableFormat::Parquet => {
                let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
                writer.write(batch)?;
                let file = writer.into_inner()?;
                file.sync_all()?;
            }
        }
        commit(&staged, path)?;
        tracing::debug!(path = %path.display(), rows = batch.num_rows(), "table written");
        Ok(())
    }

    /// Write `value` as pretty JSON to `path` via its staging file.
    ///
    /// # Errors
    ///
    /// Same as [`TableWriter::write_atomic`].
    pub fn write_json_atomic<T: Serialize>(&self, value: &T, path: &Path) -> Result<()> {
        let staged = prepare_staging(path)?;
        let mut writer = BufWriter::new(File::create(&staged)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        commit(&staged, path)
    }
}

fn prepare_staging(path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(staging_path(path))
}

fn commit(staged: &Path, path: &Path) -> Result<()> {
    std::fs::rename(staged, path).map_err(|source| Error::Persist {
        staged: staged.to_path_buf(),
        source,
    })
}

/// Load every batch of a Parquet file.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Vec<RecordBatch>> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let file = File::open(path.as_ref())
        .map_err(|e| Error::Storage(format!("Failed to open Parquet file: {e}")))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::Storage(format!("Failed to parse Parquet file: {e}")))?
        .build()
        .map_err(|e| Error::Storage(format!("Failed to create Parquet reader: {e}")))?;

    reader
        .map(|batch| batch.map_err(|e| Error::Storage(format!("Failed to read record batch: {e}"))))
        .collect()
}

/// Group averaged records by workload.
///
/// Groups come out in the order their workloads first appear (batch order),
/// rows keep their relative order.
#[must_use]
pub fn group_by_workload(records: &[AveragedRecord]) -> Vec<(&str, Vec<&AveragedRecord>)> {
    let mut groups: Vec<(&str, Vec<&AveragedRecord>)> = Vec::new();
    for record in records {
        let name = record.workload.as_str();
        match groups.iter_mut().find(|(workload, _)| *workload == name) {
            Some((_, rows)) => rows.push(record),
            None => groups.push((name, vec![record])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn raw_records() -> Vec<AggregatedRecord> {
        (0..3)
            .map(|i| AggregatedRecord {
                workload: "w".to_string(),
                variant: "baseline".to_string(),
                repeat: 0,
                invocation: i + 1,
                value: f64::from(i) * 10.0,
            })
            .collect()
    }

    fn averaged(workload: &str, means: &[(&str, f64)]) -> AveragedRecord {
        AveragedRecord {
            workload: workload.to_string(),
            invocation: 1,
            means: means.iter().map(|(l, m)| ((*l).to_string(), *m)).collect(),
        }
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(staging_path(Path::new("/out/w_raw.csv")), PathBuf::from("/out/w_raw.csv.tmp"));
    }

    #[test]
    fn test_raw_table_shape() {
        let batch = raw_table(&raw_records()).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 5);
        assert_eq!(batch.schema().field(4).name(), "value");
    }

    #[test]
    fn test_averaged_table_union_of_variants() {
        let records = vec![
            averaged("a", &[("baseline", 10.0), ("replay", 4.0)]),
            averaged("b", &[("baseline", 12.0)]),
        ];
        let batch = averaged_table(&records).unwrap();
        let schema = batch.schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["workload", "invocation", "baseline_mean", "replay_mean"]);

        let replay = batch.column(3).as_any().downcast_ref::<Float64Array>().unwrap();
        assert!((replay.value(0) - 4.0).abs() < f64::EPSILON);
        assert!(replay.is_null(1));
    }

    #[test]
    fn test_write_csv_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("w_raw.csv");
        let writer = TableWriter::new(TableFormat::Csv);

        writer.write_atomic(&raw_table(&raw_records()).unwrap(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("workload,variant,repeat,invocation,value"));
        assert_eq!(lines.count(), 3);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_write_parquet_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TableWriter::new(TableFormat::Parquet);
        let path = writer.table_path(dir.path(), "w_raw");
        assert!(path.ends_with("w_raw.parquet"));

        writer.write_atomic(&raw_table(&raw_records()).unwrap(), &path).unwrap();

        let batches = load_parquet(&path).unwrap();
        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 3);
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w_raw.csv");
        std::fs::write(&path, "previous good output").unwrap();
        // A directory squatting on the staging path makes the write fail
        std::fs::create_dir(staging_path(&path)).unwrap();

        let writer = TableWriter::new(TableFormat::Csv);
        assert!(writer.write_atomic(&raw_table(&raw_records()).unwrap(), &path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous good output");
    }

    #[test]
    fn test_failed_rename_leaves_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w_raw.csv");
        // Renaming a file over a non-empty directory fails
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let writer = TableWriter::new(TableFormat::Csv);
        let err = writer.write_atomic(&raw_table(&raw_records()).unwrap(), &path).unwrap_err();
        assert!(matches!(err, Error::Persist { .. }));
        assert!(staging_path(&path).is_file());
    }

    #[test]
    fn test_write_json_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        TableWriter::default()
            .write_json_atomic(&serde_json::json!({"workload": "w"}), &path)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["workload"], "w");
    }

    #[test]
    fn test_remove_best_effort_missing_file() {
        remove_best_effort(Path::new("/nonexistent/cachebench/file"));
    }

    #[test]
    fn test_group_by_workload() {
        let records = vec![averaged("b", &[("x", 1.0)]), averaged("a", &[("x", 1.0)]), averaged("b", &[("x", 2.0)])];
        let groups = group_by_workload(&records);
        let names: Vec<&str> = groups.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[1].mean("x"), Some(2.0));
    }
}
