//! Append-only JSONL checkpoint log.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::IterationRecorder;
use crate::domain::{Metrics, Stage};
use crate::error::{ImprovrError, Result};

/// File name of the checkpoint log inside the record directory
pub const ITERATIONS_FILE: &str = "iterations.jsonl";

/// One durability checkpoint as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub loop_id: String,
    pub stage: Stage,
    pub metrics: Metrics,
    pub recorded_at: DateTime<Utc>,
}

/// Checkpoint recorder appending one JSON line per stage attempt
#[derive(Debug)]
pub struct JsonlRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRecorder {
    /// Open (creating if needed) the record directory
    pub fn new(record_dir: impl AsRef<Path>) -> Result<Self> {
        let record_dir = record_dir.as_ref();
        fs::create_dir_all(record_dir)?;
        Ok(Self {
            path: record_dir.join(ITERATIONS_FILE),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record to the JSONL file.
    pub fn append(&self, record: &IterationRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| ImprovrError::Storage(e.to_string()))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// All checkpoints recorded for a loop, oldest first
    pub fn load(&self, loop_id: &str) -> Result<Vec<IterationRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|r| r.loop_id == loop_id)
            .collect())
    }

    /// Every checkpoint in the file, oldest first
    pub fn load_all(&self) -> Result<Vec<IterationRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                ImprovrError::Storage(format!("{} line {}: {}", self.path.display(), index + 1, e))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl IterationRecorder for JsonlRecorder {
    async fn record_loop_iteration(&self, loop_id: &str, stage: Stage, metrics: &Metrics) -> Result<()> {
        let record = IterationRecord {
            loop_id: loop_id.to_string(),
            stage,
            metrics: metrics.clone(),
            recorded_at: Utc::now(),
        };
        self.append(&record)?;
        tracing::debug!(loop_id, %stage, path = %self.path.display(), "Checkpoint recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{QUALITY_SCORE, SIGNAL_COUNT};
    use tempfile::TempDir;

    fn metrics(name: &str, value: f64) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert(name.to_string(), value);
        metrics
    }

    #[tokio::test]
    async fn test_record_and_load() {
        let temp = TempDir::new().unwrap();
        let recorder = JsonlRecorder::new(temp.path()).unwrap();

        recorder
            .record_loop_iteration("loop-a", Stage::Collecting, &metrics(SIGNAL_COUNT, 120.0))
            .await
            .unwrap();
        recorder
            .record_loop_iteration("loop-a", Stage::Curating, &metrics(QUALITY_SCORE, 0.85))
            .await
            .unwrap();

        let records = recorder.load("loop-a").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].stage, Stage::Collecting);
        assert_eq!(records[1].metrics.get(QUALITY_SCORE), Some(&0.85));
    }

    #[tokio::test]
    async fn test_load_filters_by_loop() {
        let temp = TempDir::new().unwrap();
        let recorder = JsonlRecorder::new(temp.path()).unwrap();

        recorder
            .record_loop_iteration("loop-a", Stage::Collecting, &Metrics::new())
            .await
            .unwrap();
        recorder
            .record_loop_iteration("loop-b", Stage::Collecting, &Metrics::new())
            .await
            .unwrap();

        assert_eq!(recorder.load("loop-b").unwrap().len(), 1);
        assert_eq!(recorder.load_all().unwrap().len(), 2);
        assert!(recorder.load("loop-c").unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let recorder = JsonlRecorder::new(temp.path().join("nested")).unwrap();
        assert!(recorder.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let recorder = JsonlRecorder::new(temp.path()).unwrap();
            recorder
                .append(&IterationRecord {
                    loop_id: "loop-a".to_string(),
                    stage: Stage::Monitoring,
                    metrics: Metrics::new(),
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }

        let reopened = JsonlRecorder::new(temp.path()).unwrap();
        let records = reopened.load("loop-a").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage, Stage::Monitoring);
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let temp = TempDir::new().unwrap();
        let recorder = JsonlRecorder::new(temp.path()).unwrap();
        fs::write(recorder.path(), "{not json}\n").unwrap();

        let err = recorder.load_all().unwrap_err();
        assert!(matches!(err, ImprovrError::Storage(_)));
    }
}
