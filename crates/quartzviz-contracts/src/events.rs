use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    TextToImage,
    ImageToImage,
}

/// Orchestrator states, in the order a successful run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStage {
    Start,
    ValidatingInput,
    Uploading,
    Compiling,
    Submitting,
    Polling,
    Materializing,
    Done,
    Failed,
}

impl FlowStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub flow: FlowKind,
    pub stage: FlowStage,
    pub percent: u8,
    pub message: String,
}

/// Receiver side of orchestrator progress. Implementations must not block for long.
pub trait ProgressSink {
    fn emit(&self, event: ProgressEvent);
}

impl ProgressSink for Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.send(event);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardProgress;

impl ProgressSink for DiscardProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Append-only `events.jsonl` log: one compact object per line, stamped with
/// `type`, `run_id` and `ts` ahead of the event's own fields.
#[derive(Debug)]
pub struct EventWriter {
    path: PathBuf,
    run_id: String,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct LogLine<'a, T: Serialize> {
    #[serde(rename = "type")]
    event_type: &'a str,
    run_id: &'a str,
    ts: String,
    #[serde(flatten)]
    body: &'a T,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            run_id: run_id.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn emit<T: Serialize>(&self, event_type: &str, body: &T) -> anyhow::Result<Value> {
        let line = serde_json::to_value(LogLine {
            event_type,
            run_id: &self.run_id,
            ts: now_utc_iso(),
            body,
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(line)
    }

    /// Records one orchestrator transition as a `flow_progress` line.
    pub fn record(&self, progress: &ProgressEvent) -> anyhow::Result<Value> {
        self.emit("flow_progress", progress)
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use chrono::DateTime;

    use super::*;

    fn progress(stage: FlowStage, percent: u8) -> ProgressEvent {
        ProgressEvent {
            flow: FlowKind::ImageToImage,
            stage,
            percent,
            message: "Uploading source image".to_string(),
        }
    }

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "run-123");

        let mut payload = EventPayload::new();
        payload.insert("out_dir".to_string(), Value::String("/tmp/run".to_string()));
        let emitted = writer.emit("run_started", &payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("run_started".to_string()));
        assert_eq!(parsed["run_id"], Value::String("run-123".to_string()));
        assert_eq!(parsed["out_dir"], Value::String("/tmp/run".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn record_flattens_progress_fields() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "run-9");

        writer.record(&progress(FlowStage::Uploading, 20))?;
        writer.record(&progress(FlowStage::Failed, 20))?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0])?;
        assert_eq!(first["type"], Value::String("flow_progress".to_string()));
        assert_eq!(first["flow"], Value::String("image_to_image".to_string()));
        assert_eq!(first["stage"], Value::String("UPLOADING".to_string()));
        assert_eq!(first["percent"], Value::from(20));
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(second["stage"], Value::String("FAILED".to_string()));
        Ok(())
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        tx.emit(progress(FlowStage::Start, 0));
        assert_eq!(rx.recv().map(|event| event.stage), Ok(FlowStage::Start));
        drop(rx);
        tx.emit(progress(FlowStage::Done, 100));
    }

    #[test]
    fn terminal_stages() {
        assert!(FlowStage::Done.is_terminal());
        assert!(FlowStage::Failed.is_terminal());
        assert!(!FlowStage::Polling.is_terminal());
    }
}
