//! Ingest progress reporting.
//!
//! Reports observable progress during `seer ingest` so operators see batches
//! land and the training handoff happen. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts. Reporters are advisory and
//! infallible: a write error is discarded, never surfaced to the pipeline.

use std::io::Write;

/// A single progress event from the ingestion pipeline.
#[derive(Clone, Debug)]
pub enum IngestEvent {
    /// A batch was flushed to the store.
    BatchFlushed { processed: u64, stored: u64 },
    /// The watermark was reached and training is starting.
    TrainingStarted { processed: u64 },
    /// Training reached a successful terminal state; ingestion resumes.
    TrainingFinished,
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingestion pipeline.
    fn report(&self, event: IngestEvent);
}

/// Human-friendly progress on stderr: "ingest  flushed  2,000 processed / 2,000 stored".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::BatchFlushed { processed, stored } => {
                format!(
                    "ingest  flushed  {} processed / {} stored\n",
                    format_number(*processed),
                    format_number(*stored)
                )
            }
            IngestEvent::TrainingStarted { processed } => {
                format!(
                    "ingest  training at watermark ({} processed)...\n",
                    format_number(*processed)
                )
            }
            IngestEvent::TrainingFinished => "ingest  training complete\n".to_string(),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = match &event {
            IngestEvent::BatchFlushed { processed, stored } => serde_json::json!({
                "event": "progress",
                "phase": "flush",
                "processed": processed,
                "stored": stored,
            }),
            IngestEvent::TrainingStarted { processed } => serde_json::json!({
                "event": "progress",
                "phase": "training",
                "processed": processed,
            }),
            IngestEvent::TrainingFinished => serde_json::json!({
                "event": "progress",
                "phase": "trained",
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it to the pipeline.
    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
