//! Ingestion pipeline orchestration.
//!
//! Streams catalog records into the store in fixed-size batches and hands off
//! to the training lifecycle once the configured watermark is reached.
//! Malformed records are skipped; a failed remote write aborts the run,
//! because a partially inserted batch cannot be retried without risking
//! duplicate remote identifiers.
//!
//! The pipeline consumes its source once, in order. It is not restartable
//! mid-stream, but a run can be repeated from scratch with a different
//! `start_offset` to skip records already persisted while still advancing
//! the processed counter for every record read, so the watermark always
//! reflects total records seen, not records stored.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::CardRecord;
use crate::normalize;
use crate::progress::{IngestEvent, IngestProgressReporter};
use crate::store::{RecommendStore, StoreError};
use crate::training::{TrainingError, TrainingLifecycle};

/// Parameters of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    /// Processed count at which training triggers, at most once per run.
    pub training_watermark: Option<u64>,
    /// Records at or below this processed count are parsed but not persisted.
    pub start_offset: i64,
    pub poll_interval: Duration,
}

/// Counters accumulated over one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Records that normalized successfully, whether or not persisted.
    pub processed: u64,
    /// Records sent to the store.
    pub stored: u64,
    /// Records dropped by normalization.
    pub skipped: u64,
    /// Batches flushed.
    pub batches: u64,
    /// Whether the watermark handoff ran.
    pub trained: bool,
}

/// Fatal ingestion outcomes. Skipped records are not errors.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("batch write to recommendation store failed: {0}")]
    RemoteWrite(#[from] StoreError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error("failed to read catalog source: {0}")]
    Source(#[from] io::Error),
}

/// Open a catalog file as a lazy line source for [`run_ingest`].
pub fn catalog_lines(path: &Path) -> io::Result<impl Iterator<Item = io::Result<String>>> {
    Ok(BufReader::new(File::open(path)?).lines())
}

/// Run one ingestion pass over `source`.
///
/// Each line is parsed as JSON and normalized; failures of either step are
/// logged and skipped without advancing the processed counter. In-scope
/// records are buffered and flushed in `batch_size` batches; the partial
/// buffer is always flushed at stream end. Reaching the watermark flushes
/// any pending partial batch first, then runs training synchronously before
/// further records are consumed; ingestion and training do not interleave.
///
/// The reporter is advisory: each flush and the training handoff are
/// reported, and reporters cannot fail.
pub async fn run_ingest<I>(
    store: &dyn RecommendStore,
    source: I,
    opts: &IngestOptions,
    reporter: &dyn IngestProgressReporter,
) -> Result<IngestReport, IngestError>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let mut report = IngestReport::default();
    let mut buffer: Vec<CardRecord> = Vec::with_capacity(opts.batch_size);

    for line in source {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let raw: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "skipping undecodable catalog line");
                report.skipped += 1;
                continue;
            }
        };

        let card = match normalize::normalize(&raw) {
            Ok(card) => card,
            Err(e) => {
                warn!(error = %e, "skipping malformed catalog record");
                report.skipped += 1;
                continue;
            }
        };

        report.processed += 1;
        if report.processed as i64 > opts.start_offset {
            buffer.push(card);
        }

        if buffer.len() >= opts.batch_size {
            flush(store, &mut buffer, &mut report, reporter).await?;
        }

        // The fired-once guard (not an equality check) keeps a single run
        // from training twice even when counts land out of strict order.
        if let Some(watermark) = opts.training_watermark {
            if !report.trained && report.processed >= watermark {
                flush(store, &mut buffer, &mut report, reporter).await?;
                reporter.report(IngestEvent::TrainingStarted {
                    processed: report.processed,
                });

                let mut lifecycle = TrainingLifecycle::new(store);
                lifecycle.start().await?;
                lifecycle.await_completion(opts.poll_interval).await?;

                reporter.report(IngestEvent::TrainingFinished);
                report.trained = true;
            }
        }
    }

    flush(store, &mut buffer, &mut report, reporter).await?;
    Ok(report)
}

async fn flush(
    store: &dyn RecommendStore,
    buffer: &mut Vec<CardRecord>,
    report: &mut IngestReport,
    reporter: &dyn IngestProgressReporter,
) -> Result<(), IngestError> {
    if buffer.is_empty() {
        return Ok(());
    }

    store.add_items(buffer).await?;
    report.stored += buffer.len() as u64;
    report.batches += 1;
    buffer.clear();

    reporter.report(IngestEvent::BatchFlushed {
        processed: report.processed,
        stored: report.stored,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::store::testing::{FakeStore, Poll};
    use std::sync::atomic::Ordering;

    fn lines(records: &[String]) -> Vec<io::Result<String>> {
        records.iter().cloned().map(Ok).collect()
    }

    fn record(n: usize) -> String {
        format!(r#"{{"id": "card-{n:04}", "name": "Card {n}"}}"#)
    }

    fn options(batch_size: usize, watermark: Option<u64>, start_offset: i64) -> IngestOptions {
        IngestOptions {
            batch_size,
            training_watermark: watermark,
            start_offset,
            poll_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn counts_every_record_but_stores_past_the_offset() {
        let store = FakeStore::new();
        let source: Vec<String> = (1..=5).map(record).collect();

        let report = run_ingest(&store, lines(&source), &options(10, None, 2), &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.processed, 5);
        assert_eq!(report.stored, 3);
        let stored = store.items.lock().unwrap();
        assert_eq!(stored[0].card_id, "card-0003");
    }

    #[tokio::test]
    async fn offset_does_not_change_processed_total() {
        for offset in [-1, 0, 3, 100] {
            let store = FakeStore::new();
            let source: Vec<String> = (1..=7).map(record).collect();
            let report = run_ingest(
                &store,
                lines(&source),
                &options(3, None, offset),
                &NoProgress,
            )
            .await
            .unwrap();
            assert_eq!(report.processed, 7, "offset {offset}");
        }
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_without_counting() {
        let store = FakeStore::new();
        let source = vec![
            record(1),
            "{not json".to_string(),
            r#"{"name": "missing id"}"#.to_string(),
            String::new(),
            record(2),
        ];

        let report = run_ingest(&store, lines(&source), &options(10, None, 0), &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.stored, 2);
    }

    #[tokio::test]
    async fn remote_write_failure_aborts_the_run() {
        let store = FakeStore::new();
        store.fail_writes.store(true, Ordering::SeqCst);
        let source: Vec<String> = (1..=3).map(record).collect();

        let err = run_ingest(&store, lines(&source), &options(2, None, 0), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::RemoteWrite(_)));
    }

    #[tokio::test]
    async fn source_io_error_aborts_the_run() {
        let store = FakeStore::new();
        let source = vec![
            Ok(record(1)),
            Err(io::Error::new(io::ErrorKind::Other, "disk gone")),
        ];

        let err = run_ingest(&store, source, &options(10, None, 0), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Source(_)));
    }

    #[tokio::test]
    async fn batches_flush_at_size_and_at_stream_end() {
        let store = FakeStore::new();
        store.script_polls([Poll::Trained]);
        let source: Vec<String> = (1..=25).map(record).collect();

        let report = run_ingest(
            &store,
            lines(&source),
            &options(10, Some(20), -1),
            &NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(report.processed, 25);
        assert_eq!(report.stored, 25);
        assert_eq!(*store.batch_sizes.lock().unwrap(), vec![10, 10, 5]);
        assert!(report.trained);
        assert_eq!(store.train_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn watermark_off_batch_boundary_flushes_partial_first() {
        let store = FakeStore::new();
        store.script_polls([Poll::Trained]);
        let source: Vec<String> = (1..=7).map(record).collect();

        let report = run_ingest(
            &store,
            lines(&source),
            &options(10, Some(5), 0),
            &NoProgress,
        )
        .await
        .unwrap();

        // The pending partial batch lands before training, the remainder after.
        assert_eq!(*store.batch_sizes.lock().unwrap(), vec![5, 2]);
        assert_eq!(store.train_calls.load(Ordering::SeqCst), 1);
        assert!(report.trained);
    }

    #[tokio::test]
    async fn watermark_fires_exactly_once() {
        let store = FakeStore::new();
        store.script_polls([Poll::Trained]);
        let source: Vec<String> = (1..=12).map(record).collect();

        let report = run_ingest(&store, lines(&source), &options(3, Some(5), 0), &NoProgress)
            .await
            .unwrap();

        assert_eq!(store.train_calls.load(Ordering::SeqCst), 1);
        assert!(report.trained);
    }

    #[tokio::test]
    async fn no_watermark_means_no_training() {
        let store = FakeStore::new();
        let source: Vec<String> = (1..=4).map(record).collect();

        let report = run_ingest(&store, lines(&source), &options(2, None, 0), &NoProgress)
            .await
            .unwrap();

        assert_eq!(store.train_calls.load(Ordering::SeqCst), 0);
        assert!(!report.trained);
    }

    #[tokio::test]
    async fn training_failure_aborts_ingestion() {
        let store = FakeStore::new();
        store.script_polls([Poll::ErrorStatus("bad shard")]);
        let source: Vec<String> = (1..=6).map(record).collect();

        let err = run_ingest(&store, lines(&source), &options(2, Some(4), 0), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Training(_)));
    }
}
