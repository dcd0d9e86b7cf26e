//! Streaming row reassembly with transport flow control.
//!
//! [`StreamingRowMerger`] is the single consumer of a scan stream. It
//! drains the handoff queue, folds row fragments into complete rows, and
//! keeps the transport fed with request credit through a pull callback so
//! responses keep flowing even while the consumer is blocked waiting.

use crate::core::completion::CancelToken;
use crate::core::config::ScanConfig;
use crate::core::error::ScanError;
use crate::scan::queue::{Popped, QueueEntry, ResponseFeeder, ResponseQueue};
use crate::scan::row::{Chunk, PartialRow, Row, ScanResponse};
use std::time::Duration;

/// Callback asking the transport for `n` more responses.
pub type PullFn = Box<dyn FnMut(usize) + Send>;

/// Single-consumer row reassembler over a scan stream.
///
/// The stream starts with `capacity_cap` responses of request credit
/// already issued toward the transport; the merger tops the credit up in
/// `pull_batch_size` increments whenever the outstanding count falls to
/// that threshold, and it does so before blocking so credit never runs
/// dry behind a stalled consumer.
pub struct StreamingRowMerger {
    queue: ResponseQueue,
    pull: PullFn,
    cancel: CancelToken,
    read_timeout: Duration,
    pull_batch_size: usize,
    /// Responses requested from the transport but not yet consumed here.
    outstanding_requests: usize,
    partial: Option<PartialRow>,
    complete_seen: bool,
}

impl StreamingRowMerger {
    /// `pull` is invoked with the number of additional responses to
    /// request; the initial `capacity_cap` credit is assumed to have been
    /// issued when the stream was opened.
    pub fn new(config: &ScanConfig, pull: impl FnMut(usize) + Send + 'static) -> Self {
        Self::with_cancel(config, pull, CancelToken::new())
    }

    pub fn with_cancel(
        config: &ScanConfig,
        pull: impl FnMut(usize) + Send + 'static,
        cancel: CancelToken,
    ) -> Self {
        Self {
            queue: ResponseQueue::new(config.capacity_cap),
            pull: Box::new(pull),
            cancel,
            read_timeout: config.read_timeout(),
            pull_batch_size: config.pull_batch_size,
            outstanding_requests: config.capacity_cap,
            partial: None,
            complete_seen: false,
        }
    }

    /// Producer handle for the transport thread.
    pub fn feeder(&self) -> ResponseFeeder {
        self.queue.feeder()
    }

    /// Token that interrupts a blocked read.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Entries buffered and not yet consumed, end-of-stream marker
    /// included.
    pub fn available(&self) -> usize {
        self.queue.available()
    }

    /// Return the next complete row, `Ok(None)` at end of stream, or the
    /// stream's failure.
    ///
    /// Once end of stream has been returned, every later call returns
    /// `Ok(None)` without touching the queue.
    pub fn get_next_merged_row(&mut self) -> Result<Option<Row>, ScanError> {
        loop {
            if self.complete_seen {
                return Ok(None);
            }
            match self.next_entry()? {
                QueueEntry::Response(response) => {
                    if let Some(row) = self.merge_response(response) {
                        return Ok(Some(row));
                    }
                }
                QueueEntry::Error(source) => {
                    return Err(ScanError::Stream { source });
                }
                QueueEntry::Complete => {
                    self.complete_seen = true;
                    if self.partial.take().is_some() {
                        return Err(ScanError::EndOfStreamMidRow);
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Pop the next entry within the read timeout, topping up request
    /// credit first so the transport keeps sending while we block.
    fn next_entry(&mut self) -> Result<QueueEntry, ScanError> {
        self.top_up_credit();
        match self.queue.pop(self.read_timeout, &self.cancel) {
            Popped::Entry(entry) => {
                self.outstanding_requests = self.outstanding_requests.saturating_sub(1);
                Ok(entry)
            }
            Popped::TimedOut => Err(ScanError::Timeout),
            Popped::Cancelled => Err(ScanError::Interrupted),
        }
    }

    fn top_up_credit(&mut self) {
        if self.complete_seen {
            return;
        }
        if self.outstanding_requests <= self.pull_batch_size {
            (self.pull)(self.pull_batch_size);
            self.outstanding_requests += self.pull_batch_size;
        }
    }

    /// Fold one response into the in-progress row. Returns a row when the
    /// response carries a commit marker.
    fn merge_response(&mut self, response: ScanResponse) -> Option<Row> {
        // Any response opens a row, chunks or not; a later bare commit
        // then yields an explicitly empty row.
        if self.partial.is_none() {
            self.partial = Some(PartialRow::new(response.row_key.clone()));
        }
        for chunk in response.chunks {
            match chunk {
                Chunk::Content(cell) => {
                    if let Some(partial) = self.partial.as_mut() {
                        partial.merge(cell);
                    }
                }
                Chunk::ResetRow => {
                    if let Some(partial) = self.partial.as_mut() {
                        partial.clear();
                    }
                }
                Chunk::CommitRow => {
                    let partial = self
                        .partial
                        .take()
                        .unwrap_or_else(|| PartialRow::new(response.row_key.clone()));
                    return Some(partial.into_row());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::row::CellChunk;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config() -> ScanConfig {
        ScanConfig {
            read_timeout_ms: 500,
            capacity_cap: 8,
            pull_batch_size: 4,
        }
    }

    fn content(family: &str, qualifier: &'static [u8], value: &'static [u8]) -> Chunk {
        Chunk::Content(CellChunk {
            family: family.to_string(),
            qualifier: Some(Bytes::from_static(qualifier)),
            timestamp_micros: 1,
            value: Bytes::from_static(value),
        })
    }

    fn merger() -> StreamingRowMerger {
        StreamingRowMerger::new(&config(), |_| {})
    }

    #[test]
    fn row_spanning_multiple_responses_merges_into_one() {
        let mut merger = merger();
        let feeder = merger.feeder();
        feeder.response(ScanResponse {
            row_key: Bytes::from_static(b"r1"),
            chunks: vec![content("f1", b"a", b"1")],
        });
        feeder.response(ScanResponse {
            row_key: Bytes::from_static(b"r1"),
            chunks: vec![content("f1", b"b", b"2"), Chunk::CommitRow],
        });
        feeder.complete();

        let row = merger.get_next_merged_row().unwrap().unwrap();
        assert_eq!(row.key, Bytes::from_static(b"r1"));
        assert_eq!(row.families.len(), 1);
        assert_eq!(row.families[0].columns.len(), 2);
        assert_eq!(merger.get_next_merged_row().unwrap(), None);
    }

    #[test]
    fn reset_discards_fragments_before_commit() {
        let mut merger = merger();
        let feeder = merger.feeder();
        feeder.response(ScanResponse {
            row_key: Bytes::from_static(b"r1"),
            chunks: vec![
                content("f1", b"a", b"old"),
                Chunk::ResetRow,
                content("f1", b"a", b"new"),
                Chunk::CommitRow,
            ],
        });

        let row = merger.get_next_merged_row().unwrap().unwrap();
        assert_eq!(row.families[0].columns[0].cells[0].value, Bytes::from_static(b"new"));
        assert_eq!(row.families[0].columns[0].cells.len(), 1);
    }

    #[test]
    fn bare_commit_yields_an_explicitly_empty_row() {
        let mut merger = merger();
        merger.feeder().response(ScanResponse {
            row_key: Bytes::from_static(b"r1"),
            chunks: vec![Chunk::CommitRow],
        });

        let row = merger.get_next_merged_row().unwrap().unwrap();
        assert_eq!(row.key, Bytes::from_static(b"r1"));
        assert!(row.families.is_empty());
    }

    #[test]
    fn end_of_stream_mid_row_is_a_protocol_error() {
        let mut merger = merger();
        let feeder = merger.feeder();
        feeder.response(ScanResponse {
            row_key: Bytes::from_static(b"r1"),
            chunks: vec![content("f1", b"a", b"1")],
        });
        feeder.complete();

        assert!(matches!(
            merger.get_next_merged_row(),
            Err(ScanError::EndOfStreamMidRow)
        ));
        // The stream is over regardless.
        assert_eq!(merger.get_next_merged_row().unwrap(), None);
    }

    #[test]
    fn stream_error_surfaces_to_the_caller() {
        use crate::core::error::{RpcError, StatusCode};
        let mut merger = merger();
        merger.feeder().error(RpcError {
            code: StatusCode::Unavailable,
            message: "connection reset".into(),
        });
        assert!(matches!(
            merger.get_next_merged_row(),
            Err(ScanError::Stream { .. })
        ));
    }

    #[test]
    fn empty_queue_times_out_with_a_scan_timeout() {
        let mut merger = merger();
        assert!(matches!(
            merger.get_next_merged_row(),
            Err(ScanError::Timeout)
        ));
    }

    #[test]
    fn cancellation_interrupts_a_blocked_read() {
        let mut merger = StreamingRowMerger::new(
            &ScanConfig {
                read_timeout_ms: 30_000,
                ..config()
            },
            |_| {},
        );
        let cancel = merger.cancel_token();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });
        assert!(matches!(
            merger.get_next_merged_row(),
            Err(ScanError::Interrupted)
        ));
    }

    #[test]
    fn credit_is_pulled_as_responses_are_consumed() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        // capacity 8, batch 4: credit starts at 8 and tops up once the
        // outstanding count drops to 4.
        let mut merger = StreamingRowMerger::new(&config(), move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
        });
        let feeder = merger.feeder();
        for _ in 0..5 {
            feeder.response(ScanResponse {
                row_key: Bytes::from_static(b"r"),
                chunks: vec![Chunk::CommitRow],
            });
        }
        for _ in 0..4 {
            merger.get_next_merged_row().unwrap().unwrap();
        }
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
        // Fifth consume sees outstanding at the threshold and pulls first.
        merger.get_next_merged_row().unwrap().unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn no_credit_pulled_after_end_of_stream() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let mut merger = StreamingRowMerger::new(
            &ScanConfig {
                capacity_cap: 2,
                pull_batch_size: 1,
                ..config()
            },
            move |n| {
                counter.fetch_add(n, Ordering::SeqCst);
            },
        );
        let feeder = merger.feeder();
        feeder.response(ScanResponse {
            row_key: Bytes::from_static(b"r"),
            chunks: vec![Chunk::CommitRow],
        });
        feeder.complete();
        merger.get_next_merged_row().unwrap().unwrap();
        assert_eq!(merger.get_next_merged_row().unwrap(), None);
        // Credit may have been pulled while draining, but never after the
        // end marker has been seen.
        let pulled_at_end = pulled.load(Ordering::SeqCst);
        assert_eq!(merger.get_next_merged_row().unwrap(), None);
        assert_eq!(merger.get_next_merged_row().unwrap(), None);
        assert_eq!(pulled.load(Ordering::SeqCst), pulled_at_end);
    }
}
