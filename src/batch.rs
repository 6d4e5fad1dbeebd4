//! Runs one verb over many value maps with a bounded pool of workers.
//!
//! ```text
//! rows ──▶ producer ──(cap 1)──▶ worker × W ──(cap W)──▶ collector ──▶ sink
//!                                  │  retrier
//!                                  ▼
//!                             verb body
//! ```
//!
//! A failing row is logged and skipped, it never aborts the batch. No
//! ordering is kept between rows.

use crate::{
    error::{Error, Result},
    flags::ValueMap,
    output::Sink,
    retry::Retrier,
};
use async_scoped::TokioScope as Scope;
use camino::Utf8Path;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Mutex, Notify};

/// Default upper bound on workers
pub const MAX_THREADS: usize = 16;

/// Cooperative cancellation shared by producers, workers and traversals
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Picks the worker count: `requested <= 0` means the cap, and the result is
/// never above the number of rows (when known) nor below 1
pub fn thread_count(requested: i64, rows: Option<usize>, cap: usize) -> usize {
    let cap = cap.max(1);
    let wanted = if requested <= 0 {
        cap
    } else {
        usize::try_from(requested).unwrap_or(cap).min(cap)
    };

    rows.map_or(wanted, |rows| wanted.min(rows)).max(1)
}

/// How a batch CSV is laid out
#[derive(Clone, Copy, Debug)]
pub struct CsvLayout {
    pub delimiter: u8,
    pub skip_header: bool,
}

impl CsvLayout {
    pub fn new(delimiter: &str, skip_header: bool) -> Result<Self> {
        match delimiter.as_bytes() {
            [d] => Ok(Self {
                delimiter: *d,
                skip_header,
            }),
            _ => Err(Error::argument(format!(
                "--delimiter must be a single character, got {delimiter:?}"
            ))),
        }
    }
}

/// Reads every record of a batch file up front
pub fn read_csv(path: &Utf8Path, layout: CsvLayout) -> Result<Vec<csv::StringRecord>> {
    let file = std::fs::File::open(path)
        .map_err(|err| Error::argument(format!("unable to open batch file {path}: {err}")))?;
    read_records(file, layout)
}

pub fn read_records<R: std::io::Read>(
    input: R,
    layout: CsvLayout,
) -> Result<Vec<csv::StringRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(layout.skip_header)
        .delimiter(layout.delimiter)
        .flexible(true)
        .from_reader(input);

    Ok(reader.records().collect::<Result<Vec<_>, _>>()?)
}

/// Counts of what happened to the rows of one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Summary {
    pub rows: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows that never reached a worker, malformed or cancelled
    pub skipped: usize,
    pub cancelled: bool,
}

impl Summary {
    /// The colored one-liner written to stderr after a run
    pub fn report(&self) -> String {
        use nu_ansi_term::{Color, Style};

        format!(
            "{} rows: {} ok, {} failed, {} skipped{}",
            Style::default().bold().paint(self.rows.to_string()),
            Color::Green.paint(self.succeeded.to_string()),
            if self.failed > 0 {
                Color::Red.paint(self.failed.to_string())
            } else {
                Style::default().paint(self.failed.to_string())
            },
            Color::Yellow.paint(self.skipped.to_string()),
            if self.cancelled {
                Color::Red.paint(" (cancelled)").to_string()
            } else {
                String::new()
            },
        )
    }
}

#[derive(Default)]
struct Counters {
    rows: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// Builds the record emitted for a row whose worker failed
pub type FailureRecord = fn(&ValueMap) -> Value;

pub struct Dispatcher<'a> {
    threads: usize,
    delay: Duration,
    retrier: &'a Retrier,
    cancel: &'a Cancellation,
    on_failure: Option<FailureRecord>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(threads: usize, retrier: &'a Retrier, cancel: &'a Cancellation) -> Self {
        Self {
            threads: threads.max(1),
            delay: Duration::ZERO,
            retrier,
            cancel,
            on_failure: None,
        }
    }

    /// Pause each worker takes after every row to smooth the request rate
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn on_failure(mut self, on_failure: Option<FailureRecord>) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Feeds `rows` to `worker` and everything it produces to `sink`. Rows that
    /// failed to bind arrive as `Err` and are logged and skipped.
    pub async fn run<S, F, Fut>(&self, rows: S, worker: F, sink: &mut dyn Sink) -> Result<Summary>
    where
        S: Stream<Item = Result<ValueMap>> + Send,
        F: Fn(ValueMap) -> Fut + Sync,
        Fut: Future<Output = Result<Value>> + Send,
    {
        let counters = Counters::default();
        let (job_tx, job_rx) = mpsc::channel::<(usize, ValueMap)>(1);
        let (result_tx, mut result_rx) = mpsc::channel::<Value>(self.threads);
        // Owned by the workers only, so the producer notices once they all stop
        let jobs = Arc::new(Mutex::new(job_rx));

        let counters = &counters;
        let worker = &worker;
        let out = &mut *sink;
        let cancel = self.cancel;
        let retrier = self.retrier;
        let delay = self.delay;
        let on_failure = self.on_failure;

        // SAFETY: We must not forget the future, and we don't, it is awaited
        // to completion right here
        let (_, finished) = unsafe {
            Scope::scope_and_collect(|s| {
                s.spawn(async move {
                    let mut rows = Box::pin(rows);
                    let mut index = 0usize;

                    while let Some(row) = rows.next().await {
                        index += 1;
                        counters.rows.fetch_add(1, Ordering::Relaxed);

                        if cancel.is_cancelled() {
                            counters.skipped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }

                        match row {
                            Ok(map) => {
                                if job_tx.send((index, map)).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(row = index, error = %err, "skipping row");
                                counters.skipped.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }

                    Ok::<_, Error>(())
                });

                for _ in 0..self.threads {
                    let results = result_tx.clone();
                    let jobs = jobs.clone();
                    s.spawn(async move {
                        loop {
                            let Some((row, map)) = jobs.lock().await.recv().await else {
                                break;
                            };

                            if cancel.is_cancelled() {
                                counters.skipped.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }

                            let record = match retrier.run(cancel, || worker(map.clone())).await {
                                Ok(record) => {
                                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                                    Some(record)
                                }
                                Err(err) => {
                                    tracing::warn!(row, error = %err, "row failed");
                                    counters.failed.fetch_add(1, Ordering::Relaxed);
                                    on_failure.map(|f| f(&map))
                                }
                            };

                            if let Some(record) = record {
                                if results.send(record).await.is_err() {
                                    break;
                                }
                            }

                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }

                        Ok(())
                    });
                }

                drop(result_tx);
                drop(jobs);

                s.spawn(async move {
                    while let Some(record) = result_rx.recv().await {
                        out.emit(record)?;
                    }
                    Ok(())
                });
            })
            .await
        };

        for res in finished {
            res.map_err(|err| Error::Task(err.to_string()))??;
        }

        sink.finish()?;

        Ok(Summary {
            rows: counters.rows.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            cancelled: cancel.is_cancelled(),
        })
    }
}

/// Adapts a channel into the row stream [`Dispatcher::run`] consumes
pub fn channel_rows<T, F>(rx: mpsc::Receiver<T>, mut bind: F) -> impl Stream<Item = Result<ValueMap>>
where
    F: FnMut(T) -> Result<ValueMap>,
{
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .map(move |item| bind(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{flags::FlagValue, output::Aggregated, retry::RetryPolicy};
    use serde_json::json;
    use std::{collections::HashMap, sync::Mutex as StdMutex};

    fn retrier() -> Retrier {
        Retrier::new(RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            jitter: Duration::ZERO,
        })
    }

    fn row(id: &str) -> Result<ValueMap> {
        let mut map = ValueMap::new();
        map.set("id", FlagValue::String(id.to_owned()));
        Ok(map)
    }

    fn records(sink: Aggregated<Vec<u8>>) -> Vec<Value> {
        let out: Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        out.as_array().unwrap().clone()
    }

    #[test]
    fn thread_selection() {
        assert_eq!(thread_count(0, Some(100), 16), 16);
        assert_eq!(thread_count(-3, Some(100), 16), 16);
        assert_eq!(thread_count(4, Some(100), 16), 4);
        assert_eq!(thread_count(64, Some(100), 16), 16);
        assert_eq!(thread_count(8, Some(3), 16), 3);
        assert_eq!(thread_count(8, Some(0), 16), 1);
        assert_eq!(thread_count(0, None, 0), 1);
        assert_eq!(thread_count(5, None, 16), 5);
    }

    #[test]
    fn csv_layouts() {
        let data = "id,name\na,1\nb,2\n";
        let rows = read_records(data.as_bytes(), CsvLayout::new(",", true).unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0), Some("a"));

        let rows = read_records(data.as_bytes(), CsvLayout::new(",", false).unwrap()).unwrap();
        assert_eq!(rows.len(), 3);

        let rows = read_records(
            "a;x\nb;y\n".as_bytes(),
            CsvLayout::new(";", false).unwrap(),
        )
        .unwrap();
        assert_eq!(rows[1].get(1), Some("y"));

        assert!(CsvLayout::new(";;", false).is_err());
        assert!(CsvLayout::new("", false).is_err());
    }

    #[test]
    fn empty_and_header_only_files() {
        let rows = read_records("".as_bytes(), CsvLayout::new(",", false).unwrap()).unwrap();
        assert!(rows.is_empty());

        let rows = read_records("id\n".as_bytes(), CsvLayout::new(",", true).unwrap()).unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_row_reaches_a_worker() {
        let retrier = retrier();
        let cancel = Cancellation::new();
        let calls = &AtomicUsize::new(0);

        let ids: Vec<String> = (0..10).map(|i| format!("user{i}")).collect();
        let rows = futures_util::stream::iter(ids.clone().into_iter().map(|id| row(&id)));

        let mut sink = Aggregated::new(Vec::new(), true);
        let dispatcher = Dispatcher::new(3, &retrier, &cancel);
        let summary = dispatcher
            .run(
                rows,
                |map: ValueMap| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"id": map.string("id"), "result": true}))
                },
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(summary.rows, 10);
        assert_eq!(summary.succeeded, 10);

        let mut seen: Vec<String> = records(sink)
            .into_iter()
            .map(|r| r["id"].as_str().unwrap().to_owned())
            .collect();
        seen.sort();
        let mut expected = ids;
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_are_recorded_and_do_not_abort() {
        let retrier = retrier();
        let cancel = Cancellation::new();

        let rows = futures_util::stream::iter(vec![
            row("ok1"),
            row("bad"),
            Err(Error::argument("unparseable row")),
            row("ok2"),
        ]);

        let mut sink = Aggregated::new(Vec::new(), true);
        fn failed(m: &ValueMap) -> Value {
            json!({"id": m.string("id"), "result": false})
        }

        let summary = Dispatcher::new(2, &retrier, &cancel)
            .on_failure(Some(failed))
            .run(
                rows,
                |map: ValueMap| async move {
                    match map.string("id") {
                        Some("bad") => Err(Error::Remote {
                            status: 404,
                            reason: None,
                            message: "nope".to_owned(),
                        }),
                        id => Ok(json!({"id": id, "result": true})),
                    }
                },
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(
            summary,
            Summary {
                rows: 4,
                succeeded: 2,
                failed: 1,
                skipped: 1,
                cancelled: false,
            }
        );

        let by_id: HashMap<String, bool> = records(sink)
            .into_iter()
            .map(|r| {
                (
                    r["id"].as_str().unwrap().to_owned(),
                    r["result"].as_bool().unwrap(),
                )
            })
            .collect();
        assert_eq!(by_id.len(), 3);
        assert!(by_id["ok1"]);
        assert!(by_id["ok2"]);
        assert!(!by_id["bad"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retryable_rows_are_retried() {
        let retrier = retrier();
        let cancel = Cancellation::new();
        let attempts = &StdMutex::new(HashMap::<String, u32>::new());

        let rows = futures_util::stream::iter(vec![row("a"), row("b")]);
        let mut sink = Aggregated::new(Vec::new(), true);

        let summary = Dispatcher::new(2, &retrier, &cancel)
            .run(
                rows,
                |map: ValueMap| async move {
                    let id = map.string("id").unwrap_or_default().to_owned();
                    let n = {
                        let mut attempts = attempts.lock().unwrap();
                        let n = attempts.entry(id.clone()).or_default();
                        *n += 1;
                        *n
                    };
                    if id == "a" && n < 2 {
                        Err(Error::Remote {
                            status: 503,
                            reason: None,
                            message: "unavailable".to_owned(),
                        })
                    } else {
                        Ok(json!({"id": id}))
                    }
                },
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 2);
        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts["a"], 2);
        assert_eq!(attempts["b"], 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_rows_no_calls() {
        let retrier = retrier();
        let cancel = Cancellation::new();
        let calls = &AtomicUsize::new(0);

        let mut sink = Aggregated::new(Vec::new(), true);
        let summary = Dispatcher::new(4, &retrier, &cancel)
            .run(
                futures_util::stream::iter(Vec::<Result<ValueMap>>::new()),
                |_map: ValueMap| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                },
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(summary, Summary::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(records(sink).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_batches_issue_no_calls() {
        let retrier = retrier();
        let cancel = Cancellation::new();
        cancel.cancel();
        let calls = &AtomicUsize::new(0);

        let rows = futures_util::stream::iter((0..5).map(|i| row(&i.to_string())));
        let mut sink = Aggregated::new(Vec::new(), true);
        let summary = Dispatcher::new(2, &retrier, &cancel)
            .run(
                rows,
                |_map: ValueMap| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                },
                &mut sink,
            )
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.skipped, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interrupted_rows_stop_retrying() {
        let retrier = Retrier::new(RetryPolicy {
            max_attempts: 5,
            base: Duration::from_millis(200),
            cap: Duration::from_secs(2),
            jitter: Duration::ZERO,
        });
        let cancel = &Cancellation::new();
        let calls = &AtomicUsize::new(0);

        let mut sink = Aggregated::new(Vec::new(), true);
        let start = std::time::Instant::now();
        let summary = Dispatcher::new(1, &retrier, cancel)
            .run(
                futures_util::stream::iter(vec![row("a")]),
                |_map: ValueMap| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    cancel.cancel();
                    Err::<Value, _>(Error::Remote {
                        status: 503,
                        reason: None,
                        message: "unavailable".to_owned(),
                    })
                },
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.cancelled);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn cancellation_wakes_waiters() {
        let cancel = Cancellation::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };

        tokio::task::yield_now().await;
        cancel.cancel();
        waiter.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn channel_rows_bind_each_item() {
        let (tx, rx) = mpsc::channel(4);
        for id in ["x", "y"] {
            tx.send(id.to_owned()).await.unwrap();
        }
        drop(tx);

        let rows: Vec<_> = channel_rows(rx, |id: String| row(&id)).collect().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].as_ref().unwrap().string("id"), Some("y"));
    }
}
