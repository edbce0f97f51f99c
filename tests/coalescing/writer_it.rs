use pulse::{AppendSink, CoalescingWriter, FlushError, ManualScheduler, MemorySink};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LATENCY: Duration = Duration::from_millis(100);

fn manual_writer() -> (
    Arc<CoalescingWriter<MemorySink>>,
    MemorySink,
    Arc<ManualScheduler>,
) {
    let sink = MemorySink::new();
    let scheduler = Arc::new(ManualScheduler::new());
    let writer = CoalescingWriter::with_scheduler(sink.clone(), LATENCY, scheduler.clone());
    (Arc::new(writer), sink, scheduler)
}

fn spawn_append(
    writer: &Arc<CoalescingWriter<MemorySink>>,
    payload: Vec<u8>,
) -> JoinHandle<Result<usize, FlushError>> {
    let writer = writer.clone();
    thread::spawn(move || writer.append(&payload))
}

/// Spawns appends one at a time so admission order is the spawn order.
fn admit_in_order(
    writer: &Arc<CoalescingWriter<MemorySink>>,
    payloads: &[Vec<u8>],
) -> Vec<JoinHandle<Result<usize, FlushError>>> {
    let base = writer.pending_members();
    payloads
        .iter()
        .enumerate()
        .map(|(idx, payload)| {
            let handle = spawn_append(writer, payload.clone());
            while writer.pending_members() < base + idx + 1 {
                thread::yield_now();
            }
            handle
        })
        .collect()
}

#[test]
fn batch_concatenates_payloads_in_admission_order() {
    let (writer, sink, scheduler) = manual_writer();
    let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![b'a' + i; usize::from(i) + 1]).collect();
    let handles = admit_in_order(&writer, &payloads);
    assert!(scheduler.fire_next());
    for (handle, payload) in handles.into_iter().zip(&payloads) {
        assert_eq!(handle.join().unwrap().unwrap(), payload.len());
    }
    assert_eq!(sink.contents(), payloads.concat());
    assert_eq!(sink.write_count(), 1);
}

#[test]
fn one_timer_per_batch() {
    let (writer, _sink, scheduler) = manual_writer();
    for round in 0..3 {
        let handles = admit_in_order(&writer, &[b"x".to_vec(), b"y".to_vec(), b"z".to_vec()]);
        assert_eq!(scheduler.scheduled(), round + 1);
        assert_eq!(scheduler.pending(), 1);
        assert!(scheduler.fire_next());
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }
    let telemetry = writer.telemetry();
    assert_eq!(telemetry.timers_armed, 3);
    assert_eq!(telemetry.flushes, 3);
    assert_eq!(telemetry.appends, 9);
    assert_eq!(telemetry.largest_batch, 3);
}

#[test]
fn failed_batch_reports_identical_error_to_every_member() {
    let (writer, sink, scheduler) = manual_writer();
    sink.fail_with(io::ErrorKind::PermissionDenied);
    let payloads: Vec<Vec<u8>> = (0..5).map(|i| vec![i; 4]).collect();
    let handles = admit_in_order(&writer, &payloads);
    assert!(scheduler.fire_next());
    let errors: Vec<FlushError> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap_err())
        .collect();
    for err in &errors {
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(err.shares_cause_with(&errors[0]));
    }
    assert!(sink.contents().is_empty());
    assert_eq!(sink.failed_writes(), 1);

    // The failed bytes are gone; the next batch starts clean.
    sink.heal();
    let next = admit_in_order(&writer, &[b"fresh".to_vec()]);
    assert!(scheduler.fire_next());
    for handle in next {
        assert_eq!(handle.join().unwrap().unwrap(), 5);
    }
    assert_eq!(sink.contents(), b"fresh");
    let telemetry = writer.telemetry();
    assert_eq!(telemetry.flush_failures, 1);
    assert_eq!(telemetry.flushed_bytes, 5);
}

#[test]
fn append_after_resolution_arms_independent_batch() {
    let (writer, sink, scheduler) = manual_writer();
    let first = admit_in_order(&writer, &[b"one".to_vec()]);
    assert!(scheduler.fire_next());
    for handle in first {
        handle.join().unwrap().unwrap();
    }
    let second = admit_in_order(&writer, &[b"two".to_vec(), b"2".to_vec()]);
    assert_eq!(scheduler.scheduled(), 2);
    assert!(scheduler.fire_next());
    for handle in second {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(sink.writes(), vec![3, 4]);
    assert_eq!(sink.contents(), b"onetwo2");
}

/// Sink that parks every write until the test lets it through.
struct GatedSink {
    inner: MemorySink,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl AppendSink for GatedSink {
    fn append_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let _ = self.entered.send(());
        self.release
            .recv()
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "gate dropped"))?;
        self.inner.append_all(bytes)
    }
}

#[test]
fn append_during_flush_waits_then_starts_a_new_batch() {
    let inner = MemorySink::new();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let sink = GatedSink {
        inner: inner.clone(),
        entered: entered_tx,
        release: release_rx,
    };
    let scheduler = Arc::new(ManualScheduler::new());
    let writer = Arc::new(CoalescingWriter::with_scheduler(
        sink,
        LATENCY,
        scheduler.clone(),
    ));

    let first = {
        let writer = writer.clone();
        thread::spawn(move || writer.append(b"one"))
    };
    while writer.pending_members() < 1 {
        thread::yield_now();
    }
    let flusher = {
        let scheduler = scheduler.clone();
        thread::spawn(move || scheduler.fire_next())
    };
    // The flush now holds the writer lock inside the sink.
    entered_rx.recv().unwrap();

    let second = {
        let writer = writer.clone();
        thread::spawn(move || writer.append(b"two"))
    };
    thread::sleep(Duration::from_millis(50));
    assert_eq!(scheduler.scheduled(), 1);
    assert_eq!(scheduler.pending(), 0);
    assert!(!second.is_finished());

    release_tx.send(()).unwrap();
    assert!(flusher.join().unwrap());
    assert_eq!(first.join().unwrap().unwrap(), 3);

    while scheduler.pending() < 1 {
        thread::yield_now();
    }
    assert_eq!(scheduler.scheduled(), 2);
    assert_eq!(inner.writes(), vec![3]);

    release_tx.send(()).unwrap();
    assert!(scheduler.fire_next());
    entered_rx.recv().unwrap();
    assert_eq!(second.join().unwrap().unwrap(), 3);
    assert_eq!(inner.writes(), vec![3, 3]);
    assert_eq!(inner.contents(), b"onetwo");
}

#[test]
fn empty_payload_joins_batch_and_reports_zero() {
    let (writer, sink, scheduler) = manual_writer();
    let handles = admit_in_order(&writer, &[Vec::new(), b"data".to_vec()]);
    assert_eq!(scheduler.scheduled(), 1);
    assert!(scheduler.fire_next());
    let counts: Vec<usize> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .collect();
    assert_eq!(counts, vec![0, 4]);
    assert_eq!(sink.contents(), b"data");
}

#[test]
fn concurrent_appends_are_neither_lost_nor_duplicated() {
    let sink = MemorySink::new();
    let writer = Arc::new(CoalescingWriter::with_sink(
        sink.clone(),
        Duration::from_millis(2),
    ));
    let threads = 16;
    let per_thread = 50;
    let workers: Vec<_> = (0..threads)
        .map(|t| {
            let writer = writer.clone();
            thread::spawn(move || {
                for n in 0..per_thread {
                    let record = format!("[{t:02}:{n:03}]");
                    assert_eq!(writer.append(record.as_bytes()).unwrap(), record.len());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    let contents = String::from_utf8(sink.contents()).unwrap();
    let mut records: Vec<&str> = contents.split_inclusive(']').collect();
    assert_eq!(records.len(), threads * per_thread);
    records.sort_unstable();
    records.dedup();
    assert_eq!(records.len(), threads * per_thread);

    // Each thread's own records land in the order it issued them.
    for t in 0..threads {
        let prefix = format!("[{t:02}:");
        let mine: Vec<&str> = contents
            .split_inclusive(']')
            .filter(|record| record.starts_with(&prefix))
            .collect();
        let expected: Vec<String> = (0..per_thread).map(|n| format!("[{t:02}:{n:03}]")).collect();
        assert_eq!(mine, expected);
    }

    let telemetry = writer.telemetry();
    assert_eq!(telemetry.appends, (threads * per_thread) as u64);
    assert_eq!(telemetry.flushes, sink.write_count() as u64);
    assert_eq!(telemetry.timers_armed, telemetry.flushes);
    assert!(telemetry.flushes < (threads * per_thread) as u64);
}
