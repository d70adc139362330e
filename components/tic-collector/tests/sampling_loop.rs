use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tic_collector::{
    durable_log::durable_log::{DurableLogError, DurableSink},
    frame::reader::{FrameReader, ReadStop},
    helpers::load_config::DurableFailurePolicy,
    runtime::sampling_loop::{CycleOutcome, LoopError, SamplingLoop},
    shipper::{
        point::Point,
        shipper::{INDEX_FIELD, POWER_FIELD, PointWriter, Shipper, WriteError},
    },
    transport::{async_read::StopOnExt, line_reader::LineReader},
    validator::validator::{FrameValidator, InvalidFrame, Sample},
};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Journal {
    appended: Vec<(u64, u64)>,
    durable_closes: usize,
    shipped: Vec<(u64, u64)>,
    writer_closes: usize,
}

type Shared = Arc<Mutex<Journal>>;

struct RecordingSink {
    journal: Shared,
    fail: bool,
    cancel_after: Option<(usize, CancellationToken)>,
}

#[async_trait]
impl DurableSink for RecordingSink {
    async fn append(&mut self, sample: &Sample) -> Result<(), DurableLogError> {
        if self.fail {
            return Err(DurableLogError::Closed(PathBuf::from("readonly.csv")));
        }
        let mut journal = self.journal.lock().unwrap();
        journal
            .appended
            .push((sample.index_wh(), sample.power_va()));
        if let Some((limit, token)) = &self.cancel_after {
            if journal.appended.len() >= *limit {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DurableLogError> {
        self.journal.lock().unwrap().durable_closes += 1;
        Ok(())
    }
}

struct RecordingWriter {
    journal: Shared,
    fail: bool,
}

#[async_trait]
impl PointWriter for RecordingWriter {
    async fn write(&mut self, point: &Point) -> Result<(), WriteError> {
        if self.fail {
            return Err(WriteError::Request("connection refused".into()));
        }
        let index = point.field_value(INDEX_FIELD).unwrap();
        let power = point.field_value(POWER_FIELD).unwrap();
        self.journal.lock().unwrap().shipped.push((index, power));
        Ok(())
    }

    async fn close(&mut self) {
        self.journal.lock().unwrap().writer_closes += 1;
    }
}

fn sink(journal: &Shared) -> RecordingSink {
    RecordingSink {
        journal: journal.clone(),
        fail: false,
        cancel_after: None,
    }
}

fn shipper(journal: &Shared, fail: bool) -> Option<Shipper<RecordingWriter>> {
    Some(Shipper::new(
        RecordingWriter {
            journal: journal.clone(),
            fail,
        },
        "consommation",
        "linky",
    ))
}

fn sampling_loop<R>(
    transport: R,
    max_lines: usize,
    durable: RecordingSink,
    remote: Option<Shipper<RecordingWriter>>,
    cancel: CancellationToken,
) -> SamplingLoop<R, RecordingSink, RecordingWriter>
where
    R: AsyncRead + Unpin,
{
    let reader = FrameReader::new(LineReader::new(transport, Duration::from_secs(1)), max_lines);
    SamplingLoop::new(
        reader,
        FrameValidator::new("BASE", "PAPP"),
        durable,
        remote,
        Duration::from_secs(10),
        cancel,
    )
}

#[tokio::test]
async fn scenario_frame_reaches_both_sinks() {
    let journal = Shared::default();
    let input: &[u8] = b"BASE 001234\nPAPP 00450\ngarbage\nIINST 2\n";
    let mut sampler = sampling_loop(
        input,
        30,
        sink(&journal),
        shipper(&journal, false),
        CancellationToken::new(),
    );

    match sampler.run_cycle().await.unwrap() {
        CycleOutcome::Persisted {
            sample,
            durable,
            remote,
        } => {
            assert_eq!(sample.index_wh(), 1234);
            assert_eq!(sample.power_va(), 450);
            assert!(durable);
            assert_eq!(remote, Some(true));
        }
        other => panic!("expected a persisted sample, got {other:?}"),
    }

    let journal = journal.lock().unwrap();
    assert_eq!(journal.appended, vec![(1234, 450)]);
    assert_eq!(journal.shipped, vec![(1234, 450)]);
}

#[tokio::test]
async fn frame_without_index_writes_nothing() {
    let journal = Shared::default();
    let input: &[u8] = b"PAPP 00450\n";
    let mut sampler = sampling_loop(
        input,
        30,
        sink(&journal),
        shipper(&journal, false),
        CancellationToken::new(),
    );

    let outcome = sampler.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Skipped {
            reason: InvalidFrame::MissingLabel("BASE".into()),
            stop: ReadStop::EndOfStream,
        }
    );

    let journal = journal.lock().unwrap();
    assert!(journal.appended.is_empty());
    assert!(journal.shipped.is_empty());
}

#[tokio::test]
async fn remote_failure_does_not_block_next_cycle() {
    let journal = Shared::default();
    let input: &[u8] = b"BASE 100\nPAPP 10\nBASE 101\nPAPP 20\n";
    let mut sampler = sampling_loop(
        input,
        2,
        sink(&journal),
        shipper(&journal, true),
        CancellationToken::new(),
    );

    for expected in [(100, 10), (101, 20)] {
        match sampler.run_cycle().await.unwrap() {
            CycleOutcome::Persisted {
                sample,
                durable,
                remote,
            } => {
                assert_eq!((sample.index_wh(), sample.power_va()), expected);
                assert!(durable);
                assert_eq!(remote, Some(false));
            }
            other => panic!("expected a persisted sample, got {other:?}"),
        }
    }

    assert_eq!(journal.lock().unwrap().appended, vec![(100, 10), (101, 20)]);
}

#[tokio::test]
async fn no_remote_store_still_writes_durable_log() {
    let journal = Shared::default();
    let input: &[u8] = b"BASE 7\nPAPP 3\n";
    let mut sampler = sampling_loop(input, 30, sink(&journal), None, CancellationToken::new());

    match sampler.run_cycle().await.unwrap() {
        CycleOutcome::Persisted { remote, .. } => assert_eq!(remote, None),
        other => panic!("expected a persisted sample, got {other:?}"),
    }
    assert_eq!(journal.lock().unwrap().appended, vec![(7, 3)]);
}

#[tokio::test]
async fn durable_failure_is_fatal_by_default() {
    let journal = Shared::default();
    let input: &[u8] = b"BASE 1234\nPAPP 450\n";
    let durable = RecordingSink {
        fail: true,
        ..sink(&journal)
    };
    let sampler = sampling_loop(
        input,
        30,
        durable,
        shipper(&journal, false),
        CancellationToken::new(),
    );

    let result = sampler.run().await;
    assert!(matches!(result, Err(LoopError::Durable(DurableLogError::Closed(_)))));

    let journal = journal.lock().unwrap();
    // The remote write never runs ahead of the durable record.
    assert!(journal.shipped.is_empty());
    assert_eq!(journal.durable_closes, 1);
    assert_eq!(journal.writer_closes, 1);
}

#[tokio::test]
async fn degrade_policy_keeps_shipping_remotely() {
    let journal = Shared::default();
    let input: &[u8] = b"BASE 1234\nPAPP 450\n";
    let durable = RecordingSink {
        fail: true,
        ..sink(&journal)
    };
    let mut sampler = sampling_loop(
        input,
        30,
        durable,
        shipper(&journal, false),
        CancellationToken::new(),
    )
    .with_failure_policy(DurableFailurePolicy::Degrade);

    match sampler.run_cycle().await.unwrap() {
        CycleOutcome::Persisted {
            durable, remote, ..
        } => {
            assert!(!durable);
            assert_eq!(remote, Some(true));
        }
        other => panic!("expected a persisted sample, got {other:?}"),
    }
    assert_eq!(journal.lock().unwrap().shipped, vec![(1234, 450)]);
}

#[tokio::test(start_paused = true)]
async fn loop_cycles_until_cancelled_then_cleans_up_once() {
    let journal = Shared::default();
    let cancel = CancellationToken::new();
    let input: &[u8] = b"BASE 100\nPAPP 10\nBASE 105\nPAPP 12\nBASE 110\nPAPP 14\n";
    let durable = RecordingSink {
        cancel_after: Some((2, cancel.clone())),
        ..sink(&journal)
    };
    let sampler = sampling_loop(input, 2, durable, shipper(&journal, true), cancel);

    sampler.run().await.unwrap();

    let journal = journal.lock().unwrap();
    assert_eq!(journal.appended, vec![(100, 10), (105, 12)]);
    assert!(journal.shipped.is_empty());
    assert_eq!(journal.durable_closes, 1);
    assert_eq!(journal.writer_closes, 1);
}

#[tokio::test]
async fn cancelled_before_start_runs_no_cycle() {
    let journal = Shared::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let input: &[u8] = b"BASE 100\nPAPP 10\n";
    let sampler = sampling_loop(input, 30, sink(&journal), shipper(&journal, false), cancel);

    sampler.run().await.unwrap();

    let journal = journal.lock().unwrap();
    assert!(journal.appended.is_empty());
    assert_eq!(journal.durable_closes, 1);
    assert_eq!(journal.writer_closes, 1);
}

#[tokio::test]
async fn cancellation_interrupts_a_blocked_read() {
    let journal = Shared::default();
    let cancel = CancellationToken::new();
    // The meter side stays open and silent.
    let (_meter, port) = tokio::io::duplex(64);
    let transport = Box::pin(port.stop_on(cancel.clone().cancelled_owned()));

    let reader = FrameReader::new(LineReader::new(transport, Duration::from_secs(3600)), 30);
    let sampler = SamplingLoop::new(
        reader,
        FrameValidator::new("BASE", "PAPP"),
        sink(&journal),
        shipper(&journal, false),
        Duration::from_secs(3600),
        cancel.clone(),
    );
    let handle = tokio::spawn(sampler.run());

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops promptly")
        .unwrap();
    assert!(result.is_ok());

    let journal = journal.lock().unwrap();
    assert!(journal.appended.is_empty());
    assert_eq!(journal.durable_closes, 1);
    assert_eq!(journal.writer_closes, 1);
}
