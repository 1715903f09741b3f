use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coordinator::result::ResultLedger;
use coordinator::submit::{LedgerError, SubmissionLedger};
use hashwork_core::ids::JobId;
use hashwork_core::job::{JobResult, Request};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn request(serial: u64) -> (Request, JobId) {
    let data = serial.to_be_bytes().to_vec();
    let id = JobId::derive(&data, serial);
    (
        Request {
            id,
            data,
            difficulty: (serial % 20) as u8 + 1,
        },
        id,
    )
}

fn result(seed: u8) -> JobResult {
    JobResult {
        id: JobId([seed; 8]),
        nonce: vec![seed; 8],
        hash: vec![0; 20],
    }
}

#[test]
fn submission_ledger_never_exceeds_capacity() {
    let ledger = SubmissionLedger::new(4);
    let ids: Vec<JobId> = (1..=9)
        .map(|serial| {
            let (req, id) = request(serial);
            ledger.put(req, id).unwrap();
            assert!(ledger.len() <= 4);
            id
        })
        .collect();

    assert_eq!(ledger.len(), 4);
    for evicted in &ids[..5] {
        assert!(!ledger.have(evicted));
    }
    for kept in &ids[5..] {
        assert!(ledger.have(kept));
    }
}

#[test]
fn first_entry_evicted_after_capacity_plus_one() {
    let ledger = SubmissionLedger::new(3);
    let (first, first_id) = request(1);
    ledger.put(first, first_id).unwrap();
    for serial in 2..=4 {
        let (req, id) = request(serial);
        ledger.put(req, id).unwrap();
    }

    assert!(!ledger.have(&first_id));
    assert_eq!(ledger.data(&first_id), None);
    assert_eq!(ledger.difficulty(&first_id), 0);
}

#[test]
fn duplicate_submission_is_refused() {
    let ledger = SubmissionLedger::new(8);
    let (req, id) = request(7);
    ledger.put(req.clone(), id).unwrap();

    assert!(matches!(ledger.put(req, id), Err(LedgerError::AlreadyExists(dup)) if dup == id));
    assert_eq!(ledger.len(), 1);
}

#[test]
fn submission_lookup_and_removal() {
    let ledger = SubmissionLedger::default();
    let (req, id) = request(3);
    ledger.put(req.clone(), id).unwrap();

    assert_eq!(ledger.get(&id), Some(req.clone()));
    assert_eq!(ledger.data(&id), Some(req.data.clone()));
    assert_eq!(ledger.difficulty(&id), req.difficulty);

    assert_eq!(ledger.remove(&id), Some(req));
    assert!(ledger.remove(&id).is_none());
    assert!(ledger.is_empty());
}

#[test]
fn serial_is_strictly_monotonic() {
    let ledger = SubmissionLedger::default();
    assert_eq!(ledger.last_serial(), 0);
    let serials: Vec<u64> = (0..5).map(|_| ledger.inc_serial()).collect();
    assert_eq!(serials, vec![1, 2, 3, 4, 5]);
    assert_eq!(ledger.last_serial(), 5);
}

#[test]
fn full_result_ledger_refuses_without_mutation() {
    let ledger = ResultLedger::new(2, Duration::from_secs(60), None);
    assert!(ledger.put(JobId([1; 8]), result(1)));
    assert!(ledger.put(JobId([2; 8]), result(2)));
    assert!(ledger.is_full());

    assert!(!ledger.put(JobId([3; 8]), result(3)));
    assert_eq!(ledger.count(), 2);
    assert_eq!(ledger.get(&JobId([1; 8])), Some(result(1)));
    assert_eq!(ledger.get(&JobId([2; 8])), Some(result(2)));
    assert!(ledger.get(&JobId([3; 8])).is_none());

    assert!(ledger.delete(&JobId([1; 8])));
    assert!(!ledger.is_full());
    assert!(ledger.put(JobId([3; 8]), result(3)));
}

#[test]
fn delete_twice_is_a_noop() {
    let ledger = ResultLedger::new(4, Duration::from_secs(60), None);
    ledger.put(JobId([9; 8]), result(9));

    assert!(ledger.delete(&JobId([9; 8])));
    assert!(!ledger.delete(&JobId([9; 8])));
    assert_eq!(ledger.count(), 0);
    assert!(!ledger.delete(&JobId([0xee; 8])));
}

#[test]
fn delete_keeps_moved_entry_reachable() {
    let ledger = ResultLedger::new(4, Duration::from_secs(60), None);
    for seed in 1..=4 {
        ledger.put(JobId([seed; 8]), result(seed));
    }

    // The last entry takes the first slot.
    ledger.delete(&JobId([1; 8]));
    assert_eq!(ledger.get(&JobId([4; 8])), Some(result(4)));
    assert!(ledger.delete(&JobId([4; 8])));
    assert_eq!(ledger.get(&JobId([2; 8])), Some(result(2)));
    assert_eq!(ledger.get(&JobId([3; 8])), Some(result(3)));
    assert_eq!(ledger.count(), 2);
}

#[test]
fn duplicate_result_is_refused() {
    let ledger = ResultLedger::new(4, Duration::from_secs(60), None);
    assert!(ledger.put(JobId([5; 8]), result(5)));
    assert!(!ledger.put(JobId([5; 8]), result(6)));
    assert_eq!(ledger.get(&JobId([5; 8])), Some(result(5)));
}

#[tokio::test]
async fn prune_flushes_only_expired_entries() {
    let flushed = Arc::new(AtomicUsize::new(0));
    let sink = {
        let flushed = flushed.clone();
        Arc::new(move |_: JobResult| {
            flushed.fetch_add(1, Ordering::SeqCst);
        })
    };
    let ledger = ResultLedger::new(4, Duration::from_millis(30), Some(sink));

    ledger.put(JobId([1; 8]), result(1));
    assert_eq!(ledger.prune(), 0);

    sleep(Duration::from_millis(50)).await;
    ledger.put(JobId([2; 8]), result(2));

    assert_eq!(ledger.prune(), 1);
    assert_eq!(flushed.load(Ordering::SeqCst), 1);
    assert!(ledger.get(&JobId([1; 8])).is_none());
    assert!(ledger.get(&JobId([2; 8])).is_some());
}

#[tokio::test]
async fn unacknowledged_result_expires_once() {
    let fired = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = {
        let fired = fired.clone();
        Arc::new(move |r: JobResult| fired.lock().push(r.id))
    };
    let ledger = Arc::new(ResultLedger::new(1, Duration::from_millis(100), Some(sink)));
    let shutdown = CancellationToken::new();
    let sweep = ledger.start(shutdown.clone());

    assert!(ledger.put(JobId([0x0d; 8]), result(0x0d)));
    sleep(Duration::from_millis(150)).await;

    assert_eq!(*fired.lock(), vec![JobId([0x0d; 8])]);
    assert_eq!(ledger.count(), 0);
    assert!(ledger.get(&JobId([0x0d; 8])).is_none());

    sleep(Duration::from_millis(120)).await;
    assert_eq!(fired.lock().len(), 1);

    shutdown.cancel();
    sweep.await.unwrap();
}

#[tokio::test]
async fn sweep_stops_on_shutdown() {
    let ledger = Arc::new(ResultLedger::new(1, Duration::from_secs(60), None));
    let shutdown = CancellationToken::new();
    let sweep = ledger.start(shutdown.clone());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), sweep)
        .await
        .expect("sweep did not observe shutdown")
        .unwrap();
}
