use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;

use reqmux::mux::HandleAllocator;
use reqmux::{
    DriverThread, HttpHandle, HttpRequest, MockBehavior, MockEngine, Multiplexer, Outcome,
    Response, TransferCode,
};

type Deliveries = Arc<Mutex<Vec<(HttpHandle, Outcome, Bytes)>>>;

/// Drive `mux` until every handle reports completion or `limit` passes
fn update_until_done(mux: &Multiplexer<Arc<MockEngine>>, handles: &[HttpHandle], limit: Duration) {
    let deadline = Instant::now() + limit;
    while handles.iter().any(|h| !mux.is_completed(*h)) {
        assert!(Instant::now() < deadline, "transactions did not complete in time");
        mux.update();
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_ten_concurrent_gets_complete_once_each() {
    let engine = Arc::new(MockEngine::with_default(MockBehavior::ok("ok")));
    let mux = Arc::new(Multiplexer::new(engine.clone()));
    let deliveries: Deliveries = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(10));

    let producers: Vec<_> = (0..10)
        .map(|i| {
            let (mux, deliveries, barrier) = (mux.clone(), deliveries.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                let slot = Arc::new(Mutex::new(HttpHandle::INVALID));
                let (sink, own) = (deliveries.clone(), slot.clone());
                let handle = mux
                    .add_request(HttpRequest::get(format!("http://mock/{}", i)), move |outcome, response: Response| {
                        sink.lock().unwrap().push((*own.lock().unwrap(), outcome, response.body));
                    })
                    .unwrap();
                *slot.lock().unwrap() = handle;
                handle
            })
        })
        .collect();
    let handles: Vec<HttpHandle> = producers.into_iter().map(|p| p.join().unwrap()).collect();

    let unique: HashSet<_> = handles.iter().copied().collect();
    assert_eq!(unique.len(), 10);
    assert_eq!(mux.active_transactions(), 10);
    assert!(handles.iter().all(|h| !mux.is_completed(*h)));

    update_until_done(&mux, &handles, Duration::from_secs(5));
    // Extra drains must not fire anything again
    for _ in 0..5 {
        assert_eq!(mux.update(), 0);
    }

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 10);
    let delivered: HashSet<_> = deliveries.iter().map(|(h, _, _)| *h).collect();
    assert_eq!(delivered, unique);
    for (_, outcome, body) in deliveries.iter() {
        assert_eq!(*outcome, Outcome::Ok);
        assert_eq!(&body[..], b"ok");
    }
    assert_eq!(engine.registrations(), 10);
}

#[test]
fn test_post_with_timeout_against_hanging_engine() {
    let engine = Arc::new(MockEngine::with_default(MockBehavior::Hang));
    let mux = Multiplexer::new(engine.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let request = HttpRequest::post("http://mock/upload", "payload").with_timeout(Duration::from_secs(1));
    let handle = mux
        .add_request(request, move |outcome, _| sink.lock().unwrap().push(outcome))
        .unwrap();

    mux.update();
    assert!(!mux.is_completed(handle));

    thread::sleep(Duration::from_millis(1_050));
    assert_eq!(mux.update(), 1);

    assert!(mux.is_completed(handle));
    assert_eq!(*seen.lock().unwrap(), vec![Outcome::Timeout]);
    assert_eq!(mux.outcome(handle), Ok(Some(Outcome::Timeout)));
}

#[test]
fn test_timeout_shorter_than_latency_wins() {
    let engine = Arc::new(MockEngine::with_default(MockBehavior::RespondAfter {
        delay: Duration::from_millis(200),
        status: 200,
        body: Bytes::from_static(b"late"),
    }));
    let mux = Multiplexer::new(engine);

    let handle = mux
        .add_request(
            HttpRequest::get("http://mock/slow").with_timeout(Duration::from_millis(20)),
            |_, _| {},
        )
        .unwrap();

    // Well past both the deadline and the scripted response
    thread::sleep(Duration::from_millis(250));
    mux.update();

    assert_eq!(mux.outcome(handle), Ok(Some(Outcome::Timeout)));
}

#[test]
fn test_completion_only_after_update() {
    let engine = Arc::new(MockEngine::with_default(MockBehavior::RespondAfter {
        delay: Duration::from_millis(30),
        status: 200,
        body: Bytes::new(),
    }));
    let mux = Multiplexer::new(engine);
    let handle = mux.add_request(HttpRequest::get("http://mock/"), |_, _| {}).unwrap();

    // Time passing alone never completes a transaction
    thread::sleep(Duration::from_millis(50));
    assert!(!mux.is_completed(handle));

    mux.update();
    assert!(mux.is_completed(handle));
    for _ in 0..3 {
        mux.update();
        assert!(mux.is_completed(handle));
    }
}

#[test]
fn test_transport_error_carries_code() {
    let engine = Arc::new(MockEngine::new());
    engine.set_behavior("http://mock/refused", MockBehavior::Fail(TransferCode::COULDNT_CONNECT));
    let mux = Multiplexer::new(engine);
    let seen = Arc::new(Mutex::new(None));

    let sink = seen.clone();
    let handle = mux
        .add_request(HttpRequest::get("http://mock/refused"), move |outcome, response| {
            *sink.lock().unwrap() = Some((outcome, response.status));
        })
        .unwrap();
    mux.update();

    assert_eq!(
        *seen.lock().unwrap(),
        Some((Outcome::TransportError(TransferCode::COULDNT_CONNECT), None))
    );
    assert!(mux.is_completed(handle));
    assert_eq!(mux.stats().failed, 1);
}

#[test]
fn test_release_semantics() {
    let engine = Arc::new(MockEngine::new());
    let mux = Multiplexer::new(engine.clone());
    let handle = mux.add_request(HttpRequest::get("http://mock/"), |_, _| {}).unwrap();
    mux.update();

    assert!(mux.release_transaction(handle));
    assert!(!mux.release_transaction(handle));
    assert_eq!(engine.destroyed(), 1);
    assert_eq!(mux.active_transactions(), 0);

    // Released and never-issued handles both read as "done"
    assert!(mux.is_completed(handle));
    assert!(mux.is_completed(HttpHandle::INVALID));
}

#[test]
fn test_producers_race_the_driver_thread() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 50;

    let engine = Arc::new(MockEngine::with_default(MockBehavior::ok("ok")));
    let mux = Arc::new(Multiplexer::new(engine));
    let calls = Arc::new(AtomicUsize::new(0));
    let driver = DriverThread::spawn(mux.clone(), Duration::from_millis(1)).unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let (mux, calls) = (mux.clone(), calls.clone());
            thread::spawn(move || {
                let mut handles = Vec::new();
                for i in 0..PER_PRODUCER {
                    let calls = calls.clone();
                    let url = format!("http://mock/{}/{}", p, i);
                    let handle = mux
                        .add_request(HttpRequest::get(url), move |_, _| {
                            calls.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                    handles.push(handle);
                }
                // Each producer waits for and releases its own transactions
                let deadline = Instant::now() + Duration::from_secs(10);
                for handle in &handles {
                    while !mux.is_completed(*handle) {
                        assert!(Instant::now() < deadline);
                        thread::sleep(Duration::from_millis(1));
                    }
                    assert_eq!(mux.outcome(*handle), Ok(Some(Outcome::Ok)));
                    assert!(mux.release_transaction(*handle));
                }
                handles
            })
        })
        .collect();

    let mut all = HashSet::new();
    for producer in producers {
        for handle in producer.join().unwrap() {
            assert!(all.insert(handle));
        }
    }
    driver.stop();

    assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
    assert_eq!(calls.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);
    assert_eq!(mux.active_transactions(), 0);

    let stats = mux.stats();
    assert_eq!(stats.submitted, (PRODUCERS * PER_PRODUCER) as u64);
    assert_eq!(stats.succeeded, (PRODUCERS * PER_PRODUCER) as u64);
    assert_eq!(stats.released, (PRODUCERS * PER_PRODUCER) as u64);
    assert_eq!(stats.orphaned_events, 0);
}

/// Handles are 32-bit. Uniqueness is assumed only while fewer than
/// `u32::MAX - 1` transactions are live at once; this suite never holds more
/// than `MAX_LIVE_IN_TESTS`, including across the wraparound point.
#[test]
fn test_handle_bound_across_wraparound() {
    const MAX_LIVE_IN_TESTS: u32 = 1_000;

    let mux = Multiplexer::with_allocator(
        MockEngine::with_default(MockBehavior::Hang),
        HandleAllocator::starting_after(u32::MAX - MAX_LIVE_IN_TESTS / 2),
    );
    let handles: HashSet<_> = (0..MAX_LIVE_IN_TESTS)
        .map(|i| {
            mux.add_request(HttpRequest::get(format!("http://mock/{}", i)), |_, _| {})
                .unwrap()
        })
        .collect();

    assert_eq!(handles.len(), MAX_LIVE_IN_TESTS as usize);
    assert!(handles.iter().all(|h| h.is_valid()));
    assert!(handles.contains(&HttpHandle::from_raw(u32::MAX)));
    assert!(handles.contains(&HttpHandle::from_raw(1)));
    assert_eq!(mux.active_transactions(), MAX_LIVE_IN_TESTS as usize);
}
